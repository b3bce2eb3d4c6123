//! Matter TLV encoding (the subset PASE uses).
//!
//! Each element starts with a control byte:
//!
//! ```text
//!   7   6   5   4   3   2   1   0
//! +-----------+-------------------+
//! |tag control|   element type    |
//! +-----------+-------------------+
//! ```
//!
//! Only anonymous (0) and context-specific (1, one tag byte) tags are
//! supported. All multi-byte integers are little-endian.

use crate::{Error, Result};

/// Maximum nesting of containers accepted by the decoder.
pub const MAX_CONTAINER_DEPTH: usize = 8;

const TAG_CONTROL_ANONYMOUS: u8 = 0x00;
const TAG_CONTROL_CONTEXT: u8 = 0x20;

const TYPE_SIGNED: u8 = 0x00;
const TYPE_UNSIGNED: u8 = 0x04;
const TYPE_FALSE: u8 = 0x08;
const TYPE_TRUE: u8 = 0x09;
const TYPE_UTF8: u8 = 0x0C;
const TYPE_BYTES: u8 = 0x10;
const TYPE_NULL: u8 = 0x14;
const TYPE_STRUCTURE: u8 = 0x15;
const TYPE_ARRAY: u8 = 0x16;
const TYPE_LIST: u8 = 0x17;
const TYPE_END_OF_CONTAINER: u8 = 0x18;

/// Element tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    /// No tag.
    Anonymous,
    /// Context-specific tag.
    Context(u8),
}

/// Element value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Signed integer of any width.
    Signed(i64),
    /// Unsigned integer of any width.
    Unsigned(u64),
    /// Boolean.
    Bool(bool),
    /// UTF-8 string.
    Utf8(String),
    /// Octet string.
    Bytes(Vec<u8>),
    /// Null.
    Null,
    /// Structure of tagged members.
    Structure(Vec<Element>),
    /// Array of anonymous members.
    Array(Vec<Element>),
    /// List of members.
    List(Vec<Element>),
}

/// A tagged TLV element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Element tag.
    pub tag: Tag,
    /// Element value.
    pub value: Value,
}

impl Element {
    /// Anonymous element.
    pub fn anonymous(value: Value) -> Self {
        Self {
            tag: Tag::Anonymous,
            value,
        }
    }

    /// Context-tagged element.
    pub fn context(tag: u8, value: Value) -> Self {
        Self {
            tag: Tag::Context(tag),
            value,
        }
    }

    /// Encode to bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf);
        buf
    }

    /// Append the encoding to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        match &self.value {
            Value::Signed(v) => {
                let width = signed_width(*v);
                self.write_control(buf, TYPE_SIGNED | width_code(width));
                buf.extend_from_slice(&v.to_le_bytes()[..width]);
            }
            Value::Unsigned(v) => {
                let width = unsigned_width(*v);
                self.write_control(buf, TYPE_UNSIGNED | width_code(width));
                buf.extend_from_slice(&v.to_le_bytes()[..width]);
            }
            Value::Bool(false) => self.write_control(buf, TYPE_FALSE),
            Value::Bool(true) => self.write_control(buf, TYPE_TRUE),
            Value::Utf8(s) => self.write_string(buf, TYPE_UTF8, s.as_bytes()),
            Value::Bytes(b) => self.write_string(buf, TYPE_BYTES, b),
            Value::Null => self.write_control(buf, TYPE_NULL),
            Value::Structure(members) => self.write_container(buf, TYPE_STRUCTURE, members),
            Value::Array(members) => self.write_container(buf, TYPE_ARRAY, members),
            Value::List(members) => self.write_container(buf, TYPE_LIST, members),
        }
    }

    fn write_control(&self, buf: &mut Vec<u8>, element_type: u8) {
        match self.tag {
            Tag::Anonymous => buf.push(TAG_CONTROL_ANONYMOUS | element_type),
            Tag::Context(tag) => {
                buf.push(TAG_CONTROL_CONTEXT | element_type);
                buf.push(tag);
            }
        }
    }

    fn write_string(&self, buf: &mut Vec<u8>, base_type: u8, data: &[u8]) {
        let len = data.len() as u64;
        let width = unsigned_width(len);
        self.write_control(buf, base_type | width_code(width));
        buf.extend_from_slice(&len.to_le_bytes()[..width]);
        buf.extend_from_slice(data);
    }

    fn write_container(&self, buf: &mut Vec<u8>, container_type: u8, members: &[Element]) {
        self.write_control(buf, container_type);
        for member in members {
            member.encode_into(buf);
        }
        buf.push(TYPE_END_OF_CONTAINER);
    }

    /// Context tag number, if any.
    pub fn context_tag(&self) -> Option<u8> {
        match self.tag {
            Tag::Context(tag) => Some(tag),
            Tag::Anonymous => None,
        }
    }

    /// Unsigned integer value.
    pub fn as_u64(&self) -> Result<u64> {
        match self.value {
            Value::Unsigned(v) => Ok(v),
            _ => Err(self.type_error("unsigned integer")),
        }
    }

    /// Unsigned integer that must fit in a `u32`.
    pub fn as_u32(&self) -> Result<u32> {
        u32::try_from(self.as_u64()?)
            .map_err(|_| Error::Decode(format!("{:?}: value exceeds u32", self.tag)))
    }

    /// Unsigned integer that must fit in a `u16`.
    pub fn as_u16(&self) -> Result<u16> {
        u16::try_from(self.as_u64()?)
            .map_err(|_| Error::Decode(format!("{:?}: value exceeds u16", self.tag)))
    }

    /// Boolean value.
    pub fn as_bool(&self) -> Result<bool> {
        match self.value {
            Value::Bool(v) => Ok(v),
            _ => Err(self.type_error("boolean")),
        }
    }

    /// Octet string value.
    pub fn as_bytes(&self) -> Result<&[u8]> {
        match &self.value {
            Value::Bytes(v) => Ok(v),
            _ => Err(self.type_error("octet string")),
        }
    }

    /// Octet string of exactly `N` bytes.
    pub fn as_fixed_bytes<const N: usize>(&self) -> Result<[u8; N]> {
        let bytes = self.as_bytes()?;
        if bytes.len() != N {
            return Err(Error::Decode(format!(
                "{:?}: expected {} bytes, got {}",
                self.tag,
                N,
                bytes.len()
            )));
        }
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    /// Members of a structure.
    pub fn as_structure(&self) -> Result<&[Element]> {
        match &self.value {
            Value::Structure(members) => Ok(members),
            _ => Err(self.type_error("structure")),
        }
    }

    fn type_error(&self, expected: &str) -> Error {
        Error::Decode(format!("{:?}: expected {}", self.tag, expected))
    }
}

fn unsigned_width(v: u64) -> usize {
    if v <= u8::MAX as u64 {
        1
    } else if v <= u16::MAX as u64 {
        2
    } else if v <= u32::MAX as u64 {
        4
    } else {
        8
    }
}

fn signed_width(v: i64) -> usize {
    if i8::try_from(v).is_ok() {
        1
    } else if i16::try_from(v).is_ok() {
        2
    } else if i32::try_from(v).is_ok() {
        4
    } else {
        8
    }
}

fn width_code(width: usize) -> u8 {
    match width {
        1 => 0,
        2 => 1,
        4 => 2,
        _ => 3,
    }
}

/// Decode exactly one element spanning all of `data`.
pub fn decode(data: &[u8]) -> Result<Element> {
    let mut reader = Reader { data, pos: 0 };
    let element = reader
        .read_element(0)?
        .ok_or_else(|| Error::Decode("unexpected end-of-container".into()))?;

    if reader.pos != data.len() {
        return Err(Error::Decode(format!(
            "{} trailing bytes",
            data.len() - reader.pos
        )));
    }
    Ok(element)
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                Error::Decode(format!(
                    "truncated: need {} bytes at offset {}",
                    n, self.pos
                ))
            })?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn read_uint(&mut self, width: usize) -> Result<u64> {
        let bytes = self.take(width)?;
        let mut buf = [0u8; 8];
        buf[..width].copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    fn read_length(&mut self, width: usize) -> Result<usize> {
        let len = self.read_uint(width)?;
        usize::try_from(len).map_err(|_| Error::Decode(format!("length {} too large", len)))
    }

    /// `None` marks an end-of-container.
    fn read_element(&mut self, depth: usize) -> Result<Option<Element>> {
        let control = self.take(1)?[0];
        let element_type = control & 0x1F;

        if element_type == TYPE_END_OF_CONTAINER {
            if control != TYPE_END_OF_CONTAINER {
                return Err(Error::Decode("tagged end-of-container".into()));
            }
            return Ok(None);
        }

        let tag = match control & 0xE0 {
            TAG_CONTROL_ANONYMOUS => Tag::Anonymous,
            TAG_CONTROL_CONTEXT => Tag::Context(self.take(1)?[0]),
            other => {
                return Err(Error::Decode(format!(
                    "unsupported tag control {:#04x}",
                    other >> 5
                )))
            }
        };

        let value = match element_type {
            0x00..=0x03 => {
                let width = 1usize << element_type;
                let raw = self.read_uint(width)?;
                let shift = 64 - 8 * width as u32;
                Value::Signed(((raw << shift) as i64) >> shift)
            }
            0x04..=0x07 => Value::Unsigned(self.read_uint(1 << (element_type - TYPE_UNSIGNED))?),
            TYPE_FALSE => Value::Bool(false),
            TYPE_TRUE => Value::Bool(true),
            0x0C..=0x0F => {
                let len = self.read_length(1 << (element_type - TYPE_UTF8))?;
                let bytes = self.take(len)?;
                let s = core::str::from_utf8(bytes)
                    .map_err(|_| Error::Decode("invalid UTF-8 string".into()))?;
                Value::Utf8(s.to_owned())
            }
            0x10..=0x13 => {
                let len = self.read_length(1 << (element_type - TYPE_BYTES))?;
                Value::Bytes(self.take(len)?.to_vec())
            }
            TYPE_NULL => Value::Null,
            TYPE_STRUCTURE | TYPE_ARRAY | TYPE_LIST => {
                if depth >= MAX_CONTAINER_DEPTH {
                    return Err(Error::Decode("containers nested too deeply".into()));
                }
                let members = self.read_members(depth + 1)?;
                match element_type {
                    TYPE_STRUCTURE => {
                        if members.iter().any(|m| m.tag == Tag::Anonymous) {
                            return Err(Error::Decode("anonymous structure member".into()));
                        }
                        Value::Structure(members)
                    }
                    TYPE_ARRAY => {
                        if members.iter().any(|m| m.tag != Tag::Anonymous) {
                            return Err(Error::Decode("tagged array member".into()));
                        }
                        Value::Array(members)
                    }
                    _ => Value::List(members),
                }
            }
            other => {
                return Err(Error::Decode(format!(
                    "unsupported element type {:#04x}",
                    other
                )))
            }
        };

        Ok(Some(Element { tag, value }))
    }

    fn read_members(&mut self, depth: usize) -> Result<Vec<Element>> {
        let mut members = Vec::new();
        while let Some(member) = self.read_element(depth)? {
            members.push(member);
        }
        Ok(members)
    }
}

/// Context-tagged members of a structure, looked up by tag.
pub struct Fields<'a> {
    members: &'a [Element],
}

impl<'a> Fields<'a> {
    /// Members of `element`, rejecting unknown or repeated tags.
    pub fn strict(element: &'a Element, known: &[u8]) -> Result<Self> {
        let fields = Self::lenient(element)?;
        for (i, member) in fields.members.iter().enumerate() {
            let tag = member
                .context_tag()
                .ok_or_else(|| Error::Decode("non-context member".into()))?;
            if !known.contains(&tag) {
                return Err(Error::Decode(format!("unknown field tag {}", tag)));
            }
            if fields.members[..i].iter().any(|m| m.tag == member.tag) {
                return Err(Error::Decode(format!("duplicate field tag {}", tag)));
            }
        }
        Ok(fields)
    }

    /// Members of `element`; unknown tags are ignored.
    pub fn lenient(element: &'a Element) -> Result<Self> {
        Ok(Self {
            members: element.as_structure()?,
        })
    }

    /// Member with context tag `tag`, if present.
    pub fn get(&self, tag: u8) -> Option<&'a Element> {
        self.members.iter().find(|m| m.tag == Tag::Context(tag))
    }

    /// Member with context tag `tag`.
    pub fn required(&self, tag: u8) -> Result<&'a Element> {
        self.get(tag)
            .ok_or_else(|| Error::Decode(format!("missing field tag {}", tag)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_unsigned_encoding() {
        let cases: [(u64, &str); 5] = [
            (0, "2401 00"),
            (0xFF, "2401 ff"),
            (0x100, "2501 0001"),
            (0x1_0000, "2601 00000100"),
            (0x1_0000_0000, "2701 0000000001000000"),
        ];
        for (value, expected) in cases {
            let bytes = Element::context(1, Value::Unsigned(value)).encode();
            assert_eq!(hex::encode(&bytes), expected.replace(' ', ""));
            assert_eq!(decode(&bytes).unwrap().as_u64().unwrap(), value);
        }
    }

    #[test]
    fn test_signed_sign_extension() {
        for value in [-1i64, -128, 127, -129, 40000, i64::MIN] {
            let bytes = Element::anonymous(Value::Signed(value)).encode();
            assert_eq!(decode(&bytes).unwrap().value, Value::Signed(value));
        }
        // 0xFF as one signed byte is -1
        assert_eq!(decode(&[0x00, 0xFF]).unwrap().value, Value::Signed(-1));
    }

    #[test]
    fn test_structure_encoding() {
        let element = Element::anonymous(Value::Structure(vec![
            Element::context(1, Value::Bytes(vec![0xAA, 0xBB])),
            Element::context(2, Value::Bool(true)),
            Element::context(3, Value::Null),
        ]));
        let bytes = element.encode();
        assert_eq!(hex::encode(&bytes), "153001 02aabb 2902 3403 18".replace(' ', ""));
        assert_eq!(decode(&bytes).unwrap(), element);
    }

    #[test]
    fn test_wide_string_lengths_accepted() {
        // Octet string with a 2-byte length prefix
        let bytes = [0x11, 0x02, 0x00, 0x01, 0x02];
        assert_eq!(decode(&bytes).unwrap().as_bytes().unwrap(), &[1, 2]);

        let utf8 = [0x0C, 0x02, b'o', b'k'];
        assert_eq!(decode(&utf8).unwrap().value, Value::Utf8("ok".into()));
    }

    #[test]
    fn test_rejects_truncation() {
        let bytes = Element::anonymous(Value::Structure(vec![Element::context(
            1,
            Value::Bytes(vec![7; 32]),
        )]))
        .encode();

        for len in 0..bytes.len() {
            assert!(decode(&bytes[..len]).is_err(), "prefix of {} bytes", len);
        }
    }

    #[test]
    fn test_rejects_trailing_bytes() {
        assert!(matches!(decode(&[0x08, 0x08]), Err(Error::Decode(_))));
    }

    #[test]
    fn test_rejects_unsupported_forms() {
        // Common-profile tag, float, tagged end-of-container, bare end-of-container
        for bytes in [
            &[0x44, 0x01, 0x00, 0x01][..],
            &[0x0A, 0, 0, 0, 0][..],
            &[0x15, 0x38][..],
            &[0x18][..],
            &[0x0C, 0x01, 0xFF][..],
        ] {
            assert!(decode(bytes).is_err(), "{:02x?}", bytes);
        }
    }

    #[test]
    fn test_huge_length_rejected() {
        let bytes = [0x13, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn test_nesting_limit() {
        let nested = |depth: usize| {
            let mut bytes = vec![0x17; depth];
            bytes.extend(vec![0x18; depth]);
            bytes
        };
        assert!(decode(&nested(MAX_CONTAINER_DEPTH)).is_ok());
        assert!(decode(&nested(MAX_CONTAINER_DEPTH + 1)).is_err());
    }

    #[test]
    fn test_member_tag_rules() {
        // Anonymous member in a structure
        assert!(decode(&[0x15, 0x08, 0x18]).is_err());
        // Tagged member in an array
        assert!(decode(&[0x16, 0x28, 0x01, 0x18]).is_err());
    }

    #[test]
    fn test_fields_strict_and_lenient() {
        let element = Element::anonymous(Value::Structure(vec![
            Element::context(1, Value::Unsigned(5)),
            Element::context(9, Value::Unsigned(6)),
        ]));

        assert!(Fields::strict(&element, &[1]).is_err());
        let fields = Fields::strict(&element, &[1, 9]).unwrap();
        assert_eq!(fields.required(9).unwrap().as_u16().unwrap(), 6);

        let lenient = Fields::lenient(&element).unwrap();
        assert_eq!(lenient.required(1).unwrap().as_u64().unwrap(), 5);
        assert!(lenient.get(2).is_none());
        assert!(lenient.required(2).is_err());

        let duplicate = Element::anonymous(Value::Structure(vec![
            Element::context(1, Value::Unsigned(5)),
            Element::context(1, Value::Unsigned(6)),
        ]));
        assert!(Fields::strict(&duplicate, &[1]).is_err());
    }

    #[test]
    fn test_typed_accessors() {
        let big = Element::context(1, Value::Unsigned(0x1_0000));
        assert!(big.as_u16().is_err());
        assert_eq!(big.as_u32().unwrap(), 0x1_0000);
        assert!(big.as_bool().is_err());
        assert!(big.as_bytes().is_err());

        let bytes = Element::context(2, Value::Bytes(vec![1, 2, 3]));
        assert_eq!(bytes.as_fixed_bytes::<3>().unwrap(), [1, 2, 3]);
        assert!(bytes.as_fixed_bytes::<4>().is_err());
    }
}
