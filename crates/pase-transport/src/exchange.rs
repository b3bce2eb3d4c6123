//! Exchange abstraction and the in-memory loopback.

use async_trait::async_trait;
use pase_core::Message;
use tokio::sync::{mpsc, Mutex};

use crate::{Error, Result};

/// Loopback channel depth; the handshake never has more than one message
/// in flight per direction.
const MEMORY_CHANNEL_CAPACITY: usize = 8;

/// Ordered, message-oriented channel to one peer.
///
/// Delivers each message at most once and in send order.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Send a message to the peer.
    async fn send(&self, message: Message) -> Result<()>;

    /// Receive the next message; `None` once the peer has closed.
    async fn recv(&self) -> Result<Option<Message>>;
}

/// One end of an in-process exchange pair.
pub struct MemoryExchange {
    tx: mpsc::Sender<Message>,
    rx: Mutex<mpsc::Receiver<Message>>,
}

impl MemoryExchange {
    /// Create two connected ends.
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::channel(MEMORY_CHANNEL_CAPACITY);
        let (b_tx, a_rx) = mpsc::channel(MEMORY_CHANNEL_CAPACITY);

        (
            Self {
                tx: a_tx,
                rx: Mutex::new(a_rx),
            },
            Self {
                tx: b_tx,
                rx: Mutex::new(b_rx),
            },
        )
    }
}

#[async_trait]
impl Exchange for MemoryExchange {
    async fn send(&self, message: Message) -> Result<()> {
        self.tx
            .send(message)
            .await
            .map_err(|_| Error::ConnectionClosed)
    }

    async fn recv(&self) -> Result<Option<Message>> {
        Ok(self.rx.lock().await.recv().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pase_core::{Pake3, Payload};

    #[tokio::test]
    async fn test_memory_pair_delivers_in_order() {
        let (a, b) = MemoryExchange::pair();

        a.send(Pake3 { ca: [1; 32] }.to_message()).await.unwrap();
        a.send(Pake3 { ca: [2; 32] }.to_message()).await.unwrap();

        let first: Pake3 = b.recv().await.unwrap().unwrap().decode().unwrap();
        let second: Pake3 = b.recv().await.unwrap().unwrap().decode().unwrap();
        assert_eq!(first.ca, [1; 32]);
        assert_eq!(second.ca, [2; 32]);
    }

    #[tokio::test]
    async fn test_memory_pair_close() {
        let (a, b) = MemoryExchange::pair();
        drop(a);

        assert!(b.recv().await.unwrap().is_none());
        assert!(matches!(
            b.send(Pake3 { ca: [0; 32] }.to_message()).await,
            Err(Error::ConnectionClosed)
        ));
    }
}
