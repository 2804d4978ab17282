//! Transport collaborator interface.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TransportResult;
use crate::session::{Origin, Session};

/// An opaque handle used to send replies through one bot account.
///
/// The engine hands these out through `Context::sender` but never calls
/// them itself.
#[async_trait]
pub trait Sender: Send + Sync {
    /// The bot account this sender speaks for.
    fn self_id(&self) -> i64;

    /// Sends a plain-text reply to wherever `session` came from.
    async fn send(&self, session: &Session, message: &str) -> TransportResult<()>;
}

/// Type alias for a shared sender.
pub type BoxedSender = Arc<dyn Sender>;

/// The messaging backend as seen by the engine.
pub trait Transport: Send + Sync {
    /// Computes the origin classification of a record that lacks one.
    ///
    /// The default infers it from the ids the record carries.
    fn classify(&self, session: &Session) -> Origin {
        Origin::infer(session)
    }

    /// Returns the sender for a bot account, if that bot is known.
    fn sender(&self, bot_id: i64) -> Option<BoxedSender>;
}

/// Type alias for a shared transport.
pub type BoxedTransport = Arc<dyn Transport>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use std::collections::HashMap;

    struct NullSender(i64);

    #[async_trait]
    impl Sender for NullSender {
        fn self_id(&self) -> i64 {
            self.0
        }

        async fn send(&self, _session: &Session, _message: &str) -> TransportResult<()> {
            Err(TransportError::SendFailed("offline".into()))
        }
    }

    struct MapTransport(HashMap<i64, BoxedSender>);

    impl Transport for MapTransport {
        fn sender(&self, bot_id: i64) -> Option<BoxedSender> {
            self.0.get(&bot_id).cloned()
        }
    }

    #[tokio::test]
    async fn test_default_classify_and_sender_lookup() {
        let mut senders: HashMap<i64, BoxedSender> = HashMap::new();
        senders.insert(1, Arc::new(NullSender(1)));
        let transport = MapTransport(senders);

        let session = Session::new().with_self_id(1).with_user_id(2);
        assert_eq!(transport.classify(&session), Origin::Private);

        let sender = transport.sender(1).unwrap();
        assert_eq!(sender.self_id(), 1);
        assert!(sender.send(&session, "hi").await.is_err());
        assert!(transport.sender(2).is_none());
    }
}
