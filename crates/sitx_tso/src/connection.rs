//! Reply routing back to requesting connections.

use crossbeam::channel::{self, Receiver, Sender};
use sitx_core::Timestamp;
use tracing::debug;

/// The oracle's answer to one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// A start timestamp was granted.
    Timestamp(Timestamp),
    /// The transaction committed.
    Committed {
        /// Start timestamp of the transaction.
        start_ts: Timestamp,
        /// Its commit timestamp.
        commit_ts: Timestamp,
    },
    /// The transaction aborted.
    Aborted {
        /// Start timestamp of the transaction.
        start_ts: Timestamp,
    },
}

/// A response tagged with the request it answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    /// Caller-chosen request identifier.
    pub request_id: u64,
    /// The response.
    pub response: Response,
}

/// The sending half of a client connection.
///
/// Replies are queued without bound so the pipeline consumer never waits on
/// a slow client. Replies to a connection whose receiver is gone are
/// dropped.
#[derive(Debug, Clone)]
pub struct Connection {
    id: u64,
    sender: Sender<Reply>,
}

impl Connection {
    /// Creates a connection and the receiver its replies arrive on.
    #[must_use]
    pub fn open(id: u64) -> (Self, Receiver<Reply>) {
        let (sender, receiver) = channel::unbounded();
        (Self { id, sender }, receiver)
    }

    /// Returns the connection id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Hands a reply to the client. Returns false if the client went away.
    pub(crate) fn deliver(&self, reply: Reply) -> bool {
        if self.sender.send(reply).is_ok() {
            return true;
        }
        debug!(
            connection = self.id,
            request_id = reply.request_id,
            "connection closed, reply discarded"
        );
        false
    }
}
