//! In-process client for [`TsoServer`].

use crate::config::ClientConfig;
use crate::connection::{Connection, Reply, Response};
use crate::error::{TsoError, TsoResult};
use crate::server::TsoServer;
use crossbeam::channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use sitx_core::{CommitOutcome, CoreError, CoreResult, Timestamp, TsoClient};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// A [`TsoClient`] talking to a server in the same process.
///
/// Each client owns one connection and keeps at most one request in
/// flight on it. A request that times out has an unknown outcome; its late
/// reply is recognised by request id and discarded.
pub struct LocalTsoClient {
    server: Arc<TsoServer>,
    connection: Connection,
    replies: Receiver<Reply>,
    /// Next request id; held for the whole round trip.
    next_request: Mutex<u64>,
    config: ClientConfig,
}

impl LocalTsoClient {
    /// Opens a connection to `server`.
    #[must_use]
    pub fn connect(server: Arc<TsoServer>, config: ClientConfig) -> Self {
        let (connection, replies) = server.connect();
        Self {
            server,
            connection,
            replies,
            next_request: Mutex::new(0),
            config,
        }
    }

    /// Returns the server.
    #[must_use]
    pub fn server(&self) -> &Arc<TsoServer> {
        &self.server
    }

    fn call<F>(&self, send: F) -> TsoResult<Response>
    where
        F: FnOnce(&TsoServer, &Connection, u64) -> TsoResult<()>,
    {
        let mut next_request = self.next_request.lock();
        let request_id = *next_request;
        *next_request += 1;

        send(&self.server, &self.connection, request_id)?;

        let started = Instant::now();
        loop {
            let remaining = self
                .config
                .request_timeout
                .saturating_sub(started.elapsed());
            match self.replies.recv_timeout(remaining) {
                Ok(reply) if reply.request_id == request_id => return Ok(reply.response),
                Ok(stale) => {
                    debug!(
                        connection = self.connection.id(),
                        request_id = stale.request_id,
                        "discarding reply to abandoned request"
                    );
                }
                Err(RecvTimeoutError::Timeout) => {
                    return Err(TsoError::Timeout {
                        waited_ms: started.elapsed().as_millis(),
                    });
                }
                // The connection holds the sender, so this cannot happen.
                Err(RecvTimeoutError::Disconnected) => return Err(TsoError::Shutdown),
            }
        }
    }
}

fn unexpected(request: &str, response: Response) -> CoreError {
    CoreError::internal_defect(format!("unexpected reply {response:?} to {request} request"))
}

impl TsoClient for LocalTsoClient {
    fn start_timestamp(&self) -> CoreResult<Timestamp> {
        match self.call(|server, conn, id| server.request_timestamp(conn, id))? {
            Response::Timestamp(ts) => Ok(ts),
            other => Err(unexpected("timestamp", other)),
        }
    }

    fn commit(&self, start_ts: Timestamp) -> CoreResult<CommitOutcome> {
        match self.call(|server, conn, id| server.request_commit(conn, id, start_ts))? {
            Response::Committed {
                start_ts: answered,
                commit_ts,
            } if answered == start_ts => Ok(CommitOutcome::Committed(commit_ts)),
            Response::Aborted { start_ts: answered } if answered == start_ts => {
                Ok(CommitOutcome::Aborted)
            }
            other => Err(unexpected("commit", other)),
        }
    }

    fn abort(&self, start_ts: Timestamp) -> CoreResult<()> {
        match self.call(|server, conn, id| server.request_abort(conn, id, start_ts))? {
            Response::Aborted { start_ts: answered } if answered == start_ts => Ok(()),
            other => Err(unexpected("abort", other)),
        }
    }
}
