//! Bounded pool of reusable commit table clients.

use crate::commit_table::CommitTable;
use crate::error::{CoreError, CoreResult};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Opens a new commit table client for the given commit table name.
pub type CommitTableFactory =
    Box<dyn Fn(&str) -> CoreResult<Box<dyn CommitTable>> + Send + Sync>;

/// A multi-producer, multi-consumer pool of commit table clients.
///
/// At most `max_size` clients exist at once. A client is handed to exactly
/// one caller at a time and returns to the pool when its [`PooledClient`]
/// guard drops, whether the caller succeeded or not. Idle clients are
/// health-checked before reuse; unhealthy ones are closed and replaced.
pub struct CommitTableClientPool {
    factory: CommitTableFactory,
    table_name: String,
    idle_tx: Sender<Box<dyn CommitTable>>,
    idle_rx: Receiver<Box<dyn CommitTable>>,
    live: AtomicUsize,
    max_size: usize,
    acquire_timeout: Duration,
}

impl CommitTableClientPool {
    /// Creates an empty pool; clients are opened lazily.
    pub fn new(
        factory: CommitTableFactory,
        table_name: impl Into<String>,
        max_size: usize,
        acquire_timeout: Duration,
    ) -> Self {
        let max_size = max_size.max(1);
        let (idle_tx, idle_rx) = channel::bounded(max_size);
        Self {
            factory,
            table_name: table_name.into(),
            idle_tx,
            idle_rx,
            live: AtomicUsize::new(0),
            max_size,
            acquire_timeout,
        }
    }

    /// Returns the number of clients currently open.
    #[must_use]
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Returns the number of idle clients.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.idle_rx.len()
    }

    /// Takes a client, opening one if the pool is below its bound.
    ///
    /// # Errors
    ///
    /// - Whatever the factory returns when opening a client fails
    /// - [`CoreError::PoolExhausted`] if no client frees up in time
    pub fn acquire(&self) -> CoreResult<PooledClient<'_>> {
        let started = Instant::now();
        loop {
            if let Ok(client) = self.idle_rx.try_recv() {
                if let Some(client) = self.checked(client) {
                    return Ok(self.guard(client));
                }
                continue;
            }

            if self.try_reserve() {
                debug!(table = %self.table_name, "opening commit table client");
                return match (self.factory)(&self.table_name) {
                    Ok(client) => Ok(self.guard(client)),
                    Err(e) => {
                        self.live.fetch_sub(1, Ordering::SeqCst);
                        Err(e)
                    }
                };
            }

            let remaining = self.acquire_timeout.saturating_sub(started.elapsed());
            match self.idle_rx.recv_timeout(remaining) {
                Ok(client) => {
                    if let Some(client) = self.checked(client) {
                        return Ok(self.guard(client));
                    }
                }
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {
                    return Err(CoreError::PoolExhausted {
                        waited_ms: started.elapsed().as_millis(),
                    });
                }
            }
        }
    }

    /// Closes every idle client. Clients in use are closed when returned.
    pub fn close(&self) {
        let mut closed = 0usize;
        while let Ok(client) = self.idle_rx.try_recv() {
            client.close();
            self.live.fetch_sub(1, Ordering::SeqCst);
            closed += 1;
        }
        info!(table = %self.table_name, closed, "closed pooled commit table clients");
    }

    fn try_reserve(&self) -> bool {
        self.live
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |live| {
                (live < self.max_size).then_some(live + 1)
            })
            .is_ok()
    }

    fn checked(&self, client: Box<dyn CommitTable>) -> Option<Box<dyn CommitTable>> {
        if client.is_healthy() {
            Some(client)
        } else {
            warn!(table = %self.table_name, "discarding unhealthy commit table client");
            client.close();
            self.live.fetch_sub(1, Ordering::SeqCst);
            None
        }
    }

    fn guard(&self, client: Box<dyn CommitTable>) -> PooledClient<'_> {
        PooledClient {
            pool: self,
            client: Some(client),
        }
    }

    fn release(&self, client: Box<dyn CommitTable>) {
        let Some(client) = self.checked(client) else {
            return;
        };
        if let Err(returned) = self.idle_tx.try_send(client) {
            // Capacity equals the live bound, so this only happens on misuse.
            let client = returned.into_inner();
            client.close();
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl fmt::Debug for CommitTableClientPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommitTableClientPool")
            .field("table_name", &self.table_name)
            .field("live", &self.live())
            .field("idle", &self.idle())
            .field("max_size", &self.max_size)
            .finish()
    }
}

/// A commit table client on loan from a [`CommitTableClientPool`].
pub struct PooledClient<'a> {
    pool: &'a CommitTableClientPool,
    client: Option<Box<dyn CommitTable>>,
}

impl Deref for PooledClient<'_> {
    type Target = dyn CommitTable;

    fn deref(&self) -> &Self::Target {
        match &self.client {
            Some(client) => client.as_ref(),
            // Only taken in drop.
            None => unreachable!("pooled client used after release"),
        }
    }
}

impl Drop for PooledClient<'_> {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            self.pool.release(client);
        }
    }
}
