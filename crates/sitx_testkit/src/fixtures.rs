//! A complete in-process deployment for tests.
//!
//! [`TestCluster`] wires a timestamp oracle, a commit table, a versioned
//! store and a transaction manager together the way a real deployment
//! does, with every collaborator kept in memory and reachable from the
//! test.

use sitx_core::{
    CommitTable, CompactionStats, Compactor, CompactorConfig, InMemoryCommitTable, KvBackend,
    Timestamp, TransactionManager, TransactionManagerConfig, TransactionalTable, TsoClient,
};
use sitx_storage::{
    CompactionKind, FamilyDescriptor, InMemoryLog, InMemoryStore, LogBackend, VersionedStore,
};
use sitx_tso::wal::WalWriter;
use sitx_tso::{encode_events, ClientConfig, LocalTsoClient, PipelineConfig, TsoServer, WalEvent};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Table created by every cluster.
pub const TABLE: &str = "data";

/// Transaction-managed family of [`TABLE`].
pub const FAMILY: &str = "cf";

/// Plain family of [`TABLE`], ignored by the garbage collector.
pub const RAW_FAMILY: &str = "raw";

/// Builder for [`TestCluster`].
#[derive(Debug, Clone, Default)]
pub struct ClusterBuilder {
    pipeline: PipelineConfig,
    client: ClientConfig,
    manager: TransactionManagerConfig,
    first_timestamp: Option<u64>,
}

impl ClusterBuilder {
    /// Sets the pipeline configuration.
    #[must_use]
    pub fn pipeline(mut self, config: PipelineConfig) -> Self {
        self.pipeline = config;
        self
    }

    /// Sets the oracle client configuration.
    #[must_use]
    pub fn client(mut self, config: ClientConfig) -> Self {
        self.client = config;
        self
    }

    /// Sets the transaction manager configuration.
    #[must_use]
    pub fn manager(mut self, config: TransactionManagerConfig) -> Self {
        self.manager = config;
        self
    }

    /// Makes the first granted timestamp `ts`.
    #[must_use]
    pub fn first_timestamp(mut self, ts: u64) -> Self {
        self.first_timestamp = Some(ts);
        self
    }

    /// Builds a cluster over a fresh in-memory log.
    pub fn build(self) -> TestCluster {
        let log = InMemoryLog::new();
        self.build_with_log(log.clone(), Box::new(log))
    }

    /// Builds a cluster whose oracle writes through `backend`.
    ///
    /// `log` must observe the same bytes as `backend`; it is what the test
    /// inspects and what [`TestCluster::restart`] recovers from.
    pub fn build_with_log(self, log: InMemoryLog, mut backend: Box<dyn LogBackend>) -> TestCluster {
        if let Some(first) = self.first_timestamp {
            let seed = encode_events(&[WalEvent::Timestamp {
                start_ts: Timestamp::new(first.saturating_sub(1)),
            }]);
            let mut writer = WalWriter::new(backend, true).expect("open seed writer");
            writer.append_batch(&seed).expect("seed log");
            backend = writer.into_inner();
        }

        let store = Arc::new(InMemoryStore::new());
        store.create_table(
            TABLE,
            vec![
                FamilyDescriptor::transactional(FAMILY),
                FamilyDescriptor::new(RAW_FAMILY),
            ],
        );
        let commit_table = InMemoryCommitTable::new();

        TestCluster::assemble(self, log, backend, store, commit_table)
    }
}

/// An oracle, a commit table, a store and a manager.
pub struct TestCluster {
    /// Bytes of the oracle's write-ahead log.
    pub log: InMemoryLog,
    /// The store holding data and shadow cells.
    pub store: Arc<InMemoryStore>,
    /// The commit table shared by oracle and clients.
    pub commit_table: InMemoryCommitTable,
    /// The oracle.
    pub server: Arc<TsoServer>,
    /// The manager's oracle client.
    pub tso: Arc<LocalTsoClient>,
    /// The transaction manager.
    pub manager: TransactionManager<KvBackend>,
    builder: ClusterBuilder,
}

impl TestCluster {
    /// Creates a cluster with default configuration.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts building a cluster.
    pub fn builder() -> ClusterBuilder {
        ClusterBuilder::default()
    }

    fn assemble(
        builder: ClusterBuilder,
        log: InMemoryLog,
        backend: Box<dyn LogBackend>,
        store: Arc<InMemoryStore>,
        commit_table: InMemoryCommitTable,
    ) -> Self {
        let server = Arc::new(
            TsoServer::open(
                backend,
                Box::new(commit_table.client()),
                builder.pipeline.clone(),
            )
            .expect("open timestamp oracle"),
        );
        let tso = Arc::new(LocalTsoClient::connect(
            Arc::clone(&server),
            builder.client.clone(),
        ));
        let manager = TransactionManager::new(
            Arc::new(KvBackend::new(store.clone())),
            tso.clone() as Arc<dyn TsoClient>,
            Arc::new(commit_table.client()) as Arc<dyn CommitTable>,
            builder.manager.clone(),
        );

        Self {
            log,
            store,
            commit_table,
            server,
            tso,
            manager,
            builder,
        }
    }

    /// Returns the transactional view of [`TABLE`].
    pub fn table(&self) -> TransactionalTable<'_> {
        TransactionalTable::new(&self.manager, TABLE)
    }

    /// Stops the oracle and starts a new one over the same log, store and
    /// commit table.
    pub fn restart(self) -> Self {
        self.server.shutdown();
        let Self {
            log,
            store,
            commit_table,
            builder,
            ..
        } = self;
        let backend = Box::new(log.clone());
        Self::assemble(
            ClusterBuilder {
                first_timestamp: None,
                ..builder
            },
            log,
            backend,
            store,
            commit_table,
        )
    }

    /// Advances the low watermark and waits until the commit table has it.
    pub fn advance_low_watermark(&self, ts: u64) {
        let ts = Timestamp::new(ts);
        self.server
            .advance_low_watermark(ts)
            .expect("advance low watermark");

        let deadline = Instant::now() + Duration::from_secs(5);
        while self.commit_table.low_watermark() < ts {
            assert!(Instant::now() < deadline, "low watermark {ts} never became durable");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Creates a compactor reading this cluster's commit table.
    pub fn compactor(&self, config: CompactorConfig) -> Compactor {
        let table = self.commit_table.clone();
        Compactor::new(
            config,
            Box::new(move |_| Ok(Box::new(table.client()) as Box<dyn CommitTable>)),
        )
    }

    /// Compacts the transaction-managed family with default settings.
    pub fn compact(&self, kind: CompactionKind) -> CompactionStats {
        self.compactor(CompactorConfig::default())
            .compact(self.store.as_ref(), TABLE, FAMILY.as_bytes(), kind)
            .expect("compaction")
            .expect("family is transactional")
    }

    /// Returns the raw value at an exact version of [`TABLE`].
    pub fn raw_get(&self, key: &sitx_storage::CellKey, version: u64) -> Option<Vec<u8>> {
        self.store.get(TABLE, key, version).expect("store read")
    }
}

impl Default for TestCluster {
    fn default() -> Self {
        Self::new()
    }
}

