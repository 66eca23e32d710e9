//! Dataset state
//!
//! Owns the current [`DatasetSnapshot`] and rebuilds it from the data
//! directory. Readers clone the snapshot `Arc` and never observe a partial
//! build; builds are serialized by a mutex.
//!
//! ```text
//! Uninitialized ─▶ Building ─▶ Ready ─▶ Building ─▶ Ready
//!                     │                    │
//!                     └────▶ Failed ◀──────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::config::AssistantConfig;
use crate::dataset::{list_dataset_files, Dataset, DatasetLoader};
use crate::embedder::Embedder;
use crate::engine::AnalyticsEngine;
use crate::error::BuildError;
use crate::llm_client::LlmClient;
use crate::planner::{load_template, QueryPlanner};
use crate::retriever::{memory_texts, Retriever};
use crate::schema::{build_schema, Schema};
use crate::worker_pool::WorkerPool;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStatus {
    Uninitialized,
    Building,
    Ready,
    /// Last build failed; holds the error message
    Failed(String),
}

/// Everything built from one load of the data directory. Immutable.
pub struct DatasetSnapshot {
    dataset: Arc<Dataset>,
    schema: Arc<Schema>,
    engine: AnalyticsEngine,
    planner: QueryPlanner,
    retriever: Option<Retriever>,
    files: Vec<PathBuf>,
}

impl DatasetSnapshot {
    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn engine(&self) -> &AnalyticsEngine {
        &self.engine
    }

    pub fn planner(&self) -> &QueryPlanner {
        &self.planner
    }

    /// `None` when the retrieval memory could not be built
    pub fn retriever(&self) -> Option<&Retriever> {
        self.retriever.as_ref()
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

/// Serializable summary for status endpoints and the CLI
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub ready: bool,
    pub files_loaded: usize,
    pub row_count: usize,
    pub column_count: usize,
    pub retriever_available: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// Ready with the same file count; nothing rebuilt
    AlreadyReady,
    Built,
}

pub struct DatasetState {
    config: AssistantConfig,
    loader: Arc<dyn DatasetLoader>,
    llm: Arc<dyn LlmClient>,
    embedder: Arc<dyn Embedder>,
    workers: WorkerPool,
    planner_template: String,
    current: RwLock<Option<Arc<DatasetSnapshot>>>,
    status: RwLock<BuildStatus>,
    build_lock: Mutex<()>,
}

impl DatasetState {
    /// Fails only if a configured planner template cannot be read
    pub fn new(
        config: AssistantConfig,
        loader: Arc<dyn DatasetLoader>,
        llm: Arc<dyn LlmClient>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, BuildError> {
        let planner_template = load_template(config.planner_prompt_path.as_deref())?;
        let workers = WorkerPool::new(config.workers);

        Ok(Self {
            config,
            loader,
            llm,
            embedder,
            workers,
            planner_template,
            current: RwLock::new(None),
            status: RwLock::new(BuildStatus::Uninitialized),
            build_lock: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &AssistantConfig {
        &self.config
    }

    pub fn llm(&self) -> &Arc<dyn LlmClient> {
        &self.llm
    }

    pub fn workers(&self) -> &WorkerPool {
        &self.workers
    }

    /// Current snapshot, if any. The read lock is released before returning.
    pub async fn snapshot(&self) -> Option<Arc<DatasetSnapshot>> {
        self.current.read().await.clone()
    }

    pub async fn is_ready(&self) -> bool {
        self.current.read().await.is_some()
    }

    pub async fn build_status(&self) -> BuildStatus {
        self.status.read().await.clone()
    }

    pub async fn status(&self) -> StatusSnapshot {
        match self.snapshot().await {
            Some(snapshot) => StatusSnapshot {
                ready: true,
                files_loaded: snapshot.files.len(),
                row_count: snapshot.dataset.row_count(),
                column_count: snapshot.dataset.column_count(),
                retriever_available: snapshot.retriever.is_some(),
            },
            None => StatusSnapshot::default(),
        }
    }

    /// Build the snapshot from the data directory.
    ///
    /// With no candidate files the current state is left as it is. When
    /// `force` is false and the loaded file count still matches, nothing is
    /// rebuilt. A failed build discards the previous snapshot.
    pub async fn initialize(&self, force: bool) -> Result<InitOutcome, BuildError> {
        let _guard = self.build_lock.lock().await;

        let files = list_dataset_files(&self.config.data_dir)?;
        if files.is_empty() {
            warn!("No dataset files found in {}", self.config.data_dir.display());
            return Err(BuildError::NoFiles(self.config.data_dir.clone()));
        }

        if !force {
            if let Some(current) = self.snapshot().await {
                if current.files.len() == files.len() {
                    info!("Dataset already initialized");
                    return Ok(InitOutcome::AlreadyReady);
                }
            }
        }

        info!("Building dataset state from {} files", files.len());
        *self.status.write().await = BuildStatus::Building;

        match self.build(files).await {
            Ok(snapshot) => {
                *self.current.write().await = Some(Arc::new(snapshot));
                *self.status.write().await = BuildStatus::Ready;
                info!("Dataset state ready");
                Ok(InitOutcome::Built)
            }
            Err(e) => {
                error!("Dataset build failed: {}", e);
                *self.current.write().await = None;
                *self.status.write().await = BuildStatus::Failed(e.to_string());
                Err(e)
            }
        }
    }

    /// Force a rebuild, e.g. after files were added or removed
    pub async fn rebuild(&self) -> Result<InitOutcome, BuildError> {
        info!("Rebuilding dataset state");
        self.initialize(true).await
    }

    async fn build(&self, files: Vec<PathBuf>) -> Result<DatasetSnapshot, BuildError> {
        let loader = self.loader.clone();
        let paths = files.clone();
        let dataset = self.workers.run(move || loader.load(&paths)).await??;
        info!(
            "Loaded {} rows, {} columns",
            dataset.row_count(),
            dataset.column_count()
        );

        let schema = build_schema(dataset.columns())?;
        info!("Schema built: {} columns", schema.len());

        let dataset = Arc::new(dataset);
        let schema = Arc::new(schema);
        let engine = AnalyticsEngine::new(dataset.clone(), schema.clone());
        let planner = QueryPlanner::new(
            &schema,
            &self.planner_template,
            self.llm.clone(),
            self.config.llm_timeout,
        );

        let retriever = match Retriever::build(
            memory_texts(&schema, &dataset),
            self.embedder.clone(),
            self.config.top_k,
            self.config.embed_timeout,
        )
        .await
        {
            Ok(retriever) => Some(retriever),
            Err(e) => {
                warn!("Retriever disabled: {}", e);
                None
            }
        };

        Ok(DatasetSnapshot {
            dataset,
            schema,
            engine,
            planner,
            retriever,
            files,
        })
    }
}
