//! Question answering over uploaded tabular data
//!
//! Questions are either compiled into a small typed analytics plan and run
//! deterministically against the loaded dataset, or answered from retrieved
//! descriptions of the dataset.
//!
//! ## Architecture
//!
//! ```text
//! question → QueryOrchestrator ─┬─ follow-up ──────────────▶ LLM
//!                               └─ QueryPlanner ─┬─ explain ─▶ Retriever → LLM
//!                                                └─ analytics ▶ AnalyticsEngine → LLM
//! ```
//!
//! ## Backend Selection
//!
//! Set `AGENT_BACKEND` environment variable:
//! - `anthropic` (default): Anthropic Claude API
//! - `openai`: OpenAI API
//! - `gemini`: Google Gemini API
//!
//! Embeddings come from `EMBEDDING_BACKEND` (`openai` or `gemini`).

// LLM client abstraction
pub mod anthropic_client;
pub mod backend;
pub mod client_factory;
pub mod embedder;
pub mod gemini_client;
pub mod llm_client;
pub mod openai_client;

// Data and query pipeline
pub mod config;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod plan;
pub mod planner;
pub mod retriever;
pub mod schema;
pub mod state;
pub mod vector_store;
pub mod worker_pool;

// Re-exports for convenience
pub use backend::{AgentBackend, EmbeddingBackend};
pub use client_factory::{create_embedder, create_llm_client};
pub use config::AssistantConfig;
pub use dataset::{CellValue, Dataset, DatasetLoader, FileDatasetLoader};
pub use embedder::Embedder;
pub use engine::{AnalyticsEngine, QueryResult};
pub use error::{BuildError, CompileError, QueryError};
pub use llm_client::LlmClient;
pub use orchestrator::{Answer, AnswerRoute, ChatMessage, ChatRole, QueryOrchestrator};
pub use plan::{AggregateKind, Plan, SortOrder, Step};
pub use state::{DatasetState, InitOutcome, StatusSnapshot};
