//! Retriever and retrieval memory
//!
//! The retrieval memory is a handful of short documents describing the
//! dataset: one per schema entry plus one summary. They are embedded once per
//! build and searched for every explain question.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::dataset::Dataset;
use crate::embedder::Embedder;
use crate::error::RetrievalError;
use crate::llm_client::call_with_timeout;
use crate::schema::Schema;
use crate::vector_store::VectorStore;

/// One document per schema entry
pub fn schema_docs(schema: &Schema) -> Vec<String> {
    schema
        .entries()
        .iter()
        .map(|e| format!("{} refers to the column '{}' in the dataset.", e.key, e.column))
        .collect()
}

/// Overview of the dataset's shape and columns
pub fn dataset_summary(dataset: &Dataset) -> String {
    format!(
        "This dataset contains {} rows and {} columns. Its columns are: {}.",
        dataset.row_count(),
        dataset.column_count(),
        dataset.columns().join(", ")
    )
}

/// All texts that make up the retrieval memory
pub fn memory_texts(schema: &Schema, dataset: &Dataset) -> Vec<String> {
    let mut texts = schema_docs(schema);
    texts.push(dataset_summary(dataset));
    texts
}

pub struct Retriever {
    store: VectorStore,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
    timeout: Duration,
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("documents", &self.store.len())
            .field("embedder", &self.embedder.model_name())
            .field("top_k", &self.top_k)
            .finish()
    }
}

impl Retriever {
    /// Embed `texts` and index them
    pub async fn build(
        texts: Vec<String>,
        embedder: Arc<dyn Embedder>,
        top_k: usize,
        timeout: Duration,
    ) -> Result<Self, RetrievalError> {
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let embeddings =
            call_with_timeout("embedding", timeout, embedder.embed_batch(&refs)).await?;
        let store = VectorStore::new(embeddings, texts)?;
        info!(
            "Retrieval memory indexed: {} documents, dimension {}",
            store.len(),
            store.dimension()
        );

        Ok(Self {
            store,
            embedder,
            top_k,
            timeout,
        })
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Newline-joined documents nearest to the question
    pub async fn get_context(&self, question: &str) -> Result<String, RetrievalError> {
        let mut vectors = call_with_timeout(
            "embedding",
            self.timeout,
            self.embedder.embed_batch(&[question]),
        )
        .await?;
        if vectors.is_empty() {
            return Err(RetrievalError::EmptyEmbedding);
        }
        let query = vectors.swap_remove(0);

        let hits = self.store.search(&query, self.top_k)?;
        debug!("Retrieved {} documents", hits.len());
        Ok(hits.join("\n"))
    }
}
