//! Shared fakes for integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use tabular_rag::error::BuildError;
use tabular_rag::{
    AssistantConfig, Dataset, DatasetLoader, DatasetState, Embedder, FileDatasetLoader, LlmClient,
};

pub const SALES_CSV: &str = "Region,Sales,Category\nNorth,100,Pipes\nSouth,150,Valves\nNorth,20,Pipes\n";

pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

/// LLM that answers planning requests with a fixed plan and chat requests
/// with a fixed reply, recording every prompt it sees
pub struct ScriptedLlm {
    plan: String,
    reply: String,
    delay: Duration,
    fail: bool,
    plan_prompts: Mutex<Vec<String>>,
    chat_prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    fn build(plan: &str, reply: &str, delay: Duration, fail: bool) -> Arc<Self> {
        Arc::new(Self {
            plan: plan.to_string(),
            reply: reply.to_string(),
            delay,
            fail,
            plan_prompts: Mutex::new(Vec::new()),
            chat_prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn new(plan: &str, reply: &str) -> Arc<Self> {
        Self::build(plan, reply, Duration::ZERO, false)
    }

    /// Every call sleeps before answering
    pub fn slow(plan: &str, delay: Duration) -> Arc<Self> {
        Self::build(plan, "too late", delay, false)
    }

    /// Planning works, text generation fails
    pub fn failing_chat(plan: &str) -> Arc<Self> {
        Self::build(plan, "", Duration::ZERO, true)
    }

    pub fn plan_requests(&self) -> Vec<String> {
        self.plan_prompts.lock().unwrap().clone()
    }

    pub fn chat_requests(&self) -> Vec<String> {
        self.chat_prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn chat(&self, _system: &str, user: &str) -> Result<String> {
        self.chat_prompts.lock().unwrap().push(user.to_string());
        tokio::time::sleep(self.delay).await;
        if self.fail {
            return Err(anyhow!("provider unavailable"));
        }
        Ok(self.reply.clone())
    }

    async fn chat_json(&self, _system: &str, user: &str) -> Result<String> {
        self.plan_prompts.lock().unwrap().push(user.to_string());
        tokio::time::sleep(self.delay).await;
        Ok(self.plan.clone())
    }

    fn model_name(&self) -> &str {
        "scripted"
    }

    fn provider_name(&self) -> &str {
        "test"
    }
}

/// Deterministic embedding from letter counts
pub struct LetterEmbedder {
    delay: Duration,
}

impl LetterEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            delay: Duration::ZERO,
        })
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self { delay })
    }
}

#[async_trait]
impl Embedder for LetterEmbedder {
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        tokio::time::sleep(self.delay).await;
        Ok(texts
            .iter()
            .map(|t| {
                let lower = t.to_lowercase();
                ['a', 'e', 'i', 'o', 'r', 's']
                    .iter()
                    .map(|c| lower.matches(*c).count() as f32)
                    .collect()
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        "letters"
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Err(anyhow!("embedding quota exceeded"))
    }

    fn model_name(&self) -> &str {
        "failing"
    }
}

/// File loader that counts how often it runs
pub struct CountingLoader {
    loads: AtomicUsize,
    delay: Duration,
}

impl CountingLoader {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            loads: AtomicUsize::new(0),
            delay,
        })
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl DatasetLoader for CountingLoader {
    fn load(&self, paths: &[PathBuf]) -> std::result::Result<Dataset, BuildError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        FileDatasetLoader.load(paths)
    }
}

pub fn config(dir: &Path) -> AssistantConfig {
    AssistantConfig::default().with_data_dir(dir)
}

pub fn state(
    config: AssistantConfig,
    llm: Arc<dyn LlmClient>,
    embedder: Arc<dyn Embedder>,
) -> Arc<DatasetState> {
    state_with_loader(config, llm, embedder, Arc::new(FileDatasetLoader))
}

pub fn state_with_loader(
    config: AssistantConfig,
    llm: Arc<dyn LlmClient>,
    embedder: Arc<dyn Embedder>,
    loader: Arc<dyn DatasetLoader>,
) -> Arc<DatasetState> {
    Arc::new(DatasetState::new(config, loader, llm, embedder).unwrap())
}
