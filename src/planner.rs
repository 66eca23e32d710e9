//! Query Planner
//!
//! Asks the LLM to compile a question into a [`Plan`], given the schema
//! listing. Responses that are not a readable plan fall back to
//! [`Plan::Explain`]; readable plans with invalid steps are rejected.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{BuildError, CompileError, PlanError, QueryError};
use crate::llm_client::{call_with_timeout, preview, LlmClient};
use crate::plan::Plan;
use crate::schema::Schema;

/// Built-in planner prompt; `{schema}` is replaced by the schema listing
pub const DEFAULT_PLANNER_PROMPT: &str = include_str!("prompts/planner_system.md");

const SCHEMA_PLACEHOLDER: &str = "{schema}";

/// Read a planner prompt template, or the built-in one when no path is given
pub fn load_template(path: Option<&Path>) -> Result<String, BuildError> {
    let template = match path {
        Some(path) => std::fs::read_to_string(path).map_err(|source| BuildError::Io {
            path: path.to_path_buf(),
            source,
        })?,
        None => DEFAULT_PLANNER_PROMPT.to_string(),
    };

    if !template.contains(SCHEMA_PLACEHOLDER) {
        return Err(BuildError::Prompt(format!(
            "planner template has no {} placeholder",
            SCHEMA_PLACEHOLDER
        )));
    }
    Ok(template)
}

pub struct QueryPlanner {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    timeout: Duration,
}

impl QueryPlanner {
    pub fn new(schema: &Schema, template: &str, llm: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self {
            llm,
            system_prompt: template.replace(SCHEMA_PLACEHOLDER, &schema.describe()),
            timeout,
        }
    }

    /// System prompt with the schema listing filled in
    pub fn prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Compile a question into a plan
    pub async fn plan(&self, question: &str) -> Result<Plan, QueryError> {
        let user_prompt = format!("Question: {}", question);
        let raw = call_with_timeout(
            "planning",
            self.timeout,
            self.llm.chat_json(&self.system_prompt, &user_prompt),
        )
        .await?;
        debug!("Planner response: {}", preview(&raw, 1000));

        let plan = Self::interpret(&raw)?;
        info!("Plan: {}", serde_json::to_string(&plan).unwrap_or_default());
        Ok(plan)
    }

    /// Parse a raw planner response, falling back to explain when it is not a plan at all
    pub fn interpret(raw: &str) -> Result<Plan, CompileError> {
        match Plan::parse(raw) {
            Ok(plan) => Ok(plan),
            Err(PlanError::Parse(e)) => {
                warn!("Unreadable planner response, falling back to explain: {}", e);
                Ok(Plan::Explain)
            }
            Err(PlanError::Compile(e)) => Err(e),
        }
    }
}
