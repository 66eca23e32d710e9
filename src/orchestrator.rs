//! Query Orchestrator
//!
//! Main entry point for answering questions. Routes each question to a
//! follow-up answer, an explanation grounded in retrieved context, or an
//! analytics run whose computed result is summarized by the LLM. Every failure
//! becomes a fixed user-facing message; `answer` itself never fails.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::engine::QueryResult;
use crate::error::{GenerationError, QueryError};
use crate::llm_client::call_with_timeout;
use crate::plan::Plan;
use crate::state::{DatasetSnapshot, DatasetState};

pub const NO_DATA_MESSAGE: &str =
    "Sorry, I don't have any data files loaded yet. Please upload Excel/CSV files first.";
pub const RETRIEVAL_UNAVAILABLE_MESSAGE: &str = "I can help with data analysis, but the knowledge retrieval system is currently unavailable. Please ask specific analytical questions instead.";
pub const NO_MATCHING_DATA_MESSAGE: &str =
    "I couldn't find any data matching your question. Could you try rephrasing?";
pub const UNSUPPORTED_MESSAGE: &str =
    "I'm not sure how to process that question. Could you try asking differently?";
pub const GENERATION_FAILED_MESSAGE: &str = "Sorry, I encountered an error processing your question. Please try again or rephrase your question.";
pub const TIMEOUT_MESSAGE: &str =
    "Sorry, answering that took too long. Please try again in a moment.";

const FOLLOW_UP_PHRASES: &[&str] = &[
    "why",
    "why?",
    "explain",
    "explain?",
    "how",
    "how?",
    "compare",
    "compare?",
    "what about this",
    "what about it",
    "more details",
    "details",
    "tell me more",
];

const FOLLOW_UP_SYSTEM_PROMPT: &str =
    "You are a business analyst helping explain data analytics results.";

const EXPLAIN_SYSTEM_PROMPT: &str = "You are a business analyst specializing in supply chain and procurement analytics. Answer only from the dataset context you are given.";

const SUMMARY_SYSTEM_PROMPT: &str =
    "You are a financial analyst who explains computed results in clear, professional business language.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Which path produced an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerRoute {
    FollowUp,
    Explain,
    Analytics,
    NoData,
    RetrievalUnavailable,
    NoMatchingData,
    Unsupported,
    CompileFailed,
    GenerationFailed,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    pub text: String,
    pub route: AnswerRoute,
}

impl Answer {
    fn new(text: impl Into<String>, route: AnswerRoute) -> Self {
        Self {
            text: text.into(),
            route,
        }
    }
}

/// True for bare follow-up phrasings such as "why?" or "tell me more"
pub fn is_follow_up(question: &str) -> bool {
    let q = question.trim().to_lowercase();
    FOLLOW_UP_PHRASES.contains(&q.as_str())
}

pub struct QueryOrchestrator {
    state: Arc<DatasetState>,
}

impl QueryOrchestrator {
    pub fn new(state: Arc<DatasetState>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &Arc<DatasetState> {
        &self.state
    }

    /// Answer a question given the conversation so far
    pub async fn answer(&self, question: &str, history: &[ChatMessage]) -> Answer {
        let Some(snapshot) = self.ready_snapshot().await else {
            return Answer::new(NO_DATA_MESSAGE, AnswerRoute::NoData);
        };

        match self.route(&snapshot, question, history).await {
            Ok(answer) => {
                info!("Answered via {:?}", answer.route);
                answer
            }
            Err(QueryError::Compile(e)) => {
                warn!("Plan rejected: {}", e);
                Answer::new(
                    format!(
                        "I couldn't run that analysis: {}. Could you try rephrasing your question?",
                        e
                    ),
                    AnswerRoute::CompileFailed,
                )
            }
            Err(e) if e.is_timeout() => {
                warn!("Question timed out: {}", e);
                Answer::new(TIMEOUT_MESSAGE, AnswerRoute::TimedOut)
            }
            Err(e) => {
                error!("Question failed: {}", e);
                Answer::new(GENERATION_FAILED_MESSAGE, AnswerRoute::GenerationFailed)
            }
        }
    }

    /// Current snapshot, building one first if nothing is loaded
    async fn ready_snapshot(&self) -> Option<Arc<DatasetSnapshot>> {
        if let Some(snapshot) = self.state.snapshot().await {
            return Some(snapshot);
        }
        if let Err(e) = self.state.initialize(false).await {
            warn!("No dataset available: {}", e);
            return None;
        }
        self.state.snapshot().await
    }

    async fn route(
        &self,
        snapshot: &Arc<DatasetSnapshot>,
        question: &str,
        history: &[ChatMessage],
    ) -> Result<Answer, QueryError> {
        if is_follow_up(question) {
            let text = self.follow_up(question, history).await?;
            return Ok(Answer::new(text, AnswerRoute::FollowUp));
        }

        match snapshot.planner().plan(question).await? {
            Plan::Explain => self.explain(snapshot, question).await,
            Plan::Analytics { steps } => {
                self.analytics(snapshot, question, Plan::Analytics { steps })
                    .await
            }
            Plan::Unsupported { kind } => {
                warn!("Unsupported plan type '{}'", kind);
                Ok(Answer::new(UNSUPPORTED_MESSAGE, AnswerRoute::Unsupported))
            }
        }
    }

    async fn follow_up(&self, question: &str, history: &[ChatMessage]) -> Result<String, QueryError> {
        let window = self.state.config().history_window;
        let recent = &history[history.len().saturating_sub(window)..];
        let transcript = recent
            .iter()
            .map(|m| match m.role {
                ChatRole::User => format!("User: {}", m.content),
                ChatRole::Assistant => format!("Assistant: {}", m.content),
            })
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "Conversation so far:\n{}\n\nThe user asked a follow-up question: {}\n\nBased on the conversation history, provide a clear explanation.",
            transcript, question
        );
        Ok(self.generate(FOLLOW_UP_SYSTEM_PROMPT, &prompt).await?)
    }

    async fn explain(&self, snapshot: &DatasetSnapshot, question: &str) -> Result<Answer, QueryError> {
        let Some(retriever) = snapshot.retriever() else {
            return Ok(Answer::new(
                RETRIEVAL_UNAVAILABLE_MESSAGE,
                AnswerRoute::RetrievalUnavailable,
            ));
        };

        let context = retriever.get_context(question).await?;
        let prompt = format!(
            "Context from the dataset:\n{}\n\nUser question:\n{}\n\nProvide a clear, helpful explanation based only on the context provided.",
            context, question
        );
        let text = self.generate(EXPLAIN_SYSTEM_PROMPT, &prompt).await?;
        Ok(Answer::new(text, AnswerRoute::Explain))
    }

    async fn analytics(
        &self,
        snapshot: &Arc<DatasetSnapshot>,
        question: &str,
        plan: Plan,
    ) -> Result<Answer, QueryError> {
        let run_on = snapshot.clone();
        let result = self
            .state
            .workers()
            .run(move || run_on.engine().run(&plan))
            .await??;

        let Some(result) = result.filter(|r| !r.is_empty()) else {
            return Ok(Answer::new(
                NO_MATCHING_DATA_MESSAGE,
                AnswerRoute::NoMatchingData,
            ));
        };

        let text = self
            .generate(SUMMARY_SYSTEM_PROMPT, &summary_prompt(question, &result))
            .await?;
        Ok(Answer::new(text, AnswerRoute::Analytics))
    }

    async fn generate(&self, system: &str, user: &str) -> Result<String, GenerationError> {
        let text = call_with_timeout(
            "generation",
            self.state.config().llm_timeout,
            self.state.llm().chat(system, user),
        )
        .await?;
        Ok(text.trim().to_string())
    }
}

fn summary_prompt(question: &str, result: &QueryResult) -> String {
    format!(
        "User question:\n{}\n\nComputed analytical result:\n{}\n\nExplain this result in clear, professional business language.\n- Use the actual numbers from the result\n- Keep it concise (2-3 sentences)\n- Don't change or round the numbers\n- Focus on insights and meaning",
        question,
        result.to_json_string()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::CellValue;

    #[test]
    fn test_follow_up_detection() {
        assert!(is_follow_up("why"));
        assert!(is_follow_up("  Tell me more "));
        assert!(is_follow_up("WHAT ABOUT IT"));
        assert!(!is_follow_up("why is north ahead?"));
        assert!(!is_follow_up(""));
    }

    #[test]
    fn test_summary_prompt_carries_exact_numbers() {
        let result = QueryResult::Keyed(vec![("South".into(), CellValue::Float(150.25))]);
        let prompt = summary_prompt("top region?", &result);
        assert!(prompt.contains(r#"{"South":150.25}"#));
        assert!(prompt.contains("Don't change or round the numbers"));
    }

    #[test]
    fn test_chat_message_serde() {
        let msg = ChatMessage::user("hi");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "hi"}));
        let back: ChatMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }
}
