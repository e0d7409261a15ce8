//! Answer generation over an abstract language-model backend.
//!
//! [`GenerationBackend`] is the single polymorphic capability every model
//! provider implements (`prompt -> completion`). [`AnswerGenerator`] builds
//! the prompt from the instruction, recent session turns, the assembled
//! context and the question, calls the backend, and records the exchange.
//!
//! # Session effects
//!
//! | Outcome | Turns appended |
//! |---------|----------------|
//! | [`AnswerStatus::Answered`] | user + assistant (with sources) |
//! | [`AnswerStatus::NoContext`] | user + assistant (fixed reply) |
//! | [`AnswerStatus::BackendFailed`] | none |

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

use crate::context::{excerpt, AssembledContext, EMPTY_CONTEXT};
use crate::error::{RagError, Result};
use crate::session::{SessionStore, Turn};

/// Instruction placed at the top of every prompt.
pub const INSTRUCTION: &str = "Based on the following context, please answer the question. \
If the context doesn't contain enough information to answer the question, please say so.";

/// Reply used when retrieval found nothing and the backend is not consulted.
pub const NO_CONTEXT_ANSWER: &str = "I couldn't find any relevant information in the \
indexed documents to answer that question. Try ingesting a PDF, a web page, or some text first.";

/// Characters of retrieved context shown alongside a backend error.
const FAILURE_EXCERPT_CHARS: usize = 500;

/// A language-model backend: takes a prompt, returns a completion.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Provider name for logs (e.g. `"groq"`).
    fn name(&self) -> &str;

    /// Fails with [`RagError::GenerationBackend`] on timeout, quota, or
    /// network failure.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStatus {
    Answered,
    NoContext,
    BackendFailed,
}

/// Result of one chat exchange.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub session_id: String,
    pub response: String,
    pub sources: Vec<String>,
    pub status: AnswerStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationParams {
    /// Prior turns included in the prompt.
    pub history_turns: usize,
    /// Call the backend even when retrieval found nothing.
    pub answer_without_context: bool,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            history_turns: 6,
            answer_without_context: false,
        }
    }
}

/// Render the full prompt.
pub fn build_prompt(history: &[Turn], context_text: &str, question: &str) -> String {
    let mut prompt = String::from(INSTRUCTION);
    prompt.push_str("\n\n");

    if !history.is_empty() {
        prompt.push_str("Conversation so far:\n");
        for turn in history {
            prompt.push_str(turn.role.label());
            prompt.push_str(": ");
            prompt.push_str(&turn.content);
            prompt.push('\n');
        }
        prompt.push('\n');
    }

    let context = if context_text.trim().is_empty() {
        EMPTY_CONTEXT
    } else {
        context_text
    };
    prompt.push_str("Context:\n");
    prompt.push_str(context);
    prompt.push_str("\n\nQuestion: ");
    prompt.push_str(question);
    prompt.push_str("\n\nAnswer:");
    prompt
}

pub struct AnswerGenerator {
    backend: Arc<dyn GenerationBackend>,
    sessions: Arc<SessionStore>,
    params: GenerationParams,
}

impl AnswerGenerator {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        sessions: Arc<SessionStore>,
        params: GenerationParams,
    ) -> Self {
        Self {
            backend,
            sessions,
            params,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Answer `question` against an assembled context.
    ///
    /// A missing `session_id` starts a new session. Backend failures are
    /// folded into the returned [`Answer`] rather than propagated.
    ///
    /// A context that dropped every retrieved chunk for lack of room is a
    /// [`RagError::Config`] error, not a "no context" answer.
    pub async fn answer(
        &self,
        session_id: Option<&str>,
        question: &str,
        context: &AssembledContext,
    ) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::InvalidInput("question must not be empty".to_string()));
        }
        if context.is_empty() && context.chunks_omitted > 0 {
            return Err(RagError::Config(format!(
                "none of the {} retrieved chunks fit in max_context_chars",
                context.chunks_omitted
            )));
        }
        let session_id = SessionStore::resolve_id(session_id);

        if context.is_empty() && !self.params.answer_without_context {
            self.sessions.append(
                &session_id,
                [
                    Turn::user(question),
                    Turn::assistant(NO_CONTEXT_ANSWER, Vec::new()),
                ],
            );
            return Ok(Answer {
                session_id,
                response: NO_CONTEXT_ANSWER.to_string(),
                sources: Vec::new(),
                status: AnswerStatus::NoContext,
            });
        }

        let history = self.sessions.recent(&session_id, self.params.history_turns);
        let prompt = build_prompt(&history, &context.text, question);

        match self.backend.generate(&prompt).await {
            Ok(completion) => {
                let response = completion.trim().to_string();
                self.sessions.append(
                    &session_id,
                    [
                        Turn::user(question),
                        Turn::assistant(response.clone(), context.sources.clone()),
                    ],
                );
                let status = if context.is_empty() {
                    AnswerStatus::NoContext
                } else {
                    AnswerStatus::Answered
                };
                Ok(Answer {
                    session_id,
                    response,
                    sources: context.sources.clone(),
                    status,
                })
            }
            Err(e) => {
                warn!(
                    backend = self.backend.name(),
                    session_id = %session_id,
                    error = %e,
                    "answer generation failed"
                );
                Ok(Answer {
                    session_id,
                    response: failure_response(&e, &context.text),
                    sources: context.sources.clone(),
                    status: AnswerStatus::BackendFailed,
                })
            }
        }
    }
}

fn failure_response(err: &RagError, context_text: &str) -> String {
    let reason = match err {
        RagError::GenerationBackend(msg) => msg.clone(),
        other => other.to_string(),
    };
    let mut out = format!("Error generating response: {}", reason);
    if !context_text.is_empty() {
        let shown = excerpt(context_text, FAILURE_EXCERPT_CHARS);
        out.push_str("\n\nRetrieved context:\n\n");
        out.push_str(shown);
        if shown.len() < context_text.len() {
            out.push_str("...");
        }
    }
    out
}
