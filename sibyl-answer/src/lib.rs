//! sibyl-answer: Cited question answering over a retrieved corpus
//!
//! This crate is the serving half of the pipeline: it turns ranked search
//! results into a prompt with a numbered source list, streams a chat
//! completion, and rewrites the model's `[N]` citation markers into a clean,
//! link-annotated sequence.
//!
//! ## Key Modules
//!
//! - **[`context`]**: Groups, filters, and caps search results into a prompt
//!   context block and an ordered source list
//! - **[`citations`]**: Two-pass marker renumbering and link resolution
//! - **[`completion`]**: The [`completion::CompletionStream`] trait and the
//!   OpenAI-compatible SSE client
//! - **[`prompts`]**: Consultant-voice system prompt and the user prompt
//!   layout
//! - **[`service`]**: The [`service::AnswerService`] orchestrator emitting
//!   snapshot and final events
//! - **[`config`]**: TOML application configuration for the CLI
//!
//! ## Answer Flow
//!
//! ```text
//! question → SearchEngine → ContextBuilder → prompts → CompletionStream
//!                                                           │ SSE deltas
//!                      AnswerEvent::Snapshot ◀──────────────┤
//!                      AnswerEvent::Final    ◀── renumber_citations
//! ```
//!
//! Degraded inputs still produce answers: no results or weak context yield a
//! fixed guidance message, and a stream that dies mid-answer finalizes what
//! arrived with a note appended.

pub mod citations;
pub mod completion;
pub mod config;
pub mod context;
pub mod prompts;
pub mod service;

// Re-export the answer-path types most callers wire together
pub use citations::{Citation, renumber_citations};
pub use completion::{CompletionParams, CompletionStream, OpenAiChat};
pub use context::{ContextBuilder, ContextConfig, Source};
pub use service::{AnswerConfig, AnswerEvent, AnswerService, RenderedAnswer};
