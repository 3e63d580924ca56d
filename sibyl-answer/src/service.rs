//! Question-to-answer orchestration.
//!
//! One [`AnswerService::answer`] call runs the whole serving path: search the
//! corpus, assemble context and sources, stream a completion, and render the
//! final text with renumbered citations. Progress flows to the caller over a
//! flume channel as [`AnswerEvent`]s:
//!
//! ```text
//! question ──▶ search ──▶ context ──▶ prompts ──▶ completion stream
//!                                                      │
//!                     Snapshot(text so far) ◀──────────┤  (freshness)
//!                     Final(RenderedAnswer) ◀──────────┘  (always last)
//! ```
//!
//! Every degraded path still ends in a `Final` event with a graceful
//! natural-language message: empty search results, weak context, a refused
//! completion request, or a stream that dies mid-answer. A dropped receiver
//! abandons the request without an error.

use crate::citations::{Citation, renumber_citations};
use crate::completion::{CompletionParams, CompletionStream};
use crate::context::{ContextBuilder, Source};
use crate::prompts;
use anyhow::Result;
use serde::Serialize;
use sibyl_retriever::retrieval::search_engine::SearchEngine;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default number of search results feeding the context.
pub const DEFAULT_TOP_K: usize = 8;

/// Default number of stream chunks between progress snapshots.
pub const DEFAULT_SNAPSHOT_INTERVAL: usize = 50;

/// Shown when the search finds nothing at all.
pub const INSUFFICIENT_RESULTS_MESSAGE: &str = "I couldn't find relevant information for your \
    question. Try rephrasing it or using different keywords.";

/// Shown when results exist but none clears the relevance floor.
pub const WEAK_CONTEXT_MESSAGE: &str = "The information I found isn't relevant enough to answer \
    confidently. Try rephrasing your question.";

/// Shown when the completion request itself is refused.
pub const COMPLETION_FAILED_MESSAGE: &str = "I ran into a problem while generating the answer. \
    Please try again in a moment.";

/// Appended when the completion stream dies mid-answer.
pub const STREAM_INTERRUPTED_NOTE: &str = "\n\nThe answer may be incomplete: the connection to \
    the language model was interrupted.";

/// Serving-path tuning knobs.
#[derive(Debug, Clone)]
pub struct AnswerConfig {
    /// Search results requested per question
    pub top_k: usize,
    /// Stream chunks between progress snapshots
    pub snapshot_interval: usize,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            snapshot_interval: DEFAULT_SNAPSHOT_INTERVAL,
        }
    }
}

impl AnswerConfig {
    /// Set the number of search results per question.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Set the snapshot interval in stream chunks.
    pub fn with_snapshot_interval(mut self, snapshot_interval: usize) -> Self {
        self.snapshot_interval = snapshot_interval.max(1);
        self
    }
}

/// The finished answer: rendered text, its citations, and the source list.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedAnswer {
    /// Final text with renumbered, link-annotated markers
    pub text: String,
    /// Distinct citations in first-seen order
    pub citations: Vec<Citation>,
    /// Ordered source list the markers resolve against
    pub sources: Vec<Source>,
}

impl RenderedAnswer {
    /// A plain-message answer with no citations and no sources.
    fn message<S: Into<String>>(text: S) -> Self {
        Self {
            text: text.into(),
            citations: Vec::new(),
            sources: Vec::new(),
        }
    }
}

/// Progress events for one answered question.
#[derive(Debug, Clone)]
pub enum AnswerEvent {
    /// The accumulated answer text so far; a display freshness aid
    Snapshot(String),
    /// The finished answer; always the last event
    Final(RenderedAnswer),
}

/// Orchestrates retrieval, generation, and citation rendering.
pub struct AnswerService {
    search: SearchEngine,
    context_builder: ContextBuilder,
    completion: Arc<dyn CompletionStream>,
    params: CompletionParams,
    config: AnswerConfig,
}

impl AnswerService {
    /// Wires a service from its collaborators.
    pub fn new(
        search: SearchEngine,
        context_builder: ContextBuilder,
        completion: Arc<dyn CompletionStream>,
        params: CompletionParams,
        config: AnswerConfig,
    ) -> Self {
        Self {
            search,
            context_builder,
            completion,
            params,
            config,
        }
    }

    /// Answers one question, emitting progress and the final answer on
    /// `events`.
    ///
    /// # Arguments
    /// * `question` - The user's question
    /// * `events` - Channel the [`AnswerEvent`]s are delivered on
    ///
    /// # Returns
    /// `Ok(())` once the final event is delivered or the receiver is gone;
    /// an error only for corpus-level failures inside the search path.
    pub async fn answer(&self, question: &str, events: &flume::Sender<AnswerEvent>) -> Result<()> {
        info!("answering question: {question}");

        let results = self.search.search(question, self.config.top_k).await?;
        if results.is_empty() {
            info!("no search results; returning insufficient-information answer");
            self.finish(events, RenderedAnswer::message(INSUFFICIENT_RESULTS_MESSAGE))
                .await;
            return Ok(());
        }

        let context = self.context_builder.create_context(&results, question);
        if context.trim().is_empty() {
            info!("no result cleared the relevance floor; returning weak-context answer");
            self.finish(events, RenderedAnswer::message(WEAK_CONTEXT_MESSAGE))
                .await;
            return Ok(());
        }

        let sources = self.context_builder.extract_sources(&results);
        let system_prompt = prompts::system_prompt();
        let user_prompt = prompts::user_prompt(&context, question, &sources);

        let chunks = match self
            .completion
            .complete(&system_prompt, &user_prompt, &self.params)
            .await
        {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!("completion request failed: {e}");
                self.finish(
                    events,
                    RenderedAnswer {
                        text: COMPLETION_FAILED_MESSAGE.to_string(),
                        citations: Vec::new(),
                        sources,
                    },
                )
                .await;
                return Ok(());
            }
        };

        let mut full_text = String::new();
        let mut since_snapshot = 0usize;
        let mut interrupted = false;

        while let Ok(item) = chunks.recv_async().await {
            match item {
                Ok(chunk) => {
                    since_snapshot += 1;
                    let snapshot_due =
                        since_snapshot >= self.config.snapshot_interval || chunk.contains('\n');
                    full_text.push_str(&chunk);

                    if snapshot_due {
                        since_snapshot = 0;
                        if events
                            .send_async(AnswerEvent::Snapshot(full_text.clone()))
                            .await
                            .is_err()
                        {
                            debug!("answer receiver dropped; abandoning request");
                            return Ok(());
                        }
                    }
                }
                Err(e) => {
                    warn!("completion stream interrupted: {e}");
                    interrupted = true;
                    break;
                }
            }
        }

        if interrupted {
            full_text.push_str(STREAM_INTERRUPTED_NOTE);
        }

        let (text, citations) = renumber_citations(&full_text, &sources);
        self.finish(
            events,
            RenderedAnswer {
                text,
                citations,
                sources,
            },
        )
        .await;
        Ok(())
    }

    async fn finish(&self, events: &flume::Sender<AnswerEvent>, answer: RenderedAnswer) {
        if events.send_async(AnswerEvent::Final(answer)).await.is_err() {
            debug!("answer receiver dropped before the final event");
        }
    }
}
