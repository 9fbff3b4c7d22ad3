//! Question set resolution
//!
//! Bundles list objective sets whose `questions` may be bare ids. Before a
//! set can be shown, its full question bodies are fetched through an ordered
//! chain of sources. The question-listing API differs between deployments,
//! so each source is tried once, in order, and the first one that yields a
//! non-empty well-formed list wins.
//!
//! Chain:
//! 1. `BySet`: `GET /question-sets/{id}/questions`
//! 2. `ByQuery`: `GET /questions?questionSet={id}`
//! 3. `FilterInMemory`: `GET /questions`, keep questions linked to the set
//!
//! A failing source is logged and skipped. Only when all of them fail does
//! the set come back empty with `resolution_failed` raised. That is a
//! per-card state, never an error for the whole view.

use crate::error::{ViewerError, ViewerResult};
use crate::model::{ObjectiveQuestion, ObjectiveSet, QuestionBody};
use crate::transport::{unwrap_envelope, ContentSource, RequestContext, TransportError};
use chrono::Utc;
use mav_common::events::{EventBus, ViewerEvent};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// One data source in the fallback chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuestionStrategy {
    BySet,
    ByQuery,
    FilterInMemory,
}

impl QuestionStrategy {
    /// Default order, most specific source first
    pub const CHAIN: [QuestionStrategy; 3] = [
        QuestionStrategy::BySet,
        QuestionStrategy::ByQuery,
        QuestionStrategy::FilterInMemory,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            QuestionStrategy::BySet => "by_set",
            QuestionStrategy::ByQuery => "by_query",
            QuestionStrategy::FilterInMemory => "filter_in_memory",
        }
    }

    /// Fetch and normalize the questions of `set_id` from this source
    pub async fn fetch<S>(
        self,
        source: &S,
        set_id: &str,
        ctx: &RequestContext,
    ) -> Result<Vec<ObjectiveQuestion>, StrategyFailure>
    where
        S: ContentSource + ?Sized,
    {
        let raw = match self {
            QuestionStrategy::BySet => {
                let path = format!("/question-sets/{}/questions", urlencoding::encode(set_id));
                source.get_json(&path, &[], ctx).await
            }
            QuestionStrategy::ByQuery => {
                source
                    .get_json("/questions", &[("questionSet", set_id)], ctx)
                    .await
            }
            QuestionStrategy::FilterInMemory => source.get_json("/questions", &[], ctx).await,
        }
        .map_err(StrategyFailure::Transport)?;

        let mut questions = normalize_questions(raw)?;

        match self {
            QuestionStrategy::BySet => {}
            // A server that ignores the filter returns everything; drop
            // questions that say they belong elsewhere.
            QuestionStrategy::ByQuery => {
                questions.retain(|q| q.set_id().map_or(true, |id| id == set_id));
            }
            QuestionStrategy::FilterInMemory => {
                questions.retain(|q| q.set_id() == Some(set_id));
            }
        }

        if questions.is_empty() {
            return Err(StrategyFailure::Empty);
        }
        Ok(questions)
    }
}

impl fmt::Display for QuestionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a single source did not produce questions
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StrategyFailure {
    #[error("{0}")]
    Transport(TransportError),

    #[error("Unexpected response shape: {0}")]
    Shape(String),

    #[error("No usable questions")]
    Empty,
}

/// Turn a list response into well-formed questions
///
/// Accepts a bare array, or an object carrying the array under `questions`
/// or `data`. Elements that do not decode or are not well-formed are dropped.
pub fn normalize_questions(raw: Value) -> Result<Vec<ObjectiveQuestion>, StrategyFailure> {
    let items = match unwrap_envelope(raw, &["questions"]) {
        Value::Array(items) => items,
        Value::Object(mut map) => match map
            .remove("questions")
            .or_else(|| map.remove("data"))
        {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(StrategyFailure::Shape(
                    "object without a questions array".to_string(),
                ))
            }
        },
        Value::Null => Vec::new(),
        other => {
            return Err(StrategyFailure::Shape(format!(
                "expected array, got {}",
                json_kind(&other)
            )))
        }
    };

    let total = items.len();
    let questions: Vec<ObjectiveQuestion> = items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<ObjectiveQuestion>(item) {
            Ok(q) if q.is_well_formed() => Some(q),
            Ok(q) => {
                tracing::warn!(
                    question_id = %q.id,
                    options = q.options.len(),
                    correct_answer = q.correct_answer,
                    "Dropping malformed question"
                );
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Dropping undecodable question");
                None
            }
        })
        .collect();

    if questions.len() < total {
        tracing::debug!(kept = questions.len(), total, "Normalized question list");
    }

    Ok(questions)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// How a resolution ended
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionOutcome {
    /// Set was populated on arrival; nothing was fetched
    AlreadyPopulated,
    /// Questions came from this source
    Resolved(QuestionStrategy),
    /// Every source failed, in the listed order
    Exhausted(Vec<(QuestionStrategy, StrategyFailure)>),
}

/// Resolved set plus how it was obtained
#[derive(Debug, Clone)]
pub struct ResolvedSet {
    pub set: ObjectiveSet,
    pub outcome: ResolutionOutcome,
}

impl ResolvedSet {
    pub fn is_exhausted(&self) -> bool {
        matches!(self.outcome, ResolutionOutcome::Exhausted(_))
    }

    /// Error form for callers that prefer `?`
    pub fn into_result(self) -> ViewerResult<ObjectiveSet> {
        match self.outcome {
            ResolutionOutcome::Exhausted(_) => Err(ViewerError::ResolutionExhausted {
                set_id: self.set.id,
            }),
            _ => Ok(self.set),
        }
    }
}

/// Fills unpopulated objective sets through the fallback chain
pub struct QuestionSetResolver<S: ContentSource> {
    source: Arc<S>,
    strategies: Vec<QuestionStrategy>,
    event_bus: Option<EventBus>,
}

impl<S: ContentSource> Clone for QuestionSetResolver<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            strategies: self.strategies.clone(),
            event_bus: self.event_bus.clone(),
        }
    }
}

impl<S: ContentSource> QuestionSetResolver<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self {
            source,
            strategies: QuestionStrategy::CHAIN.to_vec(),
            event_bus: None,
        }
    }

    /// Replace the chain, e.g. for a deployment with a known single contract
    pub fn with_strategies(mut self, strategies: Vec<QuestionStrategy>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn strategies(&self) -> &[QuestionStrategy] {
        &self.strategies
    }

    /// Copy of `set` with full questions, or empty with `resolution_failed`
    pub async fn resolve_questions(&self, set: &ObjectiveSet, ctx: &RequestContext) -> ObjectiveSet {
        self.resolve_with_outcome(set, ctx).await.set
    }

    /// Like [`Self::resolve_questions`], also reporting which source won
    pub async fn resolve_with_outcome(
        &self,
        set: &ObjectiveSet,
        ctx: &RequestContext,
    ) -> ResolvedSet {
        if set.is_populated() {
            tracing::debug!(set_id = %set.id, "Question set already populated");
            return ResolvedSet {
                set: set.clone(),
                outcome: ResolutionOutcome::AlreadyPopulated,
            };
        }

        let mut failures = Vec::with_capacity(self.strategies.len());

        for &strategy in &self.strategies {
            match strategy.fetch(self.source.as_ref(), &set.id, ctx).await {
                Ok(questions) => {
                    tracing::info!(
                        set_id = %set.id,
                        strategy = %strategy,
                        questions = questions.len(),
                        expected = set.total_questions,
                        "Resolved question set"
                    );
                    self.emit(ViewerEvent::QuestionSetResolved {
                        set_id: set.id.clone(),
                        source: Some(strategy.as_str().to_string()),
                        question_count: questions.len(),
                        timestamp: Utc::now(),
                    });
                    return ResolvedSet {
                        set: set.with_questions(questions),
                        outcome: ResolutionOutcome::Resolved(strategy),
                    };
                }
                Err(failure) => {
                    tracing::warn!(
                        set_id = %set.id,
                        strategy = %strategy,
                        error = %failure,
                        "Question source failed, trying next"
                    );
                    failures.push((strategy, failure));
                }
            }
        }

        tracing::warn!(
            set_id = %set.id,
            attempted = failures.len(),
            "All question sources exhausted"
        );
        self.emit(ViewerEvent::QuestionSetExhausted {
            set_id: set.id.clone(),
            attempted: failures.iter().map(|(s, _)| s.as_str().to_string()).collect(),
            timestamp: Utc::now(),
        });

        ResolvedSet {
            set: set.as_exhausted(),
            outcome: ResolutionOutcome::Exhausted(failures),
        }
    }

    fn emit(&self, event: ViewerEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit_lossy(event);
        }
    }
}
