//! View session
//!
//! Owns everything one mounted asset view shows: the current entity, its
//! bundle, the single open question-set card and the user's local answer
//! selections. The bundle is replaced wholesale on every successful
//! resolution, never patched.
//!
//! Navigation is guarded by a generation counter. Each navigation takes a
//! ticket; a response is applied only if its ticket is still the latest, so
//! a slow response for a previous route can never overwrite newer content.
//!
//! Set card lifecycle:
//!
//! ```text
//! Collapsed ──open──▶ Loading ──▶ Populated        (terminal for this view)
//!                        │
//!                        └──────▶ EmptyConfirmed ──retry──▶ Loading
//! ```

use crate::aggregator::ContentAggregator;
use crate::error::{ViewerError, ViewerResult};
use crate::locator::{EntityLocator, LocatedEntity, RouteParams};
use crate::model::{AssetBundle, ObjectiveSet};
use crate::resolver::QuestionSetResolver;
use crate::telemetry::{RetryPolicy, TelemetryEmitter, Toast};
use crate::transport::{ContentSource, RequestContext};
use chrono::Utc;
use mav_common::events::{EventBus, ViewerEvent};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// What the view is showing
#[derive(Debug, Clone)]
pub enum ViewState {
    /// Nothing requested yet
    Idle,
    /// Bundle request in flight
    Loading { entity: LocatedEntity },
    /// Bundle displayed
    Ready {
        entity: LocatedEntity,
        bundle: Arc<AssetBundle>,
    },
    /// Bundle fetch failed; retry re-requests the same entity
    Failed {
        entity: LocatedEntity,
        message: String,
    },
    /// Route itself is malformed; no retry
    Invalid { message: String },
}

impl ViewState {
    pub fn name(&self) -> &'static str {
        match self {
            ViewState::Idle => "idle",
            ViewState::Loading { .. } => "loading",
            ViewState::Ready { .. } => "ready",
            ViewState::Failed { .. } => "failed",
            ViewState::Invalid { .. } => "invalid",
        }
    }

    pub fn bundle(&self) -> Option<&Arc<AssetBundle>> {
        match self {
            ViewState::Ready { bundle, .. } => Some(bundle),
            _ => None,
        }
    }

    pub fn entity(&self) -> Option<&LocatedEntity> {
        match self {
            ViewState::Loading { entity }
            | ViewState::Ready { entity, .. }
            | ViewState::Failed { entity, .. } => Some(entity),
            ViewState::Idle | ViewState::Invalid { .. } => None,
        }
    }
}

/// UI-visible state of one question-set card
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetCardState {
    Collapsed,
    Loading,
    Populated,
    EmptyConfirmed,
}

/// The open question-set card
#[derive(Debug, Clone)]
pub struct SetCard {
    pub state: SetCardState,
    pub set: ObjectiveSet,
}

impl SetCard {
    pub fn new(set: ObjectiveSet) -> Self {
        Self {
            state: SetCardState::Collapsed,
            set,
        }
    }

    pub fn set_id(&self) -> &str {
        &self.set.id
    }

    /// `Collapsed → Loading` or, on retry, `EmptyConfirmed → Loading`
    pub fn begin_loading(&mut self) -> ViewerResult<()> {
        match self.state {
            SetCardState::Collapsed | SetCardState::EmptyConfirmed => {
                self.state = SetCardState::Loading;
                Ok(())
            }
            other => Err(ViewerError::Common(mav_common::Error::InvalidInput(format!(
                "cannot load set {} from {:?}",
                self.set.id, other
            )))),
        }
    }

    /// `Loading → Populated | EmptyConfirmed`
    pub fn finish(&mut self, resolved: ObjectiveSet) -> ViewerResult<()> {
        if self.state != SetCardState::Loading {
            return Err(ViewerError::Common(mav_common::Error::InvalidInput(format!(
                "set {} is not loading",
                self.set.id
            ))));
        }

        self.state = if resolved.resolution_failed || !resolved.is_populated() {
            SetCardState::EmptyConfirmed
        } else {
            SetCardState::Populated
        };
        self.set = resolved;
        Ok(())
    }
}

/// Whether a finished navigation reached the screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// A newer navigation started meanwhile; the response was dropped
    Discarded,
}

/// Proof of which navigation a response belongs to
#[derive(Debug, Clone)]
pub struct NavigationTicket {
    generation: u64,
    entity: LocatedEntity,
}

impl NavigationTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn entity(&self) -> &LocatedEntity {
        &self.entity
    }
}

struct SessionInner {
    generation: u64,
    state: ViewState,
    open_set: Option<SetCard>,
    selections: HashMap<String, usize>,
}

/// One mounted asset view
pub struct ViewSession<S: ContentSource + 'static> {
    id: Uuid,
    aggregator: ContentAggregator<S>,
    resolver: QuestionSetResolver<S>,
    telemetry: TelemetryEmitter<S>,
    event_bus: EventBus,
    inner: RwLock<SessionInner>,
}

impl<S: ContentSource + 'static> ViewSession<S> {
    pub fn new(source: Arc<S>, retry_policy: RetryPolicy, event_bus: EventBus) -> Self {
        Self {
            id: Uuid::new_v4(),
            aggregator: ContentAggregator::new(Arc::clone(&source)),
            resolver: QuestionSetResolver::new(Arc::clone(&source))
                .with_event_bus(event_bus.clone()),
            telemetry: TelemetryEmitter::new(source, retry_policy)
                .with_event_bus(event_bus.clone()),
            event_bus,
            inner: RwLock::new(SessionInner {
                generation: 0,
                state: ViewState::Idle,
                open_set: None,
                selections: HashMap::new(),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn state(&self) -> ViewState {
        self.inner.read().await.state.clone()
    }

    pub async fn bundle(&self) -> Option<Arc<AssetBundle>> {
        self.inner.read().await.state.bundle().cloned()
    }

    pub async fn open_card(&self) -> Option<SetCard> {
        self.inner.read().await.open_set.clone()
    }

    pub async fn selection(&self, question_id: &str) -> Option<usize> {
        self.inner.read().await.selections.get(question_id).copied()
    }

    /// Locate `params` and load its bundle
    ///
    /// A malformed route puts the view into `Invalid` without any request.
    /// Errors are also reflected in [`Self::state`].
    pub async fn navigate(
        &self,
        params: &RouteParams,
        ctx: &RequestContext,
    ) -> ViewerResult<ApplyOutcome> {
        match EntityLocator::locate(params) {
            Ok(located) => self.load(located, ctx).await,
            Err(err) => {
                let mut inner = self.inner.write().await;
                inner.generation += 1;
                inner.state = ViewState::Invalid {
                    message: match &err {
                        ViewerError::InvalidReference(message) => message.clone(),
                        other => other.to_string(),
                    },
                };
                inner.open_set = None;
                inner.selections.clear();
                tracing::warn!(session_id = %self.id, error = %err, "Rejected route");
                Err(err)
            }
        }
    }

    /// Re-request the bundle after a failed load
    pub async fn retry(&self, ctx: &RequestContext) -> ViewerResult<ApplyOutcome> {
        let state = self.state().await;
        match state {
            ViewState::Failed { entity, .. } => self.load(entity, ctx).await,
            ViewState::Invalid { message } => Err(ViewerError::InvalidReference(message)),
            other => Err(ViewerError::Common(mav_common::Error::InvalidInput(format!(
                "nothing to retry while {}",
                other.name()
            )))),
        }
    }

    async fn load(&self, located: LocatedEntity, ctx: &RequestContext) -> ViewerResult<ApplyOutcome> {
        let ticket = self.begin_navigation(located).await;
        let result = self.aggregator.resolve(&ticket.entity.entity, ctx).await;
        let failure = result.as_ref().err().map(|err| match err {
            ViewerError::AggregationFailed(message) => message.clone(),
            other => other.to_string(),
        });

        match (self.complete_navigation(&ticket, result).await, failure) {
            (ApplyOutcome::Applied, Some(message)) => Err(ViewerError::AggregationFailed(message)),
            (outcome, _) => Ok(outcome),
        }
    }

    /// Start a navigation; any earlier in-flight response becomes stale
    pub async fn begin_navigation(&self, located: LocatedEntity) -> NavigationTicket {
        let mut inner = self.inner.write().await;
        inner.generation += 1;
        inner.state = ViewState::Loading {
            entity: located.clone(),
        };
        inner.open_set = None;
        inner.selections.clear();

        tracing::debug!(
            session_id = %self.id,
            generation = inner.generation,
            path = %located.entity.resource_path(),
            "Navigation started"
        );

        NavigationTicket {
            generation: inner.generation,
            entity: located,
        }
    }

    /// Apply a finished bundle request if its ticket is still current
    pub async fn complete_navigation(
        &self,
        ticket: &NavigationTicket,
        result: ViewerResult<AssetBundle>,
    ) -> ApplyOutcome {
        let mut inner = self.inner.write().await;
        let path = ticket.entity.entity.resource_path();

        if ticket.generation != inner.generation {
            tracing::debug!(
                session_id = %self.id,
                stale = ticket.generation,
                current = inner.generation,
                path = %path,
                "Discarding stale bundle response"
            );
            self.event_bus.emit_lossy(ViewerEvent::StaleBundleDiscarded {
                session_id: self.id,
                entity_path: path,
                stale_generation: ticket.generation,
                current_generation: inner.generation,
                timestamp: Utc::now(),
            });
            return ApplyOutcome::Discarded;
        }

        match result {
            Ok(bundle) => {
                self.event_bus.emit_lossy(ViewerEvent::BundleResolved {
                    session_id: self.id,
                    entity_kind: ticket.entity.entity.kind().to_string(),
                    entity_path: path,
                    objective_sets: bundle.objective_sets.total_sets(),
                    subjective_sets: bundle.subjective_sets.total_sets(),
                    timestamp: Utc::now(),
                });
                inner.state = ViewState::Ready {
                    entity: ticket.entity.clone(),
                    bundle: Arc::new(bundle),
                };
            }
            Err(err) => {
                let message = match err {
                    ViewerError::AggregationFailed(message) => message,
                    other => other.to_string(),
                };
                self.event_bus.emit_lossy(ViewerEvent::BundleFailed {
                    session_id: self.id,
                    entity_path: path,
                    message: message.clone(),
                    timestamp: Utc::now(),
                });
                inner.state = ViewState::Failed {
                    entity: ticket.entity.clone(),
                    message,
                };
            }
        }

        ApplyOutcome::Applied
    }

    /// Open an objective set from the current bundle
    ///
    /// Reopening the set that is already open returns its card as-is, with
    /// no network work; an empty set is reloaded only through
    /// [`Self::retry_set`]. Opening a different set replaces the open card.
    pub async fn open_set(&self, set_id: &str, ctx: &RequestContext) -> ViewerResult<SetCard> {
        let (generation, set) = {
            let mut inner = self.inner.write().await;

            if let Some(card) = &inner.open_set {
                if card.set_id() == set_id {
                    return Ok(card.clone());
                }
            }

            let set = inner
                .state
                .bundle()
                .and_then(|bundle| bundle.find_objective_set(set_id))
                .cloned()
                .ok_or_else(|| {
                    ViewerError::Common(mav_common::Error::InvalidInput(format!(
                        "no objective set {} in the current bundle",
                        set_id
                    )))
                })?;

            let mut card = SetCard::new(set.clone());
            card.begin_loading()?;
            inner.open_set = Some(card);
            inner.selections.clear();
            (inner.generation, set)
        };

        self.finish_set(generation, set, ctx).await
    }

    /// Retry an open set whose sources were exhausted
    pub async fn retry_set(&self, ctx: &RequestContext) -> ViewerResult<SetCard> {
        let (generation, set) = {
            let mut inner = self.inner.write().await;
            let generation = inner.generation;
            let card = inner.open_set.as_mut().ok_or_else(|| {
                ViewerError::Common(mav_common::Error::InvalidInput(
                    "no question set is open".to_string(),
                ))
            })?;

            if card.state != SetCardState::EmptyConfirmed {
                return Err(ViewerError::Common(mav_common::Error::InvalidInput(format!(
                    "set {} is {:?}, retry needs EmptyConfirmed",
                    card.set.id, card.state
                ))));
            }
            card.begin_loading()?;
            (generation, card.set.clone())
        };

        self.finish_set(generation, set, ctx).await
    }

    async fn finish_set(
        &self,
        generation: u64,
        set: ObjectiveSet,
        ctx: &RequestContext,
    ) -> ViewerResult<SetCard> {
        let resolved = self.resolver.resolve_questions(&set, ctx).await;

        let mut inner = self.inner.write().await;
        let still_open = inner.generation == generation
            && inner
                .open_set
                .as_ref()
                .is_some_and(|card| card.set_id() == set.id && card.state == SetCardState::Loading);

        if !still_open {
            tracing::debug!(set_id = %set.id, "Dropping resolution for a card that is no longer open");
            let mut card = SetCard::new(set);
            card.begin_loading()?;
            card.finish(resolved)?;
            return Ok(card);
        }

        let card = inner
            .open_set
            .as_mut()
            .ok_or_else(|| ViewerError::Common(mav_common::Error::Internal("open card vanished".into())))?;
        card.finish(resolved)?;
        Ok(card.clone())
    }

    /// Back to the set list; resolved questions are discarded
    pub async fn close_set(&self) {
        let mut inner = self.inner.write().await;
        inner.open_set = None;
        inner.selections.clear();
    }

    /// Record the user's pick and fetch the verdict
    ///
    /// The local selection is kept whatever the verdict; the open card and
    /// its questions are not touched.
    pub async fn answer(
        &self,
        question_id: &str,
        selected_index: usize,
        ctx: &RequestContext,
    ) -> Toast {
        self.inner
            .write()
            .await
            .selections
            .insert(question_id.to_string(), selected_index);

        self.telemetry
            .record_answer(question_id, selected_index, ctx)
            .await
            .toast()
    }

    /// Report a video view in the background
    pub fn view_video(&self, video_id: &str, ctx: &RequestContext) {
        self.telemetry.record_video_view(video_id, ctx);
    }
}
