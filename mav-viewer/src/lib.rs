//! mav-viewer library
//!
//! Core of the QR-code mobile asset viewer: turns a scanned route into one
//! aggregated content bundle, fills under-populated question sets through a
//! fallback chain of sources, and reports views and answers without
//! blocking the view.
//!
//! Leaf-first:
//! - [`locator`]: route segments → validated [`EntityRef`]
//! - [`aggregator`]: [`EntityRef`] → [`AssetBundle`] in one request
//! - [`resolver`]: unpopulated objective set → full questions
//! - [`telemetry`]: video views and answer verdicts
//! - [`session`]: the view that owns the bundle and the open set card

pub mod aggregator;
pub mod config;
pub mod error;
pub mod locator;
pub mod model;
pub mod resolver;
pub mod session;
pub mod telemetry;
pub mod transport;

pub use crate::aggregator::ContentAggregator;
pub use crate::error::{ErrorScope, ViewerError, ViewerResult};
pub use crate::locator::{EntityKind, EntityLocator, EntityRef, LocatedEntity, RouteParams};
pub use crate::model::{AssetBundle, ObjectiveSet, SubjectiveSet, Tier, TieredSets};
pub use crate::resolver::{QuestionSetResolver, QuestionStrategy, ResolutionOutcome};
pub use crate::session::{ApplyOutcome, SetCard, SetCardState, ViewSession, ViewState};
pub use crate::telemetry::{AnswerVerdict, RetryPolicy, TelemetryEmitter, Toast, ToastKind};
pub use crate::transport::{ContentSource, HttpContentClient, RequestContext, TransportError};
