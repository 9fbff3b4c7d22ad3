//! Event types for the viewer event system
//!
//! The core never calls into the presentation shell directly. Outcomes that
//! the shell may want to surface (toasts, banners, debug panels) are
//! broadcast as `ViewerEvent`s on an `EventBus`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Viewer event types
///
/// Serialized with an internal `type` tag so events can be forwarded to a
/// web shell as-is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ViewerEvent {
    /// An aggregated bundle was applied to the view
    BundleResolved {
        /// View session that owns the bundle
        session_id: Uuid,
        /// Entity kind (book, chapter, topic, subtopic)
        entity_kind: String,
        /// Aggregation path the bundle came from
        entity_path: String,
        /// Objective sets across all tiers
        objective_sets: usize,
        /// Subjective sets across all tiers
        subjective_sets: usize,
        timestamp: DateTime<Utc>,
    },

    /// Bundle fetch failed; the view shows a retryable error
    BundleFailed {
        session_id: Uuid,
        entity_path: String,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// A bundle arrived for a navigation that is no longer current
    ///
    /// The response was dropped without touching the displayed content.
    StaleBundleDiscarded {
        session_id: Uuid,
        entity_path: String,
        /// Generation of the discarded response
        stale_generation: u64,
        /// Generation currently displayed or loading
        current_generation: u64,
        timestamp: DateTime<Utc>,
    },

    /// Question set now has full question bodies
    QuestionSetResolved {
        set_id: String,
        /// Strategy that supplied the questions; None when the set arrived populated
        source: Option<String>,
        question_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// Every question source failed or returned nothing for a set
    QuestionSetExhausted {
        set_id: String,
        /// Strategies attempted, in order
        attempted: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// Video view delivered to the content service
    VideoViewRecorded {
        video_id: String,
        attempts: u32,
        timestamp: DateTime<Utc>,
    },

    /// Answer verdict received
    AnswerRecorded {
        question_id: String,
        selected_index: usize,
        is_correct: bool,
        timestamp: DateTime<Utc>,
    },

    /// Telemetry gave up after its bounded attempts
    TelemetryFailed {
        /// "video_view" or "answer"
        operation: String,
        target_id: String,
        attempts: u32,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl ViewerEvent {
    /// Event name as used in the serialized `type` tag
    pub fn event_type(&self) -> &'static str {
        match self {
            ViewerEvent::BundleResolved { .. } => "BundleResolved",
            ViewerEvent::BundleFailed { .. } => "BundleFailed",
            ViewerEvent::StaleBundleDiscarded { .. } => "StaleBundleDiscarded",
            ViewerEvent::QuestionSetResolved { .. } => "QuestionSetResolved",
            ViewerEvent::QuestionSetExhausted { .. } => "QuestionSetExhausted",
            ViewerEvent::VideoViewRecorded { .. } => "VideoViewRecorded",
            ViewerEvent::AnswerRecorded { .. } => "AnswerRecorded",
            ViewerEvent::TelemetryFailed { .. } => "TelemetryFailed",
        }
    }
}

/// Broadcast bus for viewer events
///
/// Cloning is cheap; all clones share the same channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ViewerEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before slow subscribers
    ///   start missing old events
    ///
    /// # Examples
    ///
    /// ```
    /// use mav_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<ViewerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event; dropped if no subscribers are listening
    pub fn emit_lossy(&self, event: ViewerEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
