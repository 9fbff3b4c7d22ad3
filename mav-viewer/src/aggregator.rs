//! Single-call bundle aggregation
//!
//! One entity, one GET. The content service does the joining; this side only
//! picks the endpoint and normalizes what comes back. A response that is
//! neither a bundle nor an envelope around one is a failure, never an empty
//! bundle.

use crate::error::{ViewerError, ViewerResult};
use crate::locator::EntityRef;
use crate::model::{AssetBundle, BUNDLE_KEYS};
use crate::transport::{unwrap_envelope, ContentSource, RequestContext};
use std::sync::Arc;

/// Resolves an [`EntityRef`] into its [`AssetBundle`]
pub struct ContentAggregator<S: ContentSource> {
    source: Arc<S>,
}

impl<S: ContentSource> Clone for ContentAggregator<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
        }
    }
}

impl<S: ContentSource> ContentAggregator<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self { source }
    }

    /// Fetch the aggregated bundle for `entity`
    ///
    /// Any transport or decode failure becomes `AggregationFailed` carrying
    /// the original message. Retrying is the caller's choice: call again
    /// with the same reference.
    pub async fn resolve(
        &self,
        entity: &EntityRef,
        ctx: &RequestContext,
    ) -> ViewerResult<AssetBundle> {
        let path = entity.resource_path();
        tracing::debug!(kind = %entity.kind(), path = %path, "Resolving asset bundle");

        let raw = self.source.get_json(&path, &[], ctx).await.map_err(|e| {
            tracing::warn!(path = %path, error = %e, "Bundle request failed");
            ViewerError::AggregationFailed(e.to_string())
        })?;

        let raw = unwrap_envelope(raw, &BUNDLE_KEYS);

        // Every bundle field defaults, so an unrelated object would decode
        // as an empty bundle.
        let has_bundle_fields = raw
            .as_object()
            .is_some_and(|map| BUNDLE_KEYS.iter().any(|k| map.contains_key(*k)));
        if !has_bundle_fields {
            tracing::warn!(path = %path, "Bundle response carries no bundle fields");
            return Err(ViewerError::AggregationFailed(
                "Malformed bundle: no bundle fields in response".to_string(),
            ));
        }

        let bundle: AssetBundle = serde_json::from_value(raw).map_err(|e| {
            tracing::warn!(path = %path, error = %e, "Bundle response malformed");
            ViewerError::AggregationFailed(format!("Malformed bundle: {}", e))
        })?;

        tracing::info!(
            kind = %entity.kind(),
            path = %path,
            title = %bundle.item.title,
            summaries = bundle.summaries.len(),
            videos = bundle.videos.len(),
            pyqs = bundle.pyqs.len(),
            objective_sets = bundle.objective_sets.total_sets(),
            subjective_sets = bundle.subjective_sets.total_sets(),
            "Resolved asset bundle"
        );

        Ok(bundle)
    }
}
