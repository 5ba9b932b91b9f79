use moka::sync::Cache;
use tracing::debug;

use super::{Analysis, CategorySet, Classifier};
use crate::error::ClassificationError;
use crate::sanitize::hash_text;

/// Reuses the analysis of byte-identical texts within one run.
///
/// Only successful results are cached, so a failed document is retried when its twin comes along.
pub struct CachedClassifier<C> {
    inner: C,
    cache: Cache<String, Analysis>,
}

impl<C: Classifier> CachedClassifier<C> {
    pub fn new(inner: C, capacity: u64) -> Self {
        Self {
            inner,
            cache: Cache::new(capacity),
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: Classifier> Classifier for CachedClassifier<C> {
    fn classify(
        &self,
        text: &str,
        categories: &CategorySet,
    ) -> Result<Analysis, ClassificationError> {
        if let Some(hit) = self.cache.get(text) {
            debug!(text_hash = %hash_text(text), "Classification cache hit");
            return Ok(hit);
        }

        let analysis = self.inner.classify(text, categories)?;
        self.cache.insert(text.to_string(), analysis.clone());
        Ok(analysis)
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}
