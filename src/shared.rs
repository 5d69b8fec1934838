use crate::context::{ExceptionContext, RequestContext};
use crate::error::{ConfigError, SanitizeError};
use crate::formatter::RecordSanitizer;
use crate::init::FormatterConfig;
use crate::record::LogEvent;
use std::sync::{Arc, PoisonError, RwLock};

/// Hot-swappable handle around an immutable [`RecordSanitizer`].
///
/// Readers clone the current `Arc` and format without holding the lock, so
/// a reload never exposes a half-updated allow-list.
#[derive(Debug)]
pub struct SharedSanitizer {
    current: RwLock<Arc<RecordSanitizer>>,
}

impl SharedSanitizer {
    pub fn new(sanitizer: RecordSanitizer) -> Self {
        Self { current: RwLock::new(Arc::new(sanitizer)) }
    }

    pub fn load(&self) -> Arc<RecordSanitizer> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replace the active sanitizer, returning the previous one.
    pub fn swap(&self, sanitizer: RecordSanitizer) -> Arc<RecordSanitizer> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, Arc::new(sanitizer))
    }

    /// Build a sanitizer from `config` (keeping the current collaborators)
    /// and swap it in. On error the active sanitizer is left untouched.
    pub fn reload(&self, config: &FormatterConfig) -> Result<(), ConfigError> {
        let next = self.load().reconfigure(config)?;
        self.swap(next);
        tracing::debug!(target: crate::INTERNAL_TARGET, "sanitizer configuration reloaded");
        Ok(())
    }

    pub fn format(
        &self,
        event: &LogEvent,
        request: Option<&RequestContext>,
        exception: Option<&ExceptionContext>,
    ) -> Result<Vec<u8>, SanitizeError> {
        self.load().format(event, request, exception)
    }
}
