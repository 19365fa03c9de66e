//! Logging context for a modeling run
//!
//! A `SdmContext` is created once by the caller and handed by reference to
//! each public entry point. It owns the `tracing` span that groups every
//! event of one run and knows how to report a failure before it propagates.
//!
//! Entry points run their body through [`SdmContext::scope`]. Nested scopes
//! only trace a failure at debug level; the outermost scope reports it
//! with its category, so each error is logged once at error level.

use crate::error::{Error, ErrorCategory, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info_span, Span};

/// Explicit logging handle for one modeling run.
///
/// Clones share the run: same span, same scope nesting.
#[derive(Debug, Clone)]
pub struct SdmContext {
    run: String,
    span: Span,
    depth: Arc<AtomicUsize>,
}

impl SdmContext {
    /// Create a context whose events are grouped under `run`.
    pub fn new(run: impl Into<String>) -> Self {
        let run = run.into();
        let span = info_span!("sdm", run = %run);
        Self {
            run,
            span,
            depth: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Name of the run
    pub fn run(&self) -> &str {
        &self.run
    }

    /// Span to enter around the work of an entry point
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Run `f` as the public operation `operation`.
    ///
    /// The body runs inside the run span. A failure is returned unchanged,
    /// after being reported by [`SdmContext::fail`] when this is the
    /// outermost scope.
    pub fn scope<T>(&self, operation: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        self.depth.fetch_add(1, Ordering::SeqCst);
        let result = {
            let _enter = self.span.enter();
            f()
        };
        let outermost = self.depth.fetch_sub(1, Ordering::SeqCst) == 1;
        result.map_err(|e| {
            if outermost {
                self.fail(operation, e)
            } else {
                let _enter = self.span.enter();
                debug!(operation, "failed: {}", e);
                e
            }
        })
    }

    /// Log `err` with a message specific to its category.
    ///
    /// The error itself is left untouched so callers can write
    /// `.map_err(|e| ctx.fail("op", e))`.
    pub fn fail(&self, operation: &str, err: Error) -> Error {
        let _guard = self.span.enter();
        match err.category() {
            ErrorCategory::Validation => {
                error!(operation, "validation failed: {}", err);
            }
            ErrorCategory::Numerical => {
                error!(operation, "numerical failure: {}", err);
            }
            ErrorCategory::Unexpected => {
                error!(operation, "unexpected error: {}", err);
            }
        }
        err
    }
}

impl Default for SdmContext {
    fn default() -> Self {
        Self::new("default")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fail_returns_same_error() {
        let ctx = SdmContext::new("test");
        let err = ctx.fail("central point", Error::NoInput("nothing".into()));
        assert!(matches!(err, Error::NoInput(ref m) if m == "nothing"));
        assert_eq!(ctx.run(), "test");
    }

    #[test]
    fn test_scope_passes_values_and_errors_through() {
        let ctx = SdmContext::default();
        assert_eq!(ctx.scope("ok", || Ok(3)).unwrap(), 3);

        let err = ctx
            .scope("outer", || {
                ctx.scope("inner", || -> Result<()> { Err(Error::NoData("empty".into())) })
            })
            .unwrap_err();
        assert!(matches!(err, Error::NoData(_)));
        assert_eq!(ctx.depth.load(Ordering::SeqCst), 0);
    }
}
