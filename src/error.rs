use std::time::Duration;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Store key or configuration field that caused the error (e.g., "llm_cache_stats", "config.min_ttl")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected type, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "memory_store", "stats_registry")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for the response cache.
///
/// Only [`Error::Encoding`] is ever surfaced by the cache hot path; every other
/// variant is logged and degraded to "miss" / "not cached" by the callers.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Cache key encoding error: {message}{}", format_context(.context))]
    Encoding {
        message: String,
        context: ErrorContext,
    },

    #[error("Key-value store unavailable: {message}{}", format_context(.context))]
    StoreUnavailable {
        message: String,
        context: ErrorContext,
    },

    #[error("Operation `{operation}` is not supported by the {backend} store")]
    Unsupported {
        operation: &'static str,
        backend: &'static str,
    },

    #[error("Timed out after {waited:?} waiting for lock `{key}`")]
    LockTimeout { key: String, waited: Duration },

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Inference error: {message}{}", format_context(.context))]
    Inference {
        message: String,
        context: ErrorContext,
    },

    #[error("Runtime error: {message}{}", format_context(.context))]
    Runtime {
        message: String,
        context: ErrorContext,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] serde_yaml::Error),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// Create a key encoding error with structured context
    pub fn encoding_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Encoding {
            message: msg.into(),
            context,
        }
    }

    /// Create a store-unavailable error with structured context
    pub fn store_unavailable(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::StoreUnavailable {
            message: msg.into(),
            context,
        }
    }

    /// Create a configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Create an inference error with structured context
    pub fn inference_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Inference {
            message: msg.into(),
            context,
        }
    }

    /// Create a runtime error with structured context
    pub fn runtime_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Runtime {
            message: msg.into(),
            context,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Encoding { context, .. }
            | Error::StoreUnavailable { context, .. }
            | Error::Configuration { context, .. }
            | Error::Inference { context, .. }
            | Error::Runtime { context, .. } => Some(context),
            _ => None,
        }
    }

    /// True for failures of the backing store, which cache operations degrade on.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Error::StoreUnavailable { .. } | Error::Unsupported { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context_parts() {
        let err = Error::store_unavailable(
            "connection refused",
            ErrorContext::new()
                .with_field_path("llm_cache_stats")
                .with_source("redis"),
        );
        let text = err.to_string();
        assert!(text.contains("connection refused"));
        assert!(text.contains("field: llm_cache_stats"));
        assert!(text.contains("source: redis"));
        assert!(err.is_store_failure());
    }

    #[test]
    fn display_without_context_has_no_suffix() {
        let err = Error::runtime_with_context("boom", ErrorContext::new());
        assert_eq!(err.to_string(), "Runtime error: boom");
        assert!(err.context().is_some());
    }

    #[test]
    fn unsupported_names_operation_and_backend() {
        let err = Error::Unsupported {
            operation: "keys",
            backend: "null",
        };
        assert_eq!(
            err.to_string(),
            "Operation `keys` is not supported by the null store"
        );
        assert!(err.context().is_none());
    }
}
