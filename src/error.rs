//! # Error Handling
//!
//! This module implements the error taxonomy from spec §7 as a single
//! hierarchical enum with rich context, mirroring the shape the teacher
//! repo's screen-capture error system used (`ErrorContext` + classification
//! traits) rather than a flat `thiserror` enum — the teacher never depended
//! on `thiserror`, and this crate keeps that ambient choice.
//!
//! ## Error Classification
//!
//! Errors are classified using traits:
//!
//! - `Retryable`: Errors that can be retried (spec §7.1, §7.2, §7.6)
//! - `Recoverable`: Errors that can be recovered from with fallback strategies
//! - `HasSeverity` / `HasRecoverySuggestion`: metadata for logging and alerting
//!
//! Every component converts faults to a `DetectError` and handles them
//! locally (spec §7 propagation policy: "no exceptions cross component
//! boundaries"); only `DetectError::Fatal` is expected to reach
//! [`crate::lifecycle`] and trigger the per-channel shutdown token.
//!
//! ## Usage
//!
//! ```rust
//! use dolphin_watch::error::{DetectError, ErrorContext, Retryable};
//!
//! let error = DetectError::processing("reconstruct", "tile count mismatch")
//!     .with_context("joining tile results for frame 42")
//!     .with_recovery_suggestion("drop the frame and continue");
//!
//! if error.is_retryable() {
//!     // implement retry logic
//! }
//! ```

use std::{error::Error as StdError, fmt, time::SystemTime};

/// Severity levels for errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
    Fatal,
}

/// Metadata about when and where an error occurred.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub timestamp: SystemTime,
    pub operation: Option<String>,
    pub context: Option<String>,
    pub recovery_suggestion: Option<String>,
    pub source_location: Option<String>,
    pub severity: ErrorSeverity,
    pub retryable: bool,
    pub recoverable: bool,
    pub metadata: std::collections::HashMap<String, String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            timestamp: SystemTime::now(),
            operation: None,
            context: None,
            recovery_suggestion: None,
            source_location: None,
            severity: ErrorSeverity::Error,
            retryable: false,
            recoverable: false,
            metadata: std::collections::HashMap::new(),
        }
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// The channel-level error taxonomy described in spec §7. One variant per
/// failure class; `Fatal`-severity instances are the only ones expected to
/// propagate a channel's shutdown token.
#[derive(Debug)]
pub enum DetectError {
    /// Configuration validation errors (spec §6 recognised options).
    Config {
        field: String,
        value: String,
        reason: String,
        context: ErrorContext,
    },
    /// Controller startup failures (workspace creation, channel wiring).
    ChannelInit {
        channel: String,
        reason: String,
        context: ErrorContext,
    },
    /// Frame ingest failures — spec §7.1 "transient ingest gap" lives here.
    Ingest {
        reason: String,
        context: ErrorContext,
    },
    /// Motion/reconstruction pipeline errors (spec §7.4 tile-worker fault).
    Processing {
        operation: String,
        reason: String,
        context: ErrorContext,
    },
    /// Event Recorder / Annotated Re-streamer output errors (spec §7.5, §7.6).
    Streaming {
        target: String,
        reason: String,
        context: ErrorContext,
    },
    /// Frame Cache / Render Cache allocation or pin failures.
    Resource {
        resource: String,
        reason: String,
        context: ErrorContext,
    },
    /// Classifier/SSD call failures (spec §7.3).
    Classifier {
        model: String,
        reason: String,
        context: ErrorContext,
    },
    /// I/O errors (clip files, bbox.json, workspace directories).
    Io {
        operation: String,
        path: Option<String>,
        source: std::io::Error,
        context: ErrorContext,
    },
    /// GStreamer pipeline errors from the Event Recorder or Re-streamer.
    GStreamer {
        element: Option<String>,
        message: String,
        context: ErrorContext,
    },
    /// External collaborator errors (classifier, SSD, transport) that don't
    /// fit a more specific variant.
    External {
        component: String,
        source: Box<dyn StdError + Send + Sync>,
        context: ErrorContext,
    },
    /// Cache-miss retry exhaustion and blocking-send deadline misses
    /// (spec §7.2, §4.1 per-tile deadline).
    Timeout {
        operation: String,
        duration_ms: u64,
        context: ErrorContext,
    },
    /// Config field validation (range/shape checks).
    Validation {
        field: String,
        constraint: String,
        value: String,
        context: ErrorContext,
    },
    /// Invalid state transitions (Recorder state machine, TrackSession).
    State {
        current_state: String,
        attempted_operation: String,
        reason: String,
        context: ErrorContext,
    },
    /// Outbound messaging transport errors (spec §6 messaging interface).
    Transport {
        operation: String,
        endpoint: Option<String>,
        source: Option<Box<dyn StdError + Send + Sync>>,
        context: ErrorContext,
    },
    /// Anything else, carrying structured data for logging.
    Custom {
        category: String,
        message: String,
        data: serde_json::Value,
        context: ErrorContext,
    },
}

impl DetectError {
    pub fn config(field: impl Into<String>, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn channel_init(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ChannelInit {
            channel: channel.into(),
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn ingest(reason: impl Into<String>) -> Self {
        Self::Ingest {
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn processing(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Processing {
            operation: operation.into(),
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn streaming(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Streaming {
            target: target.into(),
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn resource(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Resource {
            resource: resource.into(),
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn classifier(model: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Classifier {
            model: model.into(),
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: None,
            source,
            context: ErrorContext::new(),
        }
    }

    pub fn io_at(operation: impl Into<String>, path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: Some(path.into()),
            source,
            context: ErrorContext::new(),
        }
    }

    pub fn gstreamer(element: Option<String>, message: impl Into<String>) -> Self {
        Self::GStreamer {
            element,
            message: message.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn external(component: impl Into<String>, source: impl StdError + Send + Sync + 'static) -> Self {
        Self::External {
            component: component.into(),
            source: Box::new(source),
            context: ErrorContext::new(),
        }
    }

    pub fn timeout(operation: impl Into<String>, duration_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration_ms,
            context: ErrorContext::new(),
        }
    }

    pub fn validation(field: impl Into<String>, constraint: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            constraint: constraint.into(),
            value: value.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn state(current_state: impl Into<String>, attempted_operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::State {
            current_state: current_state.into(),
            attempted_operation: attempted_operation.into(),
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn transport(operation: impl Into<String>) -> Self {
        Self::Transport {
            operation: operation.into(),
            endpoint: None,
            source: None,
            context: ErrorContext::new(),
        }
    }

    pub fn custom(category: impl Into<String>, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self::Custom {
            category: category.into(),
            message: message.into(),
            data,
            context: ErrorContext::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context_mut().context = Some(context.into());
        self
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.context_mut().operation = Some(operation.into());
        self
    }

    pub fn with_recovery_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.context_mut().recovery_suggestion = Some(suggestion.into());
        self
    }

    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.context_mut().severity = severity;
        self
    }

    pub fn retryable(mut self) -> Self {
        self.context_mut().retryable = true;
        self
    }

    pub fn recoverable(mut self) -> Self {
        self.context_mut().recoverable = true;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context_mut().metadata.insert(key.into(), value.into());
        self
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::Config { context, .. }
            | Self::ChannelInit { context, .. }
            | Self::Ingest { context, .. }
            | Self::Processing { context, .. }
            | Self::Streaming { context, .. }
            | Self::Resource { context, .. }
            | Self::Classifier { context, .. }
            | Self::Io { context, .. }
            | Self::GStreamer { context, .. }
            | Self::External { context, .. }
            | Self::Timeout { context, .. }
            | Self::Validation { context, .. }
            | Self::State { context, .. }
            | Self::Transport { context, .. }
            | Self::Custom { context, .. } => context,
        }
    }

    fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            Self::Config { context, .. }
            | Self::ChannelInit { context, .. }
            | Self::Ingest { context, .. }
            | Self::Processing { context, .. }
            | Self::Streaming { context, .. }
            | Self::Resource { context, .. }
            | Self::Classifier { context, .. }
            | Self::Io { context, .. }
            | Self::GStreamer { context, .. }
            | Self::External { context, .. }
            | Self::Timeout { context, .. }
            | Self::Validation { context, .. }
            | Self::State { context, .. }
            | Self::Transport { context, .. }
            | Self::Custom { context, .. } => context,
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::ChannelInit { .. } => "channel_init",
            Self::Ingest { .. } => "ingest",
            Self::Processing { .. } => "processing",
            Self::Streaming { .. } => "streaming",
            Self::Resource { .. } => "resource",
            Self::Classifier { .. } => "classifier",
            Self::Io { .. } => "io",
            Self::GStreamer { .. } => "gstreamer",
            Self::External { .. } => "external",
            Self::Timeout { .. } => "timeout",
            Self::Validation { .. } => "validation",
            Self::State { .. } => "state",
            Self::Transport { .. } => "transport",
            Self::Custom { .. } => "custom",
        }
    }
}

impl fmt::Display for DetectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { field, value, reason, .. } => {
                write!(f, "config error in '{field}': {reason} (value: {value})")
            }
            Self::ChannelInit { channel, reason, .. } => {
                write!(f, "failed to initialize channel {channel}: {reason}")
            }
            Self::Ingest { reason, .. } => write!(f, "frame ingest failed: {reason}"),
            Self::Processing { operation, reason, .. } => {
                write!(f, "processing failed during {operation}: {reason}")
            }
            Self::Streaming { target, reason, .. } => write!(f, "streaming to {target} failed: {reason}"),
            Self::Resource { resource, reason, .. } => {
                write!(f, "resource allocation failed for {resource}: {reason}")
            }
            Self::Classifier { model, reason, .. } => write!(f, "classifier '{model}' failed: {reason}"),
            Self::Io { operation, path, source, .. } => match path {
                Some(path) => write!(f, "I/O error during {operation} on '{path}': {source}"),
                None => write!(f, "I/O error during {operation}: {source}"),
            },
            Self::GStreamer { element, message, .. } => match element {
                Some(element) => write!(f, "GStreamer error in element '{element}': {message}"),
                None => write!(f, "GStreamer error: {message}"),
            },
            Self::External { component, source, .. } => write!(f, "external component '{component}' failed: {source}"),
            Self::Timeout { operation, duration_ms, .. } => {
                write!(f, "timeout during {operation} after {duration_ms}ms")
            }
            Self::Validation { field, constraint, value, .. } => {
                write!(f, "validation failed for '{field}': {constraint} (value: {value})")
            }
            Self::State { current_state, attempted_operation, reason, .. } => write!(
                f,
                "invalid transition from '{current_state}' attempting '{attempted_operation}': {reason}"
            ),
            Self::Transport { operation, endpoint, .. } => match endpoint {
                Some(endpoint) => write!(f, "transport error during {operation} on {endpoint}"),
                None => write!(f, "transport error during {operation}"),
            },
            Self::Custom { category, message, .. } => write!(f, "custom error [{category}]: {message}"),
        }
    }
}

impl StdError for DetectError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::External { source, .. } => Some(source.as_ref()),
            Self::Transport { source: Some(source), .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

pub type DetectResult<T> = Result<T, DetectError>;

/// Errors that can be retried (spec §7 recovery column).
pub trait Retryable {
    fn is_retryable(&self) -> bool;
    fn retry_delay_ms(&self) -> Option<u64> {
        None
    }
    fn max_retries(&self) -> Option<usize> {
        None
    }
}

impl Retryable for DetectError {
    fn is_retryable(&self) -> bool {
        self.context().retryable
            || matches!(self, Self::Timeout { .. } | Self::Transport { .. } | Self::Resource { .. } | Self::Io { .. })
    }

    fn retry_delay_ms(&self) -> Option<u64> {
        match self {
            // spec §7.2: cache miss retried at 100ms intervals.
            Self::Timeout { .. } => Some(100),
            Self::Transport { .. } => Some(2000),
            Self::Resource { .. } => Some(500),
            Self::Io { .. } => Some(100),
            _ => None,
        }
    }

    fn max_retries(&self) -> Option<usize> {
        match self {
            // spec §7.2: retried up to 24 times.
            Self::Timeout { .. } => Some(24),
            Self::Transport { .. } => Some(5),
            Self::Resource { .. } => Some(10),
            Self::Io { .. } => Some(3),
            _ => None,
        }
    }
}

/// Errors that can be recovered from locally, without surfacing shutdown.
pub trait Recoverable {
    fn is_recoverable(&self) -> bool;
    fn recovery_strategies(&self) -> Vec<RecoveryStrategy>;
}

#[derive(Debug, Clone)]
pub enum RecoveryStrategy {
    Retry { max_attempts: usize, delay_ms: u64 },
    Fallback { description: String },
    Reinitialize { component: String },
    Skip { reason: String },
    Degrade { description: String },
}

impl Recoverable for DetectError {
    fn is_recoverable(&self) -> bool {
        self.context().recoverable
            || matches!(
                self,
                Self::Timeout { .. } | Self::Transport { .. } | Self::Resource { .. } | Self::Processing { .. } | Self::Streaming { .. } | Self::Classifier { .. }
            )
    }

    fn recovery_strategies(&self) -> Vec<RecoveryStrategy> {
        match self {
            Self::Timeout { .. } => vec![
                RecoveryStrategy::Retry { max_attempts: 24, delay_ms: 100 },
                RecoveryStrategy::Skip { reason: "drop frame from downstream".into() },
            ],
            Self::Classifier { .. } => vec![RecoveryStrategy::Fallback {
                description: "treat frame as negative".into(),
            }],
            Self::Streaming { .. } => vec![
                RecoveryStrategy::Reinitialize { component: "encoder".into() },
                RecoveryStrategy::Skip { reason: "abandon active clip".into() },
            ],
            Self::Processing { .. } => vec![RecoveryStrategy::Skip { reason: "drop tile-set for this frame".into() }],
            Self::Resource { .. } => vec![RecoveryStrategy::Degrade { description: "evict oldest half of cache".into() }],
            Self::Transport { .. } => vec![RecoveryStrategy::Retry { max_attempts: 5, delay_ms: 2000 }],
            _ => vec![],
        }
    }
}

pub trait HasSeverity {
    fn severity(&self) -> ErrorSeverity;
}

impl HasSeverity for DetectError {
    fn severity(&self) -> ErrorSeverity {
        self.context().severity
    }
}

pub trait HasRecoverySuggestion {
    fn recovery_suggestion(&self) -> Option<&str>;
}

impl HasRecoverySuggestion for DetectError {
    fn recovery_suggestion(&self) -> Option<&str> {
        self.context().recovery_suggestion.as_deref()
    }
}

/// Marks errors that must propagate the channel's shutdown token
/// (spec §7.7: "only shutdown is surfaced to the supervisor").
pub trait Fatal {
    fn is_fatal(&self) -> bool;
}

impl Fatal for DetectError {
    fn is_fatal(&self) -> bool {
        self.severity() == ErrorSeverity::Fatal
    }
}

/// Marks errors that may resolve themselves without intervention
/// (spec §7.1 transient ingest gap).
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for DetectError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Ingest { .. } | Self::Timeout { .. } | Self::Transport { .. })
    }
}

pub mod classify {
    use super::*;

    pub fn is_transient(error: &DetectError) -> bool {
        Transient::is_transient(error)
    }

    pub fn is_fatal(error: &DetectError) -> bool {
        matches!(error, DetectError::Config { .. } | DetectError::ChannelInit { .. } | DetectError::Validation { .. })
            || error.severity() == ErrorSeverity::Fatal
    }

    pub fn requires_operator_attention(error: &DetectError) -> bool {
        error.severity() >= ErrorSeverity::Critical
    }

    pub fn priority(error: &DetectError) -> u8 {
        match error.severity() {
            ErrorSeverity::Debug => 0,
            ErrorSeverity::Info => 1,
            ErrorSeverity::Warning => 2,
            ErrorSeverity::Error => 3,
            ErrorSeverity::Critical => 4,
            ErrorSeverity::Fatal => 5,
        }
    }
}

impl From<std::io::Error> for DetectError {
    fn from(error: std::io::Error) -> Self {
        Self::io("unknown", error)
    }
}

#[cfg(feature = "gstreamer")]
impl From<gstreamer::glib::Error> for DetectError {
    fn from(error: gstreamer::glib::Error) -> Self {
        Self::gstreamer(None, error.to_string())
    }
}

impl From<serde_json::Error> for DetectError {
    fn from(error: serde_json::Error) -> Self {
        Self::external("serde_json", error)
    }
}

/// Fluent builder for attaching context to an already-constructed error.
pub struct ErrorBuilder {
    error: DetectError,
}

impl ErrorBuilder {
    pub fn new(error: DetectError) -> Self {
        Self { error }
    }

    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.error = self.error.with_context(context);
        self
    }

    pub fn operation(mut self, operation: impl Into<String>) -> Self {
        self.error = self.error.with_operation(operation);
        self
    }

    pub fn recovery_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.error = self.error.with_recovery_suggestion(suggestion);
        self
    }

    pub fn severity(mut self, severity: ErrorSeverity) -> Self {
        self.error = self.error.with_severity(severity);
        self
    }

    pub fn retryable(mut self) -> Self {
        self.error = self.error.retryable();
        self
    }

    pub fn recoverable(mut self) -> Self {
        self.error = self.error.recoverable();
        self
    }

    pub fn build(self) -> DetectError {
        self.error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_creation_carries_category() {
        let error = DetectError::config("shape", "0x0", "must be non-zero");
        assert_eq!(error.category(), "config");
        assert!(!error.is_retryable());
    }

    #[test]
    fn with_context_chain_builds_up() {
        let error = DetectError::processing("reconstruct", "tile count mismatch")
            .with_context("joining tile results for frame 42")
            .with_recovery_suggestion("drop the frame and continue")
            .retryable();

        assert_eq!(error.category(), "processing");
        assert!(error.is_retryable());
        assert_eq!(
            error.recovery_suggestion(),
            Some("drop the frame and continue")
        );
    }

    #[test]
    fn timeout_matches_spec_retry_budget() {
        let error = DetectError::timeout("frame_cache_lookup", 100);
        assert!(error.is_retryable());
        assert_eq!(error.retry_delay_ms(), Some(100));
        assert_eq!(error.max_retries(), Some(24));
    }

    #[test]
    fn fatal_severity_propagates_shutdown() {
        let error = DetectError::ingest("queue closed").with_severity(ErrorSeverity::Fatal);
        assert!(error.is_fatal());
        assert!(classify::is_fatal(&error));
    }

    #[test]
    fn config_errors_are_fatal_by_default_category() {
        let error = DetectError::config("invalid", "value", "reason");
        assert!(classify::is_fatal(&error));
    }

    #[test]
    fn ingest_gap_is_transient() {
        let error = DetectError::ingest("queue empty beyond idle timeout");
        assert!(error.is_transient());
    }
}
