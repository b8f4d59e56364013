//! Session span lifecycle and event recording.
//!
//! The core never talks to an exporter directly; it only opens `tracing`
//! spans and emits `tracing::event!`s at connection and error boundaries.
//! Wiring those to Prometheus/OTel/etc. is the embedder's job.

use crate::error::ErrorCategory;
use tracing::{Span, field, info_span};

/// One span per control connection, entered for the lifetime of the session.
pub fn session_span(protocol: &'static str, peer: std::net::SocketAddr) -> Span {
    info_span!("session", protocol, %peer, user = field::Empty, secure = field::Empty)
}

pub fn record_authenticated(span: &Span, user: &str) {
    span.record("user", user);
}

pub fn record_secure(span: &Span, secure: bool) {
    span.record("secure", secure);
}

pub fn error_category_label(category: ErrorCategory) -> &'static str {
    match category {
        ErrorCategory::Transport => "TRANSPORT",
        ErrorCategory::Protocol => "PROTOCOL",
        ErrorCategory::Auth => "AUTH",
        ErrorCategory::Authorization => "AUTHORIZATION",
        ErrorCategory::NotFound => "NOT_FOUND",
        ErrorCategory::Conflict => "CONFLICT",
        ErrorCategory::LimitExceeded => "LIMIT_EXCEEDED",
        ErrorCategory::Internal => "INTERNAL",
        ErrorCategory::Shutdown => "SHUTDOWN",
    }
}

macro_rules! emit_error_event {
    ($category:expr, $($arg:tt)*) => {
        tracing::warn!(category = $crate::telemetry::error_category_label($category), $($arg)*);
    };
}
pub(crate) use emit_error_event;
