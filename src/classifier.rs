//! # Provider Error Classification
//!
//! Maps opaque provider errors onto the three outcomes the engine acts
//! on: `NotFound` drives creation, `Transient` drives a backoff requeue,
//! `Fatal` surfaces as a terminal status.
//!
//! Provider SDKs report failures as free-form message strings, so
//! classification is a best-effort substring match. The heuristic is
//! deliberately isolated behind [`ProviderErrorClassifier`] so it can be
//! hardened or swapped for a structured-code classifier without touching
//! the engine. Unmatched errors classify as `Fatal`, never as `NotFound`:
//! misreading an unknown failure as absence would trigger a duplicate
//! create.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::provider::ProviderError;

/// Classification outcome for a provider error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// The resource does not exist at the provider
    NotFound,
    /// Provider hiccup worth retrying after a short backoff
    Transient,
    /// Unrecoverable without external intervention
    Fatal,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Transient => write!(f, "transient"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// Classification strategy. Pure, no I/O.
pub trait ProviderErrorClassifier: Send + Sync {
    fn classify(&self, error: &ProviderError) -> ErrorClass;

    /// Classifier name for logging
    fn name(&self) -> &'static str;
}

/// Message substrings recognized as "resource does not exist".
const NOT_FOUND_MARKERS: &[&str] = &["Error 404", "not found", "notFound"];

/// Known-transient signals: rate limiting, timeouts, momentary
/// unavailability.
const TRANSIENT_MARKERS: &[&str] = &[
    "DeadlineExceeded",
    "rateLimitExceeded",
    "Error 429",
    "Error 503",
    "timeout",
    "timed out",
    "Unavailable",
    "connection reset",
];

const NOT_FOUND_CODES: &[u16] = &[404];
const TRANSIENT_CODES: &[u16] = &[429, 503];

/// Default classifier matching the provider's known error shapes.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardErrorClassifier;

impl StandardErrorClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl ProviderErrorClassifier for StandardErrorClassifier {
    fn classify(&self, error: &ProviderError) -> ErrorClass {
        if let Some(code) = error.code {
            if NOT_FOUND_CODES.contains(&code) {
                return ErrorClass::NotFound;
            }
            if TRANSIENT_CODES.contains(&code) {
                return ErrorClass::Transient;
            }
        }

        let message = error.message.as_str();
        let lowered = message.to_lowercase();

        if NOT_FOUND_MARKERS
            .iter()
            .any(|m| message.contains(m) || lowered.contains(&m.to_lowercase()))
        {
            return ErrorClass::NotFound;
        }

        if TRANSIENT_MARKERS
            .iter()
            .any(|m| message.contains(m) || lowered.contains(&m.to_lowercase()))
        {
            return ErrorClass::Transient;
        }

        ErrorClass::Fatal
    }

    fn name(&self) -> &'static str {
        "standard"
    }
}
