//! Injectable error reporting for recoverable incidents.

use crate::shapes::{ShapeId, ShapeKind};
use std::fmt;
use std::sync::{Arc, Mutex};

/// Where the operation that failed came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Local,
    Remote,
}

/// A recoverable failure the session swallowed.
#[derive(Debug, Clone, PartialEq)]
pub enum Incident {
    /// Insert rejected because the id is already taken.
    DuplicateId { id: ShapeId, origin: Origin },
    /// Update, modify or drag aimed at a shape that no longer exists.
    MissingTarget { id: ShapeId, origin: Origin },
    /// Local update whose geometry does not fit the shape.
    InvalidPatch { id: ShapeId, kind: ShapeKind },
    /// Inbound event that could not be decoded.
    MalformedEvent { reason: String },
    /// Outbound event the channel could not take.
    PublishFailed { reason: String },
}

impl Incident {
    pub fn level(&self) -> log::Level {
        match self {
            Incident::MissingTarget { .. } => log::Level::Debug,
            Incident::DuplicateId { .. }
            | Incident::InvalidPatch { .. }
            | Incident::MalformedEvent { .. }
            | Incident::PublishFailed { .. } => log::Level::Warn,
        }
    }
}

impl fmt::Display for Incident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Incident::DuplicateId { id, origin } => {
                write!(f, "{origin:?} insert rejected, duplicate id {id}")
            }
            Incident::MissingTarget { id, origin } => {
                write!(f, "{origin:?} change ignored, shape {id} not found")
            }
            Incident::InvalidPatch { id, kind } => {
                write!(f, "patch does not fit {kind} shape {id}")
            }
            Incident::MalformedEvent { reason } => write!(f, "dropped malformed event: {reason}"),
            Incident::PublishFailed { reason } => write!(f, "publish failed: {reason}"),
        }
    }
}

/// Receives incidents the session recovers from.
pub trait ErrorReporter: Send {
    fn report(&self, incident: &Incident);
}

/// Forwards incidents to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, incident: &Incident) {
        log::log!(incident.level(), "{}", incident);
    }
}

/// Keeps every incident in memory; clones share the same list.
#[derive(Debug, Default, Clone)]
pub struct RecordingReporter {
    incidents: Arc<Mutex<Vec<Incident>>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Incidents reported so far.
    pub fn incidents(&self) -> Vec<Incident> {
        match self.incidents.lock() {
            Ok(incidents) => incidents.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, incident: &Incident) {
        let mut incidents = match self.incidents.lock() {
            Ok(incidents) => incidents,
            Err(poisoned) => poisoned.into_inner(),
        };
        incidents.push(incident.clone());
    }
}
