//! Error types for the scoring library.

use std::fmt;

/// Result type alias for scoring operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Every failure the scoring core can report. All of them are recoverable at
/// the session level; only transport loss ends a session.
#[derive(Debug)]
pub enum SyncError {
    /// A joint index is outside the frame.
    MissingJoint { index: usize, joint_count: usize },
    /// Zero-length limb or zero extent where a divisor was needed.
    DegenerateGeometry(&'static str),
    /// A frame arrived before any choreography was selected.
    NoLevelLoaded,
    /// Incoming data could not be shaped into a frame of the expected topology.
    MalformedFrame(String),
    /// A joint name is not part of the topology.
    UnknownJoint { name: String, topology: &'static str },
    /// An angle definition names neither two nor three joints.
    InvalidAngle { label: String, joints: usize },
    /// The level identifier does not resolve to any configured level.
    UnknownLevel(String),
    /// The animation source is unusable (empty, ragged, bad frame time).
    Animation(String),
    /// OSC encode/decode failure.
    Osc(String),
    /// Wrapped `std::io::Error`.
    Io(std::io::Error),
    /// JSON (de)serialization failure.
    Json(String),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingJoint { index, joint_count } => {
                write!(f, "missing joint {index} (frame has {joint_count} joints)")
            }
            Self::DegenerateGeometry(what) => write!(f, "degenerate geometry: {what}"),
            Self::NoLevelLoaded => write!(f, "no level loaded"),
            Self::MalformedFrame(msg) => write!(f, "malformed frame: {msg}"),
            Self::UnknownJoint { name, topology } => {
                write!(f, "unknown joint '{name}' for topology {topology}")
            }
            Self::InvalidAngle { label, joints } => {
                write!(f, "angle '{label}' needs 2 or 3 joints, got {joints}")
            }
            Self::UnknownLevel(id) => write!(f, "unknown level '{id}'"),
            Self::Animation(msg) => write!(f, "animation error: {msg}"),
            Self::Osc(msg) => write!(f, "OSC error: {msg}"),
            Self::Io(err) => write!(f, "IO error: {err}"),
            Self::Json(msg) => write!(f, "JSON error: {msg}"),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<rosc::OscError> for SyncError {
    fn from(err: rosc::OscError) -> Self {
        Self::Osc(format!("{err:?}"))
    }
}
