use std::{path::PathBuf, time::Duration};

use thiserror::Error;

use crate::Time;

/// Reasons a transform is refused by the buffer. None of them affect data already stored.
#[derive(Clone, Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum InsertError {
    #[error("tf_core: frame id is empty (child '{}', parent '{}')", .child, .parent)]
    EmptyFrameId { child: String, parent: String },
    #[error("tf_core: frame '{}' cannot be its own parent", .0)]
    SelfTransform(String),
    #[error("tf_core: transform {} -> {} contains a non finite value", .parent, .child)]
    NonFinite { child: String, parent: String },
    #[error("tf_core: transform {} -> {} has a rotation of squared norm {}", .parent, .child, .norm_squared)]
    InvalidRotation {
        child: String,
        parent: String,
        norm_squared: f64,
    },
    /// The stamp is further behind the newest sample of the edge than the reorder tolerance allows.
    #[error("tf_core: OutOfOrderBeyondTolerance {} -> {} at {}, newest is {} (tolerance {:?})", .parent, .child, .stamp, .newest, .tolerance)]
    OutOfOrderBeyondTolerance {
        child: String,
        parent: String,
        stamp: Time,
        newest: Time,
        tolerance: Duration,
    },
    /// The child already has a different parent over the time this transform claims.
    #[error("tf_core: ParentConflict {} with parent {} at {} is already attached to {}", .child, .parent, .stamp, .existing)]
    ParentConflict {
        child: String,
        parent: String,
        existing: String,
        stamp: Time,
    },
    /// In the event the lock guarding the frame was poisoned by a panicking writer
    #[error("tf_core: CouldNotAcquireLock")]
    CouldNotAcquireLock,
}

/// Enumerates the ways a lookup can fail
#[derive(Clone, Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum LookupError {
    /// The frame was never inserted, neither as a child nor as a parent.
    #[error("tf_core: UnknownFrame '{}'", .0)]
    UnknownFrame(String),
    /// There is no path between the frames (disconnected trees). Waiting cannot help.
    #[error("tf_core: UnconnectedFrames {} -> {} (roots {} and {})", .from, .to, .from_root, .to_root)]
    UnconnectedFrames {
        from: String,
        to: String,
        from_root: String,
        to_root: String,
    },
    /// Error due to looking up too far in the past. I.E the information is no longer available.
    #[error("tf_core: ExtrapolationIntoPast {} -> {}, requested {} but oldest is {}", .parent, .child, .requested, .oldest)]
    ExtrapolationIntoPast {
        child: String,
        parent: String,
        requested: Time,
        oldest: Time,
    },
    /// Error due to the transform not yet being available.
    #[error("tf_core: ExtrapolationIntoFuture {} -> {}, requested {} but newest is {}", .parent, .child, .requested, .newest)]
    ExtrapolationIntoFuture {
        child: String,
        parent: String,
        requested: Time,
        newest: Time,
    },
    /// There is a loop in the path between a frame and its root.
    #[error("tf_core: LoopDetected between {} and root ({:?})", .0, .1)]
    LoopDetected(String, Vec<String>),
    #[error("tf_core: Timeout after {:?}, last error: {}", .waited, .last)]
    Timeout {
        waited: Duration,
        last: Box<LookupError>,
    },
    /// The buffer was shut down while the lookup was waiting.
    #[error("tf_core: Shutdown")]
    Shutdown,
    /// In the event the lock guarding a frame was poisoned by a panicking writer
    #[error("tf_core: CouldNotAcquireLock")]
    CouldNotAcquireLock,
}

impl LookupError {
    /// True when the data may still arrive, so waiting and retrying is worthwhile.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LookupError::ExtrapolationIntoFuture { .. })
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum BroadcastError {
    /// The listener feeding the buffer was dropped.
    #[error("tf_core: listener is gone")]
    ListenerGone,
    #[error("tf_core: listener queue is full")]
    Full,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("couldn't read config file {}", .0.display())]
    Read(PathBuf, #[source] std::io::Error),
    #[error("couldn't parse toml")]
    Toml(#[from] toml::de::Error),
    #[error("invalid value for '{}': {}", .0, .1)]
    Invalid(&'static str, String),
}
