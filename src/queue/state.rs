//! # Queue State Machine
//!
//! Per-schema buffering state. Every transition is a single synchronous step
//! under a mutex, so a drain can only begin from `Queuing` and at most one
//! drain per schema is ever in flight.
//!
//! ```text
//! Active ──queue:true──▶ Queuing ──queue:false──▶ Draining ──done──▶ Active
//!                          ▲                         │
//!                          ├────────failure──────────┤
//!                          └──done, resume_queuing───┘
//! ```
//!
//! While `Draining`, writes keep buffering. A `queue:true` request during a
//! drain sets `resume_queuing`, so the drain settles in `Queuing` rather than
//! `Active`; a `queue:false` request during a drain changes nothing.

use std::fmt;

use parking_lot::Mutex;

/// Buffering mode of one schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueMode {
    #[default]
    Active,
    Queuing,
    Draining {
        resume_queuing: bool,
    },
}

impl QueueMode {
    /// Whether new secondary writes are buffered instead of executed
    pub fn is_buffering(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl fmt::Display for QueueMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Queuing => write!(f, "queuing"),
            Self::Draining { .. } => write!(f, "draining"),
        }
    }
}

/// Effect of a transition request on the state cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    /// Already in the requested mode
    Unchanged,
    EnteredQueuing,
    /// Caller owns the drain that was just started
    DrainStarted,
    /// A drain is running; the request was folded into it
    DrainInProgress,
}

/// Mutex-guarded [`QueueMode`]
#[derive(Debug, Default)]
pub struct QueueStateCell {
    mode: Mutex<QueueMode>,
}

impl QueueStateCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> QueueMode {
        *self.mode.lock()
    }

    pub fn is_buffering(&self) -> bool {
        self.mode.lock().is_buffering()
    }

    /// Apply a `queue` transition request
    pub fn request(&self, queue: bool) -> StateChange {
        let mut mode = self.mode.lock();
        match (*mode, queue) {
            (QueueMode::Active, true) => {
                *mode = QueueMode::Queuing;
                StateChange::EnteredQueuing
            }
            (QueueMode::Active, false) | (QueueMode::Queuing, true) => StateChange::Unchanged,
            (QueueMode::Queuing, false) => {
                *mode = QueueMode::Draining {
                    resume_queuing: false,
                };
                StateChange::DrainStarted
            }
            (QueueMode::Draining { .. }, true) => {
                *mode = QueueMode::Draining {
                    resume_queuing: true,
                };
                StateChange::DrainInProgress
            }
            (QueueMode::Draining { .. }, false) => StateChange::DrainInProgress,
        }
    }

    /// Settle a finished drain; returns the resulting mode
    pub fn complete_drain(&self) -> QueueMode {
        let mut mode = self.mode.lock();
        *mode = match *mode {
            QueueMode::Draining {
                resume_queuing: true,
            } => QueueMode::Queuing,
            QueueMode::Draining {
                resume_queuing: false,
            } => QueueMode::Active,
            other => other,
        };
        *mode
    }

    /// Abandon a failed drain; records stay buffered
    pub fn abort_drain(&self) -> QueueMode {
        let mut mode = self.mode.lock();
        if matches!(*mode, QueueMode::Draining { .. }) {
            *mode = QueueMode::Queuing;
        }
        *mode
    }
}
