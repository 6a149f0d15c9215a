//! Progress reporting for slow handler calls.
//!
//! ```text
//! Idle ──start()──► Active ──end()──► Ended
//!   │                 │ update()        ▲
//!   └─────────────────┴───── end() ─────┘
//! ```
//!
//! `start` after `Ended` is a no-op, `end` may be called any number of times.

use chrono::{DateTime, Utc};

use crate::host::Host;

/// Percent value reported while a call is still running.
const MAX_RUNNING_PERCENT: u8 = 99;

/// One progress indication sent to [`Host::write_progress`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressRecord {
    /// Identifier of the progress bar.
    pub id: u32,
    /// What is being done, e.g. "Retrieving data".
    pub activity: String,
    /// Current status, e.g. "Fetching data for 'vms'".
    pub status: String,
    /// Completion percentage, `0..=100`.
    pub percent: u8,
    /// Seconds since the indication started.
    pub elapsed_secs: i64,
    /// Set on the final record.
    pub completed: bool,
}

/// State of a [`ProgressTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressState {
    /// Not started.
    Idle,
    /// Records are being written.
    Active,
    /// Terminal.
    Ended,
}

/// Emits a bounded-percentage progress indication on a host.
#[derive(Debug)]
pub struct ProgressTracker {
    id: u32,
    activity: String,
    status: String,
    enabled: bool,
    state: ProgressState,
    percent: u8,
    started_at: Option<DateTime<Utc>>,
}

impl ProgressTracker {
    /// Create an idle tracker. A disabled tracker never writes anything.
    pub fn new(id: u32, activity: impl Into<String>, status: impl Into<String>, enabled: bool) -> Self {
        Self {
            id,
            activity: activity.into(),
            status: status.into(),
            enabled,
            state: ProgressState::Idle,
            percent: 0,
            started_at: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> ProgressState {
        self.state
    }

    /// Last reported percentage.
    pub fn percent(&self) -> u8 {
        self.percent
    }

    /// Begin reporting.
    pub fn start(&mut self, host: &dyn Host) {
        if !self.enabled || self.state != ProgressState::Idle {
            return;
        }
        self.state = ProgressState::Active;
        self.started_at = Some(Utc::now());
        self.percent = self.percent.max(1);
        host.write_progress(&self.record(false));
    }

    /// Report a new percentage. Values never go backwards and stay below 100
    /// until [`end`](Self::end).
    pub fn update(&mut self, percent: u32, host: &dyn Host) {
        if self.state != ProgressState::Active {
            return;
        }
        let percent = percent.min(u32::from(MAX_RUNNING_PERCENT)) as u8;
        self.percent = self.percent.max(percent);
        host.write_progress(&self.record(false));
    }

    /// Finish reporting. Idempotent.
    pub fn end(&mut self, host: &dyn Host) {
        if self.state == ProgressState::Active {
            self.percent = 100;
            host.write_progress(&self.record(true));
        }
        self.state = ProgressState::Ended;
    }

    fn record(&self, completed: bool) -> ProgressRecord {
        let elapsed_secs = self
            .started_at
            .map(|start| (Utc::now() - start).num_seconds())
            .unwrap_or(0);
        ProgressRecord {
            id: self.id,
            activity: self.activity.clone(),
            status: self.status.clone(),
            percent: self.percent,
            elapsed_secs,
            completed,
        }
    }
}
