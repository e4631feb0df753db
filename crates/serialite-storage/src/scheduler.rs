// SPDX-FileCopyrightText: 2026 Serialite Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inactivity-driven commit and backup decisions.
//!
//! The scheduler is pure bookkeeping. The worker reports what happened in
//! each loop iteration and acts on the returned [`IdleDecision`].

/// What the worker should do at the end of an idle iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdleDecision {
    pub commit: bool,
    pub backup: bool,
}

impl IdleDecision {
    pub fn is_noop(&self) -> bool {
        !self.commit && !self.backup
    }
}

/// Tracks idle iterations since the last commit and the last backup.
#[derive(Debug, Clone)]
pub struct InactivityScheduler {
    commit_threshold: u64,
    backup_threshold: Option<u64>,
    ticks_since_commit: u64,
    ticks_since_backup: u64,
}

impl InactivityScheduler {
    /// `backup_threshold` is `None` when implicit backups are disabled.
    pub fn new(commit_threshold: u64, backup_threshold: Option<u64>) -> Self {
        Self {
            commit_threshold,
            backup_threshold,
            ticks_since_commit: 0,
            ticks_since_backup: 0,
        }
    }

    pub fn ticks_since_commit(&self) -> u64 {
        self.ticks_since_commit
    }

    pub fn ticks_since_backup(&self) -> u64 {
        self.ticks_since_backup
    }

    /// A job ran; any pending idle action starts counting from zero again.
    pub fn job_processed(&mut self) {
        self.ticks_since_commit = 0;
        self.ticks_since_backup = 0;
    }

    /// An explicit commit ran.
    pub fn committed(&mut self) {
        self.ticks_since_commit = 0;
    }

    /// An explicit backup ran.
    pub fn backed_up(&mut self) {
        self.ticks_since_backup = 0;
    }

    /// Accounts for one idle iteration.
    ///
    /// `quiescent` is false while explicit requests are pending or callers
    /// have not yet collected delivered results; counters still advance but
    /// no action fires. A counter that fires resets to zero.
    pub fn on_idle(&mut self, quiescent: bool) -> IdleDecision {
        let commit = quiescent && self.ticks_since_commit >= self.commit_threshold;
        if commit {
            self.ticks_since_commit = 0;
        } else {
            self.ticks_since_commit = self.ticks_since_commit.saturating_add(1);
        }

        let backup = match self.backup_threshold {
            Some(threshold) => {
                let fire = quiescent && self.ticks_since_backup >= threshold;
                if fire {
                    self.ticks_since_backup = 0;
                } else {
                    self.ticks_since_backup = self.ticks_since_backup.saturating_add(1);
                }
                fire
            }
            None => false,
        };

        IdleDecision { commit, backup }
    }
}
