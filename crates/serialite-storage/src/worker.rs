// SPDX-FileCopyrightText: 2026 Serialite Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The worker loop: the only code that ever touches the connection.
//!
//! Each iteration does at most one unit of work, in priority order:
//! explicit commit, explicit backup, next queued job. Idle iterations feed
//! the [`InactivityScheduler`] and sleep for one tick.

use std::backtrace::Backtrace;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serialite_core::{ExecError, HealthStatus, SerialiteError};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::backup::{self, BackupArtifact};
use crate::handle::DbHandle;
use crate::queue::{Job, JobReceiver};
use crate::results::ResultTable;
use crate::scheduler::InactivityScheduler;

/// Lifecycle of the worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    /// Accepting and processing jobs.
    Running,
    /// Draining queued jobs and running final actions.
    Stopping,
    /// Connection released; no further work happens.
    Stopped,
}

impl WorkerState {
    fn to_repr(self) -> u8 {
        match self {
            WorkerState::Running => 0,
            WorkerState::Stopping => 1,
            WorkerState::Stopped => 2,
        }
    }

    fn from_repr(repr: u8) -> Self {
        match repr {
            0 => WorkerState::Running,
            1 => WorkerState::Stopping,
            _ => WorkerState::Stopped,
        }
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WorkerState::Running => "running",
            WorkerState::Stopping => "stopping",
            WorkerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Counters maintained by the worker.
#[derive(Debug, Default)]
pub(crate) struct WorkerStats {
    jobs: AtomicU64,
    failed_jobs: AtomicU64,
    commits: AtomicU64,
    failed_commits: AtomicU64,
    backups: AtomicU64,
    failed_backups: AtomicU64,
}

/// Point-in-time copy of the worker counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub jobs: u64,
    pub failed_jobs: u64,
    pub commits: u64,
    pub failed_commits: u64,
    pub backups: u64,
    pub failed_backups: u64,
}

impl WorkerStats {
    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            jobs: self.jobs.load(Ordering::Relaxed),
            failed_jobs: self.failed_jobs.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            failed_commits: self.failed_commits.load(Ordering::Relaxed),
            backups: self.backups.load(Ordering::Relaxed),
            failed_backups: self.failed_backups.load(Ordering::Relaxed),
        }
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Degraded flag set on the first storage I/O failure.
#[derive(Debug, Default)]
pub(crate) struct HealthRecorder {
    degraded: AtomicBool,
    reason: Mutex<Option<String>>,
}

impl HealthRecorder {
    pub(crate) fn record_io_failure(&self, err: &ExecError) {
        let trace = Backtrace::force_capture();
        error!(error = %err, "storage I/O failure, coordinator degraded");
        *lock(&self.reason) = Some(format!("{err}\n{trace}"));
        self.degraded.store(true, Ordering::Release);
    }

    pub(crate) fn status(&self) -> HealthStatus {
        if !self.degraded.load(Ordering::Acquire) {
            return HealthStatus::Healthy;
        }
        HealthStatus::Degraded(lock(&self.reason).clone().unwrap_or_default())
    }
}

pub(crate) type CommitReply = oneshot::Sender<Result<(), ExecError>>;
pub(crate) type BackupReply = oneshot::Sender<Result<PathBuf, String>>;

/// Explicit commit and backup requests waiting for the worker.
#[derive(Default)]
pub(crate) struct Requests {
    inner: Mutex<RequestQueue>,
}

#[derive(Default)]
struct RequestQueue {
    commit: Vec<CommitReply>,
    backup: Vec<BackupReply>,
    closed: bool,
}

impl Requests {
    pub(crate) fn request_commit(&self, reply: CommitReply) -> Result<(), SerialiteError> {
        let mut queue = lock(&self.inner);
        if queue.closed {
            return Err(SerialiteError::Stopped);
        }
        queue.commit.push(reply);
        Ok(())
    }

    pub(crate) fn request_backup(&self, reply: BackupReply) -> Result<(), SerialiteError> {
        let mut queue = lock(&self.inner);
        if queue.closed {
            return Err(SerialiteError::Stopped);
        }
        queue.backup.push(reply);
        Ok(())
    }

    fn take_commit(&self) -> Vec<CommitReply> {
        std::mem::take(&mut lock(&self.inner).commit)
    }

    fn take_backup(&self) -> Vec<BackupReply> {
        std::mem::take(&mut lock(&self.inner).backup)
    }

    fn any_pending(&self) -> bool {
        let queue = lock(&self.inner);
        !queue.commit.is_empty() || !queue.backup.is_empty()
    }

    /// Refuses further requests. Returns whatever was still queued.
    fn close(&self) -> (Vec<CommitReply>, Vec<BackupReply>) {
        let mut queue = lock(&self.inner);
        queue.closed = true;
        (std::mem::take(&mut queue.commit), std::mem::take(&mut queue.backup))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared between the worker thread and every proxy clone.
#[derive(Default)]
pub(crate) struct Shared {
    state: AtomicU8,
    stop_requested: AtomicBool,
    pub(crate) requests: Requests,
    pub(crate) results: ResultTable,
    pub(crate) stats: WorkerStats,
    pub(crate) health: HealthRecorder,
}

impl Shared {
    pub(crate) fn state(&self) -> WorkerState {
        WorkerState::from_repr(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state.to_repr(), Ordering::Release);
        debug!(%state, "worker state changed");
    }

    pub(crate) fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }
}

/// Everything the worker thread owns.
pub(crate) struct Worker {
    pub(crate) handle: DbHandle,
    pub(crate) jobs: JobReceiver,
    pub(crate) scheduler: InactivityScheduler,
    pub(crate) shared: std::sync::Arc<Shared>,
    pub(crate) backup_root: PathBuf,
    pub(crate) auto_backup: bool,
    pub(crate) tick: Duration,
}

impl Worker {
    /// Starts the loop on a dedicated thread.
    pub(crate) fn spawn(self) -> std::io::Result<JoinHandle<Result<(), ExecError>>> {
        thread::Builder::new()
            .name("serialite-worker".to_string())
            .spawn(move || self.run())
    }

    /// Returns the outcome of the final commit and disconnect.
    fn run(mut self) -> Result<(), ExecError> {
        info!(
            path = %self.handle.path().display(),
            auto_backup = self.auto_backup,
            "worker started"
        );

        while !self.shared.stop_requested() {
            if !self.step() {
                thread::sleep(self.tick);
            }
        }

        self.shared.set_state(WorkerState::Stopping);
        self.jobs.close();
        while let Some(job) = self.jobs.dequeue_if_available() {
            self.process(job);
        }
        let (commits, backups) = self.shared.requests.close();
        if !commits.is_empty() {
            self.answer_commit(commits);
        }
        if !backups.is_empty() {
            self.answer_backup(backups);
        }
        let released = self.shutdown();
        self.shared.set_state(WorkerState::Stopped);

        let stats = self.shared.stats.snapshot();
        info!(
            jobs = stats.jobs,
            commits = stats.commits,
            backups = stats.backups,
            "worker stopped"
        );
        released
    }

    /// One loop iteration. Returns false when the iteration was idle and
    /// the caller should sleep.
    fn step(&mut self) -> bool {
        if self.serve_commit_requests() {
            return true;
        }
        if self.serve_backup_requests() {
            return true;
        }
        if let Some(job) = self.jobs.dequeue_if_available() {
            self.process(job);
            return true;
        }

        let quiescent =
            !self.shared.requests.any_pending() && self.shared.results.unconsumed() == 0;
        let decision = self.scheduler.on_idle(quiescent);
        if decision.commit {
            debug!("inactivity commit");
            let _ = self.commit();
        }
        if decision.backup {
            debug!("inactivity backup");
            let _ = self.backup();
        }
        !decision.is_noop()
    }

    fn process(&mut self, job: Job) {
        let started = Instant::now();
        let outcome = self
            .handle
            .connect()
            .and_then(|()| self.handle.execute(&job.statement, &job.params, job.shape));

        bump(&self.shared.stats.jobs);
        if let Err(err) = &outcome {
            bump(&self.shared.stats.failed_jobs);
            if err.is_io() {
                self.shared.health.record_io_failure(err);
            }
        }
        debug!(
            ticket = %job.ticket,
            elapsed_us = started.elapsed().as_micros() as u64,
            ok = outcome.is_ok(),
            "job processed"
        );

        self.shared
            .results
            .deliver(job.ticket, outcome.map_err(SerialiteError::from));
        self.scheduler.job_processed();
    }

    /// Answers every queued explicit commit request with one commit.
    fn serve_commit_requests(&mut self) -> bool {
        let waiters = self.shared.requests.take_commit();
        if waiters.is_empty() {
            return false;
        }
        self.answer_commit(waiters);
        true
    }

    fn answer_commit(&mut self, waiters: Vec<CommitReply>) {
        let outcome = self.commit();
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }

    /// Answers every queued explicit backup request with one backup.
    fn serve_backup_requests(&mut self) -> bool {
        let waiters = self.shared.requests.take_backup();
        if waiters.is_empty() {
            return false;
        }
        self.answer_backup(waiters);
        true
    }

    fn answer_backup(&mut self, waiters: Vec<BackupReply>) {
        let outcome = self
            .backup()
            .map(|artifact| artifact.destination)
            .map_err(|e| e.to_string());
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }

    fn commit(&mut self) -> Result<(), ExecError> {
        self.scheduler.committed();
        if !self.handle.is_connected() {
            return Ok(());
        }
        match self.handle.commit() {
            Ok(()) => {
                bump(&self.shared.stats.commits);
                Ok(())
            }
            Err(err) => {
                bump(&self.shared.stats.failed_commits);
                error!(error = %err, "commit failed");
                if err.is_io() {
                    self.shared.health.record_io_failure(&err);
                }
                Err(err)
            }
        }
    }

    /// Disconnect, copy, reconnect.
    fn backup(&mut self) -> Result<BackupArtifact, SerialiteError> {
        self.scheduler.backed_up();
        let result = self.rotate_quiesced();
        if let Err(err) = self.handle.connect() {
            warn!(error = %err, "reconnect after backup failed, retrying on next job");
        }
        result
    }

    fn rotate_quiesced(&mut self) -> Result<BackupArtifact, SerialiteError> {
        if let Err(err) = self.handle.disconnect() {
            bump(&self.shared.stats.failed_backups);
            error!(error = %err, "disconnect before backup failed");
            return Err(err.into());
        }
        match backup::rotate(self.handle.path(), &self.backup_root, chrono::Local::now()) {
            Ok(artifact) => {
                bump(&self.shared.stats.backups);
                Ok(artifact)
            }
            Err(err) => {
                bump(&self.shared.stats.failed_backups);
                error!(error = %err, "backup failed");
                Err(err)
            }
        }
    }

    fn shutdown(&mut self) -> Result<(), ExecError> {
        let committed = self.commit();
        if self.auto_backup {
            let _ = self.rotate_quiesced();
        }
        if let Err(err) = self.handle.disconnect() {
            error!(error = %err, "disconnect on shutdown failed");
            return committed.and(Err(err));
        }
        committed
    }
}
