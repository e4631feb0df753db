// SPDX-FileCopyrightText: 2026 Serialite Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`SqlQueue`]: the in-process client proxy in front of the worker.
//!
//! Any number of threads or tasks may hold a clone. Each call becomes a job
//! on the queue and waits on its own result slot, so callers never touch
//! the connection and never observe each other's results.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use async_trait::async_trait;
use serialite_config::model::CoordinatorConfig;
use serialite_core::{
    Coordinator, ExecError, HealthStatus, Param, RowShape, Rows, SerialiteError,
};
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::backup;
use crate::handle::DbHandle;
use crate::queue::{self, Job, JobQueue};
use crate::results::Pending;
use crate::scheduler::InactivityScheduler;
use crate::worker::{Shared, StatsSnapshot, Worker, WorkerState};

/// Handle to a running single-writer coordinator. Cheap to clone.
#[derive(Clone)]
pub struct SqlQueue {
    inner: Arc<Inner>,
}

struct Inner {
    queue: JobQueue,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<Result<(), ExecError>>>>,
    database_path: PathBuf,
}

impl SqlQueue {
    /// Takes ownership of the database file and starts the worker.
    ///
    /// With `auto_backup` an existing database file is copied before the
    /// first connect.
    pub fn open(config: &CoordinatorConfig) -> Result<Self, SerialiteError> {
        if !config.is_server {
            return Err(SerialiteError::Config(
                "coordinator.is_server is false; connect with an RPC client instead".to_string(),
            ));
        }

        let database_path = PathBuf::from(&config.database_path);
        let backup_root = config.backup_root();

        if config.auto_backup && database_path.exists() {
            backup::rotate(&database_path, &backup_root, chrono::Local::now())?;
        }

        let mut handle = DbHandle::new(&database_path);
        handle.connect()?;

        let (queue, jobs) = queue::channel();
        let shared = Arc::new(Shared::default());
        let backup_threshold = config
            .auto_backup
            .then_some(config.backup_inactivity_ticks);

        let worker = Worker {
            handle,
            jobs,
            scheduler: InactivityScheduler::new(config.commit_inactivity_ticks, backup_threshold),
            shared: Arc::clone(&shared),
            backup_root,
            auto_backup: config.auto_backup,
            tick: config.tick_interval(),
        };
        let join = worker.spawn().map_err(|e| {
            SerialiteError::Internal(format!("failed to spawn worker thread: {e}"))
        })?;

        info!(path = %database_path.display(), "coordinator opened");
        Ok(Self {
            inner: Arc::new(Inner {
                queue,
                shared,
                worker: Mutex::new(Some(join)),
                database_path,
            }),
        })
    }

    /// Queues a statement and returns the slot its outcome will land in.
    ///
    /// The outcome stays intact until [`Pending::wait`] or
    /// [`Pending::wait_blocking`] takes it.
    pub fn submit(
        &self,
        statement: &str,
        params: Vec<Param>,
        shape: RowShape,
    ) -> Result<Pending, SerialiteError> {
        if self.state() != WorkerState::Running {
            return Err(SerialiteError::Stopped);
        }

        let results = &self.inner.shared.results;
        let ticket = self.inner.queue.ticket();
        let pending = results.register(ticket)?;
        let job = Job {
            ticket,
            statement: normalize_statement(statement),
            params,
            shape,
        };
        if let Err(err) = self.inner.queue.push(job) {
            results.cancel(ticket);
            return Err(err);
        }
        Ok(pending)
    }

    /// Runs a statement from a plain thread. Must not be called from inside
    /// an async runtime.
    pub fn sql_blocking(
        &self,
        statement: &str,
        params: Vec<Param>,
        shape: RowShape,
    ) -> Result<Rows, SerialiteError> {
        self.submit(statement, params, shape)?.wait_blocking()
    }

    /// Commits from a plain thread.
    pub fn commit_blocking(&self) -> Result<(), SerialiteError> {
        let rx = self.request_commit()?;
        rx.blocking_recv()
            .map_err(|_| SerialiteError::Stopped)?
            .map_err(SerialiteError::from)
    }

    /// Takes a backup from a plain thread.
    pub fn backup_blocking(&self) -> Result<PathBuf, SerialiteError> {
        let rx = self.request_backup()?;
        backup_outcome(rx.blocking_recv())
    }

    /// Stops the worker from a plain thread and waits for it to exit.
    ///
    /// Fails when the final commit did not make the drained jobs durable.
    pub fn stop_blocking(&self) -> Result<(), SerialiteError> {
        self.inner.shared.request_stop();
        match self.take_worker() {
            Some(join) => joined(join.join()),
            None => Ok(()),
        }
    }

    pub fn state(&self) -> WorkerState {
        self.inner.shared.state()
    }

    pub fn health(&self) -> HealthStatus {
        self.inner.shared.health.status()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.shared.stats.snapshot()
    }

    /// Jobs waiting for the worker.
    pub fn queued(&self) -> usize {
        self.inner.queue.len()
    }

    /// Results delivered but not yet taken by their callers.
    pub fn unconsumed(&self) -> usize {
        self.inner.shared.results.unconsumed()
    }

    pub fn database_path(&self) -> &Path {
        &self.inner.database_path
    }

    fn request_commit(&self) -> Result<oneshot::Receiver<Result<(), ExecError>>, SerialiteError> {
        let (tx, rx) = oneshot::channel();
        self.inner.shared.requests.request_commit(tx)?;
        Ok(rx)
    }

    fn request_backup(&self) -> Result<oneshot::Receiver<Result<PathBuf, String>>, SerialiteError> {
        let (tx, rx) = oneshot::channel();
        self.inner.shared.requests.request_backup(tx)?;
        Ok(rx)
    }

    fn take_worker(&self) -> Option<JoinHandle<Result<(), ExecError>>> {
        self.inner
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

fn joined(
    outcome: std::thread::Result<Result<(), ExecError>>,
) -> Result<(), SerialiteError> {
    match outcome {
        Ok(released) => released.map_err(SerialiteError::from),
        Err(_) => Err(SerialiteError::Internal("worker thread panicked".to_string())),
    }
}

fn backup_outcome<E>(
    received: Result<Result<PathBuf, String>, E>,
) -> Result<PathBuf, SerialiteError> {
    match received {
        Ok(Ok(path)) => Ok(path),
        Ok(Err(message)) => Err(SerialiteError::Backup {
            source: message.into(),
        }),
        Err(_) => Err(SerialiteError::Stopped),
    }
}

#[async_trait]
impl Coordinator for SqlQueue {
    async fn sql(
        &self,
        statement: &str,
        params: Vec<Param>,
        shape: RowShape,
    ) -> Result<Rows, SerialiteError> {
        self.submit(statement, params, shape)?.wait().await
    }

    async fn commit(&self) -> Result<(), SerialiteError> {
        let rx = self.request_commit()?;
        rx.await
            .map_err(|_| SerialiteError::Stopped)?
            .map_err(SerialiteError::from)
    }

    async fn backup(&self) -> Result<PathBuf, SerialiteError> {
        let rx = self.request_backup()?;
        backup_outcome(rx.await)
    }

    async fn stop(&self) -> Result<(), SerialiteError> {
        self.inner.shared.request_stop();
        let Some(join) = self.take_worker() else {
            return Ok(());
        };
        let outcome = tokio::task::spawn_blocking(move || join.join())
            .await
            .map_err(|e| SerialiteError::Internal(format!("join task failed: {e}")))?;
        joined(outcome)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let join = self
            .worker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(join) = join {
            self.shared.request_stop();
            match join.join() {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(error = %err, "final commit failed during drop"),
                Err(_) => warn!("worker thread panicked during shutdown"),
            }
        }
    }
}

/// Drops `--` comment lines, trims each line and joins the rest with a
/// single space.
pub fn normalize_statement(statement: &str) -> String {
    statement
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("--"))
        .collect::<Vec<_>>()
        .join(" ")
}
