// SPDX-FileCopyrightText: 2026 Serialite Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Result table: where the worker deposits outcomes keyed by ticket.
//!
//! Each registered ticket owns a oneshot sender. A deposited outcome counts
//! as unconsumed until the waiting caller takes it out of its [`Pending`],
//! or until the caller turns out to be gone. The worker reads that count to
//! decide whether the system is quiescent.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serialite_core::{Rows, SerialiteError};
use tokio::sync::oneshot;
use tracing::debug;

use crate::queue::Ticket;

/// The outcome of one job.
pub type Outcome = Result<Rows, SerialiteError>;

/// Decrements the unconsumed counter when the deposited outcome goes away.
struct Unconsumed(Arc<AtomicUsize>);

impl Drop for Unconsumed {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

struct Delivery {
    outcome: Outcome,
    _unconsumed: Unconsumed,
}

impl Delivery {
    fn into_outcome(self) -> Outcome {
        let Delivery {
            outcome,
            _unconsumed,
        } = self;
        outcome
    }
}

/// Ticket-keyed completion slots.
#[derive(Default)]
pub struct ResultTable {
    slots: DashMap<Ticket, oneshot::Sender<Delivery>>,
    unconsumed: Arc<AtomicUsize>,
}

impl ResultTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the slot for `ticket` and returns the caller's half.
    pub fn register(&self, ticket: Ticket) -> Result<Pending, SerialiteError> {
        match self.slots.entry(ticket) {
            Entry::Occupied(_) => Err(SerialiteError::Internal(format!(
                "ticket {ticket} already has an outstanding slot"
            ))),
            Entry::Vacant(vacant) => {
                let (tx, rx) = oneshot::channel();
                vacant.insert(tx);
                Ok(Pending { ticket, rx })
            }
        }
    }

    /// Deposits the outcome for `ticket`. Returns false when nobody is
    /// waiting any more, in which case the outcome is discarded.
    pub fn deliver(&self, ticket: Ticket, outcome: Outcome) -> bool {
        let Some((_, tx)) = self.slots.remove(&ticket) else {
            debug!(%ticket, "no slot registered, discarding outcome");
            return false;
        };

        self.unconsumed.fetch_add(1, Ordering::AcqRel);
        let delivery = Delivery {
            outcome,
            _unconsumed: Unconsumed(Arc::clone(&self.unconsumed)),
        };
        if tx.send(delivery).is_err() {
            debug!(%ticket, "caller went away, discarding outcome");
            return false;
        }
        true
    }

    /// Drops the slot for a job that never made it into the queue.
    pub fn cancel(&self, ticket: Ticket) {
        self.slots.remove(&ticket);
    }

    /// Outcomes deposited but not yet taken by their callers.
    pub fn unconsumed(&self) -> usize {
        self.unconsumed.load(Ordering::Acquire)
    }

    /// Slots registered and still waiting for the worker.
    pub fn outstanding(&self) -> usize {
        self.slots.len()
    }
}

/// A submitted job whose outcome has not been taken yet.
#[must_use = "a pending job does nothing unless waited on"]
pub struct Pending {
    ticket: Ticket,
    rx: oneshot::Receiver<Delivery>,
}

impl Pending {
    pub fn ticket(&self) -> Ticket {
        self.ticket
    }

    /// Waits for the outcome from async code.
    pub async fn wait(self) -> Outcome {
        match self.rx.await {
            Ok(delivery) => delivery.into_outcome(),
            Err(_) => Err(SerialiteError::Stopped),
        }
    }

    /// Waits for the outcome from a plain thread.
    ///
    /// Must not be called from inside an async runtime.
    pub fn wait_blocking(self) -> Outcome {
        match self.rx.blocking_recv() {
            Ok(delivery) => delivery.into_outcome(),
            Err(_) => Err(SerialiteError::Stopped),
        }
    }
}
