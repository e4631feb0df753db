// SPDX-FileCopyrightText: 2026 Serialite Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! FIFO job queue between callers and the worker.
//!
//! Many producers hold a [`JobQueue`]; exactly one [`JobReceiver`] exists and
//! it lives on the worker thread.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serialite_core::{Param, RowShape, SerialiteError};
use tokio::sync::mpsc;

/// Correlates a job with the slot its result is delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(u64);

impl Ticket {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One unit of work for the worker.
#[derive(Debug, Clone)]
pub struct Job {
    pub ticket: Ticket,
    pub statement: String,
    pub params: Vec<Param>,
    pub shape: RowShape,
}

/// Producer side of the queue. Cheap to clone.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<Job>,
    next_ticket: Arc<AtomicU64>,
    depth: Arc<AtomicUsize>,
}

/// Consumer side of the queue, owned by the worker.
pub struct JobReceiver {
    rx: mpsc::UnboundedReceiver<Job>,
    depth: Arc<AtomicUsize>,
}

/// Creates a connected producer/consumer pair.
pub fn channel() -> (JobQueue, JobReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let depth = Arc::new(AtomicUsize::new(0));
    (
        JobQueue {
            tx,
            next_ticket: Arc::new(AtomicU64::new(1)),
            depth: Arc::clone(&depth),
        },
        JobReceiver { rx, depth },
    )
}

impl JobQueue {
    /// Mints a ticket that no other job in this queue will ever carry.
    pub fn ticket(&self) -> Ticket {
        Ticket(self.next_ticket.fetch_add(1, Ordering::Relaxed))
    }

    /// Appends a job with an already-minted ticket.
    pub fn push(&self, job: Job) -> Result<(), SerialiteError> {
        self.depth.fetch_add(1, Ordering::AcqRel);
        if self.tx.send(job).is_err() {
            self.depth.fetch_sub(1, Ordering::AcqRel);
            return Err(SerialiteError::Stopped);
        }
        Ok(())
    }

    /// Mints a ticket and appends the job in one step.
    pub fn enqueue(
        &self,
        statement: impl Into<String>,
        params: Vec<Param>,
        shape: RowShape,
    ) -> Result<Ticket, SerialiteError> {
        let ticket = self.ticket();
        self.push(Job {
            ticket,
            statement: statement.into(),
            params,
            shape,
        })?;
        Ok(ticket)
    }

    /// Jobs waiting to be dequeued.
    pub fn len(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl JobReceiver {
    /// Takes the oldest job without blocking.
    pub fn dequeue_if_available(&mut self) -> Option<Job> {
        let job = self.rx.try_recv().ok()?;
        self.depth.fetch_sub(1, Ordering::AcqRel);
        Some(job)
    }

    pub fn len(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Refuses new jobs. Jobs already queued can still be dequeued.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_and_unique_tickets() {
        let (queue, mut rx) = channel();
        let a = queue.enqueue("SELECT 1", vec![], RowShape::Mapping).unwrap();
        let b = queue.enqueue("SELECT 2", vec![], RowShape::Positional).unwrap();
        assert_ne!(a, b);
        assert_eq!(queue.len(), 2);

        let first = rx.dequeue_if_available().unwrap();
        assert_eq!(first.ticket, a);
        assert_eq!(first.statement, "SELECT 1");
        let second = rx.dequeue_if_available().unwrap();
        assert_eq!(second.ticket, b);
        assert_eq!(second.shape, RowShape::Positional);

        assert!(rx.dequeue_if_available().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn closed_queue_rejects_but_drains() {
        let (queue, mut rx) = channel();
        queue.enqueue("SELECT 1", vec![], RowShape::Mapping).unwrap();
        rx.close();

        let err = queue
            .enqueue("SELECT 2", vec![], RowShape::Mapping)
            .unwrap_err();
        assert!(matches!(err, SerialiteError::Stopped));
        assert!(queue.is_closed());

        assert!(rx.dequeue_if_available().is_some());
        assert!(rx.dequeue_if_available().is_none());
        assert_eq!(rx.len(), 0);
    }

    #[test]
    fn producers_on_many_threads() {
        let (queue, mut rx) = channel();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let queue = queue.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        queue.enqueue("SELECT 1", vec![], RowShape::Mapping).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut tickets = Vec::new();
        while let Some(job) = rx.dequeue_if_available() {
            tickets.push(job.ticket);
        }
        tickets.sort();
        tickets.dedup();
        assert_eq!(tickets.len(), 200);
    }
}
