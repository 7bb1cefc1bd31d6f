//! Broker seam
//!
//! The message broker is an external collaborator; the engine only
//! needs receive, ack, and nack. `MemoryBroker` backs the CLI and the
//! tests: it records verdicts instead of redelivering, so a nacked job
//! is effectively dead-lettered for inspection.

use crate::runner::job::Job;
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Debug)]
pub struct Delivery {
    pub job: Job,
    pub tag: u64,
}

#[async_trait]
pub trait JobBroker: Send + Sync {
    /// Next delivery, or `None` when the queue is drained/closed.
    async fn recv(&self) -> Option<Delivery>;
    async fn ack(&self, delivery: &Delivery) -> Result<()>;
    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Acked,
    Nacked { requeue: bool },
}

#[derive(Default)]
pub struct MemoryBroker {
    queue: Mutex<VecDeque<(u64, Job)>>,
    outcomes: Mutex<Vec<(u64, DeliveryOutcome)>>,
    next_tag: AtomicU64,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, job: Job) -> u64 {
        let tag = self.next_tag.fetch_add(1, Ordering::Relaxed);
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back((tag, job));
        tag
    }

    pub fn outcomes(&self) -> Vec<(u64, DeliveryOutcome)> {
        self.outcomes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn record(&self, tag: u64, outcome: DeliveryOutcome) {
        self.outcomes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((tag, outcome));
    }
}

#[async_trait]
impl JobBroker for MemoryBroker {
    async fn recv(&self) -> Option<Delivery> {
        let (tag, job) = self
            .queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()?;
        Some(Delivery { job, tag })
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        self.record(delivery.tag, DeliveryOutcome::Acked);
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<()> {
        self.record(delivery.tag, DeliveryOutcome::Nacked { requeue });
        Ok(())
    }
}
