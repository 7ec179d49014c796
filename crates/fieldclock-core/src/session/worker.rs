//! Day-record persistence off the input path.
//!
//! A [`SessionStore`] moved onto a blocking task. The tracking actor hands it
//! write jobs and store queries over an unbounded queue and never waits for
//! the disk. The dirty set and write retries stay with the store, so a failed
//! write is retried by the next job that writes.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{GpsSession, RecordSink, SessionStore, SessionTotals};
use crate::error::{CoreError, DatabaseError};
use crate::events::GpsEvent;

enum Job {
    Event {
        date: NaiveDate,
        event: GpsEvent,
        totals: SessionTotals,
    },
    Totals {
        date: NaiveDate,
        totals: SessionTotals,
    },
    Snapshot {
        key: String,
        json: String,
    },
    Load {
        date: NaiveDate,
        reply: oneshot::Sender<Result<Option<GpsSession>, DatabaseError>>,
    },
    Clear {
        date: NaiveDate,
        reply: oneshot::Sender<Result<NaiveDate, DatabaseError>>,
    },
}

/// Handle to a store running on its own blocking task.
pub struct StoreWorker {
    tx: mpsc::UnboundedSender<Job>,
    pending: Arc<AtomicUsize>,
    task: JoinHandle<SessionStore>,
}

impl StoreWorker {
    /// Move `store` onto a blocking task. Must be called from within a tokio
    /// runtime.
    pub fn spawn(store: SessionStore) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(store.pending_writes()));
        let counter = Arc::clone(&pending);
        let task = tokio::task::spawn_blocking(move || run(store, rx, counter));
        Self { tx, pending, task }
    }

    /// Read the record for `date` after every job queued before it.
    pub fn load(
        &self,
        date: NaiveDate,
        reply: oneshot::Sender<Result<Option<GpsSession>, DatabaseError>>,
    ) {
        self.send(Job::Load { date, reply });
    }

    /// Delete the record for `date`; the reply carries the date back.
    pub fn clear(&self, date: NaiveDate, reply: oneshot::Sender<Result<NaiveDate, DatabaseError>>) {
        self.send(Job::Clear { date, reply });
    }

    /// Finish the queued jobs and hand the store back.
    ///
    /// # Errors
    /// `ServiceStopped` if the worker task panicked.
    pub async fn shutdown(self) -> Result<SessionStore, CoreError> {
        let Self { tx, task, .. } = self;
        drop(tx);
        task.await.map_err(|_| CoreError::ServiceStopped)
    }

    fn send(&self, job: Job) {
        if self.tx.send(job).is_err() {
            warn!("Store worker stopped, job dropped");
        }
    }
}

impl RecordSink for StoreWorker {
    fn record_event(&mut self, date: NaiveDate, event: GpsEvent, totals: SessionTotals) {
        self.send(Job::Event {
            date,
            event,
            totals,
        });
    }

    fn record_totals(&mut self, date: NaiveDate, totals: SessionTotals) {
        self.send(Job::Totals { date, totals });
    }

    fn record_snapshot(&mut self, key: &str, json: &str) {
        self.send(Job::Snapshot {
            key: key.to_string(),
            json: json.to_string(),
        });
    }

    fn pending_writes(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }
}

fn run(
    mut store: SessionStore,
    mut rx: mpsc::UnboundedReceiver<Job>,
    pending: Arc<AtomicUsize>,
) -> SessionStore {
    let mut batch = Vec::new();
    while let Some(job) = rx.blocking_recv() {
        batch.push(job);
        while let Ok(job) = rx.try_recv() {
            batch.push(job);
        }

        // Only the newest snapshot per key in a batch is written.
        let mut seen = HashSet::new();
        let superseded: Vec<bool> = batch
            .iter()
            .rev()
            .map(|job| match job {
                Job::Snapshot { key, .. } => !seen.insert(key.clone()),
                _ => false,
            })
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();

        for (job, skip) in batch.drain(..).zip(superseded) {
            match job {
                Job::Event {
                    date,
                    event,
                    totals,
                } => {
                    store.append_event(date, event, totals);
                }
                Job::Totals { date, totals } => {
                    store.update_totals(date, totals);
                }
                Job::Snapshot { key, json } => {
                    if !skip {
                        store.record_snapshot(&key, &json);
                    }
                }
                Job::Load { date, reply } => {
                    let _ = reply.send(store.load_by_date(date));
                }
                Job::Clear { date, reply } => {
                    let _ = reply.send(store.clear_date(date).map(|()| date));
                }
            }
        }
        pending.store(store.pending_writes(), Ordering::Relaxed);
    }

    debug!("Store worker stopped");
    store
}
