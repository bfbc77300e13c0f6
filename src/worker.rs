use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::error::{Result, SummaryError};
use crate::refresher::{RefreshOptions, RefreshOutcome, Refresher};
use crate::target::SummaryTarget;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewEventKind {
    Created,
    Edited,
    Unhidden,
}

/// What the web layer reports once a review write has committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewEvent {
    pub review_id: i64,
    pub course_id: Option<i64>,
    pub instructor_id: Option<i64>,
    pub club_id: Option<i64>,
    pub kind: ReviewEventKind,
}

impl ReviewEvent {
    pub fn target(&self) -> Result<SummaryTarget> {
        SummaryTarget::from_parts(self.course_id, self.instructor_id, self.club_id)
    }
}

/// Background pool that refreshes summaries off the request path.
///
/// `notify` is the post-commit hook: call it after the transaction that wrote
/// the review has committed, so workers see the review. It never blocks on
/// generation.
pub struct SummaryDispatcher {
    sender: Option<Sender<SummaryTarget>>,
    pending: Arc<Mutex<HashSet<SummaryTarget>>>,
    workers: Vec<JoinHandle<()>>,
}

impl SummaryDispatcher {
    pub fn start(refresher: Arc<Refresher>, workers: usize) -> Self {
        let (sender, receiver) = unbounded();
        let pending = Arc::new(Mutex::new(HashSet::new()));

        let workers = (0..workers.max(1))
            .map(|n| {
                let refresher = Arc::clone(&refresher);
                let receiver = receiver.clone();
                let pending = Arc::clone(&pending);
                thread::Builder::new()
                    .name(format!("summary-worker-{n}"))
                    .spawn(move || work(&refresher, &receiver, &pending))
            })
            .filter_map(|spawned| match spawned {
                Ok(handle) => Some(handle),
                Err(e) => {
                    log::error!("failed to spawn summary worker: {e}");
                    None
                }
            })
            .collect();

        SummaryDispatcher {
            sender: Some(sender),
            pending,
            workers,
        }
    }

    /// Queue a refresh for the event's target. Returns `false` when the
    /// target was already waiting in the queue.
    pub fn notify(&self, event: &ReviewEvent) -> Result<bool> {
        let target = event.target()?;
        let sender = self.sender.as_ref().ok_or(SummaryError::QueueClosed)?;

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if !pending.insert(target) {
            log::debug!("{target}: refresh already queued (review {})", event.review_id);
            return Ok(false);
        }
        if sender.send(target).is_err() {
            pending.remove(&target);
            return Err(SummaryError::QueueClosed);
        }

        log::debug!("{target}: queued refresh after review {} {:?}", event.review_id, event.kind);
        Ok(true)
    }

    /// Stop accepting work, let the workers drain the queue, and wait for them.
    pub fn shutdown(mut self) {
        self.close();
    }

    fn close(&mut self) {
        self.sender.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::error!("summary worker exited abnormally");
            }
        }
    }
}

impl Drop for SummaryDispatcher {
    fn drop(&mut self) {
        self.close();
    }
}

fn work(
    refresher: &Refresher,
    receiver: &Receiver<SummaryTarget>,
    pending: &Mutex<HashSet<SummaryTarget>>,
) {
    // Ends once the dispatcher drops its sender and the queue is drained.
    for target in receiver.iter() {
        // Cleared before running so reviews landing mid-run queue another pass.
        pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&target);

        run_one(refresher, &target);
    }
}

fn run_one(refresher: &Refresher, target: &SummaryTarget) {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        refresher.refresh(target, &RefreshOptions::default())
    }));

    match result {
        Ok(Ok(RefreshOutcome::Updated { last_review_id, .. })) => {
            log::info!("{target}: background refresh wrote summary up to review {last_review_id}");
        }
        Ok(Ok(outcome)) => log::debug!("{target}: background refresh: {outcome:?}"),
        Ok(Err(e)) => log::error!("{target}: background refresh failed: {e}"),
        Err(panic) => log::error!("{target}: background refresh panicked: {}", panic_message(&*panic)),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}
