//! Per-file fetch driver: chunk partitioning and the worker pool.
//!
//! Workers pull tasks from a shared queue and report completions on one
//! channel; a worker that finds every source failed reports on a second
//! channel and exits. [`Scheduler::fetch`] blocks on both channels until the
//! completion count reaches the task count (success) or every worker has given
//! up (failure), whichever comes first. Workers that all exit with chunks
//! still missing also end the run as a failure.

mod progress;
mod queue;

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::{select, unbounded, Receiver, Sender};
use tracing::{debug, error, info};

use crate::manager::Manager;
use crate::segmenter::plan_chunks;
use crate::task::{CompletedChunk, Task, TaskOutcome};
use crate::transport::Transport;

pub use progress::ProgressStats;
pub use queue::TaskQueue;

/// Channel the CLI listens on for [`ProgressStats`].
pub type ProgressSender = tokio::sync::mpsc::Sender<ProgressStats>;

/// Terminal state of one [`Scheduler::fetch`] run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Every task completed.
    Succeeded,
    /// Every worker gave up, or the workers ran out with chunks missing.
    Failed,
}

impl fmt::Display for FetchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FetchOutcome::Succeeded => "succeeded",
            FetchOutcome::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchReport {
    pub outcome: FetchOutcome,
    pub tasks_total: usize,
    pub tasks_completed: usize,
    pub workers: usize,
    pub workers_given_up: usize,
    /// Chunks whose fetch failed; their ranges were not retried.
    pub tasks_dropped: usize,
    /// Bytes counted from completed chunks.
    pub bytes: u64,
    pub elapsed: Duration,
}

enum Event {
    Completed(CompletedChunk),
    GaveUp(usize),
    Closed,
}

pub struct Scheduler {
    manager: Arc<Manager>,
    transport: Arc<dyn Transport>,
    path: String,
    total_size: u64,
    queue: Arc<TaskQueue>,
    task_count: usize,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("path", &self.path)
            .field("total_size", &self.total_size)
            .field("task_count", &self.task_count)
            .field("pending", &self.queue.len())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Partitions `[0, total_size)` into chunk-sized tasks.
    pub fn new(
        manager: Arc<Manager>,
        transport: Arc<dyn Transport>,
        path: impl Into<String>,
        total_size: u64,
    ) -> Self {
        let chunks = plan_chunks(total_size, manager.chunk_size());
        let task_count = chunks.len();
        Self {
            manager,
            transport,
            path: path.into(),
            total_size,
            queue: Arc::new(TaskQueue::new(chunks.into_iter().map(Task::new))),
            task_count,
        }
    }

    pub fn task_count(&self) -> usize {
        self.task_count
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Pops the next pending task.
    pub fn get_task(&self) -> Option<Task> {
        self.queue.pop()
    }

    /// Runs the worker pool until the file is done or no source is left.
    ///
    /// Blocking; call from `spawn_blocking` when used from async code. When
    /// `progress` is given, a [`ProgressStats`] is offered after every
    /// completed chunk (dropped if the receiver is behind).
    pub fn fetch(self, progress: Option<&ProgressSender>) -> Result<FetchReport> {
        let started = Instant::now();
        let tasks_total = self.queue.len();
        info!(
            path = %self.path,
            size = self.total_size,
            tasks = tasks_total,
            workers = self.manager.worker_count(),
            "fetch started"
        );

        if tasks_total == 0 {
            return Ok(FetchReport {
                outcome: FetchOutcome::Succeeded,
                tasks_total,
                tasks_completed: 0,
                workers: 0,
                workers_given_up: 0,
                tasks_dropped: 0,
                bytes: 0,
                elapsed: started.elapsed(),
            });
        }

        let (done_tx, done_rx) = unbounded();
        let (gave_up_tx, gave_up_rx) = unbounded();
        let dropped = Arc::new(AtomicUsize::new(0));
        let workers = self.manager.worker_count();
        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let worker = Worker {
                id,
                manager: Arc::clone(&self.manager),
                transport: Arc::clone(&self.transport),
                queue: Arc::clone(&self.queue),
                path: self.path.clone(),
                dropped: Arc::clone(&dropped),
            };
            let done_tx = done_tx.clone();
            let gave_up_tx = gave_up_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("mfetch-worker-{id}"))
                .spawn(move || worker.run(&done_tx, &gave_up_tx))
                .with_context(|| format!("spawn worker {id}"))?;
            handles.push(handle);
        }
        drop(done_tx);
        drop(gave_up_tx);

        let mut tally = Tally::new(tasks_total, self.total_size, started);
        let outcome = loop {
            let event = select! {
                recv(done_rx) -> msg => msg.map(Event::Completed).unwrap_or(Event::Closed),
                recv(gave_up_rx) -> msg => msg.map(Event::GaveUp).unwrap_or(Event::Closed),
            };
            match event {
                Event::Completed(chunk) => {
                    tally.completed(&chunk, progress);
                    if tally.tasks_completed == tasks_total {
                        break FetchOutcome::Succeeded;
                    }
                }
                Event::GaveUp(id) => {
                    tally.workers_given_up += 1;
                    debug!(worker = id, "worker gave up");
                    if tally.workers_given_up == workers {
                        break FetchOutcome::Failed;
                    }
                }
                Event::Closed => break tally.settle(&done_rx, &gave_up_rx, progress),
            }
        };

        join_workers(handles)?;

        let report = FetchReport {
            outcome,
            tasks_total,
            tasks_completed: tally.tasks_completed,
            workers,
            workers_given_up: tally.workers_given_up,
            tasks_dropped: dropped.load(Ordering::Relaxed),
            bytes: tally.bytes,
            elapsed: started.elapsed(),
        };
        match outcome {
            FetchOutcome::Succeeded => info!(
                path = %self.path,
                bytes = report.bytes,
                elapsed_secs = report.elapsed.as_secs_f64(),
                "fetch succeeded"
            ),
            FetchOutcome::Failed if self.manager.all_sources_failed() => error!(
                path = %self.path,
                completed = report.tasks_completed,
                total = tasks_total,
                "fetch failed: all sources failed"
            ),
            FetchOutcome::Failed => error!(
                path = %self.path,
                completed = report.tasks_completed,
                dropped = report.tasks_dropped,
                total = tasks_total,
                "fetch failed: chunks dropped"
            ),
        }
        Ok(report)
    }
}

struct Tally {
    tasks_total: usize,
    tasks_completed: usize,
    workers_given_up: usize,
    bytes: u64,
    total_size: u64,
    started: Instant,
}

impl Tally {
    fn new(tasks_total: usize, total_size: u64, started: Instant) -> Self {
        Self {
            tasks_total,
            tasks_completed: 0,
            workers_given_up: 0,
            bytes: 0,
            total_size,
            started,
        }
    }

    /// All workers are gone: count whatever is still buffered, then decide.
    /// Anything short of every chunk is a failure.
    fn settle(
        &mut self,
        done_rx: &Receiver<CompletedChunk>,
        gave_up_rx: &Receiver<usize>,
        progress: Option<&ProgressSender>,
    ) -> FetchOutcome {
        for chunk in done_rx.try_iter() {
            self.completed(&chunk, progress);
        }
        self.workers_given_up += gave_up_rx.try_iter().count();

        if self.tasks_completed == self.tasks_total {
            FetchOutcome::Succeeded
        } else {
            FetchOutcome::Failed
        }
    }

    fn completed(&mut self, chunk: &CompletedChunk, progress: Option<&ProgressSender>) {
        self.tasks_completed += 1;
        self.bytes += chunk.bytes;
        if let Some(tx) = progress {
            let _ = tx.try_send(ProgressStats {
                bytes_done: self.bytes,
                total_bytes: self.total_size,
                elapsed_secs: self.started.elapsed().as_secs_f64(),
                chunks_done: self.tasks_completed,
                chunk_count: self.tasks_total,
            });
        }
    }
}

struct Worker {
    id: usize,
    manager: Arc<Manager>,
    transport: Arc<dyn Transport>,
    queue: Arc<TaskQueue>,
    path: String,
    dropped: Arc<AtomicUsize>,
}

impl Worker {
    /// Gives up (and says so) once every source has failed; exits silently
    /// when the queue is drained.
    fn run(&self, done_tx: &Sender<CompletedChunk>, gave_up_tx: &Sender<usize>) {
        loop {
            if self.manager.all_sources_failed() {
                let _ = gave_up_tx.send(self.id);
                return;
            }
            let Some(task) = self.queue.pop() else {
                debug!(worker = self.id, "queue drained");
                return;
            };
            match task.run(&self.manager, self.transport.as_ref(), &self.path) {
                TaskOutcome::Completed(chunk) => {
                    if done_tx.send(chunk).is_err() {
                        return;
                    }
                }
                TaskOutcome::Dropped { .. } => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
                // The next check gives up.
                TaskOutcome::NoSources => {}
            }
        }
    }
}

fn join_workers(handles: Vec<JoinHandle<()>>) -> Result<()> {
    let mut panicked = 0usize;
    for h in handles {
        if h.join().is_err() {
            panicked += 1;
        }
    }
    if panicked > 0 {
        anyhow::bail!("{} worker(s) panicked", panicked);
    }
    Ok(())
}
