//! One chunk's execution: acquire a source, fetch the range, record the outcome.

use std::io::{ErrorKind, Read};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::FetchError;
use crate::manager::{Manager, SourceHandle};
use crate::segmenter::ChunkRange;
use crate::transport::{join_url, Ticker, Transport, READ_BUFFER_SIZE};

/// Acquisition backoff, in average chunk durations.
const BACKOFF_CHUNKS: u32 = 3;

/// Lower bound on measured elapsed time so instant transfers stay finite.
const MIN_ELAPSED_SECS: f64 = 1e-6;

/// A chunk to fetch. Immutable; run it with [`Task::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Task {
    range: ChunkRange,
}

/// A successfully fetched chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedChunk {
    pub range: ChunkRange,
    pub source: String,
    pub bytes: u64,
    pub started_at: Instant,
    pub finished_at: Instant,
}

impl CompletedChunk {
    pub fn elapsed(&self) -> Duration {
        self.finished_at.saturating_duration_since(self.started_at)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Completed(CompletedChunk),
    /// Every source failed before one could be acquired.
    NoSources,
    /// The fetch failed; the range is dropped, not requeued.
    Dropped { source: String },
}

impl Task {
    pub fn new(range: ChunkRange) -> Self {
        Self { range }
    }

    pub fn range(&self) -> ChunkRange {
        self.range
    }

    /// Waits for a source (polling with backoff), fetches the range from it and
    /// feeds the result back into the manager.
    pub fn run(&self, manager: &Manager, transport: &dyn Transport, path: &str) -> TaskOutcome {
        let Some(source) = acquire(manager) else {
            debug!(range = %self.range, "abandoning task: all sources failed");
            return TaskOutcome::NoSources;
        };

        let url = join_url(&source.host, path);
        let started_at = Instant::now();
        match fetch_range(transport, &url, self.range, source.speed_limit) {
            Ok(bytes) => {
                let finished_at = Instant::now();
                let elapsed = finished_at.saturating_duration_since(started_at);
                let speed = bytes as f64 / elapsed.as_secs_f64().max(MIN_ELAPSED_SECS);
                manager.record_chunk_speed(&source, elapsed, speed);
                manager.record_downloaded(&source, bytes);
                manager.release_source(&source);
                debug!(
                    source = %source.id,
                    start = self.range.start,
                    end = self.range.end,
                    bytes,
                    speed,
                    "chunk done"
                );
                TaskOutcome::Completed(CompletedChunk {
                    range: self.range,
                    source: source.id,
                    bytes,
                    started_at,
                    finished_at,
                })
            }
            Err(e) => {
                manager.record_error(&source, &e);
                warn!(source = %source.id, range = %self.range, "chunk dropped: {}", e);
                TaskOutcome::Dropped { source: source.id }
            }
        }
    }
}

/// Polls the manager until it lends a source or every source has failed.
fn acquire(manager: &Manager) -> Option<SourceHandle> {
    loop {
        if let Some(source) = manager.get_source() {
            return Some(source);
        }
        if manager.all_sources_failed() {
            return None;
        }
        thread::sleep(manager.average_chunk_duration() * BACKOFF_CHUNKS);
    }
}

/// Issues the ranged GET and drains the body, pacing reads when the source
/// has a speed limit. Returns the number of bytes read; the bytes themselves
/// are discarded.
pub fn fetch_range(
    transport: &dyn Transport,
    url: &str,
    range: ChunkRange,
    speed_limit: u64,
) -> Result<u64, FetchError> {
    let mut response = transport.open_range(url, range)?;
    if !response.is_success() {
        return Err(FetchError::Http(response.status));
    }

    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut ticker = Ticker::for_limit(READ_BUFFER_SIZE, speed_limit);
    let mut total = 0u64;
    loop {
        if let Some(ticker) = ticker.as_mut() {
            ticker.wait();
        }
        let n = match response.body.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(FetchError::Io(e)),
        };
        total += n as u64;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{FetchConfig, SourceConfig};
    use crate::source::SourceStatus;
    use crate::testing::{Behaviour, ScriptedTransport};
    use std::sync::Arc;

    fn manager(sources: Vec<SourceConfig>) -> Manager {
        let cfg = FetchConfig {
            chunk_size: 64 * 1024,
            worker_count: 1,
            uncertainty_growth_rate: 1.02,
            sources,
        };
        Manager::new(&cfg).unwrap()
    }

    fn src(id: &str) -> SourceConfig {
        let mut cfg = SourceConfig::new(id, format!("http://{id}.test"));
        cfg.initial_speed = 1000.0;
        cfg
    }

    #[test]
    fn successful_task_updates_source_and_releases() {
        let m = manager(vec![src("alpha")]);
        let transport = ScriptedTransport::new().host("http://alpha.test", Behaviour::Serve);
        let task = Task::new(ChunkRange::new(0, 64 * 1024));

        let outcome = task.run(&m, &transport, "/file.bin");
        let TaskOutcome::Completed(done) = outcome else {
            panic!("expected completion, got {:?}", outcome);
        };
        assert_eq!(done.bytes, 64 * 1024);
        assert_eq!(done.source, "alpha");

        let snap = m.source("alpha").unwrap();
        assert_eq!(snap.status, SourceStatus::Idle);
        assert_eq!(snap.downloaded, 64 * 1024);
        assert!(snap.last_speed > 0.0);
        assert_eq!(
            transport.requested(),
            vec![("http://alpha.test/file.bin".to_string(), ChunkRange::new(0, 64 * 1024))]
        );
    }

    #[test]
    fn http_error_drops_task_and_marks_source_bad() {
        let m = manager(vec![src("alpha")]);
        let transport = ScriptedTransport::new().host("http://alpha.test", Behaviour::Status(404));
        let outcome = Task::new(ChunkRange::new(0, 10)).run(&m, &transport, "f");
        assert_eq!(
            outcome,
            TaskOutcome::Dropped {
                source: "alpha".to_string()
            }
        );
        let snap = m.source("alpha").unwrap();
        assert_eq!(snap.status, SourceStatus::Bad);
        assert_eq!(snap.consecutive_errors, 1);
        assert_eq!(snap.downloaded, 0);
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn transport_error_is_treated_like_http_error() {
        let m = manager(vec![src("alpha")]);
        let transport = ScriptedTransport::new().host("http://alpha.test", Behaviour::Refuse);
        let outcome = Task::new(ChunkRange::new(0, 10)).run(&m, &transport, "f");
        assert!(matches!(outcome, TaskOutcome::Dropped { .. }));
        assert_eq!(m.source("alpha").unwrap().status, SourceStatus::Bad);
    }

    #[test]
    fn task_abandoned_when_all_sources_failed() {
        let clock = ManualClock::new();
        let cfg = FetchConfig {
            chunk_size: 64 * 1024,
            worker_count: 1,
            uncertainty_growth_rate: 1.02,
            sources: vec![src("alpha")],
        };
        let m = Manager::with_clock(&cfg, Arc::new(clock.clone())).unwrap();
        for _ in 0..3 {
            let h = m.get_source().expect("source selectable after cooldown");
            m.record_error(&h, &FetchError::Http(500));
            clock.advance(Duration::from_secs(30));
        }
        assert!(m.all_sources_failed());

        let transport = ScriptedTransport::new().host("http://alpha.test", Behaviour::Serve);
        let outcome = Task::new(ChunkRange::new(0, 10)).run(&m, &transport, "f");
        assert_eq!(outcome, TaskOutcome::NoSources);
        assert_eq!(transport.calls(), 0);
    }

    #[test]
    fn speed_limit_caps_measured_speed() {
        let mut cfg = src("alpha");
        cfg.speed_limit = 1_000_000;
        let m = manager(vec![cfg]);
        let transport = ScriptedTransport::new().host("http://alpha.test", Behaviour::Serve);
        let task = Task::new(ChunkRange::new(0, 64 * 1024));
        let TaskOutcome::Completed(done) = task.run(&m, &transport, "f") else {
            panic!("expected completion");
        };
        let measured = done.bytes as f64 / done.elapsed().as_secs_f64();
        assert!(measured <= 1_000_000.0, "measured {measured}");
        assert!(m.source("alpha").unwrap().last_speed <= 1_000_000.0);
    }

    #[test]
    fn busy_source_is_acquired_after_release() {
        let mut cfg = src("alpha");
        cfg.speed_limit = 1_000_000;
        let m = Arc::new(manager(vec![cfg]));
        // One short sample so the backoff is a few milliseconds.
        let h = m.get_source().unwrap();
        m.record_chunk_speed(&h, Duration::from_millis(1), 1_000_000.0);
        m.release_source(&h);
        let transport = Arc::new(ScriptedTransport::new().host("http://alpha.test", Behaviour::Serve));

        let workers: Vec<_> = (0..2u64)
            .map(|i| {
                let m = Arc::clone(&m);
                let transport = Arc::clone(&transport);
                std::thread::spawn(move || {
                    let range = ChunkRange::new(i * 64 * 1024, (i + 1) * 64 * 1024);
                    Task::new(range).run(&m, transport.as_ref(), "f")
                })
            })
            .collect();
        let mut done: Vec<CompletedChunk> = workers
            .into_iter()
            .map(|w| match w.join().unwrap() {
                TaskOutcome::Completed(chunk) => chunk,
                other => panic!("expected completion, got {:?}", other),
            })
            .collect();
        done.sort_by_key(|c| c.started_at);

        assert!(done[1].started_at >= done[0].finished_at);
        assert_eq!(transport.calls(), 2);
        let snap = m.source("alpha").unwrap();
        assert_eq!(snap.status, SourceStatus::Idle);
        assert_eq!(snap.attempts, 3);
        assert_eq!(snap.downloaded, 128 * 1024);
    }

    #[test]
    fn fetch_range_counts_bytes_without_limit() {
        let transport = ScriptedTransport::new().host("http://alpha.test", Behaviour::Serve);
        let n = fetch_range(&transport, "http://alpha.test/x", ChunkRange::new(100, 40_100), 0)
            .unwrap();
        assert_eq!(n, 40_000);
    }

    #[test]
    fn fetch_range_rejects_non_2xx() {
        let transport = ScriptedTransport::new().host("http://alpha.test", Behaviour::Status(503));
        let err = fetch_range(&transport, "http://alpha.test/x", ChunkRange::new(0, 1), 0)
            .unwrap_err();
        assert!(matches!(err, FetchError::Http(503)));
    }
}
