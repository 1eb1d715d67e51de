//! Scripted in-memory transport for unit tests.

use std::collections::{HashMap, HashSet};
use std::io::{self, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::FetchError;
use crate::segmenter::ChunkRange;
use crate::transport::{RangeResponse, Transport};

/// How a scripted host answers every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Behaviour {
    /// 206 with `range.len()` zero bytes.
    Serve,
    /// Fixed status with an empty body.
    Status(u32),
    /// Connection-level failure.
    Refuse,
}

#[derive(Debug, Default)]
pub(crate) struct ScriptedTransport {
    hosts: HashMap<String, Behaviour>,
    /// Range starts answered with 500 regardless of host.
    failing: HashSet<u64>,
    calls: AtomicUsize,
    requested: Mutex<Vec<(String, ChunkRange)>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn host(mut self, host: &str, behaviour: Behaviour) -> Self {
        self.hosts.insert(host.trim_end_matches('/').to_string(), behaviour);
        self
    }

    pub(crate) fn fail_at(mut self, start: u64) -> Self {
        self.failing.insert(start);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn requested(&self) -> Vec<(String, ChunkRange)> {
        self.requested.lock().unwrap().clone()
    }

    fn behaviour_for(&self, url: &str) -> Behaviour {
        self.hosts
            .iter()
            .find(|(host, _)| url.starts_with(host.as_str()))
            .map(|(_, b)| *b)
            .unwrap_or(Behaviour::Refuse)
    }
}

impl Transport for ScriptedTransport {
    fn open_range(&self, url: &str, range: ChunkRange) -> Result<RangeResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push((url.to_string(), range));
        if self.failing.contains(&range.start) {
            return Ok(RangeResponse::new(500, io::empty()));
        }
        match self.behaviour_for(url) {
            Behaviour::Serve => Ok(RangeResponse::new(206, io::repeat(0).take(range.len()))),
            Behaviour::Status(code) => Ok(RangeResponse::new(code, io::empty())),
            Behaviour::Refuse => Err(FetchError::Stream("connection refused".to_string())),
        }
    }
}
