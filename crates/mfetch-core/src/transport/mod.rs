//! Ranged byte-stream transport.
//!
//! The fetch engine only needs "open a ranged stream against host+path and
//! give me the status and a reader". [`CurlTransport`] is the production
//! implementation; tests plug in scripted transports.

mod http;
mod throttle;

use std::fmt;
use std::io::Read;

use crate::error::FetchError;
use crate::segmenter::ChunkRange;

pub use http::CurlTransport;
pub use throttle::Ticker;

/// Bytes requested per body read.
pub const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Response to a ranged GET: status code plus a body stream.
pub struct RangeResponse {
    pub status: u32,
    pub body: Box<dyn Read + Send>,
}

impl RangeResponse {
    pub fn new(status: u32, body: impl Read + Send + 'static) -> Self {
        Self {
            status,
            body: Box::new(body),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl fmt::Debug for RangeResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RangeResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

pub trait Transport: Send + Sync {
    /// Issues `GET url` with `Range: bytes=start-(end-1)`.
    ///
    /// Returns once the status is known; the body is streamed through the
    /// returned reader.
    fn open_range(&self, url: &str, range: ChunkRange) -> Result<RangeResponse, FetchError>;
}

/// `host + path`, with exactly one slash at the seam.
pub fn join_url(host: &str, path: &str) -> String {
    let host = host.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{host}/{path}")
}
