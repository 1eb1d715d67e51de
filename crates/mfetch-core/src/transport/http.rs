//! libcurl-backed ranged GET exposed as a blocking byte stream.
//!
//! Each `open_range` runs one `Easy2` transfer on its own thread. The write
//! callback pushes body buffers into a bounded channel; the caller's reader
//! pulls from it. When the reader is dropped the next callback fails to send
//! and aborts the transfer, so an abandoned body does not keep downloading.

use std::io::{self, Read};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use curl::easy::{Easy2, Handler, WriteError};

use crate::error::FetchError;
use crate::segmenter::ChunkRange;

use super::{RangeResponse, Transport};

/// Body buffers queued between the transfer thread and the reader.
const STREAM_DEPTH: usize = 8;

#[derive(Debug, Clone)]
pub struct CurlTransport {
    pub connect_timeout: Duration,
    /// Abort when throughput stays below this many bytes/sec...
    pub low_speed_limit: u32,
    /// ...for this long.
    pub low_speed_time: Duration,
}

impl Default for CurlTransport {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            low_speed_limit: 1024,
            low_speed_time: Duration::from_secs(60),
        }
    }
}

enum StreamEvent {
    Status(u32),
    Data(Vec<u8>),
    Done,
    Failed(FetchError),
}

struct StreamHandler {
    tx: Sender<StreamEvent>,
    status: u32,
    announced: bool,
}

impl StreamHandler {
    /// Sends the final status once, before the first body buffer.
    fn announce(&mut self) -> bool {
        if self.announced {
            return true;
        }
        self.announced = true;
        self.tx.send(StreamEvent::Status(self.status)).is_ok()
    }
}

impl Handler for StreamHandler {
    fn header(&mut self, data: &[u8]) -> bool {
        // Redirects produce several header blocks; the last status line wins.
        if let Some(code) = parse_status_line(data) {
            self.status = code;
        }
        true
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, WriteError> {
        if !self.announce() {
            return Ok(0);
        }
        match self.tx.send(StreamEvent::Data(data.to_vec())) {
            Ok(()) => Ok(data.len()),
            // Reader gone: returning a short count makes curl abort.
            Err(_) => Ok(0),
        }
    }
}

fn parse_status_line(data: &[u8]) -> Option<u32> {
    let line = std::str::from_utf8(data).ok()?;
    let rest = line.strip_prefix("HTTP/")?;
    rest.split_whitespace().nth(1)?.parse().ok()
}

fn configure(
    easy: &mut Easy2<StreamHandler>,
    url: &str,
    range: ChunkRange,
    opts: &CurlTransport,
) -> Result<(), curl::Error> {
    easy.url(url)?;
    easy.follow_location(true)?;
    easy.connect_timeout(opts.connect_timeout)?;
    easy.low_speed_limit(opts.low_speed_limit)?;
    easy.low_speed_time(opts.low_speed_time)?;
    // libcurl wants "start-end" here and adds the "bytes=" prefix itself.
    easy.range(&range.curl_range())?;
    Ok(())
}

fn run_transfer(url: &str, range: ChunkRange, opts: &CurlTransport, tx: Sender<StreamEvent>) {
    let mut easy = Easy2::new(StreamHandler {
        tx: tx.clone(),
        status: 0,
        announced: false,
    });
    if let Err(e) = configure(&mut easy, url, range, opts) {
        let _ = tx.send(StreamEvent::Failed(FetchError::Transport(e)));
        return;
    }

    let result = easy.perform();
    let announced = easy.get_ref().announced;
    match result {
        Ok(()) => {
            if !announced {
                let code = match easy.response_code() {
                    Ok(code) => code,
                    Err(e) => {
                        let _ = tx.send(StreamEvent::Failed(FetchError::Transport(e)));
                        return;
                    }
                };
                let _ = tx.send(StreamEvent::Status(code));
            }
            let _ = tx.send(StreamEvent::Done);
        }
        Err(e) => {
            tracing::debug!(url, range = %range, "transfer ended: {}", e);
            let _ = tx.send(StreamEvent::Failed(FetchError::Transport(e)));
        }
    }
}

impl Transport for CurlTransport {
    fn open_range(&self, url: &str, range: ChunkRange) -> Result<RangeResponse, FetchError> {
        let (tx, rx) = bounded(STREAM_DEPTH);
        let owned_url = url.to_string();
        let opts = self.clone();
        thread::Builder::new()
            .name("mfetch-curl".to_string())
            .spawn(move || run_transfer(&owned_url, range, &opts, tx))?;

        match rx.recv() {
            Ok(StreamEvent::Status(code)) => Ok(RangeResponse::new(code, CurlBody::new(rx))),
            Ok(StreamEvent::Failed(e)) => Err(e),
            Ok(StreamEvent::Data(_)) | Ok(StreamEvent::Done) => Err(FetchError::Stream(
                "body arrived before response status".to_string(),
            )),
            Err(_) => Err(FetchError::Stream(
                "transfer thread exited without a response".to_string(),
            )),
        }
    }
}

/// Reader over the body buffers produced by the transfer thread.
struct CurlBody {
    rx: Receiver<StreamEvent>,
    chunk: Vec<u8>,
    pos: usize,
    finished: bool,
}

impl CurlBody {
    fn new(rx: Receiver<StreamEvent>) -> Self {
        Self {
            rx,
            chunk: Vec::new(),
            pos: 0,
            finished: false,
        }
    }
}

impl Read for CurlBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.pos < self.chunk.len() {
                let n = buf.len().min(self.chunk.len() - self.pos);
                buf[..n].copy_from_slice(&self.chunk[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }
            if self.finished || buf.is_empty() {
                return Ok(0);
            }
            match self.rx.recv() {
                Ok(StreamEvent::Data(data)) => {
                    self.chunk = data;
                    self.pos = 0;
                }
                Ok(StreamEvent::Done) => self.finished = true,
                Ok(StreamEvent::Status(_)) => {}
                Ok(StreamEvent::Failed(e)) => {
                    self.finished = true;
                    return Err(io::Error::new(io::ErrorKind::Other, e.to_string()));
                }
                Err(_) => {
                    self.finished = true;
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "transfer ended without completing",
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_line_parsing() {
        assert_eq!(parse_status_line(b"HTTP/1.1 206 Partial Content\r\n"), Some(206));
        assert_eq!(parse_status_line(b"HTTP/2 200\r\n"), Some(200));
        assert_eq!(parse_status_line(b"Content-Length: 10\r\n"), None);
        assert_eq!(parse_status_line(b"\r\n"), None);
    }

    #[test]
    fn body_reader_yields_data_then_eof() {
        let (tx, rx) = bounded(4);
        tx.send(StreamEvent::Data(b"hello ".to_vec())).unwrap();
        tx.send(StreamEvent::Data(b"world".to_vec())).unwrap();
        tx.send(StreamEvent::Done).unwrap();
        let mut body = CurlBody::new(rx);
        let mut out = String::new();
        body.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello world");
    }

    #[test]
    fn body_reader_surfaces_mid_stream_failure() {
        let (tx, rx) = bounded(4);
        tx.send(StreamEvent::Data(vec![1, 2, 3])).unwrap();
        tx.send(StreamEvent::Failed(FetchError::Stream("reset".into())))
            .unwrap();
        let mut body = CurlBody::new(rx);
        let mut out = Vec::new();
        assert!(body.read_to_end(&mut out).is_err());
    }

    #[test]
    fn body_reader_errors_when_sender_vanishes() {
        let (tx, rx) = bounded::<StreamEvent>(4);
        drop(tx);
        let mut body = CurlBody::new(rx);
        let mut buf = [0u8; 8];
        let err = body.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
