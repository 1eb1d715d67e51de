//! File size discovery via HTTP HEAD.
//!
//! Used when the caller does not know the file size up front. Sources are
//! asked in configuration order, direct sources before CDNs; the first one
//! that reports a `Content-Length` wins.

mod parse;

use anyhow::{Context, Result};
use std::str;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::SourceConfig;
use crate::transport::join_url;

/// What a HEAD request told us about the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadResult {
    pub content_length: Option<u64>,
    /// Server sent `Accept-Ranges: bytes`.
    pub accept_ranges: bool,
}

/// Size reported by one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredSize {
    pub source: String,
    pub size: u64,
    pub accept_ranges: bool,
}

/// HEADs `url` (following redirects) and parses the final response headers.
///
/// Blocking; call from `spawn_blocking` in async code.
pub fn probe(url: &str) -> Result<HeadResult> {
    let mut headers: Vec<String> = Vec::new();

    let mut easy = curl::easy::Easy::new();
    easy.url(url).context("invalid URL")?;
    easy.nobody(true)?;
    easy.follow_location(true)?;
    easy.connect_timeout(Duration::from_secs(15))?;
    easy.timeout(Duration::from_secs(30))?;
    {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                headers.push(s.trim_end().to_string());
            }
            true
        })?;
        transfer.perform().context("HEAD request failed")?;
    }

    let code = easy.response_code().context("no response code")?;
    if !(200..300).contains(&code) {
        anyhow::bail!("HEAD {} returned HTTP {}", url, code);
    }
    Ok(parse::parse_headers(&headers))
}

/// Asks each source for the size of `path` until one answers.
pub fn discover_size(sources: &[SourceConfig], path: &str) -> Result<DiscoveredSize> {
    discover_with(sources, path, probe)
}

fn discover_with<F>(sources: &[SourceConfig], path: &str, mut probe: F) -> Result<DiscoveredSize>
where
    F: FnMut(&str) -> Result<HeadResult>,
{
    let ordered = sources
        .iter()
        .filter(|s| !s.is_cdn)
        .chain(sources.iter().filter(|s| s.is_cdn));
    for source in ordered {
        let url = join_url(&source.host, path);
        match probe(&url) {
            Ok(HeadResult {
                content_length: Some(size),
                accept_ranges,
            }) => {
                debug!(source = %source.id, size, accept_ranges, "size discovered");
                if !accept_ranges {
                    warn!(source = %source.id, "source does not advertise byte ranges");
                }
                return Ok(DiscoveredSize {
                    source: source.id.clone(),
                    size,
                    accept_ranges,
                });
            }
            Ok(_) => warn!(source = %source.id, "HEAD response without Content-Length"),
            Err(e) => warn!(source = %source.id, "HEAD failed: {:#}", e),
        }
    }
    anyhow::bail!("no source reported a size for {}", path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn src(id: &str, cdn: bool) -> SourceConfig {
        let mut cfg = SourceConfig::new(id, format!("https://{id}.example.org"));
        cfg.is_cdn = cdn;
        cfg
    }

    fn sized(n: u64) -> HeadResult {
        HeadResult {
            content_length: Some(n),
            accept_ranges: true,
        }
    }

    #[test]
    fn direct_sources_asked_before_cdn() {
        let sources = [src("cdn", true), src("direct", false)];
        let mut asked = Vec::new();
        let found = discover_with(&sources, "/f.iso", |url| {
            asked.push(url.to_string());
            Ok(sized(42))
        })
        .unwrap();
        assert_eq!(found.source, "direct");
        assert_eq!(found.size, 42);
        assert_eq!(asked, vec!["https://direct.example.org/f.iso"]);
    }

    #[test]
    fn skips_failing_and_sizeless_sources() {
        let sources = [src("down", false), src("nosize", false), src("cdn", true)];
        let found = discover_with(&sources, "f", |url| {
            if url.contains("down") {
                anyhow::bail!("connection refused")
            } else if url.contains("nosize") {
                Ok(HeadResult::default())
            } else {
                Ok(sized(7))
            }
        })
        .unwrap();
        assert_eq!(found.source, "cdn");
        assert_eq!(found.size, 7);
    }

    #[test]
    fn errors_when_nobody_answers() {
        let sources = [src("a", false)];
        let err = discover_with(&sources, "f", |_| anyhow::bail!("timeout")).unwrap_err();
        assert!(err.to_string().contains("no source reported a size"));
    }
}
