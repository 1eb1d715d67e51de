//! Chunk range type and fixed-size planning.

use std::fmt;

/// A byte range `[start, end)` of the target file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkRange {
    /// Start offset (inclusive).
    pub start: u64,
    /// End offset (exclusive).
    pub end: u64,
}

impl ChunkRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// HTTP `Range` header value with an inclusive end: `bytes=start-(end-1)`.
    pub fn range_header_value(&self) -> String {
        format!("bytes={}", self.curl_range())
    }

    /// Range in the form libcurl's `CURLOPT_RANGE` expects (no `bytes=` prefix).
    pub fn curl_range(&self) -> String {
        if self.is_empty() {
            return format!("{}-{}", self.start, self.start);
        }
        format!("{}-{}", self.start, self.end - 1)
    }
}

impl fmt::Display for ChunkRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Partitions `[0, total_size)` into ranges of `chunk_size` bytes.
///
/// The last range is truncated to the file size. Returns an empty plan when
/// either argument is zero.
pub fn plan_chunks(total_size: u64, chunk_size: u64) -> Vec<ChunkRange> {
    if total_size == 0 || chunk_size == 0 {
        return Vec::new();
    }

    let count = total_size.div_ceil(chunk_size);
    let mut out = Vec::with_capacity(count as usize);
    let mut offset = 0u64;
    while offset < total_size {
        let end = offset.saturating_add(chunk_size).min(total_size);
        out.push(ChunkRange::new(offset, end));
        offset = end;
    }
    out
}
