//! Header-line parsing for HEAD responses.

use super::HeadResult;

/// Folds raw header lines into a [`HeadResult`].
///
/// With redirects libcurl reports one header block per hop; a status line
/// starts a new block, so only the final response's headers count.
pub(crate) fn parse_headers(lines: &[String]) -> HeadResult {
    let mut result = HeadResult::default();
    for line in lines {
        let line = line.trim();
        if line.starts_with("HTTP/") {
            result = HeadResult::default();
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let (name, value) = (name.trim(), value.trim());
        if name.eq_ignore_ascii_case("content-length") {
            result.content_length = value.parse().ok();
        } else if name.eq_ignore_ascii_case("accept-ranges") {
            result.accept_ranges = value.eq_ignore_ascii_case("bytes");
        }
    }
    result
}
