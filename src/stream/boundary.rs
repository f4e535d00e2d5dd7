//! Multipart boundary discovery and search.

/// Content type announced by MJPEG servers.
pub const MIXED_REPLACE: &str = "multipart/x-mixed-replace";

const BOUNDARY_PARAM: &str = "boundary=";

/// Build the boundary marker from a `Content-Type` header value.
///
/// `multipart/x-mixed-replace; boundary=frame` yields `--frame\r\n`. Servers
/// that already include the leading dashes in the parameter are not
/// double-prefixed. Returns `None` when there is no usable `boundary=`.
pub fn parse_boundary(content_type: &str) -> Option<String> {
    let start = content_type.find(BOUNDARY_PARAM)? + BOUNDARY_PARAM.len();
    let rest = &content_type[start..];
    let end = rest
        .find(|c: char| c.is_whitespace() || c == ';')
        .unwrap_or(rest.len());
    let token = rest[..end].trim_matches('"');

    if token.is_empty() {
        return None;
    }

    let mut marker = String::with_capacity(token.len() + 4);
    if !token.starts_with("--") {
        marker.push_str("--");
    }
    marker.push_str(token);
    marker.push_str("\r\n");
    Some(marker)
}

/// Find the first occurrence of `marker` in `haystack`.
#[inline]
pub fn find_marker(haystack: &[u8], marker: &[u8]) -> Option<usize> {
    if marker.is_empty() || haystack.len() < marker.len() {
        return None;
    }
    haystack.windows(marker.len()).position(|w| w == marker)
}
