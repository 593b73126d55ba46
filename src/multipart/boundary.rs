//! Boundary token handling
//!
//! The upstream announces its part delimiter in the response header, e.g.
//! `Content-Type: multipart/x-mixed-replace;boundary=ipcamera`. Every part in
//! the body is then introduced by `--ipcamera`.

use crate::error::{Error, Result};

/// Boundary assumed until an upstream announces one
pub const DEFAULT_BOUNDARY: &str = "ipcamera";

const BOUNDARY_PARAM: &str = "boundary=";

/// Extract the boundary token from a `content-type` header value
///
/// The value runs until the next `;`. When the parameter is the last one it
/// runs until a `\r` (mjpeg-streamer terminates header lines that way) or to
/// the end of the string. Quote characters are stripped.
pub fn extract_boundary(content_type: &str) -> Result<String> {
    // ASCII lowercasing keeps byte offsets identical to the input
    let lowered = content_type.to_ascii_lowercase();
    let start = lowered
        .find(BOUNDARY_PARAM)
        .map(|pos| pos + BOUNDARY_PARAM.len())
        .ok_or_else(|| Error::MalformedContentType(content_type.to_string()))?;

    let rest = &content_type[start..];
    let end = rest
        .find(';')
        .or_else(|| rest.find('\r'))
        .unwrap_or(rest.len());

    let boundary: String = rest[..end].chars().filter(|&c| c != '"').collect();
    if !is_valid_boundary(&boundary) {
        return Err(Error::MalformedContentType(content_type.to_string()));
    }

    Ok(boundary)
}

/// Check that a token can be used as a boundary
///
/// It must be non-empty, otherwise the marker degenerates to `--`, and
/// printable ASCII so it can be announced in a response header.
pub fn is_valid_boundary(boundary: &str) -> bool {
    !boundary.is_empty() && boundary.bytes().all(|b| b.is_ascii_graphic() || b == b' ')
}

/// Find the byte offset of the first `--<boundary>` marker in a chunk
pub fn find_boundary(chunk: &[u8], boundary: &str) -> Option<usize> {
    let marker = boundary_marker(boundary);
    if marker.len() > chunk.len() {
        return None;
    }
    chunk
        .windows(marker.len())
        .position(|window| window == marker.as_slice())
}

fn boundary_marker(boundary: &str) -> Vec<u8> {
    let mut marker = Vec::with_capacity(boundary.len() + 2);
    marker.extend_from_slice(b"--");
    marker.extend_from_slice(boundary.as_bytes());
    marker
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_simple() {
        let boundary = extract_boundary("multipart/x-mixed-replace;boundary=myboundary").unwrap();
        assert_eq!(boundary, "myboundary");
    }

    #[test]
    fn test_extract_followed_by_param() {
        let boundary =
            extract_boundary("multipart/x-mixed-replace; boundary=frame; charset=binary").unwrap();
        assert_eq!(boundary, "frame");
    }

    #[test]
    fn test_extract_stops_at_carriage_return() {
        let boundary =
            extract_boundary("multipart/x-mixed-replace;boundary=boundarydonotcross\r\n").unwrap();
        assert_eq!(boundary, "boundarydonotcross");
    }

    #[test]
    fn test_extract_strips_quotes() {
        let boundary = extract_boundary("multipart/x-mixed-replace;boundary=\"abc\"").unwrap();
        assert_eq!(boundary, "abc");
    }

    #[test]
    fn test_extract_case_insensitive_param() {
        let boundary = extract_boundary("multipart/x-mixed-replace;Boundary=CamFrame").unwrap();
        assert_eq!(boundary, "CamFrame");
    }

    #[test]
    fn test_extract_missing_boundary() {
        let result = extract_boundary("image/jpeg");
        assert!(matches!(result, Err(Error::MalformedContentType(_))));
    }

    #[test]
    fn test_extract_empty_boundary() {
        let result = extract_boundary("multipart/x-mixed-replace;boundary=\"\";foo=bar");
        assert!(matches!(result, Err(Error::MalformedContentType(_))));
    }

    #[test]
    fn test_extract_rejects_control_characters() {
        let result = extract_boundary("multipart/x-mixed-replace;boundary=abc\ndef");
        assert!(matches!(result, Err(Error::MalformedContentType(_))));
    }

    #[test]
    fn test_is_valid_boundary() {
        assert!(is_valid_boundary("ipcamera"));
        assert!(is_valid_boundary("--myboundary"));
        assert!(!is_valid_boundary(""));
        assert!(!is_valid_boundary("a\tb"));
    }

    #[test]
    fn test_find_boundary() {
        let chunk = b"tail of jpeg\r\n--ipcamera\r\nContent-Type: image/jpeg\r\n";
        assert_eq!(find_boundary(chunk, "ipcamera"), Some(14));
    }

    #[test]
    fn test_find_boundary_absent() {
        assert_eq!(find_boundary(b"\xff\xd8\xff\xe0 jpeg body", "ipcamera"), None);
        assert_eq!(find_boundary(b"--ip", "ipcamera"), None);
        // Token alone without the leading dashes is not a marker
        assert_eq!(find_boundary(b"ipcamera", "ipcamera"), None);
    }
}
