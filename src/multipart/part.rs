//! Encoding of engine-generated output
//!
//! The relay produces two things itself: the response headers every
//! consumer receives on join, and synthetic still-frame parts injected while
//! the upstream is stalled. Everything else is forwarded verbatim.

use axum::http::header::{InvalidHeaderValue, CACHE_CONTROL, CONTENT_TYPE, EXPIRES, PRAGMA};
use axum::http::{HeaderMap, HeaderValue};
use bytes::{BufMut, Bytes, BytesMut};

/// Response headers sent to a consumer when it joins
///
/// Caching is disabled and the content type announces `boundary`. Fails
/// only if the boundary is not a valid header value.
pub fn response_headers(boundary: &str) -> Result<HeaderMap, InvalidHeaderValue> {
    let content_type = format!("multipart/x-mixed-replace;boundary={}", boundary);

    let mut headers = HeaderMap::with_capacity(4);
    headers.insert(
        EXPIRES,
        HeaderValue::from_static("Mon, 01 Jul 1980 00:00:00 GMT"),
    );
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(CONTENT_TYPE, HeaderValue::from_str(&content_type)?);
    Ok(headers)
}

/// Build one still-frame part
///
/// No closing delimiter is appended; the leading `\r\n--<boundary>` of the
/// next part terminates this one.
pub fn still_frame_part(boundary: &str, image: &[u8]) -> Bytes {
    let header = format!(
        "\r\n--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        boundary,
        image.len()
    );

    let mut buf = BytesMut::with_capacity(header.len() + image.len());
    buf.put_slice(header.as_bytes());
    buf.put_slice(image);
    buf.freeze()
}
