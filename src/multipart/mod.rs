//! Multipart MJPEG framing
//!
//! This module provides:
//! - Boundary token extraction from an upstream `content-type`
//! - Boundary marker search inside raw body chunks
//! - Encoding of synthetic still-frame parts and the consumer response headers

pub mod boundary;
pub mod part;

pub use boundary::{extract_boundary, find_boundary, is_valid_boundary, DEFAULT_BOUNDARY};
pub use part::{response_headers, still_frame_part};
