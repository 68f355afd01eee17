//! Pagination handles exchanged with clients.
//!
//! A handle is the decimal rendering of a position, either an offset in a
//! listing or the next version number to scan from. Clients treat it as an
//! opaque string; an empty handle designates the start.

use std::str::FromStr;
use tonic::Status;

/// Parse the handle found in the request field `field`.
pub fn parse_handle<T>(handle: &str, field: &str) -> Result<T, Status>
where
    T: FromStr + Default,
{
    if handle.is_empty() {
        return Ok(T::default());
    }
    let invalid = || {
        Status::invalid_argument(format!(
            "Invalid value for `{}` ({:?}) only empty or values provided by a previous call should be used",
            field, handle
        ))
    };
    if !handle.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    handle.parse().map_err(|_| invalid())
}

pub fn format_handle<T: ToString>(position: T) -> String {
    position.to_string()
}

/// Slice `items` from `offset` on, keeping at most `count` of them (`0` meaning all).
pub fn page<T>(items: &[T], offset: usize, count: usize) -> &[T] {
    let remaining = items.get(offset..).unwrap_or(&[]);
    if count > 0 && count < remaining.len() {
        &remaining[..count]
    } else {
        remaining
    }
}
