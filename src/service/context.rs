//! Per-request context used to bound waits on the backend.

use std::time::Duration;
use tokio::time::Instant;
use tonic::metadata::MetadataMap;

/// Metadata key carrying the client deadline, as defined by the gRPC over HTTP/2 protocol.
pub const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

/// Deadline attached to an in-flight request.
///
/// Cancellation needs no explicit representation: when a client goes away the
/// handler future is dropped, and every wait it was performing with it.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestContext {
    deadline: Option<Instant>,
}

impl RequestContext {
    /// A context that never expires.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
        }
    }

    /// Build the context of an incoming request from its `grpc-timeout`
    /// header, capped by the server-side `max_wait` when one is configured.
    pub fn from_metadata(metadata: &MetadataMap, max_wait: Option<Duration>) -> Self {
        let client_timeout = metadata
            .get(GRPC_TIMEOUT_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_grpc_timeout);

        let timeout = match (client_timeout, max_wait) {
            (Some(client), Some(server)) => Some(client.min(server)),
            (client, server) => client.or(server),
        };
        timeout.map(Self::with_timeout).unwrap_or_default()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

/// Parse a `grpc-timeout` value: at most 8 digits followed by one of `H M S m u n`.
pub fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    if !value.is_ascii() || value.len() < 2 || value.len() > 9 {
        return None;
    }
    let (digits, unit) = value.split_at(value.len() - 1);
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: u64 = digits.parse().ok()?;

    match unit {
        "H" => Some(Duration::from_secs(amount * 3600)),
        "M" => Some(Duration::from_secs(amount * 60)),
        "S" => Some(Duration::from_secs(amount)),
        "m" => Some(Duration::from_millis(amount)),
        "u" => Some(Duration::from_micros(amount)),
        "n" => Some(Duration::from_nanos(amount)),
        _ => None,
    }
}
