//! Per-connection protocol limits.

/// Limits applied while parsing requests on one connection.
///
/// The header block caps (bytes and field count) bound memory spent before a
/// request head is accepted; the body cap bounds what a single request may
/// carry. A request declaring a Content-Length over the cap is refused with
/// `413` before the handler runs; a chunked body crossing the cap fails
/// mid-stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    max_header_bytes: usize,
    max_header_count: usize,
    max_body_bytes: u64,
}

impl ConnectionConfig {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_max_header_bytes(mut self, max_header_bytes: usize) -> Self {
        self.max_header_bytes = max_header_bytes;
        self
    }

    pub fn with_max_header_count(mut self, max_header_count: usize) -> Self {
        self.max_header_count = max_header_count;
        self
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: u64) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn max_header_bytes(&self) -> usize {
        self.max_header_bytes
    }

    pub fn max_header_count(&self) -> usize {
        self.max_header_count
    }

    pub fn max_body_bytes(&self) -> u64 {
        self.max_body_bytes
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self { max_header_bytes: 8 * 1024, max_header_count: 64, max_body_bytes: 4 * 1024 * 1024 }
    }
}
