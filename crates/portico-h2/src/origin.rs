//! Origin-side seams.
//!
//! The connector dials (or pools) origin connections; a connection carries
//! one relayed exchange at a time and reports progress through
//! [`OriginUpdate`] values when its socket turns readable. Connections
//! refer to their stream by id only — the session's stream table is the
//! single owner, and a dropped stream takes its connection with it.

use bytes::Bytes;
use portico_core::OriginError;
use portico_http::{HeaderField, RequestLine};

use crate::codec::ErrorCode;

/// Socket-level transition reported by the reactor for an origin
/// connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginEvent {
    Connected,
    Eof,
    Error,
    Timeout,
}

/// Why reads are being paused or resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoControlReason {
    /// Outbound buffer pressure.
    NoBuffer,
}

/// Parsed response head produced by the origin connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub fields: Vec<HeaderField>,
    pub version_major: u8,
    pub version_minor: u8,
    /// The origin demanded `Connection: close`; its connection must not be
    /// pooled.
    pub connection_close: bool,
}

/// Progress reported by [`OriginConnection::on_read`].
#[derive(Debug)]
pub enum OriginUpdate {
    HeadersComplete(ResponseHead),
    Body(Bytes),
    BodyComplete,
    /// The origin reset the exchange (HTTP/2 origins); carries the code to
    /// translate toward the client.
    Reset(ErrorCode),
}

/// One origin connection bound to one stream.
pub trait OriginConnection {
    /// Write the translated request head to the origin.
    fn push_request_headers(
        &mut self,
        line: &RequestLine,
        fields: &[HeaderField],
    ) -> Result<(), OriginError>;

    /// Forward one request-body chunk.
    fn push_upload_chunk(&mut self, data: &[u8]) -> Result<(), OriginError>;

    /// The request body is complete.
    fn end_upload(&mut self) -> Result<(), OriginError>;

    /// Parse whatever the origin socket has buffered.
    fn on_read(&mut self) -> Result<Vec<OriginUpdate>, OriginError>;

    fn resume_read(&mut self, reason: IoControlReason) -> Result<(), OriginError>;
    fn pause_read(&mut self, reason: IoControlReason);

    /// Bytes queued toward the origin and not yet written out.
    fn pending_write_len(&self) -> usize;

    fn set_nodelay(&mut self);

    /// Release the connection back to its pool instead of closing it.
    fn detach(&mut self);
}

/// Hands out origin connections at request-acceptance time.
pub trait OriginConnector {
    fn connect(&mut self, stream_id: u32) -> Result<Box<dyn OriginConnection>, OriginError>;
}
