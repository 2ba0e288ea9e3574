//! Seam to the HTTP/2 wire codec.
//!
//! Framing, HPACK, the connection preface, and settings negotiation live in
//! an external codec consumed through [`Http2Codec`]. The codec is driven
//! incrementally: `feed` ingests client bytes and queues receive-side
//! events, `drain` produces the next outbound slice and queues send-side
//! events, and `poll_event` hands both kinds to the session in order.
//!
//! The provider passed to `drain` deliberately has no route back to the
//! codec, so a body pull can never re-enter `feed` or `drain`.

use bytes::Bytes;
use portico_http::HeaderField;
use thiserror::Error;

/// Stream id 0 addresses the connection itself (flow-control scope).
pub const CONNECTION_STREAM_ID: u32 = 0;

/// HTTP/2 error codes carried by RST_STREAM and GOAWAY.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NoError,
    ProtocolError,
    InternalError,
    FlowControlError,
    SettingsTimeout,
    StreamClosed,
    FrameSizeError,
    RefusedStream,
    Cancel,
    CompressionError,
    ConnectError,
    EnhanceYourCalm,
    InadequateSecurity,
}

impl ErrorCode {
    pub fn from_wire(code: u32) -> Self {
        match code {
            0x0 => Self::NoError,
            0x1 => Self::ProtocolError,
            0x3 => Self::FlowControlError,
            0x4 => Self::SettingsTimeout,
            0x5 => Self::StreamClosed,
            0x6 => Self::FrameSizeError,
            0x7 => Self::RefusedStream,
            0x8 => Self::Cancel,
            0x9 => Self::CompressionError,
            0xa => Self::ConnectError,
            0xb => Self::EnhanceYourCalm,
            0xc => Self::InadequateSecurity,
            _ => Self::InternalError,
        }
    }

    pub fn to_wire(self) -> u32 {
        match self {
            Self::NoError => 0x0,
            Self::ProtocolError => 0x1,
            Self::InternalError => 0x2,
            Self::FlowControlError => 0x3,
            Self::SettingsTimeout => 0x4,
            Self::StreamClosed => 0x5,
            Self::FrameSizeError => 0x6,
            Self::RefusedStream => 0x7,
            Self::Cancel => 0x8,
            Self::CompressionError => 0x9,
            Self::ConnectError => 0xa,
            Self::EnhanceYourCalm => 0xb,
            Self::InadequateSecurity => 0xc,
        }
    }
}

/// SETTINGS identifiers the session submits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingId {
    HeaderTableSize,
    EnablePush,
    MaxConcurrentStreams,
    InitialWindowSize,
    MaxFrameSize,
    MaxHeaderListSize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Data,
    Headers,
    Priority,
    RstStream,
    Settings { ack: bool },
    PushPromise,
    Ping,
    Goaway,
    WindowUpdate,
    Unknown,
}

/// Receive- and send-side notifications, delivered in wire order.
#[derive(Debug)]
pub enum CodecEvent {
    /// A request HEADERS block opened a new stream.
    BeginRequestHeaders { stream_id: u32, priority: i32 },
    /// One decoded field of an open request header block. Raw bytes:
    /// validation is the session's job.
    RequestHeader {
        stream_id: u32,
        name: Bytes,
        value: Bytes,
    },
    /// The request header block is complete.
    RequestHeadersEnd { stream_id: u32, end_stream: bool },
    /// Request body bytes. Trailer blocks surface as an empty chunk with
    /// `end_stream` set.
    Data {
        stream_id: u32,
        data: Bytes,
        end_stream: bool,
    },
    Priority { stream_id: u32, priority: i32 },
    SettingsAck,
    PushPromise {
        stream_id: u32,
        promised_stream_id: u32,
    },
    FrameSent { stream_id: u32, kind: FrameKind },
    /// A queued frame was dropped before transmission.
    FrameNotSent {
        stream_id: u32,
        kind: FrameKind,
        reason: String,
    },
    /// Delivered exactly once per stream id, after which the codec never
    /// references the id again.
    StreamClosed {
        stream_id: u32,
        error_code: ErrorCode,
    },
    UnknownFrame { stream_id: u32, frame_type: u8 },
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("protocol violation: {0}")]
    Protocol(String),
    #[error("header compression failure: {0}")]
    Compression(String),
    #[error("application callback failure: {0}")]
    Callback(String),
    /// Unrecoverable misuse of the codec; the caller aborts.
    #[error("fatal codec failure: {0}")]
    Fatal(String),
}

impl CodecError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

/// Local receive-window snapshot for the connection or one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalWindow {
    /// Bytes received from the peer and not yet returned via WINDOW_UPDATE.
    pub unacked: u32,
    /// Configured window ceiling.
    pub limit: u32,
}

/// Result of one response-body pull.
#[derive(Debug)]
pub enum PullData {
    /// Bytes to frame as DATA; `end_stream` closes the response.
    Chunk { data: Bytes, end_stream: bool },
    /// Nothing buffered yet: stop pulling this stream until
    /// [`Http2Codec::resume_data`].
    Deferred,
    /// Finalize the stream with RST_STREAM instead of END_STREAM
    /// (tunnel teardown).
    Reset(ErrorCode),
    /// Session-fatal provider failure.
    Error(String),
}

/// Pull source for response DATA frames. Implementations read from session
/// state only; the codec is out of reach by construction.
pub trait ResponseBodyProvider {
    fn pull(&mut self, stream_id: u32, limit: usize) -> PullData;
}

/// Incremental HTTP/2 codec in server mode.
///
/// Implementations must not emit automatic WINDOW_UPDATE frames: the
/// session manages both connection- and stream-level updates. After
/// `submit_rst_stream(id, _)` no further request-side events may be
/// delivered for `id`, and a `StreamClosed { id }` event must follow
/// exactly once.
pub trait Http2Codec {
    /// Ingest client bytes; returns how many were consumed. Errors are
    /// fatal to the session.
    fn feed(&mut self, input: &[u8]) -> Result<usize, CodecError>;

    /// Next queued event, receive- and send-side interleaved in order.
    fn poll_event(&mut self) -> Option<CodecEvent>;

    /// Produce the next outbound slice, pulling DATA payloads through
    /// `provider`. An empty slice means nothing is ready.
    fn drain(&mut self, provider: &mut dyn ResponseBodyProvider) -> Result<Bytes, CodecError>;

    fn wants_read(&self) -> bool;
    fn wants_write(&self) -> bool;

    fn submit_settings(&mut self, entries: &[(SettingId, u32)]) -> Result<(), CodecError>;
    fn submit_window_update(&mut self, stream_id: u32, increment: u32) -> Result<(), CodecError>;
    fn submit_rst_stream(&mut self, stream_id: u32, code: ErrorCode) -> Result<(), CodecError>;
    /// Stage response headers for a stream; body bytes are pulled through
    /// the provider passed to `drain`.
    fn submit_response(&mut self, stream_id: u32, fields: &[HeaderField])
        -> Result<(), CodecError>;
    /// Queue GOAWAY with the given code and stop accepting new streams.
    fn terminate(&mut self, code: ErrorCode) -> Result<(), CodecError>;

    /// Re-enable body pulls for a stream previously deferred.
    fn resume_data(&mut self, stream_id: u32);

    /// Seed the session from an `HTTP2-Settings` payload received over an
    /// HTTP/1.1 `Upgrade: h2c` exchange.
    fn apply_upgrade(&mut self, settings_payload: &[u8]) -> Result<(), CodecError>;

    /// Enable the frame padding hook.
    fn enable_padding(&mut self);

    /// Local receive window for stream id 0 (connection) or a stream.
    /// `submit_window_update` lowers `unacked` by the increment.
    fn recv_window(&self, stream_id: u32) -> Option<LocalWindow>;
}
