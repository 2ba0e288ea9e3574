//! Per-stream relay state and the stream table.

use bytes::{Bytes, BytesMut};
use portico_core::OriginError;
use portico_http::{normalize_fields, split_append_field, HeaderField, RequestLine};
use std::collections::HashMap;

use crate::codec::ErrorCode;
use crate::origin::{IoControlReason, OriginConnection};

/// Per-stream cap on accumulated request-header octets (names + values).
pub const MAX_HEADERS_SUM: usize = 32 * 1024;

/// Request progress. Transitions only move forward;
/// `ConnectFail` is terminal and reachable from `Initial` alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Initial,
    HeaderComplete,
    MsgComplete,
    StreamClosed,
    ConnectFail,
}

impl RequestState {
    fn rank(self) -> u8 {
        match self {
            Self::Initial => 0,
            Self::HeaderComplete => 1,
            Self::MsgComplete => 2,
            Self::StreamClosed => 3,
            Self::ConnectFail => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseState {
    Initial,
    HeaderComplete,
    MsgComplete,
    MsgReset,
}

pub struct Stream {
    stream_id: u32,
    priority: i32,
    request_state: RequestState,
    response_state: ResponseState,
    request_line: RequestLine,
    request_fields: Vec<HeaderField>,
    request_fields_sum: usize,
    upgraded: bool,
    origin: Option<Box<dyn OriginConnection>>,
    response_body: BytesMut,
    response_status: u16,
    response_connection_close: bool,
    response_rst_code: ErrorCode,
}

impl Stream {
    pub fn new(stream_id: u32, priority: i32) -> Self {
        Self {
            stream_id,
            priority,
            request_state: RequestState::Initial,
            response_state: ResponseState::Initial,
            request_line: RequestLine::default(),
            request_fields: Vec::new(),
            request_fields_sum: 0,
            upgraded: false,
            origin: None,
            response_body: BytesMut::new(),
            response_status: 0,
            response_connection_close: false,
            response_rst_code: ErrorCode::NoError,
        }
    }

    pub fn stream_id(&self) -> u32 {
        self.stream_id
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn change_priority(&mut self, priority: i32) {
        self.priority = priority;
    }

    pub fn request_state(&self) -> RequestState {
        self.request_state
    }

    /// Advance the request lattice; moves the lattice does not allow are
    /// ignored.
    pub fn set_request_state(&mut self, next: RequestState) {
        let allowed = match (self.request_state, next) {
            (current, next) if current == next => false,
            (_, RequestState::ConnectFail) => self.request_state == RequestState::Initial,
            (RequestState::ConnectFail, _) | (RequestState::StreamClosed, _) => false,
            (current, next) => next.rank() > current.rank(),
        };
        if allowed {
            self.request_state = next;
        }
    }

    pub fn response_state(&self) -> ResponseState {
        self.response_state
    }

    pub fn set_response_state(&mut self, next: ResponseState) {
        use ResponseState::*;
        let allowed = matches!(
            (self.response_state, next),
            (Initial, HeaderComplete | MsgComplete | MsgReset)
                | (HeaderComplete, MsgComplete | MsgReset)
        );
        if allowed {
            self.response_state = next;
        }
    }

    pub fn add_request_field(&mut self, name: &str, value: &str) {
        self.request_fields_sum += name.len() + value.len();
        split_append_field(&mut self.request_fields, name, value);
    }

    pub fn request_fields(&self) -> &[HeaderField] {
        &self.request_fields
    }

    /// Install a complete header set, as on h2c upgrade hand-off.
    pub fn set_request_fields(&mut self, fields: Vec<HeaderField>) {
        self.request_fields_sum = fields.iter().map(|f| f.name.len() + f.value.len()).sum();
        self.request_fields = fields;
    }

    pub fn request_fields_sum(&self) -> usize {
        self.request_fields_sum
    }

    pub fn normalize_request_fields(&mut self) {
        normalize_fields(&mut self.request_fields);
    }

    pub fn set_request_line(&mut self, line: RequestLine) {
        self.request_line = line;
    }

    pub fn request_line(&self) -> &RequestLine {
        &self.request_line
    }

    pub fn upgraded(&self) -> bool {
        self.upgraded
    }

    pub fn set_upgraded(&mut self, upgraded: bool) {
        self.upgraded = upgraded;
    }

    pub fn set_origin(&mut self, origin: Box<dyn OriginConnection>) {
        self.origin = Some(origin);
    }

    pub fn has_origin(&self) -> bool {
        self.origin.is_some()
    }

    pub fn origin(&self) -> Option<&dyn OriginConnection> {
        self.origin.as_deref()
    }

    pub fn origin_mut(&mut self) -> Option<&mut (dyn OriginConnection + 'static)> {
        self.origin.as_deref_mut()
    }

    /// Close the origin side outright.
    pub fn drop_origin(&mut self) {
        self.origin = None;
    }

    /// Hand the origin connection back for pooling.
    pub fn detach_origin(&mut self) -> Option<Box<dyn OriginConnection>> {
        self.origin.take()
    }

    pub fn push_upload_chunk(&mut self, data: &[u8]) -> Result<(), OriginError> {
        self.origin
            .as_deref_mut()
            .ok_or(OriginError::Detached)?
            .push_upload_chunk(data)
    }

    pub fn end_upload(&mut self) -> Result<(), OriginError> {
        match self.origin.as_deref_mut() {
            Some(origin) => origin.end_upload(),
            None => Ok(()),
        }
    }

    pub fn resume_origin_read(&mut self, reason: IoControlReason) -> Result<(), OriginError> {
        match self.origin.as_deref_mut() {
            Some(origin) => origin.resume_read(reason),
            None => Ok(()),
        }
    }

    pub fn pause_origin_read(&mut self, reason: IoControlReason) {
        if let Some(origin) = self.origin.as_deref_mut() {
            origin.pause_read(reason);
        }
    }

    pub fn append_response_body(&mut self, data: &[u8]) {
        self.response_body.extend_from_slice(data);
    }

    /// Detach up to `limit` bytes from the head of the body queue.
    pub fn take_response_body(&mut self, limit: usize) -> Bytes {
        let take = limit.min(self.response_body.len());
        self.response_body.split_to(take).freeze()
    }

    pub fn response_body_len(&self) -> usize {
        self.response_body.len()
    }

    pub fn reset_response_body(&mut self) {
        self.response_body.clear();
    }

    pub fn response_status(&self) -> u16 {
        self.response_status
    }

    pub fn set_response_status(&mut self, status: u16) {
        self.response_status = status;
    }

    pub fn response_connection_close(&self) -> bool {
        self.response_connection_close
    }

    pub fn set_response_connection_close(&mut self, close: bool) {
        self.response_connection_close = close;
    }

    pub fn response_rst_code(&self) -> ErrorCode {
        self.response_rst_code
    }

    pub fn set_response_rst_code(&mut self, code: ErrorCode) {
        self.response_rst_code = code;
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("stream_id", &self.stream_id)
            .field("request_state", &self.request_state)
            .field("response_state", &self.response_state)
            .field("upgraded", &self.upgraded)
            .field("has_origin", &self.origin.is_some())
            .field("body_len", &self.response_body.len())
            .finish()
    }
}

/// Registry of live streams, keyed by protocol-assigned id.
#[derive(Debug, Default)]
pub struct StreamTable {
    streams: HashMap<u32, Stream>,
}

impl StreamTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, stream: Stream) {
        let previous = self.streams.insert(stream.stream_id(), stream);
        debug_assert!(previous.is_none(), "stream id registered twice");
    }

    pub fn remove(&mut self, stream_id: u32) -> Option<Stream> {
        self.streams.remove(&stream_id)
    }

    pub fn find(&self, stream_id: u32) -> Option<&Stream> {
        self.streams.get(&stream_id)
    }

    pub fn find_mut(&mut self, stream_id: u32) -> Option<&mut Stream> {
        self.streams.get_mut(&stream_id)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}
