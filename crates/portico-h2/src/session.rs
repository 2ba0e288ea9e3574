//! Client-facing HTTP/2 session.
//!
//! One [`Http2Session`] exists per connected client. It owns the codec and
//! every live stream, and is re-entered by the driver on client readable /
//! writable, origin socket events, and timer expiry. All of it runs on the
//! connection's scheduler thread; nothing here locks.
//!
//! `flush_send` is the only place the codec is drained. The body provider
//! it passes down holds the stream table but not the codec, so a pull can
//! never recurse into `feed` or `drain`.

use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use bytes::BytesMut;
use http::StatusCode;
use portico_core::ProxyConfig;
use portico_http::{
    accept_request, coalesce_fields, error_html, get_field, is_upgrade_request, normalize_fields,
    rewrite_location, splice_via, strip_connection_fields, valid_field, HeaderField, RequestLine,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::codec::{
    CodecError, CodecEvent, ErrorCode, FrameKind, Http2Codec, PullData, ResponseBodyProvider,
    SettingId, CONNECTION_STREAM_ID,
};
use crate::flow_control::window_update_increment;
use crate::origin::{
    IoControlReason, OriginConnection, OriginConnector, OriginEvent, OriginUpdate, ResponseHead,
};
use crate::stream::{RequestState, ResponseState, Stream, StreamTable, MAX_HEADERS_SUM};
use crate::transport::ClientIo;

/// Soft cap on outbound buffered bytes. Past it `flush_send` stops draining
/// the codec, body pulls defer, and origin reads pause.
pub const OUTBUF_MAX_THRES: usize = 64 * 1024;

const SETTINGS_ACK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("http/2 codec failure: {0}")]
    Codec(#[from] CodecError),
    #[error("client transport failure: {0}")]
    Transport(#[from] std::io::Error),
    #[error("h2c upgrade failed: {0}")]
    Upgrade(String),
}

/// What the driver should do with the connection after an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionFlow {
    Continue,
    /// Nothing left to read or write and the output queue is empty: close
    /// the connection.
    Shutdown,
}

/// State handed over by the HTTP/1.1 adapter on `Upgrade: h2c`. The
/// pre-upgrade request becomes stream 1.
pub struct Http1Handoff {
    pub request_line: RequestLine,
    pub request_fields: Vec<HeaderField>,
    pub request_state: RequestState,
    pub origin: Option<Box<dyn OriginConnection>>,
    /// Client bytes the HTTP/1.1 connection had already buffered; they are
    /// fed to the codec ahead of fresh socket input.
    pub buffered_input: bytes::Bytes,
}

pub struct Http2Session<C, T> {
    config: Arc<ProxyConfig>,
    codec: C,
    io: T,
    connector: Box<dyn OriginConnector>,
    streams: StreamTable,
    flow_control: bool,
    settings_timer_armed: bool,
    /// Upgrade leftovers plus any bytes the codec declined to consume.
    pending_input: BytesMut,
    dump_request_sink: Option<File>,
    dump_response_sink: Option<File>,
}

impl<C: Http2Codec, T: ClientIo> Http2Session<C, T> {
    pub fn new(
        config: Arc<ProxyConfig>,
        codec: C,
        io: T,
        connector: Box<dyn OriginConnector>,
    ) -> Result<Self, SessionError> {
        let dump_request_sink = open_dump_sink(config.http2.dump_request_header.as_deref());
        let dump_response_sink = open_dump_sink(config.http2.dump_response_header.as_deref());
        let mut session = Self {
            config,
            codec,
            io,
            connector,
            streams: StreamTable::new(),
            flow_control: true,
            settings_timer_armed: false,
            pending_input: BytesMut::new(),
            dump_request_sink,
            dump_response_sink,
        };
        session.io.set_timeouts(
            Duration::from_millis(session.config.read_timeout_ms),
            Duration::from_millis(session.config.write_timeout_ms),
        );
        if session.config.http2.padding {
            session.codec.enable_padding();
        }
        session.codec.submit_settings(&[
            (
                SettingId::MaxConcurrentStreams,
                session.config.http2.max_concurrent_streams,
            ),
            (
                SettingId::InitialWindowSize,
                session.config.http2.stream_window(),
            ),
        ])?;
        if session.config.http2.connection_window_bits > 16 {
            let delta = session.config.http2.connection_window() - 65_535;
            session
                .codec
                .submit_window_update(CONNECTION_STREAM_ID, delta)?;
        }
        Ok(session)
    }

    /// Take over from the HTTP/1.1 adapter after `Upgrade: h2c`: seed the
    /// codec with the client's announced settings and register the prior
    /// request as stream 1 with default priority.
    pub fn upgrade_from_http1(&mut self, handoff: Http1Handoff) -> Result<(), SessionError> {
        let settings = get_field(&handoff.request_fields, "http2-settings")
            .ok_or_else(|| SessionError::Upgrade("missing HTTP2-Settings header".to_string()))?;
        let payload = URL_SAFE_NO_PAD
            .decode(settings.value.as_bytes())
            .map_err(|error| SessionError::Upgrade(format!("invalid HTTP2-Settings: {error}")))?;
        if let Err(error) = self.codec.apply_upgrade(&payload) {
            warn!(%error, "codec rejected h2c upgrade");
            return Err(error.into());
        }
        let mut stream = Stream::new(1, 0);
        stream.set_request_line(handoff.request_line);
        stream.set_request_fields(handoff.request_fields);
        stream.set_request_state(handoff.request_state);
        if let Some(origin) = handoff.origin {
            stream.set_origin(origin);
        }
        self.streams.add(stream);
        self.pending_input.extend_from_slice(&handoff.buffered_input);
        debug!("upgraded connection to HTTP/2; prior request is stream 1");
        Ok(())
    }

    /// Client socket turned readable: feed buffered bytes to the codec,
    /// then flush whatever it produced.
    pub fn on_client_read(&mut self) -> Result<SessionFlow, SessionError> {
        let input = self.io.take_input();
        if !input.is_empty() {
            self.pending_input.extend_from_slice(&input);
        }
        if !self.pending_input.is_empty() {
            let consumed = match self.codec.feed(&self.pending_input) {
                Ok(consumed) => consumed,
                Err(error) => {
                    error!(%error, "codec receive failed");
                    return Err(error.into());
                }
            };
            let _ = self.pending_input.split_to(consumed);
        }
        self.dispatch_events()?;
        self.flush_send()
    }

    pub fn on_client_write(&mut self) -> Result<SessionFlow, SessionError> {
        self.flush_send()
    }

    /// Drain the codec into the client output queue until it has nothing
    /// ready or the queue is past [`OUTBUF_MAX_THRES`].
    pub fn flush_send(&mut self) -> Result<SessionFlow, SessionError> {
        loop {
            while self.io.output_len() <= OUTBUF_MAX_THRES {
                let drained = {
                    let mut provider = BodyProvider {
                        streams: &mut self.streams,
                        outbuf_len: self.io.output_len(),
                    };
                    self.codec.drain(&mut provider)
                };
                let chunk = match drained {
                    Ok(chunk) => chunk,
                    Err(error) => {
                        error!(%error, "codec send failed");
                        return Err(error.into());
                    }
                };
                if chunk.is_empty() {
                    break;
                }
                self.io.queue_output(chunk)?;
            }
            // Frame-sent, frame-not-sent, and stream-close notifications
            // raised while draining may queue further frames.
            if !self.dispatch_events()? || self.io.output_len() > OUTBUF_MAX_THRES {
                break;
            }
        }
        if !self.codec.wants_read() && !self.codec.wants_write() && self.io.output_len() == 0 {
            debug!("no more read/write for this session");
            return Ok(SessionFlow::Shutdown);
        }
        Ok(SessionFlow::Continue)
    }

    /// The settings-ACK timer fired: the client never acknowledged our
    /// SETTINGS.
    pub fn on_settings_timeout(&mut self) -> Result<SessionFlow, SessionError> {
        warn!("settings ACK timeout");
        self.terminate_session(ErrorCode::SettingsTimeout)?;
        self.flush_send()
    }

    /// Queue GOAWAY; every stream is swept by the codec's close
    /// notifications as the session winds down.
    pub fn terminate_session(&mut self, code: ErrorCode) -> Result<(), SessionError> {
        self.codec.terminate(code)?;
        Ok(())
    }

    /// Request RST_STREAM. Submission problems short of a fatal codec error
    /// are dropped; a fatal error is unrecoverable misuse and aborts.
    pub fn submit_rst(&mut self, stream_id: u32, code: ErrorCode) {
        debug!(stream_id, ?code, "submitting RST_STREAM");
        if let Err(error) = self.codec.submit_rst_stream(stream_id, code) {
            if error.is_fatal() {
                error!(%error, stream_id, "RST_STREAM submission failed");
                panic!("unrecoverable codec failure: {error}");
            }
            debug!(%error, stream_id, "RST_STREAM submission rejected");
        }
    }

    pub fn submit_window_update(&mut self, stream_id: u32, increment: u32) {
        if let Err(error) = self.codec.submit_window_update(stream_id, increment) {
            if error.is_fatal() {
                error!(%error, stream_id, "WINDOW_UPDATE submission failed");
                panic!("unrecoverable codec failure: {error}");
            }
            debug!(%error, stream_id, "WINDOW_UPDATE submission rejected");
        }
    }

    /// Synthesize an HTML error response and stage it as a normal reply.
    pub fn error_reply(&mut self, stream_id: u32, status: StatusCode) {
        let body = error_html(status, &self.config.server_name);
        let Some(stream) = self.streams.find_mut(stream_id) else {
            return;
        };
        stream.reset_response_body();
        stream.append_response_body(body.as_bytes());
        stream.set_response_status(status.as_u16());
        stream.set_response_state(ResponseState::MsgComplete);
        let fields = vec![
            HeaderField::new(":status", status.as_u16().to_string()),
            HeaderField::new("content-type", "text/html; charset=UTF-8"),
            HeaderField::new("server", self.config.server_name.clone()),
            HeaderField::new("content-length", body.len().to_string()),
        ];
        if let Err(error) = self.codec.submit_response(stream_id, &fields) {
            if error.is_fatal() {
                error!(%error, stream_id, "error response submission failed");
                panic!("unrecoverable codec failure: {error}");
            }
            debug!(%error, stream_id, "error response submission rejected");
        }
        self.access_log(stream_id, status.as_u16());
    }

    /// Client reads are throttled by withholding WINDOW_UPDATE, not by
    /// toggling the socket; nothing to do here.
    pub fn pause_client_read(&mut self, _reason: IoControlReason) {}

    /// Reopen the client's upload path: emit any warranted WINDOW_UPDATE
    /// for the connection and the stream, then flush.
    pub fn resume_client_read(&mut self, stream_id: u32) -> Result<SessionFlow, SessionError> {
        if self.flow_control {
            if let Some(increment) = self
                .codec
                .recv_window(CONNECTION_STREAM_ID)
                .and_then(window_update_increment)
            {
                self.submit_window_update(CONNECTION_STREAM_ID, increment);
            }
            if let Some(increment) = self
                .codec
                .recv_window(stream_id)
                .and_then(window_update_increment)
            {
                self.submit_window_update(stream_id, increment);
            }
        }
        self.flush_send()
    }

    pub fn stream(&self, stream_id: u32) -> Option<&Stream> {
        self.streams.find(stream_id)
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    // Origin glue: entered by the driver on origin socket transitions.

    /// Origin socket readable: parse its buffered bytes into response
    /// progress for the bound stream.
    pub fn on_origin_readable(&mut self, stream_id: u32) -> Result<SessionFlow, SessionError> {
        let Some((request_state, response_state)) = self
            .streams
            .find(stream_id)
            .map(|s| (s.request_state(), s.response_state()))
        else {
            return Ok(SessionFlow::Continue);
        };
        if request_state == RequestState::StreamClosed {
            // The client side is gone; these bytes have no consumer.
            self.streams.remove(stream_id);
            return Ok(SessionFlow::Continue);
        }
        if response_state == ResponseState::MsgReset {
            let code = self
                .streams
                .find(stream_id)
                .map(|s| s.response_rst_code())
                .unwrap_or(ErrorCode::NoError);
            self.submit_rst(stream_id, infer_client_rst_code(code));
            if let Some(stream) = self.streams.find_mut(stream_id) {
                stream.drop_origin();
            }
            return self.flush_send();
        }
        let parsed = match self.streams.find_mut(stream_id).and_then(Stream::origin_mut) {
            Some(origin) => origin.on_read(),
            None => return Ok(SessionFlow::Continue),
        };
        match parsed {
            Ok(updates) => {
                for update in updates {
                    match update {
                        OriginUpdate::HeadersComplete(head) => {
                            self.on_origin_response_head(stream_id, head)?;
                        }
                        OriginUpdate::Body(data) => self.on_origin_body(stream_id, &data),
                        OriginUpdate::BodyComplete => self.on_origin_body_complete(stream_id),
                        OriginUpdate::Reset(code) => {
                            self.on_origin_reset(stream_id, code);
                            break;
                        }
                    }
                }
            }
            Err(parse_error) => {
                debug!(stream_id, %parse_error, "origin response parse failed");
                let response_state = self
                    .streams
                    .find(stream_id)
                    .map(|s| s.response_state())
                    .unwrap_or(ResponseState::Initial);
                if response_state == ResponseState::HeaderComplete {
                    self.submit_rst(stream_id, ErrorCode::InternalError);
                } else if response_state != ResponseState::MsgComplete {
                    self.error_reply(stream_id, StatusCode::BAD_GATEWAY);
                }
                if let Some(stream) = self.streams.find_mut(stream_id) {
                    stream.set_response_state(ResponseState::MsgComplete);
                    stream.drop_origin();
                }
            }
        }
        self.flush_send()
    }

    /// Origin socket writable: once its send buffer drains, reopen the
    /// client upload path.
    pub fn on_origin_writable(&mut self, stream_id: u32) -> Result<SessionFlow, SessionError> {
        let drained = self
            .streams
            .find(stream_id)
            .and_then(|s| s.origin())
            .map(|origin| origin.pending_write_len() == 0)
            .unwrap_or(false);
        if !drained {
            return Ok(SessionFlow::Continue);
        }
        self.resume_client_read(stream_id)
    }

    pub fn on_origin_event(
        &mut self,
        stream_id: u32,
        event: OriginEvent,
    ) -> Result<SessionFlow, SessionError> {
        match event {
            OriginEvent::Connected => {
                debug!(stream_id, "origin connection established");
                if let Some(origin) = self.streams.find_mut(stream_id).and_then(Stream::origin_mut)
                {
                    origin.set_nodelay();
                }
                Ok(SessionFlow::Continue)
            }
            OriginEvent::Eof => self.on_origin_eof(stream_id),
            OriginEvent::Error | OriginEvent::Timeout => self.on_origin_failure(stream_id, event),
        }
    }

    fn on_origin_eof(&mut self, stream_id: u32) -> Result<SessionFlow, SessionError> {
        debug!(stream_id, "origin EOF");
        let Some(request_state) = self.streams.find(stream_id).map(|s| s.request_state()) else {
            return Ok(SessionFlow::Continue);
        };
        if request_state == RequestState::StreamClosed {
            self.streams.remove(stream_id);
            return Ok(SessionFlow::Continue);
        }
        let response_state = match self.streams.find_mut(stream_id) {
            Some(stream) => {
                stream.drop_origin();
                stream.response_state()
            }
            None => return Ok(SessionFlow::Continue),
        };
        match response_state {
            ResponseState::HeaderComplete => {
                // The origin may mark the end of the body with EOF.
                debug!(stream_id, "origin body ended by EOF");
                self.on_origin_body_complete(stream_id);
            }
            ResponseState::MsgComplete => {}
            _ => self.error_reply(stream_id, StatusCode::BAD_GATEWAY),
        }
        self.flush_send()
    }

    fn on_origin_failure(
        &mut self,
        stream_id: u32,
        event: OriginEvent,
    ) -> Result<SessionFlow, SessionError> {
        let timeout = event == OriginEvent::Timeout;
        debug!(stream_id, timeout, "origin connection failed");
        let Some(request_state) = self.streams.find(stream_id).map(|s| s.request_state()) else {
            return Ok(SessionFlow::Continue);
        };
        if request_state == RequestState::StreamClosed {
            self.streams.remove(stream_id);
            return Ok(SessionFlow::Continue);
        }
        let (response_state, upgraded) = match self.streams.find_mut(stream_id) {
            Some(stream) => {
                stream.drop_origin();
                (stream.response_state(), stream.upgraded())
            }
            None => return Ok(SessionFlow::Continue),
        };
        match response_state {
            ResponseState::MsgComplete => {
                // A dead tunnel has nothing left to say but RST_STREAM.
                if upgraded {
                    self.submit_rst(stream_id, ErrorCode::InternalError);
                }
            }
            ResponseState::HeaderComplete => {
                self.submit_rst(stream_id, ErrorCode::InternalError);
                if let Some(stream) = self.streams.find_mut(stream_id) {
                    stream.set_response_state(ResponseState::MsgComplete);
                }
            }
            _ => {
                let status = if timeout {
                    StatusCode::GATEWAY_TIMEOUT
                } else {
                    StatusCode::BAD_GATEWAY
                };
                self.error_reply(stream_id, status);
            }
        }
        self.flush_send()
    }

    // Codec event dispatch.

    fn dispatch_events(&mut self) -> Result<bool, SessionError> {
        let mut handled = false;
        while let Some(event) = self.codec.poll_event() {
            handled = true;
            if self.config.http2.frame_debug {
                debug!(target: "portico::frames", ?event, "codec event");
            }
            self.handle_event(event)?;
        }
        Ok(handled)
    }

    fn handle_event(&mut self, event: CodecEvent) -> Result<(), SessionError> {
        match event {
            CodecEvent::BeginRequestHeaders {
                stream_id,
                priority,
            } => {
                debug!(stream_id, "received request HEADERS");
                self.streams.add(Stream::new(stream_id, priority));
            }
            CodecEvent::RequestHeader {
                stream_id,
                name,
                value,
            } => self.on_request_header(stream_id, &name, &value),
            CodecEvent::RequestHeadersEnd {
                stream_id,
                end_stream,
            } => self.on_request_headers(stream_id, end_stream)?,
            CodecEvent::Data {
                stream_id,
                data,
                end_stream,
            } => {
                let pushed = match self.streams.find_mut(stream_id) {
                    Some(stream) if !data.is_empty() => stream.push_upload_chunk(&data),
                    Some(_) => Ok(()),
                    None => return Ok(()),
                };
                if let Err(push_error) = pushed {
                    debug!(stream_id, %push_error, "upload forwarding failed");
                    self.submit_rst(stream_id, ErrorCode::InternalError);
                    return Ok(());
                }
                if end_stream {
                    let ended = match self.streams.find_mut(stream_id) {
                        Some(stream) => {
                            let ended = stream.end_upload();
                            stream.set_request_state(RequestState::MsgComplete);
                            ended
                        }
                        None => return Ok(()),
                    };
                    if let Err(end_error) = ended {
                        debug!(stream_id, %end_error, "upload completion failed");
                        self.submit_rst(stream_id, ErrorCode::InternalError);
                    }
                }
            }
            CodecEvent::Priority {
                stream_id,
                priority,
            } => {
                if let Some(stream) = self.streams.find_mut(stream_id) {
                    stream.change_priority(priority);
                }
            }
            CodecEvent::SettingsAck => {
                debug!("SETTINGS acknowledged");
                self.io.cancel_settings_timer();
                self.settings_timer_armed = false;
            }
            CodecEvent::PushPromise {
                stream_id,
                promised_stream_id,
            } => {
                debug!(stream_id, promised_stream_id, "refusing PUSH_PROMISE");
                self.codec
                    .submit_rst_stream(promised_stream_id, ErrorCode::RefusedStream)?;
            }
            CodecEvent::FrameSent { kind, .. } => {
                if kind == (FrameKind::Settings { ack: false }) && !self.settings_timer_armed {
                    self.io.arm_settings_timer(SETTINGS_ACK_TIMEOUT);
                    self.settings_timer_armed = true;
                }
            }
            CodecEvent::FrameNotSent {
                stream_id,
                kind,
                reason,
            } => {
                warn!(stream_id, ?kind, %reason, "failed to send control frame");
                // An unsent response HEADERS would leave the stream hanging.
                if kind == FrameKind::Headers && self.streams.find(stream_id).is_some() {
                    self.submit_rst(stream_id, ErrorCode::InternalError);
                }
            }
            CodecEvent::StreamClosed {
                stream_id,
                error_code,
            } => self.on_stream_close(stream_id, error_code),
            CodecEvent::UnknownFrame {
                stream_id,
                frame_type,
            } => {
                debug!(stream_id, frame_type, "ignoring unknown frame");
            }
        }
        Ok(())
    }

    fn on_request_header(&mut self, stream_id: u32, name: &[u8], value: &[u8]) {
        let Some(sum) = self.streams.find(stream_id).map(Stream::request_fields_sum) else {
            return;
        };
        if sum > MAX_HEADERS_SUM {
            debug!(stream_id, sum, "request header block too large");
            self.submit_rst(stream_id, ErrorCode::InternalError);
            return;
        }
        let (Ok(name), Ok(value)) = (std::str::from_utf8(name), std::str::from_utf8(value)) else {
            return;
        };
        for piece in value.split('\0') {
            if !valid_field(name, piece) {
                continue;
            }
            if let Some(stream) = self.streams.find_mut(stream_id) {
                stream.add_request_field(name, piece);
            }
        }
    }

    fn on_request_headers(
        &mut self,
        stream_id: u32,
        end_stream: bool,
    ) -> Result<(), SessionError> {
        let accepted = {
            let Some(stream) = self.streams.find_mut(stream_id) else {
                return Ok(());
            };
            stream.normalize_request_fields();
            accept_request(
                stream.request_fields(),
                end_stream,
                self.config.http2_proxy,
            )
            .map(|line| {
                let upgraded = is_upgrade_request(&line, stream.request_fields());
                (line, upgraded)
            })
        };
        if let Some(sink) = self.dump_request_sink.as_mut() {
            if let Some(stream) = self.streams.find(stream_id) {
                dump_fields(sink, stream.request_fields());
            }
        }
        let Some((line, upgraded)) = accepted else {
            self.submit_rst(stream_id, ErrorCode::ProtocolError);
            return Ok(());
        };
        debug!(
            stream_id,
            method = %line.method,
            authority = %line.authority,
            path = %line.path,
            "accepted request"
        );
        let mut origin = match self.connector.connect(stream_id) {
            Ok(origin) => origin,
            Err(connect_error) => {
                warn!(stream_id, %connect_error, "origin connect failed");
                self.submit_rst(stream_id, ErrorCode::InternalError);
                if let Some(stream) = self.streams.find_mut(stream_id) {
                    stream.set_request_state(RequestState::ConnectFail);
                }
                return Ok(());
            }
        };
        let pushed = match self.streams.find_mut(stream_id) {
            Some(stream) => origin.push_request_headers(&line, stream.request_fields()),
            None => return Ok(()),
        };
        if let Err(push_error) = pushed {
            warn!(stream_id, %push_error, "request submit toward origin failed");
            self.submit_rst(stream_id, ErrorCode::InternalError);
            if let Some(stream) = self.streams.find_mut(stream_id) {
                stream.set_request_state(RequestState::ConnectFail);
            }
            return Ok(());
        }
        if let Some(stream) = self.streams.find_mut(stream_id) {
            stream.set_request_line(line);
            stream.set_upgraded(upgraded);
            stream.set_origin(origin);
            stream.set_request_state(RequestState::HeaderComplete);
            if end_stream {
                stream.set_request_state(RequestState::MsgComplete);
            }
        }
        Ok(())
    }

    /// Exactly one close notification arrives per stream id; it is the only
    /// path that destroys a stream still known to the codec.
    fn on_stream_close(&mut self, stream_id: u32, error_code: ErrorCode) {
        debug!(stream_id, ?error_code, "stream is being closed");
        let Some(stream) = self.streams.find_mut(stream_id) else {
            return;
        };
        if stream.request_state() == RequestState::ConnectFail {
            self.streams.remove(stream_id);
            return;
        }
        stream.set_request_state(RequestState::StreamClosed);
        if stream.response_state() == ResponseState::MsgComplete
            && !stream.upgraded()
            && !stream.response_connection_close()
        {
            // The origin finished cleanly and may serve another exchange.
            if let Some(mut origin) = stream.detach_origin() {
                origin.detach();
            }
        }
        self.streams.remove(stream_id);
    }

    // Origin response progress.

    fn on_origin_response_head(
        &mut self,
        stream_id: u32,
        head: ResponseHead,
    ) -> Result<(), SessionError> {
        debug!(stream_id, status = head.status, "origin response header complete");
        let nva = {
            let Some(stream) = self.streams.find_mut(stream_id) else {
                return Ok(());
            };
            let mut fields = head.fields;
            normalize_fields(&mut fields);
            if !self.config.http2_proxy && !self.config.client_proxy {
                let line = stream.request_line();
                let origin_host = if line.authority.is_empty() {
                    get_field(stream.request_fields(), "host")
                        .map(|f| f.value.clone())
                        .unwrap_or_default()
                } else {
                    line.authority.clone()
                };
                let scheme = if line.scheme.is_empty() {
                    "https"
                } else {
                    line.scheme.as_str()
                };
                for field in fields.iter_mut().filter(|f| f.name == "location") {
                    if let Some(rewritten) =
                        rewrite_location(&field.value, &origin_host, scheme, &origin_host)
                    {
                        field.value = rewritten;
                    }
                }
            }
            let mut fields = strip_connection_fields(coalesce_fields(fields));
            let existing_via = fields
                .iter()
                .position(|f| f.name == "via")
                .map(|index| fields.remove(index).value);
            let mut nva = Vec::with_capacity(fields.len() + 2);
            nva.push(HeaderField::new(":status", head.status.to_string()));
            nva.extend(fields);
            if self.config.no_via {
                if let Some(via) = existing_via {
                    nva.push(HeaderField::new("via", via));
                }
            } else {
                nva.push(HeaderField::new(
                    "via",
                    splice_via(
                        existing_via.as_deref(),
                        head.version_major,
                        head.version_minor,
                        &self.config.server_name,
                    ),
                ));
            }
            stream.set_response_status(head.status);
            stream.set_response_connection_close(head.connection_close);
            stream.set_response_state(ResponseState::HeaderComplete);
            nva
        };
        if let Some(sink) = self.dump_response_sink.as_mut() {
            dump_fields(sink, &nva);
        }
        self.codec.submit_response(stream_id, &nva)?;
        self.access_log(stream_id, head.status);
        Ok(())
    }

    fn on_origin_body(&mut self, stream_id: u32, data: &[u8]) {
        let Some(stream) = self.streams.find_mut(stream_id) else {
            return;
        };
        stream.append_response_body(data);
        self.codec.resume_data(stream_id);
        if self.io.output_len() + stream.response_body_len() > OUTBUF_MAX_THRES {
            stream.pause_origin_read(IoControlReason::NoBuffer);
        }
    }

    fn on_origin_body_complete(&mut self, stream_id: u32) {
        debug!(stream_id, "origin response completed");
        if let Some(stream) = self.streams.find_mut(stream_id) {
            stream.set_response_state(ResponseState::MsgComplete);
        }
        self.codec.resume_data(stream_id);
    }

    fn on_origin_reset(&mut self, stream_id: u32, code: ErrorCode) {
        debug!(stream_id, ?code, "origin reset the exchange");
        if let Some(stream) = self.streams.find_mut(stream_id) {
            stream.set_response_rst_code(code);
            stream.set_response_state(ResponseState::MsgReset);
        }
        self.submit_rst(stream_id, infer_client_rst_code(code));
        if let Some(stream) = self.streams.find_mut(stream_id) {
            stream.drop_origin();
        }
    }

    fn access_log(&self, stream_id: u32, status: u16) {
        if !self.config.accesslog {
            return;
        }
        let Some(stream) = self.streams.find(stream_id) else {
            return;
        };
        let line = stream.request_line();
        let client = self
            .io
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_default();
        info!(
            target: "portico::access",
            %client,
            stream_id,
            status,
            method = %line.method,
            authority = %line.authority,
            path = %line.path,
            "request served"
        );
    }
}

/// Only REFUSED_STREAM survives translation toward the client, keeping the
/// retryable signal retryable; everything else collapses to INTERNAL_ERROR.
fn infer_client_rst_code(origin_code: ErrorCode) -> ErrorCode {
    if origin_code == ErrorCode::RefusedStream {
        origin_code
    } else {
        ErrorCode::InternalError
    }
}

fn open_dump_sink(path: Option<&Path>) -> Option<File> {
    let path = path?;
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => Some(file),
        Err(error) => {
            warn!(path = %path.display(), %error, "cannot open header dump sink");
            None
        }
    }
}

fn dump_fields(sink: &mut File, fields: &[HeaderField]) {
    let mut text = String::new();
    for field in fields {
        text.push_str(&field.name);
        text.push_str(": ");
        text.push_str(&field.value);
        text.push('\n');
    }
    text.push('\n');
    if let Err(error) = sink.write_all(text.as_bytes()) {
        warn!(%error, "header dump write failed");
    }
}

/// Pull source handed to the codec while draining. Holds the stream table
/// and a snapshot of the output-queue length; no codec access.
struct BodyProvider<'a> {
    streams: &'a mut StreamTable,
    outbuf_len: usize,
}

impl ResponseBodyProvider for BodyProvider<'_> {
    fn pull(&mut self, stream_id: u32, limit: usize) -> PullData {
        let Some(stream) = self.streams.find_mut(stream_id) else {
            // Already evicted; nothing will ever resume this pull.
            return PullData::Deferred;
        };
        let data = stream.take_response_body(limit);
        let mut end_stream = false;
        if data.is_empty() && stream.response_state() == ResponseState::MsgComplete {
            if stream.upgraded() {
                // Tunnels end with RST_STREAM once pending bytes are out.
                debug!(stream_id, "finalizing tunnel with RST_STREAM");
                return PullData::Reset(infer_client_rst_code(stream.response_rst_code()));
            }
            end_stream = true;
        }
        // Reopen origin reads before the buffer runs dry so the refill
        // does not pay an RTT.
        if !end_stream && self.outbuf_len + stream.response_body_len() < OUTBUF_MAX_THRES {
            if let Err(resume_error) = stream.resume_origin_read(IoControlReason::NoBuffer) {
                return PullData::Error(format!("origin resume failed: {resume_error}"));
            }
        }
        if data.is_empty() && !end_stream {
            return PullData::Deferred;
        }
        PullData::Chunk { data, end_stream }
    }
}
