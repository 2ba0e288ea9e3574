//! HTTP/2 frontend adapter for the portico reverse proxy.
//!
//! Terminates a client HTTP/2 connection and relays every stream to an
//! origin as an independent request/response exchange, muxing origin bytes
//! back with explicit flow control and backpressure. The wire codec, the
//! origin connector, and the TCP/TLS reactor are consumed through seams
//! ([`codec::Http2Codec`], [`origin::OriginConnector`],
//! [`transport::ClientIo`]); this crate owns the per-connection session
//! state machine.

pub mod codec;
pub mod flow_control;
pub mod origin;
pub mod session;
pub mod stream;
pub mod transport;

pub use codec::{CodecError, CodecEvent, ErrorCode, Http2Codec, PullData, ResponseBodyProvider};
pub use origin::{OriginConnection, OriginConnector, OriginEvent, OriginUpdate, ResponseHead};
pub use session::{Http1Handoff, Http2Session, SessionError, SessionFlow, OUTBUF_MAX_THRES};
pub use stream::{RequestState, ResponseState, Stream, StreamTable, MAX_HEADERS_SUM};
pub use transport::ClientIo;
