//! Client-side transport seam.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;

/// Buffered client socket plus the timer service the session leans on.
/// Implemented by the connection handler that owns the TCP/TLS reactor.
pub trait ClientIo {
    /// Hand over everything the socket has buffered since the last call.
    fn take_input(&mut self) -> Bytes;

    /// Queue bytes for transmission toward the client.
    fn queue_output(&mut self, data: Bytes) -> io::Result<()>;

    /// Bytes queued and not yet written to the socket.
    fn output_len(&self) -> usize;

    fn set_timeouts(&mut self, read: Duration, write: Duration);

    /// One-shot timer; on expiry the driver calls the session's
    /// `on_settings_timeout`.
    fn arm_settings_timer(&mut self, after: Duration);
    fn cancel_settings_timer(&mut self);

    fn peer_addr(&self) -> Option<SocketAddr>;
}
