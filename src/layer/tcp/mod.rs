/*! The TCP socket engine.

A fixed pool of sockets implements a deliberately small corner of TCP.
Transmission fills the peer's window with back-to-back segments and a
timeout re-sends whatever of that range went unacknowledged; there is
no congestion control. Reception has no window at all: an incoming
segment is accepted only when its sequence number is exactly the one
expected next, anything else is answered with a duplicate
acknowledgment and dropped, and the peer's ordinary retransmission
closes the gap.

The engine never calls up into the application. Application-visible
happenings are reported through the [`Events`] capability, and the one
decision the application takes during processing, whether to take an
incoming connection, is the return value of [`Events::incoming`].

[`Events`]: trait.Events.html
[`Events::incoming`]: trait.Events.html#method.incoming
*/

use crate::wire::Ipv4Address;

mod endpoint;
mod socket;
#[cfg(test)]
mod tests;

pub use self::endpoint::Endpoint;
pub use self::socket::State;

/// The number of sockets in the pool.
pub const SOCKET_COUNT: usize = 4;

/// The retransmission timeout, in milliseconds.
pub(crate) const TIMEOUT_RETRANSMIT_MS: u32 = 1000;
/// The retry interval while the next hop's link address is unresolved.
pub(crate) const TIMEOUT_LINK_MS: u32 = 1000;
/// How long an established connection may sit idle before being closed.
pub(crate) const TIMEOUT_IDLE_MS: u32 = 2500;
/// How long a closed connection lingers to absorb a retransmitted FIN.
pub(crate) const TIMEOUT_TIME_WAIT_MS: u32 = 1000;

/// Retransmission budgets, per segment kind.
pub(crate) const RETRIES_LINK: i8 = 4;
pub(crate) const RETRIES_SYN: i8 = 5;
pub(crate) const RETRIES_SYN_ACK: i8 = 4;
pub(crate) const RETRIES_DATA: i8 = 10;
pub(crate) const RETRIES_FIN: i8 = 5;

/// The largest segment payload we accept, announced in every SYN.
pub(crate) const LOCAL_MSS: u16 = 1460;
/// The segment payload assumed of peers that announce nothing.
pub(crate) const DEFAULT_PEER_MSS: u16 = 536;

pub(crate) const EPHEMERAL_PORT_BASE: u16 = 49152;

/// A stable index naming one socket in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketHandle(pub(crate) usize);

/// The application's verdict on an incoming connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accept {
    /// Take the connection; it counts as accepted right away.
    Immediate,
    /// Complete the handshake but hold delivery until [`accept`] is
    /// called on the socket.
    ///
    /// [`accept`]: struct.Endpoint.html#method.accept
    Deferred,
    /// Refuse with a reset.
    Refuse,
}

/// A state change reported to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The handshake completed.
    Connected,
    /// New bytes are waiting in the receive buffer.
    Received,
    /// Previously written bytes were acknowledged; the transmit buffer
    /// has room again.
    Sent,
    /// The peer finished sending. Reads drain what is buffered, writes
    /// are still possible until the socket is closed.
    PeerClosed,
    /// The connection wound down in an orderly fashion. The socket has
    /// returned to the pool and the handle is dead.
    Closed,
    /// The connection was torn down by a reset, an unreachable peer, or
    /// an exhausted retry budget. The handle is dead.
    Aborted,
    /// The connection sat idle past the keepalive timeout. The engine
    /// starts an orderly close right after reporting this.
    Idle,
}

/// The capability through which the engine reports to the application.
///
/// All methods run to completion before the engine touches the socket
/// again, so implementations must not block.
pub trait Events {
    /// A SYN arrived on a listening socket. The socket named by `handle`
    /// is the one the connection will live on.
    fn incoming(&mut self, handle: SocketHandle, addr: Ipv4Address, port: u16) -> Accept {
        let _ = (handle, addr, port);
        Accept::Immediate
    }

    /// Something application-visible happened on a socket.
    fn event(&mut self, handle: SocketHandle, event: Event) {
        let _ = (handle, event);
    }
}

/// Ignores everything and accepts every connection.
pub struct NoEvents;

impl Events for NoEvents {}
