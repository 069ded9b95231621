use crate::layer::{ip, Error, Result};
use crate::nic::Device;
use crate::timer::Wheel;
use crate::wire::{self, tcp_segment, IpProtocol, Ipv4Address, Ipv4Repr, TcpFlags, TcpRepr,
                  TcpSeqNumber};

use super::socket::{Socket, State};
use super::{Accept, Event, Events, SocketHandle};
use super::{DEFAULT_PEER_MSS, EPHEMERAL_PORT_BASE, LOCAL_MSS, SOCKET_COUNT};
use super::{RETRIES_DATA, RETRIES_FIN, RETRIES_LINK, RETRIES_SYN, RETRIES_SYN_ACK};
use super::{TIMEOUT_IDLE_MS, TIMEOUT_LINK_MS, TIMEOUT_RETRANSMIT_MS, TIMEOUT_TIME_WAIT_MS};

/// The socket pool and the state machine driving it.
///
/// The endpoint owns no device, no clock and no buffers beyond the
/// per-socket ones; every entry point borrows an [`ip::Sender`] for the
/// segments it may emit and the timer wheel for the deadlines it arms.
///
/// [`ip::Sender`]: ../ip/struct.Sender.html
pub struct Endpoint {
    sockets: [Socket; SOCKET_COUNT],
    next_ephemeral: u16,
    // No entropy source on the target, so initial sequence numbers walk
    // a fixed stride.
    next_iss: u32,
}

fn arm(timers: &mut Wheel<SocketHandle>, socket: &Socket, millis: u32) {
    if let Some(timer) = socket.timer {
        timers.set(timer, millis);
    }
}

fn release(socket: &mut Socket, timers: &mut Wheel<SocketHandle>) {
    if let Some(timer) = socket.timer.take() {
        timers.free(timer);
    }
    socket.reset_connection();
    socket.local_port = 0;
    socket.in_use = false;
}

/// End a connection. An actively-opened socket frees its slot; a
/// passively-opened one goes back to listening on its port, ready for
/// the next client, keeping its slot and timer.
fn retire(socket: &mut Socket, timers: &mut Wheel<SocketHandle>) {
    if !socket.passive {
        return release(socket, timers);
    }
    let port = socket.local_port;
    if let Some(timer) = socket.timer {
        timers.stop(timer);
    }
    socket.reset_connection();
    socket.local_port = port;
    socket.state = State::Listen;
}

impl Endpoint {
    pub const fn new() -> Endpoint {
        Endpoint {
            sockets: [Socket::new(), Socket::new(), Socket::new(), Socket::new()],
            next_ephemeral: EPHEMERAL_PORT_BASE,
            next_iss: 0x0000_1000,
        }
    }

    /// Claim a socket and its timer.
    pub fn open(&mut self, timers: &mut Wheel<SocketHandle>) -> Result<SocketHandle> {
        let index = self.sockets.iter()
            .position(|socket| !socket.in_use)
            .ok_or(Error::Exhausted)?;
        let handle = SocketHandle(index);
        let timer = timers.alloc(handle).ok_or(Error::Exhausted)?;
        let socket = &mut self.sockets[index];
        socket.in_use = true;
        socket.timer = Some(timer);
        Ok(handle)
    }

    /// Bind a socket to a local port and start answering SYNs on it.
    pub fn listen(&mut self, handle: SocketHandle, port: u16) -> Result<()> {
        if port == 0 || self.port_in_use(port) {
            return Err(Error::Illegal);
        }
        let socket = &mut self.sockets[handle.0];
        if !socket.in_use || socket.state != State::Closed {
            return Err(Error::Illegal);
        }
        socket.local_port = port;
        socket.state = State::Listen;
        net_trace!("tcp: socket {} listening on port {}", handle.0, port);
        Ok(())
    }

    /// Take a connection that was admitted with [`Accept::Deferred`].
    ///
    /// [`Accept::Deferred`]: enum.Accept.html#variant.Deferred
    pub fn accept(&mut self, handle: SocketHandle) -> Result<()> {
        let socket = &mut self.sockets[handle.0];
        match socket.state {
            State::SynReceived | State::Established if socket.in_use && !socket.accepted => {
                socket.accepted = true;
                Ok(())
            },
            _ => Err(Error::Illegal),
        }
    }

    /// Start the handshake towards a remote endpoint.
    pub fn connect<D: Device>(
        &mut self,
        handle: SocketHandle,
        addr: Ipv4Address,
        port: u16,
        sender: &mut ip::Sender<'_, D>,
        timers: &mut Wheel<SocketHandle>,
    ) -> Result<()> {
        if port == 0 || !addr.is_unicast() {
            return Err(Error::Illegal);
        }
        if !self.sockets[handle.0].in_use
            || self.sockets[handle.0].state != State::Closed
        {
            return Err(Error::Illegal);
        }
        let local_port = self.ephemeral_port()?;
        let iss = self.take_iss();

        let socket = &mut self.sockets[handle.0];
        socket.local_port = local_port;
        socket.remote_addr = addr;
        socket.remote_port = port;
        socket.seq = iss;
        socket.rtx = RETRIES_SYN;
        socket.accepted = true;
        socket.state = State::SynSent;
        net_trace!("tcp: socket {} connecting to {}:{}", handle.0, addr, port);
        self.dispatch(handle, sender, timers, false)
    }

    /// Close a socket.
    ///
    /// On an established connection this starts the orderly teardown;
    /// queued transmit data drains first and [`Event::Closed`] reports
    /// the end of it. Anything earlier in its life is torn down at once.
    ///
    /// [`Event::Closed`]: enum.Event.html#variant.Closed
    pub fn close<D: Device>(
        &mut self,
        handle: SocketHandle,
        sender: &mut ip::Sender<'_, D>,
        timers: &mut Wheel<SocketHandle>,
    ) -> Result<()> {
        let socket = &mut self.sockets[handle.0];
        if !socket.in_use {
            return Err(Error::Illegal);
        }
        match socket.state {
            State::Closed | State::Listen => {
                release(socket, timers);
                Ok(())
            },
            // The handshake is in progress; the peer gets a reset.
            State::SynSent => self.abort(handle, sender, timers),
            State::SynReceived => self.teardown(handle, sender, timers),
            State::Established => {
                self.sockets[handle.0].state = State::StartClose;
                self.dispatch(handle, sender, timers, false)
            },
            // Already closing.
            _ => Err(Error::Illegal),
        }
    }

    /// Tear a connection down with a reset, skipping the orderly states.
    pub fn abort<D: Device>(
        &mut self,
        handle: SocketHandle,
        sender: &mut ip::Sender<'_, D>,
        timers: &mut Wheel<SocketHandle>,
    ) -> Result<()> {
        if !self.sockets[handle.0].in_use {
            return Err(Error::Illegal);
        }
        Self::send_abort(sender, &self.sockets[handle.0]);
        release(&mut self.sockets[handle.0], timers);
        Ok(())
    }

    /// Reset the peer and end the connection, listening on again if it
    /// came in passively.
    fn teardown<D: Device>(
        &mut self,
        handle: SocketHandle,
        sender: &mut ip::Sender<'_, D>,
        timers: &mut Wheel<SocketHandle>,
    ) -> Result<()> {
        Self::send_abort(sender, &self.sockets[handle.0]);
        retire(&mut self.sockets[handle.0], timers);
        Ok(())
    }

    fn send_abort<D: Device>(sender: &mut ip::Sender<'_, D>, socket: &Socket) {
        let has_peer = match socket.state {
            State::Closed | State::Listen | State::TimeWait => false,
            _ => true,
        };
        if has_peer {
            let repr = TcpRepr {
                src_port: socket.local_port,
                dst_port: socket.remote_port,
                seq_number: socket.seq + socket.seq_space(),
                ack_number: socket.ack,
                flags: TcpFlags::RST | TcpFlags::ACK,
                window_len: 0,
                max_seg_size: None,
            };
            // Best effort; an unresolved link address loses the reset.
            let _ = Self::emit_segment(sender, &repr, socket.remote_addr);
        }
    }

    /// Copy received bytes out of a socket's receive buffer.
    pub fn read(&mut self, handle: SocketHandle, buffer: &mut [u8]) -> Result<usize> {
        let socket = &mut self.sockets[handle.0];
        if !socket.in_use || !socket.accepted {
            return Err(Error::Illegal);
        }
        Ok(socket.rx.dequeue(buffer))
    }

    /// Queue bytes for transmission.
    ///
    /// Returns how many bytes fit the transmit buffer. Sending them is
    /// the engine's business from here on.
    pub fn write<D: Device>(
        &mut self,
        handle: SocketHandle,
        data: &[u8],
        sender: &mut ip::Sender<'_, D>,
        timers: &mut Wheel<SocketHandle>,
    ) -> Result<usize> {
        let socket = &mut self.sockets[handle.0];
        if !socket.in_use || socket.state != State::Established {
            return Err(Error::Illegal);
        }
        let enqueued = socket.tx.enqueue(data);
        if enqueued > 0 {
            self.dispatch(handle, sender, timers, false)?;
        }
        Ok(enqueued)
    }

    /// The number of received bytes waiting to be read.
    pub fn recv_queue(&self, handle: SocketHandle) -> usize {
        self.sockets[handle.0].rx.len()
    }

    /// The room left in the transmit buffer.
    pub fn send_capacity(&self, handle: SocketHandle) -> usize {
        self.sockets[handle.0].tx.window()
    }

    pub fn state(&self, handle: SocketHandle) -> State {
        self.sockets[handle.0].state
    }

    /// The peer of a connected socket.
    pub fn remote_endpoint(&self, handle: SocketHandle) -> Option<(Ipv4Address, u16)> {
        let socket = &self.sockets[handle.0];
        match socket.state {
            State::Closed | State::Listen => None,
            _ if !socket.in_use => None,
            _ => Some((socket.remote_addr, socket.remote_port)),
        }
    }

    /// Digest one incoming segment.
    ///
    /// `payload` is the IP payload; the checksum is verified here since
    /// it covers the enclosing addresses.
    pub(crate) fn process<D: Device, E: Events>(
        &mut self,
        sender: &mut ip::Sender<'_, D>,
        timers: &mut Wheel<SocketHandle>,
        events: &mut E,
        ip_repr: &Ipv4Repr,
        payload: &[u8],
    ) -> Result<()> {
        let segment = tcp_segment::new_checked(payload)?;
        if !segment.verify_checksum(ip_repr.src_addr, ip_repr.dst_addr) {
            return Err(Error::Parse(wire::Error::Checksum));
        }
        let repr = TcpRepr::parse(segment)?;
        let data = segment.payload_slice();

        let connected = self.sockets.iter().position(
            |socket| socket.is_connected_to(ip_repr.src_addr, repr.src_port, repr.dst_port));
        let listening = || self.sockets.iter().position(
            |socket| socket.in_use
                && socket.state == State::Listen
                && socket.local_port == repr.dst_port);

        let handle = match connected.or_else(listening).map(SocketHandle) {
            Some(handle) => handle,
            None => {
                // Nobody home on that port.
                if !repr.flags.contains(TcpFlags::RST) {
                    Self::send_reset(sender, ip_repr, &repr, data.len())?;
                }
                return Ok(());
            },
        };

        match self.sockets[handle.0].state {
            State::Listen =>
                self.process_listen(handle, sender, timers, events, ip_repr, &repr),
            State::SynSent =>
                self.process_syn_sent(handle, sender, timers, events, ip_repr, &repr),
            _ =>
                self.process_connected(handle, sender, timers, events, &repr, data),
        }
    }

    fn process_listen<D: Device, E: Events>(
        &mut self,
        handle: SocketHandle,
        sender: &mut ip::Sender<'_, D>,
        timers: &mut Wheel<SocketHandle>,
        events: &mut E,
        ip_repr: &Ipv4Repr,
        repr: &TcpRepr,
    ) -> Result<()> {
        if repr.flags.contains(TcpFlags::RST) {
            return Ok(());
        }
        if repr.flags.contains(TcpFlags::ACK) || !repr.flags.contains(TcpFlags::SYN) {
            return Self::send_reset(sender, ip_repr, repr, 0);
        }

        let accepted = match events.incoming(handle, ip_repr.src_addr, repr.src_port) {
            Accept::Refuse => {
                net_trace!("tcp: refusing connection from {}:{}",
                           ip_repr.src_addr, repr.src_port);
                return Self::send_reset(sender, ip_repr, repr, 0);
            },
            Accept::Immediate => true,
            Accept::Deferred => false,
        };

        let iss = self.take_iss();
        let socket = &mut self.sockets[handle.0];
        socket.remote_addr = ip_repr.src_addr;
        socket.remote_port = repr.src_port;
        socket.seq = iss;
        socket.ack = repr.seq_number + 1;
        socket.peer_window = repr.window_len;
        socket.peer_mss = repr.max_seg_size.unwrap_or(DEFAULT_PEER_MSS).min(LOCAL_MSS);
        socket.rtx = RETRIES_SYN_ACK;
        socket.accepted = accepted;
        socket.passive = true;
        socket.state = State::SynReceived;
        net_trace!("tcp: socket {} got connection from {}:{}",
                   handle.0, ip_repr.src_addr, repr.src_port);
        self.dispatch(handle, sender, timers, false)
    }

    fn process_syn_sent<D: Device, E: Events>(
        &mut self,
        handle: SocketHandle,
        sender: &mut ip::Sender<'_, D>,
        timers: &mut Wheel<SocketHandle>,
        events: &mut E,
        ip_repr: &Ipv4Repr,
        repr: &TcpRepr,
    ) -> Result<()> {
        let socket = &mut self.sockets[handle.0];
        let acks_syn = repr.flags.contains(TcpFlags::ACK)
            && repr.ack_number == socket.seq + 1;

        if repr.flags.contains(TcpFlags::RST) {
            if acks_syn {
                net_debug!("tcp: socket {} connection refused", handle.0);
                release(socket, timers);
                events.event(handle, Event::Aborted);
            }
            return Ok(());
        }
        if repr.flags.contains(TcpFlags::ACK) && !acks_syn {
            return Self::send_reset(sender, ip_repr, repr, 0);
        }
        if repr.flags.contains(TcpFlags::SYN) && !repr.flags.contains(TcpFlags::ACK) {
            // Simultaneous open. Both SYNs crossed; answer with SYN-ACK
            // and converge through the passive-side state.
            socket.ack = repr.seq_number + 1;
            socket.peer_window = repr.window_len;
            socket.peer_mss = repr.max_seg_size.unwrap_or(DEFAULT_PEER_MSS).min(LOCAL_MSS);
            socket.rtx = RETRIES_SYN_ACK;
            socket.state = State::SynReceived;
            net_trace!("tcp: socket {} simultaneous open", handle.0);
            return self.dispatch(handle, sender, timers, false);
        }
        if !(acks_syn && repr.flags.contains(TcpFlags::SYN)) {
            return Ok(());
        }

        socket.seq = socket.seq + 1;
        socket.ack = repr.seq_number + 1;
        socket.peer_window = repr.window_len;
        socket.peer_mss = repr.max_seg_size.unwrap_or(DEFAULT_PEER_MSS).min(LOCAL_MSS);
        socket.rtx = RETRIES_DATA;
        socket.ack_due = true;
        socket.state = State::Established;
        net_trace!("tcp: socket {} connected", handle.0);
        events.event(handle, Event::Connected);
        self.dispatch(handle, sender, timers, false)
    }

    fn process_connected<D: Device, E: Events>(
        &mut self,
        handle: SocketHandle,
        sender: &mut ip::Sender<'_, D>,
        timers: &mut Wheel<SocketHandle>,
        events: &mut E,
        repr: &TcpRepr,
        data: &[u8],
    ) -> Result<()> {
        let socket = &mut self.sockets[handle.0];

        if repr.flags.contains(TcpFlags::RST) {
            // A reset counts only when it sits exactly on the expected
            // sequence number.
            if repr.seq_number == socket.ack {
                net_debug!("tcp: socket {} reset by peer", handle.0);
                let was_time_wait = socket.state == State::TimeWait;
                retire(socket, timers);
                events.event(handle, if was_time_wait { Event::Closed } else { Event::Aborted });
            }
            return Ok(());
        }

        // Exact sequence acceptance. Anything not starting at the
        // expected number, old duplicate or future segment alike, is
        // dropped and answered with the current acknowledgment, and the
        // peer's retransmission sorts it out. This also covers a peer
        // re-sending its SYN before the handshake finished.
        if repr.seq_number != socket.ack {
            net_trace!("tcp: socket {} out-of-order seq {} (expected {})",
                       handle.0, repr.seq_number, socket.ack);
            socket.ack_due = true;
            return self.dispatch(handle, sender, timers, false);
        }

        // An in-window SYN on a live connection is fatal.
        if repr.flags.contains(TcpFlags::SYN) && socket.state != State::SynReceived {
            net_debug!("tcp: socket {} unexpected SYN, tearing down", handle.0);
            retire(socket, timers);
            events.event(handle, Event::Aborted);
            return Ok(());
        }

        socket.peer_window = repr.window_len;

        if repr.flags.contains(TcpFlags::ACK) {
            let space = socket.seq_space();
            let delta = repr.ack_number.distance(socket.seq);
            if delta > 0 && delta as usize <= space {
                let full = delta as usize == space;
                let data_acked = match socket.state {
                    State::SynReceived => 0,
                    _ => (delta as usize).min(socket.in_flight),
                };
                socket.tx.skip(data_acked);
                socket.in_flight -= data_acked;
                socket.seq = repr.ack_number;
                match socket.state {
                    State::SynReceived => {
                        socket.rtx = RETRIES_DATA;
                        socket.state = State::Established;
                        net_trace!("tcp: socket {} connected", handle.0);
                        events.event(handle, Event::Connected);
                    },
                    State::Established | State::StartClose => {
                        socket.rtx = RETRIES_DATA;
                        if data_acked > 0 {
                            events.event(handle, Event::Sent);
                        }
                    },
                    State::FinWait1 if full => socket.state = State::FinWait2,
                    State::Closing if full => socket.state = State::TimeWait,
                    State::LastAck if full => {
                        net_trace!("tcp: socket {} closed", handle.0);
                        retire(socket, timers);
                        events.event(handle, Event::Closed);
                        return Ok(());
                    },
                    // Partial progress while our FIN is still out.
                    State::FinWait1 | State::Closing | State::LastAck => {
                        socket.rtx = RETRIES_FIN;
                        if data_acked > 0 {
                            events.event(handle, Event::Sent);
                        }
                    },
                    _ => (),
                }
            } else if delta > 0 {
                // Acknowledges bytes never sent; tell the peer where we
                // really are.
                socket.ack_due = true;
            }
        }

        let mut all_taken = true;
        if !data.is_empty() {
            if socket.rx_open() {
                let taken = socket.rx.enqueue(data);
                socket.ack = socket.ack + taken;
                socket.ack_due = true;
                all_taken = taken == data.len();
                if taken > 0 {
                    events.event(handle, Event::Received);
                }
            } else {
                socket.ack_due = true;
                all_taken = false;
            }
        }

        // The FIN only counts once every byte before it was taken.
        if repr.flags.contains(TcpFlags::FIN) && all_taken && !socket.peer_closed {
            socket.ack = socket.ack + 1;
            socket.peer_closed = true;
            socket.ack_due = true;
            net_trace!("tcp: socket {} peer finished", handle.0);
            match socket.state {
                State::FinWait1 => socket.state = State::Closing,
                State::FinWait2 => socket.state = State::TimeWait,
                _ => (),
            }
            events.event(handle, Event::PeerClosed);
        }

        self.dispatch(handle, sender, timers, false)
    }

    /// Handle an expired timer.
    pub(crate) fn on_timeout<D: Device, E: Events>(
        &mut self,
        handle: SocketHandle,
        sender: &mut ip::Sender<'_, D>,
        timers: &mut Wheel<SocketHandle>,
        events: &mut E,
    ) -> Result<()> {
        let socket = &mut self.sockets[handle.0];
        if !socket.in_use {
            return Ok(());
        }

        if socket.link_pending {
            socket.link_rtx -= 1;
            // Let go of the stuck resolution so the next attempt sends a
            // fresh request.
            if let Ok(next_hop) = sender.config.route(socket.remote_addr) {
                sender.cache.abandon(next_hop);
            }
            if socket.link_rtx < 0 {
                net_debug!("tcp: socket {} peer unresolvable, giving up", handle.0);
                retire(socket, timers);
                events.event(handle, Event::Aborted);
                return Ok(());
            }
            return self.dispatch(handle, sender, timers, true);
        }

        match socket.state {
            State::Closed | State::Listen => Ok(()),
            State::TimeWait | State::FinWait2 => {
                net_trace!("tcp: socket {} closed", handle.0);
                retire(socket, timers);
                events.event(handle, Event::Closed);
                Ok(())
            },
            State::Established
                if socket.seq_space() == 0 && socket.tx.is_empty() =>
            {
                net_debug!("tcp: socket {} idle, closing", handle.0);
                events.event(handle, Event::Idle);
                let socket = &mut self.sockets[handle.0];
                if socket.state == State::Established {
                    socket.state = State::StartClose;
                }
                self.dispatch(handle, sender, timers, false)
            },
            _ if socket.seq_space() == 0 => {
                // Backlog stalled on a closed peer window; poke it.
                self.dispatch(handle, sender, timers, false)
            },
            _ => {
                socket.rtx -= 1;
                if socket.rtx < 0 {
                    net_debug!("tcp: socket {} retries exhausted", handle.0);
                    self.teardown(handle, sender, timers)?;
                    events.event(handle, Event::Aborted);
                    Ok(())
                } else {
                    net_trace!("tcp: socket {} retransmitting", handle.0);
                    self.dispatch(handle, sender, timers, true)
                }
            },
        }
    }

    /// Send whatever the socket currently owes the wire.
    ///
    /// `resend` restarts from the oldest unacknowledged byte instead of
    /// extending past what is already out.
    fn dispatch<D: Device>(
        &mut self,
        handle: SocketHandle,
        sender: &mut ip::Sender<'_, D>,
        timers: &mut Wheel<SocketHandle>,
        resend: bool,
    ) -> Result<()> {
        match self.sockets[handle.0].state {
            State::Closed | State::Listen => {
                self.sockets[handle.0].ack_due = false;
                Ok(())
            },
            State::SynSent | State::SynReceived =>
                self.dispatch_handshake(handle, sender, timers),
            State::Established | State::StartClose
            | State::FinWait1 | State::Closing | State::LastAck =>
                self.dispatch_stream(handle, sender, timers, resend),
            State::FinWait2 | State::TimeWait =>
                self.dispatch_ack_only(handle, sender, timers),
        }
    }

    fn dispatch_handshake<D: Device>(
        &mut self,
        handle: SocketHandle,
        sender: &mut ip::Sender<'_, D>,
        timers: &mut Wheel<SocketHandle>,
    ) -> Result<()> {
        let socket = &mut self.sockets[handle.0];
        let flags = match socket.state {
            State::SynSent => TcpFlags::SYN,
            _ => TcpFlags::SYN | TcpFlags::ACK,
        };
        let repr = TcpRepr {
            src_port: socket.local_port,
            dst_port: socket.remote_port,
            seq_number: socket.seq,
            ack_number: socket.ack,
            flags,
            window_len: socket.rx.window() as u16,
            max_seg_size: Some(LOCAL_MSS),
        };
        match Self::emit_from(sender, socket, &repr, 0, 0)? {
            ip::Dispatch::Sent => {
                socket.link_pending = false;
                socket.ack_due = false;
                arm(timers, socket, TIMEOUT_RETRANSMIT_MS);
            },
            ip::Dispatch::Pending => Self::note_link_pending(socket, timers),
        }
        Ok(())
    }

    /// The data-bearing path: (re)fill the in-flight window with
    /// back-to-back segments of at most one MSS each, putting the FIN on
    /// the last one once the transmit buffer is covered.
    fn dispatch_stream<D: Device>(
        &mut self,
        handle: SocketHandle,
        sender: &mut ip::Sender<'_, D>,
        timers: &mut Wheel<SocketHandle>,
        resend: bool,
    ) -> Result<()> {
        let socket = &mut self.sockets[handle.0];
        let mss = usize::from(socket.peer_mss);

        // How far into the transmit buffer we may send. Never below what
        // is already out, even if the peer's window shrank since.
        let range = match socket.state {
            State::FinWait1 | State::Closing | State::LastAck => socket.tx.len(),
            _ => socket.in_flight.max(
                socket.tx.len().min(usize::from(socket.peer_window))),
        };
        let fin_at_end = match socket.state {
            State::FinWait1 | State::Closing | State::LastAck => true,
            State::StartClose => range == socket.tx.len(),
            _ => false,
        };

        let mut offset = if resend { 0 } else { socket.in_flight };
        let grows = range > socket.in_flight;
        let mut sent_fin = false;
        let mut sent_any = false;

        while offset < range || (fin_at_end && !sent_any && offset == range) {
            let chunk = (range - offset).min(mss);
            let last = range - offset <= mss;
            let mut flags = TcpFlags::ACK;
            if chunk > 0 {
                flags |= TcpFlags::PSH;
            }
            if last && fin_at_end {
                flags |= TcpFlags::FIN;
            }
            let repr = TcpRepr {
                src_port: socket.local_port,
                dst_port: socket.remote_port,
                seq_number: socket.seq + offset,
                ack_number: socket.ack,
                flags,
                window_len: socket.rx.window() as u16,
                max_seg_size: None,
            };
            match Self::emit_from(sender, socket, &repr, offset, chunk)? {
                ip::Dispatch::Sent => {
                    sent_any = true;
                    socket.ack_due = false;
                    offset += chunk;
                    if socket.in_flight < offset {
                        socket.in_flight = offset;
                    }
                    if last {
                        sent_fin = fin_at_end;
                        break;
                    }
                },
                ip::Dispatch::Pending => {
                    Self::note_link_pending(socket, timers);
                    return Ok(());
                },
            }
        }

        if sent_fin && socket.state == State::StartClose {
            socket.rtx = RETRIES_FIN;
            socket.state = if socket.peer_closed {
                State::LastAck
            } else {
                State::FinWait1
            };
            net_trace!("tcp: socket {} sent FIN", handle.0);
        }
        if sent_any {
            socket.link_pending = false;
            if grows && !sent_fin && !resend {
                socket.rtx = RETRIES_DATA;
            }
        } else if socket.ack_due {
            let repr = TcpRepr {
                src_port: socket.local_port,
                dst_port: socket.remote_port,
                seq_number: socket.seq + socket.seq_space(),
                ack_number: socket.ack,
                flags: TcpFlags::ACK,
                window_len: socket.rx.window() as u16,
                max_seg_size: None,
            };
            // A bare acknowledgment is never retried, the peer's
            // retransmission asks for it again.
            if let ip::Dispatch::Sent = Self::emit_from(sender, socket, &repr, 0, 0)? {
                socket.ack_due = false;
            }
        }

        if socket.seq_space() > 0 || !socket.tx.is_empty() {
            arm(timers, socket, TIMEOUT_RETRANSMIT_MS);
        } else if socket.state == State::Established {
            arm(timers, socket, TIMEOUT_IDLE_MS);
        }
        Ok(())
    }

    fn dispatch_ack_only<D: Device>(
        &mut self,
        handle: SocketHandle,
        sender: &mut ip::Sender<'_, D>,
        timers: &mut Wheel<SocketHandle>,
    ) -> Result<()> {
        let socket = &mut self.sockets[handle.0];
        if socket.ack_due {
            let repr = TcpRepr {
                src_port: socket.local_port,
                dst_port: socket.remote_port,
                seq_number: socket.seq,
                ack_number: socket.ack,
                flags: TcpFlags::ACK,
                window_len: socket.rx.window() as u16,
                max_seg_size: None,
            };
            if let ip::Dispatch::Sent = Self::emit_from(sender, socket, &repr, 0, 0)? {
                socket.ack_due = false;
            }
        }
        match socket.state {
            State::TimeWait => arm(timers, socket, TIMEOUT_TIME_WAIT_MS),
            _ => arm(timers, socket, TIMEOUT_IDLE_MS),
        }
        Ok(())
    }

    fn note_link_pending(socket: &mut Socket, timers: &mut Wheel<SocketHandle>) {
        if !socket.link_pending {
            socket.link_pending = true;
            socket.link_rtx = RETRIES_LINK;
        }
        arm(timers, socket, TIMEOUT_LINK_MS);
    }

    /// Build one segment, with `payload_len` bytes read from the
    /// transmit buffer at `payload_at`, and hand it to the IP layer.
    fn emit_from<D: Device>(
        sender: &mut ip::Sender<'_, D>,
        socket: &mut Socket,
        repr: &TcpRepr,
        payload_at: usize,
        payload_len: usize,
    ) -> Result<ip::Dispatch> {
        let src_addr = sender.config.address;
        let remote_addr = socket.remote_addr;
        let total_len = repr.buffer_len(payload_len);
        let segment = tcp_segment::new_unchecked_mut(sender.payload_mut(total_len));
        repr.emit(segment);
        if payload_len > 0 {
            socket.tx.peek(payload_at, &mut segment.payload_mut_slice()[..payload_len]);
        }
        segment.fill_checksum(src_addr, remote_addr);
        sender.send(remote_addr, IpProtocol::Tcp, total_len)
    }

    /// Answer a segment that reached no socket, as RFC 793 asks.
    fn send_reset<D: Device>(
        sender: &mut ip::Sender<'_, D>,
        ip_repr: &Ipv4Repr,
        repr: &TcpRepr,
        data_len: usize,
    ) -> Result<()> {
        let mut seg_len = data_len;
        if repr.flags.contains(TcpFlags::SYN) {
            seg_len += 1;
        }
        if repr.flags.contains(TcpFlags::FIN) {
            seg_len += 1;
        }

        let reset = if repr.flags.contains(TcpFlags::ACK) {
            TcpRepr {
                src_port: repr.dst_port,
                dst_port: repr.src_port,
                seq_number: repr.ack_number,
                ack_number: TcpSeqNumber(0),
                flags: TcpFlags::RST,
                window_len: 0,
                max_seg_size: None,
            }
        } else {
            TcpRepr {
                src_port: repr.dst_port,
                dst_port: repr.src_port,
                seq_number: TcpSeqNumber(0),
                ack_number: repr.seq_number + seg_len,
                flags: TcpFlags::RST | TcpFlags::ACK,
                window_len: 0,
                max_seg_size: None,
            }
        };
        net_trace!("tcp: resetting {}:{}", ip_repr.src_addr, repr.src_port);
        Self::emit_segment(sender, &reset, ip_repr.src_addr)
    }

    fn emit_segment<D: Device>(
        sender: &mut ip::Sender<'_, D>,
        repr: &TcpRepr,
        dst_addr: Ipv4Address,
    ) -> Result<()> {
        let src_addr = sender.config.address;
        let total_len = repr.buffer_len(0);
        let segment = tcp_segment::new_unchecked_mut(sender.payload_mut(total_len));
        repr.emit(segment);
        segment.fill_checksum(src_addr, dst_addr);
        sender.send(dst_addr, IpProtocol::Tcp, total_len)?;
        Ok(())
    }

    fn port_in_use(&self, port: u16) -> bool {
        self.sockets.iter().any(|socket| {
            socket.in_use && socket.state != State::Closed && socket.local_port == port
        })
    }

    fn ephemeral_port(&mut self) -> Result<u16> {
        for _ in EPHEMERAL_PORT_BASE..=u16::max_value() {
            let port = self.next_ephemeral;
            self.next_ephemeral = self.next_ephemeral
                .checked_add(1)
                .unwrap_or(EPHEMERAL_PORT_BASE);
            if !self.port_in_use(port) {
                return Ok(port);
            }
        }
        Err(Error::Exhausted)
    }

    fn take_iss(&mut self) -> TcpSeqNumber {
        let iss = self.next_iss;
        self.next_iss = self.next_iss.wrapping_add(64007);
        TcpSeqNumber(iss)
    }
}
