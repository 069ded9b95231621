use crate::storage::Fifo;
use crate::timer;
use crate::wire::{Ipv4Address, TcpSeqNumber};

/// The state of a socket.
///
/// Mostly the classic connection diagram, with two departures. There is
/// no distinct CLOSE-WAIT: a peer that finished sending is recorded in a
/// flag next to `Established`, since our send side is unaffected.
/// `StartClose` is the stretch between the application asking to close
/// and the FIN actually leaving, which can take a while when transmit
/// data is still draining or the link address is unresolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Closed,
    Listen,
    SynSent,
    SynReceived,
    Established,
    StartClose,
    FinWait1,
    FinWait2,
    Closing,
    LastAck,
    TimeWait,
}

/// One connection's entire state.
///
/// `seq` is the oldest unacknowledged sequence number; together with
/// `in_flight` and the state it describes the range currently on the
/// wire. Unacknowledged payload stays at the front of `tx` and is
/// re-read from there for retransmission.
pub(crate) struct Socket {
    pub(crate) in_use: bool,
    pub(crate) state: State,
    pub(crate) local_port: u16,
    pub(crate) remote_port: u16,
    pub(crate) remote_addr: Ipv4Address,
    pub(crate) seq: TcpSeqNumber,
    pub(crate) ack: TcpSeqNumber,
    /// Payload bytes sent but not yet acknowledged.
    pub(crate) in_flight: usize,
    pub(crate) peer_window: u16,
    pub(crate) peer_mss: u16,
    pub(crate) rtx: i8,
    pub(crate) link_rtx: i8,
    pub(crate) link_pending: bool,
    pub(crate) ack_due: bool,
    pub(crate) peer_closed: bool,
    pub(crate) accepted: bool,
    /// Whether the connection came in over a listening port.
    pub(crate) passive: bool,
    pub(crate) timer: Option<timer::Handle>,
    pub(crate) rx: Fifo,
    pub(crate) tx: Fifo,
}

impl Socket {
    pub(crate) const fn new() -> Socket {
        Socket {
            in_use: false,
            state: State::Closed,
            local_port: 0,
            remote_port: 0,
            remote_addr: Ipv4Address::UNSPECIFIED,
            seq: TcpSeqNumber(0),
            ack: TcpSeqNumber(0),
            in_flight: 0,
            peer_window: 0,
            peer_mss: super::DEFAULT_PEER_MSS,
            rtx: 0,
            link_rtx: 0,
            link_pending: false,
            ack_due: false,
            peer_closed: false,
            accepted: false,
            passive: false,
            timer: None,
            rx: Fifo::new(),
            tx: Fifo::new(),
        }
    }

    /// The amount of sequence space currently on the wire.
    pub(crate) fn seq_space(&self) -> usize {
        match self.state {
            State::SynSent | State::SynReceived => 1,
            State::Established | State::StartClose => self.in_flight,
            State::FinWait1 | State::Closing | State::LastAck => self.in_flight + 1,
            _ => 0,
        }
    }

    /// Whether the peer may still send us payload.
    pub(crate) fn rx_open(&self) -> bool {
        if self.peer_closed {
            return false;
        }
        match self.state {
            State::Established | State::StartClose
            | State::FinWait1 | State::FinWait2 => true,
            _ => false,
        }
    }

    /// Whether the socket is wedded to a particular remote endpoint.
    pub(crate) fn is_connected_to(&self, addr: Ipv4Address, port: u16, local_port: u16) -> bool {
        self.in_use
            && self.state != State::Closed
            && self.state != State::Listen
            && self.local_port == local_port
            && self.remote_addr == addr
            && self.remote_port == port
    }

    /// Return the socket to its pristine state, keeping the slot claimed.
    pub(crate) fn reset_connection(&mut self) {
        self.state = State::Closed;
        self.remote_port = 0;
        self.remote_addr = Ipv4Address::UNSPECIFIED;
        self.seq = TcpSeqNumber(0);
        self.ack = TcpSeqNumber(0);
        self.in_flight = 0;
        self.peer_window = 0;
        self.peer_mss = super::DEFAULT_PEER_MSS;
        self.rtx = 0;
        self.link_rtx = 0;
        self.link_pending = false;
        self.ack_due = false;
        self.peer_closed = false;
        self.accepted = false;
        self.passive = false;
        self.rx.clear();
        self.tx.clear();
    }
}
