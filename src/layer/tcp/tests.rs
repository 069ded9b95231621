use crate::layer::{arp, ip, Error};
use crate::nic::testing::TestDevice;
use crate::nic::MAX_FRAME_LEN;
use crate::timer::Wheel;
use crate::wire::{
    ethernet_frame, ipv4_packet, tcp_segment,
    EthernetProtocol, IpProtocol, Ipv4Address, Ipv4Repr,
    TcpFlags, TcpRepr, TcpSeqNumber,
};

use super::*;

const CONFIG: ip::Config = ip::Config {
    address: Ipv4Address([192, 168, 1, 2]),
    netmask: Ipv4Address([255, 255, 255, 0]),
    gateway: Ipv4Address([192, 168, 1, 1]),
};

const PEER_IP: Ipv4Address = Ipv4Address([192, 168, 1, 10]);
const PEER_MAC: crate::wire::EthernetAddress =
    crate::wire::EthernetAddress([0x02, 0, 0, 0, 0, 0x10]);
const PEER_PORT: u16 = 45000;

struct Recorder {
    events: Vec<(SocketHandle, Event)>,
    decision: Accept,
}

impl Recorder {
    fn new() -> Recorder {
        Recorder { events: Vec::new(), decision: Accept::Immediate }
    }

    fn take(&mut self) -> Vec<(SocketHandle, Event)> {
        core::mem::replace(&mut self.events, Vec::new())
    }
}

impl Events for Recorder {
    fn incoming(&mut self, _: SocketHandle, _: Ipv4Address, _: u16) -> Accept {
        self.decision
    }

    fn event(&mut self, handle: SocketHandle, event: Event) {
        self.events.push((handle, event));
    }
}

struct Harness {
    device: TestDevice,
    cache: arp::Cache,
    timers: Wheel<SocketHandle>,
    endpoint: Endpoint,
    scratch: [u8; MAX_FRAME_LEN],
}

macro_rules! with_sender {
    ($harness:expr, |$endpoint:ident, $sender:ident, $timers:ident| $body:expr) => {{
        let $endpoint = &mut $harness.endpoint;
        let $timers = &mut $harness.timers;
        let mut sender = ip::Sender {
            config: &CONFIG,
            cache: &mut $harness.cache,
            device: &mut $harness.device,
            scratch: &mut $harness.scratch,
        };
        let $sender = &mut sender;
        $body
    }};
}

impl Harness {
    fn new() -> Harness {
        let mut cache = arp::Cache::new();
        cache.insert(PEER_IP, PEER_MAC);
        Harness {
            device: TestDevice::new(),
            cache,
            timers: Wheel::new(),
            endpoint: Endpoint::new(),
            scratch: [0; MAX_FRAME_LEN],
        }
    }

    /// Hand a segment from the peer to the endpoint.
    fn deliver(&mut self, events: &mut Recorder, repr: TcpRepr, data: &[u8]) {
        let mut bytes = vec![0; repr.buffer_len(data.len())];
        {
            let segment = tcp_segment::new_unchecked_mut(&mut bytes);
            repr.emit(segment);
            segment.payload_mut_slice().copy_from_slice(data);
            segment.fill_checksum(PEER_IP, CONFIG.address);
        }
        let ip_repr = Ipv4Repr {
            src_addr: PEER_IP,
            dst_addr: CONFIG.address,
            protocol: IpProtocol::Tcp,
            payload_len: bytes.len(),
            hop_limit: 64,
        };
        with_sender!(self, |endpoint, sender, timers| {
            endpoint.process(sender, timers, events, &ip_repr, &bytes)
        }).unwrap();
    }

    /// The TCP segments the endpoint put on the wire since last asked.
    fn sent(&mut self) -> Vec<(TcpRepr, Vec<u8>)> {
        self.device.take_sent().iter()
            .filter_map(|frame| {
                let frame = ethernet_frame::new_checked(&frame[..]).ok()?;
                if frame.ethertype() != EthernetProtocol::Ipv4 {
                    return None;
                }
                let packet = ipv4_packet::new_checked(frame.payload_slice()).ok()?;
                let ip_repr = Ipv4Repr::parse(packet).ok()?;
                let segment = tcp_segment::new_checked(
                    &packet.payload_slice()[..ip_repr.payload_len]).ok()?;
                assert!(segment.verify_checksum(ip_repr.src_addr, ip_repr.dst_addr));
                Some((TcpRepr::parse(segment).ok()?, segment.payload_slice().to_vec()))
            })
            .collect()
    }

    fn arp_requests(&mut self) -> usize {
        self.device.take_sent().iter()
            .filter(|frame| {
                ethernet_frame::new_checked(&frame[..])
                    .map(|frame| frame.ethertype() == EthernetProtocol::Arp)
                    .unwrap_or(false)
            })
            .count()
    }

    /// Advance time by whole ticks, servicing expiries like the host
    /// main loop would.
    fn tick(&mut self, events: &mut Recorder, ticks: u32) {
        for _ in 0..ticks {
            self.timers.tick();
            while let Some(handle) = self.timers.next_expired() {
                with_sender!(self, |endpoint, sender, timers| {
                    endpoint.on_timeout(handle, sender, timers, events)
                }).unwrap();
            }
        }
    }

    fn open(&mut self) -> SocketHandle {
        self.endpoint.open(&mut self.timers).unwrap()
    }

    fn connect(&mut self, handle: SocketHandle) {
        with_sender!(self, |endpoint, sender, timers| {
            endpoint.connect(handle, PEER_IP, PEER_PORT, sender, timers)
        }).unwrap();
    }

    fn write(&mut self, handle: SocketHandle, data: &[u8]) -> usize {
        with_sender!(self, |endpoint, sender, timers| {
            endpoint.write(handle, data, sender, timers)
        }).unwrap()
    }

    fn close(&mut self, handle: SocketHandle) {
        with_sender!(self, |endpoint, sender, timers| {
            endpoint.close(handle, sender, timers)
        }).unwrap();
    }
}

fn segment(seq: u32, ack: TcpSeqNumber, flags: TcpFlags) -> TcpRepr {
    TcpRepr {
        src_port: PEER_PORT,
        dst_port: 80,
        seq_number: TcpSeqNumber(seq),
        ack_number: ack,
        flags,
        window_len: 1000,
        max_seg_size: None,
    }
}

/// Bring a listening socket on port 80 to `Established` and return
/// `(handle, iss)` with the peer's next sequence number at 101.
fn established_server(harness: &mut Harness, events: &mut Recorder) -> (SocketHandle, TcpSeqNumber) {
    established_server_with_mss(harness, events, 1460)
}

fn established_server_with_mss(
    harness: &mut Harness,
    events: &mut Recorder,
    mss: u16,
) -> (SocketHandle, TcpSeqNumber) {
    let handle = harness.open();
    harness.endpoint.listen(handle, 80).unwrap();

    let syn = TcpRepr {
        flags: TcpFlags::SYN,
        max_seg_size: Some(mss),
        ..segment(100, TcpSeqNumber(0), TcpFlags::SYN)
    };
    harness.deliver(events, syn, &[]);

    let sent = harness.sent();
    assert_eq!(sent.len(), 1);
    let syn_ack = sent[0].0;
    assert!(syn_ack.flags.contains(TcpFlags::SYN | TcpFlags::ACK));
    assert_eq!(syn_ack.ack_number, TcpSeqNumber(101));
    assert_eq!(syn_ack.max_seg_size, Some(LOCAL_MSS));
    let iss = syn_ack.seq_number;

    harness.deliver(events, segment(101, iss + 1, TcpFlags::ACK), &[]);
    assert_eq!(harness.endpoint.state(handle), State::Established);
    assert_eq!(events.take(), vec![(handle, Event::Connected)]);
    assert!(harness.sent().is_empty());
    (handle, iss)
}

#[test]
fn test_server_handshake_and_receive() {
    let mut harness = Harness::new();
    let mut events = Recorder::new();
    let (handle, iss) = established_server(&mut harness, &mut events);

    harness.deliver(&mut events, segment(101, iss + 1, TcpFlags::ACK | TcpFlags::PSH), b"hello");
    assert_eq!(events.take(), vec![(handle, Event::Received)]);

    let sent = harness.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0.ack_number, TcpSeqNumber(106));
    assert!(sent[0].1.is_empty());

    let mut buffer = [0; 16];
    let read = with_sender!(harness, |endpoint, _sender, _timers| {
        endpoint.read(handle, &mut buffer)
    }).unwrap();
    assert_eq!(&buffer[..read], b"hello");
}

#[test]
fn test_send_and_acknowledge() {
    let mut harness = Harness::new();
    let mut events = Recorder::new();
    let (handle, iss) = established_server(&mut harness, &mut events);

    assert_eq!(harness.write(handle, b"world"), 5);
    let sent = harness.sent();
    assert_eq!(sent.len(), 1);
    let (repr, payload) = &sent[0];
    assert_eq!(repr.seq_number, iss + 1);
    assert!(repr.flags.contains(TcpFlags::ACK | TcpFlags::PSH));
    assert_eq!(payload, b"world");

    harness.deliver(&mut events, segment(101, iss + 6, TcpFlags::ACK), &[]);
    assert_eq!(events.take(), vec![(handle, Event::Sent)]);
}

#[test]
fn test_out_of_order_segment_rejected() {
    let mut harness = Harness::new();
    let mut events = Recorder::new();
    let (handle, iss) = established_server(&mut harness, &mut events);

    // A gap: the peer skipped five bytes.
    harness.deliver(&mut events, segment(106, iss + 1, TcpFlags::ACK | TcpFlags::PSH), b"world");
    assert!(events.take().is_empty());
    assert_eq!(harness.endpoint.recv_queue(handle), 0);

    // Answered with the unchanged acknowledgment.
    let sent = harness.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0.ack_number, TcpSeqNumber(101));

    // The retransmission from the expected number goes through.
    harness.deliver(&mut events, segment(101, iss + 1, TcpFlags::ACK | TcpFlags::PSH),
                    b"helloworld");
    assert_eq!(events.take(), vec![(handle, Event::Received)]);
    assert_eq!(harness.endpoint.recv_queue(handle), 10);
}

#[test]
fn test_retransmission_and_giving_up() {
    let mut harness = Harness::new();
    let mut events = Recorder::new();
    let (handle, _) = established_server(&mut harness, &mut events);

    harness.write(handle, b"data");
    assert_eq!(harness.sent().len(), 1);

    // Each unanswered timeout re-sends the same segment.
    harness.tick(&mut events, 100);
    let sent = harness.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1, b"data");

    // Burn the rest of the budget. The final expiry aborts with a reset.
    harness.tick(&mut events, 100 * (RETRIES_DATA as u32 + 1));
    let sent = harness.sent();
    assert_eq!(sent.len(), RETRIES_DATA as usize);
    assert!(sent.last().unwrap().0.flags.contains(TcpFlags::RST));
    assert_eq!(events.take(), vec![(handle, Event::Aborted)]);
    // The passively-opened socket goes back to serving its port.
    assert_eq!(harness.endpoint.state(handle), State::Listen);
}

#[test]
fn test_client_connect() {
    let mut harness = Harness::new();
    let mut events = Recorder::new();
    let handle = harness.open();
    harness.connect(handle);

    let sent = harness.sent();
    assert_eq!(sent.len(), 1);
    let syn = sent[0].0;
    assert_eq!(syn.flags, TcpFlags::SYN);
    assert_eq!(syn.dst_port, PEER_PORT);
    assert_eq!(syn.max_seg_size, Some(LOCAL_MSS));
    assert!(syn.src_port >= EPHEMERAL_PORT_BASE);

    let syn_ack = TcpRepr {
        src_port: PEER_PORT,
        dst_port: syn.src_port,
        seq_number: TcpSeqNumber(7000),
        ack_number: syn.seq_number + 1,
        flags: TcpFlags::SYN | TcpFlags::ACK,
        window_len: 1000,
        max_seg_size: Some(1460),
    };
    harness.deliver(&mut events, syn_ack, &[]);

    assert_eq!(events.take(), vec![(handle, Event::Connected)]);
    assert_eq!(harness.endpoint.state(handle), State::Established);
    assert_eq!(harness.endpoint.remote_endpoint(handle), Some((PEER_IP, PEER_PORT)));

    let sent = harness.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0.flags, TcpFlags::ACK);
    assert_eq!(sent[0].0.ack_number, TcpSeqNumber(7001));
}

#[test]
fn test_connect_unresolved_peer_aborts() {
    let mut harness = Harness::new();
    harness.cache = arp::Cache::new();
    let mut events = Recorder::new();
    let handle = harness.open();
    harness.connect(handle);

    // The SYN could not go out; a resolution request did instead.
    assert_eq!(harness.arp_requests(), 1);

    // Every link timeout retries the resolution until the budget is gone.
    harness.tick(&mut events, 100 * (RETRIES_LINK as u32 + 1));
    assert_eq!(harness.arp_requests(), RETRIES_LINK as usize);
    assert_eq!(events.take(), vec![(handle, Event::Aborted)]);
    assert_eq!(harness.endpoint.state(handle), State::Closed);
}

#[test]
fn test_active_close() {
    let mut harness = Harness::new();
    let mut events = Recorder::new();
    let (handle, iss) = established_server(&mut harness, &mut events);

    harness.close(handle);
    let sent = harness.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].0.flags.contains(TcpFlags::FIN));
    assert_eq!(harness.endpoint.state(handle), State::FinWait1);

    harness.deliver(&mut events, segment(101, iss + 2, TcpFlags::ACK), &[]);
    assert_eq!(harness.endpoint.state(handle), State::FinWait2);

    harness.deliver(&mut events, segment(101, iss + 2, TcpFlags::ACK | TcpFlags::FIN), &[]);
    assert_eq!(harness.endpoint.state(handle), State::TimeWait);
    let sent = harness.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0.ack_number, TcpSeqNumber(102));

    // The lingering socket returns to listening once the quiet period
    // passes.
    harness.tick(&mut events, 200);
    let mut seen = events.take();
    seen.retain(|(_, event)| *event == Event::Closed || *event == Event::PeerClosed);
    assert_eq!(seen, vec![(handle, Event::PeerClosed), (handle, Event::Closed)]);
    assert_eq!(harness.endpoint.state(handle), State::Listen);
}

#[test]
fn test_passive_close() {
    let mut harness = Harness::new();
    let mut events = Recorder::new();
    let (handle, iss) = established_server(&mut harness, &mut events);

    harness.deliver(&mut events, segment(101, iss + 1, TcpFlags::ACK | TcpFlags::FIN), &[]);
    assert_eq!(events.take(), vec![(handle, Event::PeerClosed)]);
    let sent = harness.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0.ack_number, TcpSeqNumber(102));

    // Our direction still works after the peer finished.
    assert_eq!(harness.write(handle, b"bye"), 3);
    let sent = harness.sent();
    assert_eq!(sent[0].1, b"bye");
    harness.deliver(&mut events, segment(102, iss + 4, TcpFlags::ACK), &[]);
    events.take();

    harness.close(handle);
    assert_eq!(harness.endpoint.state(handle), State::LastAck);
    let sent = harness.sent();
    assert!(sent[0].0.flags.contains(TcpFlags::FIN));

    harness.deliver(&mut events, segment(102, iss + 5, TcpFlags::ACK), &[]);
    assert_eq!(events.take(), vec![(handle, Event::Closed)]);
    assert_eq!(harness.endpoint.state(handle), State::Listen);
}

#[test]
fn test_refused_connection() {
    let mut harness = Harness::new();
    let mut events = Recorder::new();
    events.decision = Accept::Refuse;

    let handle = harness.open();
    harness.endpoint.listen(handle, 80).unwrap();
    harness.deliver(&mut events, TcpRepr {
        flags: TcpFlags::SYN,
        ..segment(100, TcpSeqNumber(0), TcpFlags::SYN)
    }, &[]);

    let sent = harness.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].0.flags.contains(TcpFlags::RST));
    assert_eq!(sent[0].0.ack_number, TcpSeqNumber(101));
    assert_eq!(harness.endpoint.state(handle), State::Listen);
}

#[test]
fn test_deferred_accept() {
    let mut harness = Harness::new();
    let mut events = Recorder::new();
    events.decision = Accept::Deferred;
    let (handle, iss) = established_server(&mut harness, &mut events);

    harness.deliver(&mut events, segment(101, iss + 1, TcpFlags::ACK | TcpFlags::PSH), b"early");
    let mut buffer = [0; 16];
    assert_eq!(harness.endpoint.read(handle, &mut buffer), Err(Error::Illegal));

    harness.endpoint.accept(handle).unwrap();
    assert_eq!(harness.endpoint.read(handle, &mut buffer), Ok(5));
    assert_eq!(&buffer[..5], b"early");
}

#[test]
fn test_reset_reception() {
    let mut harness = Harness::new();
    let mut events = Recorder::new();
    let (handle, iss) = established_server(&mut harness, &mut events);

    harness.deliver(&mut events, segment(101, iss + 1, TcpFlags::RST), &[]);
    assert_eq!(events.take(), vec![(handle, Event::Aborted)]);
    assert_eq!(harness.endpoint.state(handle), State::Listen);
}

#[test]
fn test_off_sequence_reset_ignored() {
    let mut harness = Harness::new();
    let mut events = Recorder::new();
    let (handle, iss) = established_server(&mut harness, &mut events);

    harness.deliver(&mut events, segment(999, iss + 1, TcpFlags::RST), &[]);
    assert!(events.take().is_empty());
    assert_eq!(harness.endpoint.state(handle), State::Established);
}

#[test]
fn test_unknown_port_gets_reset() {
    let mut harness = Harness::new();
    let mut events = Recorder::new();

    harness.deliver(&mut events, TcpRepr {
        flags: TcpFlags::SYN,
        ..segment(100, TcpSeqNumber(0), TcpFlags::SYN)
    }, &[]);

    let sent = harness.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].0.flags.contains(TcpFlags::RST | TcpFlags::ACK));
    assert_eq!(sent[0].0.ack_number, TcpSeqNumber(101));
}

#[test]
fn test_idle_connection_closes() {
    let mut harness = Harness::new();
    let mut events = Recorder::new();
    let (handle, _) = established_server(&mut harness, &mut events);

    // Nothing happens for the whole idle timeout.
    harness.tick(&mut events, 250);
    assert_eq!(events.take(), vec![(handle, Event::Idle)]);
    assert_eq!(harness.endpoint.state(handle), State::FinWait1);
    let sent = harness.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].0.flags.contains(TcpFlags::FIN));
}

#[test]
fn test_listen_port_conflict() {
    let mut harness = Harness::new();
    let first = harness.open();
    let second = harness.open();
    harness.endpoint.listen(first, 80).unwrap();
    assert_eq!(harness.endpoint.listen(second, 80), Err(Error::Illegal));
    assert_eq!(harness.endpoint.listen(second, 81), Ok(()));
}

#[test]
fn test_chunked_send_respects_mss() {
    let mut harness = Harness::new();
    let mut events = Recorder::new();
    let (handle, iss) = established_server(&mut harness, &mut events);

    // The peer announced a 1460 byte MSS but only a 1000 byte window.
    let data = [0x42; 1400];
    assert_eq!(harness.write(handle, &data), 1400);

    let sent = harness.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1.len(), 1000);

    harness.deliver(&mut events, segment(101, iss + 1 + 1000, TcpFlags::ACK), &[]);
    let sent = harness.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0.seq_number, iss + 1 + 1000);
    assert_eq!(sent[0].1.len(), 400);
}

#[test]
fn test_back_to_back_segments_fill_the_window() {
    let mut harness = Harness::new();
    let mut events = Recorder::new();
    let (handle, iss) = established_server_with_mss(&mut harness, &mut events, 300);

    // 700 bytes fit the 1000 byte window but not one 300 byte segment.
    assert_eq!(harness.write(handle, &[0x42; 700]), 700);

    let sent = harness.sent();
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[0].0.seq_number, iss + 1);
    assert_eq!(sent[0].1.len(), 300);
    assert_eq!(sent[1].0.seq_number, iss + 1 + 300);
    assert_eq!(sent[1].1.len(), 300);
    assert_eq!(sent[2].0.seq_number, iss + 1 + 600);
    assert_eq!(sent[2].1.len(), 100);

    harness.deliver(&mut events, segment(101, iss + 1 + 700, TcpFlags::ACK), &[]);
    assert_eq!(events.take(), vec![(handle, Event::Sent)]);
    assert!(harness.sent().is_empty());
}

#[test]
fn test_partial_ack_retransmits_the_rest() {
    let mut harness = Harness::new();
    let mut events = Recorder::new();
    let (handle, iss) = established_server_with_mss(&mut harness, &mut events, 300);

    harness.write(handle, &[0x42; 700]);
    assert_eq!(harness.sent().len(), 3);

    // Only the first segment made it.
    harness.deliver(&mut events, segment(101, iss + 1 + 300, TcpFlags::ACK), &[]);
    assert_eq!(events.take(), vec![(handle, Event::Sent)]);
    // Nothing new goes out; the rest is already in flight.
    assert!(harness.sent().is_empty());

    // The timeout re-sends the unacknowledged tail only.
    harness.tick(&mut events, 100);
    let sent = harness.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].0.seq_number, iss + 1 + 300);
    assert_eq!(sent[0].1.len(), 300);
    assert_eq!(sent[1].0.seq_number, iss + 1 + 600);
    assert_eq!(sent[1].1.len(), 100);
}

#[test]
fn test_syn_on_live_connection_tears_down() {
    let mut harness = Harness::new();
    let mut events = Recorder::new();
    let (handle, iss) = established_server(&mut harness, &mut events);

    harness.deliver(&mut events,
                    segment(101, iss + 1, TcpFlags::SYN | TcpFlags::ACK), &[]);
    assert_eq!(events.take(), vec![(handle, Event::Aborted)]);
    assert_eq!(harness.endpoint.state(handle), State::Listen);
}

#[test]
fn test_zero_window_parks_the_backlog() {
    let mut harness = Harness::new();
    let mut events = Recorder::new();
    let (handle, iss) = established_server(&mut harness, &mut events);

    harness.deliver(&mut events, TcpRepr {
        window_len: 0,
        ..segment(101, iss + 1, TcpFlags::ACK)
    }, &[]);

    // The write queues but nothing can go out.
    assert_eq!(harness.write(handle, &[0x42; 100]), 100);
    assert!(harness.sent().is_empty());
    harness.tick(&mut events, 100);
    assert!(harness.sent().is_empty());
    assert_eq!(harness.endpoint.state(handle), State::Established);

    // The window opening releases it.
    harness.deliver(&mut events, segment(101, iss + 1, TcpFlags::ACK), &[]);
    let sent = harness.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0.seq_number, iss + 1);
    assert_eq!(sent[0].1.len(), 100);
}

#[test]
fn test_listener_reaccepts_after_close() {
    let mut harness = Harness::new();
    let mut events = Recorder::new();
    let (handle, iss) = established_server(&mut harness, &mut events);

    // Walk the whole active close to the end of the quiet period.
    harness.close(handle);
    harness.deliver(&mut events, segment(101, iss + 2, TcpFlags::ACK), &[]);
    harness.deliver(&mut events, segment(101, iss + 2, TcpFlags::ACK | TcpFlags::FIN), &[]);
    harness.tick(&mut events, 200);
    assert_eq!(harness.endpoint.state(handle), State::Listen);
    harness.sent();
    events.take();

    // The next client finds the port alive again.
    harness.deliver(&mut events, TcpRepr {
        src_port: 45001,
        dst_port: 80,
        seq_number: TcpSeqNumber(5000),
        ack_number: TcpSeqNumber(0),
        flags: TcpFlags::SYN,
        window_len: 1000,
        max_seg_size: Some(1460),
    }, &[]);

    let sent = harness.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].0.flags.contains(TcpFlags::SYN | TcpFlags::ACK));
    assert_eq!(sent[0].0.ack_number, TcpSeqNumber(5001));
    assert_eq!(sent[0].0.dst_port, 45001);
    assert_eq!(harness.endpoint.state(handle), State::SynReceived);
}

#[test]
fn test_simultaneous_open() {
    let mut harness = Harness::new();
    let mut events = Recorder::new();
    let handle = harness.open();
    harness.connect(handle);
    let syn = harness.sent()[0].0;

    // The peer's SYN crosses ours on the wire.
    harness.deliver(&mut events, TcpRepr {
        src_port: PEER_PORT,
        dst_port: syn.src_port,
        seq_number: TcpSeqNumber(9000),
        ack_number: TcpSeqNumber(0),
        flags: TcpFlags::SYN,
        window_len: 1000,
        max_seg_size: Some(1460),
    }, &[]);

    assert_eq!(harness.endpoint.state(handle), State::SynReceived);
    let sent = harness.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0.flags, TcpFlags::SYN | TcpFlags::ACK);
    assert_eq!(sent[0].0.seq_number, syn.seq_number);
    assert_eq!(sent[0].0.ack_number, TcpSeqNumber(9001));

    harness.deliver(&mut events, TcpRepr {
        src_port: PEER_PORT,
        dst_port: syn.src_port,
        seq_number: TcpSeqNumber(9001),
        ack_number: syn.seq_number + 1,
        flags: TcpFlags::ACK,
        window_len: 1000,
        max_seg_size: None,
    }, &[]);
    assert_eq!(events.take(), vec![(handle, Event::Connected)]);
    assert_eq!(harness.endpoint.state(handle), State::Established);
}

#[test]
fn test_close_drains_backlog_before_fin() {
    let mut harness = Harness::new();
    let mut events = Recorder::new();
    let (handle, iss) = established_server(&mut harness, &mut events);

    // More data than the 1000 byte peer window takes in one flight.
    harness.write(handle, &[0x42; 1400]);
    let sent = harness.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1.len(), 1000);
    assert!(!sent[0].0.flags.contains(TcpFlags::FIN));

    // Closing must not cut the queued tail short.
    harness.close(handle);
    assert_eq!(harness.endpoint.state(handle), State::StartClose);
    assert!(harness.sent().is_empty());

    // The acknowledgment frees the window; the tail leaves with the FIN.
    harness.deliver(&mut events, segment(101, iss + 1 + 1000, TcpFlags::ACK), &[]);
    let sent = harness.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0.seq_number, iss + 1 + 1000);
    assert_eq!(sent[0].1.len(), 400);
    assert!(sent[0].0.flags.contains(TcpFlags::FIN));
    assert_eq!(harness.endpoint.state(handle), State::FinWait1);
}

#[test]
fn test_full_receive_buffer_acknowledges_partially() {
    let mut harness = Harness::new();
    let mut events = Recorder::new();
    let (handle, iss) = established_server(&mut harness, &mut events);

    harness.deliver(&mut events, segment(101, iss + 1, TcpFlags::ACK | TcpFlags::PSH),
                    &[0x33; 1400]);
    let sent = harness.sent();
    assert_eq!(sent[0].0.ack_number, TcpSeqNumber(101 + 1400));

    // Only 100 bytes of buffer remain; the rest of the segment is not
    // acknowledged and the peer will re-send it.
    harness.deliver(&mut events, segment(101 + 1400, iss + 1, TcpFlags::ACK | TcpFlags::PSH),
                    &[0x33; 200]);
    let sent = harness.sent();
    assert_eq!(sent[0].0.ack_number, TcpSeqNumber(101 + 1500));
    assert_eq!(sent[0].0.window_len, 0);
    assert_eq!(harness.endpoint.recv_queue(handle), 1500);
}

#[test]
fn test_close_during_connect_resets() {
    let mut harness = Harness::new();
    let handle = harness.open();
    harness.connect(handle);
    let syn = harness.sent()[0].0;

    harness.close(handle);
    let sent = harness.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].0.flags.contains(TcpFlags::RST));
    assert_eq!(sent[0].0.seq_number, syn.seq_number + 1);
    assert_eq!(harness.endpoint.state(handle), State::Closed);

    // The slot is free again.
    assert_eq!(harness.open(), handle);
}
