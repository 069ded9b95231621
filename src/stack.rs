/*! The assembled network stack.

[`Stack`] owns the device, the neighbor cache, the timer pool and the
TCP socket pool, and is driven by exactly two outside stimuli: the
receive interrupt hands completed frames to [`handle_frame`], and the
periodic interrupt calls [`tick`] every ten milliseconds. Everything
else, retransmission, resolution retries, idle teardown, falls out of
those two.

Both entry points take the application's [`Events`] capability by
reference, so the stack itself stays free of the application type.

[`Stack`]: struct.Stack.html
[`handle_frame`]: struct.Stack.html#method.handle_frame
[`tick`]: struct.Stack.html#method.tick
[`Events`]: ../layer/tcp/trait.Events.html
*/

use crate::layer::{arp, ip, tcp, Result};
use crate::nic::{Device, MAX_FRAME_LEN};
use crate::timer::Wheel;
use crate::wire::{
    arp_packet, ethernet_frame, ipv4_packet,
    ArpRepr, EthernetProtocol, EthernetRepr, IpProtocol, Ipv4Address, Ipv4Repr,
};

pub use crate::layer::tcp::{Accept, Event, Events, NoEvents, SocketHandle};

/// What became of a frame given to [`Stack::handle_frame`].
///
/// [`Stack::handle_frame`]: struct.Stack.html#method.handle_frame
#[derive(Debug, PartialEq, Eq)]
pub enum Recv<'frame> {
    /// The stack consumed the frame.
    Handled,
    /// The frame was not addressed to this host, or carried a link
    /// protocol the stack does not speak.
    Ignored,
    /// A valid datagram of an IP protocol the stack does not terminate,
    /// handed up for the host to deal with. The payload borrows from the
    /// received frame.
    Datagram {
        protocol: IpProtocol,
        src_addr: Ipv4Address,
        payload: &'frame [u8],
    },
}

/// Running frame counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// Frames handed to the stack.
    pub frames: u32,
    /// Frames ignored as not ours.
    pub dropped: u32,
    /// Frames rejected as malformed.
    pub errors: u32,
}

pub struct Stack<D> {
    device: D,
    config: ip::Config,
    cache: arp::Cache,
    timers: Wheel<SocketHandle>,
    tcp: tcp::Endpoint,
    scratch: [u8; MAX_FRAME_LEN],
    stats: Stats,
}

macro_rules! sender {
    ($stack:expr) => {
        ip::Sender {
            config: &$stack.config,
            cache: &mut $stack.cache,
            device: &mut $stack.device,
            scratch: &mut $stack.scratch,
        }
    };
}

impl<D: Device> Stack<D> {
    pub fn new(device: D, config: ip::Config) -> Stack<D> {
        Stack {
            device,
            config,
            cache: arp::Cache::new(),
            timers: Wheel::new(),
            tcp: tcp::Endpoint::new(),
            scratch: [0; MAX_FRAME_LEN],
            stats: Stats::default(),
        }
    }

    pub fn config(&self) -> &ip::Config {
        &self.config
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Digest one received frame.
    ///
    /// Called from the receive path with a complete Ethernet frame. The
    /// stack may transmit in response before returning.
    pub fn handle_frame<'frame, E: Events>(
        &mut self,
        frame: &'frame [u8],
        events: &mut E,
    ) -> Result<Recv<'frame>> {
        self.stats.frames += 1;
        match self.ingress(frame, events) {
            Ok(Recv::Ignored) => {
                self.stats.dropped += 1;
                Ok(Recv::Ignored)
            },
            Ok(recv) => Ok(recv),
            Err(error) => {
                self.stats.errors += 1;
                net_debug!("stack: dropping malformed frame: {:?}", error);
                Err(error)
            },
        }
    }

    fn ingress<'frame, E: Events>(
        &mut self,
        frame: &'frame [u8],
        events: &mut E,
    ) -> Result<Recv<'frame>> {
        let frame = ethernet_frame::new_checked(frame)?;
        let dst_addr = frame.dst_addr();
        if dst_addr != self.device.mac() && !dst_addr.is_broadcast() {
            return Ok(Recv::Ignored);
        }

        match frame.ethertype() {
            EthernetProtocol::Arp => {
                let packet = arp_packet::new_checked(frame.payload_slice())?;
                let repr = ArpRepr::parse(packet)?;
                let reply = arp::process(
                    &mut self.cache, self.device.mac(), self.config.address, &repr);
                if let Some(reply) = reply {
                    self.send_arp(&reply)?;
                }
                Ok(Recv::Handled)
            },
            EthernetProtocol::Ipv4 => {
                let packet = ipv4_packet::new_checked(frame.payload_slice())?;
                let repr = Ipv4Repr::parse(packet)?;
                if !self.config.accepts(repr.dst_addr) {
                    return Ok(Recv::Ignored);
                }
                // A validated datagram vouches for its sender's link
                // address, saving a resolution round trip on the reply.
                let src_mac = frame.src_addr();
                if repr.src_addr.is_unicast() && src_mac.is_unicast() {
                    self.cache.insert(repr.src_addr, src_mac);
                }
                // The frame may carry link padding past the IP length.
                let payload = &packet.payload_slice()[..repr.payload_len];
                match repr.protocol {
                    IpProtocol::Tcp => {
                        let mut sender = sender!(self);
                        self.tcp.process(
                            &mut sender, &mut self.timers, events, &repr, payload)?;
                        Ok(Recv::Handled)
                    },
                    protocol => Ok(Recv::Datagram {
                        protocol,
                        src_addr: repr.src_addr,
                        payload,
                    }),
                }
            },
            _ => Ok(Recv::Ignored),
        }
    }

    /// Advance time by one quantum and service everything that ran out.
    ///
    /// Called from the periodic interrupt, every
    /// [`QUANTUM_MS`](../timer/constant.QUANTUM_MS.html) milliseconds.
    pub fn tick<E: Events>(&mut self, events: &mut E) -> Result<()> {
        self.timers.tick();
        while let Some(handle) = self.timers.next_expired() {
            let mut sender = sender!(self);
            self.tcp.on_timeout(handle, &mut sender, &mut self.timers, events)?;
        }
        Ok(())
    }

    /// Send a raw IP datagram, for protocols the stack does not
    /// terminate.
    ///
    /// Returns [`Dispatch::Pending`] when the next hop is unresolved;
    /// the datagram is then lost and the caller may retry once the
    /// resolution had time to complete.
    ///
    /// [`Dispatch::Pending`]: ../layer/ip/enum.Dispatch.html#variant.Pending
    pub fn send_datagram(
        &mut self,
        dst_addr: Ipv4Address,
        protocol: IpProtocol,
        payload: &[u8],
    ) -> Result<ip::Dispatch> {
        let mut sender = sender!(self);
        sender.payload_mut(payload.len()).copy_from_slice(payload);
        sender.send(dst_addr, protocol, payload.len())
    }

    fn send_arp(&mut self, repr: &ArpRepr) -> Result<()> {
        let ArpRepr::EthernetIpv4 { target_hardware_addr, .. } = *repr;
        let mut buffer = [0; ethernet_frame::HEADER_LEN + arp_packet::LEN];

        let frame = ethernet_frame::new_unchecked_mut(&mut buffer);
        EthernetRepr {
            src_addr: self.device.mac(),
            dst_addr: target_hardware_addr,
            ethertype: EthernetProtocol::Arp,
        }.emit(frame);
        repr.emit(arp_packet::new_unchecked_mut(frame.payload_mut_slice()));

        self.device.send(&buffer)
    }

    /// Claim a socket from the pool.
    pub fn socket(&mut self) -> Result<SocketHandle> {
        self.tcp.open(&mut self.timers)
    }

    /// Answer connections on a local port with this socket.
    pub fn listen(&mut self, handle: SocketHandle, port: u16) -> Result<()> {
        self.tcp.listen(handle, port)
    }

    /// Open a connection to a remote endpoint.
    pub fn connect(&mut self, handle: SocketHandle, addr: Ipv4Address, port: u16) -> Result<()> {
        let mut sender = sender!(self);
        self.tcp.connect(handle, addr, port, &mut sender, &mut self.timers)
    }

    /// Take a connection that was admitted with [`Accept::Deferred`].
    ///
    /// [`Accept::Deferred`]: enum.Accept.html#variant.Deferred
    pub fn accept(&mut self, handle: SocketHandle) -> Result<()> {
        self.tcp.accept(handle)
    }

    /// Close a socket, draining queued transmit data first.
    pub fn close(&mut self, handle: SocketHandle) -> Result<()> {
        let mut sender = sender!(self);
        self.tcp.close(handle, &mut sender, &mut self.timers)
    }

    /// Tear a connection down with a reset.
    pub fn abort(&mut self, handle: SocketHandle) -> Result<()> {
        let mut sender = sender!(self);
        self.tcp.abort(handle, &mut sender, &mut self.timers)
    }

    /// Copy received bytes out of a socket.
    pub fn read(&mut self, handle: SocketHandle, buffer: &mut [u8]) -> Result<usize> {
        self.tcp.read(handle, buffer)
    }

    /// Queue bytes on a socket for transmission.
    pub fn write(&mut self, handle: SocketHandle, data: &[u8]) -> Result<usize> {
        let mut sender = sender!(self);
        self.tcp.write(handle, data, &mut sender, &mut self.timers)
    }

    /// The number of received bytes waiting on a socket.
    pub fn recv_queue(&self, handle: SocketHandle) -> usize {
        self.tcp.recv_queue(handle)
    }

    /// The room left in a socket's transmit buffer.
    pub fn send_capacity(&self, handle: SocketHandle) -> usize {
        self.tcp.send_capacity(handle)
    }

    pub fn socket_state(&self, handle: SocketHandle) -> tcp::State {
        self.tcp.state(handle)
    }

    /// The peer of a connected socket.
    pub fn remote_endpoint(&self, handle: SocketHandle) -> Option<(Ipv4Address, u16)> {
        self.tcp.remote_endpoint(handle)
    }
}
