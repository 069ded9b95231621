/*! IPv4 receive filtering and routing.

The routing table is the degenerate one of a single-homed host: a
destination is either on the local subnet and resolved directly, or it
goes through the one configured gateway. [`Sender`] is the shared
transmit primitive; upper layers write their payload into its scratch
buffer and it wraps the Ethernet and IPv4 headers around it, resolving
the link address on the way out.

[`Sender`]: struct.Sender.html
*/

use crate::layer::{arp, Error, Result};
use crate::nic::{Device, MAX_FRAME_LEN};
use crate::wire::{
    arp_packet, ethernet_frame, ipv4_packet,
    ArpRepr, EthernetAddress, EthernetProtocol, EthernetRepr,
    IpProtocol, Ipv4Address, Ipv4Repr,
};

/// The default hop limit of emitted packets.
pub const HOP_LIMIT: u8 = 64;

/// The offset of the IP payload within an emitted frame.
pub const PAYLOAD_AT: usize = ethernet_frame::HEADER_LEN + ipv4_packet::HEADER_LEN;

/// The largest IP payload that fits an emitted frame.
pub const MAX_PAYLOAD_LEN: usize = MAX_FRAME_LEN - PAYLOAD_AT;

/// The address configuration of the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub address: Ipv4Address,
    pub netmask: Ipv4Address,
    pub gateway: Ipv4Address,
}

impl Config {
    /// The directed broadcast address of the local subnet.
    pub fn subnet_broadcast(&self) -> Ipv4Address {
        let address = self.address.to_network_integer();
        let netmask = self.netmask.to_network_integer();
        Ipv4Address::from_network_integer(address | !netmask)
    }

    /// Whether an address is on the local subnet.
    pub fn is_local(&self, addr: Ipv4Address) -> bool {
        let netmask = self.netmask.to_network_integer();
        addr.to_network_integer() & netmask
            == self.address.to_network_integer() & netmask
    }

    /// Whether a destination address names this host.
    pub fn accepts(&self, dst_addr: Ipv4Address) -> bool {
        dst_addr == self.address
            || dst_addr.is_broadcast()
            || dst_addr == self.subnet_broadcast()
    }

    /// Whether a destination is a broadcast under this configuration.
    pub fn is_broadcast(&self, dst_addr: Ipv4Address) -> bool {
        dst_addr.is_broadcast() || dst_addr == self.subnet_broadcast()
    }

    /// The next hop for a destination.
    pub fn route(&self, dst_addr: Ipv4Address) -> Result<Ipv4Address> {
        if self.is_local(dst_addr) || self.is_broadcast(dst_addr) {
            Ok(dst_addr)
        } else if self.gateway.is_unspecified() {
            Err(Error::Unreachable)
        } else {
            Ok(self.gateway)
        }
    }
}

/// The fate of a packet handed to [`Sender::send`].
///
/// [`Sender::send`]: struct.Sender.html#method.send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The frame went out on the wire.
    Sent,
    /// The next hop's link address is unresolved. A resolution request
    /// has been sent, or is already outstanding; the caller keeps its
    /// payload and tries again later.
    Pending,
}

/// A transmit context borrowing everything one send needs.
///
/// Constructed fresh for each send from the stack's disjoint parts. The
/// scratch buffer holds the frame under construction; upper layers write
/// their payload at [`PAYLOAD_AT`] through [`payload_mut`] first.
///
/// [`PAYLOAD_AT`]: constant.PAYLOAD_AT.html
/// [`payload_mut`]: #method.payload_mut
pub struct Sender<'a, D> {
    pub config: &'a Config,
    pub cache: &'a mut arp::Cache,
    pub device: &'a mut D,
    pub scratch: &'a mut [u8; MAX_FRAME_LEN],
}

impl<'a, D: Device> Sender<'a, D> {
    /// The region of the scratch buffer an IP payload of `len` octets
    /// occupies.
    pub fn payload_mut(&mut self, len: usize) -> &mut [u8] {
        &mut self.scratch[PAYLOAD_AT..PAYLOAD_AT + len]
    }

    /// Emit the payload currently in the scratch buffer as an IPv4 packet.
    pub fn send(&mut self, dst_addr: Ipv4Address, protocol: IpProtocol, payload_len: usize)
        -> Result<Dispatch>
    {
        if payload_len > MAX_PAYLOAD_LEN {
            return Err(Error::Illegal);
        }

        let next_hop = self.config.route(dst_addr)?;
        let dst_link_addr = if self.config.is_broadcast(dst_addr) {
            EthernetAddress::BROADCAST
        } else {
            match self.cache.lookup_or_request(next_hop) {
                arp::Answer::Found(addr) => addr,
                arp::Answer::Waiting => return Ok(Dispatch::Pending),
                arp::Answer::RequestNeeded => {
                    self.send_arp_request(next_hop)?;
                    return Ok(Dispatch::Pending);
                },
            }
        };

        let frame_len = PAYLOAD_AT + payload_len;
        let frame = ethernet_frame::new_unchecked_mut(&mut self.scratch[..frame_len]);
        EthernetRepr {
            src_addr: self.device.mac(),
            dst_addr: dst_link_addr,
            ethertype: EthernetProtocol::Ipv4,
        }.emit(frame);

        let packet = ipv4_packet::new_unchecked_mut(frame.payload_mut_slice());
        Ipv4Repr {
            src_addr: self.config.address,
            dst_addr,
            protocol,
            payload_len,
            hop_limit: HOP_LIMIT,
        }.emit(packet);

        self.device.send(&self.scratch[..frame_len])?;
        Ok(Dispatch::Sent)
    }

    /// Emit a resolution request for `target`.
    ///
    /// The request is built in a buffer of its own so that a payload
    /// parked in the scratch buffer survives for the retry.
    fn send_arp_request(&mut self, target: Ipv4Address) -> Result<()> {
        net_debug!("ip: requesting link address of {}", target);
        let mut buffer = [0; ethernet_frame::HEADER_LEN + arp_packet::LEN];

        let frame = ethernet_frame::new_unchecked_mut(&mut buffer);
        EthernetRepr {
            src_addr: self.device.mac(),
            dst_addr: EthernetAddress::BROADCAST,
            ethertype: EthernetProtocol::Arp,
        }.emit(frame);

        let packet = arp_packet::new_unchecked_mut(frame.payload_mut_slice());
        arp::request(self.device.mac(), self.config.address, target).emit(packet);

        self.device.send(&buffer)
    }
}
