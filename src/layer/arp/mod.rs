/*! Address resolution and the neighbor cache.

The cache is tiny. A host on this class of hardware talks to one or two
peers (usually just the gateway), so resolution pressure is low and an
eviction is cheap to recover from. A missed address takes a slot of its
own in waiting state, so independent resolutions do not block each
other; whoever is waiting retries on its own timer.
*/

use crate::wire::{ArpOperation, ArpRepr, EthernetAddress, Ipv4Address};

/// The number of neighbor slots, resolved or in resolution.
pub const CACHE_SIZE: usize = 2;

/// The outcome of asking the cache for a link address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    /// The neighbor is known.
    Found(EthernetAddress),
    /// A request for this address is already on the wire.
    Waiting,
    /// No mapping and no outstanding request. The caller must send a
    /// request; the cache has recorded the address as waiting.
    RequestNeeded,
}

#[derive(Clone, Copy)]
enum Slot {
    Unused,
    /// A request for this address is on the wire.
    Waiting { protocol_addr: Ipv4Address },
    Resolved { protocol_addr: Ipv4Address, hardware_addr: EthernetAddress },
}

/// A neighbor cache with rotating eviction.
pub struct Cache {
    slots: [Slot; CACHE_SIZE],
    evict_at: usize,
}

impl Cache {
    pub const fn new() -> Cache {
        Cache {
            slots: [Slot::Unused; CACHE_SIZE],
            evict_at: 0,
        }
    }

    fn position(&self, addr: Ipv4Address) -> Option<usize> {
        self.slots.iter().position(|slot| match slot {
            Slot::Waiting { protocol_addr }
            | Slot::Resolved { protocol_addr, .. } => *protocol_addr == addr,
            Slot::Unused => false,
        })
    }

    /// The slot a new address may take: an unused one, or the one under
    /// the eviction cursor.
    fn free_slot(&mut self) -> usize {
        let unused = self.slots.iter().position(|slot| match slot {
            Slot::Unused => true,
            _ => false,
        });
        match unused {
            Some(index) => index,
            None => {
                let index = self.evict_at;
                self.evict_at = (self.evict_at + 1) % CACHE_SIZE;
                index
            },
        }
    }

    /// Look up a resolved neighbor without side effects.
    pub fn lookup(&self, addr: Ipv4Address) -> Option<EthernetAddress> {
        self.slots.iter().find_map(|slot| match slot {
            Slot::Resolved { protocol_addr, hardware_addr }
                if *protocol_addr == addr => Some(*hardware_addr),
            _ => None,
        })
    }

    /// Look up a neighbor, taking a waiting slot for it if unknown.
    ///
    /// Exactly one caller per address gets `RequestNeeded`; everyone else
    /// sees `Waiting` until [`insert`] resolves it or [`abandon`] gives
    /// up on it. Distinct addresses resolve independently.
    ///
    /// [`insert`]: #method.insert
    /// [`abandon`]: #method.abandon
    pub fn lookup_or_request(&mut self, addr: Ipv4Address) -> Answer {
        match self.position(addr) {
            Some(index) => match self.slots[index] {
                Slot::Resolved { hardware_addr, .. } => Answer::Found(hardware_addr),
                _ => Answer::Waiting,
            },
            None => {
                let index = self.free_slot();
                self.slots[index] = Slot::Waiting { protocol_addr: addr };
                Answer::RequestNeeded
            },
        }
    }

    /// Record a resolved neighbor.
    ///
    /// A waiting or resolved slot for the address is updated in place,
    /// otherwise the slot under the eviction cursor makes room.
    pub fn insert(&mut self, protocol_addr: Ipv4Address, hardware_addr: EthernetAddress) {
        let index = match self.position(protocol_addr) {
            Some(index) => index,
            None => self.free_slot(),
        };
        self.slots[index] = Slot::Resolved { protocol_addr, hardware_addr };
    }

    /// Give up on a resolution in progress, freeing its slot.
    ///
    /// Called when the waiter runs out of retries, so a later lookup can
    /// start a fresh request. A resolved slot is left alone.
    pub fn abandon(&mut self, addr: Ipv4Address) {
        if let Some(index) = self.position(addr) {
            if let Slot::Waiting { .. } = self.slots[index] {
                self.slots[index] = Slot::Unused;
            }
        }
    }
}

/// Digest an incoming ARP packet.
///
/// The sender mapping is learned from any observed packet, request or
/// reply, with a unicast sender. Returns the reply to emit, if the
/// packet was a request for our address.
pub fn process(
    cache: &mut Cache,
    our_hardware_addr: EthernetAddress,
    our_protocol_addr: Ipv4Address,
    repr: &ArpRepr,
) -> Option<ArpRepr> {
    let ArpRepr::EthernetIpv4 {
        operation,
        source_hardware_addr,
        source_protocol_addr,
        target_protocol_addr,
        ..
    } = *repr;

    if !source_hardware_addr.is_unicast() || !source_protocol_addr.is_unicast() {
        return None;
    }

    cache.insert(source_protocol_addr, source_hardware_addr);

    if target_protocol_addr != our_protocol_addr {
        return None;
    }

    match operation {
        ArpOperation::Request => {
            net_trace!("arp: answering request from {}", source_protocol_addr);
            Some(ArpRepr::EthernetIpv4 {
                operation: ArpOperation::Reply,
                source_hardware_addr: our_hardware_addr,
                source_protocol_addr: our_protocol_addr,
                target_hardware_addr: source_hardware_addr,
                target_protocol_addr: source_protocol_addr,
            })
        },
        _ => None,
    }
}

/// Build the request packet for a pending resolution.
pub fn request(
    our_hardware_addr: EthernetAddress,
    our_protocol_addr: Ipv4Address,
    target_protocol_addr: Ipv4Address,
) -> ArpRepr {
    ArpRepr::EthernetIpv4 {
        operation: ArpOperation::Request,
        source_hardware_addr: our_hardware_addr,
        source_protocol_addr: our_protocol_addr,
        target_hardware_addr: EthernetAddress::default(),
        target_protocol_addr,
    }
}
