use core::fmt;
use byteorder::{ByteOrder, NetworkEndian};

use super::checksum;
use super::{Error, Result};

enum_with_unknown! {
    /// IP datagram encapsulated protocol.
    pub enum Protocol(u8) {
        Icmp = 0x01,
        Tcp  = 0x06,
        Udp  = 0x11,
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Protocol::Icmp => write!(f, "ICMP"),
            Protocol::Tcp  => write!(f, "TCP"),
            Protocol::Udp  => write!(f, "UDP"),
            Protocol::Unknown(id) => write!(f, "0x{:02x}", id),
        }
    }
}

/// A four-octet IPv4 address.
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default)]
pub struct Address(pub [u8; 4]);

impl Address {
    /// An unspecified address.
    pub const UNSPECIFIED: Address = Address([0x00; 4]);

    /// The limited broadcast address.
    pub const BROADCAST:   Address = Address([0xff; 4]);

    /// Construct an IPv4 address from parts.
    pub const fn new(a0: u8, a1: u8, a2: u8, a3: u8) -> Address {
        Address([a0, a1, a2, a3])
    }

    /// Construct an IPv4 address from a sequence of octets, in big-endian.
    ///
    /// # Panics
    /// The function panics if `data` is not four octets long.
    pub fn from_bytes(data: &[u8]) -> Address {
        let mut bytes = [0; 4];
        bytes.copy_from_slice(data);
        Address(bytes)
    }

    /// Return an IPv4 address as a sequence of octets, in big-endian.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Encode the address into a `u32` in network endian byte order.
    pub fn to_network_integer(self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    /// Decode a network endian `u32` into an address.
    pub fn from_network_integer(num: u32) -> Self {
        Address(num.to_be_bytes())
    }

    /// Query whether the address is an unicast address.
    pub fn is_unicast(&self) -> bool {
        !(self.is_broadcast() || self.is_unspecified())
    }

    /// Query whether the address is the limited broadcast address.
    pub fn is_broadcast(&self) -> bool {
        self.0 == [0xff; 4]
    }

    /// Query whether the address falls into the "unspecified" range.
    pub fn is_unspecified(&self) -> bool {
        self.0[0] == 0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let bytes = self.0;
        write!(f, "{}.{}.{}.{}", bytes[0], bytes[1], bytes[2], bytes[3])
    }
}

byte_wrapper! {
    /// A byte sequence representing an IPv4 packet.
    #[derive(Debug, PartialEq, Eq)]
    pub struct ipv4([u8]);
}

mod field {
    use crate::wire::field::*;

    pub(crate) const VER_IHL:  usize = 0;
    pub(crate) const TOS:      usize = 1;
    pub(crate) const LENGTH:   Field = 2..4;
    pub(crate) const IDENT:    Field = 4..6;
    pub(crate) const FLG_OFF:  Field = 6..8;
    pub(crate) const TTL:      usize = 8;
    pub(crate) const PROTOCOL: usize = 9;
    pub(crate) const CHECKSUM: Field = 10..12;
    pub(crate) const SRC_ADDR: Field = 12..16;
    pub(crate) const DST_ADDR: Field = 16..20;
    pub(crate) const PAYLOAD:  Rest  = 20..;
}

impl ipv4 {
    /// The length of a header without options.
    pub const HEADER_LEN: usize = field::PAYLOAD.start;

    /// The offset of the header checksum field, as a skip window for the
    /// checksum engine.
    pub const CHECKSUM_OFFSET: usize = field::CHECKSUM.start;

    /// Imbue a raw octet buffer with IPv4 packet structure.
    pub fn new_unchecked(data: &[u8]) -> &Self {
        Self::__from_macro_new_unchecked(data)
    }

    /// Imbue a mutable octet buffer with IPv4 packet structure.
    pub fn new_unchecked_mut(data: &mut [u8]) -> &mut Self {
        Self::__from_macro_new_unchecked_mut(data)
    }

    pub fn new_checked(data: &[u8]) -> Result<&Self> {
        Self::new_unchecked(data).check_len()?;
        Ok(Self::new_unchecked(data))
    }

    pub fn new_checked_mut(data: &mut [u8]) -> Result<&mut Self> {
        Self::new_checked(&data[..])?;
        Ok(Self::new_unchecked_mut(data))
    }

    /// Unwrap the packet as a raw byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Ensure that no accessor method will panic if called.
    ///
    /// Returns `Err(Error::Truncated)` if the buffer is shorter than a
    /// minimal header or than the declared header length.
    pub fn check_len(&self) -> Result<()> {
        let len = self.0.len();
        if len < field::PAYLOAD.start {
            Err(Error::Truncated)
        } else if usize::from(self.header_len()) < field::PAYLOAD.start {
            Err(Error::Malformed)
        } else if len < usize::from(self.header_len()) {
            Err(Error::Truncated)
        } else {
            Ok(())
        }
    }

    /// Return the version field.
    pub fn version(&self) -> u8 {
        self.0[field::VER_IHL] >> 4
    }

    /// Return the header length, in octets.
    pub fn header_len(&self) -> u8 {
        (self.0[field::VER_IHL] & 0x0f) * 4
    }

    /// Return the type-of-service field.
    pub fn tos(&self) -> u8 {
        self.0[field::TOS]
    }

    /// Return the total length field.
    pub fn total_len(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::LENGTH])
    }

    /// Return the identification field.
    pub fn ident(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::IDENT])
    }

    /// Return the "more fragments" flag.
    pub fn more_frags(&self) -> bool {
        NetworkEndian::read_u16(&self.0[field::FLG_OFF]) & 0x2000 != 0
    }

    /// Return the fragment offset, in octets.
    pub fn frag_offset(&self) -> u16 {
        (NetworkEndian::read_u16(&self.0[field::FLG_OFF]) & 0x1fff) << 3
    }

    /// Return the time-to-live field.
    pub fn ttl(&self) -> u8 {
        self.0[field::TTL]
    }

    /// Return the protocol field.
    pub fn protocol(&self) -> Protocol {
        Protocol::from(self.0[field::PROTOCOL])
    }

    /// Return the header checksum field.
    pub fn header_checksum(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::CHECKSUM])
    }

    /// Return the source address field.
    pub fn src_addr(&self) -> Address {
        Address::from_bytes(&self.0[field::SRC_ADDR])
    }

    /// Return the destination address field.
    pub fn dst_addr(&self) -> Address {
        Address::from_bytes(&self.0[field::DST_ADDR])
    }

    /// Validate the header checksum.
    ///
    /// The sum is computed with the checksum field itself skipped and
    /// compared against the complement of the stored field.
    pub fn verify_checksum(&self) -> bool {
        let header = &self.0[..usize::from(self.header_len())];
        checksum::data_skipping(0, header, Self::CHECKSUM_OFFSET) == !self.header_checksum()
    }

    pub fn set_version_and_header_len(&mut self) {
        // No options are ever emitted.
        self.0[field::VER_IHL] = 0x45;
    }

    pub fn set_tos(&mut self, value: u8) {
        self.0[field::TOS] = value;
    }

    pub fn set_total_len(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::LENGTH], value)
    }

    pub fn set_ident(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::IDENT], value)
    }

    pub fn clear_frag_fields(&mut self) {
        NetworkEndian::write_u16(&mut self.0[field::FLG_OFF], 0)
    }

    pub fn set_ttl(&mut self, value: u8) {
        self.0[field::TTL] = value;
    }

    pub fn set_protocol(&mut self, value: Protocol) {
        self.0[field::PROTOCOL] = value.into();
    }

    pub fn set_header_checksum(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::CHECKSUM], value)
    }

    pub fn set_src_addr(&mut self, value: Address) {
        self.0[field::SRC_ADDR].copy_from_slice(value.as_bytes())
    }

    pub fn set_dst_addr(&mut self, value: Address) {
        self.0[field::DST_ADDR].copy_from_slice(value.as_bytes())
    }

    /// Compute and insert the header checksum.
    pub fn fill_checksum(&mut self) {
        self.set_header_checksum(0);
        let sum = {
            let header = &self.0[..usize::from(self.header_len())];
            checksum::data_skipping(0, header, Self::CHECKSUM_OFFSET)
        };
        self.set_header_checksum(!sum);
    }

    /// Return the payload as a byte slice, bounded by the total length field.
    pub fn payload_slice(&self) -> &[u8] {
        let range = usize::from(self.header_len())..usize::from(self.total_len());
        &self.0[range]
    }

    /// Return the payload as a mutable byte slice.
    pub fn payload_mut_slice(&mut self) -> &mut [u8] {
        let range = usize::from(self.header_len())..usize::from(self.total_len());
        &mut self.0[range]
    }
}

/// A high-level representation of an IPv4 header without options.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr {
    pub src_addr:    Address,
    pub dst_addr:    Address,
    pub protocol:    Protocol,
    pub payload_len: usize,
    pub hop_limit:   u8,
}

impl Repr {
    /// Parse an IPv4 packet and return a high-level representation.
    ///
    /// This enforces every validation rule of the inbound path: minimal
    /// length, version 4, declared length within the actual buffer, no
    /// fragmentation, and a correct header checksum. Destination address
    /// acceptance is a routing decision and stays with the caller.
    pub fn parse(packet: &ipv4) -> Result<Repr> {
        packet.check_len()?;
        if packet.version() != 4 {
            return Err(Error::Unrecognized);
        }
        let header_len = usize::from(packet.header_len());
        let total_len = usize::from(packet.total_len());
        if total_len < header_len || total_len > packet.as_bytes().len() {
            return Err(Error::Malformed);
        }
        // Fragmentation is unsupported, fragments are dropped rather than
        // reassembled.
        if packet.more_frags() || packet.frag_offset() != 0 {
            return Err(Error::Unrecognized);
        }
        if !packet.verify_checksum() {
            return Err(Error::Checksum);
        }
        Ok(Repr {
            src_addr: packet.src_addr(),
            dst_addr: packet.dst_addr(),
            protocol: packet.protocol(),
            payload_len: total_len - header_len,
            hop_limit: packet.ttl(),
        })
    }

    /// Return the length of a buffer required to hold the header and payload.
    pub fn buffer_len(&self) -> usize {
        ipv4::HEADER_LEN + self.payload_len
    }

    /// Emit a high-level representation into an IPv4 packet.
    ///
    /// Fills the fixed fields and computes the header checksum. The
    /// payload is expected to already be in place behind the header.
    pub fn emit(&self, packet: &mut ipv4) {
        packet.set_version_and_header_len();
        packet.set_tos(0);
        packet.set_total_len((ipv4::HEADER_LEN + self.payload_len) as u16);
        packet.set_ident(0);
        packet.clear_frag_fields();
        packet.set_ttl(self.hop_limit);
        packet.set_protocol(self.protocol);
        packet.set_src_addr(self.src_addr);
        packet.set_dst_addr(self.dst_addr);
        packet.fill_checksum();
    }
}
