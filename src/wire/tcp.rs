use core::{fmt, ops};
use byteorder::{ByteOrder, NetworkEndian};

use super::checksum;
use super::{Error, Result};
use super::{IpProtocol, Ipv4Address};

/// A TCP sequence number.
///
/// An unsigned 32-bit integer under sequence space arithmetic: all
/// comparisons and distances are computed modulo 2^32, so ordering is only
/// meaningful between numbers at most half the space apart. That holds for
/// everything a window-bounded connection compares.
#[derive(Debug, Hash, PartialEq, Eq, Clone, Copy, Default)]
pub struct SeqNumber(pub u32);

impl SeqNumber {
    /// The wrapped distance from `other` to `self`, as a signed quantity.
    pub fn distance(self, other: SeqNumber) -> i32 {
        self.0.wrapping_sub(other.0) as i32
    }

    /// Whether `self` lies strictly after `other` in sequence space.
    pub fn after(self, other: SeqNumber) -> bool {
        self.distance(other) > 0
    }
}

impl ops::Add<usize> for SeqNumber {
    type Output = SeqNumber;

    fn add(self, rhs: usize) -> SeqNumber {
        SeqNumber(self.0.wrapping_add(rhs as u32))
    }
}

impl ops::AddAssign<usize> for SeqNumber {
    fn add_assign(&mut self, rhs: usize) {
        *self = *self + rhs;
    }
}

impl fmt::Display for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The flag byte of a TCP header.
#[derive(Debug, Hash, PartialEq, Eq, Clone, Copy, Default)]
pub struct Flags(pub u8);

impl Flags {
    pub const URG: Flags = Flags(0x20);
    pub const ACK: Flags = Flags(0x10);
    pub const PSH: Flags = Flags(0x08);
    pub const RST: Flags = Flags(0x04);
    pub const SYN: Flags = Flags(0x02);
    pub const FIN: Flags = Flags(0x01);

    /// Query whether all flags in `other` are set in `self`.
    pub fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Remove the flags in `other`.
    pub fn clear(&mut self, other: Flags) {
        self.0 &= !other.0;
    }
}

impl ops::BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl ops::BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Flags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for &(flag, name) in &[
            (Flags::SYN, "SYN "), (Flags::ACK, "ACK "), (Flags::FIN, "FIN "),
            (Flags::RST, "RST "), (Flags::PSH, "PSH "), (Flags::URG, "URG "),
        ] {
            if self.contains(flag) {
                f.write_str(name)?;
            }
        }
        Ok(())
    }
}

byte_wrapper! {
    /// A byte sequence representing a TCP segment.
    #[derive(Debug, PartialEq, Eq)]
    pub struct tcp([u8]);
}

mod field {
    use crate::wire::field::*;

    pub(crate) const SRC_PORT: Field =  0..2;
    pub(crate) const DST_PORT: Field =  2..4;
    pub(crate) const SEQ_NUM:  Field =  4..8;
    pub(crate) const ACK_NUM:  Field =  8..12;
    pub(crate) const OFFSET:   usize = 12;
    pub(crate) const FLAGS:    usize = 13;
    pub(crate) const WINDOW:   Field = 14..16;
    pub(crate) const CHECKSUM: Field = 16..18;
    pub(crate) const URGENT:   Field = 18..20;
    pub(crate) const OPTIONS:  Rest  = 20..;
}

const OPT_END: u8 = 0;
const OPT_NOP: u8 = 1;
const OPT_MSS: u8 = 2;
const OPT_MSS_LEN: u8 = 4;

impl tcp {
    /// The length of a header without options.
    pub const HEADER_LEN: usize = field::OPTIONS.start;

    /// The offset of the checksum field, as a skip window for the checksum
    /// engine.
    pub const CHECKSUM_OFFSET: usize = field::CHECKSUM.start;

    /// Imbue a raw octet buffer with TCP segment structure.
    pub fn new_unchecked(data: &[u8]) -> &Self {
        Self::__from_macro_new_unchecked(data)
    }

    /// Imbue a mutable octet buffer with TCP segment structure.
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

    /// Unwrap the segment as a raw byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Ensure that no accessor method will panic if called.
    pub fn check_len(&self) -> Result<()> {
        let len = self.0.len();
        if len < field::OPTIONS.start {
            Err(Error::Truncated)
        } else if usize::from(self.header_len()) < field::OPTIONS.start {
            Err(Error::Malformed)
        } else if len < usize::from(self.header_len()) {
            Err(Error::Truncated)
        } else {
            Ok(())
        }
    }

    /// Return the source port field.
    pub fn src_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::SRC_PORT])
    }

    /// Return the destination port field.
    pub fn dst_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::DST_PORT])
    }

    /// Return the sequence number field.
    pub fn seq_number(&self) -> SeqNumber {
        SeqNumber(NetworkEndian::read_u32(&self.0[field::SEQ_NUM]))
    }

    /// Return the acknowledgment number field.
    pub fn ack_number(&self) -> SeqNumber {
        SeqNumber(NetworkEndian::read_u32(&self.0[field::ACK_NUM]))
    }

    /// Return the header length, in octets.
    pub fn header_len(&self) -> u8 {
        (self.0[field::OFFSET] >> 4) * 4
    }

    /// Return the flag byte.
    pub fn flags(&self) -> Flags {
        Flags(self.0[field::FLAGS] & 0x3f)
    }

    /// Return the window size field.
    pub fn window_len(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::WINDOW])
    }

    /// Return the checksum field.
    pub fn checksum(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::CHECKSUM])
    }

    /// Return the urgent pointer field.
    pub fn urgent_at(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::URGENT])
    }

    /// Scan the options for a maximum segment size option.
    ///
    /// Unknown options are stepped over by their length byte; the scan
    /// stops at an end-of-list option or a malformed length.
    pub fn mss_option(&self) -> Option<u16> {
        let mut options = &self.0[field::OPTIONS.start..usize::from(self.header_len())];
        while let Some(&kind) = options.first() {
            match kind {
                OPT_END => break,
                OPT_NOP => options = &options[1..],
                OPT_MSS if options.len() >= 4 && options[1] == OPT_MSS_LEN => {
                    return Some(NetworkEndian::read_u16(&options[2..4]));
                },
                _ => {
                    let len = usize::from(*options.get(1)?);
                    if len < 2 || len > options.len() {
                        break;
                    }
                    options = &options[len..];
                },
            }
        }
        None
    }

    pub fn set_src_port(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::SRC_PORT], value)
    }

    pub fn set_dst_port(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::DST_PORT], value)
    }

    pub fn set_seq_number(&mut self, value: SeqNumber) {
        NetworkEndian::write_u32(&mut self.0[field::SEQ_NUM], value.0)
    }

    pub fn set_ack_number(&mut self, value: SeqNumber) {
        NetworkEndian::write_u32(&mut self.0[field::ACK_NUM], value.0)
    }

    pub fn set_header_len(&mut self, value: u8) {
        self.0[field::OFFSET] = (value / 4) << 4;
    }

    pub fn set_flags(&mut self, value: Flags) {
        self.0[field::FLAGS] = value.0;
    }

    pub fn set_window_len(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::WINDOW], value)
    }

    pub fn set_checksum(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::CHECKSUM], value)
    }

    pub fn set_urgent_at(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::URGENT], value)
    }

    /// Write a maximum segment size option as the first option.
    ///
    /// Only ever called for SYN segments whose header length reserves the
    /// four option bytes.
    pub fn set_mss_option(&mut self, value: u16) {
        let options = &mut self.0[field::OPTIONS.start..field::OPTIONS.start + 4];
        options[0] = OPT_MSS;
        options[1] = OPT_MSS_LEN;
        NetworkEndian::write_u16(&mut options[2..4], value);
    }

    /// Return the payload as a byte slice.
    pub fn payload_slice(&self) -> &[u8] {
        &self.0[usize::from(self.header_len())..]
    }

    /// Return the payload as a mutable byte slice.
    pub fn payload_mut_slice(&mut self) -> &mut [u8] {
        let header_len = usize::from(self.header_len());
        &mut self.0[header_len..]
    }

    /// Validate the segment checksum against the pseudo header.
    pub fn verify_checksum(&self, src_addr: Ipv4Address, dst_addr: Ipv4Address) -> bool {
        let pseudo = checksum::pseudo_header(
            src_addr, dst_addr, IpProtocol::Tcp, self.0.len() as u16);
        checksum::data_skipping(pseudo, &self.0, Self::CHECKSUM_OFFSET) == !self.checksum()
    }

    /// Compute and insert the segment checksum.
    pub fn fill_checksum(&mut self, src_addr: Ipv4Address, dst_addr: Ipv4Address) {
        self.set_checksum(0);
        let pseudo = checksum::pseudo_header(
            src_addr, dst_addr, IpProtocol::Tcp, self.0.len() as u16);
        let sum = checksum::data_skipping(pseudo, &self.0, Self::CHECKSUM_OFFSET);
        self.set_checksum(!sum);
    }
}

/// A high-level representation of a TCP header.
///
/// The only option carried through the representation is the maximum
/// segment size, and only SYN segments ever emit it.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr {
    pub src_port:   u16,
    pub dst_port:   u16,
    pub seq_number: SeqNumber,
    pub ack_number: SeqNumber,
    pub flags:      Flags,
    pub window_len: u16,
    pub max_seg_size: Option<u16>,
}

impl Repr {
    /// Parse a TCP segment and return a high-level representation.
    ///
    /// The checksum is not verified here since it requires the enclosing
    /// addresses; use [`tcp::verify_checksum`] beforehand.
    ///
    /// [`tcp::verify_checksum`]: struct.tcp.html#method.verify_checksum
    pub fn parse(segment: &tcp) -> Result<Repr> {
        segment.check_len()?;
        let mss = if segment.flags().contains(Flags::SYN) {
            segment.mss_option()
        } else {
            None
        };
        Ok(Repr {
            src_port: segment.src_port(),
            dst_port: segment.dst_port(),
            seq_number: segment.seq_number(),
            ack_number: segment.ack_number(),
            flags: segment.flags(),
            window_len: segment.window_len(),
            max_seg_size: mss,
        })
    }

    /// Return the length of the header emitted from this representation.
    pub fn header_len(&self) -> usize {
        if self.max_seg_size.is_some() {
            tcp::HEADER_LEN + 4
        } else {
            tcp::HEADER_LEN
        }
    }

    /// Return the length of a buffer required to hold the segment with a
    /// payload of the given length.
    pub fn buffer_len(&self, payload_len: usize) -> usize {
        self.header_len() + payload_len
    }

    /// Emit a high-level representation into a TCP segment.
    ///
    /// The checksum is left zero; fill it with [`tcp::fill_checksum`] once
    /// the payload is in place.
    ///
    /// [`tcp::fill_checksum`]: struct.tcp.html#method.fill_checksum
    pub fn emit(&self, segment: &mut tcp) {
        segment.set_src_port(self.src_port);
        segment.set_dst_port(self.dst_port);
        segment.set_seq_number(self.seq_number);
        segment.set_ack_number(self.ack_number);
        segment.set_header_len(self.header_len() as u8);
        segment.set_flags(self.flags);
        segment.set_window_len(self.window_len);
        segment.set_checksum(0);
        segment.set_urgent_at(0);
        if let Some(mss) = self.max_seg_size {
            segment.set_mss_option(mss);
        }
    }
}
