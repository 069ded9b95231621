//! The RFC 1071 internet checksum.
//!
//! All sums here are the plain one's complement sums; producing a checksum
//! field means complementing the result, validating a packet means checking
//! the uncomplemented sum of the data with the field skipped against the
//! complement of the stored field.
use byteorder::{ByteOrder, NetworkEndian};

use super::{Ipv4Address, IpProtocol};

fn propagate_carries(word: u32) -> u16 {
    let sum = (word >> 16) + (word & 0xffff);
    ((sum >> 16) as u16) + (sum as u16)
}

/// Compute an RFC 1071 compliant checksum (without the final complement).
///
/// The `seed` folds a previous partial sum into the computation, so sums
/// over discontiguous ranges (such as a pseudo header followed by the
/// segment) compose by chaining calls.
pub(crate) fn data(seed: u16, mut data: &[u8]) -> u16 {
    let mut accum = u32::from(seed);

    while data.len() >= 2 {
        accum += u32::from(NetworkEndian::read_u16(data));
        data = &data[2..];
    }

    // Pad the last remaining odd byte with a zero low byte.
    if let Some(&value) = data.first() {
        accum += u32::from(value) << 8;
    }

    propagate_carries(accum)
}

/// Sum a byte range while treating the two bytes at `skip` as zero.
///
/// Used when checksumming a buffer that contains its own checksum field,
/// such as the IPv4 header (field offset 10) or a TCP segment (offset 16).
///
/// # Panics
/// `skip` must be even and `skip + 2` must lie within `bytes`.
pub(crate) fn data_skipping(seed: u16, bytes: &[u8], skip: usize) -> u16 {
    debug_assert!(skip % 2 == 0);
    let before = data(seed, &bytes[..skip]);
    data(before, &bytes[skip + 2..])
}

/// Combine several RFC 1071 compliant checksums.
pub(crate) fn combine(checksums: &[u16]) -> u16 {
    let mut accum: u32 = 0;
    for &word in checksums {
        accum += u32::from(word);
    }
    propagate_carries(accum)
}

/// Compute the TCP/UDP pseudo header checksum.
///
/// The pseudo header (protocol, segment length, both addresses) is only
/// ever part of the checksum computation, never transmitted.
pub(crate) fn pseudo_header(
    src_addr: Ipv4Address,
    dst_addr: Ipv4Address,
    protocol: IpProtocol,
    length: u16,
) -> u16 {
    let mut proto_len = [0u8; 4];
    proto_len[1] = protocol.into();
    NetworkEndian::write_u16(&mut proto_len[2..4], length);

    combine(&[
        data(0, src_addr.as_bytes()),
        data(0, dst_addr.as_bytes()),
        data(0, &proto_len[..]),
    ])
}
