/*! Low-level packet access and construction.

The `wire` module deals with the packet *representation*. It provides two
levels of functionality.

 * First, it provides functions to extract fields from sequences of octets,
   and to insert fields into sequences of octets. This happens in the
   lowercase structures, e.g. [`ethernet_frame`] or [`tcp_segment`].
 * Second, it provides a compact, high-level representation of header data
   that can be created by parsing and emitted into a sequence of octets.
   This happens through the `Repr` family of structs and enums, e.g.
   [`ArpRepr`] or [`Ipv4Repr`].

[`ethernet_frame`]: struct.ethernet_frame.html
[`tcp_segment`]: struct.tcp_segment.html
[`ArpRepr`]: enum.ArpRepr.html
[`Ipv4Repr`]: struct.Ipv4Repr.html

The byte wrapper family guarantees that, if `check_len()` returned
`Ok(())`, no field accessor or setter method will panic. When parsing
untrusted input it is therefore *necessary* to go through `new_checked`.
In the `Repr` family, `parse()` never panics on a length-checked wrapper
and `emit()` never panics as long as the underlying buffer is at least
`buffer_len()` octets long.
*/
#![allow(missing_docs)]

mod field {
    pub(crate) type Field = ::core::ops::Range<usize>;
    pub(crate) type Rest  = ::core::ops::RangeFrom<usize>;
}

mod arp;
pub(crate) mod checksum;
mod error;
mod ethernet;
mod ipv4;
mod tcp;

pub use self::ethernet::{
    ethernet as ethernet_frame,
    EtherType as EthernetProtocol,
    Address as EthernetAddress,
    Repr as EthernetRepr};

pub use self::error::{
    Error,
    Result};

pub use self::arp::{
    arp as arp_packet,
    Hardware as ArpHardware,
    Operation as ArpOperation,
    Repr as ArpRepr};

pub use self::ipv4::{
    ipv4 as ipv4_packet,
    Address as Ipv4Address,
    Protocol as IpProtocol,
    Repr as Ipv4Repr};

pub use self::tcp::{
    tcp as tcp_segment,
    Flags as TcpFlags,
    SeqNumber as TcpSeqNumber,
    Repr as TcpRepr};
