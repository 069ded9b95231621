/*! Protocol layer state machines.

Where [`wire`](../wire/index.html) deals with representation, the modules
in here deal with *behavior*: the ARP neighbor cache, the IPv4 receive
filter and router, and the TCP socket engine. They own no device and no
clock; the [`Stack`](../stack/struct.Stack.html) wires them together and
feeds them frames and ticks.
*/

use core::fmt;

use crate::wire;

pub mod arp;
pub mod ip;
pub mod tcp;

/// The error type for layer operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The operation is not permitted in the current state.
    Illegal,
    /// No route or link address leads to the destination.
    Unreachable,
    /// A static resource pool (sockets, timers, ports) ran out.
    Exhausted,
    /// The network device rejected a frame.
    Device,
    /// An incoming packet could not be parsed.
    Parse(wire::Error),
}

/// The result type for layer operations.
pub type Result<T> = core::result::Result<T, Error>;

impl From<wire::Error> for Error {
    fn from(error: wire::Error) -> Error {
        Error::Parse(error)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Illegal => write!(f, "operation not permitted in this state"),
            Error::Unreachable => write!(f, "destination unreachable"),
            Error::Exhausted => write!(f, "resource pool exhausted"),
            Error::Device => write!(f, "device error"),
            Error::Parse(error) => write!(f, "parse error: {}", error),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
