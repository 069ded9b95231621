/*! The interface to the network hardware.

The stack drives exactly one device and only ever asks two things of it:
its link address, and to put a fully formed Ethernet frame on the wire.
Reception does not go through the trait at all, the host's receive
interrupt hands frames straight to [`Stack::handle_frame`].

[`Stack::handle_frame`]: ../stack/struct.Stack.html#method.handle_frame
*/

use crate::layer::Result;
use crate::wire::EthernetAddress;

/// The largest frame the stack will emit or accept, in octets.
///
/// An Ethernet header plus a full 1500 octet payload.
pub const MAX_FRAME_LEN: usize = 1514;

/// A network device that can transmit raw Ethernet frames.
pub trait Device {
    /// The link address frames are sent from.
    fn mac(&self) -> EthernetAddress;

    /// Put one complete frame on the wire.
    ///
    /// The frame includes the Ethernet header and is at most
    /// [`MAX_FRAME_LEN`] octets. Blocking until the hardware accepts the
    /// frame is the device's business.
    ///
    /// [`MAX_FRAME_LEN`]: constant.MAX_FRAME_LEN.html
    fn send(&mut self, frame: &[u8]) -> Result<()>;
}

impl<D: Device + ?Sized> Device for &'_ mut D {
    fn mac(&self) -> EthernetAddress {
        (**self).mac()
    }

    fn send(&mut self, frame: &[u8]) -> Result<()> {
        (**self).send(frame)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::layer::Error;

    /// A device that records every frame instead of sending it.
    pub(crate) struct TestDevice {
        pub(crate) mac: EthernetAddress,
        pub(crate) sent: Vec<Vec<u8>>,
        pub(crate) fail_next: bool,
    }

    impl TestDevice {
        pub(crate) fn new() -> TestDevice {
            TestDevice {
                mac: EthernetAddress([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]),
                sent: Vec::new(),
                fail_next: false,
            }
        }

        /// Take the recorded frames, leaving the log empty.
        pub(crate) fn take_sent(&mut self) -> Vec<Vec<u8>> {
            core::mem::replace(&mut self.sent, Vec::new())
        }
    }

    impl Device for TestDevice {
        fn mac(&self) -> EthernetAddress {
            self.mac
        }

        fn send(&mut self, frame: &[u8]) -> Result<()> {
            if self.fail_next {
                self.fail_next = false;
                return Err(Error::Device);
            }
            assert!(frame.len() <= MAX_FRAME_LEN);
            self.sent.push(frame.to_vec());
            Ok(())
        }
    }
}
