//! A minimal TCP/IP stack for interrupt-driven embedded hosts.
//!
//! The crate implements the classic small-device networking core: an ARP
//! cache with its resolution protocol, an IPv4 validator and router, an
//! RFC793-shaped TCP connection engine with retransmission and byte-stream
//! buffering, and the cooperative timer wheel that drives every
//! timeout-based behaviour. The Ethernet controller itself stays outside:
//! the host polls its link driver and feeds complete frames into the
//! stack, and the stack hands outgoing frames to a [`Device`]
//! implementation.
//!
//! Nothing in here ever dynamically allocates memory. The ARP cache, the
//! socket pool, the timer pool and the per-connection byte FIFOs are
//! fixed-capacity arenas addressed through handles, sized by compile-time
//! constants. This mirrors the upfront resource partitioning a no-OS host
//! needs: every resource a connection can compete for is split ahead of
//! time.
//!
//! Two stimuli drive all behaviour, both plain `&mut self` calls that run
//! to completion synchronously:
//!
//! * [`Stack::handle_frame`], once per received link-layer frame, and
//! * [`Stack::tick`], at a fixed 10 ms quantum.
//!
//! On the reference hardware the tick is raised from a timer interrupt
//! while frame dispatch runs in the main loop; by expressing both as
//! mutable methods on one owner the two can never observably interleave.
//!
//! TCP events (connection established, data received, timeouts, ...) are
//! delivered synchronously through the [`tcp::Events`] capability trait
//! within the `handle_frame` or `tick` call that caused them.
//!
//! [`Device`]: nic/trait.Device.html
//! [`Stack::handle_frame`]: stack/struct.Stack.html#method.handle_frame
//! [`Stack::tick`]: stack/struct.Stack.html#method.tick
//! [`tcp::Events`]: layer/tcp/trait.Events.html
#![warn(unreachable_pub)]

// tests should be able to use `std`
#![cfg_attr(all(
    not(feature = "std"),
    not(test)),
no_std)]

#[macro_use] mod macros;
pub mod layer;
pub mod nic;
pub mod stack;
pub mod storage;
pub mod timer;
pub mod wire;

pub use layer::tcp::{Accept, Event, Events, SocketHandle};
pub use stack::{Recv, Stack, Stats};
