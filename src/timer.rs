/*! A pool of software countdown timers.

The host drives the pool from a single periodic interrupt: each call to
[`Wheel::tick`] advances time by one quantum. Timers that reach zero are
parked on an internal expired queue instead of invoking anything, and the
main loop drains that queue with [`Wheel::next_expired`]. Re-arming a
timer while draining therefore never makes it fire again within the same
tick.

[`Wheel::tick`]: struct.Wheel.html#method.tick
[`Wheel::next_expired`]: struct.Wheel.html#method.next_expired
*/

/// Milliseconds per tick.
pub const QUANTUM_MS: u32 = 10;

/// The number of timers in a pool.
pub const TIMER_COUNT: usize = 8;

/// An index into the timer pool, handed out by [`Wheel::alloc`].
///
/// [`Wheel::alloc`]: struct.Wheel.html#method.alloc
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handle(usize);

#[derive(Clone, Copy)]
enum Slot<T> {
    Free,
    /// Allocated but not counting down.
    Stopped { owner: T, interval: u32 },
    /// Counting down, `remaining` ticks to go.
    Running { owner: T, interval: u32, remaining: u32 },
}

/// A fixed pool of countdown timers tagged with an owner value.
///
/// The owner tag is any `Copy` value the caller uses to route an expiry
/// back to whatever armed the timer, typically a socket handle.
pub struct Wheel<T> {
    slots: [Slot<T>; TIMER_COUNT],
    expired: [Option<T>; TIMER_COUNT],
}

fn ticks_for(millis: u32) -> u32 {
    ((millis + QUANTUM_MS - 1) / QUANTUM_MS).max(1)
}

impl<T: Copy> Wheel<T> {
    pub fn new() -> Wheel<T> {
        Wheel {
            slots: [Slot::Free; TIMER_COUNT],
            expired: [None; TIMER_COUNT],
        }
    }

    /// Claim a free timer for `owner`. The timer starts out stopped.
    ///
    /// Returns `None` when every slot is taken.
    pub fn alloc(&mut self, owner: T) -> Option<Handle> {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Slot::Free = slot {
                *slot = Slot::Stopped { owner, interval: 0 };
                return Some(Handle(index));
            }
        }
        None
    }

    /// Return a timer to the pool. Pending expiries of the slot are kept,
    /// the owner tag was captured when the timer ran out.
    pub fn free(&mut self, handle: Handle) {
        self.slots[handle.0] = Slot::Free;
    }

    /// Arm a timer to run out after `millis` milliseconds.
    ///
    /// The duration is rounded up to a whole number of ticks, with a
    /// minimum of one. Arming an already running timer restarts it.
    pub fn set(&mut self, handle: Handle, millis: u32) {
        let interval = ticks_for(millis);
        match self.slots[handle.0] {
            Slot::Free => (),
            Slot::Stopped { owner, .. } | Slot::Running { owner, .. } => {
                self.slots[handle.0] = Slot::Running { owner, interval, remaining: interval };
            },
        }
    }

    /// Halt a timer without releasing it.
    pub fn stop(&mut self, handle: Handle) {
        match self.slots[handle.0] {
            Slot::Free => (),
            Slot::Stopped { .. } => (),
            Slot::Running { owner, interval, .. } => {
                self.slots[handle.0] = Slot::Stopped { owner, interval };
            },
        }
    }

    /// Restart a timer with the interval it was last armed with.
    pub fn reset(&mut self, handle: Handle) {
        match self.slots[handle.0] {
            Slot::Free => (),
            Slot::Stopped { owner, interval } | Slot::Running { owner, interval, .. } => {
                if interval > 0 {
                    self.slots[handle.0] = Slot::Running { owner, interval, remaining: interval };
                }
            },
        }
    }

    /// Whether the timer is currently counting down.
    pub fn is_running(&self, handle: Handle) -> bool {
        match self.slots[handle.0] {
            Slot::Running { .. } => true,
            _ => false,
        }
    }

    /// Advance every running timer by one quantum.
    ///
    /// Timers that reach zero stop and their owner tag is queued for
    /// [`next_expired`].
    ///
    /// [`next_expired`]: #method.next_expired
    pub fn tick(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Slot::Running { owner, interval, remaining } = *slot {
                if remaining <= 1 {
                    *slot = Slot::Stopped { owner, interval };
                    self.expired[index] = Some(owner);
                } else {
                    *slot = Slot::Running { owner, interval, remaining: remaining - 1 };
                }
            }
        }
    }

    /// Take one queued expiry, if any.
    pub fn next_expired(&mut self) -> Option<T> {
        for entry in self.expired.iter_mut() {
            if entry.is_some() {
                return entry.take();
            }
        }
        None
    }
}
