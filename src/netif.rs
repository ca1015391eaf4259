//! The contract between the MAC and the network stack it feeds.

/// The outcome of offering a received frame to the network stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Input {
    /// The stack accepted the frame.
    Delivered,
    /// A buffer was allocated and filled, but the frame turned out to be corrupt (its CRC didn't
    /// check out), so the buffer was released again.
    Discarded,
    /// No buffer could be allocated for the frame.
    OutOfMemory,
    /// The stack refused the filled buffer. The buffer has been released.
    Rejected,
}

/// The network stack (or the queue in front of it) that received frames are delivered to, and
/// whose link state the MAC keeps up to date.
pub trait NetStack {
    /// Allocates a buffer of `len` bytes and passes it to `fill`, which copies a received frame
    /// into it and returns whether the frame is valid. Valid frames are handed to the stack; the
    /// buffers of invalid ones are released without the stack ever seeing them.
    ///
    /// `fill` must not be called if no buffer can be allocated, in which case
    /// [Input::OutOfMemory] is returned.
    fn input<F>(&mut self, len: usize, fill: F) -> Input
    where
        F: FnOnce(&mut [u8]) -> bool;

    fn is_link_up(&self) -> bool;

    fn set_link_up(&mut self);

    fn set_link_down(&mut self);

    /// Gives the stack a chance to run its timers. Called once per poll.
    fn service_timeouts(&mut self) {}
}
