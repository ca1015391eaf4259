//! The receive half of the MAC.
//!
//! The RX DMA chain writes every received byte into the RX arena on its own. All that remains for
//! software is to find the frame boundaries and to validate and deliver the frames:
//!
//! - The end-of-frame interrupt calls [FrameEndHandler::on_frame_end], which turns the distance
//!   the DMA write address moved since the previous frame end into a descriptor, and pushes it
//!   onto the [RxQueue].
//! - The poll loop calls [RxDrain::drain], which copies each described frame out of the arena into
//!   a buffer provided by the network stack, checking its FCS on the way.

use super::{Error, Result, FCS_SIZE, MAX_FRAME_SIZE, MIN_FRAME_SIZE};
use crate::crc::{CrcEngine, CHECK_RESIDUE};
use crate::debug_util;
use crate::hal::{ChainPlan, Clock, DmaCursor, Endpoint, Reload};
use crate::netif::{Input, NetStack};
use crate::ring::Arena;
use core::cell::Cell;
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use critical_section::Mutex;
use log::{debug, log_enabled, trace, warn};

/// The default number of descriptors in an [RxQueue]: enough to describe an arena full of
/// minimum-sized frames.
pub const RX_QUEUE_LEN: usize = 64;

/// How often a CRC failure may be logged, at most.
const CRC_WARNING_INTERVAL_US: u64 = 1_000_000;

/// Returns the plan for the RX chain: fill `arena` from the receive FIFO forever. The nominal
/// count is arbitrary, since the chain re-arms itself with the same count whenever it runs out.
pub fn rx_plan(arena: &Arena) -> ChainPlan {
    let count = arena.len() as u32 * 16;
    ChainPlan {
        source: Endpoint::Fifo,
        destination: Endpoint::Ring {
            base: arena.base_address(),
            size_log2: arena.size_log2(),
        },
        count,
        reload: Reload::Rearm { count },
    }
}

/// The location of a captured frame (including its FCS) in the RX arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RxDescriptor {
    pub offset: usize,
    pub length: usize,
}

impl RxDescriptor {
    // Packed into a single word, so that a descriptor is published with a single store.
    fn pack(self) -> u32 {
        ((self.offset as u32) << 16) | (self.length as u32 & 0xffff)
    }

    fn unpack(packed: u32) -> RxDescriptor {
        RxDescriptor {
            offset: (packed >> 16) as usize,
            length: (packed & 0xffff) as usize,
        }
    }
}

/// A single-producer, single-consumer queue of [RxDescriptor]s, filled from the end-of-frame
/// interrupt and drained by the poll loop. `N` must be a power of two.
///
/// The cursors are free-running counters that are only ever loaded and stored (never
/// read-modify-written), and each of them is only stored from one side.
pub struct RxQueue<const N: usize = RX_QUEUE_LEN> {
    slots: [AtomicU32; N],
    /// The number of descriptors ever pushed.
    head: AtomicUsize,
    /// The number of frames dropped at capture time because of their length.
    length_drops: AtomicU32,
    split: Mutex<Cell<bool>>,
}

impl<const N: usize> RxQueue<N> {
    const VALID_LEN: () = assert!(N.is_power_of_two());

    pub const fn new() -> RxQueue<N> {
        #[allow(clippy::let_unit_value)]
        let () = Self::VALID_LEN;
        RxQueue {
            slots: [const { AtomicU32::new(0) }; N],
            head: AtomicUsize::new(0),
            length_drops: AtomicU32::new(0),
            split: Mutex::new(Cell::new(false)),
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Splits the queue into the handle for the end-of-frame interrupt, which reads the RX chain's
    /// write address through `cursor`, and the handle for the poll loop. May only be called once,
    /// and only after the RX chain has been armed.
    pub fn split<D: DmaCursor>(
        &self,
        cursor: D,
        arena: &Arena,
    ) -> Result<(FrameEndHandler<'_, D, N>, RxDrain<'_, N>)> {
        critical_section::with(|cs| {
            let split = self.split.borrow(cs);
            if split.get() {
                return Err(Error::AlreadySplit);
            }
            split.set(true);
            Ok(())
        })?;

        let mask = arena.mask();
        let frame_start = cursor.address() & mask;
        Ok((
            FrameEndHandler {
                queue: self,
                cursor,
                mask,
                frame_start,
            },
            RxDrain {
                queue: self,
                tail: self.head.load(Ordering::Acquire),
                stats: RxStats::default(),
                crc_warnings: RateLimiter::new(CRC_WARNING_INTERVAL_US),
            },
        ))
    }
}

impl<const N: usize> Default for RxQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// The producer side of an [RxQueue], driven by the end-of-frame interrupt.
pub struct FrameEndHandler<'a, D, const N: usize = RX_QUEUE_LEN> {
    queue: &'a RxQueue<N>,
    cursor: D,
    mask: usize,
    /// The arena offset at which the frame currently being received started.
    frame_start: usize,
}

impl<'a, D: DmaCursor, const N: usize> FrameEndHandler<'a, D, N> {
    /// Must be called from the end-of-frame interrupt handler, once per frame. Never blocks,
    /// copies or logs.
    pub fn on_frame_end(&mut self) {
        let end = self.cursor.address() & self.mask;
        let start = core::mem::replace(&mut self.frame_start, end);
        let length = end.wrapping_sub(start) & self.mask;

        if !(MIN_FRAME_SIZE..=MAX_FRAME_SIZE).contains(&length) {
            let drops = self.queue.length_drops.load(Ordering::Relaxed);
            self.queue
                .length_drops
                .store(drops.wrapping_add(1), Ordering::Relaxed);
            return;
        }

        let head = self.queue.head.load(Ordering::Relaxed);
        self.queue.slots[head & (N - 1)].store(
            RxDescriptor {
                offset: start,
                length,
            }
            .pack(),
            Ordering::Relaxed,
        );
        self.queue.head.store(head.wrapping_add(1), Ordering::Release);
    }
}

/// Various receive-related stats.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxStats {
    /// Frames that passed the CRC check and were accepted by the network stack.
    pub frames_delivered: u32,
    /// Bytes in those frames, excluding FCS.
    pub bytes_delivered: u32,
    /// Frames whose CRC didn't match.
    pub crc_errors: u32,
    /// Frames dropped because the network stack couldn't allocate a buffer.
    pub out_of_memory: u32,
    /// Frames that the network stack refused.
    pub rejected: u32,
    /// Frames dropped at capture time because they were shorter than [MIN_FRAME_SIZE] or longer
    /// than [MAX_FRAME_SIZE].
    pub length_drops: u32,
    /// Descriptors lost because more frames arrived between two drains than the queue can hold.
    pub overruns: u32,
}

/// Allows one event per interval, and counts the events that were suppressed in between.
struct RateLimiter {
    interval_us: u64,
    last_us: Option<u64>,
    suppressed: u32,
}

impl RateLimiter {
    fn new(interval_us: u64) -> RateLimiter {
        RateLimiter {
            interval_us,
            last_us: None,
            suppressed: 0,
        }
    }

    /// Returns the number of events suppressed since the last allowed one if this event is
    /// allowed, or `None` if it should be suppressed.
    fn allow(&mut self, now_us: u64) -> Option<u32> {
        match self.last_us {
            Some(last) if now_us.saturating_sub(last) < self.interval_us => {
                self.suppressed = self.suppressed.wrapping_add(1);
                None
            }
            _ => {
                self.last_us = Some(now_us);
                Some(core::mem::take(&mut self.suppressed))
            }
        }
    }
}

/// The consumer side of an [RxQueue], driven by the poll loop.
pub struct RxDrain<'a, const N: usize = RX_QUEUE_LEN> {
    queue: &'a RxQueue<N>,
    /// The number of descriptors ever consumed.
    tail: usize,
    stats: RxStats,
    crc_warnings: RateLimiter,
}

impl<'a, const N: usize> RxDrain<'a, N> {
    /// Returns the number of descriptors waiting to be drained.
    pub fn pending(&self) -> usize {
        self.queue
            .head
            .load(Ordering::Acquire)
            .wrapping_sub(self.tail)
            .min(N)
    }

    pub fn stats(&self) -> RxStats {
        RxStats {
            length_drops: self.queue.length_drops.load(Ordering::Relaxed),
            ..self.stats
        }
    }

    /// Delivers every frame that was completed at the time of the call to `stack`, validating
    /// each frame's FCS while copying it out of `arena`. Frames that fail validation or that the
    /// stack can't take are dropped. Returns the number of frames delivered.
    ///
    /// The stack is asked for a buffer of the descriptor length minus [FCS_SIZE]: the FCS is
    /// checked but not delivered, since smoltcp (like most stacks) expects frames without it.
    pub fn drain<S, E, C>(&mut self, arena: &Arena, crc: &mut E, stack: &mut S, clock: &C) -> usize
    where
        S: NetStack,
        E: CrcEngine,
        C: Clock,
    {
        // Take a single snapshot, so that frames completing while we drain are left for next time.
        let head = self.queue.head.load(Ordering::Acquire);
        let mut pending = head.wrapping_sub(self.tail);
        if pending > N {
            self.stats.overruns = self
                .stats
                .overruns
                .wrapping_add((pending - N) as u32);
            self.tail = head.wrapping_sub(N);
            pending = N;
        }

        let mut delivered = 0;
        for _ in 0..pending {
            let descriptor =
                RxDescriptor::unpack(self.queue.slots[self.tail & (N - 1)].load(Ordering::Relaxed));
            self.tail = self.tail.wrapping_add(1);
            if self.deliver(descriptor, arena, crc, stack, clock) {
                delivered += 1;
            }
        }
        delivered
    }

    fn deliver<S, E, C>(
        &mut self,
        descriptor: RxDescriptor,
        arena: &Arena,
        crc: &mut E,
        stack: &mut S,
        clock: &C,
    ) -> bool
    where
        S: NetStack,
        E: CrcEngine,
        C: Clock,
    {
        let len = descriptor.length - FCS_SIZE;
        let input = stack.input(len, |buffer| {
            crc.begin();
            let fcs_offset = arena.read(descriptor.offset, buffer, crc);
            arena.feed(fcs_offset, FCS_SIZE, crc);
            let valid = crc.finish() == CHECK_RESIDUE;
            if valid {
                debug!("<<< RX {}", debug_util::FormatEthernetFrame(buffer));
                if log_enabled!(log::Level::Trace) {
                    debug_util::log_data_hex(log::Level::Trace, buffer);
                }
            } else if log_enabled!(log::Level::Trace) {
                // Bit errors are easier to spot in wire order.
                debug_util::log_data_binary_hex(log::Level::Trace, buffer);
            }
            valid
        });

        match input {
            Input::Delivered => {
                self.stats.frames_delivered = self.stats.frames_delivered.wrapping_add(1);
                self.stats.bytes_delivered = self.stats.bytes_delivered.wrapping_add(len as u32);
                return true;
            }
            Input::Discarded => {
                self.stats.crc_errors = self.stats.crc_errors.wrapping_add(1);
                if let Some(suppressed) = self.crc_warnings.allow(clock.now_us()) {
                    warn!(
                        "RX CRC error (frame of {} bytes at offset {:#05x}, {suppressed} more \
                            since last report, {} in total)",
                        descriptor.length, descriptor.offset, self.stats.crc_errors
                    );
                }
            }
            Input::OutOfMemory => {
                self.stats.out_of_memory = self.stats.out_of_memory.wrapping_add(1);
                trace!("RX dropped frame of {} bytes: out of memory", descriptor.length);
            }
            Input::Rejected => {
                self.stats.rejected = self.stats.rejected.wrapping_add(1);
                trace!("RX frame of {} bytes rejected by the stack", descriptor.length);
            }
        }
        false
    }
}
