//! The transmit half of the MAC.
//!
//! Outgoing frames are formatted straight into the TX arena: a two-byte length header for the
//! transmit state machine, the frame data, zero padding up to the minimum frame size, and the FCS.
//! Each formatted frame's length is then appended to the command ring, which the TX DMA chain
//! works through on its own, one frame per command, until it hits a zero command.
//!
//! ```text
//!  TX arena                                   command ring
//! +-----+-----------------+-----+-----+     +------+------+---+---+
//! | hdr | data | padding  | FCS | hdr | ... | len0 | len1 | 0 | ? |
//! +-----+-----------------+-----+-----+     +------+------+---+---+
//!   ^ DMA read address          ^ write offset              ^ next slot
//! ```

use super::{
    Error, Result, FCS_SIZE, MAX_PAYLOAD_SIZE, MIN_FRAME_SIZE, MIN_PAYLOAD_SIZE, TX_HEADER_SIZE,
};
use crate::crc::{fcs_bytes, CrcEngine};
use crate::debug_util;
use crate::hal::{ChainPlan, Clock, Endpoint, Reload, TxDma};
use crate::ring::{Arena, CommandStorage, COMMAND_RING_LEN};
use byteorder::{ByteOrder, LittleEndian};
use core::sync::atomic::Ordering;
use log::{debug, log_enabled, trace, warn};

/// How long to wait between checks for free space while the TX arena is full.
const RESERVE_POLL_US: u32 = 10;

/// Returns the plan for the TX chain: feed the transmit FIFO from `arena`, taking each transfer
/// count from the next slot in `commands`. The initial count is unused, since the chain is only
/// ever started through the command ring.
pub fn tx_plan(arena: &Arena, commands: &CommandStorage) -> ChainPlan {
    ChainPlan {
        source: Endpoint::Ring {
            base: arena.base_address(),
            size_log2: arena.size_log2(),
        },
        destination: Endpoint::Fifo,
        count: 0,
        reload: Reload::Commands {
            base: commands.base_address(),
            size_log2: commands.size_log2(),
        },
    }
}

/// Returns the number of TX arena bytes a frame with `len` bytes of data takes up once formatted.
pub fn required_space(len: usize) -> usize {
    (TX_HEADER_SIZE + len + FCS_SIZE).max(TX_HEADER_SIZE + MIN_FRAME_SIZE)
}

/// Returns the value of the length header that precedes a frame of `frame_len` bytes (including
/// padding and FCS) in the TX arena: the number of dibits the transmit state machine must shift
/// out, minus one.
pub fn length_header(frame_len: usize) -> [u8; 2] {
    let mut header = [0; TX_HEADER_SIZE];
    LittleEndian::write_u16(&mut header, (frame_len * 4 - 1) as u16);
    header
}

/// Various transmit-related stats.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxStats {
    /// Frames handed to the TX chain.
    pub frames_queued: u32,
    /// Bytes of frame data in those frames, excluding padding and FCS.
    pub bytes_queued: u32,
    /// Sends that had to wait for the TX chain to free up space.
    pub backpressure_waits: u32,
    /// How often the TX chain had gone idle and had to be restarted.
    pub chain_restarts: u32,
}

/// The TX arena, the command ring and the chain working through them.
struct TxRing<'a, T> {
    arena: Arena<'a>,
    commands: &'a CommandStorage,
    dma: T,
    /// Where the next frame gets formatted.
    write_offset: usize,
    /// The command slot that currently holds the zero command the chain will halt at.
    command_index: usize,
    stats: TxStats,
}

impl<'a, T: TxDma> TxRing<'a, T> {
    fn free_space(&self) -> usize {
        let read_offset = self.arena.offset_of(self.dma.address());
        let used = self.arena.distance(read_offset, self.write_offset);
        // One byte always stays free, so that a full arena can't be mistaken for an empty one.
        self.arena.len() - 1 - used
    }

    fn reserve<C: Clock>(&mut self, needed: usize, clock: &C) {
        if self.free_space() >= needed {
            return;
        }
        self.stats.backpressure_waits = self.stats.backpressure_waits.wrapping_add(1);
        trace!("TX waiting for {needed} bytes of space");
        while self.free_space() < needed {
            clock.delay_us(RESERVE_POLL_US);
        }
    }

    /// Formats a frame at the write offset, and returns the length of the formatted frame
    /// including its header. Space must have been reserved.
    fn format<E: CrcEngine>(&mut self, segments: &[&[u8]], len: usize, crc: &mut E) -> usize {
        let header_offset = self.write_offset;
        let mut offset = self.arena.advance(header_offset, TX_HEADER_SIZE);

        crc.begin();
        for segment in segments {
            offset = self.arena.write(offset, segment, crc);
        }
        let padding = MIN_PAYLOAD_SIZE.saturating_sub(len);
        if padding > 0 {
            offset = self.arena.fill(offset, 0, padding, crc);
        }
        offset = self.arena.put(offset, &fcs_bytes(crc.finish()));

        let frame_len = len + padding + FCS_SIZE;
        self.arena.put(header_offset, &length_header(frame_len));
        self.write_offset = offset;

        if let Some(first) = segments.first() {
            debug!(">>> TX {}", debug_util::FormatEthernetFrame(first));
            if log_enabled!(log::Level::Trace) {
                for segment in segments {
                    debug_util::log_data_hex(log::Level::Trace, segment);
                }
            }
        }
        TX_HEADER_SIZE + frame_len
    }

    /// Appends a command for a formatted frame starting at `frame_offset`, and makes sure the chain
    /// will get to it.
    fn enqueue<C: Clock>(&mut self, command: usize, frame_offset: usize, clock: &C) {
        let index = self.command_index;
        let next = (index + 1) % COMMAND_RING_LEN;
        let slots = &self.commands.0;

        // The chain must find a terminator right after the new command.
        slots[next].store(0, Ordering::Release);

        let dma = &self.dma;
        let arena = &self.arena;
        let restart = critical_section::with(|_| {
            let before = dma.is_busy();
            slots[index].store(command as u32, Ordering::Release);
            let mut after = dma.is_busy();
            if before && !after {
                // The chain may just be between two commands.
                clock.delay_us(1);
                after = dma.is_busy();
            }
            match (before, after) {
                // The chain halted at the terminator we just overwrote.
                (false, false) => true,
                (true, false) => {
                    // Either the chain picked up our frame and is already done with it, or it saw
                    // the old terminator. In the first case its read address has moved past the
                    // frame, and restarting it would send the frame twice.
                    clock.delay_us(1);
                    !dma.is_busy() && arena.offset_of(dma.address()) == frame_offset
                }
                _ => false,
            }
        });

        if restart {
            self.stats.chain_restarts = self.stats.chain_restarts.wrapping_add(1);
            self.dma.trigger(slots[index].as_ptr() as usize);
        }
        self.command_index = next;
    }

    fn send<E: CrcEngine, C: Clock>(&mut self, segments: &[&[u8]], len: usize, crc: &mut E, clock: &C) {
        let frame_offset = self.write_offset;
        let command = self.format(segments, len, crc);
        self.enqueue(command, frame_offset, clock);
        self.stats.frames_queued = self.stats.frames_queued.wrapping_add(1);
        self.stats.bytes_queued = self.stats.bytes_queued.wrapping_add(len as u32);
    }
}

/// Queues outgoing frames for the TX chain.
pub struct Transmitter<'a, T> {
    ring: TxRing<'a, T>,
    staging: [u8; MAX_PAYLOAD_SIZE],
}

impl<'a, T: TxDma> Transmitter<'a, T> {
    /// Clears the command ring and arms the (idle) TX chain.
    ///
    /// Returns [Error::CommandRingTooSmall] if the arena could hold more frames than the command
    /// ring can describe.
    pub fn new(arena: Arena<'a>, commands: &'a CommandStorage, mut dma: T) -> Result<Self> {
        if arena.len() / required_space(0) >= COMMAND_RING_LEN {
            return Err(Error::CommandRingTooSmall);
        }
        for slot in commands.0.iter() {
            slot.store(0, Ordering::Relaxed);
        }
        dma.arm(&tx_plan(&arena, commands));
        Ok(Transmitter {
            ring: TxRing {
                arena,
                commands,
                dma,
                write_offset: 0,
                command_index: 0,
                stats: TxStats::default(),
            },
            staging: [0; MAX_PAYLOAD_SIZE],
        })
    }

    /// Returns how many bytes of the TX arena are currently free.
    pub fn free_space(&self) -> usize {
        self.ring.free_space()
    }

    pub fn stats(&self) -> TxStats {
        self.ring.stats
    }

    fn checked_len(segments: &[&[u8]]) -> Result<usize> {
        let len = segments.iter().map(|s| s.len()).sum();
        if len > MAX_PAYLOAD_SIZE {
            return Err(Error::FrameTooLarge { len });
        }
        Ok(len)
    }

    /// Queues a frame consisting of the concatenated `segments` (destination and source address,
    /// EtherType and payload, without FCS), waiting for space in the TX arena if necessary.
    pub fn send<E: CrcEngine, C: Clock>(
        &mut self,
        segments: &[&[u8]],
        crc: &mut E,
        clock: &C,
    ) -> Result<()> {
        let len = Self::checked_len(segments)?;
        self.ring.reserve(required_space(len), clock);
        self.ring.send(segments, len, crc, clock);
        Ok(())
    }

    /// Like [Transmitter::send], but returns [Error::TxRingFull] instead of waiting.
    pub fn try_send<E: CrcEngine, C: Clock>(
        &mut self,
        segments: &[&[u8]],
        crc: &mut E,
        clock: &C,
    ) -> Result<()> {
        let len = Self::checked_len(segments)?;
        if self.ring.free_space() < required_space(len) {
            return Err(Error::TxRingFull);
        }
        self.ring.send(segments, len, crc, clock);
        Ok(())
    }

    /// Queues a frame of `len` bytes produced by `f`, waiting for space if necessary.
    pub fn send_with<E, C, F, R>(&mut self, len: usize, crc: &mut E, clock: &C, f: F) -> Result<R>
    where
        E: CrcEngine,
        C: Clock,
        F: FnOnce(&mut [u8]) -> R,
    {
        if len > MAX_PAYLOAD_SIZE {
            return Err(Error::FrameTooLarge { len });
        }
        Ok(self.send_truncated_with(len, crc, clock, f))
    }

    /// Like [Transmitter::send_with], but truncates frames longer than [MAX_PAYLOAD_SIZE] to that
    /// size (i.e. `f` gets a shorter buffer) rather than refusing them.
    pub fn send_truncated_with<E, C, F, R>(&mut self, len: usize, crc: &mut E, clock: &C, f: F) -> R
    where
        E: CrcEngine,
        C: Clock,
        F: FnOnce(&mut [u8]) -> R,
    {
        if len > MAX_PAYLOAD_SIZE {
            warn!("TX truncating frame of {len} bytes to {MAX_PAYLOAD_SIZE}");
        }
        let len = len.min(MAX_PAYLOAD_SIZE);
        let result = f(&mut self.staging[..len]);
        self.ring.reserve(required_space(len), clock);
        self.ring.send(&[&self.staging[..len]], len, crc, clock);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::{SoftwareCrc, CHECK_RESIDUE};
    use crate::example_data::{TEST_FRAME_ARP_REQUEST_RAW, TEST_FRAME_ARP_REQUEST_UNPADDED};
    use crate::ring::ArenaStorage;
    use crate::hal::DmaCursor;
    use crate::sim::{frame_data, SimBoard, SimTxDma};
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;

    struct Fixture {
        arena: Box<ArenaStorage>,
        commands: Box<CommandStorage>,
        board: SimBoard,
    }

    impl Fixture {
        fn new() -> Fixture {
            Fixture {
                arena: Box::new(ArenaStorage::new()),
                commands: Box::new(CommandStorage::new()),
                board: SimBoard::without_phy(),
            }
        }

        fn transmitter(&self) -> Transmitter<'_, SimTxDma> {
            Transmitter::new(
                Arena::new(&self.arena),
                &self.commands,
                self.board.tx_dma(),
            )
            .unwrap()
        }
    }

    /// What a [ScriptedTxDma] reports, and what was done to it.
    #[derive(Default)]
    struct Script {
        /// Consecutive answers to `is_busy`. Idle once exhausted.
        busy: RefCell<VecDeque<bool>>,
        /// The arena offset the data channel reports as its read position.
        read_offset: Cell<usize>,
        /// The read position from the first busy sample on, i.e. where the chain got to while the
        /// command was being inserted.
        sampled_offset: Cell<usize>,
        base: Cell<usize>,
        triggers: RefCell<Vec<usize>>,
    }

    /// A TX chain that plays back a fixed sequence of busy samples, to land `enqueue` in each of
    /// its branches.
    struct ScriptedTxDma(Rc<Script>);

    impl DmaCursor for ScriptedTxDma {
        fn address(&self) -> usize {
            self.0.base.get() + self.0.read_offset.get()
        }
    }

    impl TxDma for ScriptedTxDma {
        fn arm(&mut self, _plan: &ChainPlan) {}

        fn is_busy(&self) -> bool {
            self.0.read_offset.set(self.0.sampled_offset.get());
            self.0.busy.borrow_mut().pop_front().unwrap_or(false)
        }

        fn trigger(&mut self, command_address: usize) {
            self.0.triggers.borrow_mut().push(command_address);
        }
    }

    /// Sends one minimum-sized frame at arena offset 0 through a chain playing back `busy`, whose
    /// read position moves to `sampled_offset` once sampling starts. Returns the trigger addresses
    /// and the address of the frame's command slot.
    fn send_scripted(busy: &[bool], sampled_offset: usize) -> (Vec<usize>, usize) {
        let storage = Box::new(ArenaStorage::new());
        let commands = Box::new(CommandStorage::new());
        let board = SimBoard::without_phy();
        let clock = board.clock(None);
        let script = Rc::new(Script::default());
        let arena = Arena::new(&storage);
        script.base.set(arena.base_address());
        script.sampled_offset.set(sampled_offset);

        let mut tx = Transmitter::new(arena, &commands, ScriptedTxDma(script.clone())).unwrap();
        script.busy.borrow_mut().extend(busy);
        tx.send(&[&frame_data(60, 5)[..]], &mut SoftwareCrc::new(), &clock)
            .unwrap();

        assert!(script.busy.borrow().is_empty(), "not all busy samples were taken");
        assert_eq!(commands.0[0].load(Ordering::Relaxed), 66);
        assert_eq!(commands.0[1].load(Ordering::Relaxed), 0);
        let triggers = script.triggers.borrow().clone();
        (triggers, commands.0[0].as_ptr() as usize)
    }

    #[test]
    fn idle_chain_is_restarted_at_new_command() {
        let (triggers, slot) = send_scripted(&[false, false], 0);
        assert_eq!(triggers, [slot]);
    }

    #[test]
    fn running_chain_is_left_alone() {
        let (triggers, _) = send_scripted(&[true, true], 0);
        assert!(triggers.is_empty());
    }

    // Busy, then idle: the chain stopped somewhere between the two samples. If its read position
    // is still at the start of the new frame, it halted at the old terminator and the frame would
    // be lost without a restart.
    #[test]
    fn chain_halted_at_old_terminator_is_restarted() {
        let (triggers, slot) = send_scripted(&[true, false, false, false], 0);
        assert_eq!(triggers, [slot]);
    }

    // Busy, then idle, but the read position has moved past the new frame: the chain already sent
    // it, and a restart would send it a second time.
    #[test]
    fn chain_that_already_sent_new_frame_is_not_restarted() {
        let (triggers, _) = send_scripted(&[true, false, false, false], 66);
        assert!(triggers.is_empty());
    }

    // Busy, idle, then busy again: the chain was only fetching its next command.
    #[test]
    fn chain_between_commands_is_not_restarted() {
        let (triggers, _) = send_scripted(&[true, false, true], 0);
        assert!(triggers.is_empty());
    }

    fn padded(data: &[u8]) -> Vec<u8> {
        let mut frame = data.to_vec();
        frame.resize(data.len().max(MIN_PAYLOAD_SIZE), 0);
        frame
    }

    #[test]
    fn plan_feeds_fifo_from_arena_through_commands() {
        let storage = Box::new(ArenaStorage::new());
        let commands = Box::new(CommandStorage::new());
        let arena = Arena::new(&storage);
        let plan = tx_plan(&arena, &commands);

        assert_eq!(
            plan.source,
            Endpoint::Ring {
                base: arena.base_address(),
                size_log2: 12
            }
        );
        assert_eq!(plan.destination, Endpoint::Fifo);
        assert_eq!(
            plan.reload,
            Reload::Commands {
                base: commands.base_address(),
                size_log2: commands.size_log2()
            }
        );
        // One 32-bit command per slot.
        assert_eq!(1 << commands.size_log2(), COMMAND_RING_LEN * 4);
    }

    #[test]
    fn space_and_header_arithmetic() {
        assert_eq!(required_space(0), 66);
        assert_eq!(required_space(60), 66);
        assert_eq!(required_space(61), 67);
        assert_eq!(required_space(1514), 1520);
        assert_eq!(length_header(64), [0xff, 0x00]);
        assert_eq!(length_header(1518), [0xb7, 0x17]);
    }

    #[test]
    fn arp_request_is_padded_and_gets_fcs() {
        let fixture = Fixture::new();
        let mut tx = fixture.transmitter();
        let clock = fixture.board.clock(None);

        tx.send(&[TEST_FRAME_ARP_REQUEST_UNPADDED], &mut SoftwareCrc::new(), &clock)
            .unwrap();
        clock.delay_us(100);

        assert_eq!(
            fixture.board.take_transmitted(),
            [TEST_FRAME_ARP_REQUEST_RAW.to_vec()]
        );
        assert_eq!(fixture.board.tx_triggers(), 1);
        assert_eq!(tx.stats().frames_queued, 1);
        assert_eq!(tx.stats().bytes_queued, 42);
    }

    #[test]
    fn segments_are_concatenated() {
        let fixture = Fixture::new();
        let mut tx = fixture.transmitter();
        let clock = fixture.board.clock(None);
        let data = frame_data(200, 9);

        let segments = [&data[..14], &data[14..15], &data[15..15], &data[15..]];
        tx.send(&segments, &mut SoftwareCrc::new(), &clock).unwrap();
        clock.delay_us(100);

        let sent = fixture.board.take_transmitted();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0][..200], data[..]);
        assert_eq!(crc32fast::hash(&data).to_le_bytes(), sent[0][200..]);
    }

    #[test]
    fn oversized_frame_is_refused() {
        let fixture = Fixture::new();
        let mut tx = fixture.transmitter();
        let clock = fixture.board.clock(None);
        let data = frame_data(MAX_PAYLOAD_SIZE + 1, 0);

        assert!(matches!(
            tx.send(&[&data[..]], &mut SoftwareCrc::new(), &clock),
            Err(Error::FrameTooLarge { len: 1515 })
        ));
        assert!(matches!(
            tx.send_with(1515, &mut SoftwareCrc::new(), &clock, |_| ()),
            Err(Error::FrameTooLarge { len: 1515 })
        ));
        assert!(tx
            .send(&[&data[..MAX_PAYLOAD_SIZE]], &mut SoftwareCrc::new(), &clock)
            .is_ok());
        assert_eq!(tx.stats().frames_queued, 1);
    }

    #[test]
    fn send_with_stages_frame() {
        let fixture = Fixture::new();
        let mut tx = fixture.transmitter();
        let clock = fixture.board.clock(None);
        let data = frame_data(80, 3);

        let result = tx
            .send_with(80, &mut SoftwareCrc::new(), &clock, |buffer| {
                buffer.copy_from_slice(&data);
                42
            })
            .unwrap();
        assert_eq!(result, 42);
        clock.delay_us(100);
        assert_eq!(fixture.board.take_transmitted()[0][..80], data[..]);
    }

    #[test]
    fn send_truncated_with_clamps_length() {
        let fixture = Fixture::new();
        let mut tx = fixture.transmitter();
        let clock = fixture.board.clock(None);

        let staged = tx.send_truncated_with(2000, &mut SoftwareCrc::new(), &clock, |buffer| {
            buffer.fill(0xa5);
            buffer.len()
        });
        assert_eq!(staged, MAX_PAYLOAD_SIZE);
        clock.delay_us(200);

        let sent = fixture.board.take_transmitted();
        assert_eq!(sent[0].len(), MAX_PAYLOAD_SIZE + FCS_SIZE);
        assert_eq!(crc32fast::hash(&sent[0]), !CHECK_RESIDUE);
    }

    // Sending far more than fits in the arena, with the transmitter slowed down, must block rather
    // than drop or overwrite frames that haven't gone out yet.
    #[test]
    fn backpressure_blocks_without_corruption() {
        let fixture = Fixture::new();
        let mut tx = fixture.transmitter();
        let clock = fixture.board.clock(None);
        fixture.board.set_tx_rate(1);
        let mut crc = SoftwareCrc::new();

        let mut expected = Vec::new();
        for i in 0..12u8 {
            let len = [1514, 0, 700, 59, 1200][i as usize % 5];
            let data = frame_data(len, i);
            tx.send(&[&data[..]], &mut crc, &clock).unwrap();
            expected.push(padded(&data));
        }
        clock.delay_ms(20);

        let sent = fixture.board.take_transmitted();
        assert_eq!(sent.len(), expected.len());
        for (frame, data) in sent.iter().zip(&expected) {
            assert_eq!(crc32fast::hash(frame), !CHECK_RESIDUE);
            assert_eq!(frame[..frame.len() - FCS_SIZE], data[..]);
        }
        assert!(tx.stats().backpressure_waits > 0);
        assert_eq!(tx.free_space(), 4095);
    }

    #[test]
    fn busy_chain_picks_up_new_commands() {
        let fixture = Fixture::new();
        let mut tx = fixture.transmitter();
        let clock = fixture.board.clock(None);
        fixture.board.set_tx_rate(1);
        let mut crc = SoftwareCrc::new();

        for i in 0..3 {
            tx.send(&[&frame_data(100, i)[..]], &mut crc, &clock).unwrap();
        }
        assert!(fixture.board.tx_busy());
        assert_eq!(fixture.board.tx_triggers(), 1);

        clock.delay_ms(1);
        assert!(!fixture.board.tx_busy());
        assert_eq!(fixture.board.take_transmitted().len(), 3);

        // Once idle, the next frame restarts the chain.
        tx.send(&[&frame_data(100, 4)[..]], &mut crc, &clock).unwrap();
        assert_eq!(fixture.board.tx_triggers(), 2);
        assert_eq!(tx.stats().chain_restarts, 2);
    }

    #[test]
    fn counters_wrap_around() {
        let fixture = Fixture::new();
        let mut tx = fixture.transmitter();
        let clock = fixture.board.clock(None);
        fixture.board.set_tx_rate(0);
        tx.ring.stats = TxStats {
            frames_queued: u32::MAX,
            bytes_queued: u32::MAX,
            backpressure_waits: u32::MAX,
            chain_restarts: u32::MAX,
        };

        let data = frame_data(1514, 7);
        let mut crc = SoftwareCrc::new();
        tx.send(&[&data[..]], &mut crc, &clock).unwrap();
        tx.send(&[&data[..]], &mut crc, &clock).unwrap();
        assert_eq!(tx.stats().frames_queued, 1);
        assert_eq!(tx.stats().bytes_queued, 2 * 1514 - 1);
        assert_eq!(tx.stats().chain_restarts, 0);

        // Only frees up space once the chain is moving again.
        fixture.board.set_tx_rate(12);
        tx.send(&[&data[..]], &mut crc, &clock).unwrap();
        assert_eq!(tx.stats().backpressure_waits, 0);
    }

    #[test]
    fn try_send_refuses_when_full() {
        let fixture = Fixture::new();
        let mut tx = fixture.transmitter();
        let clock = fixture.board.clock(None);
        fixture.board.set_tx_rate(0);
        let mut crc = SoftwareCrc::new();
        let data = frame_data(1514, 1);

        assert!(tx.try_send(&[&data[..]], &mut crc, &clock).is_ok());
        assert!(tx.try_send(&[&data[..]], &mut crc, &clock).is_ok());
        assert_eq!(tx.free_space(), 4095 - 2 * 1520);
        assert!(matches!(
            tx.try_send(&[&data[..]], &mut crc, &clock),
            Err(Error::TxRingFull)
        ));
        assert!(tx.try_send(&[&data[..900]], &mut crc, &clock).is_ok());

        fixture.board.set_tx_rate(12);
        clock.delay_ms(1);
        let sent = fixture.board.take_transmitted();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[2][..900], data[..900]);
    }
}
