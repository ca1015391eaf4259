//! The DMA channels behind the RX chain, the TX chain and the CRC sniffer.
//!
//! Both chains are pairs of channels: a data channel that moves bytes between an arena and a
//! state machine FIFO, and a second channel that the data channel chains to when its transfer count
//! runs out, and which re-triggers it by writing one of its registers:
//!
//! - RX: the reload channel copies the data channel's control word back into its `CTRL_TRIG`
//!   register, restarting it with a fresh count at its current (wrapping) write address.
//! - TX: the command channel copies the next command (a frame length) from the command ring into
//!   the data channel's `AL1_TRANS_COUNT_TRIG` register. A zero command is a null trigger, which
//!   leaves the data channel (and thereby the chain) halted.

use crate::pio::StateMachine;
use crate::regs::{reg, Block, Reg};
use core::sync::atomic::{AtomicU32, Ordering};
use log::warn;
use rmii_mac::hal::{ChainPlan, CopyMode, DmaCursor, Endpoint, Reload, RxDma, SniffDma, TxDma};

const CHANNEL_COUNT: u8 = 12;
const CHANNEL_STRIDE: usize = 0x40;

// Per-channel registers.
const READ_ADDR: usize = 0x00;
const WRITE_ADDR: usize = 0x04;
const TRANS_COUNT: usize = 0x08;
const CTRL_TRIG: usize = 0x0c;
const AL1_CTRL: usize = 0x10;
const AL1_TRANS_COUNT_TRIG: usize = 0x1c;
const AL3_READ_ADDR_TRIG: usize = 0x3c;

// Shared registers.
const MULTI_CHAN_TRIGGER: usize = 0x430;
const SNIFF_CTRL: usize = 0x434;
const SNIFF_DATA: usize = 0x438;
const CHAN_ABORT: usize = 0x444;

/// Bits in a channel's control register.
mod ctrl {
    pub const EN: u32 = 1 << 0;
    pub const DATA_SIZE_BYTE: u32 = 0 << 2;
    pub const DATA_SIZE_WORD: u32 = 2 << 2;
    pub const INCR_READ: u32 = 1 << 4;
    pub const INCR_WRITE: u32 = 1 << 5;
    /// Wrap the write address instead of the read address.
    pub const RING_SEL_WRITE: u32 = 1 << 10;
    pub const IRQ_QUIET: u32 = 1 << 21;
    pub const SNIFF_EN: u32 = 1 << 23;
    pub const BUSY: u32 = 1 << 24;
    /// The DREQ number for unpaced transfers.
    pub const TREQ_PERMANENT: u32 = 0x3f;

    pub const fn ring_size(size_log2: u32) -> u32 {
        (size_log2 & 0xf) << 6
    }

    /// Chaining a channel to itself disables chaining.
    pub const fn chain_to(channel: u8) -> u32 {
        (channel as u32 & 0xf) << 11
    }

    pub const fn treq(dreq: u32) -> u32 {
        (dreq & 0x3f) << 15
    }
}

mod sniff_ctrl {
    pub const EN: u32 = 1 << 0;
    /// CRC-32 with the IEEE 802.3 polynomial, over bit-reversed data.
    pub const CALC_CRC32R: u32 = 0x1 << 5;
    /// Bit-reverse the accumulator when it is read.
    pub const OUT_REV: u32 = 1 << 10;

    pub const fn dmach(channel: u8) -> u32 {
        (channel as u32 & 0xf) << 1
    }
}

/// One of the twelve DMA channels. Claiming channels, so that no two users share one, is up to
/// the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Channel(u8);

impl Channel {
    /// Returns `None` if `number` isn't a valid channel number.
    pub fn new(number: u8) -> Option<Channel> {
        (number < CHANNEL_COUNT).then_some(Channel(number))
    }

    fn reg(self, offset: usize) -> Reg {
        reg(Block::Dma, self.0 as usize * CHANNEL_STRIDE + offset)
    }

    fn mask(self) -> u32 {
        1 << self.0
    }

    fn abort(self) {
        let abort = reg(Block::Dma, CHAN_ABORT);
        abort.write(self.mask());
        while abort.read() & self.mask() != 0 {}
    }

    /// Sets up a transfer without starting it. The count is left alone if `None`.
    fn configure(self, read: usize, write: usize, count: Option<u32>, control: u32) {
        self.reg(READ_ADDR).write(read as u32);
        self.reg(WRITE_ADDR).write(write as u32);
        if let Some(count) = count {
            self.reg(TRANS_COUNT).write(count);
        }
        self.reg(AL1_CTRL).write(control);
    }

    fn trigger(self) {
        reg(Block::Dma, MULTI_CHAN_TRIGGER).write(self.mask());
    }

    fn is_busy(self) -> bool {
        self.reg(AL1_CTRL).read() & ctrl::BUSY != 0
    }
}

/// The word the RX reload channel copies the data channel's control register value from. The
/// hardware reads it for as long as the chain runs, hence it must be `'static`.
pub struct ReloadWord(AtomicU32);

impl ReloadWord {
    pub const fn new() -> ReloadWord {
        ReloadWord(AtomicU32::new(0))
    }
}

impl Default for ReloadWord {
    fn default() -> Self {
        Self::new()
    }
}

/// The RX chain: a data channel filling the RX arena from the RX state machine's FIFO, and a
/// reload channel restarting it forever.
pub struct RxChain {
    data: Channel,
    reload: Channel,
    fifo: StateMachine,
    reload_word: &'static ReloadWord,
}

impl RxChain {
    pub fn new(
        data: Channel,
        reload: Channel,
        fifo: StateMachine,
        reload_word: &'static ReloadWord,
    ) -> RxChain {
        RxChain {
            data,
            reload,
            fifo,
            reload_word,
        }
    }
}

impl RxDma for RxChain {
    type Cursor = RxCursor;

    fn arm(&mut self, plan: &ChainPlan) {
        let (Endpoint::Fifo, Endpoint::Ring { base, size_log2 }, Reload::Rearm { count }) =
            (plan.source, plan.destination, plan.reload)
        else {
            // `rx_plan` only ever describes this shape.
            debug_assert!(false, "RX chain can't run {plan:?}");
            warn!("RX chain can't run {plan:?}");
            return;
        };
        self.data.abort();
        self.reload.abort();

        let data_control = ctrl::EN
            | ctrl::DATA_SIZE_BYTE
            | ctrl::INCR_WRITE
            | ctrl::ring_size(size_log2)
            | ctrl::RING_SEL_WRITE
            | ctrl::chain_to(self.reload.0)
            | ctrl::treq(self.fifo.rx_dreq())
            | ctrl::IRQ_QUIET;
        // The hardware reloads the count last written on every trigger, so the initial count and
        // the reload count are one and the same.
        self.data
            .configure(self.fifo.rx_fifo_address(), base, Some(count), data_control);
        self.reload_word.0.store(data_control, Ordering::Release);

        let reload_control = ctrl::EN
            | ctrl::DATA_SIZE_WORD
            | ctrl::chain_to(self.reload.0)
            | ctrl::treq(ctrl::TREQ_PERMANENT)
            | ctrl::IRQ_QUIET;
        self.reload.configure(
            self.reload_word.0.as_ptr() as usize,
            self.data.reg(CTRL_TRIG).address(),
            Some(1),
            reload_control,
        );
        // Running the reload channel once starts the data channel.
        self.reload.trigger();
    }

    fn cursor(&self) -> RxCursor {
        RxCursor { data: self.data }
    }
}

/// Reads the RX data channel's write address.
pub struct RxCursor {
    data: Channel,
}

impl DmaCursor for RxCursor {
    fn address(&self) -> usize {
        self.data.reg(WRITE_ADDR).read() as usize
    }
}

/// The TX chain: a data channel feeding the TX state machine's FIFO from the TX arena, and a
/// command channel feeding it transfer counts from the command ring.
pub struct TxChain {
    data: Channel,
    command: Channel,
    fifo: StateMachine,
}

impl TxChain {
    pub fn new(data: Channel, command: Channel, fifo: StateMachine) -> TxChain {
        TxChain {
            data,
            command,
            fifo,
        }
    }
}

impl DmaCursor for TxChain {
    fn address(&self) -> usize {
        self.data.reg(READ_ADDR).read() as usize
    }
}

impl TxDma for TxChain {
    fn arm(&mut self, plan: &ChainPlan) {
        let (
            Endpoint::Ring { base, size_log2 },
            Endpoint::Fifo,
            Reload::Commands {
                base: commands_base,
                size_log2: commands_size_log2,
            },
        ) = (plan.source, plan.destination, plan.reload)
        else {
            // `tx_plan` only ever describes this shape.
            debug_assert!(false, "TX chain can't run {plan:?}");
            warn!("TX chain can't run {plan:?}");
            return;
        };
        self.data.abort();
        self.command.abort();

        let data_control = ctrl::EN
            | ctrl::DATA_SIZE_BYTE
            | ctrl::INCR_READ
            | ctrl::ring_size(size_log2)
            | ctrl::chain_to(self.command.0)
            | ctrl::treq(self.fifo.tx_dreq())
            | ctrl::IRQ_QUIET;
        self.data
            .configure(base, self.fifo.tx_fifo_address(), None, data_control);

        let command_control = ctrl::EN
            | ctrl::DATA_SIZE_WORD
            | ctrl::INCR_READ
            | ctrl::ring_size(commands_size_log2)
            | ctrl::chain_to(self.command.0)
            | ctrl::treq(ctrl::TREQ_PERMANENT)
            | ctrl::IRQ_QUIET;
        self.command.configure(
            commands_base,
            self.data.reg(AL1_TRANS_COUNT_TRIG).address(),
            Some(1),
            command_control,
        );
    }

    fn is_busy(&self) -> bool {
        // Between two frames the data channel is briefly idle while the command channel runs.
        self.data.is_busy() || self.command.is_busy()
    }

    fn trigger(&mut self, command_address: usize) {
        self.command
            .reg(AL3_READ_ADDR_TRIG)
            .write(command_address as u32);
    }
}

/// A memory-to-memory channel with the DMA block's CRC sniffer attached. Set up for the Ethernet
/// CRC, reading back the (reflected) CRC register without final complement.
pub struct SniffChannel {
    channel: Channel,
}

impl SniffChannel {
    /// Attaches the sniffer to `channel`. There's only one sniffer, so there can only be one
    /// [SniffChannel] at a time.
    pub fn new(channel: Channel) -> SniffChannel {
        reg(Block::Dma, SNIFF_CTRL).write(
            sniff_ctrl::EN
                | sniff_ctrl::dmach(channel.0)
                | sniff_ctrl::CALC_CRC32R
                | sniff_ctrl::OUT_REV,
        );
        SniffChannel { channel }
    }
}

impl SniffDma for SniffChannel {
    fn wait(&mut self) {
        while self.channel.is_busy() {}
    }

    fn reset_sniffer(&mut self, seed: u32) {
        // Only reads are bit-reversed.
        reg(Block::Dma, SNIFF_DATA).write(seed.reverse_bits());
    }

    unsafe fn start(&mut self, src: *const u8, dst: *mut u8, len: usize, mode: CopyMode) {
        let increment = match mode {
            CopyMode::Copy => ctrl::INCR_READ | ctrl::INCR_WRITE,
            CopyMode::Fill => ctrl::INCR_WRITE,
            CopyMode::Drain => ctrl::INCR_READ,
        };
        let control = ctrl::EN
            | ctrl::DATA_SIZE_BYTE
            | increment
            | ctrl::SNIFF_EN
            | ctrl::chain_to(self.channel.0)
            | ctrl::treq(ctrl::TREQ_PERMANENT)
            | ctrl::IRQ_QUIET;
        self.channel
            .configure(src as usize, dst as usize, Some(len as u32), control);
        self.channel.reg(CTRL_TRIG).write(control);
    }

    fn sniffed(&self) -> u32 {
        reg(Block::Dma, SNIFF_DATA).read()
    }
}
