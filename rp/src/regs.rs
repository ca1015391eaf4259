//! Raw access to the handful of RP2040 registers the driver touches. The peripheral base addresses
//! come from the PAC; offsets and bit positions are from the RP2040 datasheet.

use core::ptr::{read_volatile, write_volatile};

/// Offset of the atomic bitmask-set alias of a peripheral register (not available for SIO).
const SET_ALIAS: usize = 0x2000;
/// Offset of the atomic bitmask-clear alias of a peripheral register (not available for SIO).
const CLEAR_ALIAS: usize = 0x3000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Block {
    Dma,
    IoBank0,
    PadsBank0,
    Pio0,
    Pio1,
    Pwm,
    Resets,
    Sio,
    Timer,
}

impl Block {
    fn base(self) -> usize {
        use rp2040_pac as pac;
        match self {
            Block::Dma => pac::DMA::ptr() as usize,
            Block::IoBank0 => pac::IO_BANK0::ptr() as usize,
            Block::PadsBank0 => pac::PADS_BANK0::ptr() as usize,
            Block::Pio0 => pac::PIO0::ptr() as usize,
            Block::Pio1 => pac::PIO1::ptr() as usize,
            Block::Pwm => pac::PWM::ptr() as usize,
            Block::Resets => pac::RESETS::ptr() as usize,
            Block::Sio => pac::SIO::ptr() as usize,
            Block::Timer => pac::TIMER::ptr() as usize,
        }
    }
}

/// A 32-bit memory-mapped register. Can only be obtained through [reg], so it always points into
/// one of the peripheral blocks above.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Reg(usize);

pub(crate) fn reg(block: Block, offset: usize) -> Reg {
    Reg(block.base() + offset)
}

impl Reg {
    pub(crate) fn address(self) -> usize {
        self.0
    }

    pub(crate) fn read(self) -> u32 {
        // SAFETY: the address is that of a register in a peripheral block, which is always mapped.
        unsafe { read_volatile(self.0 as *const u32) }
    }

    pub(crate) fn write(self, value: u32) {
        // SAFETY: see `read`.
        unsafe { write_volatile(self.0 as *mut u32, value) }
    }

    /// Sets the bits in `mask`, without a read-modify-write cycle that an interrupt could tear.
    pub(crate) fn set_bits(self, mask: u32) {
        Reg(self.0 + SET_ALIAS).write(mask)
    }

    /// Clears the bits in `mask`, see [Reg::set_bits].
    pub(crate) fn clear_bits(self, mask: u32) {
        Reg(self.0 + CLEAR_ALIAS).write(mask)
    }
}

/// Bits in the RESETS block's registers.
pub mod resets {
    pub const DMA: u32 = 1 << 2;
    pub const IO_BANK0: u32 = 1 << 5;
    pub const PADS_BANK0: u32 = 1 << 8;
    pub const PIO0: u32 = 1 << 10;
    pub const PIO1: u32 = 1 << 11;
    pub const PWM: u32 = 1 << 14;
    pub const TIMER: u32 = 1 << 21;

    /// Everything the driver uses, apart from the PIO blocks.
    pub const DRIVER: u32 = DMA | IO_BANK0 | PADS_BANK0 | PWM | TIMER;
}

const RESET: usize = 0x0;
const RESET_DONE: usize = 0x8;

/// Takes the peripherals in `mask` (see [resets]) out of reset, and waits until they're ready.
pub fn unreset(mask: u32) {
    reg(Block::Resets, RESET).clear_bits(mask);
    while reg(Block::Resets, RESET_DONE).read() & mask != mask {}
}
