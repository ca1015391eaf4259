//! The PIO state machines running the RMII programs, as far as the DMA chains and the end-of-frame
//! interrupt are concerned: their FIFOs, their DMA request lines and their interrupt flags.

use crate::regs::{reg, Block};

const TXF0: usize = 0x010;
const RXF0: usize = 0x020;
const IRQ: usize = 0x030;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pio {
    Pio0,
    Pio1,
}

impl Pio {
    fn block(self) -> Block {
        match self {
            Pio::Pio0 => Block::Pio0,
            Pio::Pio1 => Block::Pio1,
        }
    }

    /// The DREQ number of the block's first TX FIFO.
    fn dreq_base(self) -> u32 {
        match self {
            Pio::Pio0 => 0,
            Pio::Pio1 => 8,
        }
    }

    /// Clears the state-machine interrupt `flag` (0 through 7). The end-of-frame interrupt routine
    /// must call this for the flag the RX program raises, before returning.
    pub fn clear_irq(self, flag: u8) {
        reg(self.block(), IRQ).write(1 << (flag & 7));
    }
}

/// A state machine within a PIO block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateMachine {
    pio: Pio,
    index: u8,
}

impl StateMachine {
    /// Returns `None` if `index` isn't one of the block's four state machines.
    pub fn new(pio: Pio, index: u8) -> Option<StateMachine> {
        (index < 4).then_some(StateMachine { pio, index })
    }

    pub fn pio(&self) -> Pio {
        self.pio
    }

    // The RMII programs shift bytes in and out through the most significant byte of each FIFO word,
    // hence the byte-wide DMA transfers target the word's last byte.

    pub(crate) fn rx_fifo_address(&self) -> usize {
        reg(self.pio.block(), RXF0 + 4 * self.index as usize).address() + 3
    }

    pub(crate) fn tx_fifo_address(&self) -> usize {
        reg(self.pio.block(), TXF0 + 4 * self.index as usize).address() + 3
    }

    pub(crate) fn rx_dreq(&self) -> u32 {
        self.pio.dreq_base() + 4 + self.index as u32
    }

    pub(crate) fn tx_dreq(&self) -> u32 {
        self.pio.dreq_base() + self.index as u32
    }
}
