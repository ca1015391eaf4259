//! The hardware seam: traits that chip-specific code implements so that the MAC can drive DMA
//! channels, the MDIO pins and a clock without knowing which chip it runs on.
//!
//! DMA chains are treated as autonomous actors. The MAC describes a chain once, using a
//! plain-old-data [ChainPlan], and the hardware then keeps running it without any further CPU
//! involvement. The MAC only ever looks at a chain again to read its current address (a
//! [DmaCursor]) or, for the TX chain, to check whether it is busy and to restart it.

/// One side of a DMA transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endpoint {
    /// The byte-wide FIFO of the RMII receive or transmit state machine. The address never
    /// increments, and transfers are paced by the state machine's data request signal.
    Fifo,
    /// A ring buffer of `1 << size_log2` bytes starting at `base`, which must be aligned to the
    /// ring size. The address increments and wraps around at the ring boundary.
    Ring { base: usize, size_log2: u32 },
}

/// What a chain does once its transfer count is exhausted. The policy is data that the hardware
/// reads, not code that it calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reload {
    /// Re-arm the same transfer with a fresh count of `count`, continuing at the current
    /// addresses, so that the transfer never stalls waiting for software.
    Rearm { count: u32 },
    /// Fetch the next transfer count from a ring of 32-bit commands at `base`
    /// (`1 << size_log2` bytes, aligned to its size). A zero command halts the chain.
    Commands { base: usize, size_log2: u32 },
}

/// A complete description of a self-chaining DMA transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainPlan {
    pub source: Endpoint,
    pub destination: Endpoint,
    /// The initial transfer count, in bytes.
    pub count: u32,
    pub reload: Reload,
}

/// Gives access to the current ring address of a running DMA chain: the write address for a
/// receive chain, the read address for a transmit chain.
pub trait DmaCursor {
    /// Returns the raw address. Callers reduce it to a ring offset with the ring's mask, which is
    /// valid because rings are aligned to their size.
    fn address(&self) -> usize;
}

/// The DMA chain that moves bytes from the RMII receive FIFO into the RX arena.
pub trait RxDma {
    /// A handle through which the frame-end interrupt handler can read the write address.
    type Cursor: DmaCursor;

    /// Configures the chain described by `plan` and starts it. Reception continues
    /// autonomously from then on.
    fn arm(&mut self, plan: &ChainPlan);

    /// Returns a cursor for the chain's write address.
    fn cursor(&self) -> Self::Cursor;
}

/// The DMA chain that feeds formatted frames from the TX arena to the RMII transmit FIFO, one
/// command at a time. The cursor is the data channel's read address.
pub trait TxDma: DmaCursor {
    /// Configures the chain described by `plan`, without starting it.
    fn arm(&mut self, plan: &ChainPlan);

    /// Returns whether the data channel is currently moving a frame.
    fn is_busy(&self) -> bool;

    /// Restarts a halted chain by pointing its command fetch at `command_address`, which must be
    /// the address of a slot in the command ring.
    fn trigger(&mut self, command_address: usize);
}

/// How a [SniffDma] transfer increments its addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CopyMode {
    /// Both addresses increment.
    Copy,
    /// The source address stays fixed, e.g. to fill a region with a single byte value.
    Fill,
    /// The destination address stays fixed, e.g. to only run bytes through the CRC sniffer.
    Drain,
}

/// A memory-to-memory DMA channel with CRC32 sniffing enabled.
pub trait SniffDma {
    /// Blocks until the previously started transfer (if any) has finished.
    fn wait(&mut self);

    /// Sets the sniffer's accumulator. Must only be called while the channel is idle.
    fn reset_sniffer(&mut self, seed: u32);

    /// Starts a byte-wide transfer of `len` bytes and returns without waiting for it to finish.
    ///
    /// # Safety
    ///
    /// `src` must be valid for reads and `dst` for writes of `len` bytes (a single byte on the
    /// side that does not increment, see [CopyMode]), and must stay so until [SniffDma::wait]
    /// has returned.
    unsafe fn start(&mut self, src: *const u8, dst: *mut u8, len: usize, mode: CopyMode);

    /// Returns the sniffer's accumulator. Must only be called while the channel is idle.
    fn sniffed(&self) -> u32;
}

/// Direction of the MDIO data pin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PinDirection {
    Input,
    Output,
}

/// The MDIO data pin, plus control over the falling-edge interrupt of the MDC clock pin.
pub trait MdioPin {
    fn set_direction(&mut self, direction: PinDirection);

    /// Drives the pin. Only has an effect while the pin is an output.
    fn write(&mut self, bit: bool);

    /// Samples the pin.
    fn read(&mut self) -> bool;

    /// Enables or disables the MDC falling-edge interrupt. The interrupt routine must call
    /// [crate::mdio::MdioBus::on_mdc_falling_edge].
    fn listen_falling_edge(&mut self, enable: bool);
}

/// A monotonic microsecond clock that can also be used to wait.
///
/// Every wait inside the MAC goes through [Clock::delay_us], which makes it the single place
/// where a hosted target can yield to a scheduler instead of spinning.
pub trait Clock {
    fn now_us(&self) -> u64;

    fn delay_us(&self, us: u32);

    fn delay_ms(&self, ms: u32) {
        for _ in 0..ms {
            self.delay_us(1000);
        }
    }
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now_us(&self) -> u64 {
        (**self).now_us()
    }

    fn delay_us(&self, us: u32) {
        (**self).delay_us(us)
    }

    fn delay_ms(&self, ms: u32) {
        (**self).delay_ms(ms)
    }
}
