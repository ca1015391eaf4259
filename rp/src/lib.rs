//! The RP2040 side of the `rmii_mac` driver: DMA chains, the CRC sniffer, the MDIO pin and the
//! timer, implementing the traits in [rmii_mac::hal].
//!
//! Loading the RMII PIO programs and setting up the clocks is left to the board support code. The
//! two interrupt routines the driver depends on look like this:
//!
//! ```ignore
//! #[interrupt]
//! fn PIO0_IRQ_0() {
//!     Pio::Pio0.clear_irq(RX_END_FLAG);
//!     FRAME_END.lock(|frame_end| frame_end.on_frame_end());
//! }
//!
//! #[interrupt]
//! fn IO_IRQ_BANK0() {
//!     acknowledge_mdc_edge(MDC_PIN);
//!     MDIO.on_mdc_falling_edge();
//! }
//! ```
#![no_std]

pub mod dma;
pub mod mdio_pin;
pub mod pio;
mod regs;
pub mod timer;

pub use regs::{resets, unreset};
