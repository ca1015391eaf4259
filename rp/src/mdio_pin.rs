//! The MDIO data pin, bit-banged through SIO, and the MDC clock, generated by a PWM slice.
//!
//! The MDIO state machine advances on every falling MDC edge, which arrives as a GPIO interrupt on
//! the MDC pin. The `IO_IRQ_BANK0` handler must acknowledge the edge with [acknowledge_mdc_edge]
//! before handing it to the bus.

use crate::regs::{reg, Block, Reg};
use rmii_mac::hal::{MdioPin, PinDirection};

const PIN_COUNT: u8 = 30;

// SIO registers.
const GPIO_IN: usize = 0x004;
const GPIO_OUT_SET: usize = 0x014;
const GPIO_OUT_CLR: usize = 0x018;
const GPIO_OE_SET: usize = 0x024;
const GPIO_OE_CLR: usize = 0x028;

// IO_BANK0 registers.
const GPIO_CTRL: usize = 0x004;
const GPIO_STRIDE: usize = 0x8;
const INTR0: usize = 0x0f0;
const PROC0_INTE0: usize = 0x100;
const FUNCSEL_MASK: u32 = 0x1f;
const FUNCSEL_PWM: u32 = 4;
const FUNCSEL_SIO: u32 = 5;
/// Within a pin's nibble of the INTR/INTE registers.
const EDGE_LOW: u32 = 1 << 2;

// PADS_BANK0 registers.
const PADS_GPIO0: usize = 0x04;
const PAD_IE: u32 = 1 << 6;
const PAD_PUE: u32 = 1 << 3;
const PAD_PDE: u32 = 1 << 2;

// PWM registers.
const PWM_CSR: usize = 0x00;
const PWM_DIV: usize = 0x04;
const PWM_CC: usize = 0x0c;
const PWM_TOP: usize = 0x10;
const PWM_SLICE_STRIDE: usize = 0x14;
const PWM_CSR_EN: u32 = 1 << 0;

/// The PWM counter runs at this rate, and wraps every [MDC_PERIOD] ticks.
const PWM_TICK_HZ: u64 = 10_000_000;
const MDC_PERIOD: u32 = 200;

fn sio(offset: usize) -> Reg {
    reg(Block::Sio, offset)
}

fn gpio_ctrl(pin: u8) -> Reg {
    reg(Block::IoBank0, GPIO_CTRL + pin as usize * GPIO_STRIDE)
}

fn pad(pin: u8) -> Reg {
    reg(Block::PadsBank0, PADS_GPIO0 + 4 * pin as usize)
}

fn select_function(pin: u8, function: u32) {
    gpio_ctrl(pin).write(gpio_ctrl(pin).read() & !FUNCSEL_MASK | function);
}

/// The register (at `base`) and mask for the falling-edge event of `pin`.
fn edge_event(base: usize, pin: u8) -> (Reg, u32) {
    let register = reg(Block::IoBank0, base + 4 * (pin as usize / 8));
    (register, EDGE_LOW << (4 * (pin % 8)))
}

/// Clears a pending falling-edge interrupt on the MDC pin.
pub fn acknowledge_mdc_edge(mdc_pin: u8) {
    let (intr, mask) = edge_event(INTR0, mdc_pin);
    intr.write(mask);
}

/// Starts a 50 kHz clock on `mdc_pin`, given the system clock frequency.
pub fn start_mdc_clock(mdc_pin: u8, sys_clk_hz: u32) {
    let slice = (mdc_pin as usize >> 1) & 7;
    let slice_reg = |offset| reg(Block::Pwm, slice * PWM_SLICE_STRIDE + offset);

    // The divider is in 8.4 fixed point.
    let divider = (sys_clk_hz as u64 * 16 / PWM_TICK_HZ).clamp(16, 0xfff) as u32;
    slice_reg(PWM_CSR).write(0);
    slice_reg(PWM_DIV).write(divider);
    slice_reg(PWM_TOP).write(MDC_PERIOD - 1);
    // Odd pins are the slice's B channel, whose compare value sits in the upper half.
    let duty = MDC_PERIOD / 2;
    let compare = if mdc_pin & 1 == 1 { duty << 16 } else { duty };
    slice_reg(PWM_CC).write(compare);

    // Input stays enabled, so the edges can still be detected.
    pad(mdc_pin).set_bits(PAD_IE);
    select_function(mdc_pin, FUNCSEL_PWM);
    slice_reg(PWM_CSR).write(PWM_CSR_EN);
}

/// The MDIO pin. Idles as an input, pulled up.
pub struct GpioMdio {
    mdio_mask: u32,
    mdc_pin: u8,
}

impl GpioMdio {
    /// Returns `None` if either pin number is out of range.
    pub fn new(mdio_pin: u8, mdc_pin: u8) -> Option<GpioMdio> {
        if mdio_pin >= PIN_COUNT || mdc_pin >= PIN_COUNT {
            return None;
        }
        let mdio_mask = 1 << mdio_pin;
        sio(GPIO_OE_CLR).write(mdio_mask);
        sio(GPIO_OUT_SET).write(mdio_mask);
        pad(mdio_pin).clear_bits(PAD_PDE);
        pad(mdio_pin).set_bits(PAD_IE | PAD_PUE);
        select_function(mdio_pin, FUNCSEL_SIO);
        Some(GpioMdio { mdio_mask, mdc_pin })
    }
}

impl MdioPin for GpioMdio {
    fn set_direction(&mut self, direction: PinDirection) {
        match direction {
            PinDirection::Output => sio(GPIO_OE_SET).write(self.mdio_mask),
            PinDirection::Input => sio(GPIO_OE_CLR).write(self.mdio_mask),
        }
    }

    fn write(&mut self, bit: bool) {
        if bit {
            sio(GPIO_OUT_SET).write(self.mdio_mask);
        } else {
            sio(GPIO_OUT_CLR).write(self.mdio_mask);
        }
    }

    fn read(&mut self) -> bool {
        sio(GPIO_IN).read() & self.mdio_mask != 0
    }

    fn listen_falling_edge(&mut self, enable: bool) {
        let (inte, mask) = edge_event(PROC0_INTE0, self.mdc_pin);
        if enable {
            // An edge latched while nobody was listening would advance the bus too early.
            acknowledge_mdc_edge(self.mdc_pin);
            inte.set_bits(mask);
        } else {
            inte.clear_bits(mask);
        }
    }
}
