//! Access to the PHY's management registers over MDIO.
//!
//! The management clock (MDC) is generated by hardware, and the data pin is bit-banged from the
//! MDC falling-edge interrupt: every edge shifts exactly one bit in or out, most significant bit
//! first. A transaction walks through the following phases, taking 66 edges in total:
//!
//! | Phase       | Edges | Bits                            |
//! |-------------|-------|---------------------------------|
//! | start       | 1     | `1`                             |
//! | preamble    | 32    | all ones                        |
//! | SOF         | 2     | `01`                            |
//! | opcode      | 2     | `10` (read) or `01` (write)     |
//! | PHY address | 5     |                                 |
//! | register    | 5     |                                 |
//! | turnaround  | 2     | released (read) or `10` (write) |
//! | data        | 16    | sampled (read) or driven (write)|
//! | idle        | 1     | `1`                             |
//!
//! The edge interrupt is only enabled while a transaction is in flight.

use crate::eth_mac::{Error, Result};
use crate::hal::{Clock, MdioPin, PinDirection};
use bitvec::prelude::*;
use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};
use critical_section::Mutex;
use log::trace;

/// Register numbers of the IEEE 802.3 clause 22 basic register set.
pub mod reg {
    pub const BMCR: u8 = 0;
    pub const BMSR: u8 = 1;
    pub const PHYIDR1: u8 = 2;
    pub const PHYIDR2: u8 = 3;
    pub const ANAR: u8 = 4;
    pub const ANLPAR: u8 = 5;
}

/// Bits of the basic mode control register.
pub mod bmcr {
    pub const RESET: u16 = 1 << 15;
    pub const SPEED_100: u16 = 1 << 13;
    pub const AN_ENABLE: u16 = 1 << 12;
    pub const AN_RESTART: u16 = 1 << 9;
    pub const FULL_DUPLEX: u16 = 1 << 8;
}

/// Bits of the basic mode status register.
pub mod bmsr {
    pub const AN_COMPLETE: u16 = 1 << 5;
    pub const LINK_STATUS: u16 = 1 << 2;
}

/// Bits of the auto-negotiation advertisement register.
pub mod anar {
    pub const SELECTOR_IEEE802_3: u16 = 0x0001;
    pub const TX_10_HD: u16 = 1 << 5;
    pub const TX_10_FD: u16 = 1 << 6;
    pub const TX_100_HD: u16 = 1 << 7;
    pub const TX_100_FD: u16 = 1 << 8;
}

/// The number of MDC edges a single transaction takes.
pub const EDGES_PER_TRANSACTION: usize = 66;

/// The register value that a read returns when no PHY answers: the data line is pulled up.
pub const NO_RESPONSE: u16 = 0xffff;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Read,
    Write,
}

/// The outcome of trying to start a transaction without waiting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Start {
    Started,
    /// Another transaction was still in flight, so nothing was done. Not an error.
    NotStarted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Start,
    Preamble,
    StartOfFrame,
    Opcode,
    PhyAddress,
    RegAddress,
    Turnaround,
    Data,
}

/// What to do on each edge of a phase: which bits to shift out (MSB first), for how many edges,
/// and in which direction the data pin points.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Step {
    bits: u32,
    clocks: u32,
    direction: PinDirection,
}

impl Step {
    const fn drive(bits: u32, clocks: u32) -> Step {
        Step {
            bits,
            clocks,
            direction: PinDirection::Output,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Transaction {
    phy: u8,
    reg: u8,
    op: Op,
    value: u16,
}

#[derive(Clone, Copy, Debug)]
struct CachedRead {
    phy: u8,
    reg: u8,
    value: u16,
}

/// Returns the phase that follows `phase`, along with how to clock it.
fn transition(phase: Phase, transaction: &Transaction) -> (Phase, Step) {
    let read = transaction.op == Op::Read;
    match phase {
        Phase::Start => (Phase::Preamble, Step::drive(0xffff_ffff, 32)),
        Phase::Preamble => (Phase::StartOfFrame, Step::drive(0b01, 2)),
        Phase::StartOfFrame => (
            Phase::Opcode,
            Step::drive(if read { 0b10 } else { 0b01 }, 2),
        ),
        Phase::Opcode => (
            Phase::PhyAddress,
            Step::drive(transaction.phy as u32 & 0x1f, 5),
        ),
        Phase::PhyAddress => (
            Phase::RegAddress,
            Step::drive(transaction.reg as u32 & 0x1f, 5),
        ),
        Phase::RegAddress if read => (
            Phase::Turnaround,
            Step {
                bits: 0,
                clocks: 2,
                direction: PinDirection::Input,
            },
        ),
        Phase::RegAddress => (Phase::Turnaround, Step::drive(0b10, 2)),
        Phase::Turnaround if read => (
            Phase::Data,
            Step {
                bits: 0,
                clocks: 16,
                direction: PinDirection::Input,
            },
        ),
        Phase::Turnaround => (Phase::Data, Step::drive(transaction.value as u32, 16)),
        Phase::Data | Phase::Idle => (Phase::Idle, Step::drive(1, 1)),
    }
}

/// The bus state owned by the interrupt handler while attached.
struct Machine<P> {
    pin: P,
    phase: Phase,
    step: Step,
    /// Edges left in the current phase. Zero once the final idle edge has been clocked.
    remaining: u32,
    transaction: Transaction,
    shift_in: u16,
    cache: Option<CachedRead>,
}

impl<P: MdioPin> Machine<P> {
    fn new(pin: P) -> Machine<P> {
        Machine {
            pin,
            phase: Phase::Idle,
            step: Step::drive(1, 1),
            remaining: 0,
            transaction: Transaction {
                phy: 0,
                reg: 0,
                op: Op::Read,
                value: 0,
            },
            shift_in: 0,
            cache: None,
        }
    }

    fn begin(&mut self, transaction: Transaction) {
        self.transaction = transaction;
        self.phase = Phase::Start;
        self.step = Step::drive(1, 1);
        self.remaining = self.step.clocks;
        self.shift_in = 0;
        self.pin.listen_falling_edge(true);
    }

    /// Clocks one bit. Returns true once the transaction has fully completed.
    fn edge(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }

        self.pin.set_direction(self.step.direction);
        let index = (self.remaining - 1) as usize;
        match self.step.direction {
            PinDirection::Input => {
                let bit = self.pin.read();
                if self.phase == Phase::Data {
                    self.shift_in = (self.shift_in << 1) | bit as u16;
                }
            }
            PinDirection::Output => {
                let bit = self.step.bits.view_bits::<Lsb0>()[index];
                self.pin.write(bit);
            }
        }

        self.remaining -= 1;
        if self.remaining > 0 {
            return false;
        }

        match self.phase {
            Phase::Data => self.complete_data(),
            Phase::Idle => {
                self.pin.listen_falling_edge(false);
                return true;
            }
            _ => {}
        }
        let (phase, step) = transition(self.phase, &self.transaction);
        self.phase = phase;
        self.step = step;
        self.remaining = step.clocks;
        false
    }

    fn complete_data(&mut self) {
        let Transaction { phy, reg, op, .. } = self.transaction;
        match op {
            Op::Read => {
                self.cache = Some(CachedRead {
                    phy,
                    reg,
                    value: self.shift_in,
                })
            }
            Op::Write => {
                if matches!(self.cache, Some(c) if c.phy == phy && c.reg == reg) {
                    self.cache = None;
                }
            }
        }
    }

    fn cached(&self, phy: u8, reg: u8) -> Option<u16> {
        self.cache
            .filter(|c| c.phy == phy && c.reg == reg)
            .map(|c| c.value)
    }
}

enum BusState<P> {
    Detached,
    Attached(Machine<P>),
}

/// The MDIO bus state shared between the MDC interrupt handler and the code issuing transactions.
///
/// Intended to live in a `static`, so that the interrupt handler can reach it:
///
/// ```ignore
/// static MDIO: MdioBus<GpioMdio> = MdioBus::new();
///
/// #[interrupt]
/// fn IO_IRQ_BANK0() {
///     MDIO.on_mdc_falling_edge();
/// }
/// ```
pub struct MdioBus<P> {
    state: Mutex<RefCell<BusState<P>>>,
    /// Set when a transaction starts, cleared by the interrupt handler after its idle edge.
    busy: AtomicBool,
}

impl<P: MdioPin> MdioBus<P> {
    pub const fn new() -> MdioBus<P> {
        MdioBus {
            state: Mutex::new(RefCell::new(BusState::Detached)),
            busy: AtomicBool::new(false),
        }
    }

    /// Hands the data pin to the bus and returns the handle through which transactions are issued.
    /// Fails while a previously returned handle is still alive.
    pub fn attach(&self, mut pin: P) -> Result<Mdio<'_, P>> {
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            if let BusState::Attached(_) = *state {
                return Err(Error::AlreadyAttached);
            }
            pin.set_direction(PinDirection::Output);
            pin.write(true);
            pin.listen_falling_edge(false);
            *state = BusState::Attached(Machine::new(pin));
            Ok(Mdio { bus: self })
        })
    }

    /// Must be called from the MDC falling-edge interrupt handler.
    pub fn on_mdc_falling_edge(&self) {
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            let BusState::Attached(machine) = &mut *state else {
                return;
            };
            if machine.edge() {
                self.busy.store(false, Ordering::Release);
            }
        })
    }
}

impl<P: MdioPin> Default for MdioBus<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// The handle for issuing MDIO transactions, returned by [MdioBus::attach].
///
/// At most one transaction is in flight at any time. Blocking operations wait (through the
/// provided [Clock]) for the bus to become free and for their own transaction to complete;
/// non-blocking ones never wait.
pub struct Mdio<'a, P: MdioPin> {
    bus: &'a MdioBus<P>,
}

/// Detaches (and drops) the pin, abandoning any transaction in flight, so that the bus can be
/// attached again.
impl<P: MdioPin> Drop for Mdio<'_, P> {
    fn drop(&mut self) {
        critical_section::with(|cs| {
            let mut state = self.bus.state.borrow_ref_mut(cs);
            if let BusState::Attached(machine) = &mut *state {
                machine.pin.listen_falling_edge(false);
            }
            *state = BusState::Detached;
            self.bus.busy.store(false, Ordering::Release);
        })
    }
}

impl<'a, P: MdioPin> Mdio<'a, P> {
    pub fn is_busy(&self) -> bool {
        self.bus.busy.load(Ordering::Acquire)
    }

    fn wait_idle<C: Clock>(&self, clock: &C) {
        while self.is_busy() {
            clock.delay_us(1);
        }
    }

    /// Starts a transaction if the bus is free.
    fn try_start(&self, transaction: Transaction) -> Start {
        critical_section::with(|cs| {
            if self.bus.busy.load(Ordering::Acquire) {
                return Start::NotStarted;
            }
            let mut state = self.bus.state.borrow_ref_mut(cs);
            let BusState::Attached(machine) = &mut *state else {
                return Start::NotStarted;
            };
            trace!(
                "MDIO {:?} phy {} reg {} value {:04x}",
                transaction.op,
                transaction.phy,
                transaction.reg,
                transaction.value
            );
            self.bus.busy.store(true, Ordering::Release);
            machine.begin(transaction);
            Start::Started
        })
    }

    /// Starts a transaction. If the bus is busy and `blocking` is false, returns
    /// [Start::NotStarted] without doing anything. Otherwise waits for the bus to become free,
    /// starts the transaction and, if `blocking` is true, waits for it to complete.
    pub fn start<C: Clock>(
        &self,
        clock: &C,
        phy: u8,
        reg: u8,
        value: u16,
        op: Op,
        blocking: bool,
    ) -> Start {
        let transaction = Transaction {
            phy,
            reg,
            op,
            value,
        };
        if !blocking {
            return self.try_start(transaction);
        }
        loop {
            self.wait_idle(clock);
            if self.try_start(transaction) == Start::Started {
                break;
            }
        }
        self.wait_idle(clock);
        Start::Started
    }

    /// Reads a register, waiting for the result. Returns [NO_RESPONSE] if no PHY answered.
    pub fn read<C: Clock>(&self, clock: &C, phy: u8, reg: u8) -> u16 {
        self.start(clock, phy, reg, 0, Op::Read, true);
        self.cached(phy, reg).unwrap_or(NO_RESPONSE)
    }

    /// Returns the value of the most recent completed read of this register, if it is still
    /// valid, and starts another read (if the bus is free) so that a fresh value is available
    /// next time.
    pub fn read_nonblocking(&self, phy: u8, reg: u8) -> Option<u16> {
        let cached = self.cached(phy, reg);
        self.try_start(Transaction {
            phy,
            reg,
            op: Op::Read,
            value: 0,
        });
        cached
    }

    /// Writes a register, waiting for the write to complete.
    pub fn write<C: Clock>(&self, clock: &C, phy: u8, reg: u8, value: u16) {
        self.start(clock, phy, reg, value, Op::Write, true);
    }

    /// Starts a write if the bus is free.
    pub fn write_nonblocking(&self, phy: u8, reg: u8, value: u16) -> Start {
        self.try_start(Transaction {
            phy,
            reg,
            op: Op::Write,
            value,
        })
    }

    fn cached(&self, phy: u8, reg: u8) -> Option<u16> {
        critical_section::with(|cs| match &*self.bus.state.borrow_ref(cs) {
            BusState::Attached(machine) => machine.cached(phy, reg),
            BusState::Detached => None,
        })
    }
}
