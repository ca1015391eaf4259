//! A simulated board for host tests: DMA chains that read and write the real arenas, a CRC sniffer
//! channel, a PHY that speaks MDIO bit by bit, and a clock whose delays are the only thing that
//! makes the simulated hardware progress.

use crate::hal::{
    ChainPlan, Clock, CopyMode, DmaCursor, Endpoint, MdioPin, PinDirection, Reload, RxDma,
    SniffDma, TxDma,
};
use crate::mdio::{bmcr, bmsr, reg, MdioBus};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};

/// The MDC period, for a 50 kHz management clock.
pub const MDC_PERIOD_US: u64 = 20;
/// How many bytes the transmitter consumes per microsecond, at 100 Mbit/s.
pub const DEFAULT_TX_BYTES_PER_US: usize = 12;

/// The PHY's identifier registers (a LAN8720A).
const PHY_ID: [u16; 2] = [0x0007, 0xc0f1];

/// Returns `len` bytes of frame data derived from `seed`.
pub fn frame_data(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| seed.wrapping_mul(31).wrapping_add((i as u8).wrapping_mul(7)) ^ (i >> 8) as u8)
        .collect()
}

/// Returns a `len`-byte frame (including a valid FCS) with data derived from `seed`.
pub fn frame_with_fcs(len: usize, seed: u8) -> Vec<u8> {
    let mut frame = frame_data(len - 4, seed);
    let fcs = crc32fast::hash(&frame);
    frame.extend_from_slice(&fcs.to_le_bytes());
    frame
}

/// A CRC sniffing copy channel that performs transfers synchronously.
pub struct SimSniffDma {
    hasher: crc32fast::Hasher,
    pub transfers: usize,
}

impl SimSniffDma {
    pub fn new() -> SimSniffDma {
        SimSniffDma {
            hasher: crc32fast::Hasher::new(),
            transfers: 0,
        }
    }
}

impl SniffDma for SimSniffDma {
    fn wait(&mut self) {}

    fn reset_sniffer(&mut self, seed: u32) {
        // The hasher's initial value is a finalized (complemented) CRC.
        self.hasher = crc32fast::Hasher::new_with_initial(!seed);
    }

    unsafe fn start(&mut self, src: *const u8, dst: *mut u8, len: usize, mode: CopyMode) {
        self.transfers += 1;
        for i in 0..len {
            let (from, to) = match mode {
                CopyMode::Copy => (src.add(i), dst.add(i)),
                CopyMode::Fill => (src, dst.add(i)),
                CopyMode::Drain => (src.add(i), dst),
            };
            let byte = from.read();
            to.write(byte);
            self.hasher.update(&[byte]);
        }
    }

    fn sniffed(&self) -> u32 {
        !self.hasher.clone().finalize()
    }
}

/// A decoded MDIO transaction, as seen by the PHY.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MdioFrame {
    pub edges: usize,
    pub opcode: u8,
    pub phy: u8,
    pub reg: u8,
    pub data: u16,
}

// Bit positions within an MDIO transaction.
const OPCODE_AT: usize = 35;
const PHY_AT: usize = 37;
const REG_AT: usize = 42;
const TURNAROUND_AT: usize = 47;
const DATA_AT: usize = 49;

struct PhyModel {
    address: Option<u8>,
    registers: [u16; 32],
    link_up: bool,
    direction: PinDirection,
    listening: bool,
    /// The bits on the wire during the current transaction, one per edge.
    bits: Vec<bool>,
    frames: Vec<MdioFrame>,
    resets: usize,
}

impl PhyModel {
    fn new(address: Option<u8>) -> PhyModel {
        let mut registers = [0; 32];
        registers[reg::BMCR as usize] = bmcr::SPEED_100 | bmcr::AN_ENABLE;
        registers[reg::PHYIDR1 as usize] = PHY_ID[0];
        registers[reg::PHYIDR2 as usize] = PHY_ID[1];
        registers[reg::ANAR as usize] = 0x01e1;
        PhyModel {
            address,
            registers,
            link_up: false,
            direction: PinDirection::Output,
            listening: false,
            bits: Vec::new(),
            frames: Vec::new(),
            resets: 0,
        }
    }

    /// Decodes `len` bits starting at `at`, MSB first. Missing bits read as ones.
    fn field(&self, at: usize, len: usize) -> u32 {
        (at..at + len).fold(0, |acc, i| {
            (acc << 1) | self.bits.get(i).copied().unwrap_or(true) as u32
        })
    }

    fn addressed(&self) -> bool {
        self.address == Some(self.field(PHY_AT, 5) as u8)
    }

    fn register(&self, number: u8) -> u16 {
        let value = self.registers[number as usize & 0x1f];
        if number == reg::BMSR {
            let link = if self.link_up {
                bmsr::LINK_STATUS | bmsr::AN_COMPLETE
            } else {
                0
            };
            0x7809 | link
        } else {
            value
        }
    }

    /// The level on the data line when the MAC samples it.
    fn respond(&self) -> bool {
        let position = self.bits.len();
        let reading = self.field(OPCODE_AT, 2) == 0b10 && self.addressed();
        if !reading || position < TURNAROUND_AT || position >= DATA_AT + 16 {
            return true;
        }
        if position < DATA_AT {
            // The PHY drives the second turnaround bit low.
            return position == TURNAROUND_AT;
        }
        let value = self.register(self.field(REG_AT, 5) as u8);
        (value >> (15 - (position - DATA_AT))) & 1 != 0
    }

    fn listen(&mut self, enable: bool) {
        if enable {
            self.bits.clear();
        } else if self.listening {
            self.finish();
        }
        self.listening = enable;
    }

    fn finish(&mut self) {
        let frame = MdioFrame {
            edges: self.bits.len(),
            opcode: self.field(OPCODE_AT, 2) as u8,
            phy: self.field(PHY_AT, 5) as u8,
            reg: self.field(REG_AT, 5) as u8,
            data: self.field(DATA_AT, 16) as u16,
        };
        if frame.opcode == 0b01 && self.addressed() {
            let mut value = frame.data;
            if frame.reg == reg::BMCR && value & bmcr::RESET != 0 {
                self.resets += 1;
                value &= !bmcr::RESET;
            }
            self.registers[frame.reg as usize] = value;
        }
        self.frames.push(frame);
        self.bits.clear();
    }
}

fn ring(endpoint: Endpoint) -> (usize, usize) {
    match endpoint {
        Endpoint::Ring { base, size_log2 } => (base, (1 << size_log2) - 1),
        Endpoint::Fifo => panic!("not a ring endpoint"),
    }
}

fn wrap(base: usize, mask: usize, address: usize, by: usize) -> usize {
    base | (address.wrapping_add(by) & mask)
}

#[derive(Default)]
struct RxModel {
    plan: Option<ChainPlan>,
    write_address: usize,
}

struct TxModel {
    plan: Option<ChainPlan>,
    read_address: usize,
    command_address: usize,
    remaining: usize,
    busy: bool,
    bytes_per_us: usize,
    current: Vec<u8>,
    wire: Vec<Vec<u8>>,
    triggers: usize,
}

impl TxModel {
    fn plan(&self) -> ChainPlan {
        self.plan.expect("TX chain not armed")
    }

    fn fetch(&mut self) {
        let Reload::Commands { base, size_log2 } = self.plan().reload else {
            panic!("TX chain without a command ring");
        };
        let command = unsafe { &*(self.command_address as *const AtomicU32) };
        let length = command.load(Ordering::Acquire) as usize;
        self.command_address = wrap(base, (1 << size_log2) - 1, self.command_address, 4);
        if length == 0 {
            self.busy = false;
        } else {
            self.remaining = length;
            self.busy = true;
        }
    }

    fn progress(&mut self, us: u32) {
        let mut budget = us as usize * self.bytes_per_us;
        while self.busy && budget > 0 {
            let (base, mask) = ring(self.plan().source);
            let byte = unsafe { (self.read_address as *const u8).read_volatile() };
            self.current.push(byte);
            self.read_address = wrap(base, mask, self.read_address, 1);
            self.remaining -= 1;
            budget -= 1;
            if self.remaining == 0 {
                self.wire.push(core::mem::take(&mut self.current));
                self.fetch();
            }
        }
    }
}

struct Shared {
    now_us: Cell<u64>,
    rx: RefCell<RxModel>,
    tx: RefCell<TxModel>,
    phy: RefCell<PhyModel>,
}

/// The simulated board. Cheap to clone; all clones share the same hardware.
#[derive(Clone)]
pub struct SimBoard {
    shared: Rc<Shared>,
}

impl SimBoard {
    fn with_phy(address: Option<u8>) -> SimBoard {
        SimBoard {
            shared: Rc::new(Shared {
                now_us: Cell::new(0),
                rx: RefCell::new(RxModel::default()),
                tx: RefCell::new(TxModel {
                    plan: None,
                    read_address: 0,
                    command_address: 0,
                    remaining: 0,
                    busy: false,
                    bytes_per_us: DEFAULT_TX_BYTES_PER_US,
                    current: Vec::new(),
                    wire: Vec::new(),
                    triggers: 0,
                }),
                phy: RefCell::new(PhyModel::new(address)),
            }),
        }
    }

    /// A board whose PHY answers on management address `address` only.
    pub fn with_phy_at(address: u8) -> SimBoard {
        Self::with_phy(Some(address))
    }

    /// A board with no PHY attached to the management bus.
    pub fn without_phy() -> SimBoard {
        Self::with_phy(None)
    }

    pub fn mdio_pin(&self) -> SimMdioPin {
        SimMdioPin {
            board: self.clone(),
        }
    }

    pub fn rx_dma(&self) -> SimRxDma {
        SimRxDma {
            board: self.clone(),
        }
    }

    pub fn tx_dma(&self) -> SimTxDma {
        SimTxDma {
            board: self.clone(),
        }
    }

    /// A clock that delivers MDC edges to `mdio` (if given) while its edge interrupt is enabled.
    pub fn clock<'a>(&self, mdio: Option<&'a MdioBus<SimMdioPin>>) -> SimClock<'a> {
        SimClock {
            board: self.clone(),
            mdio,
        }
    }

    pub fn set_link(&self, up: bool) {
        self.shared.phy.borrow_mut().link_up = up;
    }

    pub fn phy_register(&self, number: u8) -> u16 {
        self.shared.phy.borrow().register(number)
    }

    pub fn phy_resets(&self) -> usize {
        self.shared.phy.borrow().resets
    }

    pub fn mdio_frames(&self) -> Vec<MdioFrame> {
        self.shared.phy.borrow().frames.clone()
    }

    pub fn mdio_listening(&self) -> bool {
        self.shared.phy.borrow().listening
    }

    pub fn rx_plan(&self) -> Option<ChainPlan> {
        self.shared.rx.borrow().plan
    }

    pub fn tx_plan(&self) -> Option<ChainPlan> {
        self.shared.tx.borrow().plan
    }

    /// Lets the RX chain write `bytes` into the RX arena, as if they had arrived on the wire.
    pub fn receive(&self, bytes: &[u8]) {
        let mut rx = self.shared.rx.borrow_mut();
        let plan = rx.plan.expect("RX chain not armed");
        let (base, mask) = ring(plan.destination);
        for &byte in bytes {
            unsafe { (rx.write_address as *mut u8).write_volatile(byte) };
            rx.write_address = wrap(base, mask, rx.write_address, 1);
        }
    }

    pub fn set_tx_rate(&self, bytes_per_us: usize) {
        self.shared.tx.borrow_mut().bytes_per_us = bytes_per_us;
    }

    pub fn tx_busy(&self) -> bool {
        self.shared.tx.borrow().busy
    }

    pub fn tx_triggers(&self) -> usize {
        self.shared.tx.borrow().triggers
    }

    /// Returns (and forgets) the frames the transmitter has sent so far, without their length
    /// header but including the FCS. Checks each header along the way.
    pub fn take_transmitted(&self) -> Vec<Vec<u8>> {
        let wire = core::mem::take(&mut self.shared.tx.borrow_mut().wire);
        wire.into_iter()
            .map(|raw| {
                let header = u16::from_le_bytes([raw[0], raw[1]]) as usize;
                let frame = raw[2..].to_vec();
                assert_eq!(header, frame.len() * 4 - 1, "bad length header");
                frame
            })
            .collect()
    }
}

pub struct SimMdioPin {
    board: SimBoard,
}

impl MdioPin for SimMdioPin {
    fn set_direction(&mut self, direction: PinDirection) {
        self.board.shared.phy.borrow_mut().direction = direction;
    }

    fn write(&mut self, bit: bool) {
        let mut phy = self.board.shared.phy.borrow_mut();
        if phy.listening && phy.direction == PinDirection::Output {
            phy.bits.push(bit);
        }
    }

    fn read(&mut self) -> bool {
        let mut phy = self.board.shared.phy.borrow_mut();
        let bit = phy.respond();
        if phy.listening {
            phy.bits.push(bit);
        }
        bit
    }

    fn listen_falling_edge(&mut self, enable: bool) {
        self.board.shared.phy.borrow_mut().listen(enable);
    }
}

pub struct SimRxDma {
    board: SimBoard,
}

pub struct SimRxCursor {
    board: SimBoard,
}

impl DmaCursor for SimRxCursor {
    fn address(&self) -> usize {
        self.board.shared.rx.borrow().write_address
    }
}

impl RxDma for SimRxDma {
    type Cursor = SimRxCursor;

    fn arm(&mut self, plan: &ChainPlan) {
        let mut rx = self.board.shared.rx.borrow_mut();
        rx.plan = Some(*plan);
        rx.write_address = ring(plan.destination).0;
    }

    fn cursor(&self) -> SimRxCursor {
        SimRxCursor {
            board: self.board.clone(),
        }
    }
}

pub struct SimTxDma {
    board: SimBoard,
}

impl DmaCursor for SimTxDma {
    fn address(&self) -> usize {
        self.board.shared.tx.borrow().read_address
    }
}

impl TxDma for SimTxDma {
    fn arm(&mut self, plan: &ChainPlan) {
        let mut tx = self.board.shared.tx.borrow_mut();
        tx.plan = Some(*plan);
        tx.read_address = ring(plan.source).0;
        if let Reload::Commands { base, .. } = plan.reload {
            tx.command_address = base;
        }
        tx.busy = false;
    }

    fn is_busy(&self) -> bool {
        self.board.shared.tx.borrow().busy
    }

    fn trigger(&mut self, command_address: usize) {
        let mut tx = self.board.shared.tx.borrow_mut();
        tx.triggers += 1;
        tx.command_address = command_address;
        tx.fetch();
    }
}

/// Simulated time. Waiting is what drives the MDC edges and the transmitter.
pub struct SimClock<'a> {
    board: SimBoard,
    mdio: Option<&'a MdioBus<SimMdioPin>>,
}

impl Clock for SimClock<'_> {
    fn now_us(&self) -> u64 {
        self.board.shared.now_us.get()
    }

    fn delay_us(&self, us: u32) {
        let before = self.board.shared.now_us.get();
        let after = before + us as u64;
        self.board.shared.now_us.set(after);

        if let Some(mdio) = self.mdio {
            for _ in 0..(after / MDC_PERIOD_US - before / MDC_PERIOD_US) {
                if !self.board.mdio_listening() {
                    break;
                }
                mdio.on_mdc_falling_edge();
            }
        }
        self.board.shared.tx.borrow_mut().progress(us);
    }
}
