//! Implements an Ethernet MAC on top of an RMII PHY: bringing up the PHY over MDIO, queueing
//! outgoing frames for the TX DMA chain, validating and delivering the frames the RX DMA chain
//! captured, and keeping the network stack informed about the link state.
//!
//! [Mac] ties the halves together. It is created once by [Mac::new], which also returns the
//! [FrameEndHandler] that the end-of-frame interrupt routine must call, and is then driven by
//! calling [Mac::poll] from the main loop.

pub mod rx;
pub mod smoltcp;
pub mod tx;

use crate::crc::CrcEngine;
use crate::debug_util::FormatMacAddress;
use crate::hal::{Clock, DmaCursor, MdioPin, RxDma, TxDma};
use crate::mdio::{anar, bmcr, bmsr, reg, Mdio, MdioBus, Start, NO_RESPONSE};
use crate::netif::NetStack;
use crate::ring::{Arena, ArenaStorage, CommandStorage};
use core::fmt;
use log::{debug, info, warn};
use rx::{rx_plan, FrameEndHandler, RxDrain, RxQueue, RxStats, RX_QUEUE_LEN};
use tx::{Transmitter, TxStats};

/// The minimum size of an Ethernet frame. 64 equals 12 bytes of destination and source addresses, 2
/// bytes of EtherType, 46 bytes of payload, and 4 bytes of FCS (we don't support 802.1q-tagged
/// frames).
pub const MIN_FRAME_SIZE: usize = 64;
/// The maximum size of an Ethernet frame. 1518 equals 12 bytes of destination and source addresses,
/// 2 bytes of EtherType, 1500 bytes of payload, and 4 bytes of FCS (we don't support 802.1q-tagged
/// frames).
pub const MAX_FRAME_SIZE: usize = 1518;
/// The length of a frame's FCS sequence, in bytes.
pub const FCS_SIZE: usize = 4;
/// The minimum amount of frame data handed to the TX chain. Shorter frames are zero-padded.
pub const MIN_PAYLOAD_SIZE: usize = MIN_FRAME_SIZE - FCS_SIZE;
/// The maximum amount of frame data (addresses, EtherType and payload) that can be sent or
/// received.
pub const MAX_PAYLOAD_SIZE: usize = MAX_FRAME_SIZE - FCS_SIZE;
/// The length of the header that precedes every frame in the TX arena.
pub const TX_HEADER_SIZE: usize = 2;

/// The number of addresses on the MDIO bus.
const PHY_ADDRESS_COUNT: u8 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// No PHY answered on any MDIO address during initialization.
    NoPhyFound,
    /// A ring's length isn't a power of two, or its base isn't aligned to its length.
    InvalidRing,
    /// The RX descriptor queue can't describe an RX arena full of minimum-sized frames.
    RxQueueTooSmall,
    /// The TX command ring can't describe a TX arena full of minimum-sized frames.
    CommandRingTooSmall,
    /// An [RxQueue] can only be split once.
    AlreadySplit,
    /// An [MdioBus] can only have one handle attached at a time.
    AlreadyAttached,
    /// The frame is longer than [MAX_PAYLOAD_SIZE].
    FrameTooLarge { len: usize },
    /// There's no space for the frame in the TX arena right now.
    TxRingFull,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NoPhyFound => f.write_str("no PHY responded on the MDIO bus"),
            Error::InvalidRing => f.write_str("ring is not a size-aligned power of two"),
            Error::RxQueueTooSmall => f.write_str("RX descriptor queue too small for the arena"),
            Error::CommandRingTooSmall => f.write_str("TX command ring too small for the arena"),
            Error::AlreadySplit => f.write_str("RX queue already split"),
            Error::AlreadyAttached => f.write_str("MDIO bus already attached"),
            Error::FrameTooLarge { len } => {
                write!(f, "frame of {len} bytes exceeds {MAX_PAYLOAD_SIZE} bytes")
            }
            Error::TxRingFull => f.write_str("TX ring full"),
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;

/// Derives a locally-unique MAC address from a board's 64-bit unique ID, using the Raspberry Pi
/// Foundation's OUI.
pub fn mac_address_from_unique_id(id: &[u8; 8]) -> [u8; 6] {
    [0xb8, 0x27, 0xeb, id[5], id[6], id[7]]
}

/// Tunables for [Mac::new].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacOptions {
    /// Use the PHY at this MDIO address instead of probing for one.
    pub phy_address: Option<u8>,
    /// Soft-reset the PHY through its control register before configuring it. Meant for boards
    /// on which the PHY's reset pin isn't under our control.
    pub soft_reset: bool,
    /// The value written to the PHY's auto-negotiation advertisement register. The RMII state
    /// machines only run at 100 Mbit/s, so the default only advertises 100BASE-TX.
    pub advertisement: u16,
    /// How often to sample the link status.
    pub link_poll_interval_ms: u32,
    /// How long to give the PHY to wake up before probing for it.
    pub phy_wakeup_ms: u32,
    /// The board's unique ID, from which the MAC address is derived (see
    /// [mac_address_from_unique_id]).
    pub unique_id: [u8; 8],
    /// Use this MAC address instead of deriving one from `unique_id`.
    pub mac_address: Option<[u8; 6]>,
}

impl Default for MacOptions {
    fn default() -> Self {
        MacOptions {
            phy_address: None,
            soft_reset: false,
            advertisement: anar::SELECTOR_IEEE802_3 | anar::TX_100_HD | anar::TX_100_FD,
            link_poll_interval_ms: 500,
            phy_wakeup_ms: 100,
            unique_id: [0; 8],
            mac_address: None,
        }
    }
}

/// Everything [Mac::new] needs: the memory the rings live in, the hardware resources it takes
/// ownership of, and the tunables.
pub struct MacConfig<'a, R, T, P, C, E, const N: usize = RX_QUEUE_LEN> {
    pub rx_storage: &'a ArenaStorage,
    pub tx_storage: &'a ArenaStorage,
    pub commands: &'a CommandStorage,
    pub rx_queue: &'a RxQueue<N>,
    pub rx_dma: R,
    pub tx_dma: T,
    /// The bus the MDC interrupt routine forwards its edges to.
    pub mdio: &'a MdioBus<P>,
    pub mdio_pin: P,
    pub clock: C,
    pub crc: E,
    pub options: MacOptions,
}

/// The combined receive and transmit stats.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacStats {
    pub rx: RxStats,
    pub tx: TxStats,
}

/// The main entry point of this crate. See the module docs.
pub struct Mac<'a, R, T, P: MdioPin, C, E, const N: usize = RX_QUEUE_LEN> {
    rx_dma: R,
    rx_arena: Arena<'a>,
    rx: RxDrain<'a, N>,
    tx: Transmitter<'a, T>,
    mdio: Mdio<'a, P>,
    clock: C,
    crc: E,
    phy_address: u8,
    mac_address: [u8; 6],
    options: MacOptions,
    next_link_poll_us: u64,
}

impl<'a, R, T, P, C, E, const N: usize> Mac<'a, R, T, P, C, E, N>
where
    R: RxDma,
    T: TxDma,
    P: MdioPin,
    C: Clock,
    E: CrcEngine,
{
    /// Finds and configures the PHY, then prepares the (idle) TX chain and starts the RX chain.
    ///
    /// Returns the [Mac] along with the handler for the end-of-frame interrupt. The interrupt
    /// should be enabled by the caller after this method returns. Fails with
    /// [Error::NoPhyFound] if no PHY answers, in which case neither DMA chain has been touched
    /// and the MDIO bus and RX queue are free to be used by another attempt.
    pub fn new(
        config: MacConfig<'a, R, T, P, C, E, N>,
    ) -> Result<(Self, FrameEndHandler<'a, R::Cursor, N>)> {
        let MacConfig {
            rx_storage,
            tx_storage,
            commands,
            rx_queue,
            mut rx_dma,
            tx_dma,
            mdio,
            mdio_pin,
            clock,
            crc,
            options,
        } = config;

        let rx_arena = Arena::new(rx_storage);
        // Up to one descriptor per minimum-sized frame can be outstanding before the oldest frame's
        // data is overwritten.
        if rx_queue.capacity() < rx_arena.len() / MIN_FRAME_SIZE {
            return Err(Error::RxQueueTooSmall);
        }

        let mdio = mdio.attach(mdio_pin)?;
        clock.delay_ms(options.phy_wakeup_ms);
        let phy_address = match options.phy_address {
            Some(address) => address,
            None => probe_phy(&mdio, &clock).ok_or_else(|| {
                warn!("No PHY responded on any of the {PHY_ADDRESS_COUNT} MDIO addresses");
                Error::NoPhyFound
            })?,
        };
        info!("Using PHY at MDIO address {phy_address}");
        configure_phy(&mdio, &clock, phy_address, &options);

        let tx = Transmitter::new(Arena::new(tx_storage), commands, tx_dma)?;
        rx_dma.arm(&rx_plan(&rx_arena));
        let (frame_end, rx) = rx_queue.split(rx_dma.cursor(), &rx_arena)?;

        let mac_address = options
            .mac_address
            .unwrap_or_else(|| mac_address_from_unique_id(&options.unique_id));
        let next_link_poll_us = clock.now_us();
        Ok((
            Mac {
                rx_dma,
                rx_arena,
                rx,
                tx,
                mdio,
                clock,
                crc,
                phy_address,
                mac_address,
                options,
                next_link_poll_us,
            },
            frame_end,
        ))
    }

    /// Queues a frame consisting of the concatenated `segments` (addresses, EtherType and
    /// payload, without FCS). Blocks while the TX arena is full.
    pub fn send(&mut self, segments: &[&[u8]]) -> Result<()> {
        self.tx.send(segments, &mut self.crc, &self.clock)
    }

    /// Like [Mac::send], but returns [Error::TxRingFull] rather than blocking.
    pub fn try_send(&mut self, segments: &[&[u8]]) -> Result<()> {
        self.tx.try_send(segments, &mut self.crc, &self.clock)
    }

    /// Queues a frame of `len` bytes produced by `f`. Blocks while the TX arena is full.
    pub fn send_with<F, Ret>(&mut self, len: usize, f: F) -> Result<Ret>
    where
        F: FnOnce(&mut [u8]) -> Ret,
    {
        self.tx.send_with(len, &mut self.crc, &self.clock, f)
    }

    /// Performs one iteration of the driver's main loop: refreshes the link state if it's due,
    /// delivers all frames received so far to `stack`, and lets the stack run its timers.
    /// Returns the number of frames delivered. Never blocks for long.
    pub fn poll<S: NetStack>(&mut self, stack: &mut S) -> usize {
        self.poll_link(stack);
        let delivered = self
            .rx
            .drain(&self.rx_arena, &mut self.crc, stack, &self.clock);
        stack.service_timeouts();
        delivered
    }

    fn poll_link<S: NetStack>(&mut self, stack: &mut S) {
        let now = self.clock.now_us();
        if now < self.next_link_poll_us {
            return;
        }
        self.next_link_poll_us = now + self.options.link_poll_interval_ms as u64 * 1000;

        // The value from the read started last time, if it has completed by now.
        let Some(status) = self.mdio.read_nonblocking(self.phy_address, reg::BMSR) else {
            return;
        };
        let link_up = status & bmsr::LINK_STATUS != 0;
        if link_up != stack.is_link_up() {
            if link_up {
                info!("Link up");
                stack.set_link_up();
            } else {
                info!("Link down");
                stack.set_link_down();
            }
        }
    }

    /// Reads a PHY register, blocking until the read completes. Returns [NO_RESPONSE] if the PHY
    /// didn't answer.
    pub fn mdio_read(&self, phy: u8, reg: u8) -> u16 {
        self.mdio.read(&self.clock, phy, reg)
    }

    /// See [Mdio::read_nonblocking].
    pub fn mdio_read_nonblocking(&self, phy: u8, reg: u8) -> Option<u16> {
        self.mdio.read_nonblocking(phy, reg)
    }

    /// Writes a PHY register, blocking until the write completes.
    pub fn mdio_write(&self, phy: u8, reg: u8, value: u16) {
        self.mdio.write(&self.clock, phy, reg, value)
    }

    /// Starts a write of a PHY register if no other transaction is in flight.
    pub fn mdio_write_nonblocking(&self, phy: u8, reg: u8, value: u16) -> Start {
        self.mdio.write_nonblocking(phy, reg, value)
    }

    pub fn phy_address(&self) -> u8 {
        self.phy_address
    }

    pub fn mac_address(&self) -> [u8; 6] {
        self.mac_address
    }

    /// Returns how many bytes of the TX arena are currently free.
    pub fn tx_free_space(&self) -> usize {
        self.tx.free_space()
    }

    pub fn stats(&self) -> MacStats {
        MacStats {
            rx: self.rx.stats(),
            tx: self.tx.stats(),
        }
    }

    /// Logs the driver's configuration and state. Blocks for a couple of MDIO reads.
    pub fn log_info(&self) {
        let id = [
            self.mdio_read(self.phy_address, reg::PHYIDR1),
            self.mdio_read(self.phy_address, reg::PHYIDR2),
        ];
        info!("MAC address: {}", FormatMacAddress(&self.mac_address));
        info!(
            "PHY address: {}, ID {:04x}:{:04x}",
            self.phy_address, id[0], id[1]
        );
        info!(
            "RX arena: {} bytes at {:#010x}, write offset {:#05x}, {} descriptors",
            self.rx_arena.len(),
            self.rx_arena.base_address(),
            self.rx_arena.offset_of(self.rx_dma.cursor().address()),
            N
        );
        info!("TX arena: {} bytes free", self.tx.free_space());
        info!("{:?}", self.stats());
    }
}

/// Returns the lowest MDIO address at which a PHY answers.
fn probe_phy<P: MdioPin, C: Clock>(mdio: &Mdio<P>, clock: &C) -> Option<u8> {
    (0..PHY_ADDRESS_COUNT).find(|&address| mdio.read(clock, address, reg::BMCR) != NO_RESPONSE)
}

fn configure_phy<P: MdioPin, C: Clock>(
    mdio: &Mdio<P>,
    clock: &C,
    phy_address: u8,
    options: &MacOptions,
) {
    if options.soft_reset {
        debug!("Soft-resetting PHY");
        mdio.write(clock, phy_address, reg::BMCR, bmcr::RESET);
        clock.delay_ms(1);
    }
    mdio.write(clock, phy_address, reg::ANAR, options.advertisement);
    mdio.write(clock, phy_address, reg::BMCR, bmcr::AN_ENABLE);
}

/// Something outgoing frames can be handed to. The smoltcp adapter transmits through it.
pub trait FrameTx {
    /// Queues a frame of `len` bytes produced by `f`, blocking while there's no space. Lengths
    /// above [MAX_PAYLOAD_SIZE] are truncated.
    fn send_frame_with<F, Ret>(&mut self, len: usize, f: F) -> Ret
    where
        F: FnOnce(&mut [u8]) -> Ret;
}

impl<'a, R, T, P, C, E, const N: usize> FrameTx for Mac<'a, R, T, P, C, E, N>
where
    R: RxDma,
    T: TxDma,
    P: MdioPin,
    C: Clock,
    E: CrcEngine,
{
    fn send_frame_with<F, Ret>(&mut self, len: usize, f: F) -> Ret
    where
        F: FnOnce(&mut [u8]) -> Ret,
    {
        self.tx
            .send_truncated_with(len, &mut self.crc, &self.clock, f)
    }
}

impl<M: FrameTx + ?Sized> FrameTx for &mut M {
    fn send_frame_with<F, Ret>(&mut self, len: usize, f: F) -> Ret
    where
        F: FnOnce(&mut [u8]) -> Ret,
    {
        (**self).send_frame_with(len, f)
    }
}
