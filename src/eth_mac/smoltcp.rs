//! An implementation of smoltcp's `Device` trait, built on top of our `eth_mac` MAC layer.
//!
//! [Mac::poll](super::Mac::poll) delivers received frames into a [SmolRxQueue] through the
//! queue's [SmolStack] handle, and smoltcp picks them up from there through [SmolMac]:
//!
//! ```ignore
//! static RX_FRAMES: SmolRxQueue<8192> = SmolRxQueue::new();
//!
//! let (mut stack, rx) = RX_FRAMES.split()?;
//! let mut device = SmolMac::new(&mut mac, rx);
//! loop {
//!     device.mac().poll(&mut stack);
//!     iface.poll(now(), &mut device, &mut sockets);
//! }
//! ```

use super::{Error, FrameTx, Result, MAX_PAYLOAD_SIZE};
use crate::netif::{Input, NetStack};
use bbqueue::framed::{FrameConsumer, FrameGrantR, FrameProducer};
use bbqueue::BBBuffer;
use log::trace;

/// Holds up to `CAP` bytes worth of validated frames (plus a small header per frame) between the
/// MAC and smoltcp.
pub struct SmolRxQueue<const CAP: usize> {
    buffer: BBBuffer<CAP>,
}

impl<const CAP: usize> SmolRxQueue<CAP> {
    pub const fn new() -> SmolRxQueue<CAP> {
        SmolRxQueue {
            buffer: BBBuffer::new(),
        }
    }

    /// Splits the queue into the [NetStack] to pass to [Mac::poll](super::Mac::poll), and the
    /// consumer to pass to [SmolMac::new]. May only be called once.
    pub fn split(&self) -> Result<(SmolStack<'_, CAP>, FrameConsumer<'_, CAP>)> {
        let (producer, consumer) = self
            .buffer
            .try_split_framed()
            .map_err(|_| Error::AlreadySplit)?;
        Ok((
            SmolStack {
                producer,
                link_up: false,
            },
            consumer,
        ))
    }
}

impl<const CAP: usize> Default for SmolRxQueue<CAP> {
    fn default() -> Self {
        Self::new()
    }
}

/// The producer side of a [SmolRxQueue]. Also tracks the link state, which smoltcp itself has no
/// notion of, for the application to query.
pub struct SmolStack<'a, const CAP: usize> {
    producer: FrameProducer<'a, CAP>,
    link_up: bool,
}

impl<'a, const CAP: usize> NetStack for SmolStack<'a, CAP> {
    fn input<F>(&mut self, len: usize, fill: F) -> Input
    where
        F: FnOnce(&mut [u8]) -> bool,
    {
        let Ok(mut grant) = self.producer.grant(len) else {
            return Input::OutOfMemory;
        };
        if !fill(&mut grant[..len]) {
            // Dropping the grant without committing it releases the space again.
            return Input::Discarded;
        }
        grant.commit(len);
        Input::Delivered
    }

    fn is_link_up(&self) -> bool {
        self.link_up
    }

    fn set_link_up(&mut self) {
        self.link_up = true;
    }

    fn set_link_down(&mut self) {
        self.link_up = false;
    }
}

pub struct SmolMac<'q, M, const CAP: usize> {
    mac: M,
    rx: FrameConsumer<'q, CAP>,
}

impl<'q, M: FrameTx, const CAP: usize> SmolMac<'q, M, CAP> {
    pub fn new(mac: M, rx: FrameConsumer<'q, CAP>) -> SmolMac<'q, M, CAP> {
        SmolMac { mac, rx }
    }

    /// Gives access to the MAC, e.g. to poll it.
    pub fn mac(&mut self) -> &mut M {
        &mut self.mac
    }
}

impl<'q, M: FrameTx, const CAP: usize> smoltcp::phy::Device for SmolMac<'q, M, CAP> {
    type RxToken<'a> = SmolRxToken<'q, CAP> where Self: 'a;
    type TxToken<'a> = SmolTxToken<'a, M> where Self: 'a;

    fn receive(
        &mut self,
        _timestamp: smoltcp::time::Instant,
    ) -> Option<(Self::RxToken<'_>, Self::TxToken<'_>)> {
        let mut frame = self.rx.read()?;
        // Release the frame's space once the token is consumed (or dropped).
        frame.auto_release(true);
        Some((SmolRxToken { frame }, SmolTxToken { mac: &mut self.mac }))
    }

    fn transmit(&mut self, _timestamp: smoltcp::time::Instant) -> Option<Self::TxToken<'_>> {
        Some(SmolTxToken { mac: &mut self.mac })
    }

    fn capabilities(&self) -> smoltcp::phy::DeviceCapabilities {
        let mut caps = smoltcp::phy::DeviceCapabilities::default();
        caps.medium = smoltcp::phy::Medium::Ethernet;
        caps.max_transmission_unit = MAX_PAYLOAD_SIZE;
        // This determines the TCP window size that smoltcp will advertise (if `max_burst_size *
        // MTU` is smaller than the actual TCP RX buffer size). Leave it to the TCP buffer sizes.
        caps.max_burst_size = None;
        caps
    }
}

pub struct SmolRxToken<'q, const CAP: usize> {
    frame: FrameGrantR<'q, CAP>,
}

impl<'q, const CAP: usize> smoltcp::phy::RxToken for SmolRxToken<'q, CAP> {
    fn consume<R, F>(mut self, f: F) -> R
    where
        F: FnOnce(&mut [u8]) -> R,
    {
        trace!("SmolTcp RX consume called ({} bytes)", self.frame.len());
        f(&mut self.frame)
    }
}

pub struct SmolTxToken<'a, M> {
    mac: &'a mut M,
}

impl<'a, M: FrameTx> smoltcp::phy::TxToken for SmolTxToken<'a, M> {
    fn consume<R, F>(self, len: usize, f: F) -> R
    where
        F: FnOnce(&mut [u8]) -> R,
    {
        trace!("SmolTcp TX consume called ({len} bytes)");
        self.mac.send_frame_with(len, f)
    }
}
