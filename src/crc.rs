//! Generation and validation of the Ethernet frame check sequence (the reflected CRC32 with the
//! 0x04C11DB7 polynomial).
//!
//! The CRC is always computed as a side effect of copying frame data, so that every byte only
//! passes through the CPU (or DMA engine) once. Two interchangeable engines are provided:
//! [SoftwareCrc] calculates the CRC on the CPU while copying, and [DmaCrc] lets a DMA channel with
//! a CRC sniffer do the copying and reads the CRC back afterwards.

use crate::hal::{CopyMode, SniffDma};
use byteorder::{ByteOrder, LittleEndian};

/// The initial value of the CRC register.
pub const INITIAL_VALUE: u32 = 0xffff_ffff;
/// The value the CRC register holds after running over a frame's data followed by the frame's
/// (correct) FCS.
pub const CHECK_RESIDUE: u32 = 0xdebb_20e3;

/// A CRC32 accumulator that can copy data while accumulating.
///
/// [CrcEngine::finish] returns the raw register value (no final complement), i.e. the FCS to
/// append to a frame is the complement of that value, and a received frame including its FCS is
/// valid iff the finished value equals [CHECK_RESIDUE].
pub trait CrcEngine {
    /// Resets the accumulator to [INITIAL_VALUE].
    fn begin(&mut self);

    /// Accumulates `data` without copying it anywhere.
    fn feed(&mut self, data: &[u8]);

    /// Copies the start of `src` into `dst`, as many bytes as the shorter of the two holds, and
    /// accumulates the copied bytes.
    fn copy(&mut self, dst: &mut [u8], src: &[u8]);

    /// Fills `dst` with `value`, accumulating the written bytes.
    fn fill(&mut self, dst: &mut [u8], value: u8);

    /// Returns the raw register value.
    fn finish(&mut self) -> u32;
}

/// Returns the FCS bytes to append to a frame, given the finished CRC register over its data.
pub fn fcs_bytes(finished: u32) -> [u8; 4] {
    let mut fcs = [0; 4];
    LittleEndian::write_u32(&mut fcs, !finished);
    fcs
}

/// Calculates the CRC on the CPU while copying.
#[derive(Clone, Default)]
pub struct SoftwareCrc {
    hasher: crc32fast::Hasher,
}

impl SoftwareCrc {
    pub fn new() -> SoftwareCrc {
        Default::default()
    }
}

impl CrcEngine for SoftwareCrc {
    fn begin(&mut self) {
        self.hasher = crc32fast::Hasher::new();
    }

    fn feed(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    fn copy(&mut self, dst: &mut [u8], src: &[u8]) {
        let len = dst.len().min(src.len());
        dst[..len].copy_from_slice(&src[..len]);
        self.hasher.update(&src[..len]);
    }

    fn fill(&mut self, dst: &mut [u8], value: u8) {
        dst.fill(value);
        self.hasher.update(dst);
    }

    fn finish(&mut self) -> u32 {
        // The hasher applies the final complement, which we undo to expose the raw register.
        !self.hasher.clone().finalize()
    }
}

/// Lets a DMA channel with a CRC sniffer do the copying, so that the CPU never touches the data.
///
/// The channel is used for one transfer at a time. Each transfer is awaited before the method that
/// started it returns, since the borrowed buffers are only guaranteed to be valid until then.
pub struct DmaCrc<D: SniffDma> {
    dma: D,
}

impl<D: SniffDma> DmaCrc<D> {
    pub fn new(dma: D) -> DmaCrc<D> {
        DmaCrc { dma }
    }

    /// Runs a single transfer to completion.
    ///
    /// # Safety
    ///
    /// See [SniffDma::start].
    unsafe fn transfer(&mut self, src: *const u8, dst: *mut u8, len: usize, mode: CopyMode) {
        if len == 0 {
            return;
        }
        self.dma.wait();
        self.dma.start(src, dst, len, mode);
        self.dma.wait();
    }
}

impl<D: SniffDma> CrcEngine for DmaCrc<D> {
    fn begin(&mut self) {
        self.dma.wait();
        self.dma.reset_sniffer(INITIAL_VALUE);
    }

    fn feed(&mut self, data: &[u8]) {
        let mut sink = 0u8;
        // SAFETY: `data` is valid for `data.len()` reads and the fixed destination is a single
        // local byte, both of which outlive the awaited transfer.
        unsafe { self.transfer(data.as_ptr(), &mut sink, data.len(), CopyMode::Drain) }
    }

    fn copy(&mut self, dst: &mut [u8], src: &[u8]) {
        let len = dst.len().min(src.len());
        // SAFETY: both slices are valid for `len` bytes and outlive the awaited transfer.
        unsafe { self.transfer(src.as_ptr(), dst.as_mut_ptr(), len, CopyMode::Copy) }
    }

    fn fill(&mut self, dst: &mut [u8], value: u8) {
        // SAFETY: `dst` is valid for `dst.len()` writes and the fixed source is a single local
        // byte, both of which outlive the awaited transfer.
        unsafe { self.transfer(&value, dst.as_mut_ptr(), dst.len(), CopyMode::Fill) }
    }

    fn finish(&mut self) -> u32 {
        self.dma.wait();
        self.dma.sniffed()
    }
}
