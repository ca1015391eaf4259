//! Byte arenas shared with DMA engines, and the wraparound arithmetic used to address them.
//!
//! Arenas are a power of two in size and aligned to their size, which lets the DMA engine wrap its
//! addresses in hardware and lets us turn any DMA address into an arena offset with a simple mask.
//! The arena itself does no bookkeeping about which regions are in use: callers own a cursor each
//! and must only touch regions that the other side (usually a DMA chain) is not using.

use crate::crc::CrcEngine;
use crate::eth_mac::{Error, Result};
use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::ops::Range;
use core::ptr::NonNull;
use core::sync::atomic::AtomicU32;

/// The size of each arena, as a power of two. 4096 bytes fits two maximum-sized frames.
pub const ARENA_SIZE_LOG2: u32 = 12;
/// The size of each arena, in bytes.
pub const ARENA_SIZE: usize = 1 << ARENA_SIZE_LOG2;
/// The number of slots in a TX command ring. Enough for an arena full of minimum-sized frames.
pub const COMMAND_RING_LEN: usize = ARENA_SIZE / 64;

/// Statically allocatable, size-aligned backing memory for an [Arena].
#[repr(C, align(4096))]
pub struct ArenaStorage(UnsafeCell<[u8; ARENA_SIZE]>);

// The alignment attribute above can't refer to ARENA_SIZE, so make sure the two stay in sync.
const _: () = assert!(core::mem::align_of::<ArenaStorage>() == ARENA_SIZE);

// SAFETY: all access goes through an `Arena`, whose users partition the memory between the CPU and
// the DMA engine using their cursors.
unsafe impl Sync for ArenaStorage {}

impl ArenaStorage {
    pub const fn new() -> ArenaStorage {
        ArenaStorage(UnsafeCell::new([0; ARENA_SIZE]))
    }
}

impl Default for ArenaStorage {
    fn default() -> Self {
        Self::new()
    }
}

/// Statically allocatable, size-aligned backing memory for a TX command ring. Each slot holds the
/// length of one formatted frame, or zero to mark the end of the queue.
#[repr(C, align(256))]
pub struct CommandStorage(pub(crate) [AtomicU32; COMMAND_RING_LEN]);

const _: () = assert!(core::mem::align_of::<CommandStorage>() == COMMAND_RING_LEN * 4);

impl CommandStorage {
    pub const fn new() -> CommandStorage {
        CommandStorage([const { AtomicU32::new(0) }; COMMAND_RING_LEN])
    }

    /// The size of the ring in bytes, as a power of two.
    pub const fn size_log2(&self) -> u32 {
        (COMMAND_RING_LEN * 4).trailing_zeros()
    }

    pub fn base_address(&self) -> usize {
        self.0.as_ptr() as usize
    }
}

impl Default for CommandStorage {
    fn default() -> Self {
        Self::new()
    }
}

/// A power-of-two-sized, size-aligned region of memory addressed with wrapping offsets.
///
/// Reading and writing never check whether the region is in use by someone else: writers must have
/// reserved the region first, and readers must only read regions that have been published to them.
pub struct Arena<'a> {
    base: NonNull<u8>,
    mask: usize,
    _storage: PhantomData<&'a UnsafeCell<[u8]>>,
}

// SAFETY: an `Arena` is a handle to memory that is shared with DMA engines anyway; moving the
// handle to another context doesn't change the access discipline described above.
unsafe impl Send for Arena<'_> {}

impl<'a> Arena<'a> {
    /// Creates an arena covering the given storage.
    pub fn new(storage: &'a ArenaStorage) -> Arena<'a> {
        Arena {
            // SAFETY: `UnsafeCell::get` never returns a null pointer.
            base: unsafe { NonNull::new_unchecked(storage.0.get() as *mut u8) },
            mask: ARENA_SIZE - 1,
            _storage: PhantomData,
        }
    }

    /// Creates an arena covering `len` bytes at `base`.
    ///
    /// Returns [Error::InvalidRing] if `len` isn't a power of two or `base` isn't aligned to it.
    ///
    /// # Safety
    ///
    /// The memory must be valid for reads and writes for the lifetime `'a`, and must only be
    /// accessed through this arena (and DMA chains configured with its address) during that time.
    pub unsafe fn from_raw_parts(base: *mut u8, len: usize) -> Result<Arena<'a>> {
        if !len.is_power_of_two() || (base as usize) & (len - 1) != 0 {
            return Err(Error::InvalidRing);
        }
        let base = NonNull::new(base).ok_or(Error::InvalidRing)?;
        Ok(Arena {
            base,
            mask: len - 1,
            _storage: PhantomData,
        })
    }

    pub fn len(&self) -> usize {
        self.mask + 1
    }

    pub fn size_log2(&self) -> u32 {
        self.len().trailing_zeros()
    }

    pub fn mask(&self) -> usize {
        self.mask
    }

    pub fn base_address(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// Converts a DMA address (anywhere inside the arena) into an arena offset.
    pub fn offset_of(&self, address: usize) -> usize {
        address & self.mask
    }

    /// Returns the offset `len` bytes past `offset`.
    pub fn advance(&self, offset: usize, len: usize) -> usize {
        offset.wrapping_add(len) & self.mask
    }

    /// Returns how many bytes lie between `from` and `to`, going forward and wrapping around.
    pub fn distance(&self, from: usize, to: usize) -> usize {
        to.wrapping_sub(from) & self.mask
    }

    /// Splits the wrapping region of `len` bytes at `offset` into at most two contiguous ranges.
    fn segments(&self, offset: usize, len: usize) -> (Range<usize>, Range<usize>) {
        debug_assert!(len <= self.len());
        let start = offset & self.mask;
        let first_len = len.min(self.len() - start);
        (start..start + first_len, 0..len - first_len)
    }

    /// # Safety
    ///
    /// The range must not be written concurrently (by the CPU or a DMA engine) while the returned
    /// slice is alive.
    unsafe fn slice(&self, range: Range<usize>) -> &[u8] {
        core::slice::from_raw_parts(self.base.as_ptr().add(range.start), range.len())
    }

    /// # Safety
    ///
    /// The range must not be accessed concurrently (by the CPU or a DMA engine) while the returned
    /// slice is alive.
    #[allow(clippy::mut_from_ref)]
    unsafe fn slice_mut(&self, range: Range<usize>) -> &mut [u8] {
        core::slice::from_raw_parts_mut(self.base.as_ptr().add(range.start), range.len())
    }

    /// Copies `src` into the arena at `offset` through the CRC engine. Returns the offset just past
    /// the written data.
    pub fn write<C: CrcEngine>(&mut self, offset: usize, src: &[u8], crc: &mut C) -> usize {
        let (first, second) = self.segments(offset, src.len());
        let (src_first, src_second) = src.split_at(first.len());
        // SAFETY: the caller reserved this region, so no DMA chain reads it.
        unsafe {
            crc.copy(self.slice_mut(first), src_first);
            crc.copy(self.slice_mut(second), src_second);
        }
        self.advance(offset, src.len())
    }

    /// Writes `len` copies of `value` at `offset` through the CRC engine. Returns the offset just
    /// past the written data.
    pub fn fill<C: CrcEngine>(&mut self, offset: usize, value: u8, len: usize, crc: &mut C) -> usize {
        let (first, second) = self.segments(offset, len);
        // SAFETY: see `write`.
        unsafe {
            crc.fill(self.slice_mut(first), value);
            crc.fill(self.slice_mut(second), value);
        }
        self.advance(offset, len)
    }

    /// Writes `bytes` at `offset` without involving a CRC engine. Returns the offset just past the
    /// written data.
    pub fn put(&mut self, offset: usize, bytes: &[u8]) -> usize {
        let (first, second) = self.segments(offset, bytes.len());
        let (bytes_first, bytes_second) = bytes.split_at(first.len());
        // SAFETY: see `write`.
        unsafe {
            self.slice_mut(first).copy_from_slice(bytes_first);
            self.slice_mut(second).copy_from_slice(bytes_second);
        }
        self.advance(offset, bytes.len())
    }

    /// Copies `dst.len()` bytes at `offset` out of the arena through the CRC engine. Returns the
    /// offset just past the read data.
    pub fn read<C: CrcEngine>(&self, offset: usize, dst: &mut [u8], crc: &mut C) -> usize {
        let (first, second) = self.segments(offset, dst.len());
        let (dst_first, dst_second) = dst.split_at_mut(first.len());
        // SAFETY: the region was published to the reader, so no DMA chain writes it anymore.
        unsafe {
            crc.copy(dst_first, self.slice(first));
            crc.copy(dst_second, self.slice(second));
        }
        self.advance(offset, dst.len())
    }

    /// Runs `len` bytes at `offset` through the CRC engine without copying them. Returns the offset
    /// just past the region.
    pub fn feed<C: CrcEngine>(&self, offset: usize, len: usize, crc: &mut C) -> usize {
        let (first, second) = self.segments(offset, len);
        // SAFETY: see `read`.
        unsafe {
            crc.feed(self.slice(first));
            crc.feed(self.slice(second));
        }
        self.advance(offset, len)
    }

    /// Returns the byte at `offset`.
    pub fn get(&self, offset: usize) -> u8 {
        // SAFETY: a single in-bounds volatile read.
        unsafe { self.base.as_ptr().add(offset & self.mask).read_volatile() }
    }
}
