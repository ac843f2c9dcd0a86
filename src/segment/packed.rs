//! Append-only bit-packed integer buffer
//!
//! Holds the cumulative deleted-document counts for a merge. Counts for a
//! large merge can run into the millions, so completed pages are stored at
//! the minimal per-page bit width instead of raw 64-bit words. Appends stage
//! into an uncompressed array and only the page-fill append pays for packing.

use crate::error::{OrdexError, Result};

/// Default number of values per page
pub const DEFAULT_PAGE_SIZE: usize = 1024;

/// Default acceptable overhead: pack at the exact required width
pub const COMPACT: f32 = 0.0;

/// Number of bits needed to represent `value`
#[inline]
fn bits_needed(value: u64) -> u32 {
    64 - value.leading_zeros()
}

/// Round a required bit width up to a faster-to-decode width when the
/// configured overhead allows it. `ratio` is the acceptable number of wasted
/// bits per required bit (0.0 keeps the exact width).
fn effective_width(required: u32, ratio: f32) -> u32 {
    if required == 0 {
        return 0;
    }
    let max_extra = required as f32 * ratio;
    for width in [8u32, 16, 32, 64] {
        if width >= required && (width - required) as f32 <= max_extra {
            return width;
        }
    }
    required
}

/// An immutable page of values packed at a fixed bit width
#[derive(Debug)]
struct PackedPage {
    words: Vec<u64>,
    bits: u32,
    len: usize,
}

impl PackedPage {
    /// Pack a staged page. A page containing any negative value is stored at
    /// full 64-bit width; otherwise the width is derived from the maximum.
    fn pack(values: &[i64], ratio: f32) -> Self {
        debug_assert!(!values.is_empty());
        let min = values.iter().min().copied().unwrap_or(0);
        let max = values.iter().max().copied().unwrap_or(0);

        let bits = if min < 0 {
            64
        } else {
            effective_width(bits_needed(max as u64), ratio)
        };

        let word_count = (values.len() * bits as usize).div_ceil(64);
        let mut words = vec![0u64; word_count];
        if bits > 0 {
            for (i, &value) in values.iter().enumerate() {
                Self::set(&mut words, bits, i, value as u64);
            }
        }

        Self {
            words,
            bits,
            len: values.len(),
        }
    }

    fn set(words: &mut [u64], bits: u32, index: usize, value: u64) {
        let bit_pos = index * bits as usize;
        let word = bit_pos >> 6;
        let offset = (bit_pos & 63) as u32;
        words[word] |= value << offset;
        if offset + bits > 64 {
            words[word + 1] |= value >> (64 - offset);
        }
    }

    fn get(&self, index: usize) -> i64 {
        debug_assert!(index < self.len);
        if self.bits == 0 {
            return 0;
        }
        let bit_pos = index * self.bits as usize;
        let word = bit_pos >> 6;
        let offset = (bit_pos & 63) as u32;
        let mut value = self.words[word] >> offset;
        if offset + self.bits > 64 {
            value |= self.words[word + 1] << (64 - offset);
        }
        if self.bits < 64 {
            value &= (1u64 << self.bits) - 1;
        }
        value as i64
    }

    /// Decode up to `dest.len()` values starting at `offset` within this page
    fn bulk_get(&self, offset: usize, dest: &mut [i64]) -> usize {
        let count = dest.len().min(self.len - offset);
        for (i, slot) in dest[..count].iter_mut().enumerate() {
            *slot = self.get(offset + i);
        }
        count
    }

    fn ram_bytes_used(&self) -> usize {
        std::mem::size_of::<Self>() + self.words.len() * 8
    }
}

/// Append-only paged store of 64-bit integers, bit-packed per page.
///
/// Two-phase lifecycle: values are appended while the buffer is building,
/// then `freeze` seals it. A frozen buffer is immutable; `append` on it
/// returns `OrdexError::BufferFrozen`.
#[derive(Debug)]
pub struct PackedLongBuffer {
    page_size: usize,
    acceptable_overhead_ratio: f32,
    pages: Vec<PackedPage>,
    /// Current page, staged uncompressed until it fills
    pending: Vec<i64>,
    count: usize,
    frozen: bool,
}

impl PackedLongBuffer {
    pub fn new() -> Self {
        Self::with_config(DEFAULT_PAGE_SIZE, COMPACT)
    }

    pub fn with_config(page_size: usize, acceptable_overhead_ratio: f32) -> Self {
        assert!(page_size > 0, "page size must be positive");
        Self {
            page_size,
            acceptable_overhead_ratio,
            pages: Vec::new(),
            pending: Vec::with_capacity(page_size),
            count: 0,
            frozen: false,
        }
    }

    /// Number of values appended so far
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Append a value. Amortized O(1): packing happens only on page fill.
    pub fn append(&mut self, value: i64) -> Result<()> {
        if self.frozen {
            return Err(OrdexError::BufferFrozen);
        }
        self.pending.push(value);
        self.count += 1;
        if self.pending.len() == self.page_size {
            self.pack_pending();
        }
        Ok(())
    }

    /// Get the value at `index`.
    ///
    /// Precondition: `index < len()`. Violations are a caller bug; checked in
    /// debug builds only.
    pub fn get(&self, index: usize) -> i64 {
        debug_assert!(index < self.count, "index {} out of bounds", index);
        let page = index / self.page_size;
        let offset = index % self.page_size;
        if page < self.pages.len() {
            self.pages[page].get(offset)
        } else {
            self.pending[offset]
        }
    }

    /// Copy contiguous values starting at `index` into `dest`, never crossing
    /// a page boundary. Returns the number of values copied; callers needing
    /// a longer run loop.
    ///
    /// Precondition: `index < len()`.
    pub fn bulk_get(&self, index: usize, dest: &mut [i64]) -> usize {
        debug_assert!(index < self.count, "index {} out of bounds", index);
        let page = index / self.page_size;
        let offset = index % self.page_size;
        if page < self.pages.len() {
            self.pages[page].bulk_get(offset, dest)
        } else {
            let count = dest.len().min(self.pending.len() - offset);
            dest[..count].copy_from_slice(&self.pending[offset..offset + count]);
            count
        }
    }

    /// Seal the buffer: packs a non-empty pending page and rejects further
    /// appends. Freezing twice is a no-op.
    pub fn freeze(&mut self) {
        if self.frozen {
            return;
        }
        if !self.pending.is_empty() {
            self.pack_pending();
        }
        self.frozen = true;
    }

    /// Approximate heap memory used by this buffer
    pub fn ram_bytes_used(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.pending.capacity() * 8
            + self.pages.iter().map(PackedPage::ram_bytes_used).sum::<usize>()
    }

    fn pack_pending(&mut self) {
        let page = PackedPage::pack(&self.pending, self.acceptable_overhead_ratio);
        self.pages.push(page);
        self.pending.clear();
    }
}

impl Default for PackedLongBuffer {
    fn default() -> Self {
        Self::new()
    }
}
