// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! MSB-first bit packing of fixed-width unsigned values.
//!
//! Values are laid out back to back, most significant bit first, so a block of
//! [`BLOCK_WIDTH`] values of `bits` width occupies exactly `bits` bytes. Whole blocks go through a
//! width-specialized routine picked from a dispatch table; the remainder goes through the scalar
//! [`BitPacker`] / [`BitUnpacker`] which track a bit cursor inside the current byte.

pub(crate) const BLOCK_WIDTH: usize = 8;

/// Widest value the block routines handle. Deltas of 63-bit hashes never need more.
pub(crate) const MAX_BLOCK_BITS: u8 = 63;

#[inline]
fn low_bit_to_byte_mask(bits: u8) -> u8 {
    if bits >= u8::BITS as u8 {
        u8::MAX
    } else {
        (1u8 << bits) - 1
    }
}

/// Number of bytes needed to hold `num_values` values of `bits` width.
pub(crate) fn packed_len(num_values: usize, bits: u8) -> usize {
    (num_values * bits as usize).div_ceil(8)
}

/// Packs values into a byte buffer with arbitrary bit widths.
///
/// The buffer is expected to be zeroed; partially filled bytes are OR-ed into.
///
/// # Panics
///
/// Panics if the buffer is too small to hold the packed values.
pub(crate) struct BitPacker<'a> {
    bytes: &'a mut [u8],
    byte_index: usize,
    byte_bit_used: u8,
}

impl<'a> BitPacker<'a> {
    pub fn new(bytes: &'a mut [u8]) -> Self {
        BitPacker {
            bytes,
            byte_index: 0,
            byte_bit_used: 0,
        }
    }

    /// Return used number of bytes, counting a partially filled one.
    pub fn byte_used(&self) -> usize {
        if self.byte_bit_used == 0 {
            self.byte_index
        } else {
            self.byte_index + 1
        }
    }

    /// Packs the low `bits` bits of `value`.
    pub fn pack_value(&mut self, value: u64, mut bits: u8) {
        debug_assert!(self.byte_bit_used < 8, "offset must be in [0, 7]");

        if self.byte_bit_used > 0 {
            let remain_bits = 8 - self.byte_bit_used;
            let remain_mask = low_bit_to_byte_mask(remain_bits);

            if bits < remain_bits {
                self.bytes[self.byte_index] |=
                    ((value << (remain_bits - bits)) as u8) & remain_mask;
                self.byte_bit_used += bits;
                return;
            }

            // highest remain_bits go first
            self.bytes[self.byte_index] |= ((value >> (bits - remain_bits)) as u8) & remain_mask;
            bits -= remain_bits;
            self.byte_bit_used = 0;
            self.byte_index += 1;
        }

        while bits >= 8 {
            self.bytes[self.byte_index] = (value >> (bits - 8)) as u8;
            self.byte_index += 1;
            bits -= 8;
        }

        if bits > 0 {
            self.bytes[self.byte_index] = (value << (8 - bits)) as u8;
            self.byte_bit_used = bits;
        }
    }
}

/// Unpacks values from a byte buffer with arbitrary bit widths.
///
/// # Panics
///
/// Panics if the buffer is too small to provide the requested bits.
pub(crate) struct BitUnpacker<'a> {
    bytes: &'a [u8],
    byte_index: usize,
    byte_bit_used: u8,
}

impl<'a> BitUnpacker<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            byte_index: 0,
            byte_bit_used: 0,
        }
    }

    /// Unpacks the next `bits`-wide value.
    pub fn unpack_value(&mut self, mut bits: u8) -> u64 {
        if bits == 0 {
            return 0;
        }

        let avail_bits = 8 - self.byte_bit_used;
        let chunk_bits = avail_bits.min(bits);
        let chunk_mask = low_bit_to_byte_mask(chunk_bits);

        let mut value =
            ((self.bytes[self.byte_index] >> (avail_bits - chunk_bits)) & chunk_mask) as u64;
        if chunk_bits == avail_bits {
            self.byte_index += 1;
        }
        self.byte_bit_used = (self.byte_bit_used + chunk_bits) & 7;
        bits -= chunk_bits;

        while bits >= 8 {
            value = (value << 8) | self.bytes[self.byte_index] as u64;
            self.byte_index += 1;
            bits -= 8;
        }

        if bits > 0 {
            value = (value << bits) | (self.bytes[self.byte_index] >> (8 - bits)) as u64;
            self.byte_bit_used = bits;
        }

        value
    }
}

#[inline(always)]
fn pack_block<const BITS: u32>(values: &[u64], bytes: &mut [u8]) {
    let mask = (1u64 << BITS) - 1;
    let mut acc = 0u128;
    let mut acc_bits = 0u32;
    let mut out = 0;
    for &value in &values[..BLOCK_WIDTH] {
        acc = (acc << BITS) | (value & mask) as u128;
        acc_bits += BITS;
        while acc_bits >= 8 {
            acc_bits -= 8;
            bytes[out] = (acc >> acc_bits) as u8;
            out += 1;
        }
        acc &= (1u128 << acc_bits) - 1;
    }
    debug_assert_eq!(acc_bits, 0);
}

#[inline(always)]
fn unpack_block<const BITS: u32>(values: &mut [u64], bytes: &[u8]) {
    let mask = (1u128 << BITS) - 1;
    let mut acc = 0u128;
    let mut acc_bits = 0u32;
    let mut input = 0;
    for value in &mut values[..BLOCK_WIDTH] {
        while acc_bits < BITS {
            acc = (acc << 8) | bytes[input] as u128;
            input += 1;
            acc_bits += 8;
        }
        acc_bits -= BITS;
        *value = ((acc >> acc_bits) & mask) as u64;
        acc &= (1u128 << acc_bits) - 1;
    }
}

type PackBlockFn = fn(&[u64], &mut [u8]);
type UnpackBlockFn = fn(&mut [u64], &[u8]);

macro_rules! block_table {
    ($routine:ident as $fn_type:ty; $($bits:literal)+) => {
        [$($routine::<$bits> as $fn_type),+]
    };
}

// Index i holds the routine for width i + 1.
static PACK_BLOCKS: [PackBlockFn; MAX_BLOCK_BITS as usize] = block_table!(
    pack_block as PackBlockFn;
    1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 16 17 18 19 20 21 22 23 24 25 26 27 28 29 30 31 32
    33 34 35 36 37 38 39 40 41 42 43 44 45 46 47 48 49 50 51 52 53 54 55 56 57 58 59 60 61 62 63
);

static UNPACK_BLOCKS: [UnpackBlockFn; MAX_BLOCK_BITS as usize] = block_table!(
    unpack_block as UnpackBlockFn;
    1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 16 17 18 19 20 21 22 23 24 25 26 27 28 29 30 31 32
    33 34 35 36 37 38 39 40 41 42 43 44 45 46 47 48 49 50 51 52 53 54 55 56 57 58 59 60 61 62 63
);

/// Packs a block of `BLOCK_WIDTH` values into exactly `bits` bytes.
///
/// # Panics
///
/// * Panics if `values.len()` is not equal to `BLOCK_WIDTH`.
/// * Panics if `bits` is not in the range `1..=63`.
/// * Panics if `bytes.len()` is less than `bits`.
pub(crate) fn pack_bits_block(values: &[u64], bytes: &mut [u8], bits: u8) {
    assert_eq!(values.len(), BLOCK_WIDTH, "values length must be 8");
    assert!(
        (1..=MAX_BLOCK_BITS).contains(&bits),
        "wrong number of bits in pack_bits_block: {bits}"
    );
    assert!(bytes.len() >= bits as usize, "output buffer too small");
    PACK_BLOCKS[bits as usize - 1](values, bytes);
}

/// Unpacks a block of `BLOCK_WIDTH` values from exactly `bits` bytes.
///
/// # Panics
///
/// * Panics if `values.len()` is not equal to `BLOCK_WIDTH`.
/// * Panics if `bits` is not in the range `1..=63`.
/// * Panics if `bytes.len()` is less than `bits`.
pub(crate) fn unpack_bits_block(values: &mut [u64], bytes: &[u8], bits: u8) {
    assert_eq!(values.len(), BLOCK_WIDTH, "values length must be 8");
    assert!(
        (1..=MAX_BLOCK_BITS).contains(&bits),
        "wrong number of bits in unpack_bits_block: {bits}"
    );
    assert!(bytes.len() >= bits as usize, "input buffer too small");
    UNPACK_BLOCKS[bits as usize - 1](values, bytes);
}

/// Packs all `values` at `bits` width: whole blocks through the dispatch table, the tail through
/// the scalar packer. Returns the number of bytes written.
pub(crate) fn pack_values(values: &[u64], bits: u8, bytes: &mut [u8]) -> usize {
    let mut blocks = values.chunks_exact(BLOCK_WIDTH);
    let mut offset = 0;
    for block in &mut blocks {
        pack_bits_block(block, &mut bytes[offset..], bits);
        offset += bits as usize;
    }
    let mut packer = BitPacker::new(&mut bytes[offset..]);
    for &value in blocks.remainder() {
        packer.pack_value(value, bits);
    }
    offset + packer.byte_used()
}

/// Inverse of [`pack_values`]: fills `values` from `bytes`.
pub(crate) fn unpack_values(values: &mut [u64], bits: u8, bytes: &[u8]) {
    let mut blocks = values.chunks_exact_mut(BLOCK_WIDTH);
    let mut offset = 0;
    for block in &mut blocks {
        unpack_bits_block(block, &bytes[offset..], bits);
        offset += bits as usize;
    }
    let mut unpacker = BitUnpacker::new(&bytes[offset..]);
    for value in blocks.into_remainder() {
        *value = unpacker.unpack_value(bits);
    }
}
