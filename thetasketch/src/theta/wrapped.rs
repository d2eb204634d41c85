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

//! Read-only view over a serialized compact sketch.

use std::fmt;

use byteorder::ByteOrder;
use byteorder::LittleEndian;

use crate::error::Error;
use crate::theta::CompactThetaSketch;
use crate::theta::bit_pack::BLOCK_WIDTH;
use crate::theta::bit_pack::BitUnpacker;
use crate::theta::bit_pack::unpack_bits_block;
use crate::theta::serialization::CompactSketchData;
use crate::theta::serialization::EntryData;
use crate::theta::serialization::HASH_SIZE_BYTES;
use crate::theta::serialization::parse_compact;
use crate::theta::view;
use crate::theta::view::ThetaSketchView;

/// A compact sketch read in place from its serialized bytes.
///
/// Wrapping validates the header and checks that the buffer holds every entry the header
/// declares; entries are only decoded while iterating. Compressed images are unpacked a block of
/// eight hashes at a time.
///
/// # Examples
///
/// ```
/// use thetasketch::hash::DEFAULT_UPDATE_SEED;
/// use thetasketch::theta::ThetaSketch;
/// use thetasketch::theta::WrappedCompactThetaSketch;
///
/// let mut sketch = ThetaSketch::builder().build().unwrap();
/// for i in 0..20u64 {
///     sketch.update_u64(i);
/// }
/// let bytes = sketch.compact(true).serialize_compressed();
///
/// let wrapped = WrappedCompactThetaSketch::wrap(&bytes, DEFAULT_UPDATE_SEED).unwrap();
/// assert_eq!(wrapped.num_retained(), 20);
/// assert_eq!(wrapped.iter().count(), 20);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct WrappedCompactThetaSketch<'a> {
    data: CompactSketchData<'a>,
}

impl<'a> WrappedCompactThetaSketch<'a> {
    /// Wrap serialized bytes of any serial version.
    ///
    /// # Errors
    ///
    /// Returns an error if the header is invalid, the seed hash does not match `seed`, or the
    /// buffer is shorter than the header implies.
    pub fn wrap(bytes: &'a [u8], seed: u64) -> Result<Self, Error> {
        let data = parse_compact(bytes, seed)?;
        Ok(Self { data })
    }

    /// Serial version of the wrapped image.
    pub fn serial_version(&self) -> u8 {
        self.data.serial_version
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty
    }

    pub fn is_ordered(&self) -> bool {
        self.data.is_ordered
    }

    pub fn theta64(&self) -> u64 {
        self.data.theta
    }

    pub fn num_retained(&self) -> usize {
        self.data.num_entries
    }

    pub fn seed_hash(&self) -> u16 {
        self.data.seed_hash
    }

    pub fn estimate(&self) -> f64 {
        view::estimate(self.data.num_entries, self.data.theta, self.data.is_empty)
    }

    /// Iterates over the retained hashes, decoding lazily.
    pub fn iter(&self) -> WrappedEntries<'a> {
        let inner = match self.data.entries {
            EntryData::Raw(bytes) => EntriesInner::Raw(bytes.chunks_exact(HASH_SIZE_BYTES)),
            EntryData::Packed { entry_bits, bytes } => EntriesInner::Packed(PackedEntries {
                bytes,
                entry_bits,
                remaining: self.data.num_entries,
                offset: 0,
                block: [0; BLOCK_WIDTH],
                block_len: 0,
                block_pos: 0,
                previous: 0,
            }),
        };
        WrappedEntries { inner }
    }

    /// Decode every entry into an owned compact sketch.
    pub fn to_compact(&self) -> CompactThetaSketch {
        CompactThetaSketch::from_parts(
            self.data.decode_entries(),
            self.data.theta,
            self.data.seed_hash,
            self.data.is_ordered,
            self.data.is_empty,
        )
    }
}

impl ThetaSketchView for WrappedCompactThetaSketch<'_> {
    fn is_empty(&self) -> bool {
        self.data.is_empty
    }

    fn is_ordered(&self) -> bool {
        self.data.is_ordered
    }

    fn theta64(&self) -> u64 {
        self.data.theta
    }

    fn num_retained(&self) -> usize {
        self.data.num_entries
    }

    fn seed_hash(&self) -> u16 {
        self.data.seed_hash
    }

    fn iter(&self) -> Box<dyn Iterator<Item = u64> + '_> {
        Box::new(WrappedCompactThetaSketch::iter(self))
    }
}

impl fmt::Display for WrappedCompactThetaSketch<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        view::write_summary(f, self, |f| {
            writeln!(f, "   serial version       : {}", self.data.serial_version)
        })
    }
}

/// Iterator over the hashes of a [`WrappedCompactThetaSketch`].
#[derive(Debug, Clone)]
pub struct WrappedEntries<'a> {
    inner: EntriesInner<'a>,
}

#[derive(Debug, Clone)]
enum EntriesInner<'a> {
    Raw(std::slice::ChunksExact<'a, u8>),
    Packed(PackedEntries<'a>),
}

#[derive(Debug, Clone)]
struct PackedEntries<'a> {
    bytes: &'a [u8],
    entry_bits: u8,
    // entries not yet unpacked into `block`
    remaining: usize,
    offset: usize,
    block: [u64; BLOCK_WIDTH],
    block_len: usize,
    block_pos: usize,
    previous: u64,
}

impl PackedEntries<'_> {
    fn refill(&mut self) {
        if self.remaining >= BLOCK_WIDTH {
            unpack_bits_block(&mut self.block, &self.bytes[self.offset..], self.entry_bits);
            self.offset += self.entry_bits as usize;
            self.block_len = BLOCK_WIDTH;
        } else {
            let mut unpacker = BitUnpacker::new(&self.bytes[self.offset..]);
            for value in &mut self.block[..self.remaining] {
                *value = unpacker.unpack_value(self.entry_bits);
            }
            self.block_len = self.remaining;
        }
        self.remaining -= self.block_len;
        self.block_pos = 0;
    }
}

impl Iterator for PackedEntries<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if self.block_pos == self.block_len {
            if self.remaining == 0 {
                return None;
            }
            self.refill();
        }
        self.previous = self.previous.wrapping_add(self.block[self.block_pos]);
        self.block_pos += 1;
        Some(self.previous)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.remaining + self.block_len - self.block_pos;
        (len, Some(len))
    }
}

impl Iterator for WrappedEntries<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        match &mut self.inner {
            EntriesInner::Raw(chunks) => chunks.next().map(LittleEndian::read_u64),
            EntriesInner::Packed(packed) => packed.next(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.inner {
            EntriesInner::Raw(chunks) => chunks.size_hint(),
            EntriesInner::Packed(packed) => packed.size_hint(),
        }
    }
}

impl ExactSizeIterator for WrappedEntries<'_> {}
