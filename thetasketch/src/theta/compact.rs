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

//! Compact Theta sketch implementation
//!
//! A CompactThetaSketch is an immutable form of a Theta sketch. It stores only the essential data
//! needed for estimation and set operations:
//! - Theta value (sampling threshold)
//! - Retained hash values, optionally sorted
//! - Seed hash for validation
//!
//! It reads serial versions 1 to 4 and writes any of them; see
//! [`serialization`](crate::theta::serialization) for the layouts.

use std::fmt;
use std::io::Read;
use std::io::Write;

use crate::codec::SketchBytes;
use crate::common::NumStdDev;
use crate::error::Error;
use crate::hash::DEFAULT_UPDATE_SEED;
use crate::theta::bit_pack::pack_values;
use crate::theta::bit_pack::packed_len;
use crate::theta::hash_table::MAX_THETA;
use crate::theta::serialization::*;
use crate::theta::view;
use crate::theta::view::ThetaSketchView;

/// A compact, immutable Theta sketch.
///
/// It contains the retained hash values and can be used for:
/// - Cardinality estimation
/// - Set operations (union, intersection, difference)
/// - Serialization to/from bytes
///
/// Unlike [`ThetaSketch`](super::ThetaSketch), this sketch cannot be updated
/// with new values.
///
/// # Example
///
/// ```
/// use thetasketch::theta::CompactThetaSketch;
/// use thetasketch::theta::ThetaSketch;
///
/// let mut sketch = ThetaSketch::builder().build().unwrap();
/// sketch.update("apple");
/// sketch.update("banana");
///
/// // Convert to compact form for serialization
/// let compact = sketch.compact(true);
/// let bytes = compact.serialize();
///
/// // Deserialize
/// let restored = CompactThetaSketch::deserialize(&bytes).unwrap();
/// assert_eq!(compact.estimate(), restored.estimate());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactThetaSketch {
    theta: u64,
    entries: Vec<u64>,
    seed_hash: u16,
    is_ordered: bool,
    is_empty: bool,
}

impl CompactThetaSketch {
    /// Create a new compact sketch from components. Ordered entries must be ascending.
    pub(crate) fn from_parts(
        entries: Vec<u64>,
        theta: u64,
        seed_hash: u16,
        is_ordered: bool,
        is_empty: bool,
    ) -> Self {
        debug_assert!(!is_ordered || entries.is_sorted());
        Self {
            theta,
            entries,
            seed_hash,
            is_ordered,
            is_empty,
        }
    }

    /// The result of a set operation on nothing but empty inputs.
    pub(crate) fn empty(seed_hash: u16, is_ordered: bool) -> Self {
        Self::from_parts(Vec::new(), MAX_THETA, seed_hash, is_ordered, true)
    }

    /// Check if the sketch is empty (no values have been added)
    pub fn is_empty(&self) -> bool {
        self.is_empty
    }

    /// Check if the retained hashes are sorted ascending
    pub fn is_ordered(&self) -> bool {
        self.is_ordered
    }

    /// Get the cardinality estimate
    ///
    /// Returns the estimated number of distinct values that were inserted
    /// into the original sketch.
    pub fn estimate(&self) -> f64 {
        view::estimate(self.entries.len(), self.theta, self.is_empty)
    }

    /// Return theta as a fraction (0.0 to 1.0)
    pub fn theta(&self) -> f64 {
        self.theta as f64 / MAX_THETA as f64
    }

    /// Return theta as u64
    pub fn theta64(&self) -> u64 {
        self.theta
    }

    /// Check if sketch is in estimation mode
    pub fn is_estimation_mode(&self) -> bool {
        self.theta < MAX_THETA && !self.is_empty
    }

    /// Return number of retained entries
    pub fn num_retained(&self) -> usize {
        self.entries.len()
    }

    /// Return iterator over hash values
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.iter().copied()
    }

    /// Get the seed hash
    pub fn seed_hash(&self) -> u16 {
        self.seed_hash
    }

    /// Returns the approximate lower error bound given the specified number of Standard Deviations.
    pub fn lower_bound(&self, num_std_dev: NumStdDev) -> f64 {
        view::lower_bound(self.entries.len(), self.theta, self.is_empty, num_std_dev)
    }

    /// Returns the approximate upper error bound given the specified number of Standard Deviations.
    pub fn upper_bound(&self, num_std_dev: NumStdDev) -> f64 {
        view::upper_bound(self.entries.len(), self.theta, self.is_empty, num_std_dev)
    }

    /// Whether serial version 4 can represent this sketch.
    ///
    /// Compression needs sorted hashes and at least one of them. A single hash in exact mode
    /// already has the smallest encoding in serial version 3.
    pub fn is_suitable_for_compression(&self) -> bool {
        self.is_ordered
            && !self.entries.is_empty()
            && !(self.entries.len() == 1 && !self.is_estimation_mode())
    }

    /// Serialize the sketch to bytes in serial version 3.
    ///
    /// The serialized format is compatible with Java and C++ DataSketches
    /// implementations.
    pub fn serialize(&self) -> Vec<u8> {
        self.encode_v3()
    }

    /// Serialize the sketch in serial version 4 if it is suitable for compression, falling back
    /// to serial version 3 otherwise.
    ///
    /// # Examples
    ///
    /// ```
    /// # use thetasketch::theta::{CompactThetaSketch, ThetaSketch};
    /// let mut sketch = ThetaSketch::builder().build().unwrap();
    /// for i in 0..100u64 {
    ///     sketch.update_u64(i);
    /// }
    /// let compact = sketch.compact(true);
    /// let bytes = compact.serialize_compressed();
    /// assert!(bytes.len() < compact.serialize().len());
    /// assert_eq!(CompactThetaSketch::deserialize(&bytes).unwrap(), compact);
    /// ```
    pub fn serialize_compressed(&self) -> Vec<u8> {
        if self.is_suitable_for_compression() {
            self.encode_v4()
        } else {
            self.encode_v3()
        }
    }

    /// Serialize the sketch in an explicit serial version.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigInvalid` error if the version is unknown, if versions 1 or 2 are asked
    /// for an unordered sketch, or if version 4 is asked for a sketch not suitable for
    /// compression.
    pub fn serialize_version(&self, serial_version: u8) -> Result<Vec<u8>, Error> {
        match serial_version {
            SERIAL_VERSION_1 | SERIAL_VERSION_2 if !self.is_ordered => Err(Error::config_invalid(
                format!("serial version {serial_version} requires an ordered sketch"),
            )),
            SERIAL_VERSION_1 => Ok(self.encode_v1()),
            SERIAL_VERSION_2 => Ok(self.encode_v2()),
            SERIAL_VERSION_3 => Ok(self.encode_v3()),
            SERIAL_VERSION_4 if !self.is_suitable_for_compression() => {
                Err(Error::config_invalid(
                    "serial version 4 requires an ordered sketch with entries",
                ))
            }
            SERIAL_VERSION_4 => Ok(self.encode_v4()),
            _ => Err(Error::config_invalid(format!(
                "unsupported serial version {serial_version}, expected one of {SUPPORTED_SERIAL_VERSIONS:?}"
            ))),
        }
    }

    /// Number of bytes [`serialize`](Self::serialize) or, with `compressed`,
    /// [`serialize_compressed`](Self::serialize_compressed) produces.
    pub fn serialized_size(&self, compressed: bool) -> usize {
        if compressed && self.is_suitable_for_compression() {
            let entry_bits = compute_entry_bits(&self.entries);
            self.v4_preamble_longs() as usize * 8
                + num_entries_bytes(self.entries.len() as u32) as usize
                + packed_len(self.entries.len(), entry_bits)
        } else {
            self.v3_preamble_longs() as usize * 8 + self.entries.len() * HASH_SIZE_BYTES
        }
    }

    /// Write the serialized sketch to `writer`, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns an error if the writer fails.
    pub fn serialize_to<W: Write>(&self, writer: &mut W, compressed: bool) -> Result<usize, Error> {
        let bytes = if compressed {
            self.serialize_compressed()
        } else {
            self.serialize()
        };
        writer
            .write_all(&bytes)
            .map_err(|e| Error::io("failed to write serialized sketch", e))?;
        Ok(bytes.len())
    }

    fn v3_preamble_longs(&self) -> u8 {
        if self.is_estimation_mode() {
            PREAMBLE_LONGS_ESTIMATION
        } else if self.is_empty || self.entries.len() == 1 {
            PREAMBLE_LONGS_EMPTY
        } else {
            PREAMBLE_LONGS_EXACT
        }
    }

    fn v4_preamble_longs(&self) -> u8 {
        if self.is_estimation_mode() {
            PREAMBLE_LONGS_EXACT
        } else {
            PREAMBLE_LONGS_EMPTY
        }
    }

    fn encode_v1(&self) -> Vec<u8> {
        let mut bytes =
            SketchBytes::with_capacity(24 + self.entries.len() * HASH_SIZE_BYTES);
        bytes.write_u8(PREAMBLE_LONGS_ESTIMATION);
        bytes.write_u8(SERIAL_VERSION_1);
        bytes.write_u8(THETA_FAMILY_ID);
        bytes.write_zeros(5);
        bytes.write_u32_le(self.entries.len() as u32);
        bytes.write_u32_le(0);
        bytes.write_u64_le(self.theta);
        self.write_raw_entries(&mut bytes);
        bytes.into_bytes()
    }

    fn encode_v2(&self) -> Vec<u8> {
        let preamble_longs = if self.is_empty {
            PREAMBLE_LONGS_EMPTY
        } else if self.is_estimation_mode() {
            PREAMBLE_LONGS_ESTIMATION
        } else {
            PREAMBLE_LONGS_EXACT
        };
        let mut bytes = SketchBytes::with_capacity(
            preamble_longs as usize * 8 + self.entries.len() * HASH_SIZE_BYTES,
        );
        bytes.write_u8(preamble_longs);
        bytes.write_u8(SERIAL_VERSION_2);
        bytes.write_u8(THETA_FAMILY_ID);
        bytes.write_zeros(3);
        bytes.write_u16_le(self.seed_hash);
        if preamble_longs > PREAMBLE_LONGS_EMPTY {
            bytes.write_u32_le(self.entries.len() as u32);
            bytes.write_u32_le(0);
        }
        if preamble_longs == PREAMBLE_LONGS_ESTIMATION {
            bytes.write_u64_le(self.theta);
        }
        self.write_raw_entries(&mut bytes);
        bytes.into_bytes()
    }

    fn encode_v3(&self) -> Vec<u8> {
        let preamble_longs = self.v3_preamble_longs();
        let mut bytes = SketchBytes::with_capacity(self.serialized_size(false));

        let mut flags = FLAG_COMPACT | FLAG_READ_ONLY;
        if self.is_empty {
            flags |= FLAG_EMPTY;
        }
        if self.is_ordered {
            flags |= FLAG_ORDERED;
        }
        if preamble_longs == PREAMBLE_LONGS_EMPTY && !self.is_empty {
            flags |= FLAG_SINGLE_ITEM;
        }

        bytes.write_u8(preamble_longs);
        bytes.write_u8(SERIAL_VERSION_3);
        bytes.write_u8(THETA_FAMILY_ID);
        bytes.write_zeros(2);
        bytes.write_u8(flags);
        bytes.write_u16_le(self.seed_hash);
        if preamble_longs > PREAMBLE_LONGS_EMPTY {
            bytes.write_u32_le(self.entries.len() as u32);
            bytes.write_u32_le(0); // p, unused in compact sketches
        }
        if preamble_longs == PREAMBLE_LONGS_ESTIMATION {
            bytes.write_u64_le(self.theta);
        }
        self.write_raw_entries(&mut bytes);
        bytes.into_bytes()
    }

    fn encode_v4(&self) -> Vec<u8> {
        debug_assert!(self.is_suitable_for_compression());

        let entry_bits = compute_entry_bits(&self.entries);
        let num_entries = self.entries.len() as u32;
        let num_entries_bytes = num_entries_bytes(num_entries);
        let mut bytes = SketchBytes::with_capacity(self.serialized_size(true));

        bytes.write_u8(self.v4_preamble_longs());
        bytes.write_u8(SERIAL_VERSION_4);
        bytes.write_u8(THETA_FAMILY_ID);
        bytes.write_u8(entry_bits);
        bytes.write_u8(num_entries_bytes);
        bytes.write_u8(FLAG_COMPACT | FLAG_READ_ONLY | FLAG_ORDERED);
        bytes.write_u16_le(self.seed_hash);
        if self.is_estimation_mode() {
            bytes.write_u64_le(self.theta);
        }
        bytes.write(&num_entries.to_le_bytes()[..num_entries_bytes as usize]);

        let mut previous = 0;
        let deltas: Vec<u64> = self
            .entries
            .iter()
            .map(|&entry| {
                let delta = entry.wrapping_sub(previous);
                previous = entry;
                delta
            })
            .collect();
        let packed = bytes.reserve_tail(packed_len(deltas.len(), entry_bits));
        let written = pack_values(&deltas, entry_bits, packed);
        debug_assert_eq!(written, packed.len());

        bytes.into_bytes()
    }

    fn write_raw_entries(&self, bytes: &mut SketchBytes) {
        for &entry in &self.entries {
            bytes.write_u64_le(entry);
        }
    }

    /// Deserialize a sketch from bytes.
    ///
    /// Uses the default seed (9001). For sketches created with a different seed,
    /// use [`deserialize_with_seed`](Self::deserialize_with_seed).
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are invalid or corrupted.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        Self::deserialize_with_seed(bytes, DEFAULT_UPDATE_SEED)
    }

    /// Deserialize a sketch from bytes with a specific seed.
    ///
    /// # Arguments
    ///
    /// * `bytes` - The serialized sketch bytes, in any serial version from 1 to 4
    /// * `seed` - The seed used during sketch creation
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The bytes are shorter than the header implies
    /// - The format is invalid (wrong family ID, unsupported version, inconsistent preamble)
    /// - The seed hash doesn't match
    pub fn deserialize_with_seed(bytes: &[u8], seed: u64) -> Result<Self, Error> {
        let data = parse_compact(bytes, seed)?;
        Ok(Self::from_parts(
            data.decode_entries(),
            data.theta,
            data.seed_hash,
            data.is_ordered,
            data.is_empty,
        ))
    }

    /// Read one serialized sketch from `reader` and deserialize it.
    ///
    /// Exactly the bytes of one image are consumed, so several images can be read back to back.
    pub fn deserialize_from_reader<R: Read>(reader: &mut R, seed: u64) -> Result<Self, Error> {
        let image = read_image(reader)?;
        Self::deserialize_with_seed(&image, seed)
    }
}

impl ThetaSketchView for CompactThetaSketch {
    fn is_empty(&self) -> bool {
        self.is_empty
    }

    fn is_ordered(&self) -> bool {
        self.is_ordered
    }

    fn theta64(&self) -> u64 {
        self.theta
    }

    fn num_retained(&self) -> usize {
        self.entries.len()
    }

    fn seed_hash(&self) -> u16 {
        self.seed_hash
    }

    fn iter(&self) -> Box<dyn Iterator<Item = u64> + '_> {
        Box::new(self.entries.iter().copied())
    }
}

impl fmt::Display for CompactThetaSketch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        view::write_summary(f, self, |_| Ok(()))
    }
}
