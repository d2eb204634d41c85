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

//! Binary serialization format for compact Theta sketches.
//!
//! Four serial versions exist. Every image starts with the same three bytes and is little endian
//! throughout.
//!
//! | Byte | Field |
//! |------|-------|
//! | 0 | preamble_longs: number of 8-byte words in the preamble |
//! | 1 | serial_version (1 to 4) |
//! | 2 | family_id (3 for compact Theta) |
//!
//! ## Serial version 1
//!
//! Preamble longs is always 3. No flags and no seed hash: the sketch is ordered and the reader's
//! seed is assumed.
//!
//! | Byte | Field |
//! |------|-------|
//! | 8-11 | retained entries |
//! | 16-23 | theta |
//! | 24- | hashes |
//!
//! ## Serial version 2
//!
//! Seed hash at bytes 6-7, no flags, always ordered. Preamble longs 1 is an empty sketch, 2 adds
//! the entry count at byte 8 (hashes from byte 16), 3 adds theta at byte 16 (hashes from byte 24).
//!
//! ## Serial version 3
//!
//! | Byte | Field |
//! |------|-------|
//! | 5 | flags |
//! | 6-7 | seed_hash |
//! | 8-11 | retained entries (preamble longs >= 2) |
//! | 12-15 | p as float, unused by compact sketches |
//! | 16-23 | theta (preamble longs 3) |
//!
//! Preamble longs 1 is either an empty sketch or a single hash at byte 8.
//!
//! ## Serial version 4 (compressed)
//!
//! Only ordered, non-empty sketches are written this way.
//!
//! | Byte | Field |
//! |------|-------|
//! | 3 | entry_bits: width of each packed delta |
//! | 4 | num_entries_bytes: bytes used by the entry count (1 to 4) |
//! | 5 | flags |
//! | 6-7 | seed_hash |
//! | 8-15 | theta (preamble longs 2) |
//!
//! The entry count follows the preamble as `num_entries_bytes` little-endian bytes, then the
//! deltas between consecutive hashes (the first against 0) packed MSB-first at `entry_bits` each.
//!
//! ## Flags
//!
//! | Bit | Name |
//! |-----|------|
//! | 1 | READ_ONLY |
//! | 2 | EMPTY |
//! | 3 | COMPACT |
//! | 4 | ORDERED |
//! | 5 | SINGLE_ITEM |

use std::io::Read;

use byteorder::ByteOrder;
use byteorder::LittleEndian;

use crate::codec::Family;
use crate::codec::SketchSlice;
use crate::codec::assert::ensure_min_bytes;
use crate::codec::assert::ensure_preamble_longs_in;
use crate::codec::assert::ensure_serial_version_in;
use crate::codec::assert::insufficient_data;
use crate::codec::assert::stream_error;
use crate::error::Error;
use crate::hash::compute_seed_hash;
use crate::theta::bit_pack::BitUnpacker;
use crate::theta::bit_pack::MAX_BLOCK_BITS;
use crate::theta::bit_pack::packed_len;
use crate::theta::bit_pack::unpack_values;
use crate::theta::hash_table::MAX_THETA;

pub const THETA_FAMILY_ID: u8 = Family::COMPACT_THETA.id;

pub const SERIAL_VERSION_1: u8 = 1;
pub const SERIAL_VERSION_2: u8 = 2;
pub const SERIAL_VERSION_3: u8 = 3;
pub const SERIAL_VERSION_4: u8 = 4;
pub const SUPPORTED_SERIAL_VERSIONS: [u8; 4] = [
    SERIAL_VERSION_1,
    SERIAL_VERSION_2,
    SERIAL_VERSION_3,
    SERIAL_VERSION_4,
];

pub const FLAG_READ_ONLY: u8 = 1 << 1;
pub const FLAG_EMPTY: u8 = 1 << 2;
pub const FLAG_COMPACT: u8 = 1 << 3;
pub const FLAG_ORDERED: u8 = 1 << 4;
pub const FLAG_SINGLE_ITEM: u8 = 1 << 5;

pub const PREAMBLE_LONGS_EMPTY: u8 = 1;
pub const PREAMBLE_LONGS_EXACT: u8 = 2;
pub const PREAMBLE_LONGS_ESTIMATION: u8 = 3;

pub const HASH_SIZE_BYTES: usize = 8;

/// Bytes every image has, whatever its version.
pub(crate) const MIN_IMAGE_BYTES: usize = 8;

const ENTRY_BITS_BYTE: usize = 3;
const NUM_ENTRIES_BYTES_BYTE: usize = 4;
const FLAGS_BYTE: usize = 5;
const SEED_HASH_SHORT: usize = 6;
const NUM_ENTRIES_U32: usize = 8;
const THETA_LONG: usize = 16;
const V4_THETA_LONG: usize = 8;

/// Returns the minimal number of bytes able to hold `num_entries`.
pub(crate) fn num_entries_bytes(num_entries: u32) -> u8 {
    (u32::BITS - num_entries.leading_zeros()).div_ceil(8) as u8
}

/// Returns the width able to hold every delta of the ascending `entries`.
pub(crate) fn compute_entry_bits(entries: &[u64]) -> u8 {
    let mut previous = 0u64;
    let mut ored = 0u64;
    for &entry in entries {
        ored |= entry.wrapping_sub(previous);
        previous = entry;
    }
    (u64::BITS - ored.leading_zeros()).max(1) as u8
}

/// Location and encoding of the retained hashes inside a serialized image.
#[derive(Debug, Clone, Copy)]
pub(crate) enum EntryData<'a> {
    /// `num_entries` little-endian u64 hashes.
    Raw(&'a [u8]),
    /// Deltas packed at `entry_bits` each.
    Packed { entry_bits: u8, bytes: &'a [u8] },
}

/// A validated view of a serialized compact sketch. Entry bytes are borrowed, not decoded.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CompactSketchData<'a> {
    pub serial_version: u8,
    pub is_empty: bool,
    pub is_ordered: bool,
    pub seed_hash: u16,
    pub theta: u64,
    pub num_entries: usize,
    pub entries: EntryData<'a>,
}

impl CompactSketchData<'_> {
    /// Decodes the retained hashes.
    pub fn decode_entries(&self) -> Vec<u64> {
        match self.entries {
            EntryData::Raw(bytes) => bytes
                .chunks_exact(HASH_SIZE_BYTES)
                .map(LittleEndian::read_u64)
                .collect(),
            EntryData::Packed { entry_bits, bytes } => {
                let mut entries = vec![0u64; self.num_entries];
                unpack_values(&mut entries, entry_bits, bytes);
                let mut previous = 0u64;
                for entry in &mut entries {
                    *entry = entry.wrapping_add(previous);
                    previous = *entry;
                }
                entries
            }
        }
    }
}

/// Parses and validates the header of a serialized compact sketch.
///
/// Every check happens before entry data is touched: family, serial version, preamble longs
/// against the flags, the seed hash for non-empty sketches, and the total length the header
/// implies.
pub(crate) fn parse_compact(bytes: &[u8], seed: u64) -> Result<CompactSketchData<'_>, Error> {
    ensure_min_bytes(bytes.len(), MIN_IMAGE_BYTES)?;

    let mut cursor = SketchSlice::new(bytes);
    let preamble_longs = cursor.read_u8().map_err(insufficient_data("preamble_longs"))?;
    let serial_version = cursor.read_u8().map_err(insufficient_data("serial_version"))?;
    let family_id = cursor.read_u8().map_err(insufficient_data("family_id"))?;

    Family::COMPACT_THETA.validate_id(family_id)?;
    ensure_serial_version_in(&SUPPORTED_SERIAL_VERSIONS, serial_version)?;

    let expected_seed_hash = compute_seed_hash(seed);
    let data = match serial_version {
        SERIAL_VERSION_1 => parse_v1(bytes, &mut cursor, preamble_longs, expected_seed_hash)?,
        SERIAL_VERSION_2 => parse_v2(bytes, &mut cursor, preamble_longs)?,
        SERIAL_VERSION_3 => parse_v3(bytes, &mut cursor, preamble_longs)?,
        _ => parse_v4(bytes, &mut cursor, preamble_longs)?,
    };

    if !data.is_empty && data.seed_hash != expected_seed_hash {
        return Err(Error::seed_hash_mismatch(expected_seed_hash, data.seed_hash));
    }
    if data.theta == 0 || data.theta > MAX_THETA {
        return Err(Error::deserial(format!(
            "corrupted sketch: theta {} out of range",
            data.theta
        )));
    }
    if data.is_ordered && !entries_sorted(&data) {
        return Err(Error::deserial("ordered flag set but entries unsorted"));
    }

    tracing::trace!(
        serial_version,
        preamble_longs,
        num_entries = data.num_entries,
        is_empty = data.is_empty,
        "parsed compact theta sketch"
    );
    Ok(data)
}

fn parse_v1<'a>(
    bytes: &'a [u8],
    cursor: &mut SketchSlice<'_>,
    preamble_longs: u8,
    expected_seed_hash: u16,
) -> Result<CompactSketchData<'a>, Error> {
    ensure_preamble_longs_in(&[PREAMBLE_LONGS_ESTIMATION], preamble_longs)?;
    let data_offset = PREAMBLE_LONGS_ESTIMATION as usize * 8;
    ensure_min_bytes(bytes.len(), data_offset)?;

    cursor.seek(NUM_ENTRIES_U32);
    let num_entries = cursor.read_u32_le().map_err(insufficient_data("num_entries"))? as usize;
    cursor.seek(THETA_LONG);
    let theta = cursor.read_u64_le().map_err(insufficient_data("theta"))?;

    let entries = raw_entries(bytes, data_offset, num_entries)?;
    Ok(CompactSketchData {
        serial_version: SERIAL_VERSION_1,
        is_empty: num_entries == 0 && theta == MAX_THETA,
        is_ordered: true,
        seed_hash: expected_seed_hash,
        theta,
        num_entries,
        entries,
    })
}

fn parse_v2<'a>(
    bytes: &'a [u8],
    cursor: &mut SketchSlice<'_>,
    preamble_longs: u8,
) -> Result<CompactSketchData<'a>, Error> {
    ensure_preamble_longs_in(
        &[
            PREAMBLE_LONGS_EMPTY,
            PREAMBLE_LONGS_EXACT,
            PREAMBLE_LONGS_ESTIMATION,
        ],
        preamble_longs,
    )?;
    cursor.seek(SEED_HASH_SHORT);
    let seed_hash = cursor.read_u16_le().map_err(insufficient_data("seed_hash"))?;

    let data_offset = preamble_longs as usize * 8;
    ensure_min_bytes(bytes.len(), data_offset)?;

    let (num_entries, theta) = match preamble_longs {
        PREAMBLE_LONGS_EMPTY => (0, MAX_THETA),
        PREAMBLE_LONGS_EXACT => (read_num_entries(cursor)?, MAX_THETA),
        _ => {
            let num_entries = read_num_entries(cursor)?;
            cursor.seek(THETA_LONG);
            let theta = cursor.read_u64_le().map_err(insufficient_data("theta"))?;
            (num_entries, theta)
        }
    };

    let entries = raw_entries(bytes, data_offset, num_entries)?;
    Ok(CompactSketchData {
        serial_version: SERIAL_VERSION_2,
        is_empty: num_entries == 0 && theta == MAX_THETA,
        is_ordered: true,
        seed_hash,
        theta,
        num_entries,
        entries,
    })
}

fn parse_v3<'a>(
    bytes: &'a [u8],
    cursor: &mut SketchSlice<'_>,
    preamble_longs: u8,
) -> Result<CompactSketchData<'a>, Error> {
    cursor.seek(FLAGS_BYTE);
    let flags = cursor.read_u8().map_err(insufficient_data("flags"))?;
    let seed_hash = cursor.read_u16_le().map_err(insufficient_data("seed_hash"))?;

    if flags & FLAG_COMPACT == 0 {
        return Err(Error::deserial("only compact sketches are supported"));
    }
    let is_empty = flags & FLAG_EMPTY != 0;
    let is_ordered = flags & FLAG_ORDERED != 0;

    if is_empty {
        ensure_preamble_longs_in(&[PREAMBLE_LONGS_EMPTY], preamble_longs)?;
        return Ok(CompactSketchData {
            serial_version: SERIAL_VERSION_3,
            is_empty: true,
            is_ordered,
            seed_hash,
            theta: MAX_THETA,
            num_entries: 0,
            entries: EntryData::Raw(&[]),
        });
    }

    Family::COMPACT_THETA.validate_pre_longs(preamble_longs)?;
    let (num_entries, theta, data_offset) = match preamble_longs {
        // a single hash right after the preamble
        PREAMBLE_LONGS_EMPTY => (1, MAX_THETA, 8),
        PREAMBLE_LONGS_EXACT => {
            ensure_min_bytes(bytes.len(), 16)?;
            (read_num_entries(cursor)?, MAX_THETA, 16)
        }
        _ => {
            ensure_min_bytes(bytes.len(), 24)?;
            let num_entries = read_num_entries(cursor)?;
            cursor.seek(THETA_LONG);
            let theta = cursor.read_u64_le().map_err(insufficient_data("theta"))?;
            (num_entries, theta, 24)
        }
    };

    let entries = raw_entries(bytes, data_offset, num_entries)?;
    Ok(CompactSketchData {
        serial_version: SERIAL_VERSION_3,
        is_empty: false,
        is_ordered,
        seed_hash,
        theta,
        num_entries,
        entries,
    })
}

fn parse_v4<'a>(
    bytes: &'a [u8],
    cursor: &mut SketchSlice<'_>,
    preamble_longs: u8,
) -> Result<CompactSketchData<'a>, Error> {
    cursor.seek(ENTRY_BITS_BYTE);
    let entry_bits = cursor.read_u8().map_err(insufficient_data("entry_bits"))?;
    let num_entries_bytes = cursor
        .read_u8()
        .map_err(insufficient_data("num_entries_bytes"))?;
    let flags = cursor.read_u8().map_err(insufficient_data("flags"))?;
    let seed_hash = cursor.read_u16_le().map_err(insufficient_data("seed_hash"))?;

    if flags & FLAG_EMPTY != 0 {
        return Err(Error::deserial(
            "compressed sketch must not have the empty flag",
        ));
    }
    if flags & FLAG_COMPACT == 0 || flags & FLAG_ORDERED == 0 {
        return Err(Error::deserial(format!(
            "compressed sketch must be compact and ordered, flags: {flags:#010b}"
        )));
    }
    ensure_preamble_longs_in(
        &[PREAMBLE_LONGS_EMPTY, PREAMBLE_LONGS_EXACT],
        preamble_longs,
    )?;
    ensure_entry_bits(entry_bits)?;
    ensure_num_entries_bytes(num_entries_bytes)?;

    let count_offset = preamble_longs as usize * 8;
    ensure_min_bytes(bytes.len(), count_offset + num_entries_bytes as usize)?;

    let theta = if preamble_longs == PREAMBLE_LONGS_EXACT {
        cursor.seek(V4_THETA_LONG);
        cursor.read_u64_le().map_err(insufficient_data("theta"))?
    } else {
        MAX_THETA
    };

    let num_entries = bytes[count_offset..count_offset + num_entries_bytes as usize]
        .iter()
        .rev()
        .fold(0usize, |acc, &b| (acc << 8) | b as usize);
    if num_entries == 0 {
        return Err(Error::deserial(
            "corrupted compressed sketch: zero entries",
        ));
    }

    let data_offset = count_offset + num_entries_bytes as usize;
    let data_len = packed_len(num_entries, entry_bits);
    ensure_min_bytes(bytes.len(), data_offset + data_len)?;

    Ok(CompactSketchData {
        serial_version: SERIAL_VERSION_4,
        is_empty: false,
        is_ordered: true,
        seed_hash,
        theta,
        num_entries,
        entries: EntryData::Packed {
            entry_bits,
            bytes: &bytes[data_offset..data_offset + data_len],
        },
    })
}

/// Walks the entries without decoding them into a buffer. Packed deltas are never negative, so
/// a packed image is out of order only when the running sum overflows.
fn entries_sorted(data: &CompactSketchData<'_>) -> bool {
    match data.entries {
        EntryData::Raw(bytes) => bytes
            .chunks_exact(HASH_SIZE_BYTES)
            .map(LittleEndian::read_u64)
            .is_sorted(),
        EntryData::Packed { entry_bits, bytes } => {
            let mut unpacker = BitUnpacker::new(bytes);
            let mut previous = 0u64;
            (0..data.num_entries).all(|_| {
                match previous.checked_add(unpacker.unpack_value(entry_bits)) {
                    Some(entry) => {
                        previous = entry;
                        true
                    }
                    None => false,
                }
            })
        }
    }
}

fn ensure_entry_bits(entry_bits: u8) -> Result<(), Error> {
    if !(1..=MAX_BLOCK_BITS).contains(&entry_bits) {
        return Err(Error::deserial(format!(
            "invalid entry bits: expected 1 to {MAX_BLOCK_BITS}, got {entry_bits}"
        )));
    }
    Ok(())
}

fn ensure_num_entries_bytes(num_entries_bytes: u8) -> Result<(), Error> {
    if !(1..=4).contains(&num_entries_bytes) {
        return Err(Error::deserial(format!(
            "invalid num entries bytes: expected 1 to 4, got {num_entries_bytes}"
        )));
    }
    Ok(())
}

fn read_num_entries(cursor: &mut SketchSlice<'_>) -> Result<usize, Error> {
    cursor.seek(NUM_ENTRIES_U32);
    let num_entries = cursor.read_u32_le().map_err(insufficient_data("num_entries"))?;
    Ok(num_entries as usize)
}

fn raw_entries(bytes: &[u8], data_offset: usize, num_entries: usize) -> Result<EntryData<'_>, Error> {
    let end = data_offset + num_entries * HASH_SIZE_BYTES;
    ensure_min_bytes(bytes.len(), end)?;
    Ok(EntryData::Raw(&bytes[data_offset..end]))
}

/// Returns the total image length implied by a header, or `Ok(None)` if more header bytes are
/// needed to tell. `header` must hold at least [`MIN_IMAGE_BYTES`].
fn image_len(header: &[u8]) -> Result<Option<usize>, Error> {
    let preamble_longs = header[0];
    let serial_version = header[1];
    Family::COMPACT_THETA.validate_id(header[2])?;
    ensure_serial_version_in(&SUPPORTED_SERIAL_VERSIONS, serial_version)?;

    let preamble_bytes = preamble_longs as usize * 8;
    if serial_version == SERIAL_VERSION_4 {
        ensure_entry_bits(header[ENTRY_BITS_BYTE])?;
        ensure_num_entries_bytes(header[NUM_ENTRIES_BYTES_BYTE])?;
        let count_end = preamble_bytes + header[NUM_ENTRIES_BYTES_BYTE] as usize;
        if header.len() < count_end {
            return Ok(None);
        }
        let num_entries = header[preamble_bytes..count_end]
            .iter()
            .rev()
            .fold(0usize, |acc, &b| (acc << 8) | b as usize);
        return Ok(Some(
            count_end + packed_len(num_entries, header[ENTRY_BITS_BYTE]),
        ));
    }

    let is_empty_v3 =
        serial_version == SERIAL_VERSION_3 && header[FLAGS_BYTE] & FLAG_EMPTY != 0;
    if preamble_longs <= PREAMBLE_LONGS_EMPTY {
        return Ok(Some(if is_empty_v3 || serial_version == SERIAL_VERSION_2 {
            MIN_IMAGE_BYTES
        } else {
            MIN_IMAGE_BYTES + HASH_SIZE_BYTES
        }));
    }
    if header.len() < NUM_ENTRIES_U32 + 4 {
        return Ok(None);
    }
    let num_entries = LittleEndian::read_u32(&header[NUM_ENTRIES_U32..]) as usize;
    Ok(Some(preamble_bytes + num_entries * HASH_SIZE_BYTES))
}

/// Reads exactly one serialized compact sketch image from a stream.
pub(crate) fn read_image<R: Read>(reader: &mut R) -> Result<Vec<u8>, Error> {
    let mut image = vec![0u8; MIN_IMAGE_BYTES];
    reader
        .read_exact(&mut image)
        .map_err(stream_error("preamble"))?;

    // v4 keeps its count past the preamble; the other versions at byte 8. One extra read of the
    // preamble remainder is always enough to learn the total.
    let preamble_bytes = (image[0] as usize * 8).max(MIN_IMAGE_BYTES);
    let header_len = if image[1] == SERIAL_VERSION_4 {
        preamble_bytes + image[NUM_ENTRIES_BYTES_BYTE] as usize
    } else {
        preamble_bytes.min(NUM_ENTRIES_U32 + 8)
    };
    let total = match image_len(&image)? {
        Some(total) => total,
        None => {
            image.resize(header_len, 0);
            reader
                .read_exact(&mut image[MIN_IMAGE_BYTES..])
                .map_err(stream_error("preamble"))?;
            image_len(&image)?.ok_or_else(|| Error::deserial("truncated preamble"))?
        }
    };

    // the header count is untrusted, so the buffer grows only as bytes arrive
    let read = image.len();
    if total > read {
        reader
            .by_ref()
            .take((total - read) as u64)
            .read_to_end(&mut image)
            .map_err(stream_error("entries"))?;
        ensure_min_bytes(image.len(), total)?;
    }
    Ok(image)
}
