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

//! Entry points for thin embedding layers (C or WASM exports).
//!
//! Instances are handed out boxed so a shim can turn them into raw pointers, and taken back by
//! [`destroy`], which consumes the box. Serialization writes into a caller buffer and returns the
//! number of bytes written, or `-1` without touching the buffer when it is too small.
//!
//! lg_k arrives as a host integer and is clamped with [`clamp_lg_k`]; this is the only place
//! out-of-range configuration is adjusted rather than rejected.

use crate::common::ResizeFactor;
use crate::error::Error;
use crate::theta::CompactThetaSketch;
use crate::theta::ThetaANotB;
use crate::theta::ThetaIntersection;
use crate::theta::ThetaSketch;
use crate::theta::ThetaSketchView;
use crate::theta::ThetaUnion;
use crate::theta::WrappedCompactThetaSketch;
use crate::theta::hash_table::DEFAULT_LG_K;
use crate::theta::hash_table::MAX_LG_K;
use crate::theta::hash_table::MIN_LG_K;

/// Returned by the serialize functions when the buffer cannot hold the image.
pub const SERIALIZE_FAILED: i64 = -1;

/// A sketch input from the host: a live sketch, a deserialized one, or raw serialized bytes.
#[derive(Debug, Clone, Copy)]
pub enum HostSketch<'a> {
    Update(&'a ThetaSketch),
    Compact(&'a CompactThetaSketch),
    Bytes(&'a [u8]),
}

impl HostSketch<'_> {
    /// Run `f` over this input as a sketch view. Bytes are wrapped in place and checked against
    /// `seed`.
    fn with_view<R>(
        self,
        seed: u64,
        f: impl FnOnce(&dyn ThetaSketchView) -> Result<R, Error>,
    ) -> Result<R, Error> {
        match self {
            HostSketch::Update(sketch) => f(sketch),
            HostSketch::Compact(sketch) => f(sketch),
            HostSketch::Bytes(bytes) => f(&WrappedCompactThetaSketch::wrap(bytes, seed)?),
        }
    }
}

/// Map a host-provided lg_k into the supported range. Zero or negative means the default.
///
/// # Examples
///
/// ```
/// # use thetasketch::theta::host::clamp_lg_k;
/// assert_eq!(clamp_lg_k(0), 12);
/// assert_eq!(clamp_lg_k(3), 5);
/// assert_eq!(clamp_lg_k(14), 14);
/// assert_eq!(clamp_lg_k(40), 26);
/// ```
pub fn clamp_lg_k(lg_k: i64) -> u8 {
    if lg_k <= 0 {
        DEFAULT_LG_K
    } else {
        lg_k.clamp(MIN_LG_K as i64, MAX_LG_K as i64) as u8
    }
}

/// Construct an empty update sketch.
///
/// # Errors
///
/// Returns a `ConfigInvalid` error for an out-of-range sampling probability or resize factor,
/// or a seed whose hash is zero.
pub fn update_sketch_new(
    lg_k: i64,
    seed: u64,
    sampling_probability: f32,
    resize_factor_lg: u8,
) -> Result<Box<ThetaSketch>, Error> {
    let sketch = ThetaSketch::builder()
        .lg_k(clamp_lg_k(lg_k))
        .seed(seed)
        .sampling_probability(sampling_probability)
        .resize_factor(ResizeFactor::from_lg(resize_factor_lg)?)
        .build()?;
    Ok(Box::new(sketch))
}

pub fn update_bytes(sketch: &mut ThetaSketch, data: &[u8]) {
    sketch.update(data);
}

pub fn update_i64(sketch: &mut ThetaSketch, value: i64) {
    sketch.update_i64(value);
}

/// Compact the sketch and write it into `buf`.
pub fn update_sketch_serialize(
    sketch: &ThetaSketch,
    ordered: bool,
    compressed: bool,
    buf: &mut [u8],
) -> i64 {
    compact_sketch_serialize(&sketch.compact(ordered), compressed, buf)
}

/// Write a compact sketch into `buf`, compressed when asked and possible.
pub fn compact_sketch_serialize(
    sketch: &CompactThetaSketch,
    compressed: bool,
    buf: &mut [u8],
) -> i64 {
    let size = sketch.serialized_size(compressed);
    if size > buf.len() {
        return SERIALIZE_FAILED;
    }
    let bytes = if compressed {
        sketch.serialize_compressed()
    } else {
        sketch.serialize()
    };
    buf[..bytes.len()].copy_from_slice(&bytes);
    bytes.len() as i64
}

pub fn compact_sketch_deserialize(bytes: &[u8], seed: u64) -> Result<Box<CompactThetaSketch>, Error> {
    CompactThetaSketch::deserialize_with_seed(bytes, seed).map(Box::new)
}

pub fn compact_sketch_estimate(sketch: &CompactThetaSketch) -> f64 {
    sketch.estimate()
}

/// Construct a union. lg_k is clamped like [`update_sketch_new`].
pub fn union_new(lg_k: i64, seed: u64) -> Result<Box<ThetaUnion>, Error> {
    let union = ThetaUnion::builder()
        .lg_k(clamp_lg_k(lg_k))
        .seed(seed)
        .build()?;
    Ok(Box::new(union))
}

pub fn union_update(union: &mut ThetaUnion, sketch: HostSketch<'_>) -> Result<(), Error> {
    let seed = union.hash_seed();
    sketch.with_view(seed, |view| union.update(view))
}

pub fn union_serialize(union: &ThetaUnion, compressed: bool, buf: &mut [u8]) -> i64 {
    compact_sketch_serialize(&union.result(true), compressed, buf)
}

/// Union a serialized sketch held in the first `compact_len` bytes of `buf` with `sketch`, and
/// write the result back into `buf`.
///
/// # Errors
///
/// Returns an error if the serialized sketch is invalid or its seed differs from `sketch`'s.
pub fn union_serialized_in_place(
    buf: &mut [u8],
    compact_len: usize,
    sketch: &ThetaSketch,
    lg_k: i64,
) -> Result<i64, Error> {
    let mut union = ThetaUnion::builder()
        .lg_k(clamp_lg_k(lg_k))
        .seed(sketch.hash_seed())
        .build()?;
    let serialized = buf.get(..compact_len).ok_or_else(|| {
        Error::insufficient_bytes(compact_len, buf.len())
    })?;
    union.update(&WrappedCompactThetaSketch::wrap(serialized, sketch.hash_seed())?)?;
    union.update(sketch)?;
    Ok(compact_sketch_serialize(&union.result(true), false, buf))
}

pub fn intersection_new(seed: u64) -> Box<ThetaIntersection> {
    Box::new(ThetaIntersection::new(seed))
}

pub fn intersection_update(
    intersection: &mut ThetaIntersection,
    sketch: HostSketch<'_>,
) -> Result<(), Error> {
    let seed = intersection.hash_seed();
    sketch.with_view(seed, |view| intersection.update(view))
}

/// Write the intersection result into `buf`.
///
/// # Errors
///
/// Returns an `UndefinedState` error if the intersection has not been updated yet.
pub fn intersection_serialize(
    intersection: &ThetaIntersection,
    compressed: bool,
    buf: &mut [u8],
) -> Result<i64, Error> {
    let result = intersection.result()?;
    Ok(compact_sketch_serialize(&result, compressed, buf))
}

pub fn a_not_b_new(seed: u64) -> Box<ThetaANotB> {
    Box::new(ThetaANotB::new(seed))
}

/// Compute `a` and not `b`, and write the ordered result into `buf`.
pub fn a_not_b_serialize(
    a_not_b: &ThetaANotB,
    a: HostSketch<'_>,
    b: HostSketch<'_>,
    compressed: bool,
    buf: &mut [u8],
) -> Result<i64, Error> {
    let seed = a_not_b.hash_seed();
    let result = a.with_view(seed, |a| b.with_view(seed, |b| a_not_b.compute(a, b, true)))?;
    Ok(compact_sketch_serialize(&result, compressed, buf))
}

/// Release an instance handed out by this module.
pub fn destroy<T>(instance: Box<T>) {
    drop(instance);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::hash::DEFAULT_UPDATE_SEED;

    fn filled(range: std::ops::Range<i64>) -> Box<ThetaSketch> {
        let mut sketch = update_sketch_new(12, DEFAULT_UPDATE_SEED, 1.0, 3).unwrap();
        for i in range {
            update_i64(&mut sketch, i);
        }
        sketch
    }

    #[test]
    fn test_update_sketch_new_validates() {
        let sketch = update_sketch_new(-1, DEFAULT_UPDATE_SEED, 1.0, 3).unwrap();
        assert_eq!(sketch.lg_k(), DEFAULT_LG_K);
        destroy(sketch);

        let err = update_sketch_new(12, DEFAULT_UPDATE_SEED, 1.0, 4).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
        let err = update_sketch_new(12, DEFAULT_UPDATE_SEED, 0.0, 3).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_serialize_into_small_buffer() {
        let sketch = filled(0..100);
        let mut buf = vec![0xAAu8; 16];
        assert_eq!(
            update_sketch_serialize(&sketch, true, false, &mut buf),
            SERIALIZE_FAILED
        );
        assert!(buf.iter().all(|&b| b == 0xAA));

        let mut buf = vec![0u8; 1024];
        let written = update_sketch_serialize(&sketch, true, false, &mut buf);
        assert_eq!(written, 16 + 100 * 8);
        let restored = compact_sketch_deserialize(&buf[..written as usize], DEFAULT_UPDATE_SEED)
            .unwrap();
        assert_eq!(compact_sketch_estimate(&restored), 100.0);
    }

    #[test]
    fn test_union_with_every_input_kind() {
        let a = filled(0..100);
        let b = a.compact(true);
        let c = filled(200..300).compact(true).serialize_compressed();

        let mut union = union_new(0, DEFAULT_UPDATE_SEED).unwrap();
        union_update(&mut union, HostSketch::Update(&a)).unwrap();
        union_update(&mut union, HostSketch::Compact(&b)).unwrap();
        union_update(&mut union, HostSketch::Bytes(&c)).unwrap();

        let mut buf = vec![0u8; 4096];
        let written = union_serialize(&union, true, &mut buf);
        assert!(written > 0);
        let result = compact_sketch_deserialize(&buf[..written as usize], DEFAULT_UPDATE_SEED)
            .unwrap();
        assert_eq!(result.estimate(), 200.0);
        destroy(union);
    }

    #[test]
    fn test_union_serialized_in_place() {
        let a = filled(0..50);
        let b = filled(25..75);
        let mut buf = vec![0u8; 1024];
        let len = update_sketch_serialize(&a, true, false, &mut buf) as usize;

        let written = union_serialized_in_place(&mut buf, len, &b, 12).unwrap();
        let result = compact_sketch_deserialize(&buf[..written as usize], DEFAULT_UPDATE_SEED)
            .unwrap();
        assert_eq!(result.estimate(), 75.0);

        let err = union_serialized_in_place(&mut buf, 4096, &b, 12).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientData);
    }

    #[test]
    fn test_intersection_and_a_not_b() {
        let a = filled(0..100);
        let b = filled(50..150).compact(true).serialize();

        let mut intersection = intersection_new(DEFAULT_UPDATE_SEED);
        let mut buf = vec![0u8; 4096];
        let err = intersection_serialize(&intersection, false, &mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UndefinedState);

        intersection_update(&mut intersection, HostSketch::Update(&a)).unwrap();
        intersection_update(&mut intersection, HostSketch::Bytes(&b)).unwrap();
        let written = intersection_serialize(&intersection, false, &mut buf).unwrap();
        let result = compact_sketch_deserialize(&buf[..written as usize], DEFAULT_UPDATE_SEED)
            .unwrap();
        assert_eq!(result.estimate(), 50.0);

        let a_not_b = a_not_b_new(DEFAULT_UPDATE_SEED);
        let written = a_not_b_serialize(
            &a_not_b,
            HostSketch::Update(&a),
            HostSketch::Bytes(&b),
            true,
            &mut buf,
        )
        .unwrap();
        let result = compact_sketch_deserialize(&buf[..written as usize], DEFAULT_UPDATE_SEED)
            .unwrap();
        assert_eq!(result.estimate(), 50.0);
    }

    #[test]
    fn test_bytes_with_other_seed_are_rejected() {
        let mut other = update_sketch_new(12, 7, 1.0, 3).unwrap();
        update_i64(&mut other, 1);
        let bytes = other.serialize();

        let mut union = union_new(12, DEFAULT_UPDATE_SEED).unwrap();
        let err = union_update(&mut union, HostSketch::Bytes(&bytes)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SeedMismatch);
    }
}
