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

//! Set difference (A and not B) of theta sketches.

use crate::error::Error;
use crate::hash::DEFAULT_UPDATE_SEED;
use crate::hash::compute_seed_hash;
use crate::theta::CompactThetaSketch;
use crate::theta::ThetaSketchView;
use crate::theta::hash_table::MAX_THETA;
use crate::theta::hash_table::HashLookup;

/// Stateless operator computing the hashes of one sketch absent from another.
///
/// # Examples
///
/// ```
/// use thetasketch::theta::ThetaANotB;
/// use thetasketch::theta::ThetaSketch;
///
/// let mut a = ThetaSketch::builder().build().unwrap();
/// let mut b = ThetaSketch::builder().build().unwrap();
/// for i in 0..100u64 {
///     a.update_u64(i);
///     b.update_u64(i + 50);
/// }
///
/// let a_not_b = ThetaANotB::default();
/// let result = a_not_b.compute(&a, &b, true).unwrap();
/// assert_eq!(result.estimate(), 50.0);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ThetaANotB {
    seed: u64,
    seed_hash: u16,
}

impl Default for ThetaANotB {
    fn default() -> Self {
        Self::new(DEFAULT_UPDATE_SEED)
    }
}

impl ThetaANotB {
    /// Creates a new operator for sketches built with `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            seed_hash: compute_seed_hash(seed),
        }
    }

    /// Computes the hashes of `a` that are not in `b`.
    ///
    /// The result theta is the smaller of both thetas. Both inputs ordered use a merge walk,
    /// otherwise `b` is loaded into a hash table.
    ///
    /// # Errors
    ///
    /// Returns a `SeedMismatch` error if a non-empty input was built with a different seed.
    pub fn compute<A, B>(&self, a: &A, b: &B, ordered: bool) -> Result<CompactThetaSketch, Error>
    where
        A: ThetaSketchView + ?Sized,
        B: ThetaSketchView + ?Sized,
    {
        self.check_seed_hash(a)?;
        self.check_seed_hash(b)?;

        if a.is_empty() {
            return Ok(CompactThetaSketch::empty(self.seed_hash, true));
        }

        let theta = a.theta64().min(b.theta64());
        let mut entries = if b.num_retained() == 0 {
            a.iter().filter(|&hash| hash < theta).collect()
        } else if a.is_ordered() && b.is_ordered() {
            merge_difference(a, b, theta)
        } else {
            lookup_difference(a, b, theta)
        };

        let is_empty = entries.is_empty() && theta == MAX_THETA;
        if ordered && !a.is_ordered() {
            entries.sort_unstable();
        }
        let is_ordered = a.is_ordered() || ordered || entries.len() <= 1;
        tracing::trace!(
            num_retained = entries.len(),
            theta,
            "computed a-not-b result"
        );
        Ok(CompactThetaSketch::from_parts(
            entries,
            theta,
            self.seed_hash,
            is_ordered,
            is_empty,
        ))
    }

    pub(crate) fn hash_seed(&self) -> u64 {
        self.seed
    }

    fn check_seed_hash<S: ThetaSketchView + ?Sized>(&self, sketch: &S) -> Result<(), Error> {
        if !sketch.is_empty() && sketch.seed_hash() != self.seed_hash {
            return Err(Error::seed_hash_mismatch(self.seed_hash, sketch.seed_hash()));
        }
        Ok(())
    }
}

/// Hashes of `a` below `theta` missing from a lookup set built over `b`.
fn lookup_difference<A, B>(a: &A, b: &B, theta: u64) -> Vec<u64>
where
    A: ThetaSketchView + ?Sized,
    B: ThetaSketchView + ?Sized,
{
    let b_hashes: Vec<u64> = b.iter().filter(|&hash| hash < theta).collect();
    let lookup = HashLookup::new(&b_hashes);

    let mut entries = Vec::new();
    for hash in a.iter() {
        if hash < theta {
            if !lookup.contains(hash) {
                entries.push(hash);
            }
        } else if a.is_ordered() {
            break;
        }
    }
    entries
}

/// Difference of two ascending hash sequences, both cut at `theta`.
fn merge_difference<A, B>(a: &A, b: &B, theta: u64) -> Vec<u64>
where
    A: ThetaSketchView + ?Sized,
    B: ThetaSketchView + ?Sized,
{
    let mut b_hashes = b.iter().take_while(|&hash| hash < theta).peekable();
    let mut entries = Vec::new();
    for hash in a.iter().take_while(|&hash| hash < theta) {
        while b_hashes.next_if(|&b_hash| b_hash < hash).is_some() {}
        if b_hashes.peek() != Some(&hash) {
            entries.push(hash);
        }
    }
    entries
}
