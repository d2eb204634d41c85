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

//! Set union of theta sketches.

use crate::common::ResizeFactor;
use crate::error::Error;
use crate::hash::DEFAULT_UPDATE_SEED;
use crate::theta::CompactThetaSketch;
use crate::theta::ThetaSketchView;
use crate::theta::hash_table::DEFAULT_LG_K;
use crate::theta::hash_table::ThetaHashTable;
use crate::theta::hash_table::keep_smallest;
use crate::theta::sketch::build_table;

/// Stateful union operator for Theta sketches.
///
/// Accepts any sketch form; the result keeps at most `2^lg_k` hashes.
///
/// # Examples
///
/// ```
/// use thetasketch::theta::ThetaSketch;
/// use thetasketch::theta::ThetaUnion;
///
/// let mut a = ThetaSketch::builder().build().unwrap();
/// let mut b = ThetaSketch::builder().build().unwrap();
/// for i in 0..100u64 {
///     a.update_u64(i);
///     b.update_u64(i + 50);
/// }
///
/// let mut union = ThetaUnion::builder().build().unwrap();
/// union.update(&a).unwrap();
/// union.update(&b.compact(true)).unwrap();
/// assert_eq!(union.result(true).estimate(), 150.0);
/// ```
#[derive(Debug, Clone)]
pub struct ThetaUnion {
    table: ThetaHashTable,
    // smallest theta seen across inputs and the table
    union_theta: u64,
}

impl ThetaUnion {
    /// Create a new builder for ThetaUnion
    pub fn builder() -> ThetaUnionBuilder {
        ThetaUnionBuilder::default()
    }

    /// Add a sketch to the union.
    ///
    /// Empty sketches are skipped. Hashes at or above the running theta are discarded; ordered
    /// inputs stop at the first one.
    ///
    /// # Errors
    ///
    /// Returns a `SeedMismatch` error if a non-empty sketch was built with a different seed.
    pub fn update<S: ThetaSketchView + ?Sized>(&mut self, sketch: &S) -> Result<(), Error> {
        if sketch.is_empty() {
            return Ok(());
        }
        if sketch.seed_hash() != self.table.seed_hash() {
            return Err(Error::seed_hash_mismatch(
                self.table.seed_hash(),
                sketch.seed_hash(),
            ));
        }

        self.table.mark_non_empty();
        self.union_theta = self.union_theta.min(sketch.theta64());
        for hash in sketch.iter() {
            if hash < self.union_theta && hash < self.table.theta() {
                self.table.insert_hash(hash);
            } else if sketch.is_ordered() {
                break;
            }
        }
        self.union_theta = self.union_theta.min(self.table.theta());
        Ok(())
    }

    /// Returns the union of every sketch seen so far.
    ///
    /// The result keeps at most `k = 2^lg_k` hashes. With more candidates below theta, theta drops
    /// to the smallest hash left out, exactly as [`ThetaSketch::trim`] would do. So the union of a
    /// sketch with itself matches that sketch trimmed to `k`, and its estimate can differ from an
    /// untrimmed input holding more than `k` hashes.
    ///
    /// Before any non-empty update the result is an empty sketch.
    ///
    /// [`ThetaSketch::trim`]: crate::theta::ThetaSketch::trim
    pub fn result(&self, ordered: bool) -> CompactThetaSketch {
        if self.table.is_empty() {
            return CompactThetaSketch::empty(self.table.seed_hash(), true);
        }

        let mut theta = self.union_theta.min(self.table.theta());
        let mut entries: Vec<u64> = self.table.iter().filter(|&hash| hash < theta).collect();
        if let Some(kth) = keep_smallest(&mut entries, 1 << self.table.lg_nom_size()) {
            theta = kth;
        }
        if ordered {
            entries.sort_unstable();
        }
        let is_ordered = ordered || entries.len() <= 1;
        tracing::trace!(
            num_retained = entries.len(),
            theta,
            "computed union result"
        );
        CompactThetaSketch::from_parts(entries, theta, self.table.seed_hash(), is_ordered, false)
    }

    /// Returns the union to its freshly built state.
    pub fn reset(&mut self) {
        self.table.reset();
        self.union_theta = self.table.theta();
    }

    /// Return lg_k
    pub fn lg_k(&self) -> u8 {
        self.table.lg_nom_size()
    }

    pub fn seed_hash(&self) -> u16 {
        self.table.seed_hash()
    }

    pub(crate) fn hash_seed(&self) -> u64 {
        self.table.hash_seed()
    }
}

/// Builder for ThetaUnion
#[derive(Debug, Clone)]
pub struct ThetaUnionBuilder {
    lg_k: u8,
    resize_factor: ResizeFactor,
    sampling_probability: f32,
    seed: u64,
}

impl Default for ThetaUnionBuilder {
    fn default() -> Self {
        Self {
            lg_k: DEFAULT_LG_K,
            resize_factor: ResizeFactor::X8,
            sampling_probability: 1.0,
            seed: DEFAULT_UPDATE_SEED,
        }
    }
}

impl ThetaUnionBuilder {
    /// Set lg_k (log2 of nominal size k). Must be in range [5, 26].
    pub fn lg_k(mut self, lg_k: u8) -> Self {
        self.lg_k = lg_k;
        self
    }

    /// Set resize factor.
    pub fn resize_factor(mut self, factor: ResizeFactor) -> Self {
        self.resize_factor = factor;
        self
    }

    /// Set sampling probability p. Must be in range (0.0, 1.0].
    pub fn sampling_probability(mut self, probability: f32) -> Self {
        self.sampling_probability = probability;
        self
    }

    /// Set hash seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Build the ThetaUnion.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigInvalid` error under the same conditions as
    /// [`ThetaSketchBuilder::build`](crate::theta::ThetaSketchBuilder::build).
    pub fn build(self) -> Result<ThetaUnion, Error> {
        let table = build_table(
            self.lg_k,
            self.resize_factor,
            self.sampling_probability,
            self.seed,
        )?;
        let union_theta = table.theta();
        Ok(ThetaUnion { table, union_theta })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::theta::ThetaSketch;
    use crate::theta::hash_table::MAX_THETA;

    fn sketch_of(lg_k: u8, range: std::ops::Range<u64>) -> ThetaSketch {
        let mut sketch = ThetaSketch::builder().lg_k(lg_k).build().unwrap();
        for i in range {
            sketch.update_u64(i);
        }
        sketch
    }

    #[test]
    fn test_result_before_update_is_empty() {
        let union = ThetaUnion::builder().build().unwrap();
        let result = union.result(true);
        assert!(result.is_empty());
        assert_eq!(result.theta64(), MAX_THETA);
        assert_eq!(result.serialize().len(), 8);
    }

    #[test]
    fn test_empty_inputs_are_skipped() {
        let mut union = ThetaUnion::builder().build().unwrap();
        union.update(&sketch_of(12, 0..0)).unwrap();
        assert!(union.result(true).is_empty());

        // seeds of empty sketches are not checked
        let other = ThetaSketch::builder().seed(7).build().unwrap();
        union.update(&other).unwrap();
    }

    #[test]
    fn test_result_is_capped_at_k() {
        let mut union = ThetaUnion::builder().lg_k(5).build().unwrap();
        union.update(&sketch_of(12, 0..1000)).unwrap();
        let result = union.result(true);
        assert_eq!(result.num_retained(), 32);
        assert!(result.iter().all(|hash| hash < result.theta64()));
        assert!(result.is_estimation_mode());
    }

    #[test]
    fn test_seed_mismatch() {
        let mut union = ThetaUnion::builder().seed(7).build().unwrap();
        let err = union.update(&sketch_of(12, 0..10)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SeedMismatch);
    }

    #[test]
    fn test_reset() {
        let mut union = ThetaUnion::builder().lg_k(5).build().unwrap();
        union.update(&sketch_of(12, 0..1000)).unwrap();
        union.reset();
        assert!(union.result(true).is_empty());

        union.update(&sketch_of(12, 0..10)).unwrap();
        let result = union.result(false);
        assert_eq!(result.estimate(), 10.0);
        assert!(!result.is_estimation_mode());
    }
}
