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

//! Mutable theta sketch for building from input data.

use std::fmt;

use crate::common::NumStdDev;
use crate::common::ResizeFactor;
use crate::common::canonical_double;
use crate::error::Error;
use crate::hash::DEFAULT_UPDATE_SEED;
use crate::hash::checked_seed_hash;
use crate::theta::CompactThetaSketch;
use crate::theta::hash_table::DEFAULT_LG_K;
use crate::theta::hash_table::MAX_LG_K;
use crate::theta::hash_table::MAX_THETA;
use crate::theta::hash_table::MIN_LG_K;
use crate::theta::hash_table::ThetaHashTable;
use crate::theta::hash_table::starting_theta_from_sampling_probability;
use crate::theta::view;
use crate::theta::view::ThetaSketchView;

/// Mutable theta sketch for building from input data
#[derive(Debug, Clone)]
pub struct ThetaSketch {
    table: ThetaHashTable,
}

impl ThetaSketch {
    /// Create a new builder for ThetaSketch
    ///
    /// # Examples
    ///
    /// ```
    /// # use thetasketch::theta::ThetaSketch;
    /// let sketch = ThetaSketch::builder().lg_k(12).build().unwrap();
    /// assert_eq!(sketch.lg_k(), 12);
    /// ```
    pub fn builder() -> ThetaSketchBuilder {
        ThetaSketchBuilder::default()
    }

    /// Update the sketch with raw item bytes.
    ///
    /// Strings are hashed as their UTF-8 bytes. Zero-length items are ignored and leave an empty
    /// sketch empty.
    ///
    /// # Examples
    ///
    /// ```
    /// # use thetasketch::theta::ThetaSketch;
    /// let mut sketch = ThetaSketch::builder().build().unwrap();
    /// sketch.update("apple");
    /// sketch.update("");
    /// assert_eq!(sketch.estimate(), 1.0);
    /// ```
    pub fn update(&mut self, item: impl AsRef<[u8]>) {
        let bytes = item.as_ref();
        if bytes.is_empty() {
            return;
        }
        self.table.update_bytes(bytes);
    }

    /// Update the sketch with a u64 value, hashed as 8 little-endian bytes.
    pub fn update_u64(&mut self, value: u64) {
        self.update(value.to_le_bytes());
    }

    /// Update the sketch with an i64 value, hashed as 8 little-endian bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// # use thetasketch::theta::ThetaSketch;
    /// let mut sketch = ThetaSketch::builder().build().unwrap();
    /// sketch.update_i64(-1);
    /// sketch.update_u64(u64::MAX);
    /// assert_eq!(sketch.estimate(), 1.0);
    /// ```
    pub fn update_i64(&mut self, value: i64) {
        self.update(value.to_le_bytes());
    }

    /// Update the sketch with a u32 value, widened to 64 bits.
    pub fn update_u32(&mut self, value: u32) {
        self.update_u64(value as u64);
    }

    /// Update the sketch with an i32 value, sign-extended to 64 bits.
    pub fn update_i32(&mut self, value: i32) {
        self.update_i64(value as i64);
    }

    /// Update the sketch with a f64 value.
    ///
    /// # Examples
    ///
    /// ```
    /// # use thetasketch::theta::ThetaSketch;
    /// let mut sketch = ThetaSketch::builder().build().unwrap();
    /// sketch.update_f64(0.0);
    /// sketch.update_f64(-0.0);
    /// assert_eq!(sketch.estimate(), 1.0);
    /// ```
    pub fn update_f64(&mut self, value: f64) {
        // Canonicalize double for compatibility with Java
        let canonical = canonical_double(value);
        self.update(canonical.to_le_bytes());
    }

    /// Update the sketch with a f32 value.
    pub fn update_f32(&mut self, value: f32) {
        self.update_f64(value as f64);
    }

    /// Return cardinality estimate
    ///
    /// # Examples
    ///
    /// ```
    /// # use thetasketch::theta::ThetaSketch;
    /// # let mut sketch = ThetaSketch::builder().build().unwrap();
    /// # sketch.update("apple");
    /// assert!(sketch.estimate() >= 1.0);
    /// ```
    pub fn estimate(&self) -> f64 {
        view::estimate(self.num_retained(), self.theta64(), self.is_empty())
    }

    /// Return theta as a fraction (0.0 to 1.0)
    pub fn theta(&self) -> f64 {
        self.theta64() as f64 / MAX_THETA as f64
    }

    /// Return theta as u64. An empty sketch reports the maximum whatever its sampling probability.
    pub fn theta64(&self) -> u64 {
        if self.is_empty() {
            MAX_THETA
        } else {
            self.table.theta()
        }
    }

    /// Check if sketch is empty
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Check if sketch is in estimation mode
    pub fn is_estimation_mode(&self) -> bool {
        self.theta64() < MAX_THETA && !self.is_empty()
    }

    /// Return number of retained entries
    pub fn num_retained(&self) -> usize {
        self.table.num_retained()
    }

    /// Return lg_k
    pub fn lg_k(&self) -> u8 {
        self.table.lg_nom_size()
    }

    pub fn resize_factor(&self) -> ResizeFactor {
        self.table.resize_factor()
    }

    pub fn sampling_probability(&self) -> f32 {
        self.table.sampling_probability()
    }

    /// Return the seed hash of this sketch.
    pub fn seed_hash(&self) -> u16 {
        self.table.seed_hash()
    }

    /// Trim the sketch to nominal size k
    pub fn trim(&mut self) {
        self.table.trim();
    }

    /// Reset the sketch to empty state
    pub fn reset(&mut self) {
        self.table.reset();
    }

    /// Return iterator over hash values, in table order
    ///
    /// # Examples
    ///
    /// ```
    /// # use thetasketch::theta::ThetaSketch;
    /// # let mut sketch = ThetaSketch::builder().build().unwrap();
    /// # sketch.update("apple");
    /// let mut iter = sketch.iter();
    /// assert!(iter.next().is_some());
    /// ```
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.table.iter()
    }

    /// Returns the approximate lower error bound given the specified number of Standard Deviations.
    ///
    /// # Arguments
    ///
    /// * `num_std_dev` - The number of standard deviations for confidence bounds.
    ///
    /// # Examples
    ///
    /// ```
    /// use thetasketch::common::NumStdDev;
    /// use thetasketch::theta::ThetaSketch;
    ///
    /// let mut sketch = ThetaSketch::builder().lg_k(12).build().unwrap();
    /// for i in 0..10000 {
    ///     sketch.update_u64(i);
    /// }
    ///
    /// let estimate = sketch.estimate();
    /// let lower_bound = sketch.lower_bound(NumStdDev::Two);
    /// let upper_bound = sketch.upper_bound(NumStdDev::Two);
    ///
    /// assert!(lower_bound <= estimate);
    /// assert!(estimate <= upper_bound);
    /// ```
    pub fn lower_bound(&self, num_std_dev: NumStdDev) -> f64 {
        view::lower_bound(
            self.num_retained(),
            self.theta64(),
            self.is_empty(),
            num_std_dev,
        )
    }

    /// Returns the approximate upper error bound given the specified number of Standard Deviations.
    pub fn upper_bound(&self, num_std_dev: NumStdDev) -> f64 {
        view::upper_bound(
            self.num_retained(),
            self.theta64(),
            self.is_empty(),
            num_std_dev,
        )
    }

    /// Materialize the retained hashes into an immutable compact sketch.
    ///
    /// With `ordered` the hashes are sorted ascending, otherwise they keep table order.
    ///
    /// # Examples
    ///
    /// ```
    /// # use thetasketch::theta::ThetaSketch;
    /// let mut sketch = ThetaSketch::builder().build().unwrap();
    /// sketch.update("apple");
    /// sketch.update("banana");
    /// let compact = sketch.compact(true);
    /// assert!(compact.is_ordered());
    /// assert_eq!(compact.estimate(), sketch.estimate());
    /// ```
    pub fn compact(&self, ordered: bool) -> CompactThetaSketch {
        let mut entries: Vec<u64> = self.table.iter().collect();
        if ordered {
            entries.sort_unstable();
        }
        let is_ordered = ordered || entries.len() <= 1;
        CompactThetaSketch::from_parts(
            entries,
            self.theta64(),
            self.seed_hash(),
            is_ordered,
            self.is_empty(),
        )
    }

    /// Serialize an ordered compact snapshot of this sketch in serial version 3.
    pub fn serialize(&self) -> Vec<u8> {
        self.compact(true).serialize()
    }

    pub(crate) fn hash_seed(&self) -> u64 {
        self.table.hash_seed()
    }
}

impl ThetaSketchView for ThetaSketch {
    fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    fn is_ordered(&self) -> bool {
        self.table.num_retained() <= 1
    }

    fn theta64(&self) -> u64 {
        ThetaSketch::theta64(self)
    }

    fn num_retained(&self) -> usize {
        self.table.num_retained()
    }

    fn seed_hash(&self) -> u16 {
        self.table.seed_hash()
    }

    fn iter(&self) -> Box<dyn Iterator<Item = u64> + '_> {
        Box::new(self.table.iter())
    }
}

impl fmt::Display for ThetaSketch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        view::write_summary(f, self, |f| {
            writeln!(f, "   lg nominal size      : {}", self.table.lg_nom_size())?;
            writeln!(f, "   lg current size      : {}", self.table.lg_cur_size())?;
            writeln!(
                f,
                "   resize factor        : {}",
                1u32 << self.table.resize_factor().lg_value()
            )
        })
    }
}

/// Builder for ThetaSketch
#[derive(Debug, Clone)]
pub struct ThetaSketchBuilder {
    lg_k: u8,
    resize_factor: ResizeFactor,
    sampling_probability: f32,
    seed: u64,
}

impl Default for ThetaSketchBuilder {
    fn default() -> Self {
        Self {
            lg_k: DEFAULT_LG_K,
            resize_factor: ResizeFactor::X8,
            sampling_probability: 1.0,
            seed: DEFAULT_UPDATE_SEED,
        }
    }
}

impl ThetaSketchBuilder {
    /// Set lg_k (log2 of nominal size k). Must be in range [5, 26].
    ///
    /// # Examples
    ///
    /// ```
    /// # use thetasketch::theta::ThetaSketch;
    /// let sketch = ThetaSketch::builder().lg_k(12).build().unwrap();
    /// assert_eq!(sketch.lg_k(), 12);
    /// assert!(ThetaSketch::builder().lg_k(27).build().is_err());
    /// ```
    pub fn lg_k(mut self, lg_k: u8) -> Self {
        self.lg_k = lg_k;
        self
    }

    /// Set resize factor.
    pub fn resize_factor(mut self, factor: ResizeFactor) -> Self {
        self.resize_factor = factor;
        self
    }

    /// Set sampling probability p.
    ///
    /// The sampling probability controls the fraction of hashed values that are retained.
    /// Must be in range (0.0, 1.0].
    ///
    /// # Examples
    ///
    /// ```
    /// # use thetasketch::theta::ThetaSketch;
    /// let _sketch = ThetaSketch::builder().sampling_probability(0.5).build().unwrap();
    /// assert!(ThetaSketch::builder().sampling_probability(0.0).build().is_err());
    /// ```
    pub fn sampling_probability(mut self, probability: f32) -> Self {
        self.sampling_probability = probability;
        self
    }

    /// Set hash seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Build the ThetaSketch.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigInvalid` error if lg_k or the sampling probability is out of range, or if
    /// the seed hash is zero.
    pub fn build(self) -> Result<ThetaSketch, Error> {
        let table = build_table(
            self.lg_k,
            self.resize_factor,
            self.sampling_probability,
            self.seed,
        )?;
        Ok(ThetaSketch { table })
    }
}

/// Validates a sketch configuration and creates its table. Shared with the union builder.
pub(crate) fn build_table(
    lg_k: u8,
    resize_factor: ResizeFactor,
    sampling_probability: f32,
    seed: u64,
) -> Result<ThetaHashTable, Error> {
    if !(MIN_LG_K..=MAX_LG_K).contains(&lg_k) {
        return Err(Error::config_invalid(format!(
            "lg_k must be in [{MIN_LG_K}, {MAX_LG_K}], got {lg_k}"
        )));
    }
    if !(sampling_probability > 0.0 && sampling_probability <= 1.0) {
        return Err(Error::config_invalid(format!(
            "sampling_probability must be in (0.0, 1.0], got {sampling_probability}"
        )));
    }
    if starting_theta_from_sampling_probability(sampling_probability) == 0 {
        return Err(Error::config_invalid(format!(
            "sampling_probability {sampling_probability} is too small"
        )));
    }
    checked_seed_hash(seed)?;

    Ok(ThetaHashTable::new(
        lg_k,
        resize_factor,
        sampling_probability,
        seed,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_builder_rejects_invalid_config() {
        for lg_k in [0, 4, 27, 255] {
            let err = ThetaSketch::builder().lg_k(lg_k).build().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
        }
        for p in [0.0, -0.5, 1.5, f32::NAN] {
            let err = ThetaSketch::builder()
                .sampling_probability(p)
                .build()
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
        }
        let err = ThetaSketch::builder()
            .sampling_probability(f32::MIN_POSITIVE)
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_empty_sketch_with_sampling_reports_max_theta() {
        let mut sketch = ThetaSketch::builder()
            .sampling_probability(0.5)
            .build()
            .unwrap();
        assert_eq!(sketch.theta64(), MAX_THETA);
        assert!(!sketch.is_estimation_mode());

        sketch.update("a");
        assert_eq!(sketch.theta64(), (MAX_THETA as f64 * 0.5) as u64);
        assert!(sketch.is_estimation_mode());
    }

    #[test]
    fn test_integer_widening() {
        let mut a = ThetaSketch::builder().build().unwrap();
        let mut b = ThetaSketch::builder().build().unwrap();
        a.update_i32(-5);
        b.update_i64(-5);
        a.update_u32(7);
        b.update_u64(7);
        let a: Vec<u64> = a.compact(true).iter().collect();
        let b: Vec<u64> = b.compact(true).iter().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_float_canonicalization() {
        let mut sketch = ThetaSketch::builder().build().unwrap();
        sketch.update_f64(f64::NAN);
        sketch.update_f64(-f64::NAN);
        sketch.update_f32(f32::NAN);
        assert_eq!(sketch.num_retained(), 1);

        sketch.update_f32(1.0);
        sketch.update_f64(1.0);
        assert_eq!(sketch.num_retained(), 2);
    }

    #[test]
    fn test_display() {
        let mut sketch = ThetaSketch::builder().lg_k(10).build().unwrap();
        sketch.update("a");
        let summary = sketch.to_string();
        assert!(summary.starts_with("### Theta sketch summary:\n"));
        assert!(summary.contains("   num retained entries : 1\n"));
        assert!(summary.contains("   lg nominal size      : 10\n"));
        assert!(summary.contains("   resize factor        : 8\n"));
        assert!(summary.ends_with("### End sketch summary\n"));
    }

    #[test]
    fn test_view_agrees_with_inherent() {
        let mut sketch = ThetaSketch::builder().lg_k(5).build().unwrap();
        for i in 0..1000u64 {
            sketch.update_u64(i);
        }
        let view: &dyn ThetaSketchView = &sketch;
        assert_eq!(view.estimate(), sketch.estimate());
        assert_eq!(view.theta64(), sketch.theta64());
        assert_eq!(view.iter().count(), sketch.num_retained());
        assert!(!view.is_ordered());
    }
}
