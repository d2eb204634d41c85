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

use std::fmt;

use crate::common::NumStdDev;
use crate::common::binomial_bounds;
use crate::theta::hash_table::MAX_THETA;

/// Read access to the state every theta sketch form shares.
///
/// Implemented by [`ThetaSketch`](crate::theta::ThetaSketch),
/// [`CompactThetaSketch`](crate::theta::CompactThetaSketch) and
/// [`WrappedCompactThetaSketch`](crate::theta::WrappedCompactThetaSketch), so the set operations
/// accept any of them.
pub trait ThetaSketchView {
    /// Whether the sketch has never seen an item.
    fn is_empty(&self) -> bool;

    /// Whether [`iter`](Self::iter) yields hashes in ascending order.
    fn is_ordered(&self) -> bool;

    /// Theta as a raw 64-bit value.
    fn theta64(&self) -> u64;

    /// Number of retained hashes.
    fn num_retained(&self) -> usize;

    /// 16-bit fingerprint of the seed used to hash the input.
    fn seed_hash(&self) -> u16;

    /// Iterates over retained hashes.
    fn iter(&self) -> Box<dyn Iterator<Item = u64> + '_>;

    /// Theta as a fraction (0.0 to 1.0).
    fn theta(&self) -> f64 {
        self.theta64() as f64 / MAX_THETA as f64
    }

    fn is_estimation_mode(&self) -> bool {
        self.theta64() < MAX_THETA && !self.is_empty()
    }

    fn estimate(&self) -> f64 {
        estimate(self.num_retained(), self.theta64(), self.is_empty())
    }

    fn lower_bound(&self, num_std_dev: NumStdDev) -> f64 {
        lower_bound(self.num_retained(), self.theta64(), self.is_empty(), num_std_dev)
    }

    fn upper_bound(&self, num_std_dev: NumStdDev) -> f64 {
        upper_bound(self.num_retained(), self.theta64(), self.is_empty(), num_std_dev)
    }
}

pub(crate) fn estimate(num_retained: usize, theta64: u64, is_empty: bool) -> f64 {
    if is_empty {
        return 0.0;
    }
    num_retained as f64 / (theta64 as f64 / MAX_THETA as f64)
}

pub(crate) fn lower_bound(
    num_retained: usize,
    theta64: u64,
    is_empty: bool,
    num_std_dev: NumStdDev,
) -> f64 {
    if is_empty || theta64 == MAX_THETA {
        return num_retained as f64;
    }
    // theta is never zero: builders reject it and deserialization rejects it
    binomial_bounds::lower_bound(
        num_retained as u64,
        theta64 as f64 / MAX_THETA as f64,
        num_std_dev,
    )
    .expect("theta should always be valid")
}

pub(crate) fn upper_bound(
    num_retained: usize,
    theta64: u64,
    is_empty: bool,
    num_std_dev: NumStdDev,
) -> f64 {
    if is_empty || theta64 == MAX_THETA {
        return num_retained as f64;
    }
    binomial_bounds::upper_bound(
        num_retained as u64,
        theta64 as f64 / MAX_THETA as f64,
        num_std_dev,
        is_empty,
    )
    .expect("theta should always be valid")
}

/// Writes the multi-line summary shared by every sketch form. `specifics` adds lines before the
/// closing marker.
pub(crate) fn write_summary<V: ThetaSketchView + ?Sized>(
    f: &mut fmt::Formatter<'_>,
    sketch: &V,
    specifics: impl FnOnce(&mut fmt::Formatter<'_>) -> fmt::Result,
) -> fmt::Result {
    writeln!(f, "### Theta sketch summary:")?;
    writeln!(f, "   num retained entries : {}", sketch.num_retained())?;
    writeln!(f, "   seed hash            : {}", sketch.seed_hash())?;
    writeln!(f, "   empty?               : {}", sketch.is_empty())?;
    writeln!(f, "   ordered?             : {}", sketch.is_ordered())?;
    writeln!(f, "   estimation mode?     : {}", sketch.is_estimation_mode())?;
    writeln!(f, "   theta (fraction)     : {}", sketch.theta())?;
    writeln!(f, "   theta (raw 64-bit)   : {}", sketch.theta64())?;
    writeln!(f, "   estimate             : {}", sketch.estimate())?;
    writeln!(
        f,
        "   lower bound 95% conf : {}",
        sketch.lower_bound(NumStdDev::Two)
    )?;
    writeln!(
        f,
        "   upper bound 95% conf : {}",
        sketch.upper_bound(NumStdDev::Two)
    )?;
    specifics(f)?;
    writeln!(f, "### End sketch summary")
}
