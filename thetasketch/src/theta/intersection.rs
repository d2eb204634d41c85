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

//! Set intersection of theta sketches.

use crate::error::Error;
use crate::hash::DEFAULT_UPDATE_SEED;
use crate::hash::compute_seed_hash;
use crate::theta::CompactThetaSketch;
use crate::theta::ThetaSketchView;
use crate::theta::hash_table::HashLookup;
use crate::theta::hash_table::MAX_THETA;

/// Stateful intersection operator for Theta sketches.
///
/// The operator starts as the universe set. The first [`update`](Self::update) copies its input;
/// every later one narrows the running set to the hashes both sides share below the smaller
/// theta. When the running set and the input are both ordered this is a linear merge walk,
/// otherwise a lookup set is built over one side.
///
/// Before the first update, the result is undefined; use [`has_result`](Self::has_result) to
/// check.
///
/// # Examples
///
/// ```
/// use thetasketch::theta::ThetaIntersection;
/// use thetasketch::theta::ThetaSketch;
///
/// let mut a = ThetaSketch::builder().build().unwrap();
/// let mut b = ThetaSketch::builder().build().unwrap();
/// for i in 0..100u64 {
///     a.update_u64(i);
///     b.update_u64(i + 50);
/// }
///
/// let mut intersection = ThetaIntersection::default();
/// assert!(intersection.result().is_err());
/// intersection.update(&a).unwrap();
/// intersection.update(&b.compact(true)).unwrap();
/// assert_eq!(intersection.result().unwrap().estimate(), 50.0);
/// ```
#[derive(Debug, Clone)]
pub struct ThetaIntersection {
    seed: u64,
    seed_hash: u16,
    // None until the first update
    state: Option<Narrowed>,
}

/// The running intersection.
#[derive(Debug, Clone)]
struct Narrowed {
    entries: Vec<u64>,
    theta: u64,
    is_empty: bool,
    is_ordered: bool,
}

impl Narrowed {
    /// An empty input ends the intersection for good.
    fn terminal() -> Self {
        Self {
            entries: Vec::new(),
            theta: MAX_THETA,
            is_empty: true,
            is_ordered: true,
        }
    }
}

impl Default for ThetaIntersection {
    fn default() -> Self {
        Self::new(DEFAULT_UPDATE_SEED)
    }
}

impl ThetaIntersection {
    /// Creates a new intersection operator for the given `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            seed_hash: compute_seed_hash(seed),
            state: None,
        }
    }

    /// Creates a new intersection operator with the default seed.
    pub fn new_with_default_seed() -> Self {
        Self::new(DEFAULT_UPDATE_SEED)
    }

    /// Narrows the intersection with a given sketch.
    ///
    /// # Errors
    ///
    /// Returns a `SeedMismatch` error if a non-empty sketch was built with a different seed, and
    /// an `InvalidArgument` error if the sketch yields a different number of hashes than it
    /// reports.
    pub fn update<S: ThetaSketchView + ?Sized>(&mut self, sketch: &S) -> Result<(), Error> {
        if !sketch.is_empty() && sketch.seed_hash() != self.seed_hash {
            return Err(Error::seed_hash_mismatch(self.seed_hash, sketch.seed_hash()));
        }

        let Some(state) = &mut self.state else {
            let state = if sketch.is_empty() {
                Narrowed::terminal()
            } else {
                let theta = sketch.theta64();
                Narrowed {
                    entries: collect_below(sketch, theta)?,
                    theta,
                    is_empty: false,
                    is_ordered: sketch.is_ordered(),
                }
            };
            tracing::trace!(
                num_retained = state.entries.len(),
                theta = state.theta,
                "intersection initialized from first sketch"
            );
            self.state = Some(state);
            return Ok(());
        };

        if state.is_empty {
            return Ok(());
        }
        if sketch.is_empty() {
            *state = Narrowed::terminal();
            return Ok(());
        }

        let theta = state.theta.min(sketch.theta64());
        if state.entries.is_empty() || sketch.num_retained() == 0 {
            state.entries.clear();
        } else if state.is_ordered && sketch.is_ordered() {
            state.entries = merge_intersection(&state.entries, sketch, theta);
        } else if state.is_ordered {
            // look up the running set in the input so the result stays ordered
            let lookup = HashLookup::new(&collect_below(sketch, theta)?);
            state
                .entries
                .retain(|&hash| hash < theta && lookup.contains(hash));
        } else {
            let lookup = HashLookup::new(&state.entries);
            state.entries = collect_below(sketch, theta)?;
            state.entries.retain(|&hash| lookup.contains(hash));
            state.is_ordered = sketch.is_ordered();
        }
        state.theta = theta;
        state.is_empty = state.entries.is_empty() && theta == MAX_THETA;

        tracing::trace!(
            num_retained = state.entries.len(),
            theta,
            "intersection narrowed"
        );
        Ok(())
    }

    pub(crate) fn hash_seed(&self) -> u64 {
        self.seed
    }

    /// Returns whether this operator has received at least one update.
    pub fn has_result(&self) -> bool {
        self.state.is_some()
    }

    /// Returns the intersection result as a compact theta sketch (ordered).
    ///
    /// # Errors
    ///
    /// Returns an `UndefinedState` error if called before the first [`update`](Self::update).
    pub fn result(&self) -> Result<CompactThetaSketch, Error> {
        self.result_with_ordered(true)
    }

    /// Returns the intersection result as a compact theta sketch.
    ///
    /// # Errors
    ///
    /// Returns an `UndefinedState` error if called before the first [`update`](Self::update).
    pub fn result_with_ordered(&self, ordered: bool) -> Result<CompactThetaSketch, Error> {
        let Some(state) = &self.state else {
            return Err(Error::undefined_state(
                "intersection result requested before any update",
            ));
        };
        let mut entries = state.entries.clone();
        if ordered && !state.is_ordered {
            entries.sort_unstable();
        }
        let is_ordered = state.is_ordered || ordered || entries.len() <= 1;
        Ok(CompactThetaSketch::from_parts(
            entries,
            state.theta,
            self.seed_hash,
            is_ordered,
            state.is_empty,
        ))
    }

    /// Returns the operator to its state before the first update.
    pub fn reset(&mut self) {
        self.state = None;
    }
}

/// Hashes of `sketch` below `theta`, checking the sketch yields as many as it reports.
fn collect_below<S: ThetaSketchView + ?Sized>(sketch: &S, theta: u64) -> Result<Vec<u64>, Error> {
    let mut count = 0;
    let mut entries = Vec::with_capacity(sketch.num_retained());
    for hash in sketch.iter() {
        count += 1;
        if hash < theta {
            entries.push(hash);
        }
    }
    if count != sketch.num_retained() {
        return Err(Error::invalid_argument(format!(
            "sketch reports {} entries but yields {count}, possibly corrupted input sketch",
            sketch.num_retained()
        )));
    }
    Ok(entries)
}

/// Hashes present in both ascending sequences, cut at `theta`.
fn merge_intersection<S: ThetaSketchView + ?Sized>(
    running: &[u64],
    sketch: &S,
    theta: u64,
) -> Vec<u64> {
    let mut running = running.iter().copied().take_while(|&hash| hash < theta).peekable();
    let mut matched = Vec::new();
    for hash in sketch.iter().take_while(|&hash| hash < theta) {
        while running.next_if(|&kept| kept < hash).is_some() {}
        match running.peek() {
            None => break,
            Some(&kept) if kept == hash => {
                matched.push(hash);
                running.next();
            }
            Some(_) => {}
        }
    }
    matched
}
