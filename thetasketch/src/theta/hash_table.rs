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

//! Open-addressing storage for retained hashes.
//!
//! [`HashSlots`] is the storage itself: a power-of-two array of `u64` where 0 marks a free
//! slot. [`ThetaHashTable`] layers the sampling rules of the update sketch and the union on top of
//! it. [`HashLookup`] is a fixed-size membership set the set operations build from one input.

use std::hash::Hasher;

use crate::common::ResizeFactor;
use crate::hash::MurmurHash3X64128;
use crate::hash::compute_seed_hash;

/// Maximum theta value (signed max for compatibility with Java)
pub const MAX_THETA: u64 = i64::MAX as u64;

/// Minimum log2 of K
pub const MIN_LG_K: u8 = 5;

/// Maximum log2 of K
pub const MAX_LG_K: u8 = 26;

/// Default log2 of K
pub const DEFAULT_LG_K: u8 = 12;

/// Load factor that triggers growth while the table is below its maximum size.
const RESIZE_THRESHOLD: f64 = 0.5;

/// Load factor that triggers a rebuild to k entries once the table is at its maximum size.
const REBUILD_THRESHOLD: f64 = 15.0 / 16.0;

const STRIDE_HASH_BITS: u8 = 7;
const STRIDE_MASK: u64 = (1 << STRIDE_HASH_BITS) - 1;

enum SlotSearch {
    Occupied,
    Vacant(usize),
}

/// Power-of-two slot array searched with an odd stride taken from the hash bits above the index.
///
/// Callers keep at least one slot free, so every search ends.
#[derive(Debug, Clone)]
struct HashSlots {
    lg_size: u8,
    slots: Vec<u64>,
    len: usize,
}

impl HashSlots {
    fn with_lg_size(lg_size: u8) -> Self {
        Self {
            lg_size,
            slots: vec![0; 1 << lg_size],
            len: 0,
        }
    }

    fn search(&self, hash: u64) -> SlotSearch {
        let mask = self.slots.len() - 1;
        let stride = (2 * ((hash >> self.lg_size) & STRIDE_MASK) + 1) as usize;
        let mut index = hash as usize & mask;
        loop {
            match self.slots[index] {
                0 => return SlotSearch::Vacant(index),
                slot if slot == hash => return SlotSearch::Occupied,
                _ => index = (index + stride) & mask,
            }
        }
    }

    /// Stores a non-zero `hash`, returning false if it was already present.
    fn insert(&mut self, hash: u64) -> bool {
        debug_assert_ne!(hash, 0);
        debug_assert!(self.len < self.slots.len());
        match self.search(hash) {
            SlotSearch::Occupied => false,
            SlotSearch::Vacant(index) => {
                self.slots[index] = hash;
                self.len += 1;
                true
            }
        }
    }

    fn contains(&self, hash: u64) -> bool {
        hash != 0 && matches!(self.search(hash), SlotSearch::Occupied)
    }

    fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.slots.iter().copied().filter(|&slot| slot != 0)
    }

    /// Replaces the contents with `hashes` in a table of `2^lg_size` slots.
    fn refill(&mut self, lg_size: u8, hashes: impl IntoIterator<Item = u64>) {
        *self = Self::with_lg_size(lg_size);
        for hash in hashes {
            self.insert(hash);
        }
    }

    fn load_limit(&self, load_factor: f64) -> usize {
        (load_factor * self.slots.len() as f64) as usize
    }
}

/// Smallest table that holds `count` hashes without exceeding the rebuild load factor.
fn lg_size_for_count(count: usize) -> u8 {
    let count = count.max(1);
    let lg = (usize::BITS - 1 - count.leading_zeros()) as u8;
    let limit = ((1usize << (lg + 1)) as f64 * REBUILD_THRESHOLD) as usize;
    lg + if count > limit { 2 } else { 1 }
}

/// Keeps the `k` smallest of `hashes` and returns the smallest one dropped, which becomes the new
/// theta. Returns `None` when there are no more than `k` hashes.
pub(crate) fn keep_smallest(hashes: &mut Vec<u64>, k: usize) -> Option<u64> {
    if hashes.len() <= k {
        return None;
    }
    let (_, kth, _) = hashes.select_nth_unstable(k);
    let kth = *kth;
    hashes.truncate(k);
    Some(kth)
}

/// Sampling hash table shared by the update sketch and the union.
///
/// Only hashes below theta are stored. The slot array starts small and grows by the resize factor
/// while it is at most `2^lg_nom_size` slots. At its maximum of `2^(lg_nom_size + 1)` slots, going
/// over 15/16 load rebuilds it: the `k = 2^lg_nom_size` smallest hashes stay and theta drops to
/// the next one.
#[derive(Debug, Clone)]
pub(crate) struct ThetaHashTable {
    slots: HashSlots,
    lg_nom_size: u8,
    resize_factor: ResizeFactor,
    sampling_probability: f32,
    hash_seed: u64,
    seed_hash: u16,
    theta: u64,
    // False once any item reached the table, even if theta screened it out.
    is_empty: bool,
}

impl ThetaHashTable {
    pub fn new(
        lg_nom_size: u8,
        resize_factor: ResizeFactor,
        sampling_probability: f32,
        hash_seed: u64,
    ) -> Self {
        Self {
            slots: HashSlots::with_lg_size(starting_lg_size(lg_nom_size, resize_factor)),
            lg_nom_size,
            resize_factor,
            sampling_probability,
            hash_seed,
            seed_hash: compute_seed_hash(hash_seed),
            theta: starting_theta_from_sampling_probability(sampling_probability),
            is_empty: true,
        }
    }

    /// Hash raw item bytes with the table seed.
    ///
    /// Only the first 64-bit half is used, shifted right by one to stay compatible with Java
    /// signed longs.
    pub fn hash_bytes(&self, bytes: &[u8]) -> u64 {
        let mut hasher = MurmurHash3X64128::with_seed(self.hash_seed);
        hasher.write(bytes);
        let (h1, _) = hasher.finish128();
        h1 >> 1
    }

    /// Hashes an item and offers it to the table. The table stops being empty either way.
    ///
    /// Returns true if the hash was new and below theta.
    pub fn update_bytes(&mut self, bytes: &[u8]) -> bool {
        self.is_empty = false;
        let hash = self.hash_bytes(bytes);
        self.insert_hash(hash)
    }

    /// Offers an already computed hash. Zero and hashes at or above theta are screened out.
    ///
    /// Returns true if the hash was stored.
    pub fn insert_hash(&mut self, hash: u64) -> bool {
        if hash == 0 || hash >= self.theta || !self.slots.insert(hash) {
            return false;
        }
        if self.slots.len > self.slots.load_limit(self.load_factor()) {
            if self.slots.lg_size <= self.lg_nom_size {
                self.grow();
            } else {
                self.rebuild();
            }
        }
        true
    }

    fn load_factor(&self) -> f64 {
        if self.slots.lg_size <= self.lg_nom_size {
            RESIZE_THRESHOLD
        } else {
            REBUILD_THRESHOLD
        }
    }

    fn grow(&mut self) {
        let lg_size = (self.slots.lg_size + self.resize_factor.lg_value().max(1))
            .min(self.lg_nom_size + 1);
        let hashes: Vec<u64> = self.slots.iter().collect();
        tracing::trace!(
            from = self.slots.lg_size,
            to = lg_size,
            num_retained = hashes.len(),
            "resized theta hash table"
        );
        self.slots.refill(lg_size, hashes);
    }

    fn rebuild(&mut self) {
        let mut hashes: Vec<u64> = self.slots.iter().collect();
        let k = 1usize << self.lg_nom_size;
        let Some(theta) = keep_smallest(&mut hashes, k) else {
            return;
        };
        tracing::debug!(
            theta,
            evicted = self.slots.len - k,
            "rebuilt theta hash table"
        );
        self.theta = theta;
        self.slots.refill(self.slots.lg_size, hashes);
    }

    /// Drops hashes beyond the nominal size k, lowering theta.
    pub fn trim(&mut self) {
        self.rebuild();
    }

    /// Returns the table to its freshly built state.
    pub fn reset(&mut self) {
        self.slots = HashSlots::with_lg_size(starting_lg_size(self.lg_nom_size, self.resize_factor));
        self.theta = starting_theta_from_sampling_probability(self.sampling_probability);
        self.is_empty = true;
    }

    pub fn num_retained(&self) -> usize {
        self.slots.len
    }

    pub fn theta(&self) -> u64 {
        self.theta
    }

    pub fn is_empty(&self) -> bool {
        self.is_empty
    }

    /// Records that a non-empty input reached the table without going through
    /// [`update_bytes`](Self::update_bytes).
    pub fn mark_non_empty(&mut self) {
        self.is_empty = false;
    }

    /// Stored hashes, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.slots.iter()
    }

    pub fn lg_nom_size(&self) -> u8 {
        self.lg_nom_size
    }

    pub fn lg_cur_size(&self) -> u8 {
        self.slots.lg_size
    }

    pub fn resize_factor(&self) -> ResizeFactor {
        self.resize_factor
    }

    pub fn sampling_probability(&self) -> f32 {
        self.sampling_probability
    }

    pub fn hash_seed(&self) -> u64 {
        self.hash_seed
    }

    pub fn seed_hash(&self) -> u16 {
        self.seed_hash
    }
}

/// Membership set over the hashes of one set-operation input.
#[derive(Debug, Clone)]
pub(crate) struct HashLookup {
    slots: HashSlots,
}

impl HashLookup {
    /// Builds a set sized for `hashes`. Zeros are skipped.
    pub fn new(hashes: &[u64]) -> Self {
        let mut slots = HashSlots::with_lg_size(lg_size_for_count(hashes.len()));
        for &hash in hashes {
            if hash != 0 {
                slots.insert(hash);
            }
        }
        Self { slots }
    }

    pub fn contains(&self, hash: u64) -> bool {
        self.slots.contains(hash)
    }
}

/// Initial slot count: the maximum size divided by the resize factor as many times as it goes
/// without falling below `2^MIN_LG_K`.
fn starting_lg_size(lg_nom_size: u8, resize_factor: ResizeFactor) -> u8 {
    let lg_max = lg_nom_size + 1;
    let lg_rf = resize_factor.lg_value();
    if lg_max <= MIN_LG_K {
        MIN_LG_K
    } else if lg_rf == 0 {
        lg_max
    } else {
        (lg_max - MIN_LG_K) % lg_rf + MIN_LG_K
    }
}

/// Theta a table starts with for the given sampling probability.
pub(crate) fn starting_theta_from_sampling_probability(sampling_probability: f32) -> u64 {
    if sampling_probability < 1.0 {
        (MAX_THETA as f64 * sampling_probability as f64) as u64
    } else {
        MAX_THETA
    }
}
