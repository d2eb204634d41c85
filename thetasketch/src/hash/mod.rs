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

//! Hashing primitives shared by sketches and set operations.

mod murmurhash;

pub use self::murmurhash::MurmurHash3X64128;
pub use self::murmurhash::murmurhash3_x64_128;

use crate::error::Error;

/// The seed used by default when hashing input items.
pub const DEFAULT_UPDATE_SEED: u64 = 9001;

/// Computes the 16-bit fingerprint of a hash seed.
///
/// Serialized sketches carry this fingerprint so that sketches built with different seeds are
/// never combined.
///
/// # Examples
///
/// ```
/// # use thetasketch::hash::{compute_seed_hash, DEFAULT_UPDATE_SEED};
/// assert_eq!(compute_seed_hash(DEFAULT_UPDATE_SEED), 0x93CC);
/// ```
pub fn compute_seed_hash(seed: u64) -> u16 {
    let (h1, _) = murmurhash3_x64_128(&seed.to_le_bytes(), 0);
    (h1 & 0xffff) as u16
}

/// Like [`compute_seed_hash`], but rejects seeds whose fingerprint is zero.
///
/// # Errors
///
/// Returns a `ConfigInvalid` error if the seed hash is zero.
pub fn checked_seed_hash(seed: u64) -> Result<u16, Error> {
    match compute_seed_hash(seed) {
        0 => Err(Error::config_invalid(format!(
            "the seed hash of {seed} is zero, choose a different seed"
        ))),
        seed_hash => Ok(seed_hash),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_seed_hash() {
        assert_eq!(compute_seed_hash(DEFAULT_UPDATE_SEED), 0x93cc);
        assert_eq!(checked_seed_hash(DEFAULT_UPDATE_SEED).unwrap(), 0x93cc);
    }

    #[test]
    fn test_zero_seed_hash_rejected() {
        let seed = (0..u64::MAX)
            .find(|&seed| compute_seed_hash(seed) == 0)
            .unwrap();
        let err = checked_seed_hash(seed).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ConfigInvalid);
    }
}
