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

//! Approximate confidence bounds for sampling sketches, based on the tails of the binomial
//! distribution.
//!
//! Given `num_samples` retained entries that survived independent sampling at rate `theta`, the
//! bounds bracket the number of distinct items in the source stream. Three regimes are used:
//!
//! * more than 120 samples: Gaussian approximation with continuity correction;
//! * few samples and a small estimate (at most 360): an exact search over the negative binomial
//!   posterior;
//! * few samples and a large estimate: the Gaussian approximation again.
//!
//! Other theta sketch libraries answer the last regime from precomputed equivalence tables.
//! This module has no such tables, so bounds for at most 120 samples with
//! `theta < num_samples / 360` can differ from theirs in the last digits. Estimates and the
//! bounds of the first two regimes are unaffected.

use crate::common::NumStdDev;
use crate::error::Error;

// delta = 0.5 * (1 + erf(-num_std_dev / sqrt(2))), indexed by num_std_dev
const DELTA_OF_NUM_STD_DEVS: [f64; 4] = [
    0.5000000000000000000,
    0.1586553191586026479,
    0.0227502618904135701,
    0.0013498126861731796,
];

/// Returns the approximate lower bound of the number of distinct items.
///
/// # Errors
///
/// Returns an error if `theta` is not in `(0.0, 1.0]`.
pub fn lower_bound(num_samples: u64, theta: f64, num_std_dev: NumStdDev) -> Result<f64, Error> {
    check_theta(theta)?;
    let lb = approximate_lower_bound(num_samples, theta, num_std_dev);
    let num_samples = num_samples as f64;
    let estimate = num_samples / theta;
    Ok(estimate.min(num_samples.max(lb)))
}

/// Returns the approximate upper bound of the number of distinct items.
///
/// `no_data_seen` short-circuits to zero for sketches that never received an update.
///
/// # Errors
///
/// Returns an error if `theta` is not in `(0.0, 1.0]`.
pub fn upper_bound(
    num_samples: u64,
    theta: f64,
    num_std_dev: NumStdDev,
    no_data_seen: bool,
) -> Result<f64, Error> {
    if no_data_seen {
        return Ok(0.0);
    }
    check_theta(theta)?;
    let ub = approximate_upper_bound(num_samples, theta, num_std_dev);
    let estimate = num_samples as f64 / theta;
    Ok(estimate.max(ub))
}

fn check_theta(theta: f64) -> Result<(), Error> {
    if theta > 0.0 && theta <= 1.0 {
        Ok(())
    } else {
        Err(Error::invalid_argument(format!(
            "theta must be in (0.0, 1.0], got {theta}"
        )))
    }
}

fn continuity_corrected_lb(num_samples: f64, theta: f64, num_std_dev: f64) -> f64 {
    let n_hat = (num_samples - 0.5) / theta;
    let b = num_std_dev * ((1.0 - theta) / theta).sqrt();
    let d = 0.5 * b * ((b * b) + (4.0 * n_hat)).sqrt();
    let center = n_hat + (0.5 * (b * b));
    center - d
}

fn continuity_corrected_ub(num_samples: f64, theta: f64, num_std_dev: f64) -> f64 {
    let n_hat = (num_samples + 0.5) / theta;
    let b = num_std_dev * ((1.0 - theta) / theta).sqrt();
    let d = 0.5 * b * ((b * b) + (4.0 * n_hat)).sqrt();
    let center = n_hat + (0.5 * (b * b));
    center + d
}

// Walks the posterior terms until their sum exceeds delta. Only valid for n / p below a few
// hundred; callers guarantee that.
fn special_n_star(num_samples: u64, p: f64, delta: f64) -> u64 {
    let q = 1.0 - p;
    let mut cur_term = p.powi(num_samples as i32);
    let mut total = cur_term;
    let mut m = num_samples;
    while total <= delta {
        cur_term = (cur_term * q * (m as f64)) / ((m + 1 - num_samples) as f64);
        total += cur_term;
        m += 1;
    }
    // total > delta now, back up one
    m - 1
}

fn special_n_prime_b(num_samples: u64, p: f64, delta: f64) -> u64 {
    let q = 1.0 - p;
    let one_minus_delta = 1.0 - delta;
    let mut cur_term = p.powi(num_samples as i32);
    let mut total = cur_term;
    let mut m = num_samples;
    while total < one_minus_delta {
        cur_term = (cur_term * q * (m as f64)) / ((m + 1 - num_samples) as f64);
        total += cur_term;
        m += 1;
    }
    m
}

fn special_n_prime_f(num_samples: u64, p: f64, delta: f64) -> u64 {
    special_n_prime_b(num_samples + 1, p, delta)
}

fn approximate_lower_bound(num_samples: u64, theta: f64, num_std_dev: NumStdDev) -> f64 {
    let sd = num_std_dev.as_u8();
    if theta == 1.0 {
        num_samples as f64
    } else if num_samples == 0 {
        0.0
    } else if num_samples == 1 {
        let delta = DELTA_OF_NUM_STD_DEVS[sd as usize];
        let raw = (1.0 - delta).ln() / (1.0 - theta).ln();
        raw.floor()
    } else if num_samples > 120 {
        continuity_corrected_lb(num_samples as f64, theta, sd as f64) - 0.5
    } else if theta > (1.0 - 1e-5) {
        num_samples as f64
    } else if theta < (num_samples as f64) / 360.0 {
        continuity_corrected_lb(num_samples as f64, theta, sd as f64) - 0.5
    } else {
        let delta = DELTA_OF_NUM_STD_DEVS[sd as usize];
        special_n_star(num_samples, theta, delta) as f64
    }
}

fn approximate_upper_bound(num_samples: u64, theta: f64, num_std_dev: NumStdDev) -> f64 {
    let sd = num_std_dev.as_u8();
    if theta == 1.0 {
        num_samples as f64
    } else if num_samples == 0 {
        let delta = DELTA_OF_NUM_STD_DEVS[sd as usize];
        let raw = delta.ln() / (1.0 - theta).ln();
        raw.ceil()
    } else if num_samples > 120 {
        continuity_corrected_ub(num_samples as f64, theta, sd as f64) + 0.5
    } else if theta > (1.0 - 1e-5) {
        (num_samples + 1) as f64
    } else if theta < (num_samples as f64) / 360.0 {
        continuity_corrected_ub(num_samples as f64, theta, sd as f64) + 0.5
    } else {
        let delta = DELTA_OF_NUM_STD_DEVS[sd as usize];
        special_n_prime_f(num_samples, theta, delta) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [NumStdDev; 3] = [NumStdDev::One, NumStdDev::Two, NumStdDev::Three];

    #[test]
    fn test_exact_mode_bounds_equal_count() {
        for sd in ALL {
            assert_eq!(lower_bound(100, 1.0, sd).unwrap(), 100.0);
            assert_eq!(upper_bound(100, 1.0, sd, false).unwrap(), 100.0);
        }
    }

    #[test]
    fn test_no_data_seen() {
        assert_eq!(upper_bound(0, 0.5, NumStdDev::Two, true).unwrap(), 0.0);
    }

    #[test]
    fn test_invalid_theta() {
        assert!(lower_bound(10, 0.0, NumStdDev::One).is_err());
        assert!(lower_bound(10, 1.5, NumStdDev::One).is_err());
        assert!(upper_bound(10, -0.1, NumStdDev::One, false).is_err());
    }

    #[test]
    fn test_bounds_bracket_estimate_in_every_regime() {
        // (num_samples, theta) pairs covering each branch
        let cases = [
            (0u64, 0.5),
            (1, 0.5),
            (5, 0.1),
            (50, 0.5),
            (100, 0.01),
            (4096, 0.1),
            (4096, 0.0001),
        ];
        for (n, theta) in cases {
            let estimate = n as f64 / theta;
            let mut prev_lb = f64::MAX;
            let mut prev_ub = 0.0;
            for sd in ALL {
                let lb = lower_bound(n, theta, sd).unwrap();
                let ub = upper_bound(n, theta, sd, false).unwrap();
                assert!(lb <= estimate, "lb {lb} > estimate {estimate} for n={n}");
                assert!(ub >= estimate, "ub {ub} < estimate {estimate} for n={n}");
                // wider with more standard deviations
                assert!(lb <= prev_lb);
                assert!(ub >= prev_ub);
                prev_lb = lb;
                prev_ub = ub;
            }
        }
    }

    #[test]
    fn test_zero_samples_upper_bound() {
        // ln(delta) / ln(1 - theta), rounded up
        let ub = upper_bound(0, 0.5, NumStdDev::Two, false).unwrap();
        let expected = (DELTA_OF_NUM_STD_DEVS[2].ln() / 0.5f64.ln()).ceil();
        assert_eq!(ub, expected);
    }

    #[test]
    fn test_few_samples_with_large_estimate_use_gaussian() {
        // 50 samples at theta 0.1 estimate 500, past the 360 limit of the exact search
        for sd in ALL {
            let k = sd.as_u8() as f64;
            assert_eq!(
                approximate_lower_bound(50, 0.1, sd),
                continuity_corrected_lb(50.0, 0.1, k) - 0.5
            );
            assert_eq!(
                approximate_upper_bound(50, 0.1, sd),
                continuity_corrected_ub(50.0, 0.1, k) + 0.5
            );
        }
        // 50 samples at theta 0.5 estimate 100, inside it
        assert_eq!(
            approximate_lower_bound(50, 0.5, NumStdDev::Two),
            special_n_star(50, 0.5, DELTA_OF_NUM_STD_DEVS[2]) as f64
        );
    }

    #[test]
    fn test_gaussian_regime_is_close_to_rse() {
        let n = 4096u64;
        let theta = 0.1;
        let estimate = n as f64 / theta;
        let ub = upper_bound(n, theta, NumStdDev::One, false).unwrap();
        let lb = lower_bound(n, theta, NumStdDev::One).unwrap();
        let rel = ((1.0 - theta) / n as f64).sqrt();
        assert!(((ub - estimate) / estimate - rel).abs() < 0.005);
        assert!(((estimate - lb) / estimate - rel).abs() < 0.005);
    }
}
