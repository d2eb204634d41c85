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

//! Types and helpers shared by every sketch form.

pub mod binomial_bounds;

use crate::error::Error;

/// Growth multiplier applied to a sketch's hash table each time it must grow.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ResizeFactor {
    /// Allocate the full table up front.
    X1,
    /// Double the table on each resize.
    X2,
    /// Quadruple the table on each resize.
    X4,
    /// Grow the table eight times on each resize.
    #[default]
    X8,
}

impl ResizeFactor {
    /// Returns log2 of the multiplier.
    pub const fn lg_value(self) -> u8 {
        match self {
            ResizeFactor::X1 => 0,
            ResizeFactor::X2 => 1,
            ResizeFactor::X4 => 2,
            ResizeFactor::X8 => 3,
        }
    }

    /// Returns the resize factor whose multiplier is `2^lg`.
    ///
    /// # Errors
    ///
    /// Returns an error if `lg` is greater than 3.
    ///
    /// # Examples
    ///
    /// ```
    /// # use thetasketch::common::ResizeFactor;
    /// assert_eq!(ResizeFactor::from_lg(2).unwrap(), ResizeFactor::X4);
    /// assert!(ResizeFactor::from_lg(4).is_err());
    /// ```
    pub fn from_lg(lg: u8) -> Result<Self, Error> {
        match lg {
            0 => Ok(ResizeFactor::X1),
            1 => Ok(ResizeFactor::X2),
            2 => Ok(ResizeFactor::X4),
            3 => Ok(ResizeFactor::X8),
            _ => Err(Error::config_invalid(format!(
                "unsupported resize factor: 2^{lg}, expected one of 1, 2, 4, 8"
            ))),
        }
    }
}

/// Number of standard deviations used for confidence bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NumStdDev {
    /// About 68.3% confidence.
    One,
    /// About 95.4% confidence.
    Two,
    /// About 99.7% confidence.
    Three,
}

impl NumStdDev {
    /// Returns the number of standard deviations as an integer.
    pub const fn as_u8(self) -> u8 {
        match self {
            NumStdDev::One => 1,
            NumStdDev::Two => 2,
            NumStdDev::Three => 3,
        }
    }
}

/// Canonicalize a double so that equal values hash equally: `-0.0` becomes `0.0` and every NaN
/// becomes the canonical NaN.
pub fn canonical_double(value: f64) -> f64 {
    if value == 0.0 {
        0.0
    } else if value.is_nan() {
        f64::NAN
    } else {
        value
    }
}
