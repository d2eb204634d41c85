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

//! Theta sketches for distinct counting with set operations.
//!
//! A [`ThetaSketch`] is updated with items and keeps the smallest hashes below a sampling
//! threshold theta. [`compact`](ThetaSketch::compact) turns it into an immutable
//! [`CompactThetaSketch`], which serializes to any of the four serial versions and reads back
//! either owned or in place as a [`WrappedCompactThetaSketch`].
//!
//! [`ThetaUnion`], [`ThetaIntersection`] and [`ThetaANotB`] combine any of these forms through
//! the [`ThetaSketchView`] trait.
//!
//! # Examples
//!
//! ```
//! use thetasketch::theta::CompactThetaSketch;
//! use thetasketch::theta::ThetaSketch;
//! use thetasketch::theta::ThetaUnion;
//!
//! let mut a = ThetaSketch::builder().lg_k(12).build().unwrap();
//! let mut b = ThetaSketch::builder().lg_k(12).build().unwrap();
//! for i in 0..1000u64 {
//!     a.update_u64(i);
//!     b.update_u64(i + 500);
//! }
//!
//! let bytes = b.compact(true).serialize_compressed();
//! let b = CompactThetaSketch::deserialize(&bytes).unwrap();
//!
//! let mut union = ThetaUnion::builder().lg_k(12).build().unwrap();
//! union.update(&a).unwrap();
//! union.update(&b).unwrap();
//! assert_eq!(union.result(true).estimate(), 1500.0);
//! ```

mod a_not_b;
mod bit_pack;
mod compact;
mod hash_table;
pub mod host;
mod intersection;
pub mod serialization;
mod sketch;
mod union;
mod view;
mod wrapped;

pub use self::a_not_b::ThetaANotB;
pub use self::compact::CompactThetaSketch;
pub use self::hash_table::DEFAULT_LG_K;
pub use self::hash_table::MAX_LG_K;
pub use self::hash_table::MAX_THETA;
pub use self::hash_table::MIN_LG_K;
pub use self::intersection::ThetaIntersection;
pub use self::sketch::ThetaSketch;
pub use self::sketch::ThetaSketchBuilder;
pub use self::union::ThetaUnion;
pub use self::union::ThetaUnionBuilder;
pub use self::view::ThetaSketchView;
pub use self::wrapped::WrappedCompactThetaSketch;
pub use self::wrapped::WrappedEntries;
