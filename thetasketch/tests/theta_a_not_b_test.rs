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

use googletest::assert_that;
use googletest::prelude::near;
use thetasketch::error::ErrorKind;
use thetasketch::hash::DEFAULT_UPDATE_SEED;
use thetasketch::theta::CompactThetaSketch;
use thetasketch::theta::ThetaANotB;
use thetasketch::theta::ThetaIntersection;
use thetasketch::theta::ThetaSketch;
use thetasketch::theta::ThetaUnion;
use thetasketch::theta::WrappedCompactThetaSketch;

fn sketch_with_range(lg_k: u8, range: std::ops::RangeInclusive<u64>) -> ThetaSketch {
    let mut sketch = ThetaSketch::builder().lg_k(lg_k).build().unwrap();
    for i in range {
        sketch.update_u64(i);
    }
    sketch
}

#[test]
fn test_exact_overlap() {
    let a = sketch_with_range(12, 1..=1000);
    let b = sketch_with_range(12, 500..=1500);

    let result = ThetaANotB::default().compute(&a, &b, true).unwrap();
    assert!(!result.is_empty());
    assert!(!result.is_estimation_mode());
    assert!(result.is_ordered());
    assert_eq!(result.estimate(), 499.0);
}

#[test]
fn test_set_operations_agree() {
    let a = sketch_with_range(12, 1..=1000);
    let b = sketch_with_range(12, 500..=1500);

    let mut union = ThetaUnion::builder().build().unwrap();
    union.update(&a).unwrap();
    union.update(&b).unwrap();

    let mut intersection = ThetaIntersection::new_with_default_seed();
    intersection.update(&a).unwrap();
    intersection.update(&b).unwrap();

    let a_not_b = ThetaANotB::default().compute(&a, &b, true).unwrap();
    let b_not_a = ThetaANotB::default().compute(&b, &a, true).unwrap();

    assert_eq!(union.result(true).estimate(), 1500.0);
    assert_eq!(intersection.result().unwrap().estimate(), 501.0);
    assert_eq!(a_not_b.estimate(), 499.0);
    assert_eq!(b_not_a.estimate(), 1000.0);
}

#[test]
fn test_ordered_and_unordered_inputs_agree() {
    let a = sketch_with_range(12, 0..=9_999);
    let b = sketch_with_range(12, 5_000..=14_999);
    let a_not_b = ThetaANotB::default();

    let merged = a_not_b
        .compute(&a.compact(true), &b.compact(true), true)
        .unwrap();
    let looked_up = a_not_b.compute(&a, &b, true).unwrap();
    let half_ordered = a_not_b.compute(&a.compact(true), &b, true).unwrap();

    assert_eq!(merged, looked_up);
    assert_eq!(merged, half_ordered);
    assert!(merged.is_estimation_mode());
    assert_eq!(merged.theta64(), a.theta64().min(b.theta64()));
    assert!(merged.iter().all(|hash| hash < merged.theta64()));
    assert_that!(merged.estimate(), near(5000.0, 5000.0 * 0.1));
}

#[test]
fn test_unordered_result() {
    let a = sketch_with_range(12, 1..=100);
    let b = sketch_with_range(12, 51..=150);

    let result = ThetaANotB::default().compute(&a, &b, false).unwrap();
    assert!(!result.is_ordered());
    assert_eq!(result.num_retained(), 50);

    let bytes = result.serialize_compressed();
    assert_eq!(bytes[1], 3);
}

#[test]
fn test_wrapped_inputs() {
    let a = sketch_with_range(12, 1..=1000).compact(true);
    let b = sketch_with_range(12, 500..=1500).compact(true);
    let bytes_a = a.serialize_compressed();
    let bytes_b = b.serialize_compressed();
    let wrapped_a = WrappedCompactThetaSketch::wrap(&bytes_a, DEFAULT_UPDATE_SEED).unwrap();
    let wrapped_b = WrappedCompactThetaSketch::wrap(&bytes_b, DEFAULT_UPDATE_SEED).unwrap();

    let a_not_b = ThetaANotB::default();
    assert_eq!(
        a_not_b.compute(&wrapped_a, &wrapped_b, true).unwrap(),
        a_not_b.compute(&a, &b, true).unwrap()
    );
}

#[test]
fn test_empty_inputs() {
    let empty = ThetaSketch::builder().build().unwrap();
    let a = sketch_with_range(12, 1..=10);
    let a_not_b = ThetaANotB::default();

    let result = a_not_b.compute(&empty, &a, true).unwrap();
    assert!(result.is_empty());
    assert_eq!(result.serialize().len(), 8);

    let result = a_not_b.compute(&a, &empty, true).unwrap();
    assert_eq!(result, a.compact(true));
}

#[test]
fn test_disjoint_in_estimation_mode_is_not_empty() {
    let a = sketch_with_range(5, 1..=1000);
    let result = ThetaANotB::default().compute(&a, &a, true).unwrap();
    assert_eq!(result.num_retained(), 0);
    assert!(!result.is_empty());
    assert!(result.is_estimation_mode());

    let restored = CompactThetaSketch::deserialize(&result.serialize()).unwrap();
    assert_eq!(restored, result);
}

#[test]
fn test_seed_mismatch() {
    let a = sketch_with_range(12, 1..=10);
    let mut other = ThetaSketch::builder().seed(123).build().unwrap();
    other.update("x");
    let a_not_b = ThetaANotB::default();

    let err = a_not_b.compute(&a, &other, true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SeedMismatch);
    let err = a_not_b.compute(&other, &a, true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SeedMismatch);

    let mut intersection = ThetaIntersection::new_with_default_seed();
    let err = intersection.update(&other).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SeedMismatch);

    let mut union = ThetaUnion::builder().build().unwrap();
    let err = union.update(&other).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SeedMismatch);
}
