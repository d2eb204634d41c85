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

use thetasketch::error::ErrorKind;
use thetasketch::hash::DEFAULT_UPDATE_SEED;
use thetasketch::theta::CompactThetaSketch;
use thetasketch::theta::ThetaIntersection;
use thetasketch::theta::ThetaSketch;
use thetasketch::theta::WrappedCompactThetaSketch;

fn sketch_with_range(start: u64, count: u64) -> ThetaSketch {
    let mut sketch = ThetaSketch::builder().build().unwrap();
    for i in 0..count {
        sketch.update_u64(start + i);
    }
    sketch
}

#[test]
fn test_has_result_state_machine() {
    let mut a = ThetaSketch::builder().build().unwrap();
    a.update("x");

    let mut i = ThetaIntersection::new_with_default_seed();
    assert!(!i.has_result());
    i.update(&a).unwrap();
    assert!(i.has_result());
    assert!(i.result().unwrap().estimate() >= 1.0);
}

#[test]
fn test_result_before_update_is_undefined() {
    let i = ThetaIntersection::new(123);
    let err = i.result().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UndefinedState);
}

#[test]
fn test_update_accepts_compact_sketch() {
    let mut a = ThetaSketch::builder().build().unwrap();
    a.update("x");
    a.update("y");

    let mut b = ThetaSketch::builder().build().unwrap();
    b.update("y");
    b.update("z");

    let mut i = ThetaIntersection::new_with_default_seed();
    i.update(&a.compact(true)).unwrap();
    i.update(&b).unwrap();

    let r = i.result().unwrap();
    assert!(r.estimate() == 1.0);
    assert!(r.is_ordered());

    let mut c = ThetaSketch::builder().build().unwrap();
    c.update("a");
    c.update("b");
    c.update("c");

    i.update(&c.compact(false)).unwrap();

    let r = i.result_with_ordered(false).unwrap();
    assert!(r.estimate() == 0.0);
    assert!(r.is_empty());
}

#[test]
fn test_seed_mismatch_behaviour_for_empty_sketch() {
    let empty_other_seed = ThetaSketch::builder().seed(2).build().unwrap();
    let mut i = ThetaIntersection::new(1);

    i.update(&empty_other_seed).unwrap();
    assert!(i.has_result());
    let r = i.result().unwrap();
    assert!(r.is_empty());
}

#[test]
fn test_seed_mismatch_behaviour() {
    let mut one_other_seed = ThetaSketch::builder().seed(2).build().unwrap();
    one_other_seed.update("value");
    let mut i = ThetaIntersection::new(1);

    let err = i.update(&one_other_seed).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SeedMismatch);
}

#[test]
fn test_terminal_empty_state_ignores_future_updates() {
    let empty = ThetaSketch::builder().build().unwrap();

    let mut non_empty = ThetaSketch::builder().build().unwrap();
    non_empty.update("x");

    let mut i = ThetaIntersection::new_with_default_seed();
    i.update(&empty).unwrap();
    i.update(&non_empty).unwrap();

    let r = i.result().unwrap();
    assert!(r.is_empty());
}

#[test]
fn test_result_with_ordered_false_is_not_ordered() {
    let mut a = ThetaSketch::builder().build().unwrap();
    for i in 0..64 {
        a.update_i64(i);
    }
    let mut i = ThetaIntersection::new_with_default_seed();
    i.update(&a).unwrap();

    let r = i.result_with_ordered(false).unwrap();
    assert!(!r.is_ordered());
}

#[test]
fn test_empty_update_twice() {
    let empty = ThetaSketch::builder().build().unwrap();
    let mut i = ThetaIntersection::new_with_default_seed();

    i.update(&empty).unwrap();
    let r1 = i.result().unwrap();
    assert_eq!(r1.num_retained(), 0);
    assert!(r1.is_empty());
    assert!(!r1.is_estimation_mode());
    assert_eq!(r1.estimate(), 0.0);

    i.update(&empty).unwrap();
    let r2 = i.result().unwrap();
    assert_eq!(r2.num_retained(), 0);
    assert!(r2.is_empty());
    assert!(!r2.is_estimation_mode());
    assert_eq!(r2.estimate(), 0.0);
}

#[test]
fn test_non_empty_no_retained_keys() {
    let mut s = ThetaSketch::builder()
        .sampling_probability(0.001)
        .build()
        .unwrap();
    s.update_u64(1);

    let mut i = ThetaIntersection::new_with_default_seed();
    i.update(&s).unwrap();
    let r1 = i.result().unwrap();
    assert_eq!(r1.num_retained(), 0);
    assert!(!r1.is_empty());
    assert!(r1.is_estimation_mode());
    assert!((r1.theta() - 0.001).abs() < 1e-10);
    assert_eq!(r1.estimate(), 0.0);

    i.update(&s).unwrap();
    let r2 = i.result().unwrap();
    assert_eq!(r2.num_retained(), 0);
    assert!(!r2.is_empty());
    assert!(r2.is_estimation_mode());
    assert!((r2.theta() - 0.001).abs() < 1e-10);
    assert_eq!(r2.estimate(), 0.0);
}

#[test]
fn test_exact_half_overlap_unordered() {
    let s1 = sketch_with_range(0, 1000);
    let s2 = sketch_with_range(500, 1000);

    let mut i = ThetaIntersection::new_with_default_seed();
    i.update(&s1).unwrap();
    i.update(&s2).unwrap();
    let r = i.result().unwrap();

    assert!(!r.is_empty());
    assert!(!r.is_estimation_mode());
    assert_eq!(r.estimate(), 500.0);
}

#[test]
fn test_exact_half_overlap_ordered() {
    let s1 = sketch_with_range(0, 1000);
    let s2 = sketch_with_range(500, 1000);

    let mut i = ThetaIntersection::new_with_default_seed();
    i.update(&s1.compact(true)).unwrap();
    i.update(&s2.compact(true)).unwrap();
    let r = i.result().unwrap();

    assert!(!r.is_empty());
    assert!(!r.is_estimation_mode());
    assert_eq!(r.estimate(), 500.0);
}

#[test]
fn test_exact_disjoint_unordered() {
    let s1 = sketch_with_range(0, 1000);
    let s2 = sketch_with_range(1000, 1000);

    let mut i = ThetaIntersection::new_with_default_seed();
    i.update(&s1).unwrap();
    i.update(&s2).unwrap();
    let r = i.result().unwrap();

    assert!(r.is_empty());
    assert!(!r.is_estimation_mode());
    assert_eq!(r.estimate(), 0.0);
}

#[test]
fn test_exact_disjoint_ordered() {
    let s1 = sketch_with_range(0, 1000);
    let s2 = sketch_with_range(1000, 1000);

    let mut i = ThetaIntersection::new_with_default_seed();
    i.update(&s1.compact(true)).unwrap();
    i.update(&s2.compact(true)).unwrap();
    let r = i.result().unwrap();

    assert!(r.is_empty());
    assert!(!r.is_estimation_mode());
    assert_eq!(r.estimate(), 0.0);
}

#[test]
fn test_estimation_half_overlap_unordered() {
    let s1 = sketch_with_range(0, 10000);
    let s2 = sketch_with_range(5000, 10000);

    let mut i = ThetaIntersection::new_with_default_seed();
    i.update(&s1).unwrap();
    i.update(&s2).unwrap();
    let r = i.result().unwrap();

    assert!(!r.is_empty());
    assert!(r.is_estimation_mode());
    assert!((r.estimate() - 5000.0).abs() <= 5000.0 * 0.05);
}

#[test]
fn test_estimation_half_overlap_ordered() {
    let s1 = sketch_with_range(0, 10000);
    let s2 = sketch_with_range(5000, 10000);

    let mut i = ThetaIntersection::new_with_default_seed();
    i.update(&s1.compact(true)).unwrap();
    i.update(&s2.compact(true)).unwrap();
    let r = i.result().unwrap();

    assert!(!r.is_empty());
    assert!(r.is_estimation_mode());
    assert!((r.estimate() - 5000.0).abs() <= 5000.0 * 0.05);
}

#[test]
fn test_estimation_half_overlap_ordered_deserialized_compact() {
    let s1 = sketch_with_range(0, 10000);
    let s2 = sketch_with_range(5000, 10000);
    let c1 = CompactThetaSketch::deserialize(&s1.compact(true).serialize()).unwrap();
    let c2 = CompactThetaSketch::deserialize(&s2.compact(true).serialize()).unwrap();

    let mut i = ThetaIntersection::new_with_default_seed();
    i.update(&c1).unwrap();
    i.update(&c2).unwrap();
    let r = i.result().unwrap();

    assert!(!r.is_empty());
    assert!(r.is_estimation_mode());
    assert!((r.estimate() - 5000.0).abs() <= 5000.0 * 0.05);
}

#[test]
fn test_estimation_disjoint_unordered() {
    let s1 = sketch_with_range(0, 10000);
    let s2 = sketch_with_range(10000, 10000);

    let mut i = ThetaIntersection::new_with_default_seed();
    i.update(&s1).unwrap();
    i.update(&s2).unwrap();
    let r = i.result().unwrap();

    assert!(!r.is_empty());
    assert!(r.is_estimation_mode());
    assert_eq!(r.estimate(), 0.0);
}

#[test]
fn test_estimation_disjoint_ordered() {
    let s1 = sketch_with_range(0, 10000);
    let s2 = sketch_with_range(10000, 10000);

    let mut i = ThetaIntersection::new_with_default_seed();
    i.update(&s1.compact(true)).unwrap();
    i.update(&s2.compact(true)).unwrap();
    let r = i.result().unwrap();

    assert!(!r.is_empty());
    assert!(r.is_estimation_mode());
    assert_eq!(r.estimate(), 0.0);
}

#[test]
fn test_seed_mismatch_non_empty_returns_error() {
    let mut s = ThetaSketch::builder().build().unwrap();
    s.update_u64(1);

    let mut i = ThetaIntersection::new(123);
    assert!(i.update(&s).is_err());
}

#[test]
fn test_wrapped_inputs_match_owned() {
    let s1 = sketch_with_range(0, 10000);
    let s2 = sketch_with_range(5000, 10000);
    let b1 = s1.compact(true).serialize_compressed();
    let b2 = s2.compact(true).serialize();
    let w1 = WrappedCompactThetaSketch::wrap(&b1, DEFAULT_UPDATE_SEED).unwrap();
    let w2 = WrappedCompactThetaSketch::wrap(&b2, DEFAULT_UPDATE_SEED).unwrap();

    let mut wrapped = ThetaIntersection::new_with_default_seed();
    wrapped.update(&w1).unwrap();
    wrapped.update(&w2).unwrap();

    let mut owned = ThetaIntersection::new_with_default_seed();
    owned.update(&s1).unwrap();
    owned.update(&s2).unwrap();

    assert_eq!(wrapped.result().unwrap(), owned.result().unwrap());
}

#[test]
fn test_reset_returns_to_universe() {
    let mut i = ThetaIntersection::new_with_default_seed();
    i.update(&sketch_with_range(0, 10)).unwrap();
    i.update(&sketch_with_range(100, 10)).unwrap();
    i.reset();
    assert!(!i.has_result());

    i.update(&sketch_with_range(0, 10)).unwrap();
    assert_eq!(i.result().unwrap().estimate(), 10.0);
}

#[test]
fn test_intersection_with_itself_in_estimation_mode() {
    let a = sketch_with_range(0, 10_000);
    assert!(a.is_estimation_mode());

    for ordered in [true, false] {
        let compact = a.compact(ordered);
        let mut i = ThetaIntersection::new_with_default_seed();
        i.update(&compact).unwrap();
        i.update(&compact).unwrap();
        i.update(&a).unwrap();

        let r = i.result().unwrap();
        assert_eq!(r, a.compact(true), "ordered={ordered}");
        assert_eq!(r.theta64(), a.theta64());
        assert_eq!(r.estimate(), a.estimate());
    }
}
