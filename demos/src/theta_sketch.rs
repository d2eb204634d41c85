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


//! Example demonstrating theta sketch usage

use thetasketch::common::NumStdDev;
use thetasketch::error::Error;
use thetasketch::hash::DEFAULT_UPDATE_SEED;
use thetasketch::theta::CompactThetaSketch;
use thetasketch::theta::ThetaANotB;
use thetasketch::theta::ThetaIntersection;
use thetasketch::theta::ThetaSketch;
use thetasketch::theta::ThetaUnion;
use thetasketch::theta::WrappedCompactThetaSketch;

fn main() -> Result<(), Error> {
    println!("=== Theta Sketch Example ===\n");

    // Example 1: Basic usage
    println!("1. Basic Theta Sketch Usage:");
    let mut sketch = ThetaSketch::builder().lg_k(10).build()?;

    for i in 0..100 {
        sketch.update(format!("item_{}", i));
    }
    sketch.update("duplicate_item");
    sketch.update("duplicate_item");

    println!("   Estimate: {:.2}", sketch.estimate());
    println!("   Theta: {:.6}", sketch.theta());
    println!("   Num retained: {}", sketch.num_retained());
    println!();

    // Example 2: Add more data to enter estimation mode
    println!("2. Add more data to enter estimation mode:");
    for i in 0..5000 {
        sketch.update(format!("item_{}", i));
    }
    println!("   Estimate: {:.2}", sketch.estimate());
    println!("   Theta: {:.6}", sketch.theta());
    println!("   Num retained: {}", sketch.num_retained());
    println!(
        "   95% bounds: [{:.2}, {:.2}]",
        sketch.lower_bound(NumStdDev::Two),
        sketch.upper_bound(NumStdDev::Two)
    );
    println!();

    // Example 3: Set operations
    println!("3. Set operations on A = [1, 1000] and B = [500, 1500]:");
    let mut a = ThetaSketch::builder().build()?;
    let mut b = ThetaSketch::builder().build()?;
    for i in 1..=1000u64 {
        a.update_u64(i);
    }
    for i in 500..=1500u64 {
        b.update_u64(i);
    }

    let mut union = ThetaUnion::builder().build()?;
    union.update(&a)?;
    union.update(&b)?;
    println!("   Union estimate: {:.2}", union.result(true).estimate());

    let mut intersection = ThetaIntersection::new_with_default_seed();
    intersection.update(&a)?;
    intersection.update(&b)?;
    println!(
        "   Intersection estimate: {:.2}",
        intersection.result()?.estimate()
    );

    let a_not_b = ThetaANotB::default().compute(&a, &b, true)?;
    println!("   A not B estimate: {:.2}", a_not_b.estimate());
    println!();

    // Example 4: Compressed serialization
    println!("4. Serialization:");
    let compact = sketch.compact(true);
    let plain = compact.serialize();
    let compressed = compact.serialize_compressed();
    println!("   Uncompressed (v3): {} bytes", plain.len());
    println!("   Compressed (v4): {} bytes", compressed.len());

    let wrapped = WrappedCompactThetaSketch::wrap(&compressed, DEFAULT_UPDATE_SEED)?;
    println!("   Wrapped estimate: {:.2}", wrapped.estimate());
    let restored = CompactThetaSketch::deserialize(&compressed)?;
    println!("   Restored estimate: {:.2}", restored.estimate());
    println!();
    println!("{restored}");

    Ok(())
}
