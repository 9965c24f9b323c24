// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::cell::RefCell;

use rand::{Rng, SeedableRng};

thread_local! {
    static RNG: RefCell<rand::rngs::SmallRng> =
        RefCell::new(rand::rngs::SmallRng::from_entropy());
}

/// Generates a random non-zero 64-bit id.
///
/// Zero is reserved for "no parent", so it is never handed out.
pub fn generate_id() -> u64 {
    RNG.with(|rng| {
        let mut rng = rng.borrow_mut();
        loop {
            let id: u64 = rng.gen();
            if id != 0 {
                return id;
            }
        }
    })
}

/// Draws a uniform sample in `[0, 1)` for sampling coin flips.
pub(crate) fn random_unit() -> f64 {
    RNG.with(|rng| rng.borrow_mut().gen::<f64>())
}
