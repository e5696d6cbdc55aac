//! Identifier generation.

use rand::Rng;
use uuid::Uuid;

/// Generates a new run id.
#[must_use]
pub fn generate_run_id() -> Uuid {
    Uuid::new_v4()
}

/// Draws a seed for an experiment's random number generator.
#[must_use]
pub fn random_seed() -> i64 {
    rand::thread_rng().gen_range(0..i64::from(i32::MAX))
}
