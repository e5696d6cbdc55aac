//! Identifier and timestamp helpers.

mod ids;
mod timestamps;

pub use ids::{generate_run_id, random_seed};
pub use timestamps::{format_timestamp, iso_timestamp, Timestamp};
