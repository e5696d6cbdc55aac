//! The parameter algebra.
//!
//! A [`ParamSet`] is a flagged key/value bag. Sets compose with `+`
//! (right-biased, associative, non-mutating) and render to a canonical
//! directory name and a canonical argument list.

mod param_set;

pub use param_set::{ParamEntry, ParamSet};
