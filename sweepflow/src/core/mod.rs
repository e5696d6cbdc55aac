//! Core domain model types for sweepflow.
//!
//! This module contains the fundamental value types shared by the
//! parameter algebra and the stage graph:
//! - Stage status and kind enums
//! - Parameter values

mod status;
mod value;

pub use status::{StageKind, StageStatus};
pub use value::ParamValue;
