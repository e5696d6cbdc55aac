//! Resource planning and out-of-memory escalation.

mod escalation;
mod heuristics;
mod planner;

pub use escalation::{get_oome_stages, ladder_megs, OomeLadder, OOME_TIER_KEY};
pub use heuristics::{DependencyParseHeuristic, FixedHeuristic, MemoryHeuristic, HIGHER_ORDER_FLAGS};
pub use planner::{ResourcePlan, ResourcePlanner};
