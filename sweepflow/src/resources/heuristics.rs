//! Memory estimates from complexity signals.

use crate::errors::ResourceEstimationError;
use crate::params::ParamSet;

/// Estimates working memory for a family of experiments.
pub trait MemoryHeuristic: Send + Sync {
    /// Returns the family name, for logs.
    fn name(&self) -> &str;

    /// Estimates working memory in megabytes.
    ///
    /// # Errors
    ///
    /// Returns an error naming the missing complexity signals. The stage
    /// name is filled in by the caller.
    fn estimate_megs(&self, params: &ParamSet) -> Result<u64, ResourceEstimationError>;
}

/// Estimate for dependency parsing models.
///
/// Starts from a fixed base, doubles for each higher-order factor family,
/// scales with belief propagation iterations and adds the feature table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyParseHeuristic {
    /// Base estimate in megabytes.
    pub base_megs: u64,
    /// Table size used when features are not hashed.
    pub unhashed_table_megs: u64,
    /// Granularity of the final estimate.
    pub round_to_megs: u64,
}

/// Flags that each double the estimate when set.
pub const HIGHER_ORDER_FLAGS: [&str; 3] = ["grandparentFactors", "siblingFactors", "headBigramFactors"];

/// Bytes per hashed feature slot: the weight and its AdaGrad sum.
const BYTES_PER_FEATURE_SLOT: u64 = 16;

/// Iterations past this do not grow the estimate further.
const MAX_COUNTED_BP_ITERATIONS: i64 = 8;

impl Default for DependencyParseHeuristic {
    fn default() -> Self {
        Self {
            base_megs: 3 * 1024,
            unhashed_table_megs: 2048,
            round_to_megs: 256,
        }
    }
}

impl MemoryHeuristic for DependencyParseHeuristic {
    fn name(&self) -> &str {
        "dependency-parse"
    }

    fn estimate_megs(&self, params: &ParamSet) -> Result<u64, ResourceEstimationError> {
        let bp_iterations = params.get_i64("bpMaxIterations");
        let hash_mod = params.get_i64("featureHashMod");

        let missing: Vec<String> = [("bpMaxIterations", bp_iterations), ("featureHashMod", hash_mod)]
            .into_iter()
            .filter(|(_, v)| v.is_none())
            .map(|(k, _)| k.to_string())
            .collect();
        let (Some(bp_iterations), Some(hash_mod)) = (bp_iterations, hash_mod) else {
            return Err(ResourceEstimationError::new("", missing));
        };

        let mut megs = self.base_megs as f64;
        for flag in HIGHER_ORDER_FLAGS {
            if params.get_bool(flag).unwrap_or(false) {
                megs *= 2.0;
            }
        }

        let counted = bp_iterations.clamp(1, MAX_COUNTED_BP_ITERATIONS);
        megs *= 1.0 + (counted - 1) as f64 / 4.0;

        if hash_mod > 0 {
            megs += (hash_mod as u64 * BYTES_PER_FEATURE_SLOT) as f64 / (1024.0 * 1024.0);
        } else {
            megs += self.unhashed_table_megs as f64;
        }

        Ok(round_up(megs.ceil() as u64, self.round_to_megs))
    }
}

/// A constant estimate, for families without complexity signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHeuristic(pub u64);

impl MemoryHeuristic for FixedHeuristic {
    fn name(&self) -> &str {
        "fixed"
    }

    fn estimate_megs(&self, _params: &ParamSet) -> Result<u64, ResourceEstimationError> {
        Ok(self.0)
    }
}

fn round_up(value: u64, step: u64) -> u64 {
    if step == 0 {
        return value;
    }
    value.div_ceil(step) * step
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_first_order_hashed() {
        let h = DependencyParseHeuristic::default();
        let p = params! { "bpMaxIterations" => 1, "featureHashMod" => 1_000_000 };
        // 3072 + 15.3 rounds to 3328.
        assert_eq!(h.estimate_megs(&p).unwrap(), 3328);
    }

    #[test]
    fn test_higher_order_doubles() {
        let h = DependencyParseHeuristic::default();
        let p = params! {
            "bpMaxIterations" => 1,
            "featureHashMod" => 0,
            "grandparentFactors" => true,
            "siblingFactors" => true,
        };
        assert_eq!(h.estimate_megs(&p).unwrap(), 3072 * 4 + 2048);
    }

    #[test]
    fn test_bp_iterations_capped() {
        let h = DependencyParseHeuristic::default();
        let eight = params! { "bpMaxIterations" => 8, "featureHashMod" => 0 };
        let many = params! { "bpMaxIterations" => 100, "featureHashMod" => 0 };
        assert_eq!(h.estimate_megs(&eight).unwrap(), h.estimate_megs(&many).unwrap());
        // 3072 * 2.75 + 2048
        assert_eq!(h.estimate_megs(&eight).unwrap(), 10496);
    }

    #[test]
    fn test_missing_signals_reported() {
        let h = DependencyParseHeuristic::default();
        let err = h.estimate_megs(&params! { "siblingFactors" => true }).unwrap_err();
        assert_eq!(err.missing, vec!["bpMaxIterations", "featureHashMod"]);
    }

    #[test]
    fn test_fixed() {
        assert_eq!(FixedHeuristic(1024).estimate_megs(&ParamSet::new()).unwrap(), 1024);
    }
}
