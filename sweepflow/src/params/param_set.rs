//! Flagged parameter sets with a composition algebra.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::ops::{Add, AddAssign};

use crate::core::ParamValue;
use crate::errors::UnresolvedReferenceError;
use crate::graph::PathResolver;

/// A value together with its rendering flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamEntry {
    /// The value.
    pub value: ParamValue,
    /// Whether the key contributes a token to the stage name.
    pub incl_name: bool,
    /// Whether the key is passed to the executable.
    pub incl_arg: bool,
}

impl ParamEntry {
    /// Creates an entry with both flags set.
    #[must_use]
    pub fn new(value: impl Into<ParamValue>) -> Self {
        Self {
            value: value.into(),
            incl_name: true,
            incl_arg: true,
        }
    }
}

/// A named, flagged parameter bag.
///
/// Keys are kept sorted so every rendering is a pure function of the
/// content, whatever order it was assembled in. Initial keys, when
/// present, come first in both the name and the argument list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamSet {
    entries: BTreeMap<String, ParamEntry>,
    #[serde(default)]
    initial_keys: Vec<String>,
}

impl ParamSet {
    /// Creates an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the canonical prefix ordering.
    #[must_use]
    pub fn with_initial_keys<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.initial_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a value with both flags defaulted, builder style.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.put(key, value);
        self
    }

    /// Adds a value with explicit flags, builder style.
    #[must_use]
    pub fn with_flags(
        mut self,
        key: impl Into<String>,
        value: impl Into<ParamValue>,
        incl_name: bool,
        incl_arg: bool,
    ) -> Self {
        self.set(key, value, incl_name, incl_arg);
        self
    }

    /// Sets a value and both of its flags.
    pub fn set(
        &mut self,
        key: impl Into<String>,
        value: impl Into<ParamValue>,
        incl_name: bool,
        incl_arg: bool,
    ) -> &mut Self {
        self.entries.insert(
            key.into(),
            ParamEntry {
                value: value.into(),
                incl_name,
                incl_arg,
            },
        );
        self
    }

    /// Sets a value, keeping the flags of an existing key.
    /// New keys are included in both the name and the arguments.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> &mut Self {
        let value = value.into();
        self.entries
            .entry(key.into())
            .and_modify(|entry| entry.value = value.clone())
            .or_insert_with(|| ParamEntry::new(value));
        self
    }

    /// Bulk [`put`](Self::put).
    pub fn update<I, K, V>(&mut self, pairs: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ParamValue>,
    {
        for (key, value) in pairs {
            self.put(key, value);
        }
        self
    }

    /// Gets a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.entries.get(key).map(|entry| &entry.value)
    }

    /// Gets a value with its flags.
    #[must_use]
    pub fn entry(&self, key: &str) -> Option<&ParamEntry> {
        self.entries.get(key)
    }

    /// Returns `(incl_name, incl_arg)` for a key.
    #[must_use]
    pub fn flags(&self, key: &str) -> Option<(bool, bool)> {
        self.entries
            .get(key)
            .map(|entry| (entry.incl_name, entry.incl_arg))
    }

    /// Gets an integer value.
    #[must_use]
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(ParamValue::as_i64)
    }

    /// Gets a numeric value as a float.
    #[must_use]
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(ParamValue::as_f64)
    }

    /// Gets a boolean value.
    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(ParamValue::as_bool)
    }

    /// Gets a string value.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(ParamValue::as_str)
    }

    /// Returns true if the key is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Removes a key, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<ParamValue> {
        self.entries.remove(key).map(|entry| entry.value)
    }

    /// Changes whether an existing key appears in the name.
    /// Returns false if the key is absent.
    pub fn set_incl_name(&mut self, key: &str, incl_name: bool) -> bool {
        self.entries
            .get_mut(key)
            .map(|entry| entry.incl_name = incl_name)
            .is_some()
    }

    /// Changes whether an existing key is passed as an argument.
    /// Returns false if the key is absent.
    pub fn set_incl_arg(&mut self, key: &str, incl_arg: bool) -> bool {
        self.entries
            .get_mut(key)
            .map(|entry| entry.incl_arg = incl_arg)
            .is_some()
    }

    /// Returns the number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the set has no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the declared initial keys.
    #[must_use]
    pub fn initial_keys(&self) -> &[String] {
        &self.initial_keys
    }

    /// Iterates over all entries in lexicographic key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterates over every path reference held by the set.
    pub fn paths(&self) -> impl Iterator<Item = (&str, &crate::graph::StagePath)> {
        self.entries
            .iter()
            .filter_map(|(k, v)| v.value.as_path().map(|p| (k.as_str(), p)))
    }

    /// Canonical key order: present initial keys in declared order, then
    /// the rest lexicographically.
    #[must_use]
    pub fn key_order(&self) -> Vec<&str> {
        let mut order: Vec<&str> = Vec::with_capacity(self.entries.len());
        for key in &self.initial_keys {
            if self.entries.contains_key(key) && !order.contains(&key.as_str()) {
                order.push(key);
            }
        }
        for key in self.entries.keys() {
            if !self.initial_keys.contains(key) {
                order.push(key);
            }
        }
        order
    }

    fn ordered(&self) -> impl Iterator<Item = (&str, &ParamEntry)> {
        self.key_order()
            .into_iter()
            .filter_map(|key| self.entries.get(key).map(|entry| (key, entry)))
    }

    /// Renders the `--key value` argument list, resolving path references.
    ///
    /// # Errors
    ///
    /// Returns an error if a referenced stage has no directory yet.
    pub fn get_args<R>(&self, resolver: &R) -> Result<Vec<String>, UnresolvedReferenceError>
    where
        R: PathResolver + ?Sized,
    {
        let mut args = Vec::new();
        for (key, entry) in self.ordered().filter(|(_, e)| e.incl_arg) {
            let value = match &entry.value {
                ParamValue::Path(path) => resolver.resolve(path)?.display().to_string(),
                other => other.to_string(),
            };
            args.push(format!("--{key}"));
            args.push(value);
        }
        Ok(args)
    }

    /// Renders the argument list without resolving path references.
    #[must_use]
    pub fn get_args_preview(&self) -> Vec<String> {
        self.ordered()
            .filter(|(_, e)| e.incl_arg)
            .flat_map(|(key, entry)| [format!("--{key}"), entry.value.to_string()])
            .collect()
    }

    /// Renders the canonical, path-safe stage name.
    ///
    /// Path references never contribute: they are unstable until resolution.
    #[must_use]
    pub fn get_name(&self) -> String {
        self.ordered()
            .filter(|(_, e)| e.incl_name && !e.value.is_path())
            .map(|(key, entry)| {
                format!("{}_{}", sanitize(key), sanitize(&entry.value.to_string()))
            })
            .collect::<Vec<_>>()
            .join("_")
    }

    /// Stable hash of the full content, flags included.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..16])
    }

    /// Composes two sets without mutating either.
    #[must_use]
    pub fn compose(&self, other: &Self) -> Self {
        let mut out = self.clone();
        out.merge(other);
        out
    }

    fn merge(&mut self, other: &Self) {
        for (key, entry) in &other.entries {
            self.entries.insert(key.clone(), entry.clone());
        }
        for key in &other.initial_keys {
            if !self.initial_keys.contains(key) {
                self.initial_keys.push(key.clone());
            }
        }
    }
}

/// Keeps `[A-Za-z0-9._=+-]`, maps everything else to `-`.
fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '=' | '+' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

impl Add<&ParamSet> for &ParamSet {
    type Output = ParamSet;

    fn add(self, rhs: &ParamSet) -> ParamSet {
        self.compose(rhs)
    }
}

impl Add<&Self> for ParamSet {
    type Output = Self;

    fn add(mut self, rhs: &Self) -> Self {
        self.merge(rhs);
        self
    }
}

impl Add for ParamSet {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self.merge(&rhs);
        self
    }
}

impl AddAssign<&Self> for ParamSet {
    fn add_assign(&mut self, rhs: &Self) {
        self.merge(rhs);
    }
}

impl<K, V> FromIterator<(K, V)> for ParamSet
where
    K: Into<String>,
    V: Into<ParamValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = Self::new();
        set.update(iter);
        set
    }
}

/// Builds a [`ParamSet`] with both flags set on every key.
///
/// ```
/// use sweepflow::params;
///
/// let set = params! { "a" => 1, "algebra" => "LOG_SIGN", "useLogAddTable" => false };
/// assert_eq!(set.get_name(), "a_1_algebra_LOG_SIGN_useLogAddTable_False");
/// ```
#[macro_export]
macro_rules! params {
    () => {
        $crate::params::ParamSet::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut set = $crate::params::ParamSet::new();
        $( set.put($key, $value); )+
        set
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{StageId, StagePath};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::path::PathBuf;

    struct FixedResolver;

    impl PathResolver for FixedResolver {
        fn resolve(&self, path: &StagePath) -> Result<PathBuf, UnresolvedReferenceError> {
            if path.stage() == StageId(1) {
                Ok(PathBuf::from("/exp/prune").join(path.file()))
            } else {
                Err(UnresolvedReferenceError::new(path.stage(), path.file()))
            }
        }
    }

    #[test]
    fn test_compose_example() {
        let d1 = crate::params! { "a" => 1, "b" => 2 };
        let d2 = crate::params! { "b" => 3, "c" => 4 };
        let composed = &d1 + &d2;

        assert_eq!(composed.get_i64("a"), Some(1));
        assert_eq!(composed.get_i64("b"), Some(3));
        assert_eq!(composed.get_i64("c"), Some(4));
        assert_eq!(composed.get_name(), "a_1_b_3_c_4");
        assert_eq!(
            composed.get_args(&FixedResolver).unwrap().join(" "),
            "--a 1 --b 3 --c 4"
        );
        // Operands untouched.
        assert_eq!(d1.get_i64("b"), Some(2));
        assert_eq!(d2.len(), 2);
    }

    #[test]
    fn test_right_bias_includes_flags() {
        let mut a = ParamSet::new();
        a.set("k", 1, true, true);
        let mut b = ParamSet::new();
        b.set("k", 2, false, true);

        let c = &a + &b;
        assert_eq!(c.get_i64("k"), Some(2));
        assert_eq!(c.flags("k"), Some((false, true)));
    }

    #[test]
    fn test_update_preserves_flags() {
        let mut set = ParamSet::new();
        set.set("work_mem_megs", 1024, false, false);
        set.update([("work_mem_megs", 2048), ("threads", 2)]);

        assert_eq!(set.get_i64("work_mem_megs"), Some(2048));
        assert_eq!(set.flags("work_mem_megs"), Some((false, false)));
        assert_eq!(set.flags("threads"), Some((true, true)));
    }

    #[test]
    fn test_initial_keys_lead() {
        let set = crate::params! { "b" => 1, "z" => 2, "language" => "en" }
            .with_initial_keys(["language", "missing"]);
        assert_eq!(set.key_order(), vec!["language", "b", "z"]);
        assert_eq!(set.get_name(), "language_en_b_1_z_2");
    }

    #[test]
    fn test_flags_filter_rendering() {
        let mut set = crate::params! { "a" => 1 };
        set.set("hidden", "x", false, false);
        set.set("argOnly", 5, false, true);
        set.set("nameOnly", 6, true, false);

        assert_eq!(set.get_name(), "a_1_nameOnly_6");
        assert_eq!(set.get_args_preview(), vec!["--a", "1", "--argOnly", "5"]);
    }

    #[test]
    fn test_paths_excluded_from_name_but_resolved_in_args() {
        let set = crate::params! { "trainer" => "CLL" }
            .with("pruneModel", StagePath::new(StageId(1), "model.binary.gz"));

        assert_eq!(set.get_name(), "trainer_CLL");
        assert_eq!(
            set.get_args(&FixedResolver).unwrap(),
            vec!["--pruneModel", "/exp/prune/model.binary.gz", "--trainer", "CLL"]
        );
    }

    #[test]
    fn test_unresolved_path_fails_args() {
        let set = ParamSet::new().with("modelIn", StagePath::new(StageId(9), "model.binary.gz"));
        let err = set.get_args(&FixedResolver).unwrap_err();
        assert_eq!(err.stage, StageId(9));
        assert!(set.get_args_preview()[1].contains("model.binary.gz"));
    }

    #[test]
    fn test_name_is_path_safe() {
        let set = crate::params! { "dataset" => "treebank_3/wsj 00" };
        assert_eq!(set.get_name(), "dataset_treebank_3-wsj-00");
    }

    #[test]
    fn test_set_incl_on_missing_key() {
        let mut set = crate::params! { "a" => 1 };
        assert!(set.set_incl_name("a", false));
        assert!(!set.set_incl_arg("absent", false));
        assert_eq!(set.get_name(), "");
    }

    #[test]
    fn test_remove() {
        let mut set = crate::params! { "modelOut" => "./model.binary.gz", "a" => 1 };
        assert_eq!(set.remove("modelOut"), Some(ParamValue::from("./model.binary.gz")));
        assert!(set.get("modelOut").is_none());
        assert_eq!(set.remove("modelOut"), None);
    }

    #[test]
    fn test_fingerprint_tracks_flags() {
        let a = crate::params! { "a" => 1 };
        let mut b = a.clone();
        assert_eq!(a.fingerprint(), b.fingerprint());
        b.set_incl_name("a", false);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    fn arb_param_set() -> impl Strategy<Value = ParamSet> {
        prop::collection::vec(
            (
                prop::sample::select(vec!["a", "b", "c", "d", "e"]),
                -5i64..5,
                any::<bool>(),
                any::<bool>(),
            ),
            0..6,
        )
        .prop_map(|entries| {
            let mut set = ParamSet::new();
            for (key, value, incl_name, incl_arg) in entries {
                set.set(key, value, incl_name, incl_arg);
            }
            set
        })
    }

    proptest! {
        #[test]
        fn prop_compose_is_associative(a in arb_param_set(), b in arb_param_set(), c in arb_param_set()) {
            let left = &(&a + &b) + &c;
            let right = &a + &(&b + &c);
            prop_assert_eq!(left, right);
        }

        #[test]
        fn prop_compose_does_not_mutate(a in arb_param_set(), b in arb_param_set()) {
            let (a0, b0) = (a.clone(), b.clone());
            let _ = &a + &b;
            prop_assert_eq!(a, a0);
            prop_assert_eq!(b, b0);
        }

        #[test]
        fn prop_right_bias(a in arb_param_set(), b in arb_param_set()) {
            let c = &a + &b;
            for (key, entry) in b.iter() {
                prop_assert_eq!(c.entry(key), Some(entry));
            }
            for (key, entry) in a.iter() {
                if !b.contains_key(key) {
                    prop_assert_eq!(c.entry(key), Some(entry));
                }
            }
        }

        #[test]
        fn prop_name_independent_of_assembly_order(a in arb_param_set()) {
            let mut forward = ParamSet::new();
            let mut backward = ParamSet::new();
            let entries: Vec<_> = a.iter().map(|(k, e)| (k.to_string(), e.clone())).collect();
            for (key, entry) in &entries {
                forward.set(key.clone(), entry.value.clone(), entry.incl_name, entry.incl_arg);
            }
            for (key, entry) in entries.iter().rev() {
                backward.set(key.clone(), entry.value.clone(), entry.incl_name, entry.incl_arg);
            }
            prop_assert_eq!(forward.get_name(), backward.get_name());
            prop_assert_eq!(forward.get_args_preview(), backward.get_args_preview());
        }

        #[test]
        fn prop_args_include_each_arg_key_once(a in arb_param_set()) {
            let args = a.get_args_preview();
            for (key, entry) in a.iter() {
                let flag = format!("--{key}");
                let count = args.iter().filter(|arg| **arg == flag).count();
                prop_assert_eq!(count, usize::from(entry.incl_arg));
            }
        }
    }
}
