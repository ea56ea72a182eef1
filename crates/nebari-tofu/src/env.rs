//! Explicit environment layers for tool invocations.
//!
//! Credentials reach the `tofu` subprocess through an [`ExecEnv`] handed to
//! every call instead of being exported into the process environment.

use std::collections::BTreeMap;
use std::fmt;

#[derive(Clone, Default, PartialEq, Eq)]
pub struct ExecEnv {
    vars: BTreeMap<String, String>,
}

impl ExecEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Builder form of [`ExecEnv::set`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    /// Overlays `other` on top of `self`; keys in `other` win.
    pub fn extend(&mut self, other: &ExecEnv) {
        for (key, value) in &other.vars {
            self.vars.insert(key.clone(), value.clone());
        }
    }

    /// Flattens layers in order, later layers winning.
    pub fn merged<'a, I>(layers: I) -> ExecEnv
    where
        I: IntoIterator<Item = &'a ExecEnv>,
    {
        let mut env = ExecEnv::new();
        for layer in layers {
            env.extend(layer);
        }
        env
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

// Values are credentials; only keys are printed.
impl fmt::Debug for ExecEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.vars.keys()).finish()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ExecEnv {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut env = ExecEnv::new();
        for (key, value) in iter {
            env.set(key, value);
        }
        env
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_later_layers_win() {
        let base = ExecEnv::new().with("A", "1").with("B", "1");
        let top = ExecEnv::new().with("B", "2").with("C", "2");

        let merged = ExecEnv::merged([&base, &top]);

        assert_eq!(merged.get("A"), Some("1"));
        assert_eq!(merged.get("B"), Some("2"));
        assert_eq!(merged.get("C"), Some("2"));
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn test_debug_hides_values() {
        let env = ExecEnv::new().with("KUBE_TOKEN", "very-secret");
        let printed = format!("{:?}", env);
        assert!(printed.contains("KUBE_TOKEN"));
        assert!(!printed.contains("very-secret"));
    }

    #[test]
    fn test_from_iterator() {
        let env: ExecEnv = [("X", "1"), ("Y", "2")].into_iter().collect();
        assert_eq!(env.keys().collect::<Vec<_>>(), vec!["X", "Y"]);
    }
}
