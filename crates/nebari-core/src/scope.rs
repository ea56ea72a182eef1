//! Scope guards for stage deploy/destroy.
//!
//! A [`StageScope`] carries the environment layer a stage contributes to
//! later tool invocations. Dropping it releases the layer and runs any
//! release hooks. [`ScopeStack`] keeps scopes open for the rest of a run and
//! releases them last-in first-out.

use nebari_tofu::ExecEnv;

type ReleaseHook = Box<dyn FnOnce() + Send>;

pub struct StageScope {
    stage: String,
    env: ExecEnv,
    hooks: Vec<ReleaseHook>,
}

impl StageScope {
    /// A scope that contributes nothing.
    pub fn empty(stage: impl Into<String>) -> Self {
        Self::with_env(stage, ExecEnv::new())
    }

    pub fn with_env(stage: impl Into<String>, env: ExecEnv) -> Self {
        Self {
            stage: stage.into(),
            env,
            hooks: Vec::new(),
        }
    }

    /// Registers a hook run when the scope is released. Hooks run in reverse order.
    pub fn on_release<F>(mut self, hook: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.hooks.push(Box::new(hook));
        self
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    pub fn env(&self) -> &ExecEnv {
        &self.env
    }
}

impl Drop for StageScope {
    fn drop(&mut self) {
        while let Some(hook) = self.hooks.pop() {
            hook();
        }
        tracing::debug!(stage = %self.stage, vars = self.env.len(), "released stage scope");
    }
}

impl std::fmt::Debug for StageScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageScope")
            .field("stage", &self.stage)
            .field("env", &self.env)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct ScopeStack {
    scopes: Vec<StageScope>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, scope: StageScope) {
        self.scopes.push(scope);
    }

    /// Removes the most recent scope; dropping the result releases it.
    pub fn pop(&mut self) -> Option<StageScope> {
        self.scopes.pop()
    }

    /// Environment formed by every open scope, later scopes winning.
    pub fn env(&self) -> ExecEnv {
        ExecEnv::merged(self.scopes.iter().map(StageScope::env))
    }

    pub fn stages(&self) -> Vec<&str> {
        self.scopes.iter().map(StageScope::stage).collect()
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Releases every open scope, newest first.
    pub fn release_all(&mut self) {
        while let Some(scope) = self.scopes.pop() {
            drop(scope);
        }
    }
}

impl Drop for ScopeStack {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Box<dyn FnOnce() + Send>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_for_hooks = log.clone();
        let make = move |name: &str| -> Box<dyn FnOnce() + Send> {
            let log = log_for_hooks.clone();
            let name = name.to_string();
            Box::new(move || log.lock().unwrap().push(name))
        };
        (log, make)
    }

    #[test]
    fn test_stack_releases_lifo() {
        let (log, make) = recorder();
        {
            let mut stack = ScopeStack::new();
            stack.push(StageScope::empty("a").on_release(make("a")));
            stack.push(StageScope::empty("b").on_release(make("b")));
            stack.push(StageScope::empty("c").on_release(make("c")));
            assert_eq!(stack.stages(), vec!["a", "b", "c"]);
        }
        assert_eq!(*log.lock().unwrap(), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_hooks_within_scope_run_in_reverse() {
        let (log, make) = recorder();
        drop(
            StageScope::empty("s")
                .on_release(make("first"))
                .on_release(make("second")),
        );
        assert_eq!(*log.lock().unwrap(), vec!["second", "first"]);
    }

    #[test]
    fn test_env_layers_merge_and_pop() {
        let mut stack = ScopeStack::new();
        stack.push(StageScope::with_env(
            "infra",
            ExecEnv::new().with("KUBE_HOST", "https://a").with("SHARED", "infra"),
        ));
        stack.push(StageScope::with_env(
            "keycloak",
            ExecEnv::new().with("KEYCLOAK_URL", "https://k").with("SHARED", "keycloak"),
        ));

        let env = stack.env();
        assert_eq!(env.get("KUBE_HOST"), Some("https://a"));
        assert_eq!(env.get("SHARED"), Some("keycloak"));

        drop(stack.pop());
        let env = stack.env();
        assert_eq!(env.get("KEYCLOAK_URL"), None);
        assert_eq!(env.get("SHARED"), Some("infra"));
    }

    #[test]
    fn test_release_on_early_return() {
        let (log, make) = recorder();

        fn run(
            make: &dyn Fn(&str) -> Box<dyn FnOnce() + Send>,
            fail: bool,
        ) -> Result<(), String> {
            let mut stack = ScopeStack::new();
            stack.push(StageScope::empty("a").on_release(make("a")));
            stack.push(StageScope::empty("b").on_release(make("b")));
            if fail {
                return Err("check failed".to_string());
            }
            stack.push(StageScope::empty("c").on_release(make("c")));
            Ok(())
        }

        assert!(run(&make, true).is_err());
        assert_eq!(*log.lock().unwrap(), vec!["b", "a"]);
    }
}
