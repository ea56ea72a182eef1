//! Stage providers and the registry that resolves the pipeline.

use crate::error::{NebariError, Result};
use crate::stage::Stage;
use nebari_config::NebariConfig;
use nebari_tofu::InfraEngine;
use regex::Regex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

/// Construction inputs handed to every provider.
#[derive(Clone)]
pub struct StageFactory {
    pub output_directory: PathBuf,
    pub config: Arc<NebariConfig>,
    pub engine: Arc<dyn InfraEngine>,
    pub template_root: Option<PathBuf>,
}

impl StageFactory {
    pub fn new(
        output_directory: impl Into<PathBuf>,
        config: Arc<NebariConfig>,
        engine: Arc<dyn InfraEngine>,
    ) -> Self {
        Self {
            output_directory: output_directory.into(),
            config,
            engine,
            template_root: None,
        }
    }

    pub fn with_template_root(mut self, root: Option<PathBuf>) -> Self {
        self.template_root = root;
        self
    }
}

/// A module contributing stages. Plugins implement this and are registered at startup.
pub trait StageProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this provider belongs to the built-in pipeline.
    fn is_default(&self) -> bool {
        false
    }

    fn stages(&self, factory: &StageFactory) -> Vec<Box<dyn Stage>>;
}

#[derive(Debug, Clone, Default)]
pub struct StageFilter {
    /// Full-match regexes on stage names.
    pub exclude: Vec<String>,
    /// Drop every stage contributed by a default provider.
    pub exclude_default_stages: bool,
}

pub struct RegisteredStage {
    pub provider: String,
    pub stage: Box<dyn Stage>,
}

#[derive(Default)]
pub struct StageRegistry {
    providers: Vec<Box<dyn StageProvider>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Box<dyn StageProvider>) {
        tracing::debug!(provider = provider.name(), "registered stage provider");
        self.providers.push(provider);
    }

    pub fn with_provider(mut self, provider: Box<dyn StageProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn providers(&self) -> impl Iterator<Item = &dyn StageProvider> {
        self.providers.iter().map(|p| p.as_ref())
    }

    /// Collects, filters, deduplicates and sorts the stages for one run.
    pub fn resolve(&self, factory: &StageFactory, filter: &StageFilter) -> Result<Vec<RegisteredStage>> {
        let patterns = compile_patterns(&filter.exclude)?;

        let mut resolved = Vec::new();
        for provider in &self.providers {
            if filter.exclude_default_stages && provider.is_default() {
                tracing::info!(provider = provider.name(), "excluding default stages");
                continue;
            }
            for stage in provider.stages(factory) {
                if patterns.iter().any(|p| p.is_match(stage.name())) {
                    tracing::info!(stage = stage.name(), "excluding stage");
                    continue;
                }
                resolved.push(RegisteredStage {
                    provider: provider.name().to_string(),
                    stage,
                });
            }
        }

        let mut seen = HashSet::new();
        for entry in &resolved {
            if !seen.insert(entry.stage.name().to_string()) {
                return Err(NebariError::DuplicateStage(entry.stage.name().to_string()));
            }
        }

        // stable: equal priorities keep registration order
        resolved.sort_by_key(|entry| entry.stage.priority());

        warn_on_dependencies(&resolved);
        Ok(resolved)
    }
}

/// Drops the provider labels.
pub fn into_stages(resolved: Vec<RegisteredStage>) -> Vec<Box<dyn Stage>> {
    resolved.into_iter().map(|entry| entry.stage).collect()
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| NebariError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })
        })
        .collect()
}

fn warn_on_dependencies(resolved: &[RegisteredStage]) {
    for entry in resolved {
        let stage = &entry.stage;
        for dependency in stage.depends_on() {
            match resolved.iter().find(|other| other.stage.name() == *dependency) {
                None => tracing::warn!(
                    stage = stage.name(),
                    dependency,
                    "stage depends on a stage that is not part of this run"
                ),
                Some(other) if other.stage.priority() >= stage.priority() => tracing::warn!(
                    stage = stage.name(),
                    dependency,
                    "stage depends on a stage that does not run before it"
                ),
                Some(_) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{NoopEngine, StubStage, factory};

    struct Provider {
        name: &'static str,
        default: bool,
        stages: Vec<(&'static str, i32)>,
    }

    impl StageProvider for Provider {
        fn name(&self) -> &str {
            self.name
        }

        fn is_default(&self) -> bool {
            self.default
        }

        fn stages(&self, _factory: &StageFactory) -> Vec<Box<dyn Stage>> {
            self.stages
                .iter()
                .map(|(name, priority)| Box::new(StubStage::new(name, *priority)) as Box<dyn Stage>)
                .collect()
        }
    }

    fn names(resolved: &[RegisteredStage]) -> Vec<&str> {
        resolved.iter().map(|e| e.stage.name()).collect()
    }

    fn registry() -> StageRegistry {
        StageRegistry::new()
            .with_provider(Box::new(Provider {
                name: "builtin",
                default: true,
                stages: vec![("30-c", 30), ("10-a", 10), ("20-b", 20)],
            }))
            .with_provider(Box::new(Provider {
                name: "plugin",
                default: false,
                stages: vec![("25-plugin", 25)],
            }))
    }

    #[test]
    fn test_sorted_by_priority() {
        let factory = factory(NoopEngine::arc());
        let resolved = registry().resolve(&factory, &StageFilter::default()).unwrap();
        assert_eq!(names(&resolved), vec!["10-a", "20-b", "25-plugin", "30-c"]);
        assert_eq!(resolved[2].provider, "plugin");
    }

    #[test]
    fn test_equal_priorities_keep_registration_order() {
        let registry = StageRegistry::new().with_provider(Box::new(Provider {
            name: "p",
            default: false,
            stages: vec![("x", 5), ("y", 1), ("z", 5), ("w", 1)],
        }));
        let resolved = registry
            .resolve(&factory(NoopEngine::arc()), &StageFilter::default())
            .unwrap();
        assert_eq!(names(&resolved), vec!["y", "w", "x", "z"]);
    }

    #[test]
    fn test_exclude_by_regex_full_match() {
        let filter = StageFilter {
            exclude: vec!["20-.*".to_string(), "a".to_string()],
            exclude_default_stages: false,
        };
        let resolved = registry().resolve(&factory(NoopEngine::arc()), &filter).unwrap();
        // "a" must not match "10-a"
        assert_eq!(names(&resolved), vec!["10-a", "25-plugin", "30-c"]);
    }

    #[test]
    fn test_exclude_default_stages() {
        let filter = StageFilter {
            exclude: vec![],
            exclude_default_stages: true,
        };
        let resolved = registry().resolve(&factory(NoopEngine::arc()), &filter).unwrap();
        assert_eq!(names(&resolved), vec!["25-plugin"]);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let registry = registry().with_provider(Box::new(Provider {
            name: "clash",
            default: false,
            stages: vec![("20-b", 99)],
        }));
        let err = registry
            .resolve(&factory(NoopEngine::arc()), &StageFilter::default())
            .err()
            .unwrap();
        assert!(matches!(err, NebariError::DuplicateStage(name) if name == "20-b"));
    }

    #[test]
    fn test_duplicate_resolved_by_exclusion_of_defaults() {
        let registry = registry().with_provider(Box::new(Provider {
            name: "replacement",
            default: false,
            stages: vec![("20-b", 20)],
        }));
        let filter = StageFilter {
            exclude: vec![],
            exclude_default_stages: true,
        };
        let resolved = registry.resolve(&factory(NoopEngine::arc()), &filter).unwrap();
        assert_eq!(names(&resolved), vec!["20-b", "25-plugin"]);
    }

    #[test]
    fn test_invalid_pattern() {
        let filter = StageFilter {
            exclude: vec!["(".to_string()],
            exclude_default_stages: false,
        };
        let err = registry()
            .resolve(&factory(NoopEngine::arc()), &filter)
            .err()
            .unwrap();
        assert!(matches!(err, NebariError::InvalidPattern { .. }));
    }
}
