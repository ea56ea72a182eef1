use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const LOCAL_CONFIG: &str = "\
project_name: demo
provider: local
namespace: dev
security:
  keycloak:
    initial_root_password: s3cret
";

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn with_config(content: &str) -> Self {
        let project = Self::new();
        project.write_config(content);
        project
    }

    pub fn write_config(&self, content: &str) {
        fs::write(self.config_path(), content).unwrap();
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.path().join("nebari-config.yaml")
    }

    pub fn output(&self) -> PathBuf {
        self.root.path().join("out")
    }

    #[allow(dead_code)]
    pub fn path(&self) -> &Path {
        self.root.path()
    }
}
