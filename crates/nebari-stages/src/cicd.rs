//! CI/CD pipeline files for the deployment repository.
//!
//! GitHub Actions gets two workflows (deploy on push, validate on pull
//! request); GitLab CI gets a single `render-nebari` job. Both redeploy when
//! `nebari-config.yaml` changes on the configured branch.

use nebari_config::{CiKind, NebariConfig};
use nebari_core::{FileContent, NebariError, RenderedFiles, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// When set, CI installs nebari from this git branch instead of a release.
pub const DEV_BRANCH_ENV: &str = "NEBARI_GH_BRANCH";

pub const GITHUB_OPS_WORKFLOW: &str = ".github/workflows/nebari-ops.yaml";
pub const GITHUB_LINTER_WORKFLOW: &str = ".github/workflows/nebari-linter.yaml";
pub const GITLAB_CI_FILE: &str = ".gitlab-ci.yml";

const CONFIG_FILENAME: &str = "nebari-config.yaml";
const REPOSITORY: &str = "https://github.com/nebari-dev/nebari.git";
const COMMIT_EMAIL: &str = "nebari@nebari.dev";

pub const GITIGNORE_ENTRIES: &[&str] = &[
    ".terraform",
    "terraform.tfstate",
    "terraform.tfstate.backup",
    ".terraform.tfstate.lock.info",
    "__pycache__",
];

/// Inputs the generated pipelines depend on besides the config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CiContext {
    pub dev_branch: Option<String>,
}

impl CiContext {
    pub fn from_env() -> Self {
        Self {
            dev_branch: std::env::var(DEV_BRANCH_ENV).ok().filter(|b| !b.is_empty()),
        }
    }

    /// Shell command that installs the configured nebari version.
    pub fn install_command(&self, nebari_version: &str) -> String {
        match &self.dev_branch {
            Some(branch) => format!("cargo install --git {} --branch {} nebari --locked", REPOSITORY, branch),
            None => format!("cargo install nebari --version {} --locked", nebari_version),
        }
    }

    fn deploy_command(&self, always_skip_state: bool) -> String {
        let mut command = format!("nebari deploy --config {}", CONFIG_FILENAME);
        if always_skip_state || self.dev_branch.is_some() {
            command.push_str(" --skip-remote-state-provision");
        }
        command
    }
}

// GitHub Actions

#[derive(Debug, Clone, Serialize)]
pub struct GithubWorkflow {
    pub name: String,
    pub on: BTreeMap<String, GithubTrigger>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<BTreeMap<String, String>>,
    pub jobs: BTreeMap<String, GithubJob>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GithubTrigger {
    pub branches: Vec<String>,
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GithubJob {
    pub name: String,
    #[serde(rename = "runs-on")]
    pub runs_on: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<BTreeMap<String, String>>,
    pub steps: Vec<Step>,
}

/// A generated step, or one copied from `ci_cd.before_script`/`after_script`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Step {
    Typed(GithubStep),
    Raw(Value),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GithubStep {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uses: Option<String>,
    #[serde(rename = "with", skip_serializing_if = "Option::is_none")]
    pub with: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<BTreeMap<String, String>>,
}

fn secret(name: &str) -> String {
    format!("${{{{ secrets.{} }}}}", name)
}

fn string_map<const N: usize>(entries: [(&str, &str); N]) -> BTreeMap<String, String> {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Workflow-level environment: the GitHub token plus the provider credentials as secrets.
pub fn github_env_vars(config: &NebariConfig, context: &CiContext) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    vars.insert("GITHUB_TOKEN".to_string(), secret("GITHUB_TOKEN"));
    if context.dev_branch.is_some() {
        vars.insert(DEV_BRANCH_ENV.to_string(), secret(DEV_BRANCH_ENV));
    }
    for name in crate::credentials::required_variables(config.provider) {
        vars.insert(name.to_string(), secret(name));
    }
    vars
}

fn trigger(event: &str, branch: &str) -> BTreeMap<String, GithubTrigger> {
    let mut on = BTreeMap::new();
    on.insert(
        event.to_string(),
        GithubTrigger {
            branches: vec![branch.to_string()],
            paths: vec![CONFIG_FILENAME.to_string()],
        },
    );
    on
}

fn common_steps(config: &NebariConfig, context: &CiContext) -> Vec<Step> {
    vec![
        Step::Typed(GithubStep {
            name: "Checkout Image".into(),
            uses: Some("actions/checkout@v4".into()),
            with: Some(string_map([("token", secret("REPOSITORY_ACCESS_TOKEN").as_str())])),
            ..Default::default()
        }),
        Step::Typed(GithubStep {
            name: "Set up Rust".into(),
            uses: Some("dtolnay/rust-toolchain@stable".into()),
            ..Default::default()
        }),
        Step::Typed(GithubStep {
            name: "Install Nebari".into(),
            run: Some(context.install_command(&config.nebari_version)),
            ..Default::default()
        }),
    ]
}

pub fn nebari_ops(config: &NebariConfig, context: &CiContext) -> GithubWorkflow {
    let branch = &config.ci_cd.branch;
    let mut steps = common_steps(config, context);
    steps.extend(config.ci_cd.before_script.iter().cloned().map(Step::Raw));

    steps.push(Step::Typed(GithubStep {
        name: format!("Deploy Changes made in {}", CONFIG_FILENAME),
        run: Some(context.deploy_command(false)),
        ..Default::default()
    }));

    if config.ci_cd.commit_render {
        steps.push(Step::Typed(GithubStep {
            name: "Push Changes".into(),
            run: Some(format!(
                "git config user.email '{}' ; git config user.name 'github action' ; \
                 git add ./.gitignore ./.github ./stages; \
                 git diff --quiet && git diff --staged --quiet || (git commit -m '${{{{ env.COMMIT_MSG }}}}') ; \
                 git push origin {}",
                COMMIT_EMAIL, branch
            )),
            env: Some(string_map([(
                "COMMIT_MSG",
                "nebari-config.yaml automated commit: ${{ github.sha }}",
            )])),
            ..Default::default()
        }));
    }

    steps.extend(config.ci_cd.after_script.iter().cloned().map(Step::Raw));

    let mut jobs = BTreeMap::new();
    jobs.insert(
        "build".to_string(),
        GithubJob {
            name: "nebari".into(),
            runs_on: "ubuntu-latest".into(),
            permissions: Some(string_map([("contents", "read"), ("id-token", "write")])),
            steps,
        },
    );

    GithubWorkflow {
        name: "nebari auto update".into(),
        on: trigger("push", branch),
        env: Some(github_env_vars(config, context)),
        jobs,
    }
}

pub fn nebari_linter(config: &NebariConfig, context: &CiContext) -> GithubWorkflow {
    let mut steps = common_steps(config, context);
    steps.push(Step::Typed(GithubStep {
        name: "Nebari Lintify".into(),
        run: Some(format!("nebari validate --config {}", CONFIG_FILENAME)),
        env: Some(string_map([
            ("PR_NUMBER", "${{ github.event.number }}"),
            ("REPO_NAME", "${{ github.repository }}"),
            ("GITHUB_TOKEN", secret("REPOSITORY_ACCESS_TOKEN").as_str()),
        ])),
        ..Default::default()
    }));

    let env = context
        .dev_branch
        .as_ref()
        .map(|_| string_map([(DEV_BRANCH_ENV, secret(DEV_BRANCH_ENV).as_str())]));

    let mut jobs = BTreeMap::new();
    jobs.insert(
        "nebari-validate".to_string(),
        GithubJob {
            name: "nebari".into(),
            runs_on: "ubuntu-latest".into(),
            permissions: None,
            steps,
        },
    );

    GithubWorkflow {
        name: "nebari linter".into(),
        on: trigger("pull_request", &config.ci_cd.branch),
        env,
        jobs,
    }
}

// GitLab CI

#[derive(Debug, Clone, Serialize)]
pub struct GitlabJob {
    pub image: String,
    pub variables: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub before_script: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub after_script: Vec<Value>,
    pub script: Vec<String>,
    pub rules: Vec<GitlabRule>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GitlabRule {
    #[serde(rename = "if")]
    pub condition: String,
    pub changes: Vec<String>,
}

pub fn gitlab_ci(config: &NebariConfig, context: &CiContext) -> BTreeMap<String, GitlabJob> {
    let branch = &config.ci_cd.branch;
    let mut script = vec![
        format!("git checkout {}", branch),
        context.install_command(&config.nebari_version),
        context.deploy_command(true),
    ];

    if config.ci_cd.commit_render {
        script.extend([
            format!("git config user.email '{}'", COMMIT_EMAIL),
            "git config user.name 'gitlab ci'".to_string(),
            "git add .".to_string(),
            format!(
                "git diff --quiet && git diff --staged --quiet || (git commit -m '${{COMMIT_MSG}}' && git push origin {})",
                branch
            ),
        ]);
    }

    let job = GitlabJob {
        image: "rust:latest".into(),
        variables: string_map([("COMMIT_MSG", "nebari-config.yaml automated commit: $CI_COMMIT_SHA")]),
        before_script: config.ci_cd.before_script.clone(),
        after_script: config.ci_cd.after_script.clone(),
        script,
        rules: vec![GitlabRule {
            condition: format!("$CI_COMMIT_BRANCH == '{}'", branch),
            changes: vec![CONFIG_FILENAME.to_string()],
        }],
    };

    let mut document = BTreeMap::new();
    document.insert("render-nebari".to_string(), job);
    document
}

fn to_yaml<T: Serialize>(value: &T) -> Result<FileContent> {
    serde_yaml::to_string(value)
        .map(FileContent::Text)
        .map_err(|e| NebariError::Stage(format!("failed to serialize CI file: {}", e)))
}

/// The CI files for `ci_cd.type`, plus `.gitignore`.
pub fn render_cicd(config: &NebariConfig, context: &CiContext) -> Result<RenderedFiles> {
    let mut files = RenderedFiles::new();
    match config.ci_cd.kind {
        CiKind::GithubActions => {
            files.insert(GITHUB_OPS_WORKFLOW.into(), to_yaml(&nebari_ops(config, context))?);
            files.insert(GITHUB_LINTER_WORKFLOW.into(), to_yaml(&nebari_linter(config, context))?);
        }
        CiKind::GitlabCi => {
            files.insert(GITLAB_CI_FILE.into(), to_yaml(&gitlab_ci(config, context))?);
        }
        CiKind::None => {}
    }

    files.insert(
        ".gitignore".into(),
        FileContent::Text(format!("{}\n", GITIGNORE_ENTRIES.join("\n"))),
    );
    Ok(files)
}
