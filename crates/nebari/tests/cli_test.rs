#![allow(deprecated)] // TODO: move from cargo_bin to the cargo_bin_cmd! macro

mod common;

use assert_cmd::Command;
use common::{LOCAL_CONFIG, TestProject};
use predicates::prelude::*;

fn nebari() -> Command {
    let mut cmd = Command::cargo_bin("nebari").unwrap();
    cmd.env_remove("NEBARI_CONFIG_PATH")
        .env_remove("NEBARI_TEMPLATE_DIR")
        .env("RUST_LOG", "warn");
    cmd
}

#[test]
fn test_cli_help() {
    nebari()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("deploy"))
        .stdout(predicate::str::contains("destroy"))
        .stdout(predicate::str::contains("render"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("stages"));
}

#[test]
fn test_cli_version() {
    nebari()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("nebari {}", env!("CARGO_PKG_VERSION"))));
}

#[test]
fn test_deploy_help_lists_flags() {
    nebari()
        .args(["deploy", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--dns-provider"))
        .stdout(predicate::str::contains("--dns-auto-provision"))
        .stdout(predicate::str::contains("--disable-render"))
        .stdout(predicate::str::contains("--disable-checks"))
        .stdout(predicate::str::contains("--skip-remote-state-provision"))
        .stdout(predicate::str::contains("--exclude-stage"));
}

#[test]
fn test_validate_accepts_local_config() {
    let project = TestProject::with_config(LOCAL_CONFIG);
    nebari()
        .arg("validate")
        .arg("-c")
        .arg(project.config_path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("demo"));
}

#[test]
fn test_validate_rejects_bad_project_name() {
    let project = TestProject::with_config("project_name: 1demo\nprovider: local\n");
    nebari()
        .arg("validate")
        .arg("-c")
        .arg(project.config_path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("project_name"));
}

#[test]
fn test_validate_missing_file() {
    let project = TestProject::new();
    nebari()
        .arg("validate")
        .arg("-c")
        .arg(project.config_path())
        .assert()
        .failure();
}

#[test]
fn test_config_path_from_environment() {
    let project = TestProject::with_config(LOCAL_CONFIG);
    nebari()
        .env("NEBARI_CONFIG_PATH", project.config_path())
        .arg("validate")
        .assert()
        .success();
}

#[test]
fn test_stages_lists_pipeline_in_order() {
    let project = TestProject::with_config(LOCAL_CONFIG);
    let output = nebari()
        .arg("stages")
        .arg("-c")
        .arg(project.config_path())
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let bootstrap = stdout.find("bootstrap").unwrap();
    let ingress = stdout.find("04-kubernetes-ingress").unwrap();
    let extensions = stdout.find("08-nebari-tf-extensions").unwrap();
    assert!(bootstrap < ingress && ingress < extensions);
    assert!(stdout.contains("Stages (9)"));
}

#[test]
fn test_stages_exclusion() {
    let project = TestProject::with_config(LOCAL_CONFIG);
    nebari()
        .args(["--exclude-stage", "0[5-8]-.*"])
        .arg("stages")
        .arg("-c")
        .arg(project.config_path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Stages (5)"))
        .stdout(predicate::str::contains("05-kubernetes-keycloak").not());

    nebari()
        .arg("--exclude-default-stages")
        .arg("stages")
        .arg("-c")
        .arg(project.config_path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Stages (0)"));
}

#[test]
fn test_invalid_exclusion_pattern() {
    let project = TestProject::with_config(LOCAL_CONFIG);
    nebari()
        .args(["stages", "--exclude-stage", "(", "-c"])
        .arg(project.config_path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid stage exclusion pattern"));
}

#[test]
fn test_render_writes_then_is_clean() {
    let project = TestProject::with_config(LOCAL_CONFIG);

    nebari()
        .arg("render")
        .arg("-c")
        .arg(project.config_path())
        .arg("-o")
        .arg(project.output())
        .assert()
        .success()
        .stdout(predicate::str::contains("New files"));

    assert!(project.output().join(".gitignore").is_file());
    assert!(project
        .output()
        .join("stages/02-infrastructure/local/_nebari.tf.json")
        .is_file());
    assert!(project
        .output()
        .join("stages/07-kubernetes-services/_nebari.tf.json")
        .is_file());

    nebari()
        .arg("render")
        .arg("-c")
        .arg(project.config_path())
        .arg("-o")
        .arg(project.output())
        .assert()
        .success()
        .stdout(predicate::str::contains("up to date"));
}

#[test]
fn test_render_prints_diff_before_writing() {
    let project = TestProject::with_config(LOCAL_CONFIG);
    let output = nebari()
        .arg("render")
        .arg("-c")
        .arg(project.config_path())
        .arg("-o")
        .arg(project.output())
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let table = stdout.find("New files").unwrap();
    let written = stdout.find("Wrote").unwrap();
    assert!(table < written);
}

#[test]
fn test_render_dry_run_writes_nothing() {
    let project = TestProject::with_config(LOCAL_CONFIG);
    nebari()
        .args(["render", "--dry-run", "-c"])
        .arg(project.config_path())
        .arg("-o")
        .arg(project.output())
        .assert()
        .success()
        .stdout(predicate::str::contains("Dry run"))
        .stdout(predicate::str::contains("stages/01-terraform-state/local/_nebari.tf.json"));
    assert!(!project.output().join("stages").exists());
}

#[test]
fn test_render_refuses_home_directory() {
    let project = TestProject::with_config(LOCAL_CONFIG);
    nebari()
        .env("HOME", project.path())
        .arg("render")
        .arg("-c")
        .arg(project.config_path())
        .arg("-o")
        .arg(project.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("home directory"));
}

#[test]
fn test_destroy_without_yes_only_warns() {
    let project = TestProject::with_config(LOCAL_CONFIG);
    nebari()
        .arg("destroy")
        .arg("-c")
        .arg(project.config_path())
        .arg("-o")
        .arg(project.output())
        .assert()
        .success()
        .stdout(predicate::str::contains("destroys every resource"))
        .stdout(predicate::str::contains("--yes"));
    assert!(!project.output().exists());
}

#[test]
fn test_deploy_prevented() {
    let project = TestProject::with_config(&format!("{}prevent_deploy: true\n", LOCAL_CONFIG));
    nebari()
        .arg("deploy")
        .arg("-c")
        .arg(project.config_path())
        .arg("-o")
        .arg(project.output())
        .assert()
        .failure()
        .stderr(predicate::str::contains("prevent_deploy"));
}

#[test]
fn test_dns_auto_provision_needs_provider() {
    let project = TestProject::with_config(LOCAL_CONFIG);
    nebari()
        .args(["deploy", "--dns-auto-provision", "-c"])
        .arg(project.config_path())
        .arg("-o")
        .arg(project.output())
        .assert()
        .failure()
        .stderr(predicate::str::contains("--dns-provider"));
}
