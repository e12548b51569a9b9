#![allow(deprecated)] // TODO: move cargo_bin to the cargo_bin_cmd! macro

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

const CONNECTION: &str = r#"
openstack:
  connection:
    username: admin
    password: secret
    auth_url: http://controller:5000/v3
    project_name: admin
"#;

fn launch() -> Command {
    let mut cmd = Command::cargo_bin("snaps-launch").unwrap();
    cmd.env_remove("SNAPS_ENV_FILE").env_remove("RUST_LOG");
    cmd
}

fn write(dir: &Path, name: &str, content: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path.display().to_string()
}

#[test]
fn test_cli_help() {
    launch()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--env-file"))
        .stdout(predicate::str::contains("--deploy"))
        .stdout(predicate::str::contains("--clean"))
        .stdout(predicate::str::contains("--clean-images"))
        .stdout(predicate::str::contains("--log-level"));
}

#[test]
fn test_an_action_is_required() {
    let dir = TempDir::new().unwrap();
    let env = write(dir.path(), "env.yaml", CONNECTION);
    launch()
        .args(["-e", &env])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--deploy"));
}

#[test]
fn test_deploy_and_clean_are_exclusive() {
    let dir = TempDir::new().unwrap();
    let env = write(dir.path(), "env.yaml", CONNECTION);
    launch()
        .args(["-e", &env, "-d", "-c"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn test_clean_images_requires_clean() {
    let dir = TempDir::new().unwrap();
    let env = write(dir.path(), "env.yaml", CONNECTION);
    launch()
        .args(["-e", &env, "-d", "-i"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--clean-images"))
        .stdout(predicate::str::contains("Nothing to deploy").not());
    launch()
        .args(["-e", &env, "-i"])
        .assert()
        .failure();
}

#[test]
fn test_missing_env_file_is_reported() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.yaml");
    launch()
        .args(["-e", &missing.display().to_string(), "-d"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nope.yaml"));
}

#[test]
fn test_empty_deployment_deploys_nothing() {
    let dir = TempDir::new().unwrap();
    let env = write(dir.path(), "env.yaml", CONNECTION);
    launch()
        .args(["-e", &env, "-d"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to deploy"));
}

#[test]
fn test_empty_deployment_cleans_nothing() {
    let dir = TempDir::new().unwrap();
    let env = write(dir.path(), "env.yaml", CONNECTION);
    launch()
        .args(["-e", &env, "--clean", "--clean-images"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Clean complete"));
}

#[test]
fn test_env_file_from_environment_variable() {
    let dir = TempDir::new().unwrap();
    let env = write(dir.path(), "env.yaml", CONNECTION);
    launch()
        .env("SNAPS_ENV_FILE", &env)
        .arg("-d")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to deploy"));
}

#[test]
fn test_template_variables_are_rendered() {
    let dir = TempDir::new().unwrap();
    let env = write(
        dir.path(),
        "env.yaml",
        &format!("{}  flavors:\n    - flavor: {{name: m1.tiny, ram: \"{{{{ ram }}}}\", disk: 1, vcpus: 1}}\n", CONNECTION),
    );
    // Without the variable the template cannot render.
    launch()
        .args(["-e", &env, "-c"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("template error"));

    let vars = write(dir.path(), "vars.yaml", "ram: not-a-number\n");
    launch()
        .args(["-e", &env, "-v", &vars, "-c"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Flavor config error"));
}

#[test]
fn test_invalid_section_is_reported() {
    let dir = TempDir::new().unwrap();
    let env = write(
        dir.path(),
        "env.yaml",
        &format!("{}  networks:\n    name: private\n", CONNECTION),
    );
    launch()
        .args(["-e", &env, "-d"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("networks"));
}

#[test]
fn test_credentials_come_from_openrc_without_connection() {
    let dir = TempDir::new().unwrap();
    let env = write(dir.path(), "env.yaml", "openstack: {}\n");
    launch()
        .args(["-e", &env, "-d"])
        .env_remove("OS_AUTH_URL")
        .env_remove("OS_USERNAME")
        .env_remove("OS_PASSWORD")
        .env_remove("OS_PROJECT_NAME")
        .env_remove("OS_TENANT_NAME")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--openrc"));

    let openrc = write(
        dir.path(),
        "admin-openrc",
        "export OS_USERNAME=admin\n\
         export OS_PASSWORD=secret\n\
         export OS_AUTH_URL=http://controller:5000/v3\n\
         export OS_PROJECT_NAME=admin\n",
    );
    launch()
        .args(["-e", &env, "-d", "--openrc", &openrc])
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to deploy"));
}

#[test]
fn test_clean_failure_exits_non_zero() {
    let dir = TempDir::new().unwrap();
    let env = write(
        dir.path(),
        "env.yaml",
        &format!("{}  networks:\n    - network: {{name: private}}\n", CONNECTION),
    );
    // Without `openstack` on PATH every lookup fails.
    launch()
        .args(["-e", &env, "-c"])
        .env("PATH", dir.path())
        .assert()
        .failure()
        .stdout(predicate::str::contains("⚠ Network private"))
        .stdout(predicate::str::contains("✓ Network").not())
        .stderr(predicate::str::contains("Clean failed for 1 resource(s)"));
}
