use std::path::{Path, PathBuf};

use assert_cmd::Command;
use tempfile::TempDir;

/// A throwaway `$HOME` for one test: every environment variable Zephyr reads
/// (`ZEPHYR_CONFIG_DIR`, session detection) is pinned to it, so tests never
/// touch the real `~/.zephyr` or `~/.zsh`.
pub struct TestHome {
    _dir: TempDir,
    path: PathBuf,
}

impl TestHome {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create test home");
        let path = dir.path().to_path_buf();
        Self { _dir: dir, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn modules_dir(&self) -> PathBuf {
        self.path.join(".zsh").join("modules")
    }
}

/// Builds a `zephyr` command rooted at `home`, with every agent-detection
/// variable cleared so the test runs as a plain human session unless a test
/// opts into something else via `.env(...)`.
pub fn zephyr(home: &TestHome) -> Command {
    let mut cmd = Command::cargo_bin("zephyr").expect("find zephyr binary");
    cmd.env("ZEPHYR_CONFIG_DIR", home.path())
        .env_remove("ZSH_MODULES_DIR")
        .env_remove("ZEPHYR_AGENT_TYPE")
        .env_remove("ZEPHYR_AGENT_ID")
        .env_remove("ZEPHYR_SESSION_ID")
        .env_remove("ZEPHYR_PARENT_PROCESS")
        .env_remove("ANTHROPIC_API_KEY")
        .env_remove("CLAUDE_CODE_SESSION")
        .env_remove("CURSOR_TRACE_ID")
        .env_remove("GITHUB_COPILOT_TOKEN")
        .env_remove("TERM_PROGRAM")
        .env_remove("NO_COLOR");
    cmd
}

/// Writes a minimal, well-formed module under `root` (a source directory, not
/// yet installed) and returns its path.
pub fn write_source_module(root: &Path, name: &str, version: &str) -> PathBuf {
    std::fs::create_dir_all(root).expect("create source module dir");
    std::fs::write(
        root.join("module.toml"),
        format!(
            "[module]\nname = \"{name}\"\nversion = \"{version}\"\n\n[load]\nfiles = [\"init.zsh\"]\n"
        ),
    )
    .expect("write module.toml");
    std::fs::write(root.join("init.zsh"), "# test fixture module\n").expect("write init.zsh");
    root.to_path_buf()
}
