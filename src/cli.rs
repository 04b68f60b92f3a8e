//! `clap`-derived argument surface (spec §4.12 / §6's CLI command table).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Discovers, validates, installs, and composes reusable shell-configuration
/// modules.
#[derive(Parser)]
#[command(name = "zephyr", about, version)]
pub struct Cli {
    /// Emit info-level logging.
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Emit debug-level logging.
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    /// Emit trace-level logging (implies --debug).
    #[arg(long, global = true)]
    pub trace: bool,

    /// Disable ANSI color in output, regardless of TTY detection.
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolves installed modules and emits shell source to stdout.
    Load,

    /// Lists discovered modules and their compatibility with this platform.
    List,

    /// Validates every discovered manifest and the dependency graph.
    Validate,

    /// Scaffolds a new module directory under the modules directory.
    Init {
        /// The new module's name (letters, digits, `-`, `_`; starts with a letter).
        name: String,
    },

    /// Clones, scans, validates, and installs a module from a source.
    Install {
        /// Git URL, or a local path when `--local` is passed.
        source: String,

        /// Proceed even if a non-sample git hook is present in the clone.
        #[arg(long = "unsafe")]
        unsafe_mode: bool,

        /// Overwrite an existing installation of the same module name.
        #[arg(long)]
        force: bool,

        /// Skip the security scanner entirely.
        #[arg(long)]
        skip_scan: bool,

        /// Treat `source` as a local filesystem path rather than a git URL.
        #[arg(long)]
        local: bool,

        /// Require the manifest's signature to verify against this issuer key
        /// (base64), rejecting unsigned or unverifiable modules.
        #[arg(long)]
        issuer_key: Option<String>,
    },

    /// Fetches and rescans an installed module (or all of them) at its new HEAD.
    Update {
        /// Module name to update; omit to update every installed module.
        module: Option<String>,

        /// Fetch and scan but roll back regardless of outcome (dry run).
        #[arg(long)]
        check: bool,

        /// Proceed even if a non-sample git hook appears at the new HEAD.
        #[arg(long = "unsafe")]
        unsafe_mode: bool,

        /// Accept the update even when the scan reports warnings.
        #[arg(long)]
        force: bool,

        /// Skip the security scanner entirely.
        #[arg(long)]
        skip_scan: bool,
    },

    /// Removes an installed module's directory.
    Uninstall {
        /// Module name to remove.
        name: String,

        /// Remove even if other installed modules list this one as required.
        #[arg(long)]
        force: bool,

        /// Skip the interactive confirmation prompt.
        #[arg(long)]
        yes: bool,
    },

    /// Scans a module source directory or a single shell command.
    Scan {
        /// A filesystem path (module root) or a literal shell command string.
        target: String,

        /// Emit the stable JSON scan schema instead of plain text.
        #[arg(long)]
        json: bool,
    },

    /// Prints the current invocation's detected session.
    Session,

    /// Lists every session known to the on-disk registry.
    Sessions,

    /// Reads back audit log events.
    Audit {
        /// Restrict to one event category.
        #[arg(long = "type")]
        category: Option<String>,

        /// Only events at or after this RFC3339 timestamp.
        #[arg(long)]
        since: Option<String>,

        /// Only events for this agent id.
        #[arg(long)]
        agent: Option<String>,
    },

    /// Registers (or re-registers) the current session, e.g. from emitted shell
    /// source.
    RegisterSession {
        /// Session id to register; generated when omitted.
        #[arg(long)]
        session_id: Option<String>,
    },

    /// Prints version information.
    Version {
        /// Print only the version number.
        #[arg(long)]
        short: bool,
    },

    /// Inspects or updates the security configuration.
    Config {
        /// Adds a path to the trusted-module allowlist.
        #[arg(long)]
        add_trusted: Option<String>,
    },
}

/// Resolves the modules directory: `ZSH_MODULES_DIR`, else `$HOME/.zsh/modules`.
pub fn modules_dir(home: &std::path::Path) -> PathBuf {
    std::env::var("ZSH_MODULES_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home.join(".zsh").join("modules"))
}

/// Resolves the cache directory: `$HOME/.zsh/cache`.
pub fn cache_dir(home: &std::path::Path) -> PathBuf {
    home.join(".zsh").join("cache")
}

/// Resolves the home directory used for all Zephyr state, honoring
/// `ZEPHYR_CONFIG_DIR` as an override of the whole `$HOME/.zephyr` root's
/// parent (spec §4.14), falling back to `dirs::home_dir()`/`$HOME`.
pub fn home_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("ZEPHYR_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}
