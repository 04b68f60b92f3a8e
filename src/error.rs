//! Structured, per-subsystem error types.
//!
//! Every fallible subsystem owns a `thiserror`-derived enum. [`ZephyrError`]
//! composes them at the crate boundary so the CLI can map a single type to the
//! exit codes in spec §7 without re-deriving context from a string.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest not found at {0}")]
    Missing(PathBuf),

    #[error("invalid manifest at {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("module '{module}' has missing dependency '{dependency}'")]
    MissingDependency { module: String, dependency: String },

    #[error("Circular dependency detected involving: {}", .cycle.join(", "))]
    CircularDependency { cycle: Vec<String> },
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("I/O error scanning {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("pattern set exceeds maximum compiled size ({actual} > {max} bytes)")]
    PatternSetTooLarge { actual: usize, max: usize },

    #[error("failed to compile pattern '{pattern}': {source}")]
    PatternCompile {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("security scan found {0} critical finding(s)")]
    CriticalFindings(usize),
}

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("signature file is missing")]
    Missing,

    #[error("signature is not valid base64")]
    InvalidEncoding,

    #[error("signature must be 64 bytes, got {0}")]
    WrongLength(usize),

    #[error("issuer public key must be 32 bytes, got {0}")]
    BadKeyLength(usize),

    #[error("issuer public key is malformed")]
    BadKey,

    #[error("signature does not verify against the issuer key")]
    VerificationFailed,
}

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("source does not resolve to a git URL or allowed local path")]
    InvalidSource,

    #[error("a git hook was detected in the cloned module: {0}")]
    HookDetected(String),

    #[error("security scan found {critical} critical finding(s)")]
    ScanCritical { critical: usize },

    #[error("module scan was not confirmed by the invoking session")]
    WarningsNotConfirmed,

    #[error("module is missing a manifest")]
    NoManifest,

    #[error("manifest is invalid: {0}")]
    InvalidManifest(String),

    #[error("module name mismatch: expected '{expected}', found '{found}'")]
    NameMismatch { expected: String, found: String },

    #[error("module is not compatible with this platform: {0}")]
    PlatformIncompatible(String),

    #[error("module references missing file(s): {}", .0.join(", "))]
    MissingFiles(Vec<String>),

    #[error("module lacks a valid signature and unsigned installs are not permitted")]
    UnsignedRejected,

    #[error("module '{0}' is already installed")]
    AlreadyInstalled(String),

    #[error("git operation failed: {0}")]
    Git(#[from] git2::Error),

    #[error("I/O error during install: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum PermissionError {
    #[error("capability '{capability}' is denied for role '{role}': {reason}")]
    Denied {
        capability: String,
        role: String,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("I/O error writing audit log: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize audit event: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Top-level error, used to map any subsystem failure to spec §7's exit codes.
#[derive(Debug, Error)]
pub enum ZephyrError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Resolver(#[from] ResolverError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    Install(#[from] InstallError),

    #[error(transparent)]
    Permission(#[from] PermissionError),

    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ZephyrError {
    /// Maps this error to the process exit code described in spec §7.
    pub fn exit_code(&self) -> u8 {
        match self {
            ZephyrError::InvalidArgument(_) => 4,
            ZephyrError::Manifest(ManifestError::Invalid { .. }) => 4,
            ZephyrError::Manifest(_) => 1,
            ZephyrError::Resolver(_) => 1,
            ZephyrError::Scan(ScanError::CriticalFindings(_)) => 2,
            ZephyrError::Scan(_) => 3,
            ZephyrError::Signature(_) => 2,
            ZephyrError::Install(InstallError::ScanCritical { .. }) => 2,
            ZephyrError::Install(InstallError::HookDetected(_)) => 2,
            ZephyrError::Install(InstallError::UnsignedRejected) => 2,
            ZephyrError::Install(InstallError::AlreadyInstalled(_)) => 1,
            ZephyrError::Install(InstallError::Io(_)) => 3,
            ZephyrError::Install(InstallError::Git(_)) => 3,
            ZephyrError::Install(_) => 1,
            ZephyrError::Permission(_) => 2,
            ZephyrError::Audit(_) => 3,
            ZephyrError::Cache(_) => 3,
            ZephyrError::Io(_) => 3,
        }
    }

    /// A short, user-facing "Suggested fixes" block, when one applies.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            ZephyrError::Resolver(ResolverError::MissingDependency { .. }) => {
                Some("Install the missing dependency, or remove it from [dependencies].required.")
            }
            ZephyrError::Resolver(ResolverError::CircularDependency { .. }) => {
                Some("Break the cycle by removing one of the listed modules from another's required dependencies.")
            }
            ZephyrError::Install(InstallError::ScanCritical { .. }) => {
                Some("Re-run `zephyr scan <source>` for details, or pass --unsafe if you trust this source.")
            }
            ZephyrError::Install(InstallError::AlreadyInstalled(_)) => {
                Some("Pass --force to overwrite, or `zephyr uninstall` the existing module first.")
            }
            ZephyrError::Permission(PermissionError::Denied { .. }) => {
                Some("Re-run as a human session, or ask an administrator to grant this capability.")
            }
            _ => None,
        }
    }
}
