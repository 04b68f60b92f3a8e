//! Fetch-and-rescan update pipeline (spec §4.7's update variant): reuses the
//! scan/validate steps of [`crate::install`] against the new HEAD before
//! committing, rolling back to the pre-fetch ref on any critical finding.

use std::path::Path;

use crate::audit::{AuditEvent, AuditLog, EventCategory, EventOutcome};
use crate::error::InstallError;
use crate::manifest::{parse_manifest, Module};
use crate::permission::Session;
use crate::platform::{incompatibility_reason, CurrentPlatform};
use crate::scanner::Scanner;

pub struct UpdateOptions {
    pub unsafe_mode: bool,
    pub skip_scan: bool,
    pub interactive: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            unsafe_mode: false,
            skip_scan: false,
            interactive: false,
        }
    }
}

pub struct UpdateOutcome {
    pub module: Module,
    pub previous_version: String,
    pub updated: bool,
}

/// Fetches the remote for the module installed at `module_dir`, fast-forwards
/// to the new HEAD, and rescans before the working tree is actually moved to
/// the new state. Any critical finding or hook detection restores the
/// pre-fetch ref (spec §4.11's `Rolled_Back` edge applies symmetrically here).
pub fn update(
    module_dir: &Path,
    options: &UpdateOptions,
    current_platform: &CurrentPlatform,
    session: Option<&Session>,
    audit: &mut AuditLog,
) -> Result<UpdateOutcome, InstallError> {
    let previous = parse_manifest(&module_dir.join("module.toml"))
        .map_err(|_| InstallError::NoManifest)?;
    let previous_version = previous.version.clone();

    let result = run_update(module_dir, options, current_platform, &previous);

    match &result {
        Ok(outcome) => {
            audit.append(
                &AuditEvent::new(session, EventCategory::Operation, "update", EventOutcome::Success)
                    .with_detail("module", outcome.module.name.clone())
                    .with_detail("from_version", previous_version.clone())
                    .with_detail("to_version", outcome.module.version.clone()),
            )?;
        }
        Err(e) => {
            audit.append(
                &AuditEvent::new(session, EventCategory::Operation, "update", EventOutcome::Failure)
                    .with_detail("module", previous.name.clone())
                    .with_detail("error", e.to_string()),
            )?;
        }
    }

    result
}

fn run_update(
    module_dir: &Path,
    options: &UpdateOptions,
    current_platform: &CurrentPlatform,
    previous: &Module,
) -> Result<UpdateOutcome, InstallError> {
    let repo = git2::Repository::open(module_dir)?;
    let pre_fetch_oid = repo.head()?.peel_to_commit()?.id();

    fetch_default_remote(&repo)?;

    let fetch_head = repo.find_reference("FETCH_HEAD")?;
    let new_commit = fetch_head.peel_to_commit()?;

    if new_commit.id() == pre_fetch_oid {
        return Ok(UpdateOutcome {
            module: previous.clone(),
            previous_version: previous.version.clone(),
            updated: false,
        });
    }

    let new_tree = new_commit.tree()?;
    let mut checkout = git2::build::CheckoutBuilder::new();
    checkout.force();
    repo.checkout_tree(new_tree.as_object(), Some(&mut checkout))?;
    repo.set_head_detached(new_commit.id())?;

    let rollback = |repo: &git2::Repository| -> Result<(), InstallError> {
        let old_commit = repo.find_commit(pre_fetch_oid)?;
        let old_tree = old_commit.tree()?;
        let mut checkout = git2::build::CheckoutBuilder::new();
        checkout.force();
        repo.checkout_tree(old_tree.as_object(), Some(&mut checkout))?;
        repo.set_head_detached(pre_fetch_oid)?;
        Ok(())
    };

    if !options.skip_scan {
        let scanner = Scanner::new().map_err(|e| InstallError::InvalidManifest(e.to_string()))?;
        let scan_result = scanner.scan_module_root(module_dir);

        if !scan_result.git_hooks.is_empty() && !options.unsafe_mode {
            rollback(&repo)?;
            return Err(InstallError::HookDetected(
                scan_result.git_hooks[0].display().to_string(),
            ));
        }

        if scan_result.gated_critical_count() > 0 {
            rollback(&repo)?;
            return Err(InstallError::ScanCritical {
                critical: scan_result.critical_count,
            });
        }

        if scan_result.warning_count > 0 && !options.interactive {
            rollback(&repo)?;
            return Err(InstallError::WarningsNotConfirmed);
        }
    }

    let manifest_path = module_dir.join("module.toml");
    let module = match parse_manifest(&manifest_path) {
        Ok(m) => m,
        Err(_) => {
            rollback(&repo)?;
            return Err(InstallError::NoManifest);
        }
    };

    if module.name != previous.name {
        rollback(&repo)?;
        return Err(InstallError::NameMismatch {
            expected: previous.name.clone(),
            found: module.name,
        });
    }

    if let Some(reason) = incompatibility_reason(&module, current_platform) {
        rollback(&repo)?;
        return Err(InstallError::PlatformIncompatible(reason));
    }

    let missing_files: Vec<String> = module
        .files
        .iter()
        .filter(|f| !module_dir.join(f).exists())
        .cloned()
        .collect();
    if !missing_files.is_empty() {
        rollback(&repo)?;
        return Err(InstallError::MissingFiles(missing_files));
    }

    Ok(UpdateOutcome {
        module,
        previous_version: previous.version.clone(),
        updated: true,
    })
}

fn fetch_default_remote(repo: &git2::Repository) -> Result<(), git2::Error> {
    let mut remote = repo.find_remote("origin")?;
    remote.fetch(&[] as &[&str], None, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn platform() -> CurrentPlatform {
        CurrentPlatform {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            shell: "zsh".to_string(),
            shell_version: "5.9".to_string(),
        }
    }

    #[test]
    fn non_git_module_dir_reports_install_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("module.toml"),
            "[module]\nname = \"x\"\nversion = \"1.0.0\"\n",
        )
        .unwrap();
        let home = tempfile::tempdir().unwrap();
        let mut audit = AuditLog::init(home.path());

        let result = update(dir.path(), &UpdateOptions::default(), &platform(), None, &mut audit);
        assert!(result.is_err());
    }

    #[test]
    fn missing_manifest_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();
        let mut audit = AuditLog::init(home.path());

        let result = update(dir.path(), &UpdateOptions::default(), &platform(), None, &mut audit);
        assert!(matches!(result, Err(InstallError::NoManifest)));
    }
}
