//! Recursive module discovery rooted at the modules directory (spec §4.4).

use std::path::Path;

use crate::cache::ModuleCache;
use crate::manifest::Module;

/// Default maximum recursion depth.
pub const MAX_DEPTH: usize = 10;

/// Walks `root` up to `max_depth`, parsing every `module.toml` found (via
/// `cache`) into a [`Module`]. Malformed manifests are logged and skipped —
/// discovery never fails the whole scan. Output is sorted by absolute path
/// for determinism across invocations (spec §5).
pub fn discover(root: &Path, cache: &mut ModuleCache) -> Vec<Module> {
    discover_with_depth(root, MAX_DEPTH, cache)
}

pub fn discover_with_depth(root: &Path, max_depth: usize, cache: &mut ModuleCache) -> Vec<Module> {
    let mut manifest_paths: Vec<std::path::PathBuf> = ignore::WalkBuilder::new(root)
        .max_depth(Some(max_depth))
        .hidden(false)
        .build()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|entry| entry.into_path())
        .filter(|path| path.file_name().map(|n| n == "module.toml").unwrap_or(false))
        .collect();
    manifest_paths.sort();

    let mut modules = Vec::with_capacity(manifest_paths.len());
    for path in manifest_paths {
        match cache.get_or_parse(&path) {
            Ok(module) => modules.push(module),
            Err(e) => {
                tracing::warn!(manifest = %path.display(), error = %e, "skipping malformed manifest");
            }
        }
    }
    modules
}
