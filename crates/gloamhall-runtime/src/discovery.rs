//! Plugin discovery from configured search roots.
//!
//! Each search root contains one subdirectory per plugin; each plugin
//! directory contains a `manifest.toml` next to the plugin's binaries.
//! A broken descriptor skips that plugin with a warning; discovery never
//! fails the pass over a single bad directory.

use crate::error::RuntimeResult;
use crate::manifest::PluginManifest;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Name of the per-plugin descriptor file.
pub const MANIFEST_FILE: &str = "manifest.toml";

/// A plugin found during a discovery pass.
#[derive(Debug, Clone)]
pub struct DiscoveredPlugin {
    /// Path to the plugin directory.
    pub directory: PathBuf,

    /// Parsed manifest.
    pub manifest: PluginManifest,
}

impl DiscoveredPlugin {
    /// Get the plugin ID.
    pub fn id(&self) -> &str {
        self.manifest.id()
    }
}

/// Expand one configured search path.
///
/// `~` and `~/…` resolve against the user's home directory; relative paths
/// anchor to `install_root` (the application's install location), never the
/// process working directory.
pub fn expand_search_path(raw: &str, install_root: &Path) -> PathBuf {
    if raw == "~" {
        if let Some(home) = home_dir() {
            return home;
        }
    } else if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = home_dir() {
            return home.join(rest);
        }
    }

    let path = PathBuf::from(raw);
    if path.is_absolute() {
        path
    } else {
        install_root.join(path)
    }
}

fn home_dir() -> Option<PathBuf> {
    directories::UserDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
}

/// The per-user plugin directory, used when no search paths are configured.
pub fn default_plugin_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "gloamhall", "gloamhall")
        .map(|dirs| dirs.data_dir().join("plugins"))
}

/// Resolve the configured search paths against the install root.
pub fn resolve_search_paths(paths: &[String], install_root: &Path) -> Vec<PathBuf> {
    if paths.is_empty() {
        return default_plugin_dir().into_iter().collect();
    }
    paths
        .iter()
        .map(|raw| expand_search_path(raw, install_root))
        .collect()
}

/// Discover plugins across several roots.
///
/// Plugins are skipped (with a warning) when their descriptor is broken,
/// when they declare no entry point for `profile`, or when their id repeats
/// one already seen this pass (the first occurrence wins).
pub fn discover_plugins(roots: &[PathBuf], profile: &str) -> RuntimeResult<Vec<DiscoveredPlugin>> {
    let mut discovered = Vec::new();
    let mut seen_ids = HashSet::new();

    for root in roots {
        debug!(root = %root.display(), "scanning plugin root");
        discover_in_directory(root, profile, &mut discovered, &mut seen_ids)?;
    }

    info!("discovered {} plugins", discovered.len());
    Ok(discovered)
}

/// Discover plugins in a single root directory.
pub fn discover_in_directory(
    root: &Path,
    profile: &str,
    discovered: &mut Vec<DiscoveredPlugin>,
    seen_ids: &mut HashSet<String>,
) -> RuntimeResult<()> {
    if !root.exists() {
        return Ok(());
    }

    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(root = %root.display(), error = %e, "failed to read plugin root");
            return Ok(());
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let manifest_path = path.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            debug!(path = %path.display(), "skipping directory without manifest");
            continue;
        }

        let manifest = match PluginManifest::from_file(&manifest_path) {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!(path = %manifest_path.display(), error = %e, "skipping unreadable manifest");
                continue;
            }
        };

        if !manifest.has_entry_point(profile) {
            warn!(
                plugin = manifest.id(),
                profile, "skipping plugin without entry point for active profile"
            );
            continue;
        }

        if !seen_ids.insert(manifest.id().to_string()) {
            warn!(plugin = manifest.id(), "skipping duplicate plugin id");
            continue;
        }

        info!(
            plugin = manifest.id(),
            version = %manifest.plugin.version,
            path = %path.display(),
            "discovered plugin"
        );
        discovered.push(DiscoveredPlugin {
            directory: path,
            manifest,
        });
    }

    Ok(())
}

/// Discover a single plugin directory, without profile filtering.
pub fn discover_plugin(directory: &Path) -> RuntimeResult<DiscoveredPlugin> {
    let manifest = PluginManifest::from_file(&directory.join(MANIFEST_FILE))?;
    Ok(DiscoveredPlugin {
        directory: directory.to_path_buf(),
        manifest,
    })
}
