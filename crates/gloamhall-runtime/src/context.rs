//! Per-plugin load contexts.
//!
//! A [`LoadContext`] owns every native library loaded for one plugin and is
//! the plugin's module-resolution boundary: binaries resolve from the
//! plugin's own directory first, then from the host's install directories.
//! The shared contract types never load through a context: they live in the
//! host binary, which is what lets the two sides agree on interfaces at all.
//! Cross-boundary checks are still done by fully-qualified name, because two
//! boundaries can disagree about runtime type identity.
//!
//! Closing a context drops its library handles. The operating system only
//! unmaps a library once every handle to it is gone, so reclamation is
//! deferred, never assumed immediate.

use crate::error::{RuntimeError, RuntimeResult};
use gloamhall_plugin_api::declaration::{PluginDeclaration, PLUGIN_DECLARATION_SYMBOL};
use libloading::Library;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Isolated module-resolution boundary for one plugin directory.
pub struct LoadContext {
    plugin_id: String,
    plugin_dir: PathBuf,
    host_dirs: Vec<PathBuf>,
    libraries: Vec<Library>,
    closed: bool,
}

impl LoadContext {
    /// Open a context scoped to a plugin directory.
    ///
    /// `host_dirs` are the fallback locations (the application's install
    /// directory) searched when a binary is not found locally.
    pub fn open(
        plugin_id: impl Into<String>,
        plugin_dir: impl Into<PathBuf>,
        host_dirs: Vec<PathBuf>,
    ) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            plugin_dir: plugin_dir.into(),
            host_dirs,
            libraries: Vec::new(),
            closed: false,
        }
    }

    /// A context with no library-loading ability, for plugins compiled into
    /// the host.
    pub fn builtin(plugin_id: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            plugin_dir: PathBuf::new(),
            host_dirs: Vec::new(),
            libraries: Vec::new(),
            closed: false,
        }
    }

    /// The plugin directory this context is scoped to.
    pub fn plugin_dir(&self) -> &Path {
        &self.plugin_dir
    }

    /// Whether the context has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Resolve a binary file name: plugin directory first, host fallback.
    pub fn resolve_binary(&self, file_name: &str) -> RuntimeResult<PathBuf> {
        if self.closed {
            return Err(RuntimeError::ContextClosed(self.plugin_id.clone()));
        }

        let local = self.plugin_dir.join(file_name);
        if local.is_file() {
            return Ok(local);
        }
        for host_dir in &self.host_dirs {
            let candidate = host_dir.join(file_name);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }

        Err(RuntimeError::BinaryNotFound {
            plugin: self.plugin_id.clone(),
            binary: file_name.to_string(),
        })
    }

    /// Load a binary into this context and read its plugin declaration.
    ///
    /// The declaration is copied out of the library; the library handle
    /// stays owned by the context so the declaration's statics remain valid
    /// until [`close`](Self::close).
    pub fn load_declaration(&mut self, file_name: &str) -> RuntimeResult<PluginDeclaration> {
        let path = self.resolve_binary(file_name)?;
        debug!(plugin = %self.plugin_id, path = %path.display(), "loading plugin binary");

        // SAFETY: loading a library runs its initializers; the plugin
        // contract is the trust boundary here, same as any native plugin host.
        let library = unsafe { Library::new(&path) }?;

        // SAFETY: the symbol is a static PluginDeclaration exported by
        // declare_plugin!; reading it copies plain fields and 'static refs
        // that live as long as the library, which this context owns.
        let declaration = unsafe {
            library
                .get::<*const PluginDeclaration>(PLUGIN_DECLARATION_SYMBOL)
                .map_err(|e| RuntimeError::ContractNotImplemented {
                    plugin: self.plugin_id.clone(),
                    reason: format!("missing plugin declaration symbol: {e}"),
                })?
                .read()
        };

        self.libraries.push(library);
        Ok(declaration)
    }

    /// Close the context, dropping every library handle.
    ///
    /// After this, all resolution requests fail. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let count = self.libraries.len();
        // Dropping a Library requests unloading; the OS defers actual
        // unmapping until all outstanding handles are released.
        self.libraries.clear();
        if count > 0 {
            debug!(plugin = %self.plugin_id, libraries = count, "closed load context");
        }
    }
}

impl Drop for LoadContext {
    fn drop(&mut self) {
        if !self.closed && !self.libraries.is_empty() {
            warn!(plugin = %self.plugin_id, "load context dropped without explicit close");
        }
    }
}
