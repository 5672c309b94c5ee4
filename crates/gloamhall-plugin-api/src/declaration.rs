//! Plugin declaration export.
//!
//! Every plugin binary exports one [`PluginDeclaration`] under
//! [`PLUGIN_DECLARATION_SYMBOL`]. The runtime reads it after loading the
//! binary and verifies, by string comparison only, that the plugin was built
//! against a compatible contract before calling the factory. Two load
//! boundaries can disagree about type identity, so `abi_version`,
//! `api_version`, `contract` and `type_name` are the entire handshake.

use crate::plugin::Plugin;

/// Bumped whenever the shape of [`PluginDeclaration`] or the [`Plugin`]
/// trait changes incompatibly.
pub const PLUGIN_ABI_VERSION: u32 = 1;

/// Fully-qualified name of the plugin contract trait.
pub const PLUGIN_CONTRACT: &str = "gloamhall_plugin_api::plugin::Plugin";

/// Version of this crate, recorded in each declaration.
pub const API_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Symbol name under which plugin binaries export their declaration.
pub const PLUGIN_DECLARATION_SYMBOL: &[u8] = b"GLOAMHALL_PLUGIN_DECLARATION";

/// Static descriptor exported by a plugin binary.
#[derive(Debug, Clone, Copy)]
pub struct PluginDeclaration {
    /// Must equal [`PLUGIN_ABI_VERSION`].
    pub abi_version: u32,
    /// `gloamhall-plugin-api` version the plugin was compiled against.
    pub api_version: &'static str,
    /// Must equal [`PLUGIN_CONTRACT`].
    pub contract: &'static str,
    /// Fully-qualified name of the exported plugin type, matched against the
    /// manifest's entry-point locator.
    pub type_name: &'static str,
    /// Factory for the plugin instance.
    pub create: fn() -> Box<dyn Plugin>,
}

/// Exports a [`PluginDeclaration`] for a plugin type.
///
/// `$type_name` is the fully-qualified name the manifest refers to, and
/// `$ctor` is a zero-argument constructor expression.
///
/// ```ignore
/// gloamhall_plugin_api::declare_plugin!("plugin_dummy::DummyPlugin", DummyPlugin::new);
/// ```
#[macro_export]
macro_rules! declare_plugin {
    ($type_name:expr, $ctor:expr) => {
        #[doc(hidden)]
        pub fn __gloamhall_plugin_create() -> ::std::boxed::Box<dyn $crate::plugin::Plugin> {
            ::std::boxed::Box::new($ctor())
        }

        #[no_mangle]
        pub static GLOAMHALL_PLUGIN_DECLARATION: $crate::declaration::PluginDeclaration =
            $crate::declaration::PluginDeclaration {
                abi_version: $crate::declaration::PLUGIN_ABI_VERSION,
                api_version: $crate::declaration::API_VERSION,
                contract: $crate::declaration::PLUGIN_CONTRACT,
                type_name: $type_name,
                create: __gloamhall_plugin_create,
            };
    };
}

impl PluginDeclaration {
    /// Whether this declaration is loadable by the current host.
    pub fn is_compatible(&self) -> bool {
        self.abi_version == PLUGIN_ABI_VERSION && self.contract == PLUGIN_CONTRACT
    }
}
