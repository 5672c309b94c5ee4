//! Integration tests for the gloamhall plugin runtime.
//!
//! These tests cover:
//! - Plugin discovery from directories
//! - Dependency-order resolution across a discovery pass
//! - The full loader lifecycle (initialize/start/stop, rollback, duplicate
//!   handling, unload) driven through built-in plugins

use async_trait::async_trait;
use gloamhall_plugin_api::{HostConfig, Plugin, PluginContext};
use gloamhall_runtime::{
    discover_plugins, resolve_load_order, PluginLoader, PluginManifest, RuntimeError,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

// ==============================================================================
// Test Fixture Helpers
// ==============================================================================

/// Create a test plugin directory with a manifest.toml file.
fn create_test_plugin(dir: &Path, id: &str, config: ManifestConfig) -> PathBuf {
    let plugin_dir = dir.join(id);
    std::fs::create_dir_all(&plugin_dir).unwrap();
    std::fs::write(plugin_dir.join("manifest.toml"), manifest_toml(id, &config)).unwrap();
    plugin_dir
}

fn manifest_toml(id: &str, config: &ManifestConfig) -> String {
    let mut manifest = String::new();

    if !config.capabilities.is_empty() {
        manifest.push_str("capabilities = [");
        for (i, cap) in config.capabilities.iter().enumerate() {
            if i > 0 {
                manifest.push_str(", ");
            }
            manifest.push_str(&format!("\"{cap}\""));
        }
        manifest.push_str("]\n\n");
    }

    manifest.push_str(&format!("[plugin]\nid = \"{id}\"\n"));
    if let Some(version) = config.version {
        manifest.push_str(&format!("version = \"{version}\"\n"));
    }

    let profile = config.profile.unwrap_or("default");
    manifest.push_str(&format!(
        "\n[entry_point]\n{profile} = \"lib{id}.so,{id}::Plugin\"\n"
    ));

    for (dep, optional) in &config.dependencies {
        manifest.push_str(&format!(
            "\n[[dependencies]]\nid = \"{dep}\"\noptional = {optional}\n"
        ));
    }

    manifest
}

/// Configuration for creating a test plugin manifest.
#[derive(Default)]
struct ManifestConfig<'a> {
    version: Option<&'a str>,
    profile: Option<&'a str>,
    capabilities: Vec<&'a str>,
    dependencies: Vec<(&'a str, bool)>,
}

fn parsed_manifest(id: &str, config: ManifestConfig) -> PluginManifest {
    PluginManifest::from_str(&manifest_toml(id, &config)).unwrap()
}

/// What a probe plugin records about its lifecycle, shared with the test.
#[derive(Default)]
struct ProbeLog {
    events: Mutex<Vec<String>>,
}

impl ProbeLog {
    fn push(&self, event: &str) {
        self.events.lock().unwrap().push(event.to_string());
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

/// Built-in test plugin that records lifecycle calls and can be told to
/// fail a given phase.
struct ProbePlugin {
    id: &'static str,
    log: Arc<ProbeLog>,
    fail_initialize: bool,
    fail_start: bool,
}

impl ProbePlugin {
    fn new(id: &'static str, log: Arc<ProbeLog>) -> Self {
        Self {
            id,
            log,
            fail_initialize: false,
            fail_start: false,
        }
    }
}

#[async_trait]
impl Plugin for ProbePlugin {
    async fn initialize(
        &mut self,
        context: PluginContext,
        _cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        assert_eq!(context.plugin_id(), self.id);
        self.log.push(&format!("{}:initialize", self.id));
        if self.fail_initialize {
            anyhow::bail!("initialize failed on purpose");
        }
        Ok(())
    }

    async fn start(&mut self, _cancel: CancellationToken) -> anyhow::Result<()> {
        self.log.push(&format!("{}:start", self.id));
        if self.fail_start {
            anyhow::bail!("start failed on purpose");
        }
        Ok(())
    }

    async fn stop(&mut self, _cancel: CancellationToken) -> anyhow::Result<()> {
        self.log.push(&format!("{}:stop", self.id));
        Ok(())
    }
}

fn test_loader(config: HostConfig) -> Arc<PluginLoader> {
    PluginLoader::with_install_root(
        Arc::new(config),
        Arc::new(gloamhall_plugin_api::ServiceRegistry::new()),
        Arc::new(gloamhall_plugin_api::EventBus::new()),
        PathBuf::from("/nonexistent/install"),
    )
}

// ==============================================================================
// Discovery Tests
// ==============================================================================

#[test]
fn test_discovery_skips_malformed_descriptor() {
    let root = TempDir::new().unwrap();
    create_test_plugin(root.path(), "map-gen", ManifestConfig::default());
    create_test_plugin(root.path(), "combat-tweaks", ManifestConfig::default());

    let broken_dir = root.path().join("broken");
    std::fs::create_dir_all(&broken_dir).unwrap();
    std::fs::write(broken_dir.join("manifest.toml"), "{{{ not toml").unwrap();

    let discovered = discover_plugins(&[root.path().to_path_buf()], "default").unwrap();

    // Two valid plugins and one skip.
    assert_eq!(discovered.len(), 2);
    let ids: Vec<&str> = discovered.iter().map(|p| p.id()).collect();
    assert!(ids.contains(&"map-gen"));
    assert!(ids.contains(&"combat-tweaks"));
}

#[test]
fn test_discovery_filters_by_profile() {
    let root = TempDir::new().unwrap();
    create_test_plugin(root.path(), "everywhere", ManifestConfig::default());
    create_test_plugin(
        root.path(),
        "release-only",
        ManifestConfig {
            profile: Some("release"),
            ..Default::default()
        },
    );

    let discovered = discover_plugins(&[root.path().to_path_buf()], "default").unwrap();
    assert_eq!(discovered.len(), 1);
    assert_eq!(discovered[0].id(), "everywhere");

    let discovered = discover_plugins(&[root.path().to_path_buf()], "release").unwrap();
    assert_eq!(discovered.len(), 1);
    assert_eq!(discovered[0].id(), "release-only");
}

// ==============================================================================
// Resolution Tests
// ==============================================================================

#[test]
fn test_resolution_of_discovered_chain() {
    // Input order [C, B, A]; C depends on B depends on A.
    let manifests = vec![
        parsed_manifest(
            "c",
            ManifestConfig {
                dependencies: vec![("b", false)],
                ..Default::default()
            },
        ),
        parsed_manifest(
            "b",
            ManifestConfig {
                dependencies: vec![("a", false)],
                ..Default::default()
            },
        ),
        parsed_manifest("a", ManifestConfig::default()),
    ];

    let order = resolve_load_order(manifests).unwrap();
    let ids: Vec<&str> = order.iter().map(|m| m.id()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[test]
fn test_resolution_failure_aborts_pass() {
    let manifests = vec![parsed_manifest(
        "orphan",
        ManifestConfig {
            dependencies: vec![("never-written", false)],
            ..Default::default()
        },
    )];

    let err = resolve_load_order(manifests).unwrap_err();
    match err {
        RuntimeError::MissingDependency { plugin, dependency } => {
            assert_eq!(plugin, "orphan");
            assert_eq!(dependency, "never-written");
        }
        other => panic!("unexpected error: {other}"),
    }
}

// ==============================================================================
// Loader Lifecycle Tests
// ==============================================================================

#[tokio::test]
async fn test_builtin_plugin_full_lifecycle() {
    let loader = test_loader(HostConfig::default());
    let log = Arc::new(ProbeLog::default());
    let cancel = CancellationToken::new();

    let id = loader
        .load_builtin(
            parsed_manifest("probe", ManifestConfig::default()),
            Box::new(ProbePlugin::new("probe", log.clone())),
            &cancel,
        )
        .await
        .unwrap();

    assert_eq!(id, "probe");
    assert!(loader.is_loaded("probe"));
    assert_eq!(loader.plugin_count(), 1);
    assert_eq!(log.events(), vec!["probe:initialize", "probe:start"]);

    loader.unload("probe").await.unwrap();
    assert!(!loader.is_loaded("probe"));
    assert_eq!(
        log.events(),
        vec!["probe:initialize", "probe:start", "probe:stop"]
    );
}

#[tokio::test]
async fn test_failed_start_rolls_back_with_stop() {
    let loader = test_loader(HostConfig::default());
    let log = Arc::new(ProbeLog::default());
    let cancel = CancellationToken::new();

    let mut plugin = ProbePlugin::new("flaky", log.clone());
    plugin.fail_start = true;

    let err = loader
        .load_builtin(
            parsed_manifest("flaky", ManifestConfig::default()),
            Box::new(plugin),
            &cancel,
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RuntimeError::LifecycleFailed { phase: "start", .. }
    ));
    assert!(!loader.is_loaded("flaky"));
    // Rollback still ran the best-effort stop.
    assert_eq!(
        log.events(),
        vec!["flaky:initialize", "flaky:start", "flaky:stop"]
    );
}

#[tokio::test]
async fn test_failed_initialize_rolls_back() {
    let loader = test_loader(HostConfig::default());
    let log = Arc::new(ProbeLog::default());
    let cancel = CancellationToken::new();

    let mut plugin = ProbePlugin::new("early-exit", log.clone());
    plugin.fail_initialize = true;

    let err = loader
        .load_builtin(
            parsed_manifest("early-exit", ManifestConfig::default()),
            Box::new(plugin),
            &cancel,
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RuntimeError::LifecycleFailed {
            phase: "initialize",
            ..
        }
    ));
    assert!(!loader.is_loaded("early-exit"));
}

#[tokio::test]
async fn test_duplicate_id_keeps_first_instance() {
    let loader = test_loader(HostConfig::default());
    let first_log = Arc::new(ProbeLog::default());
    let second_log = Arc::new(ProbeLog::default());
    let cancel = CancellationToken::new();

    loader
        .load_builtin(
            parsed_manifest("twin", ManifestConfig::default()),
            Box::new(ProbePlugin::new("twin", first_log.clone())),
            &cancel,
        )
        .await
        .unwrap();

    let err = loader
        .load_builtin(
            parsed_manifest("twin", ManifestConfig::default()),
            Box::new(ProbePlugin::new("twin", second_log.clone())),
            &cancel,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, RuntimeError::DuplicatePluginId(_)));
    assert!(loader.is_loaded("twin"));
    assert_eq!(loader.plugin_count(), 1);

    // The newer instance was stopped and discarded; the first never stopped.
    assert_eq!(first_log.events(), vec!["twin:initialize", "twin:start"]);
    assert_eq!(
        second_log.events(),
        vec!["twin:initialize", "twin:start", "twin:stop"]
    );
}

#[tokio::test]
async fn test_unload_unknown_plugin() {
    let loader = test_loader(HostConfig::default());
    let err = loader.unload("ghost").await.unwrap_err();
    assert!(matches!(err, RuntimeError::PluginNotFound(_)));
}

#[tokio::test]
async fn test_reload_requires_hot_reload() {
    let loader = test_loader(HostConfig::default());
    let err = loader
        .reload("anything", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::HotReloadDisabled));
}

#[tokio::test]
async fn test_reload_unknown_plugin() {
    let config = HostConfig {
        hot_reload: true,
        ..Default::default()
    };
    let loader = test_loader(config);
    let err = loader
        .reload("ghost", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::PluginNotFound(_)));
}

#[tokio::test]
async fn test_list_plugins_and_capability_query() {
    let loader = test_loader(HostConfig::default());
    let log = Arc::new(ProbeLog::default());
    let cancel = CancellationToken::new();

    loader
        .load_builtin(
            parsed_manifest(
                "renderer-a",
                ManifestConfig {
                    version: Some("2.0.0"),
                    capabilities: vec!["renderer"],
                    ..Default::default()
                },
            ),
            Box::new(ProbePlugin::new("renderer-a", log.clone())),
            &cancel,
        )
        .await
        .unwrap();
    loader
        .load_builtin(
            parsed_manifest(
                "audio-b",
                ManifestConfig {
                    capabilities: vec!["audio"],
                    ..Default::default()
                },
            ),
            Box::new(ProbePlugin::new("audio-b", log.clone())),
            &cancel,
        )
        .await
        .unwrap();

    let listed = loader.list_plugins();
    assert_eq!(listed.len(), 2);
    let renderer = listed.iter().find(|p| p.id == "renderer-a").unwrap();
    assert_eq!(renderer.version, "2.0.0");
    assert_eq!(renderer.capabilities, vec!["renderer"]);

    assert_eq!(loader.plugins_with_capability("renderer"), vec!["renderer-a"]);
    assert!(loader.plugins_with_capability("network").is_empty());
}

// ==============================================================================
// Disk Loading Tests (error paths, no compiled plugin binaries needed)
// ==============================================================================

#[tokio::test]
async fn test_load_all_with_missing_binaries_skips_every_plugin() {
    // Valid manifests whose entry binaries do not exist: each one fails
    // individually with BinaryNotFound and the pass continues.
    let root = TempDir::new().unwrap();
    create_test_plugin(root.path(), "alpha", ManifestConfig::default());
    create_test_plugin(root.path(), "beta", ManifestConfig::default());

    let config = HostConfig {
        plugin_paths: vec![root.path().to_string_lossy().into_owned()],
        ..Default::default()
    };
    let loader = test_loader(config);

    let loaded = loader.load_all(&CancellationToken::new()).await.unwrap();
    assert_eq!(loaded, 0);
    assert_eq!(loader.plugin_count(), 0);
}

#[tokio::test]
async fn test_load_all_aborts_on_missing_required_dependency() {
    let root = TempDir::new().unwrap();
    create_test_plugin(
        root.path(),
        "needy",
        ManifestConfig {
            dependencies: vec![("absent", false)],
            ..Default::default()
        },
    );

    let config = HostConfig {
        plugin_paths: vec![root.path().to_string_lossy().into_owned()],
        ..Default::default()
    };
    let loader = test_loader(config);

    let err = loader.load_all(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, RuntimeError::MissingDependency { .. }));
}

#[tokio::test]
async fn test_load_all_tolerates_optional_absent_dependency() {
    let root = TempDir::new().unwrap();
    create_test_plugin(
        root.path(),
        "flexible",
        ManifestConfig {
            dependencies: vec![("absent", true)],
            ..Default::default()
        },
    );

    let config = HostConfig {
        plugin_paths: vec![root.path().to_string_lossy().into_owned()],
        ..Default::default()
    };
    let loader = test_loader(config);

    // Resolution succeeds; the plugin itself still fails on its missing
    // binary, which is a per-plugin skip, not a pass failure.
    let loaded = loader.load_all(&CancellationToken::new()).await.unwrap();
    assert_eq!(loaded, 0);
}

#[tokio::test]
async fn test_load_all_respects_cancellation() {
    let root = TempDir::new().unwrap();
    create_test_plugin(root.path(), "unreached", ManifestConfig::default());

    let config = HostConfig {
        plugin_paths: vec![root.path().to_string_lossy().into_owned()],
        ..Default::default()
    };
    let loader = test_loader(config);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let loaded = loader.load_all(&cancel).await.unwrap();
    assert_eq!(loaded, 0);
}

// ==============================================================================
// Concurrency Tests
// ==============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_builtin_loads_with_same_id() {
    // Many racing loads of the same id: exactly one wins, the rest are
    // rejected as duplicates and rolled back.
    let loader = test_loader(HostConfig::default());
    let log = Arc::new(ProbeLog::default());
    let successes = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let loader = Arc::clone(&loader);
        let log = Arc::clone(&log);
        let successes = Arc::clone(&successes);
        tasks.push(tokio::spawn(async move {
            let result = loader
                .load_builtin(
                    parsed_manifest("contested", ManifestConfig::default()),
                    Box::new(ProbePlugin::new("contested", log)),
                    &CancellationToken::new(),
                )
                .await;
            if result.is_ok() {
                successes.fetch_add(1, Ordering::SeqCst);
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(successes.load(Ordering::SeqCst), 1);
    assert_eq!(loader.plugin_count(), 1);
}
