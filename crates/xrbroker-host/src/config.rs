use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use xrbroker_core::{
    BrokerDeployment, BrokerResolver, LocalRuntimes, NoChoiceChooser, PreferenceStore,
    RuntimeChooser, RuntimeEnumerator, RuntimeSource, ServiceRegistry, SystemDelegateChooser,
    UserSelectedChooser,
};

use crate::error::HostError;
use crate::manifest::ManifestDirRegistry;
use crate::preferences::FilePreferenceStore;
use crate::repository::RuntimeRepository;

pub const CONFIG_FILE_NAME: &str = "xrbroker.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct XrBrokerConfig {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub preferences: PreferencesConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_runtime_chooser")]
    pub runtime_chooser: RuntimeChooserKind,
    #[serde(default = "default_system_chooser")]
    pub system_chooser: SystemChooserKind,
    /// Fold the system broker's runtime into the application broker's candidates.
    #[serde(default = "default_include_system_runtime")]
    pub include_system_runtime: bool,
    #[serde(default = "default_abi")]
    pub default_abi: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            runtime_chooser: default_runtime_chooser(),
            system_chooser: default_system_chooser(),
            include_system_runtime: default_include_system_runtime(),
            default_abi: default_abi(),
        }
    }
}

fn default_runtime_chooser() -> RuntimeChooserKind {
    RuntimeChooserKind::UserSelected
}
fn default_system_chooser() -> SystemChooserKind {
    SystemChooserKind::Undefined
}
fn default_include_system_runtime() -> bool {
    true
}

/// ABI name of the running architecture, in the naming runtimes advertise.
fn default_abi() -> String {
    match std::env::consts::ARCH {
        "aarch64" => "arm64-v8a",
        "arm" => "armeabi-v7a",
        "x86" => "x86",
        "x86_64" => "x86_64",
        other => other,
    }
    .into()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum RuntimeChooserKind {
    #[serde(rename = "no-choice")]
    NoChoice,
    #[serde(rename = "user-selected")]
    UserSelected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum SystemChooserKind {
    #[serde(rename = "undefined")]
    Undefined,
    #[serde(rename = "no-choice")]
    NoChoice,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_runtime_manifest_dirs")]
    pub runtime_manifest_dirs: Vec<PathBuf>,
    #[serde(default = "default_system_manifest_dirs")]
    pub system_manifest_dirs: Vec<PathBuf>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            runtime_manifest_dirs: default_runtime_manifest_dirs(),
            system_manifest_dirs: default_system_manifest_dirs(),
        }
    }
}

fn default_runtime_manifest_dirs() -> Vec<PathBuf> {
    dirs::data_dir()
        .map(|d| vec![d.join("xrbroker").join("runtimes")])
        .unwrap_or_default()
}
fn default_system_manifest_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("/etc/xrbroker/system-runtimes")]
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreferencesConfig {
    #[serde(default = "default_preferences_path")]
    pub path: PathBuf,
}

impl Default for PreferencesConfig {
    fn default() -> Self {
        Self {
            path: default_preferences_path(),
        }
    }
}

fn default_preferences_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("xrbroker")
        .join("preferences.json")
}

impl XrBrokerConfig {
    /// Load a config file. Relative paths inside it are taken relative to
    /// the file's directory.
    pub fn from_file(path: &Path) -> Result<Self, HostError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content).map_err(|e| {
            HostError::ConfigError(format!("Failed to parse {}: {e}", path.display()))
        })?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        Ok(config)
    }

    /// Candidate config locations, in lookup order.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("xrbroker").join(CONFIG_FILE_NAME));
        }
        paths
    }

    /// Load `explicit` if given, else the first existing search path, else
    /// built-in defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, HostError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match Self::search_paths().into_iter().find(|p| p.is_file()) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "Loading broker config");
                Self::from_file(&path)
            }
            None => {
                tracing::debug!("No broker config found, using defaults");
                Ok(Self::default())
            }
        }
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        self.registry
            .runtime_manifest_dirs
            .iter_mut()
            .for_each(resolve);
        self.registry
            .system_manifest_dirs
            .iter_mut()
            .for_each(resolve);
        resolve(&mut self.preferences.path);
    }

    pub fn runtime_registry(&self) -> Arc<dyn ServiceRegistry> {
        Arc::new(ManifestDirRegistry::new(
            self.registry.runtime_manifest_dirs.clone(),
        ))
    }

    pub fn system_registry(&self) -> Arc<dyn ServiceRegistry> {
        Arc::new(ManifestDirRegistry::new(
            self.registry.system_manifest_dirs.clone(),
        ))
    }

    pub fn preference_store(&self) -> Arc<dyn PreferenceStore> {
        Arc::new(FilePreferenceStore::new(self.preferences.path.clone()))
    }

    pub fn build_repository(&self) -> RuntimeRepository {
        RuntimeRepository::new(self.runtime_registry(), self.preference_store())
    }

    /// Candidates the application broker's chooser picks from: local
    /// manifests, plus the system broker's runtime when
    /// `include_system_runtime` is set.
    pub fn runtime_source(&self, resolver: &BrokerResolver) -> Arc<dyn RuntimeSource> {
        if self.broker.include_system_runtime {
            Arc::new(RuntimeEnumerator::new(
                self.runtime_registry(),
                resolver.clone(),
            ))
        } else {
            Arc::new(LocalRuntimes::new(self.runtime_registry()))
        }
    }

    /// Wire both brokers as configured. Fails if the choosers would delegate
    /// in a cycle.
    pub fn build_deployment(&self) -> Result<BrokerDeployment, HostError> {
        let system_chooser: Arc<dyn RuntimeChooser> = match self.broker.system_chooser {
            SystemChooserKind::Undefined => Arc::new(SystemDelegateChooser::undefined()),
            SystemChooserKind::NoChoice => Arc::new(NoChoiceChooser::new(Arc::new(
                LocalRuntimes::new(self.system_registry()),
            ))),
        };

        let preferences = self.preference_store();
        let deployment = BrokerDeployment::assemble(system_chooser, |resolver| {
            let source = self.runtime_source(resolver);
            let chooser: Arc<dyn RuntimeChooser> = match self.broker.runtime_chooser {
                RuntimeChooserKind::NoChoice => Arc::new(NoChoiceChooser::new(source)),
                RuntimeChooserKind::UserSelected => {
                    Arc::new(UserSelectedChooser::new(source, preferences))
                }
            };
            chooser
        })?;

        tracing::info!(
            runtime_chooser = ?self.broker.runtime_chooser,
            system_chooser = ?self.broker.system_chooser,
            preferences = %self.preferences.path.display(),
            "Broker deployment built from config"
        );
        Ok(deployment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_empty_config_with_defaults() {
        let config: XrBrokerConfig = toml::from_str("").unwrap();
        assert_eq!(config.broker.runtime_chooser, RuntimeChooserKind::UserSelected);
        assert_eq!(config.broker.system_chooser, SystemChooserKind::Undefined);
        assert!(config.broker.include_system_runtime);
        assert_eq!(
            config.registry.system_manifest_dirs,
            [PathBuf::from("/etc/xrbroker/system-runtimes")]
        );
        assert!(config.preferences.path.ends_with("preferences.json"));
    }

    #[test]
    fn parses_full_config() {
        let toml_str = r#"
[broker]
runtime_chooser = "no-choice"
system_chooser = "no-choice"
include_system_runtime = false
default_abi = "arm64-v8a"

[registry]
runtime_manifest_dirs = ["/opt/xr/runtimes", "/usr/share/xr/runtimes"]
system_manifest_dirs = ["/opt/xr/system"]

[preferences]
path = "/var/lib/xrbroker/preferences.json"
"#;
        let config: XrBrokerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.broker.runtime_chooser, RuntimeChooserKind::NoChoice);
        assert_eq!(config.broker.system_chooser, SystemChooserKind::NoChoice);
        assert!(!config.broker.include_system_runtime);
        assert_eq!(config.broker.default_abi, "arm64-v8a");
        assert_eq!(config.registry.runtime_manifest_dirs.len(), 2);
        assert_eq!(
            config.preferences.path,
            PathBuf::from("/var/lib/xrbroker/preferences.json")
        );
    }

    #[test]
    fn rejects_unknown_chooser() {
        let result: Result<XrBrokerConfig, _> =
            toml::from_str("[broker]\nruntime_chooser = \"random\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            "[registry]\nruntime_manifest_dirs = [\"runtimes\"]\nsystem_manifest_dirs = [\"/abs\"]\n\n[preferences]\npath = \"prefs.json\"\n",
        )
        .unwrap();

        let config = XrBrokerConfig::from_file(&path).unwrap();
        assert_eq!(
            config.registry.runtime_manifest_dirs,
            [dir.path().join("runtimes")]
        );
        assert_eq!(config.registry.system_manifest_dirs, [PathBuf::from("/abs")]);
        assert_eq!(config.preferences.path, dir.path().join("prefs.json"));
    }

    #[test]
    fn malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[broker\n").unwrap();
        assert!(matches!(
            XrBrokerConfig::from_file(&path),
            Err(HostError::ConfigError(_))
        ));
    }

    #[test]
    fn missing_explicit_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = XrBrokerConfig::discover(Some(&dir.path().join("absent.toml")));
        assert!(matches!(result, Err(HostError::IoError(_))));
    }

    #[test]
    fn runtime_source_follows_include_system_runtime() {
        let mut config = XrBrokerConfig::default();
        let resolver = BrokerResolver::new();
        assert_eq!(
            config.runtime_source(&resolver).delegates_to(),
            Some(xrbroker_core::BrokerType::SystemRuntimeBroker)
        );

        config.broker.include_system_runtime = false;
        assert_eq!(config.runtime_source(&resolver).delegates_to(), None);
    }

    #[test]
    fn builds_deployment_from_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = XrBrokerConfig::default();
        config.registry.runtime_manifest_dirs = vec![dir.path().join("runtimes")];
        config.registry.system_manifest_dirs = vec![dir.path().join("system")];
        config.preferences.path = dir.path().join("prefs.json");

        let deployment = config.build_deployment().unwrap();
        assert_eq!(deployment.runtime_broker().chooser().name(), "user_selected");
    }
}
