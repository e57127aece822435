pub mod config;
pub mod error;
pub mod manifest;
pub mod preferences;
pub mod repository;

pub use config::{RuntimeChooserKind, SystemChooserKind, XrBrokerConfig};
pub use error::HostError;
pub use manifest::{ManifestDirRegistry, ServiceManifest};
pub use preferences::FilePreferenceStore;
pub use repository::RuntimeRepository;
