use std::sync::Arc;

use crate::chooser::RuntimeChooser;
use crate::contract::BrokerType;
use crate::discovery::RuntimeSource;
use crate::error::BrokerError;
use crate::preference::{PreferenceStore, SELECTED_RUNTIME_KEY};
use crate::runtime::RuntimeData;

/// Picks the runtime whose package the user selected.
///
/// The selection lives in a [`PreferenceStore`] under
/// [`SELECTED_RUNTIME_KEY`]. No selection, or a selection naming a package
/// that is not installed, means no active runtime.
pub struct UserSelectedChooser {
    source: Arc<dyn RuntimeSource>,
    preferences: Arc<dyn PreferenceStore>,
}

impl UserSelectedChooser {
    pub fn new(source: Arc<dyn RuntimeSource>, preferences: Arc<dyn PreferenceStore>) -> Self {
        Self {
            source,
            preferences,
        }
    }
}

/// The candidate owned by the selected package, if any.
pub fn choose_selected(candidates: Vec<RuntimeData>, selected: Option<&str>) -> Option<RuntimeData> {
    let selected = selected.filter(|s| !s.is_empty())?;
    candidates
        .into_iter()
        .find(|runtime| runtime.package_name == selected)
}

impl RuntimeChooser for UserSelectedChooser {
    fn name(&self) -> &str {
        "user_selected"
    }

    fn active_runtime<'a>(
        &'a self,
        major_version: u32,
        abi: &'a str,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Option<RuntimeData>, BrokerError>> + Send + 'a>,
    > {
        Box::pin(async move {
            let selected = self.preferences.get(SELECTED_RUNTIME_KEY).await?;
            let candidates = self.source.candidates(major_version, abi).await?;
            let chosen = choose_selected(candidates, selected.as_deref());

            if chosen.is_none() {
                tracing::debug!(
                    selected = ?selected,
                    backend = self.preferences.backend_name(),
                    "Selected runtime is not among installed runtimes"
                );
            }
            Ok(chosen)
        })
    }

    fn delegates_to(&self) -> Option<BrokerType> {
        self.source.delegates_to()
    }
}
