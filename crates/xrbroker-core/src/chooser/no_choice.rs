use std::sync::Arc;

use crate::chooser::RuntimeChooser;
use crate::contract::BrokerType;
use crate::discovery::RuntimeSource;
use crate::error::BrokerError;
use crate::runtime::RuntimeData;

/// Picks a runtime only when exactly one candidate is installed.
///
/// There is no heuristic for picking among several candidates, so more than
/// one is treated as "no active runtime".
pub struct NoChoiceChooser {
    source: Arc<dyn RuntimeSource>,
}

impl NoChoiceChooser {
    pub fn new(source: Arc<dyn RuntimeSource>) -> Self {
        Self { source }
    }
}

/// The single candidate, if there is exactly one.
pub fn choose_only(mut candidates: Vec<RuntimeData>) -> Option<RuntimeData> {
    match candidates.len() {
        1 => candidates.pop(),
        0 => None,
        count => {
            tracing::warn!(candidates = count, "Got more than one runtime, can't decide");
            None
        }
    }
}

impl RuntimeChooser for NoChoiceChooser {
    fn name(&self) -> &str {
        "no_choice"
    }

    fn active_runtime<'a>(
        &'a self,
        major_version: u32,
        abi: &'a str,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Option<RuntimeData>, BrokerError>> + Send + 'a>,
    > {
        Box::pin(async move {
            let candidates = self.source.candidates(major_version, abi).await?;
            Ok(choose_only(candidates))
        })
    }

    fn delegates_to(&self) -> Option<BrokerType> {
        self.source.delegates_to()
    }
}
