pub mod no_choice;
pub mod system_delegate;
pub mod user_selected;

use std::future::Future;
use std::pin::Pin;

use crate::contract::BrokerType;
use crate::error::BrokerError;
use crate::runtime::RuntimeData;

pub use no_choice::NoChoiceChooser;
pub use system_delegate::{
    ForwardingSystemPolicy, SystemDelegateChooser, SystemSelectionPolicy, UndefinedSystemPolicy,
};
pub use user_selected::UserSelectedChooser;

/// Policy deciding which discovered runtime is active.
///
/// Implementations recompute from live state on every call; nothing is cached
/// between calls.
pub trait RuntimeChooser: Send + Sync {
    /// The display name of this chooser (for logging).
    fn name(&self) -> &str;

    /// Get the currently active runtime for an OpenXR major version and ABI.
    ///
    /// `Ok(None)` when no runtime is installed or none can be chosen.
    fn active_runtime<'a>(
        &'a self,
        major_version: u32,
        abi: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<RuntimeData>, BrokerError>> + Send + 'a>>;

    /// The other broker this chooser consults, if any.
    fn delegates_to(&self) -> Option<BrokerType> {
        None
    }
}
