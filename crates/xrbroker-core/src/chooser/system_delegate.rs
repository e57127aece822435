use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::chooser::RuntimeChooser;
use crate::client::{BrokerResolver, query_other_broker};
use crate::contract::BrokerType;
use crate::error::BrokerError;
use crate::runtime::RuntimeData;

/// How the system-facing broker selects its runtime.
///
/// There is no agreed selection algorithm for the system broker yet, so the
/// policy is injected rather than built in.
pub trait SystemSelectionPolicy: Send + Sync {
    fn name(&self) -> &str;

    fn select<'a>(
        &'a self,
        major_version: u32,
        abi: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<RuntimeData>, BrokerError>> + Send + 'a>>;

    fn delegates_to(&self) -> Option<BrokerType> {
        None
    }
}

/// The placeholder policy: selection is not yet defined, so nothing is ever
/// active.
pub struct UndefinedSystemPolicy;

impl SystemSelectionPolicy for UndefinedSystemPolicy {
    fn name(&self) -> &str {
        "undefined"
    }

    fn select<'a>(
        &'a self,
        major_version: u32,
        abi: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<RuntimeData>, BrokerError>> + Send + 'a>> {
        Box::pin(async move {
            tracing::warn!(
                major_version,
                abi = %abi,
                "System runtime selection policy is not defined, reporting no active runtime"
            );
            Ok(None)
        })
    }
}

/// Answers with whatever another broker reports as its active runtime.
///
/// Not part of the base protocol: a deployment opts into it explicitly, and
/// the target is checked for delegation cycles at startup.
pub struct ForwardingSystemPolicy {
    resolver: BrokerResolver,
    target: BrokerType,
}

impl ForwardingSystemPolicy {
    pub fn new(resolver: BrokerResolver, target: BrokerType) -> Self {
        Self { resolver, target }
    }
}

impl SystemSelectionPolicy for ForwardingSystemPolicy {
    fn name(&self) -> &str {
        "forwarding"
    }

    fn select<'a>(
        &'a self,
        major_version: u32,
        abi: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<RuntimeData>, BrokerError>> + Send + 'a>> {
        Box::pin(query_other_broker(
            &self.resolver,
            self.target,
            major_version,
            abi,
        ))
    }

    fn delegates_to(&self) -> Option<BrokerType> {
        Some(self.target)
    }
}

/// Chooser of the system-facing broker, backed by a [`SystemSelectionPolicy`].
pub struct SystemDelegateChooser {
    policy: Arc<dyn SystemSelectionPolicy>,
}

impl SystemDelegateChooser {
    pub fn new(policy: Arc<dyn SystemSelectionPolicy>) -> Self {
        Self { policy }
    }

    pub fn undefined() -> Self {
        Self::new(Arc::new(UndefinedSystemPolicy))
    }

    pub fn forwarding(resolver: BrokerResolver, target: BrokerType) -> Self {
        Self::new(Arc::new(ForwardingSystemPolicy::new(resolver, target)))
    }

    pub fn policy_name(&self) -> &str {
        self.policy.name()
    }
}

impl Default for SystemDelegateChooser {
    fn default() -> Self {
        Self::undefined()
    }
}

impl RuntimeChooser for SystemDelegateChooser {
    fn name(&self) -> &str {
        "system_delegate"
    }

    fn active_runtime<'a>(
        &'a self,
        major_version: u32,
        abi: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<RuntimeData>, BrokerError>> + Send + 'a>> {
        self.policy.select(major_version, abi)
    }

    fn delegates_to(&self) -> Option<BrokerType> {
        self.policy.delegates_to()
    }
}
