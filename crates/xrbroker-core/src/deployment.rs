use std::collections::BTreeMap;
use std::sync::Arc;

use crate::chooser::RuntimeChooser;
use crate::client::{BrokerProvider, BrokerResolver};
use crate::contract::BrokerType;
use crate::engine::RuntimeBroker;
use crate::error::BrokerError;

/// Which broker each broker consults while choosing its runtime.
///
/// Delegation must stay acyclic: a broker that ends up asking itself would
/// recurse forever, so configurations that allow it are rejected up front.
#[derive(Debug, Default, Clone)]
pub struct DelegationGraph {
    edges: BTreeMap<BrokerType, Option<BrokerType>>,
}

impl DelegationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, broker: BrokerType, delegates_to: Option<BrokerType>) -> &mut Self {
        self.edges.insert(broker, delegates_to);
        self
    }

    /// Fails with the offending path if any delegation chain revisits a broker.
    pub fn validate(&self) -> Result<(), BrokerError> {
        for start in self.edges.keys() {
            let mut path = vec![*start];
            let mut current = *start;
            while let Some(Some(next)) = self.edges.get(&current) {
                path.push(*next);
                if path[..path.len() - 1].contains(next) {
                    tracing::error!(path = ?path, "Runtime broker delegation cycle");
                    return Err(BrokerError::DelegationCycle(path));
                }
                current = *next;
            }
        }
        Ok(())
    }
}

/// The application-facing and system-facing brokers, wired together.
///
/// The system broker is created first and registered with a resolver; the
/// application broker's chooser is then built against that resolver, so it
/// can reach the system broker only through the query contract.
pub struct BrokerDeployment {
    runtime_broker: Arc<RuntimeBroker>,
    system_broker: Arc<RuntimeBroker>,
    resolver: BrokerResolver,
}

impl BrokerDeployment {
    pub fn assemble<F>(
        system_chooser: Arc<dyn RuntimeChooser>,
        runtime_chooser: F,
    ) -> Result<Self, BrokerError>
    where
        F: FnOnce(&BrokerResolver) -> Arc<dyn RuntimeChooser>,
    {
        let system_broker = Arc::new(RuntimeBroker::new(
            BrokerType::SystemRuntimeBroker,
            system_chooser,
        ));
        let system_resolver =
            BrokerResolver::new().with_provider(system_broker.clone() as Arc<dyn BrokerProvider>);

        let runtime_chooser = runtime_chooser(&system_resolver);

        let mut graph = DelegationGraph::new();
        graph
            .add(
                BrokerType::SystemRuntimeBroker,
                system_broker.chooser().delegates_to(),
            )
            .add(BrokerType::RuntimeBroker, runtime_chooser.delegates_to());
        graph.validate()?;

        let runtime_broker = Arc::new(RuntimeBroker::new(
            BrokerType::RuntimeBroker,
            runtime_chooser,
        ));
        let resolver =
            system_resolver.with_provider(runtime_broker.clone() as Arc<dyn BrokerProvider>);

        tracing::info!(
            runtime_chooser = runtime_broker.chooser().name(),
            system_chooser = system_broker.chooser().name(),
            "Broker deployment assembled"
        );

        Ok(Self {
            runtime_broker,
            system_broker,
            resolver,
        })
    }

    pub fn runtime_broker(&self) -> &Arc<RuntimeBroker> {
        &self.runtime_broker
    }

    pub fn system_broker(&self) -> &Arc<RuntimeBroker> {
        &self.system_broker
    }

    /// Resolver reaching both brokers, for consumers.
    pub fn resolver(&self) -> &BrokerResolver {
        &self.resolver
    }

    pub fn broker(&self, broker_type: BrokerType) -> &Arc<RuntimeBroker> {
        match broker_type {
            BrokerType::RuntimeBroker => &self.runtime_broker,
            BrokerType::SystemRuntimeBroker => &self.system_broker,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chooser::{NoChoiceChooser, SystemDelegateChooser};
    use crate::discovery::{LocalRuntimes, RuntimeEnumerator, StaticServiceRegistry};

    #[test]
    fn one_level_delegation_is_valid() {
        let mut graph = DelegationGraph::new();
        graph
            .add(BrokerType::RuntimeBroker, Some(BrokerType::SystemRuntimeBroker))
            .add(BrokerType::SystemRuntimeBroker, None);
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn mutual_delegation_is_a_cycle() {
        let mut graph = DelegationGraph::new();
        graph
            .add(BrokerType::RuntimeBroker, Some(BrokerType::SystemRuntimeBroker))
            .add(BrokerType::SystemRuntimeBroker, Some(BrokerType::RuntimeBroker));
        assert!(matches!(
            graph.validate(),
            Err(BrokerError::DelegationCycle(_))
        ));
    }

    #[test]
    fn self_delegation_is_a_cycle() {
        let mut graph = DelegationGraph::new();
        graph.add(BrokerType::SystemRuntimeBroker, Some(BrokerType::SystemRuntimeBroker));
        let err = graph.validate().unwrap_err();
        assert!(err.to_string().contains("system_runtime_broker"));
    }

    #[test]
    fn assemble_rejects_cycle() {
        let result = BrokerDeployment::assemble(
            Arc::new(SystemDelegateChooser::forwarding(
                BrokerResolver::new(),
                BrokerType::RuntimeBroker,
            )),
            |resolver| {
                Arc::new(NoChoiceChooser::new(Arc::new(RuntimeEnumerator::new(
                    Arc::new(StaticServiceRegistry::new()),
                    resolver.clone(),
                ))))
            },
        );
        assert!(matches!(result, Err(BrokerError::DelegationCycle(_))));
    }

    #[test]
    fn assemble_registers_both_brokers() {
        let deployment = BrokerDeployment::assemble(
            Arc::new(SystemDelegateChooser::undefined()),
            |_| {
                Arc::new(NoChoiceChooser::new(Arc::new(LocalRuntimes::new(Arc::new(
                    StaticServiceRegistry::new(),
                )))))
            },
        )
        .unwrap();

        for broker in [BrokerType::RuntimeBroker, BrokerType::SystemRuntimeBroker] {
            assert!(deployment.resolver().provider(broker.authority()).is_some());
            assert_eq!(deployment.broker(broker).broker_type(), broker);
        }
    }
}
