use crate::orchestrator::ContractOrchestrator;
use escrow_protocol::ProtocolProvider;
use futures::StreamExt;
use std::sync::Arc;
use uuid::Uuid;

/// Bridges a protocol provider's address subscription to `ContractOrchestrator::observe_funding`,
/// one task per contract. Stops itself once the contract reaches a final state.
pub struct FundingWatcher {
    contracts: Arc<ContractOrchestrator>,
    provider: Arc<dyn ProtocolProvider>,
}

impl FundingWatcher {
    pub fn new(contracts: Arc<ContractOrchestrator>, provider: Arc<dyn ProtocolProvider>) -> Self {
        Self { contracts, provider }
    }

    /// Spawns the watch loop for one contract's escrow address and returns its handle so
    /// the caller can abort it early (e.g. when a contract is canceled before funding).
    pub fn watch(self: Arc<Self>, contract_id: Uuid, address: String) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut stream = self.provider.watch_address(address);
            while let Some(vtxos) = stream.next().await {
                match self.contracts.observe_funding(contract_id, vtxos).await {
                    Ok(contract) if contract.is_final() => {
                        tracing::debug!(contract_id = %contract_id, "funding watcher stopping, contract is final");
                        break;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        tracing::warn!(contract_id = %contract_id, %err, "failed to observe funding update");
                    }
                }
            }
        })
    }
}
