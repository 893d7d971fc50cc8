use crate::arbitration::Arbitration;
use crate::arbitration::ArbitrationStatus;
use crate::arbitration::Verdict;
use crate::config::Config;
use crate::error::Error;
use crate::events::Event;
use crate::events::EventBus;
use crate::orchestrator::contract::ContractOrchestrator;
use crate::repository::Repository;
use std::sync::Arc;
use uuid::Uuid;

fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock is after 1970")
        .as_secs() as i64
}

/// Resolves disputes raised against funded contracts. In demo mode, resolution is
/// short-circuited to whatever verdict the caller requests, skipping any external
/// arbiter round trip.
pub struct ArbitrationOrchestrator {
    arbitrations: Arc<dyn Repository<Arbitration>>,
    contracts: Arc<ContractOrchestrator>,
    events: Arc<EventBus>,
    config: Config,
}

impl ArbitrationOrchestrator {
    pub fn new(
        arbitrations: Arc<dyn Repository<Arbitration>>,
        contracts: Arc<ContractOrchestrator>,
        events: Arc<EventBus>,
        config: Config,
    ) -> Self {
        Self {
            arbitrations,
            contracts,
            events,
            config,
        }
    }

    pub async fn get(&self, arbitration_id: Uuid) -> Result<Arbitration, Error> {
        self.arbitrations
            .find_by_id(arbitration_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("arbitration {arbitration_id} not found")))
    }

    pub async fn resolve(&self, arbitration_id: Uuid, verdict: Verdict) -> Result<Arbitration, Error> {
        let mut arbitration = self.get(arbitration_id).await?;
        if arbitration.status != ArbitrationStatus::Pending {
            return Err(Error::conflict("arbitration has already been resolved"));
        }

        arbitration.status = ArbitrationStatus::Resolved;
        arbitration.verdict = Some(verdict);
        arbitration.resolved_at = Some(now());
        self.arbitrations.save(arbitration.clone()).await?;

        self.events.publish(Event::ArbitrationResolved {
            arbitration_id,
            contract_id: arbitration.contract_id,
        });

        if verdict == Verdict::Void {
            self.contracts.void(arbitration.contract_id).await?;
        }

        tracing::info!(arbitration_id = %arbitration_id, ?verdict, "arbitration resolved");

        Ok(arbitration)
    }

    /// Resolves immediately with the requested verdict, bypassing any external arbiter
    /// round trip. Only meaningful when `Config::demo_mode` is set; callers are expected
    /// to gate this behind that flag themselves.
    pub async fn auto_resolve(&self, arbitration_id: Uuid, verdict: Verdict) -> Result<Arbitration, Error> {
        if !self.config.demo_mode {
            return Err(Error::conflict("auto-resolution requires demo mode"));
        }
        self.resolve(arbitration_id, verdict).await
    }
}
