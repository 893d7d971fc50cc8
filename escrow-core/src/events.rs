use escrow_fsm::EscrowAction;
use uuid::Uuid;

/// A tagged union of everything the core can emit, replacing a name-string-plus-pattern
/// subscriber emitter with a closed set subscribers can match on exhaustively.
#[derive(Debug, Clone)]
pub enum Event {
    ContractDrafted { contract_id: Uuid },
    ContractCreated { contract_id: Uuid },
    ContractFunded { contract_id: Uuid },
    ContractUpdated { contract_id: Uuid, version: u64 },
    ContractDisputed { contract_id: Uuid, reason: String },
    ContractRejected { contract_id: Uuid, reason: String },
    ContractCanceled { contract_id: Uuid, reason: String },
    ContractVoided { contract_id: Uuid },
    ContractExecuted { contract_id: Uuid, action: EscrowAction },
    ExecutionCreated { contract_id: Uuid, execution_id: Uuid },
    ExecutionCanceled { execution_id: Uuid, reason: String },
    ArbitrationResolved { arbitration_id: Uuid, contract_id: Uuid },
    RequestCreated { request_id: Uuid },
}

/// A small broadcast-backed event bus. Every orchestrator mutation publishes after its
/// persistence write commits; late subscribers simply miss events published before they
/// subscribed, matching a typical SSE fan-out's best-effort delivery.
pub struct EventBus {
    sender: tokio::sync::broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: Event) {
        tracing::debug!(event = ?event, "publishing event");
        // No subscribers is a normal, common state (e.g. in tests); it is not an error.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
