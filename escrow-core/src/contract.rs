use crate::Error;
use bitcoin::Amount;
use bitcoin::XOnlyPublicKey;
use escrow_fsm::EscrowAction;
use escrow_fsm::EscrowFsm;
use escrow_fsm::EscrowState;
use escrow_protocol::VtxoRef;
use escrow_script::BuiltScript;
use escrow_script::EscrowAddress;
use escrow_script::Party;
use escrow_script::Role;
use escrow_script::ScriptConfig;
use std::sync::Arc;
use uuid::Uuid;

/// The family of contract this record belongs to. Only `Escrow` has orchestrator support;
/// `Lending` is reserved so the sum-type shape the design calls for is visible without
/// building the excluded lending feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractKind {
    Escrow,
    Lending,
}

#[derive(Debug, Clone)]
pub struct ContractMetadata {
    pub created_at: i64,
    pub updated_at: i64,
    pub version: u64,
    pub kind: ContractKind,
}

/// An escrow contract: its parties, its on-chain funding state, and the state machine
/// driving its lifecycle. Owned exclusively by the contract orchestrator; the FSM is
/// mutated only through `perform`, never set directly.
#[derive(Debug, Clone)]
pub struct Contract {
    pub id: Uuid,
    pub metadata: ContractMetadata,
    pub parties: Vec<Party>,
    pub script_config: ScriptConfig,
    pub amount: Amount,
    pub description: Option<String>,
    pub funded_amount: Amount,
    pub vtxos: Vec<VtxoRef>,
    pub escrow_address: EscrowAddress,
    pub release_address: Option<String>,
    pub refund_address: Option<String>,
    pub nonce: Option<Vec<u8>>,
    pub current_arbitration: Option<Uuid>,
    fsm: EscrowFsm<Contract>,
}

impl escrow_fsm::EscrowContext for Contract {
    fn release_address_set(&self) -> bool {
        self.release_address.is_some()
    }
}

impl Contract {
    pub fn new(
        id: Uuid,
        parties: Vec<Party>,
        script_config: ScriptConfig,
        built: &BuiltScript,
        amount: Amount,
        description: Option<String>,
        nonce: Option<Vec<u8>>,
        now: i64,
        fsm_config: Arc<escrow_fsm::StateMachineConfig<EscrowState, EscrowAction, Contract>>,
    ) -> Self {
        Self {
            id,
            metadata: ContractMetadata {
                created_at: now,
                updated_at: now,
                version: 0,
                kind: ContractKind::Escrow,
            },
            parties,
            script_config,
            amount,
            description,
            funded_amount: Amount::ZERO,
            vtxos: Vec::new(),
            escrow_address: *built.address(),
            release_address: None,
            refund_address: None,
            nonce,
            current_arbitration: None,
            fsm: EscrowFsm::new(fsm_config),
        }
    }

    pub fn state(&self) -> EscrowState {
        *self.fsm.state()
    }

    pub fn is_final(&self) -> bool {
        self.fsm.is_final()
    }

    pub fn can_perform(&self, action: &EscrowAction) -> bool {
        self.fsm.can_perform(action)
    }

    pub fn party_by_role(&self, role: Role) -> Option<&Party> {
        self.parties.iter().find(|p| p.role == role)
    }

    pub fn role_of(&self, pubkey: XOnlyPublicKey) -> Option<Role> {
        self.parties
            .iter()
            .find(|p| p.pubkey == pubkey)
            .map(|p| p.role)
    }

    /// Performs a transition, bumping `metadata.version` and `updated_at` only if it
    /// succeeds — a failed guard or rejected side effect leaves the contract untouched.
    pub fn perform(&mut self, action: EscrowAction, now: i64) -> Result<EscrowState, Error> {
        let context_snapshot = self.clone();
        let new_state = self
            .fsm
            .perform(&action, &context_snapshot)
            .map_err(Error::from_fsm)?;
        let new_state = *new_state;
        self.metadata.version += 1;
        self.metadata.updated_at = now;
        tracing::info!(contract_id = %self.id, ?action, ?new_state, "contract transition");
        Ok(new_state)
    }
}
