use bitcoin::XOnlyPublicKey;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArbitrationStatus {
    Pending,
    Resolved,
    Executed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Release,
    Refund,
    Void,
}

/// An open dispute over a funded contract: who raised it, why, and — once an arbiter has
/// weighed in — which party is now authorized to execute.
#[derive(Debug, Clone)]
pub struct Arbitration {
    pub external_id: Uuid,
    pub contract_id: Uuid,
    pub status: ArbitrationStatus,
    pub claimant_pubkey: XOnlyPublicKey,
    pub reason: String,
    pub verdict: Option<Verdict>,
    pub created_at: i64,
    pub resolved_at: Option<i64>,
}

impl Arbitration {
    /// The role authorized to initiate the execution that carries out this verdict, and the
    /// FSM action that execution performs.
    pub fn authorized_action(&self) -> Option<(escrow_script::Role, escrow_fsm::EscrowAction)> {
        match self.verdict? {
            Verdict::Release => Some((escrow_script::Role::Receiver, escrow_fsm::EscrowAction::Release)),
            Verdict::Refund => Some((escrow_script::Role::Sender, escrow_fsm::EscrowAction::Refund)),
            Verdict::Void => None,
        }
    }
}
