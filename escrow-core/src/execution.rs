use bitcoin::XOnlyPublicKey;
use escrow_fsm::EscrowAction;
use escrow_signing::SigningCoordinator;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    PendingServerConfirmation,
    PendingCounterparty,
    Executed,
    Rejected,
    Canceled,
}

/// One in-flight attempt to move a contract through `release`/`refund`/`settle` (or their
/// unilateral variants). At most one non-terminal execution may exist per contract.
#[derive(Debug, Clone)]
pub struct Execution {
    pub external_id: Uuid,
    pub contract_id: Uuid,
    pub action: EscrowAction,
    pub initiated_by: XOnlyPublicKey,
    pub status: ExecutionStatus,
    pub destination_address: String,
    pub coordinator: SigningCoordinator,
    pub cancelation_reason: Option<String>,
    pub rejection_reason: Option<String>,
    pub expires_at: Option<i64>,
}

impl Execution {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            ExecutionStatus::Executed | ExecutionStatus::Rejected | ExecutionStatus::Canceled
        )
    }

    pub fn is_unilateral(&self) -> bool {
        matches!(
            self.action,
            EscrowAction::UnilateralRelease
                | EscrowAction::UnilateralRefund
                | EscrowAction::UnilateralSettle
        )
    }
}
