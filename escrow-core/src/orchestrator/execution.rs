use crate::arbitration::Arbitration;
use crate::arbitration::ArbitrationStatus;
use crate::config::Config;
use crate::contract::Contract;
use crate::error::Error;
use crate::events::Event;
use crate::events::EventBus;
use crate::execution::Execution;
use crate::execution::ExecutionStatus;
use crate::orchestrator::contract::spending_path_for_action;
use crate::orchestrator::contract::ContractOrchestrator;
use crate::repository::Repository;
use backon::ExponentialBuilder;
use backon::Retryable;
use bitcoin::XOnlyPublicKey;
use escrow_fsm::EscrowAction;
use escrow_fsm::EscrowState;
use escrow_protocol::BuildTransactionRequest;
use escrow_protocol::ProtocolProvider;
use escrow_script::Role;
use escrow_signing::PartySignature;
use escrow_signing::SigningCoordinator;
use escrow_signing::UnsignedTx;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock is after 1970")
        .as_secs() as i64
}

fn retry_policy() -> ExponentialBuilder {
    ExponentialBuilder::default().with_max_times(3)
}

/// Drives a single `release`/`refund`/`settle` attempt from request through signature
/// collection to submission. At most one non-terminal execution is tracked per contract;
/// the map here is the conflict guard described for the concurrency model.
pub struct ExecutionOrchestrator {
    contracts: Arc<ContractOrchestrator>,
    arbitrations: Arc<dyn Repository<Arbitration>>,
    executions: Arc<dyn Repository<Execution>>,
    provider: Arc<dyn ProtocolProvider>,
    events: Arc<EventBus>,
    config: Config,
    network: bitcoin::Network,
    pending_by_contract: Mutex<HashMap<Uuid, Uuid>>,
}

impl ExecutionOrchestrator {
    pub fn new(
        contracts: Arc<ContractOrchestrator>,
        arbitrations: Arc<dyn Repository<Arbitration>>,
        executions: Arc<dyn Repository<Execution>>,
        provider: Arc<dyn ProtocolProvider>,
        events: Arc<EventBus>,
        config: Config,
        network: bitcoin::Network,
    ) -> Self {
        Self {
            contracts,
            arbitrations,
            executions,
            provider,
            events,
            config,
            network,
            pending_by_contract: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, execution_id: Uuid) -> Result<Execution, Error> {
        self.executions
            .find_by_id(execution_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("execution {execution_id} not found")))
    }

    pub async fn initiate(
        &self,
        contract_id: Uuid,
        action: EscrowAction,
        initiated_by: XOnlyPublicKey,
        destination_address: String,
    ) -> Result<Execution, Error> {
        let contract = self.contracts.get(contract_id).await?;
        self.authorize(&contract, &action, initiated_by).await?;

        {
            let pending = self.pending_by_contract.lock().await;
            if let Some(existing) = pending.get(&contract_id) {
                return Err(Error::conflict(format!(
                    "contract {contract_id} already has an in-flight execution {existing}"
                )));
            }
        }

        if !contract.can_perform(&action) {
            return Err(Error::ActionNotAllowed {
                state: contract.state(),
                action,
                allowed: vec![],
            });
        }

        if let Some(expected) = Self::authorized_destination(&contract, action)? {
            if expected != destination_address {
                return Err(Error::validation(format!(
                    "destination address does not match the contract's authorized {} address",
                    if matches!(action, EscrowAction::Release | EscrowAction::UnilateralRelease) {
                        "release"
                    } else {
                        "refund"
                    }
                )));
            }
        }

        let path_name = spending_path_for_action(action)
            .ok_or_else(|| Error::validation(format!("{action:?} does not drive an execution")))?;
        let built = escrow_script::build(contract.script_config.clone(), self.network)?;
        let leaf = built.spending_path(path_name)?;

        let vsize_estimate = 200u64;
        let fee = self.config.fee_policy.fee_for_vsize(vsize_estimate);
        if contract.funded_amount <= fee {
            return Err(Error::validation("funded amount does not cover the execution fee"));
        }
        let outputs = vec![(destination_address.clone(), contract.funded_amount - fee)];

        let request = BuildTransactionRequest {
            inputs: contract.vtxos.clone(),
            outputs,
            leaf: leaf.clone(),
        };

        let built_tx = (|| self.provider.build_transaction(request.clone()))
            .retry(retry_policy())
            .when(|err: &escrow_protocol::ProtocolError| err.is_transient())
            .await?;

        let coordinator = SigningCoordinator::new(UnsignedTx {
            psbt: built_tx.psbt,
            checkpoints: built_tx.checkpoints,
            required_signers: leaf.required_roles.clone(),
        });

        let execution = Execution {
            external_id: Uuid::new_v4(),
            contract_id,
            action,
            initiated_by,
            status: ExecutionStatus::PendingCounterparty,
            destination_address,
            coordinator,
            cancelation_reason: None,
            rejection_reason: None,
            expires_at: self.config.execution_ttl_seconds.map(|ttl| now() + ttl),
        };

        // The FSM transition is driven before anything is persisted: if the guard (e.g.
        // `require_release_address`) fails, nothing about this attempt should be left behind
        // for a future `initiate` to trip over.
        if contract.state() == EscrowState::Funded {
            self.contracts.drive_execution(contract_id, action).await?;
        }

        self.executions.save(execution.clone()).await?;
        self.pending_by_contract.lock().await.insert(contract_id, execution.external_id);

        self.events.publish(Event::ExecutionCreated {
            contract_id,
            execution_id: execution.external_id,
        });

        tracing::info!(contract_id = %contract_id, execution_id = %execution.external_id, ?action, "execution initiated");

        Ok(execution)
    }

    /// The address a verdict-authorized `release`/`refund` (or its unilateral counterpart)
    /// must pay out to; `None` for actions with no fixed destination to check against.
    fn authorized_destination(contract: &Contract, action: EscrowAction) -> Result<Option<String>, Error> {
        match action {
            EscrowAction::Release | EscrowAction::UnilateralRelease => Ok(Some(
                contract
                    .release_address
                    .clone()
                    .ok_or_else(|| Error::validation("release address is not set"))?,
            )),
            EscrowAction::Refund | EscrowAction::UnilateralRefund => Ok(Some(
                contract
                    .refund_address
                    .clone()
                    .ok_or_else(|| Error::validation("refund address is not set"))?,
            )),
            EscrowAction::Settle | EscrowAction::UnilateralSettle => Ok(None),
            EscrowAction::Accept
            | EscrowAction::Reject
            | EscrowAction::Cancel
            | EscrowAction::Fund
            | EscrowAction::Dispute
            | EscrowAction::Void => Ok(None),
        }
    }

    pub async fn approve(
        &self,
        execution_id: Uuid,
        signer_pubkey: XOnlyPublicKey,
        signed_psbt: bitcoin::Psbt,
        signed_checkpoints: Option<Vec<bitcoin::Psbt>>,
    ) -> Result<Execution, Error> {
        let execution = self.get(execution_id).await?;
        if execution.is_terminal() {
            return Err(Error::conflict("execution is already in a terminal status"));
        }
        let mut execution = self.expire_if_due(execution).await?;

        let contract = self.contracts.get(execution.contract_id).await?;
        let role = contract
            .role_of(signer_pubkey)
            .ok_or_else(|| Error::unauthorized("signer is not a party to this contract"))?;

        execution.coordinator.add_signature(PartySignature {
            role,
            signed_psbt,
            signed_checkpoints,
        })?;

        let completed = execution.coordinator.is_complete();
        self.executions.save(execution.clone()).await?;

        if completed {
            execution = self.complete(execution).await?;
        }

        Ok(execution)
    }

    pub async fn reject(
        &self,
        execution_id: Uuid,
        caller_pubkey: XOnlyPublicKey,
        reason: String,
    ) -> Result<Execution, Error> {
        let execution = self.get(execution_id).await?;
        if execution.is_terminal() {
            return Err(Error::conflict("execution is already in a terminal status"));
        }
        let mut execution = self.expire_if_due(execution).await?;
        if execution.initiated_by == caller_pubkey {
            return Err(Error::unauthorized("the initiator cannot reject their own execution"));
        }

        execution.status = ExecutionStatus::Rejected;
        execution.rejection_reason = Some(reason.clone());
        self.finish(execution, reason).await
    }

    pub async fn cancel(
        &self,
        execution_id: Uuid,
        caller_pubkey: XOnlyPublicKey,
        reason: String,
    ) -> Result<Execution, Error> {
        let execution = self.get(execution_id).await?;
        if execution.is_terminal() {
            return Err(Error::conflict("execution is already in a terminal status"));
        }
        let mut execution = self.expire_if_due(execution).await?;
        if execution.initiated_by != caller_pubkey {
            return Err(Error::unauthorized("only the initiator may cancel this execution"));
        }

        execution.status = ExecutionStatus::Canceled;
        execution.cancelation_reason = Some(reason.clone());
        self.finish(execution, reason).await
    }

    /// Cancels `execution` with reason `timeout` if its expiry has passed, surfacing that as
    /// an error so callers never act on a stale signing round. A no-op otherwise.
    async fn expire_if_due(&self, mut execution: Execution) -> Result<Execution, Error> {
        let Some(expires_at) = execution.expires_at else {
            return Ok(execution);
        };
        if now() < expires_at {
            return Ok(execution);
        }

        let execution_id = execution.external_id;
        execution.status = ExecutionStatus::Canceled;
        execution.cancelation_reason = Some("timeout".to_string());
        self.finish(execution, "timeout".to_string()).await?;
        Err(Error::conflict(format!("execution {execution_id} expired")))
    }

    async fn finish(&self, execution: Execution, reason: String) -> Result<Execution, Error> {
        self.executions.save(execution.clone()).await?;
        self.pending_by_contract.lock().await.remove(&execution.contract_id);
        self.events.publish(Event::ExecutionCanceled {
            execution_id: execution.external_id,
            reason,
        });
        Ok(execution)
    }

    async fn complete(&self, mut execution: Execution) -> Result<Execution, Error> {
        let (psbt, checkpoints) = execution.coordinator.signed_transaction()?;

        let submit_result = (|| self.provider.submit_transaction(psbt.clone(), checkpoints.clone()))
            .retry(retry_policy())
            .when(|err: &escrow_protocol::ProtocolError| err.is_transient())
            .await?;

        self.provider
            .finalize_transaction(submit_result.txid, checkpoints.clone())
            .await?;

        let contract = self.contracts.drive_execution(execution.contract_id, execution.action).await?;

        execution.status = ExecutionStatus::Executed;
        self.executions.save(execution.clone()).await?;
        self.pending_by_contract.lock().await.remove(&execution.contract_id);

        if matches!(execution.action, EscrowAction::Release | EscrowAction::Refund) {
            if let Some(arbitration_id) = contract.current_arbitration {
                self.mark_arbitration_executed(arbitration_id).await?;
            }
        }

        tracing::info!(execution_id = %execution.external_id, txid = %submit_result.txid, "execution submitted");

        Ok(execution)
    }

    /// Flips a resolved arbitration to `executed` once the verdict it authorized has actually
    /// been carried out on-chain.
    async fn mark_arbitration_executed(&self, arbitration_id: Uuid) -> Result<(), Error> {
        let Some(mut arbitration) = self.arbitrations.find_by_id(arbitration_id).await? else {
            return Ok(());
        };
        if arbitration.status == ArbitrationStatus::Resolved {
            arbitration.status = ArbitrationStatus::Executed;
            self.arbitrations.save(arbitration).await?;
        }
        Ok(())
    }

    async fn authorize(&self, contract: &Contract, action: &EscrowAction, caller: XOnlyPublicKey) -> Result<Role, Error> {
        let role = contract
            .role_of(caller)
            .ok_or_else(|| Error::unauthorized("caller is not a party to this contract"))?;

        if contract.state() != EscrowState::Disputed {
            return Ok(role);
        }

        let arbitration_id = contract
            .current_arbitration
            .ok_or_else(|| Error::unauthorized("contract has no associated arbitration"))?;
        let arbitration = self.arbitrations.find_by_id(arbitration_id).await?;
        let authorized = arbitration.and_then(|a| a.authorized_action());
        match authorized {
            Some((authorized_role, authorized_action)) if authorized_role == role && authorized_action == *action => {
                Ok(role)
            }
            _ => Err(Error::unauthorized(
                "no arbitration verdict authorizes this execution",
            )),
        }
    }
}
