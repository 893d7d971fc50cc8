use crate::arbitration::Arbitration;
use crate::arbitration::ArbitrationStatus;
use crate::arbitration::Verdict;
use crate::config::Config;
use crate::contract::Contract;
use crate::error::Error;
use crate::events::Event;
use crate::events::EventBus;
use crate::repository::Repository;
use bitcoin::Amount;
use bitcoin::XOnlyPublicKey;
use escrow_fsm::EscrowAction;
use escrow_fsm::EscrowState;
use escrow_protocol::VtxoRef;
use escrow_script::Party;
use escrow_script::PathKind;
use escrow_script::Role;
use escrow_script::ScriptConfig;
use escrow_script::SpendingPath;
use escrow_script::Timelock;
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

/// The six named spending paths every escrow contract compiles into its Taproot tree,
/// mirroring a VHTLC's six collaborative/unilateral outcomes but recast around
/// sender/receiver/arbiter/server roles instead of a hash preimage.
fn default_spending_paths(unilateral_exit_delay: Timelock) -> Vec<SpendingPath> {
    vec![
        SpendingPath {
            name: "settle".to_string(),
            description: Some("sender, receiver, and server agree to settle".to_string()),
            kind: PathKind::Multisig,
            required_roles: vec![Role::Sender, Role::Receiver, Role::Server],
            threshold: 3,
            timelock: None,
            preimage_hash: None,
        },
        SpendingPath {
            name: "release".to_string(),
            description: Some("arbiter verdict releases funds to the receiver".to_string()),
            kind: PathKind::Multisig,
            required_roles: vec![Role::Receiver, Role::Arbiter, Role::Server],
            threshold: 3,
            timelock: None,
            preimage_hash: None,
        },
        SpendingPath {
            name: "refund".to_string(),
            description: Some("arbiter verdict refunds the sender".to_string()),
            kind: PathKind::Multisig,
            required_roles: vec![Role::Sender, Role::Arbiter, Role::Server],
            threshold: 3,
            timelock: None,
            preimage_hash: None,
        },
        SpendingPath {
            name: "unilateral-settle".to_string(),
            description: Some("sender and receiver settle without the server".to_string()),
            kind: PathKind::CsvMultisig,
            required_roles: vec![Role::Sender, Role::Receiver],
            threshold: 2,
            timelock: Some(unilateral_exit_delay),
            preimage_hash: None,
        },
        SpendingPath {
            name: "unilateral-release".to_string(),
            description: Some("receiver and arbiter release without the server".to_string()),
            kind: PathKind::CsvMultisig,
            required_roles: vec![Role::Receiver, Role::Arbiter],
            threshold: 2,
            timelock: Some(unilateral_exit_delay),
            preimage_hash: None,
        },
        SpendingPath {
            name: "unilateral-refund".to_string(),
            description: Some("sender and arbiter refund without the server".to_string()),
            kind: PathKind::CsvMultisig,
            required_roles: vec![Role::Sender, Role::Arbiter],
            threshold: 2,
            timelock: Some(unilateral_exit_delay),
            preimage_hash: None,
        },
    ]
}

/// Maps an execution action to the spending path that satisfies it. `None` for any action
/// that never drives an execution (`accept`/`reject`/`cancel`/`fund`/`dispute`/`void`), so a
/// future addition to `EscrowAction` can't silently fall through to the wrong path.
pub fn spending_path_for_action(action: EscrowAction) -> Option<&'static str> {
    match action {
        EscrowAction::Settle => Some("settle"),
        EscrowAction::Release => Some("release"),
        EscrowAction::Refund => Some("refund"),
        EscrowAction::UnilateralSettle => Some("unilateral-settle"),
        EscrowAction::UnilateralRelease => Some("unilateral-release"),
        EscrowAction::UnilateralRefund => Some("unilateral-refund"),
        EscrowAction::Accept
        | EscrowAction::Reject
        | EscrowAction::Cancel
        | EscrowAction::Fund
        | EscrowAction::Dispute
        | EscrowAction::Void => None,
    }
}

pub struct DraftRequest {
    pub sender_pubkey: XOnlyPublicKey,
    pub receiver_pubkey: XOnlyPublicKey,
    pub server_pubkey: XOnlyPublicKey,
    pub arbiter_pubkey: XOnlyPublicKey,
    pub amount: Amount,
    pub description: Option<String>,
    pub nonce: Option<Vec<u8>>,
}

/// Owns the lifecycle of escrow contracts: drafting, acceptance, funding, disputes, and the
/// invariants in between. Every mutating command is serialized per contract id.
pub struct ContractOrchestrator {
    contracts: Arc<dyn Repository<Contract>>,
    arbitrations: Arc<dyn Repository<Arbitration>>,
    events: Arc<EventBus>,
    config: Config,
    network: bitcoin::Network,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl ContractOrchestrator {
    pub fn new(
        contracts: Arc<dyn Repository<Contract>>,
        arbitrations: Arc<dyn Repository<Arbitration>>,
        events: Arc<EventBus>,
        config: Config,
        network: bitcoin::Network,
    ) -> Self {
        Self {
            contracts,
            arbitrations,
            events,
            config,
            network,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    pub async fn get(&self, contract_id: Uuid) -> Result<Contract, Error> {
        self.contracts
            .find_by_id(contract_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("contract {contract_id} not found")))
    }

    pub async fn draft(&self, request: DraftRequest) -> Result<Contract, Error> {
        let parties = vec![
            Party {
                role: Role::Sender,
                pubkey: request.sender_pubkey,
                display_name: None,
            },
            Party {
                role: Role::Receiver,
                pubkey: request.receiver_pubkey,
                display_name: None,
            },
            Party {
                role: Role::Server,
                pubkey: request.server_pubkey,
                display_name: None,
            },
            Party {
                role: Role::Arbiter,
                pubkey: request.arbiter_pubkey,
                display_name: None,
            },
        ];

        let spending_paths = default_spending_paths(self.config.unilateral_exit_delay);
        let script_config = ScriptConfig {
            parties: parties.clone(),
            spending_paths,
            nonce: request.nonce.clone(),
            protocol_server_key: request.server_pubkey,
        };

        let built = escrow_script::build(script_config.clone(), self.network)?;

        let id = Uuid::new_v4();
        let fsm_config = escrow_fsm::escrow_config::<Contract>();
        let contract = Contract::new(
            id,
            parties,
            script_config,
            &built,
            request.amount,
            request.description,
            request.nonce,
            now(),
            fsm_config,
        );

        self.contracts.save(contract.clone()).await?;
        self.events.publish(Event::ContractDrafted { contract_id: id });
        self.events.publish(Event::ContractUpdated {
            contract_id: id,
            version: contract.metadata.version,
        });

        tracing::info!(contract_id = %id, address = %contract.escrow_address.encode(), "contract drafted");

        Ok(contract)
    }

    pub async fn accept(&self, contract_id: Uuid, caller_pubkey: XOnlyPublicKey) -> Result<Contract, Error> {
        let lock = self.lock_for(contract_id).await;
        let _guard = lock.lock().await;

        let mut contract = self.get(contract_id).await?;
        self.require_role(&contract, caller_pubkey, Role::Receiver, "accept a draft")?;

        contract.perform(EscrowAction::Accept, now())?;
        self.persist_and_announce(&contract, Event::ContractCreated { contract_id }).await?;
        Ok(contract)
    }

    pub async fn reject(
        &self,
        contract_id: Uuid,
        caller_pubkey: XOnlyPublicKey,
        reason: String,
    ) -> Result<Contract, Error> {
        let lock = self.lock_for(contract_id).await;
        let _guard = lock.lock().await;

        let mut contract = self.get(contract_id).await?;
        self.require_party(&contract, caller_pubkey)?;

        contract.perform(EscrowAction::Reject, now())?;
        self.persist_and_announce(&contract, Event::ContractRejected { contract_id, reason })
            .await?;
        Ok(contract)
    }

    pub async fn cancel(
        &self,
        contract_id: Uuid,
        caller_pubkey: XOnlyPublicKey,
        reason: String,
    ) -> Result<Contract, Error> {
        let lock = self.lock_for(contract_id).await;
        let _guard = lock.lock().await;

        let mut contract = self.get(contract_id).await?;
        self.require_party(&contract, caller_pubkey)?;

        contract.perform(EscrowAction::Cancel, now())?;
        self.persist_and_announce(&contract, Event::ContractCanceled { contract_id, reason })
            .await?;
        Ok(contract)
    }

    pub async fn recede(&self, contract_id: Uuid, caller_pubkey: XOnlyPublicKey) -> Result<Contract, Error> {
        let lock = self.lock_for(contract_id).await;
        let _guard = lock.lock().await;

        let mut contract = self.get(contract_id).await?;
        self.require_party(&contract, caller_pubkey)?;
        if contract.state() != EscrowState::Created {
            return Err(Error::conflict("recede is only available from the created state"));
        }

        contract.perform(EscrowAction::Cancel, now())?;
        self.persist(&contract).await?;
        Ok(contract)
    }

    pub async fn update_release_address(
        &self,
        contract_id: Uuid,
        caller_pubkey: XOnlyPublicKey,
        address: String,
    ) -> Result<Contract, Error> {
        let lock = self.lock_for(contract_id).await;
        let _guard = lock.lock().await;

        let mut contract = self.get(contract_id).await?;
        self.require_role(&contract, caller_pubkey, Role::Receiver, "set the release address")?;

        if !matches!(contract.state(), EscrowState::Created | EscrowState::Funded) {
            return Err(Error::conflict(
                "release address can only be set while created or funded",
            ));
        }

        contract.release_address = Some(address);
        contract.metadata.version += 1;
        contract.metadata.updated_at = now();
        self.persist(&contract).await?;
        Ok(contract)
    }

    pub async fn update_refund_address(
        &self,
        contract_id: Uuid,
        caller_pubkey: XOnlyPublicKey,
        address: String,
    ) -> Result<Contract, Error> {
        let lock = self.lock_for(contract_id).await;
        let _guard = lock.lock().await;

        let mut contract = self.get(contract_id).await?;
        self.require_role(&contract, caller_pubkey, Role::Sender, "set the refund address")?;

        if !matches!(contract.state(), EscrowState::Created | EscrowState::Funded) {
            return Err(Error::conflict(
                "refund address can only be set while created or funded",
            ));
        }

        contract.refund_address = Some(address);
        contract.metadata.version += 1;
        contract.metadata.updated_at = now();
        self.persist(&contract).await?;
        Ok(contract)
    }

    /// Recomputes the contract's funded amount from the given VTXO set. Safe to call
    /// repeatedly with the same set: it only ever transitions `created` to `funded` once.
    pub async fn observe_funding(&self, contract_id: Uuid, vtxos: Vec<VtxoRef>) -> Result<Contract, Error> {
        let lock = self.lock_for(contract_id).await;
        let _guard = lock.lock().await;

        let mut contract = self.get(contract_id).await?;
        let funded_amount: Amount = vtxos.iter().map(|v| v.value).sum();
        let already_funded = contract.funded_amount == funded_amount && !contract.vtxos.is_empty();

        contract.vtxos = vtxos;
        contract.funded_amount = funded_amount;

        if already_funded {
            return Ok(contract);
        }

        let crossed_threshold =
            contract.state() == EscrowState::Created && contract.funded_amount >= contract.amount;

        if crossed_threshold {
            contract.perform(EscrowAction::Fund, now())?;
            self.persist_and_announce(&contract, Event::ContractFunded { contract_id }).await?;
        } else {
            contract.metadata.version += 1;
            contract.metadata.updated_at = now();
            self.persist(&contract).await?;
        }

        Ok(contract)
    }

    pub async fn dispute(
        &self,
        contract_id: Uuid,
        caller_pubkey: XOnlyPublicKey,
        reason: String,
    ) -> Result<(Contract, Arbitration), Error> {
        let lock = self.lock_for(contract_id).await;
        let _guard = lock.lock().await;

        let mut contract = self.get(contract_id).await?;
        self.require_party(&contract, caller_pubkey)?;

        if !matches!(contract.state(), EscrowState::Funded | EscrowState::PendingExecution) {
            return Err(Error::conflict("dispute requires a funded contract"));
        }

        contract.perform(EscrowAction::Dispute, now())?;

        let mut arbitration = Arbitration {
            external_id: Uuid::new_v4(),
            contract_id,
            status: ArbitrationStatus::Pending,
            claimant_pubkey: caller_pubkey,
            reason: reason.clone(),
            verdict: None,
            created_at: now(),
            resolved_at: None,
        };

        // In demo mode, there's no arbiter on the other end of the wire: every newly opened
        // arbitration is resolved on the spot with a verdict picked at random between the two
        // contested outcomes.
        if self.config.demo_mode {
            let verdict = if rand::random::<bool>() { Verdict::Release } else { Verdict::Refund };
            arbitration.status = ArbitrationStatus::Resolved;
            arbitration.verdict = Some(verdict);
            arbitration.resolved_at = Some(now());
        }

        self.arbitrations.save(arbitration.clone()).await?;
        contract.current_arbitration = Some(arbitration.external_id);

        self.persist_and_announce(&contract, Event::ContractDisputed { contract_id, reason })
            .await?;

        if arbitration.status == ArbitrationStatus::Resolved {
            self.events.publish(Event::ArbitrationResolved {
                arbitration_id: arbitration.external_id,
                contract_id,
            });
        }

        Ok((contract, arbitration))
    }

    pub async fn void(&self, contract_id: Uuid) -> Result<Contract, Error> {
        let lock = self.lock_for(contract_id).await;
        let _guard = lock.lock().await;

        let mut contract = self.get(contract_id).await?;
        contract.perform(EscrowAction::Void, now())?;
        self.persist_and_announce(&contract, Event::ContractVoided { contract_id }).await?;
        Ok(contract)
    }

    /// Performs an FSM transition as part of an execution's lifecycle (initiation or
    /// completion); called by the execution orchestrator, which owns the signing flow.
    pub(crate) async fn drive_execution(&self, contract_id: Uuid, action: EscrowAction) -> Result<Contract, Error> {
        let lock = self.lock_for(contract_id).await;
        let _guard = lock.lock().await;

        let mut contract = self.get(contract_id).await?;
        let reached_completed = contract.perform(action, now())? == EscrowState::Completed;
        if reached_completed {
            self.persist_and_announce(&contract, Event::ContractExecuted { contract_id, action })
                .await?;
        } else {
            self.persist(&contract).await?;
        }
        Ok(contract)
    }

    fn require_party(&self, contract: &Contract, caller_pubkey: XOnlyPublicKey) -> Result<Role, Error> {
        contract
            .role_of(caller_pubkey)
            .ok_or_else(|| Error::unauthorized("caller is not a party to this contract"))
    }

    fn require_role(
        &self,
        contract: &Contract,
        caller_pubkey: XOnlyPublicKey,
        role: Role,
        action_description: &str,
    ) -> Result<(), Error> {
        match contract.party_by_role(role) {
            Some(party) if party.pubkey == caller_pubkey => Ok(()),
            _ => Err(Error::unauthorized(format!(
                "only the {role:?} may {action_description}"
            ))),
        }
    }

    async fn persist(&self, contract: &Contract) -> Result<(), Error> {
        self.contracts.save(contract.clone()).await?;
        self.events.publish(Event::ContractUpdated {
            contract_id: contract.id,
            version: contract.metadata.version,
        });
        Ok(())
    }

    async fn persist_and_announce(&self, contract: &Contract, event: Event) -> Result<(), Error> {
        self.contracts.save(contract.clone()).await?;
        self.events.publish(event);
        self.events.publish(Event::ContractUpdated {
            contract_id: contract.id,
            version: contract.metadata.version,
        });
        Ok(())
    }
}
