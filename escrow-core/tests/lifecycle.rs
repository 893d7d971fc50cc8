//! End-to-end coverage of the orchestrators against an in-memory protocol provider: no
//! network, no real Taproot witness, just enough plumbing to drive a contract through its
//! full lifecycle and check the invariants the orchestrators are supposed to hold.

use async_trait::async_trait;
use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::schnorr::Signature;
use bitcoin::secp256k1::PublicKey;
use bitcoin::secp256k1::Secp256k1;
use bitcoin::secp256k1::SecretKey;
use bitcoin::taproot::LeafVersion;
use bitcoin::transaction::Version;
use bitcoin::Amount;
use bitcoin::Network;
use bitcoin::OutPoint;
use bitcoin::Psbt;
use bitcoin::ScriptBuf;
use bitcoin::Sequence;
use bitcoin::TapLeafHash;
use bitcoin::TapSighashType;
use bitcoin::Transaction;
use bitcoin::TxIn;
use bitcoin::TxOut;
use bitcoin::Txid;
use bitcoin::Witness;
use bitcoin::XOnlyPublicKey;
use escrow_core::Arbitration;
use escrow_core::Config;
use escrow_core::Contract;
use escrow_core::ContractOrchestrator;
use escrow_core::DraftRequest;
use escrow_core::EventBus;
use escrow_core::Execution;
use escrow_core::ExecutionOrchestrator;
use escrow_core::ExecutionStatus;
use escrow_core::InMemoryRepository;
use escrow_core::Repository;
use escrow_core::Verdict;
use escrow_fsm::EscrowAction;
use escrow_fsm::EscrowState;
use escrow_protocol::BuildTransactionRequest;
use escrow_protocol::BuiltTransaction;
use escrow_protocol::Info;
use escrow_protocol::ProtocolError;
use escrow_protocol::ProtocolProvider;
use escrow_protocol::SubmitResult;
use escrow_protocol::VtxoRef;
use escrow_protocol::VtxoStream;
use futures::stream;
use futures::StreamExt;
use std::sync::Arc;

fn keypair(seed: u8) -> XOnlyPublicKey {
    let secp = Secp256k1::new();
    let sk = SecretKey::from_slice(&[seed; 32]).unwrap();
    XOnlyPublicKey::from(PublicKey::from_secret_key(&secp, &sk))
}

/// A protocol provider that hands back whatever coins it was told about and never rejects a
/// build/submit call. `watch_address` just yields the snapshot passed to `set_coins` once,
/// since these tests drive funding through `observe_funding` directly.
struct TestProvider {
    server_pubkey: XOnlyPublicKey,
}

#[async_trait]
impl ProtocolProvider for TestProvider {
    async fn get_info(&self) -> Result<Info, ProtocolError> {
        Ok(Info {
            name: "test".to_string(),
            version: "0.0.0".to_string(),
            network: Network::Regtest,
            server_pubkey: self.server_pubkey,
            address_prefix: "tescrow".to_string(),
            unilateral_exit_delay: Some(144),
        })
    }

    async fn get_spendable_coins(&self, _address: &str) -> Result<Vec<VtxoRef>, ProtocolError> {
        Ok(Vec::new())
    }

    async fn build_transaction(&self, request: BuildTransactionRequest) -> Result<BuiltTransaction, ProtocolError> {
        let input = request
            .inputs
            .iter()
            .map(|vtxo| TxIn {
                previous_output: vtxo.outpoint,
                script_sig: ScriptBuf::new(),
                sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
                witness: Witness::new(),
            })
            .collect();
        let output = request
            .outputs
            .iter()
            .map(|(_, amount)| TxOut {
                value: *amount,
                script_pubkey: ScriptBuf::new(),
            })
            .collect();
        let tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input,
            output,
        };
        Ok(BuiltTransaction {
            psbt: Psbt::from_unsigned_tx(tx).unwrap(),
            checkpoints: Vec::new(),
        })
    }

    async fn submit_transaction(&self, psbt: Psbt, _checkpoints: Vec<Psbt>) -> Result<SubmitResult, ProtocolError> {
        Ok(SubmitResult {
            txid: psbt.unsigned_tx.compute_txid(),
        })
    }

    async fn finalize_transaction(&self, _txid: Txid, _signed_checkpoints: Vec<Psbt>) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn watch_address(&self, _address: String) -> VtxoStream {
        stream::empty().boxed()
    }
}

struct Harness {
    contract_orchestrator: Arc<ContractOrchestrator>,
    execution_orchestrator: ExecutionOrchestrator,
    arbitration_orchestrator: escrow_core::ArbitrationOrchestrator,
    sender: XOnlyPublicKey,
    receiver: XOnlyPublicKey,
    server: XOnlyPublicKey,
    arbiter: XOnlyPublicKey,
}

impl Harness {
    fn new() -> Self {
        let sender = keypair(1);
        let receiver = keypair(2);
        let server = keypair(3);
        let arbiter = keypair(4);

        let provider = Arc::new(TestProvider { server_pubkey: server });
        let contracts: Arc<dyn Repository<Contract>> = Arc::new(InMemoryRepository::new());
        let arbitrations: Arc<dyn Repository<Arbitration>> = Arc::new(InMemoryRepository::new());
        let executions: Arc<dyn Repository<Execution>> = Arc::new(InMemoryRepository::new());
        let events = Arc::new(EventBus::default());
        let config = Config::default();
        let network = Network::Regtest;

        let contract_orchestrator = Arc::new(ContractOrchestrator::new(
            contracts,
            arbitrations.clone(),
            events.clone(),
            config.clone(),
            network,
        ));
        let execution_orchestrator = ExecutionOrchestrator::new(
            contract_orchestrator.clone(),
            arbitrations.clone(),
            executions,
            provider,
            events.clone(),
            config.clone(),
            network,
        );
        let arbitration_orchestrator =
            escrow_core::ArbitrationOrchestrator::new(arbitrations, contract_orchestrator.clone(), events, config);

        Self {
            contract_orchestrator,
            execution_orchestrator,
            arbitration_orchestrator,
            sender,
            receiver,
            server,
            arbiter,
        }
    }

    async fn drafted_and_funded(&self) -> Contract {
        let contract = self
            .contract_orchestrator
            .draft(DraftRequest {
                sender_pubkey: self.sender,
                receiver_pubkey: self.receiver,
                server_pubkey: self.server,
                arbiter_pubkey: self.arbiter,
                amount: Amount::from_sat(50_000),
                description: None,
                nonce: None,
            })
            .await
            .unwrap();
        let contract = self.contract_orchestrator.accept(contract.id, self.receiver).await.unwrap();

        let vtxo = VtxoRef {
            outpoint: OutPoint {
                txid: Txid::all_zeros(),
                vout: 0,
            },
            value: contract.amount,
        };
        self.contract_orchestrator
            .observe_funding(contract.id, vec![vtxo])
            .await
            .unwrap()
    }

    fn sign(&self, base: &Psbt, leaf_hash: TapLeafHash, pubkey: XOnlyPublicKey, seed: u8) -> Psbt {
        let mut psbt = base.clone();
        psbt.inputs[0].tap_script_sigs.insert(
            (pubkey, leaf_hash),
            bitcoin::taproot::Signature {
                signature: Signature::from_slice(&[seed; 64]).unwrap(),
                sighash_type: TapSighashType::Default,
            },
        );
        psbt
    }
}

#[tokio::test]
async fn happy_path_settle_reaches_completed() {
    let harness = Harness::new();
    let contract = harness.drafted_and_funded().await;
    let contract = harness
        .contract_orchestrator
        .update_release_address(contract.id, harness.receiver, "demo-release".to_string())
        .await
        .unwrap();
    assert_eq!(contract.state(), EscrowState::Funded);

    let execution = harness
        .execution_orchestrator
        .initiate(contract.id, EscrowAction::Settle, harness.sender, "demo-release".to_string())
        .await
        .unwrap();

    let contract = harness.contract_orchestrator.get(contract.id).await.unwrap();
    assert_eq!(contract.state(), EscrowState::PendingExecution);

    let built = escrow_script::build(contract.script_config.clone(), Network::Regtest).unwrap();
    let leaf = built.spending_path("settle").unwrap();
    let leaf_hash = TapLeafHash::from_script(&leaf.leaf_script, LeafVersion::TapScript);

    let request = BuildTransactionRequest {
        inputs: contract.vtxos.clone(),
        outputs: vec![("demo-release".to_string(), contract.funded_amount)],
        leaf: leaf.clone(),
    };
    let base = escrow_protocol::ProtocolProvider::build_transaction(
        &TestProvider { server_pubkey: harness.server },
        request,
    )
    .await
    .unwrap();

    let mut execution = execution;
    for (pubkey, seed) in [(harness.sender, 1u8), (harness.receiver, 2u8), (harness.server, 3u8)] {
        let signed = harness.sign(&base.psbt, leaf_hash, pubkey, seed);
        execution = harness
            .execution_orchestrator
            .approve(execution.external_id, pubkey, signed, None)
            .await
            .unwrap();
    }

    assert_eq!(execution.status, ExecutionStatus::Executed);
    let contract = harness.contract_orchestrator.get(contract.id).await.unwrap();
    assert_eq!(contract.state(), EscrowState::Completed);
    assert!(contract.is_final());
}

#[tokio::test]
async fn dispute_blocks_refund_until_a_matching_verdict_resolves_it() {
    let harness = Harness::new();
    let contract = harness.drafted_and_funded().await;
    let contract = harness
        .contract_orchestrator
        .update_refund_address(contract.id, harness.sender, "demo-refund".to_string())
        .await
        .unwrap();

    let (contract, arbitration) = harness
        .contract_orchestrator
        .dispute(contract.id, harness.sender, "goods not delivered".to_string())
        .await
        .unwrap();
    assert_eq!(contract.state(), EscrowState::Disputed);
    assert_eq!(contract.current_arbitration, Some(arbitration.external_id));

    let err = harness
        .execution_orchestrator
        .initiate(contract.id, EscrowAction::Refund, harness.sender, "demo-refund".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, escrow_core::Error::Unauthorized(_)));

    harness
        .arbitration_orchestrator
        .resolve(arbitration.external_id, Verdict::Refund)
        .await
        .unwrap();

    let execution = harness
        .execution_orchestrator
        .initiate(contract.id, EscrowAction::Refund, harness.sender, "demo-refund".to_string())
        .await
        .unwrap();
    assert_eq!(execution.status, ExecutionStatus::PendingCounterparty);
}

#[tokio::test]
async fn void_verdict_voids_the_contract() {
    let harness = Harness::new();
    let contract = harness.drafted_and_funded().await;
    let (_, arbitration) = harness
        .contract_orchestrator
        .dispute(contract.id, harness.receiver, "counterparty unresponsive".to_string())
        .await
        .unwrap();

    harness
        .arbitration_orchestrator
        .resolve(arbitration.external_id, Verdict::Void)
        .await
        .unwrap();

    let contract = harness.contract_orchestrator.get(contract.id).await.unwrap();
    assert_eq!(contract.state(), EscrowState::Voided);
    assert!(contract.is_final());
}

#[tokio::test]
async fn an_expired_execution_is_canceled_on_next_touch() {
    let harness = Harness::new();
    let contract = harness.drafted_and_funded().await;
    let contract = harness
        .contract_orchestrator
        .update_release_address(contract.id, harness.receiver, "demo-release".to_string())
        .await
        .unwrap();

    let mut config = Config::default();
    config.execution_ttl_seconds = Some(-1);
    let execution_orchestrator = ExecutionOrchestrator::new(
        harness.contract_orchestrator.clone(),
        Arc::new(InMemoryRepository::new()),
        Arc::new(InMemoryRepository::new()),
        Arc::new(TestProvider {
            server_pubkey: harness.server,
        }),
        Arc::new(EventBus::default()),
        config,
        Network::Regtest,
    );

    let execution = execution_orchestrator
        .initiate(contract.id, EscrowAction::Settle, harness.sender, "demo-release".to_string())
        .await
        .unwrap();
    assert!(execution.expires_at.is_some());

    let err = execution_orchestrator
        .approve(
            execution.external_id,
            harness.sender,
            Psbt::from_unsigned_tx(Transaction {
                version: Version::TWO,
                lock_time: LockTime::ZERO,
                input: Vec::new(),
                output: Vec::new(),
            })
            .unwrap(),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, escrow_core::Error::Conflict(_)));

    let fetched = execution_orchestrator.get(execution.external_id).await.unwrap();
    assert_eq!(fetched.status, ExecutionStatus::Canceled);
    assert_eq!(fetched.cancelation_reason.as_deref(), Some("timeout"));
}

#[tokio::test]
async fn unilateral_refund_reaches_completed_after_a_rejected_collaborative_attempt() {
    let harness = Harness::new();
    let contract = harness.drafted_and_funded().await;
    let contract = harness
        .contract_orchestrator
        .update_refund_address(contract.id, harness.sender, "demo-refund".to_string())
        .await
        .unwrap();

    let first_attempt = harness
        .execution_orchestrator
        .initiate(contract.id, EscrowAction::Refund, harness.sender, "demo-refund".to_string())
        .await
        .unwrap();
    harness
        .execution_orchestrator
        .reject(first_attempt.external_id, harness.receiver, "wants to retry unilaterally".to_string())
        .await
        .unwrap();

    let contract = harness.contract_orchestrator.get(contract.id).await.unwrap();
    assert_eq!(contract.state(), EscrowState::PendingExecution);

    let execution = harness
        .execution_orchestrator
        .initiate(
            contract.id,
            EscrowAction::UnilateralRefund,
            harness.sender,
            "demo-refund".to_string(),
        )
        .await
        .unwrap();

    let built = escrow_script::build(contract.script_config.clone(), Network::Regtest).unwrap();
    let leaf = built.spending_path("unilateral-refund").unwrap();
    let leaf_hash = TapLeafHash::from_script(&leaf.leaf_script, LeafVersion::TapScript);

    let request = BuildTransactionRequest {
        inputs: contract.vtxos.clone(),
        outputs: vec![("demo-refund".to_string(), contract.funded_amount)],
        leaf: leaf.clone(),
    };
    let base = escrow_protocol::ProtocolProvider::build_transaction(
        &TestProvider { server_pubkey: harness.server },
        request,
    )
    .await
    .unwrap();

    let mut execution = execution;
    for (pubkey, seed) in [(harness.sender, 1u8), (harness.arbiter, 4u8)] {
        let signed = harness.sign(&base.psbt, leaf_hash, pubkey, seed);
        execution = harness
            .execution_orchestrator
            .approve(execution.external_id, pubkey, signed, None)
            .await
            .unwrap();
    }

    assert_eq!(execution.status, ExecutionStatus::Executed);
    let contract = harness.contract_orchestrator.get(contract.id).await.unwrap();
    assert_eq!(contract.state(), EscrowState::Completed);
    assert!(contract.is_final());
}

#[tokio::test]
async fn a_second_execution_cannot_be_initiated_while_one_is_in_flight() {
    let harness = Harness::new();
    let contract = harness.drafted_and_funded().await;

    let _first = harness
        .execution_orchestrator
        .initiate(contract.id, EscrowAction::Refund, harness.sender, "demo-refund".to_string())
        .await
        .unwrap();

    let err = harness
        .execution_orchestrator
        .initiate(contract.id, EscrowAction::Refund, harness.sender, "demo-refund".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, escrow_core::Error::Conflict(_)));
}

#[tokio::test]
async fn a_terminal_execution_cannot_be_acted_on_again() {
    let harness = Harness::new();
    let contract = harness.drafted_and_funded().await;

    let execution = harness
        .execution_orchestrator
        .initiate(contract.id, EscrowAction::Refund, harness.sender, "demo-refund".to_string())
        .await
        .unwrap();

    let execution = harness
        .execution_orchestrator
        .reject(execution.external_id, harness.receiver, "changed my mind".to_string())
        .await
        .unwrap();
    assert_eq!(execution.status, ExecutionStatus::Rejected);

    let err = harness
        .execution_orchestrator
        .reject(execution.external_id, harness.receiver, "again".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, escrow_core::Error::Conflict(_)));

    let err = harness
        .execution_orchestrator
        .approve(execution.external_id, harness.sender, Psbt::from_unsigned_tx(Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: Vec::new(),
            output: Vec::new(),
        })
        .unwrap(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, escrow_core::Error::Conflict(_)));
}

#[tokio::test]
async fn rejecting_an_execution_does_not_advance_the_contract() {
    let harness = Harness::new();
    let contract = harness.drafted_and_funded().await;
    let contract = harness
        .contract_orchestrator
        .update_release_address(contract.id, harness.receiver, "demo-release".to_string())
        .await
        .unwrap();

    let execution = harness
        .execution_orchestrator
        .initiate(contract.id, EscrowAction::Settle, harness.sender, "demo-release".to_string())
        .await
        .unwrap();

    let execution = harness
        .execution_orchestrator
        .reject(execution.external_id, harness.receiver, "amount disputed".to_string())
        .await
        .unwrap();
    assert_eq!(execution.status, ExecutionStatus::Rejected);

    let contract = harness.contract_orchestrator.get(contract.id).await.unwrap();
    assert_eq!(contract.state(), EscrowState::PendingExecution);
    assert!(!contract.is_final());
}
