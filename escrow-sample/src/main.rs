#![allow(clippy::print_stdout)]

mod demo_provider;

use crate::demo_provider::DemoProvider;
use anyhow::Context;
use anyhow::Result;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::PublicKey;
use bitcoin::secp256k1::Secp256k1;
use bitcoin::secp256k1::SecretKey;
use bitcoin::taproot::LeafVersion;
use bitcoin::Amount;
use bitcoin::Network;
use bitcoin::OutPoint;
use bitcoin::Psbt;
use bitcoin::TapLeafHash;
use bitcoin::TapSighashType;
use bitcoin::Txid;
use bitcoin::XOnlyPublicKey;
use escrow_core::Arbitration;
use escrow_core::Config;
use escrow_core::Contract;
use escrow_core::ContractOrchestrator;
use escrow_core::DraftRequest;
use escrow_core::EventBus;
use escrow_core::Execution;
use escrow_core::ExecutionOrchestrator;
use escrow_core::InMemoryRepository;
use escrow_core::Repository;
use escrow_fsm::EscrowAction;
use escrow_protocol::ProtocolProvider;
use escrow_protocol::VtxoRef;
use std::sync::Arc;

fn keypair(seed: u8) -> (SecretKey, XOnlyPublicKey) {
    let secp = Secp256k1::new();
    let secret_key = SecretKey::from_slice(&[seed; 32]).expect("32 bytes is a valid secret key");
    let public_key = XOnlyPublicKey::from(PublicKey::from_secret_key(&secp, &secret_key));
    (secret_key, public_key)
}

/// Stands in for a real signer: attaches a structurally valid but unverified Schnorr
/// signature under `pubkey` at input 0, the way the coordinator's own fixtures do.
fn fabricate_signature(base: &Psbt, leaf_hash: TapLeafHash, pubkey: XOnlyPublicKey, seed: u8) -> Psbt {
    let mut psbt = base.clone();
    let signature = bitcoin::secp256k1::schnorr::Signature::from_slice(&[seed; 64])
        .expect("64 bytes is a valid schnorr signature");
    psbt.inputs[0].tap_script_sigs.insert(
        (pubkey, leaf_hash),
        bitcoin::taproot::Signature {
            signature,
            sighash_type: TapSighashType::Default,
        },
    );
    psbt
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let (_, sender_pubkey) = keypair(1);
    let (_, receiver_pubkey) = keypair(2);
    let (_, server_pubkey) = keypair(3);
    let (_, arbiter_pubkey) = keypair(4);

    let provider = Arc::new(DemoProvider::new(server_pubkey));
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
        arbitrations,
        executions,
        provider.clone() as Arc<dyn ProtocolProvider>,
        events,
        config,
        network,
    );

    let contract = contract_orchestrator
        .draft(DraftRequest {
            sender_pubkey,
            receiver_pubkey,
            server_pubkey,
            arbiter_pubkey,
            amount: Amount::from_sat(100_000),
            description: Some("demo escrow".to_string()),
            nonce: None,
        })
        .await
        .context("drafting contract")?;
    println!("drafted contract {} at {}", contract.id, contract.escrow_address);

    let contract = contract_orchestrator
        .accept(contract.id, receiver_pubkey)
        .await
        .context("accepting contract")?;
    println!("contract accepted, state = {:?}", contract.state());

    let vtxo = VtxoRef {
        outpoint: OutPoint {
            txid: Txid::all_zeros(),
            vout: 0,
        },
        value: contract.amount,
    };
    provider.fund(&contract.escrow_address.to_string(), vtxo.clone());
    let contract = contract_orchestrator
        .observe_funding(contract.id, vec![vtxo])
        .await
        .context("observing funding")?;
    println!("contract funded, state = {:?}", contract.state());

    let contract = contract_orchestrator
        .update_release_address(contract.id, receiver_pubkey, "bcrt1qdemoreleaseaddress".to_string())
        .await
        .context("setting release address")?;

    let execution = execution_orchestrator
        .initiate(
            contract.id,
            EscrowAction::Settle,
            sender_pubkey,
            "bcrt1qdemoreleaseaddress".to_string(),
        )
        .await
        .context("initiating settlement")?;
    println!("execution {} initiated", execution.external_id);

    let built = escrow_script::build(contract.script_config.clone(), network)?;
    let leaf = built.spending_path("settle")?;
    let leaf_hash = TapLeafHash::from_script(&leaf.leaf_script, LeafVersion::TapScript);

    let base_request = escrow_protocol::BuildTransactionRequest {
        inputs: contract.vtxos.clone(),
        outputs: vec![(
            "bcrt1qdemoreleaseaddress".to_string(),
            contract.funded_amount - config_fee(),
        )],
        leaf: leaf.clone(),
    };
    let base_tx = provider.build_transaction(base_request).await?;

    let signers = [
        (sender_pubkey, 1u8),
        (receiver_pubkey, 2u8),
        (server_pubkey, 3u8),
    ];

    let mut execution = execution;
    for (pubkey, seed) in signers {
        let signed_psbt = fabricate_signature(&base_tx.psbt, leaf_hash, pubkey, seed);
        execution = execution_orchestrator
            .approve(execution.external_id, pubkey, signed_psbt, None)
            .await
            .context("approving execution")?;
        println!("{pubkey} signed, execution status = {:?}", execution.status);
    }

    let contract = contract_orchestrator.get(contract.id).await?;
    println!("final contract state = {:?}", contract.state());

    Ok(())
}

fn config_fee() -> Amount {
    Config::default().fee_policy.fee_for_vsize(200)
}
