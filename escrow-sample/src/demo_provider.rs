use async_trait::async_trait;
use bitcoin::absolute::LockTime;
use bitcoin::psbt::Psbt;
use bitcoin::script::PushBytesBuf;
use bitcoin::transaction::Version;
use bitcoin::Network;
use bitcoin::ScriptBuf;
use bitcoin::Sequence;
use bitcoin::Transaction;
use bitcoin::TxIn;
use bitcoin::TxOut;
use bitcoin::Txid;
use bitcoin::Witness;
use bitcoin::XOnlyPublicKey;
use escrow_protocol::BuildTransactionRequest;
use escrow_protocol::BuiltTransaction;
use escrow_protocol::Info;
use escrow_protocol::ProtocolError;
use escrow_protocol::ProtocolProvider;
use escrow_protocol::SubmitResult;
use escrow_protocol::VtxoRef;
use escrow_protocol::VtxoStream;
use futures::channel::mpsc;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    coins: HashMap<String, Vec<VtxoRef>>,
    watchers: HashMap<String, Vec<mpsc::UnboundedSender<Vec<VtxoRef>>>>,
}

/// An in-memory stand-in for an ARK server, just enough to carry a demo contract from
/// funding through settlement: it echoes back whatever VTXOs it was told about and builds
/// unsigned transactions without enforcing real consensus rules.
pub struct DemoProvider {
    server_pubkey: XOnlyPublicKey,
    inner: Mutex<Inner>,
}

impl DemoProvider {
    pub fn new(server_pubkey: XOnlyPublicKey) -> Self {
        Self {
            server_pubkey,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Credits `address` with a VTXO and notifies anyone watching it.
    pub fn fund(&self, address: &str, vtxo: VtxoRef) {
        let mut inner = self.inner.lock().expect("demo provider mutex poisoned");
        let snapshot = {
            let entry = inner.coins.entry(address.to_string()).or_default();
            entry.push(vtxo);
            entry.clone()
        };
        if let Some(senders) = inner.watchers.get(address) {
            for sender in senders {
                let _ = sender.unbounded_send(snapshot.clone());
            }
        }
    }
}

#[async_trait]
impl ProtocolProvider for DemoProvider {
    async fn get_info(&self) -> Result<Info, ProtocolError> {
        Ok(Info {
            name: "escrow-sample".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            network: Network::Regtest,
            server_pubkey: self.server_pubkey,
            address_prefix: "tescrow".to_string(),
            unilateral_exit_delay: Some(144),
        })
    }

    async fn get_spendable_coins(&self, address: &str) -> Result<Vec<VtxoRef>, ProtocolError> {
        let inner = self.inner.lock().expect("demo provider mutex poisoned");
        Ok(inner.coins.get(address).cloned().unwrap_or_default())
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
            .map(|(destination, amount)| {
                let marker: Vec<u8> = destination.bytes().take(40).collect();
                let push = PushBytesBuf::try_from(marker).unwrap_or_default();
                TxOut {
                    value: *amount,
                    script_pubkey: ScriptBuf::new_op_return(push),
                }
            })
            .collect();

        let tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input,
            output,
        };

        let psbt = Psbt::from_unsigned_tx(tx).map_err(|err| ProtocolError::Malformed(err.to_string()))?;

        Ok(BuiltTransaction {
            psbt,
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

    fn watch_address(&self, address: String) -> VtxoStream {
        let (sender, receiver) = mpsc::unbounded();
        let mut inner = self.inner.lock().expect("demo provider mutex poisoned");
        if let Some(existing) = inner.coins.get(&address) {
            let _ = sender.unbounded_send(existing.clone());
        }
        inner.watchers.entry(address).or_default().push(sender);
        receiver.boxed()
    }
}
