//! The interface the escrow core needs from whatever drives the underlying ARK protocol:
//! building, submitting, and finalizing transactions, and watching an address for funding.

mod error;
mod types;

pub use error::ProtocolError;
pub use types::BuildTransactionRequest;
pub use types::BuiltTransaction;
pub use types::Info;
pub use types::SubmitResult;
pub use types::VtxoRef;

use async_trait::async_trait;
use bitcoin::Amount;
use bitcoin::Psbt;
use bitcoin::Txid;

pub type VtxoStream = futures::stream::BoxStream<'static, Vec<VtxoRef>>;

/// A swappable backend for everything the escrow core needs from the underlying ARK
/// protocol. Implementations talk to a real server over gRPC/REST; tests use an in-memory
/// double.
#[async_trait]
pub trait ProtocolProvider: Send + Sync {
    async fn get_info(&self) -> Result<Info, ProtocolError>;

    async fn get_spendable_coins(&self, address: &str) -> Result<Vec<VtxoRef>, ProtocolError>;

    async fn get_balance(&self, address: &str) -> Result<Amount, ProtocolError> {
        let coins = self.get_spendable_coins(address).await?;
        Ok(coins.iter().map(|c| c.value).sum())
    }

    async fn build_transaction(
        &self,
        request: BuildTransactionRequest,
    ) -> Result<BuiltTransaction, ProtocolError>;

    async fn submit_transaction(
        &self,
        psbt: Psbt,
        checkpoints: Vec<Psbt>,
    ) -> Result<SubmitResult, ProtocolError>;

    async fn finalize_transaction(
        &self,
        txid: Txid,
        signed_checkpoints: Vec<Psbt>,
    ) -> Result<(), ProtocolError>;

    /// Subscribes to VTXO-set snapshots for `address`. Each item is the full current set of
    /// spendable coins, not a delta, so callers can treat every delivery idempotently.
    fn watch_address(&self, address: String) -> VtxoStream;
}
