use bitcoin::Amount;
use bitcoin::Network;
use bitcoin::OutPoint;
use bitcoin::Psbt;
use bitcoin::Txid;
use bitcoin::XOnlyPublicKey;
use escrow_script::LeafHandle;
use serde::Deserialize;
use serde::Serialize;

/// A reference to one virtual UTXO held at an escrow address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VtxoRef {
    pub outpoint: OutPoint,
    pub value: Amount,
}

/// Static facts about the ARK server backing the protocol provider, mirroring the shape of
/// the server's own info endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Info {
    pub name: String,
    pub version: String,
    pub network: Network,
    #[serde(with = "xonly_hex")]
    pub server_pubkey: XOnlyPublicKey,
    pub address_prefix: String,
    pub unilateral_exit_delay: Option<u32>,
}

/// Inputs and outputs needed to build an unsigned ARK transaction spending from an escrow
/// address over one of its Taproot leaves.
#[derive(Debug, Clone)]
pub struct BuildTransactionRequest {
    pub inputs: Vec<VtxoRef>,
    pub outputs: Vec<(String, Amount)>,
    pub leaf: LeafHandle,
}

/// The server's response to a build request: an unsigned PSBT plus any checkpoint PSBTs
/// that must also be cosigned before the main transaction is accepted.
#[derive(Debug, Clone)]
pub struct BuiltTransaction {
    pub psbt: Psbt,
    pub checkpoints: Vec<Psbt>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResult {
    pub txid: Txid,
}

mod xonly_hex {
    use bitcoin::XOnlyPublicKey;
    use serde::Deserialize;
    use serde::Deserializer;
    use serde::Serializer;
    use std::str::FromStr;

    pub fn serialize<S: Serializer>(key: &XOnlyPublicKey, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&key.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<XOnlyPublicKey, D::Error> {
        let raw = String::deserialize(d)?;
        XOnlyPublicKey::from_str(&raw).map_err(serde::de::Error::custom)
    }
}
