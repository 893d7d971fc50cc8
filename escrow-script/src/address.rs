use crate::ScriptConfigError;
use bech32::Bech32m;
use bech32::Hrp;
use bitcoin::Network;
use bitcoin::XOnlyPublicKey;

fn hrp_for(network: Network) -> Hrp {
    match network {
        Network::Bitcoin => Hrp::parse_unchecked("escrow"),
        _ => Hrp::parse_unchecked("tescrow"),
    }
}

/// A bech32m-encoded escrow address: the protocol server's key plus the Taproot output key
/// derived from a [`crate::ScriptConfig`], bound together so a receiving wallet can verify
/// the server it is trusting for cooperative spending paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscrowAddress {
    network: Network,
    server_pubkey: XOnlyPublicKey,
    vtxo_taproot_key: XOnlyPublicKey,
}

impl EscrowAddress {
    pub fn new(network: Network, server_pubkey: XOnlyPublicKey, vtxo_taproot_key: XOnlyPublicKey) -> Self {
        Self {
            network,
            server_pubkey,
            vtxo_taproot_key,
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn server_pubkey(&self) -> XOnlyPublicKey {
        self.server_pubkey
    }

    pub fn vtxo_taproot_key(&self) -> XOnlyPublicKey {
        self.vtxo_taproot_key
    }

    pub fn encode(&self) -> String {
        let mut data = Vec::with_capacity(64);
        data.extend_from_slice(&self.server_pubkey.serialize());
        data.extend_from_slice(&self.vtxo_taproot_key.serialize());

        bech32::encode::<Bech32m>(hrp_for(self.network), &data)
            .expect("fixed-size payload always encodes")
    }

    pub fn decode(s: &str) -> Result<Self, ScriptConfigError> {
        let (hrp, data) =
            bech32::decode(s).map_err(|e| ScriptConfigError::InvalidAddress(e.to_string()))?;

        let network = if hrp == hrp_for(Network::Bitcoin) {
            Network::Bitcoin
        } else if hrp == hrp_for(Network::Testnet) {
            Network::Testnet
        } else {
            return Err(ScriptConfigError::InvalidAddress(format!(
                "unrecognised address prefix {hrp}"
            )));
        };

        if data.len() != 64 {
            return Err(ScriptConfigError::InvalidAddress(format!(
                "expected 64-byte payload, got {}",
                data.len()
            )));
        }

        let server_pubkey = XOnlyPublicKey::from_slice(&data[..32])
            .map_err(|e| ScriptConfigError::InvalidAddress(format!("bad server key: {e}")))?;
        let vtxo_taproot_key = XOnlyPublicKey::from_slice(&data[32..])
            .map_err(|e| ScriptConfigError::InvalidAddress(format!("bad taproot key: {e}")))?;

        Ok(Self {
            network,
            server_pubkey,
            vtxo_taproot_key,
        })
    }
}

impl std::fmt::Display for EscrowAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn key(seed: u8) -> XOnlyPublicKey {
        let sk = bitcoin::secp256k1::SecretKey::from_slice(&[seed; 32]).unwrap();
        let secp = bitcoin::secp256k1::Secp256k1::new();
        let pk = bitcoin::secp256k1::PublicKey::from_secret_key(&secp, &sk);
        XOnlyPublicKey::from(pk)
    }

    #[test]
    fn round_trips_through_bech32m() {
        let addr = EscrowAddress::new(Network::Testnet, key(1), key(2));
        let encoded = addr.encode();
        let decoded = EscrowAddress::decode(&encoded).unwrap();
        assert_eq!(addr, decoded);
    }

    #[test]
    fn rejects_foreign_prefix() {
        let err = EscrowAddress::decode("bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4")
            .expect_err("not an escrow address");
        assert!(matches!(err, ScriptConfigError::InvalidAddress(_)));
    }

    #[test]
    fn parses_x_only_key() {
        let _ = XOnlyPublicKey::from_str(
            "18845781f631c48f1c9709e23092067d06837f30aa0cd0544ac887fe91ddd166",
        )
        .unwrap();
    }
}
