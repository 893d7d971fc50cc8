use bitcoin::XOnlyPublicKey;
use serde::Deserialize;
use serde::Serialize;

/// A participant role in an escrow contract.
///
/// `Server` is the ARK protocol co-signer; `Arbiter` resolves disputes and may coincide with
/// `Server` in demo deployments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    Sender,
    Receiver,
    Server,
    Arbiter,
}

/// One participant and their signing key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub role: Role,
    #[serde(with = "xonly_hex")]
    pub pubkey: XOnlyPublicKey,
    pub display_name: Option<String>,
}

/// A relative timelock expressed the way the fixtures express it: a kind plus a raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelockKind {
    Blocks,
    Seconds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timelock {
    pub kind: TimelockKind,
    pub value: u32,
}

impl Timelock {
    pub fn blocks(value: u32) -> Self {
        Self {
            kind: TimelockKind::Blocks,
            value,
        }
    }

    pub fn seconds(value: u32) -> Self {
        Self {
            kind: TimelockKind::Seconds,
            value,
        }
    }

    pub fn to_sequence(self) -> Result<bitcoin::Sequence, crate::ScriptConfigError> {
        match self.kind {
            TimelockKind::Blocks => {
                if self.value == 0 || self.value > u16::MAX as u32 {
                    return Err(crate::ScriptConfigError::Taproot(format!(
                        "block timelock {} out of range",
                        self.value
                    )));
                }
                Ok(bitcoin::Sequence::from_height(self.value as u16))
            }
            TimelockKind::Seconds => bitcoin::Sequence::from_seconds_ceil(self.value)
                .map_err(|e| crate::ScriptConfigError::Taproot(format!("invalid seconds delay: {e}"))),
        }
    }
}

/// The spending condition one leaf script implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PathKind {
    Multisig,
    CsvMultisig,
    HashPreimage,
}

/// One named leaf script before it is compiled: who must sign, how many of them, and under
/// what extra condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendingPath {
    pub name: String,
    pub description: Option<String>,
    pub kind: PathKind,
    pub required_roles: Vec<Role>,
    pub threshold: u8,
    pub timelock: Option<Timelock>,
    #[serde(default, with = "opt_hash_hex")]
    pub preimage_hash: Option<[u8; 20]>,
}

/// Everything needed to deterministically derive the escrow Taproot output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptConfig {
    pub parties: Vec<Party>,
    pub spending_paths: Vec<SpendingPath>,
    #[serde(default, with = "opt_hex")]
    pub nonce: Option<Vec<u8>>,
    #[serde(with = "xonly_hex")]
    pub protocol_server_key: XOnlyPublicKey,
}

impl ScriptConfig {
    pub(crate) fn party(&self, role: Role) -> Option<&Party> {
        self.parties.iter().find(|p| p.role == role)
    }

    pub(crate) fn role_index(&self, role: Role) -> Option<usize> {
        self.parties.iter().position(|p| p.role == role)
    }
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

mod opt_hex {
    use serde::Deserialize;
    use serde::Deserializer;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => s.serialize_str(&hex::encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        raw.map(|s| hex::decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

mod opt_hash_hex {
    use serde::Deserialize;
    use serde::Deserializer;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Option<[u8; 20]>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => s.serialize_str(&hex::encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<[u8; 20]>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        raw.map(|s| {
            let bytes = hex::decode(s).map_err(serde::de::Error::custom)?;
            let arr: [u8; 20] = bytes
                .try_into()
                .map_err(|_| serde::de::Error::custom("preimage hash must be 20 bytes"))?;
            Ok(arr)
        })
        .transpose()
    }
}
