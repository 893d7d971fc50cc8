use crate::PathKind;
use crate::Role;
use crate::ScriptConfig;
use crate::ScriptConfigError;
use crate::SpendingPath;
use bitcoin::opcodes::all::*;
use bitcoin::taproot::ControlBlock;
use bitcoin::taproot::TaprootBuilder;
use bitcoin::taproot::TaprootSpendInfo;
use bitcoin::ScriptBuf;
use bitcoin::XOnlyPublicKey;
use std::collections::BTreeMap;

const GHOST_LEAF_NAME: &str = "__ghost__";

/// A leaf script with everything needed to satisfy it in a PSBT input.
#[derive(Debug, Clone)]
pub struct LeafHandle {
    pub leaf_script: ScriptBuf,
    pub control_block: ControlBlock,
    pub required_roles: Vec<Role>,
    pub threshold: u8,
    pub timelock: Option<crate::Timelock>,
}

/// The compiled Taproot output for a [`ScriptConfig`]: every named leaf plus the resulting
/// address. Deterministic in the config alone.
#[derive(Debug, Clone)]
pub struct BuiltScript {
    config: ScriptConfig,
    leaf_scripts: BTreeMap<String, ScriptBuf>,
    taproot_spend_info: TaprootSpendInfo,
    address: crate::EscrowAddress,
}

impl BuiltScript {
    pub fn leaf_scripts(&self) -> &BTreeMap<String, ScriptBuf> {
        &self.leaf_scripts
    }

    pub fn address(&self) -> &crate::EscrowAddress {
        &self.address
    }

    pub fn taproot_spend_info(&self) -> &TaprootSpendInfo {
        &self.taproot_spend_info
    }

    pub fn script_pubkey(&self) -> ScriptBuf {
        let output_key = self.taproot_spend_info.output_key();
        ScriptBuf::builder()
            .push_opcode(OP_PUSHNUM_1)
            .push_slice(output_key.serialize())
            .into_script()
    }

    /// Returns everything needed to spend the named path: the leaf script and its control
    /// block inside the Taproot tree.
    pub fn spending_path(&self, name: &str) -> Result<LeafHandle, ScriptConfigError> {
        let path = self
            .config
            .spending_paths
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| ScriptConfigError::UnknownPath(name.to_string()))?;

        let leaf_script = self
            .leaf_scripts
            .get(name)
            .expect("every spending path produced a leaf script during build")
            .clone();

        let control_block = self
            .taproot_spend_info
            .control_block(&(leaf_script.clone(), bitcoin::taproot::LeafVersion::TapScript))
            .ok_or_else(|| {
                ScriptConfigError::Taproot(format!("no control block found for path {name:?}"))
            })?;

        Ok(LeafHandle {
            leaf_script,
            control_block,
            required_roles: path.required_roles.clone(),
            threshold: path.threshold,
            timelock: path.timelock,
        })
    }
}

/// Weight-balanced Taproot tree assembly: leaves with equal weight end up at the same
/// approximate depth, keeping the common paths cheap to spend.
#[derive(Debug, Clone)]
enum TreeNode {
    Leaf { name: String, script: ScriptBuf },
    Branch(Box<TreeNode>, Box<TreeNode>),
}

fn weighted_tree(leaves: Vec<(String, ScriptBuf, u32)>) -> Result<TreeNode, ScriptConfigError> {
    if leaves.is_empty() {
        return Err(ScriptConfigError::Taproot(
            "no spending paths to build".to_string(),
        ));
    }

    let mut queue: Vec<(TreeNode, u32)> = leaves
        .into_iter()
        .map(|(name, script, weight)| (TreeNode::Leaf { name, script }, weight))
        .collect();

    while queue.len() > 1 {
        queue.sort_by(|a, b| b.1.cmp(&a.1));
        let (b, weight_b) = queue.pop().expect("len > 1");
        let (a, weight_a) = queue.pop().expect("len >= 1");
        queue.push((TreeNode::Branch(Box::new(a), Box::new(b)), weight_a + weight_b));
    }

    Ok(queue.into_iter().next().expect("non-empty").0)
}

fn add_to_builder(
    builder: TaprootBuilder,
    node: &TreeNode,
    depth: u8,
) -> Result<TaprootBuilder, ScriptConfigError> {
    match node {
        TreeNode::Leaf { script, .. } => builder
            .add_leaf(depth, script.clone())
            .map_err(|e| ScriptConfigError::Taproot(format!("failed to add leaf: {e}"))),
        TreeNode::Branch(left, right) => {
            let builder = add_to_builder(builder, left, depth + 1)?;
            add_to_builder(builder, right, depth + 1)
        }
    }
}

pub fn validate(config: &ScriptConfig) -> Result<(), ScriptConfigError> {
    let mut seen_roles = std::collections::HashSet::new();
    for party in &config.parties {
        if !seen_roles.insert(party.role) {
            return Err(ScriptConfigError::DuplicatePartyRole(party.role));
        }
    }

    let mut seen_names = std::collections::HashSet::new();
    for path in &config.spending_paths {
        if !seen_names.insert(path.name.clone()) {
            return Err(ScriptConfigError::DuplicatePathName(path.name.clone()));
        }

        if path.threshold == 0 {
            return Err(ScriptConfigError::ZeroThreshold {
                name: path.name.clone(),
            });
        }

        if path.threshold as usize > path.required_roles.len() {
            return Err(ScriptConfigError::ThresholdExceedsRoles {
                name: path.name.clone(),
                threshold: path.threshold,
                roles: path.required_roles.len(),
            });
        }

        for role in &path.required_roles {
            if config.party(*role).is_none() {
                return Err(ScriptConfigError::UnknownRole {
                    name: path.name.clone(),
                    role: *role,
                });
            }
        }

        match path.kind {
            PathKind::CsvMultisig if path.timelock.is_none() => {
                return Err(ScriptConfigError::MissingTimelock(path.name.clone()));
            }
            PathKind::HashPreimage if path.preimage_hash.is_none() => {
                return Err(ScriptConfigError::MissingPreimageHash(path.name.clone()));
            }
            _ => {}
        }
    }

    Ok(())
}

/// Builds the checksig core of a leaf: an all-of-N `CHECKSIGVERIFY` cascade when every
/// required signer must sign, or a BIP-342 `CHECKSIGADD` threshold accumulator otherwise.
/// Pubkeys are ordered by each role's position among `config.parties` so independently
/// constructed signatures combine byte-for-byte identically.
fn checksig_core(
    config: &ScriptConfig,
    path: &SpendingPath,
) -> Result<bitcoin::script::Builder, ScriptConfigError> {
    let mut ordered: Vec<(usize, XOnlyPublicKey)> = path
        .required_roles
        .iter()
        .map(|role| {
            let index = config.role_index(*role).expect("validated above");
            let pubkey = config.party(*role).expect("validated above").pubkey;
            (index, pubkey)
        })
        .collect();
    ordered.sort_by_key(|(index, _)| *index);
    let pubkeys: Vec<XOnlyPublicKey> = ordered.into_iter().map(|(_, pk)| pk).collect();

    let mut builder = ScriptBuf::builder();

    if path.threshold as usize == pubkeys.len() {
        for (i, pubkey) in pubkeys.iter().enumerate() {
            builder = builder.push_x_only_key(pubkey);
            builder = if i + 1 == pubkeys.len() {
                builder.push_opcode(OP_CHECKSIG)
            } else {
                builder.push_opcode(OP_CHECKSIGVERIFY)
            };
        }
    } else {
        for (i, pubkey) in pubkeys.iter().enumerate() {
            builder = builder.push_x_only_key(pubkey);
            builder = if i == 0 {
                builder.push_opcode(OP_CHECKSIG)
            } else {
                builder.push_opcode(OP_CHECKSIGADD)
            };
        }
        builder = builder
            .push_int(path.threshold as i64)
            .push_opcode(OP_GREATERTHANOREQUAL);
    }

    Ok(builder)
}

fn leaf_script(config: &ScriptConfig, path: &SpendingPath) -> Result<ScriptBuf, ScriptConfigError> {
    let mut builder = ScriptBuf::builder();

    if let PathKind::HashPreimage = path.kind {
        let hash = path
            .preimage_hash
            .ok_or_else(|| ScriptConfigError::MissingPreimageHash(path.name.clone()))?;
        builder = builder
            .push_opcode(OP_HASH160)
            .push_slice(hash)
            .push_opcode(OP_EQUAL)
            .push_opcode(OP_VERIFY);
    }

    if let PathKind::CsvMultisig = path.kind {
        let timelock = path
            .timelock
            .ok_or_else(|| ScriptConfigError::MissingTimelock(path.name.clone()))?;
        let sequence = timelock.to_sequence()?;
        builder = builder
            .push_int(sequence.to_consensus_u32() as i64)
            .push_opcode(OP_CSV)
            .push_opcode(OP_DROP);
    }

    let core = checksig_core(config, path)?;
    let mut script = builder.into_script().into_bytes();
    script.extend(core.into_script().into_bytes());

    Ok(ScriptBuf::from_bytes(script))
}

fn ghost_leaf_script(nonce: &[u8]) -> ScriptBuf {
    ScriptBuf::builder()
        .push_opcode(OP_RETURN)
        .push_slice(bitcoin::script::PushBytesBuf::try_from(nonce.to_vec()).unwrap_or_default())
        .into_script()
}

/// Deterministically compiles a [`ScriptConfig`] into its leaf scripts, Taproot tree, and
/// address. Same config in, same output key out; differing only in `nonce` always yields a
/// different output key because the ghost leaf folds the nonce into the tree.
pub fn build(
    config: ScriptConfig,
    network: bitcoin::Network,
) -> Result<BuiltScript, ScriptConfigError> {
    validate(&config)?;

    let mut leaves = Vec::with_capacity(config.spending_paths.len() + 1);
    let mut leaf_scripts = BTreeMap::new();

    for path in &config.spending_paths {
        let script = leaf_script(&config, path)?;
        // Paths requiring fewer signers or no timelock are more likely to be used in
        // practice and are kept shallower in the tree.
        let weight = path.threshold as u32 + path.timelock.map_or(0, |_| 1);
        leaves.push((path.name.clone(), script.clone(), weight));
        leaf_scripts.insert(path.name.clone(), script);
    }

    if let Some(nonce) = &config.nonce {
        let script = ghost_leaf_script(nonce);
        leaves.push((GHOST_LEAF_NAME.to_string(), script.clone(), u32::MAX));
        leaf_scripts.insert(GHOST_LEAF_NAME.to_string(), script);
    }

    let tree = weighted_tree(leaves)?;
    let builder = add_to_builder(TaprootBuilder::new(), &tree, 0)?;

    let secp = bitcoin::secp256k1::Secp256k1::new();
    let taproot_spend_info = builder
        .finalize(&secp, config.protocol_server_key)
        .map_err(|e| ScriptConfigError::Taproot(format!("failed to finalize taproot: {e:?}")))?;

    let address = crate::EscrowAddress::new(
        network,
        config.protocol_server_key,
        taproot_spend_info.output_key().into(),
    );

    tracing::debug!(
        address = %address.encode(),
        paths = config.spending_paths.len(),
        "built escrow script"
    );

    Ok(BuiltScript {
        config,
        leaf_scripts,
        taproot_spend_info,
        address,
    })
}
