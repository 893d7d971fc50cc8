//! Taproot script construction for escrow spending paths.
//!
//! Given a set of parties and named spending paths, [`build`] deterministically compiles a
//! Taproot output: one leaf per path, assembled into a weight-balanced MAST with the
//! protocol server's key as the internal key.

mod address;
mod build;
mod error;
mod types;

pub use address::EscrowAddress;
pub use build::build;
pub use build::validate;
pub use build::BuiltScript;
pub use build::LeafHandle;
pub use error::ScriptConfigError;
pub use types::Party;
pub use types::PathKind;
pub use types::Role;
pub use types::ScriptConfig;
pub use types::SpendingPath;
pub use types::Timelock;
pub use types::TimelockKind;

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::secp256k1::PublicKey;
    use bitcoin::secp256k1::Secp256k1;
    use bitcoin::secp256k1::SecretKey;
    use bitcoin::Network;
    use bitcoin::XOnlyPublicKey;

    fn key(seed: u8) -> XOnlyPublicKey {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(&[seed; 32]).unwrap();
        XOnlyPublicKey::from(PublicKey::from_secret_key(&secp, &sk))
    }

    fn sample_config(nonce: Option<Vec<u8>>) -> ScriptConfig {
        ScriptConfig {
            parties: vec![
                Party {
                    role: Role::Sender,
                    pubkey: key(1),
                    display_name: None,
                },
                Party {
                    role: Role::Receiver,
                    pubkey: key(2),
                    display_name: None,
                },
                Party {
                    role: Role::Server,
                    pubkey: key(3),
                    display_name: None,
                },
                Party {
                    role: Role::Arbiter,
                    pubkey: key(3),
                    display_name: None,
                },
            ],
            spending_paths: vec![
                SpendingPath {
                    name: "settle".to_string(),
                    description: None,
                    kind: PathKind::Multisig,
                    required_roles: vec![Role::Sender, Role::Receiver, Role::Server],
                    threshold: 3,
                    timelock: None,
                    preimage_hash: None,
                },
                SpendingPath {
                    name: "refund".to_string(),
                    description: None,
                    kind: PathKind::Multisig,
                    required_roles: vec![Role::Sender, Role::Arbiter, Role::Server],
                    threshold: 2,
                    timelock: None,
                    preimage_hash: None,
                },
                SpendingPath {
                    name: "unilateral-refund".to_string(),
                    description: None,
                    kind: PathKind::CsvMultisig,
                    required_roles: vec![Role::Sender, Role::Arbiter],
                    threshold: 2,
                    timelock: Some(Timelock::blocks(144)),
                    preimage_hash: None,
                },
            ],
            nonce,
            protocol_server_key: key(3),
        }
    }

    #[test]
    fn build_is_deterministic() {
        let a = build(sample_config(None), Network::Testnet).unwrap();
        let b = build(sample_config(None), Network::Testnet).unwrap();
        assert_eq!(a.address().encode(), b.address().encode());
        assert_eq!(a.leaf_scripts(), b.leaf_scripts());
    }

    #[test]
    fn nonce_changes_the_address() {
        let plain = build(sample_config(None), Network::Testnet).unwrap();
        let nonced = build(sample_config(Some(vec![1, 2, 3, 4])), Network::Testnet).unwrap();
        assert_ne!(plain.address().encode(), nonced.address().encode());
    }

    #[test]
    fn all_of_n_path_uses_checksigverify_cascade() {
        let built = build(sample_config(None), Network::Testnet).unwrap();
        let script = built.leaf_scripts().get("settle").unwrap();
        let bytes = script.as_bytes();
        // Two CHECKSIGVERIFY opcodes followed by a final CHECKSIG.
        let verify_count = bytes
            .iter()
            .filter(|b| **b == bitcoin::opcodes::all::OP_CHECKSIGVERIFY.to_u8())
            .count();
        assert_eq!(verify_count, 2);
        assert!(bytes.ends_with(&[bitcoin::opcodes::all::OP_CHECKSIG.to_u8()]));
    }

    #[test]
    fn threshold_path_uses_checksigadd_accumulator() {
        let built = build(sample_config(None), Network::Testnet).unwrap();
        let script = built.leaf_scripts().get("refund").unwrap();
        let bytes = script.as_bytes();
        assert!(bytes.contains(&bitcoin::opcodes::all::OP_CHECKSIGADD.to_u8()));
        assert!(bytes.contains(&bitcoin::opcodes::all::OP_GREATERTHANOREQUAL.to_u8()));
    }

    #[test]
    fn csv_path_prepends_relative_locktime_check() {
        let built = build(sample_config(None), Network::Testnet).unwrap();
        let script = built.leaf_scripts().get("unilateral-refund").unwrap();
        let bytes = script.as_bytes();
        let csv_pos = bytes
            .iter()
            .position(|b| *b == bitcoin::opcodes::all::OP_CSV.to_u8())
            .expect("CSV opcode present");
        assert_eq!(bytes[csv_pos + 1], bitcoin::opcodes::all::OP_DROP.to_u8());
        assert!(csv_pos > 0, "a locktime value is pushed before OP_CSV");
    }

    #[test]
    fn spending_path_yields_control_block() {
        let built = build(sample_config(None), Network::Testnet).unwrap();
        let handle = built.spending_path("settle").unwrap();
        assert_eq!(handle.threshold, 3);
        assert!(built
            .taproot_spend_info()
            .control_block(&(
                handle.leaf_script.clone(),
                bitcoin::taproot::LeafVersion::TapScript
            ))
            .is_some());
    }

    #[test]
    fn rejects_threshold_exceeding_roles() {
        let mut config = sample_config(None);
        config.spending_paths[0].threshold = 10;
        let err = validate(&config).unwrap_err();
        assert!(matches!(
            err,
            ScriptConfigError::ThresholdExceedsRoles { .. }
        ));
    }

    #[test]
    fn rejects_csv_multisig_without_timelock() {
        let mut config = sample_config(None);
        config.spending_paths[1].kind = PathKind::CsvMultisig;
        let err = validate(&config).unwrap_err();
        assert!(matches!(err, ScriptConfigError::MissingTimelock(_)));
    }

    #[test]
    fn rejects_unknown_role_reference() {
        let mut config = sample_config(None);
        config.parties.truncate(3);
        let err = validate(&config).unwrap_err();
        assert!(matches!(err, ScriptConfigError::UnknownRole { .. }));
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = sample_config(Some(vec![9, 9]));
        let json = serde_json::to_string(&config).unwrap();
        let parsed: ScriptConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, parsed);
    }
}
