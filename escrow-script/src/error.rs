use thiserror::Error;

/// Errors raised while validating a [`crate::ScriptConfig`] or building its scripts.
#[derive(Debug, Error)]
pub enum ScriptConfigError {
    #[error("duplicate party role {0:?}")]
    DuplicatePartyRole(crate::Role),
    #[error("duplicate spending path name {0:?}")]
    DuplicatePathName(String),
    #[error("spending path {name:?} references unknown role {role:?}")]
    UnknownRole { name: String, role: crate::Role },
    #[error("spending path {name:?} has threshold {threshold} exceeding {roles} required roles")]
    ThresholdExceedsRoles {
        name: String,
        threshold: u8,
        roles: usize,
    },
    #[error("spending path {name:?} has threshold 0")]
    ZeroThreshold { name: String },
    #[error("csv-multisig spending path {0:?} is missing a timelock")]
    MissingTimelock(String),
    #[error("hash-preimage spending path {0:?} is missing a preimage hash")]
    MissingPreimageHash(String),
    #[error("spending path {0:?} not found in this configuration")]
    UnknownPath(String),
    #[error("taproot construction failed: {0}")]
    Taproot(String),
    #[error("invalid escrow address: {0}")]
    InvalidAddress(String),
}
