use thiserror::Error;

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("failed to decode PSBT: {0}")]
    InvalidPsbt(String),
    #[error("input {0} has no tap_script_sig entries to merge")]
    NoSignaturesAtInput(usize),
    #[error("psbt has {expected} inputs but {found} were supplied")]
    InputCountMismatch { expected: usize, found: usize },
    #[error("checkpoint sets differ in length: {signed} signed vs {original} original")]
    CheckpointCountMismatch { signed: usize, original: usize },
    #[error("no checkpoint matching txid {0} was found in the original set")]
    CheckpointNotFound(bitcoin::Txid),
    #[error("{role:?} is not a required signer for this transaction")]
    InvalidSigner { role: escrow_script::Role },
    #[error("{role:?} has already supplied a signature")]
    DuplicateSignature { role: escrow_script::Role },
    #[error("no signature recorded for {role:?}")]
    SignatureNotFound { role: escrow_script::Role },
    #[error("signing is incomplete: still waiting on {0:?}")]
    IncompleteSignatures(Vec<escrow_script::Role>),
}
