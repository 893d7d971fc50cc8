use crate::merge;
use crate::SigningError;
use bitcoin::Psbt;
use escrow_script::Role;
use serde::Deserialize;
use serde::Serialize;

/// One party's contribution: their role, pubkey, and their view of the PSBT with their
/// `tap_script_sig` entries added.
#[derive(Debug, Clone)]
pub struct PartySignature {
    pub role: Role,
    pub signed_psbt: Psbt,
    pub signed_checkpoints: Option<Vec<Psbt>>,
}

/// The unsigned material an execution needs signed, and who must sign it.
#[derive(Debug, Clone)]
pub struct UnsignedTx {
    pub psbt: Psbt,
    pub checkpoints: Vec<Psbt>,
    pub required_signers: Vec<Role>,
}

/// Current progress of a signing round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningStatus {
    pub pending_signers: Vec<Role>,
    pub completed_signers: Vec<Role>,
    pub is_complete: bool,
}

/// Accumulates per-party Schnorr signatures for one ARK transaction (plus its checkpoints)
/// until every required role has signed, then yields a broadcast-ready transaction.
#[derive(Debug, Clone)]
pub struct SigningCoordinator {
    unsigned: UnsignedTx,
    completed: Vec<Role>,
    current_psbt: Psbt,
    current_checkpoints: Vec<Psbt>,
}

impl SigningCoordinator {
    pub fn new(unsigned: UnsignedTx) -> Self {
        let current_psbt = unsigned.psbt.clone();
        let current_checkpoints = unsigned.checkpoints.clone();
        Self {
            unsigned,
            completed: Vec::new(),
            current_psbt,
            current_checkpoints,
        }
    }

    pub fn required_signers(&self) -> &[Role] {
        &self.unsigned.required_signers
    }

    pub fn status(&self) -> SigningStatus {
        let pending_signers = self
            .unsigned
            .required_signers
            .iter()
            .filter(|role| !self.completed.contains(role))
            .copied()
            .collect();
        SigningStatus {
            pending_signers,
            completed_signers: self.completed.clone(),
            is_complete: self.completed.len() == self.unsigned.required_signers.len(),
        }
    }

    pub fn add_signature(&mut self, sig: PartySignature) -> Result<(), SigningError> {
        if !self.unsigned.required_signers.contains(&sig.role) {
            return Err(SigningError::InvalidSigner { role: sig.role });
        }
        if self.completed.contains(&sig.role) {
            return Err(SigningError::DuplicateSignature { role: sig.role });
        }

        self.current_psbt = merge::merge_psbt(&sig.signed_psbt, &self.current_psbt)?;

        if let Some(checkpoints) = &sig.signed_checkpoints {
            self.current_checkpoints =
                merge::merge_checkpoints(checkpoints, &self.current_checkpoints)?;
        }

        self.completed.push(sig.role);

        tracing::info!(
            role = ?sig.role,
            completed = self.completed.len(),
            required = self.unsigned.required_signers.len(),
            "signature recorded"
        );

        Ok(())
    }

    /// Drops a party's contribution and rebuilds the running PSBT from the remaining
    /// signatures. Since signatures are never retained after being merged, the caller must
    /// resupply every remaining party's signature through [`Self::add_signature`] again
    /// after calling this; `remove_signature` only clears bookkeeping and resets the merge
    /// accumulator back to the unsigned transaction.
    pub fn remove_signature(&mut self, role: Role) -> Result<(), SigningError> {
        if !self.completed.contains(&role) {
            return Err(SigningError::SignatureNotFound { role });
        }
        self.completed.retain(|r| *r != role);
        self.current_psbt = self.unsigned.psbt.clone();
        self.current_checkpoints = self.unsigned.checkpoints.clone();
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.completed.len() == self.unsigned.required_signers.len()
    }

    pub fn signed_transaction(&self) -> Result<(Psbt, Vec<Psbt>), SigningError> {
        if !self.is_complete() {
            return Err(SigningError::IncompleteSignatures(
                self.status().pending_signers,
            ));
        }
        Ok((self.current_psbt.clone(), self.current_checkpoints.clone()))
    }
}
