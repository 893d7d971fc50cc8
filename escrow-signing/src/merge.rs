use crate::SigningError;
use bitcoin::Psbt;

/// Copies every `tap_script_sig` entry from `new` into `base`, input by input. Signature
/// order within an input is not semantically significant, so entries are merged as a set
/// (duplicates by key are simply overwritten with the same value).
pub fn merge_psbt(new: &Psbt, base: &Psbt) -> Result<Psbt, SigningError> {
    if new.inputs.len() != base.inputs.len() {
        return Err(SigningError::InputCountMismatch {
            expected: base.inputs.len(),
            found: new.inputs.len(),
        });
    }

    let mut merged = base.clone();
    for (index, (merged_input, new_input)) in merged.inputs.iter_mut().zip(new.inputs.iter()).enumerate() {
        if new_input.tap_script_sigs.is_empty() {
            return Err(SigningError::NoSignaturesAtInput(index));
        }
        merged_input
            .tap_script_sigs
            .extend(new_input.tap_script_sigs.clone());
    }

    Ok(merged)
}

/// Merges a batch of signed checkpoint PSBTs into the corresponding original checkpoints,
/// matched by the txid of each checkpoint's unsigned transaction (checkpoints are not
/// guaranteed to arrive in the same order they were issued in).
pub fn merge_checkpoints(signed: &[Psbt], original: &[Psbt]) -> Result<Vec<Psbt>, SigningError> {
    if signed.len() != original.len() {
        return Err(SigningError::CheckpointCountMismatch {
            signed: signed.len(),
            original: original.len(),
        });
    }

    original
        .iter()
        .map(|orig| {
            let txid = orig.unsigned_tx.compute_txid();
            let matching = signed
                .iter()
                .find(|s| s.unsigned_tx.compute_txid() == txid)
                .ok_or(SigningError::CheckpointNotFound(txid))?;
            merge_psbt(matching, orig)
        })
        .collect()
}

/// Number of `tap_script_sig` entries recorded at `input_index` (defaults to the sole VTXO
/// input of an ARK transaction).
pub fn count_signatures(psbt: &Psbt, input_index: usize) -> usize {
    psbt.inputs
        .get(input_index)
        .map(|input| input.tap_script_sigs.len())
        .unwrap_or(0)
}

pub fn has_required_signatures(psbt: &Psbt, required: usize, input_index: usize) -> bool {
    count_signatures(psbt, input_index) >= required
}
