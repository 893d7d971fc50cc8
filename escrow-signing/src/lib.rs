//! Merging partial Taproot signatures across a PSBT and its checkpoints, and coordinating
//! collection of those signatures for one execution until it is broadcast-ready.

mod coordinator;
mod error;
mod merge;

pub use coordinator::PartySignature;
pub use coordinator::SigningCoordinator;
pub use coordinator::SigningStatus;
pub use coordinator::UnsignedTx;
pub use error::SigningError;
pub use merge::count_signatures;
pub use merge::has_required_signatures;
pub use merge::merge_checkpoints;
pub use merge::merge_psbt;
