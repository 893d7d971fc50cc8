mod arbitration;
mod contract;
mod execution;

pub use arbitration::ArbitrationOrchestrator;
pub use contract::spending_path_for_action;
pub use contract::ContractOrchestrator;
pub use contract::DraftRequest;
pub use execution::ExecutionOrchestrator;
