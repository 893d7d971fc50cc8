//! Orchestration layer tying together script compilation, signature coordination, and the
//! escrow state machine into the commands a server or CLI actually issues: draft a
//! contract, accept it, watch it fund, execute it, or dispute it.

mod arbitration;
mod config;
mod contract;
mod error;
mod events;
mod execution;
mod orchestrator;
mod repository;
mod watcher;

pub use arbitration::Arbitration;
pub use arbitration::ArbitrationStatus;
pub use arbitration::Verdict;
pub use config::Config;
pub use config::FeePolicy;
pub use contract::Contract;
pub use contract::ContractKind;
pub use contract::ContractMetadata;
pub use error::Error;
pub use error::ErrorContext;
pub use events::Event;
pub use events::EventBus;
pub use execution::Execution;
pub use execution::ExecutionStatus;
pub use orchestrator::spending_path_for_action;
pub use orchestrator::ArbitrationOrchestrator;
pub use orchestrator::ContractOrchestrator;
pub use orchestrator::DraftRequest;
pub use orchestrator::ExecutionOrchestrator;
pub use repository::Identified;
pub use repository::InMemoryRepository;
pub use repository::Repository;
pub use watcher::FundingWatcher;
