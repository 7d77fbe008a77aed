pub mod command_mutator;
pub mod ledger;
pub mod mutation;
pub mod progress;
pub mod scanner;

pub use command_mutator::CommandMutator;
pub use ledger::Ledger;
pub use mutation::{DocumentMutator, StopSignal};
pub use progress::ProgressAggregator;
pub use scanner::{CandidateScanner, ScanSummary};
