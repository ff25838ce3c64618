pub mod console;
pub mod ledger;
pub mod normalizer;
pub mod poller;
pub mod refresh;
pub mod retriever;
pub mod scheduler;
pub mod store;
pub mod submitter;

pub use console::InvoiceConsole;
pub use ledger::CancellationLedger;
pub use poller::ResolutionPoller;
pub use refresh::AutoRefresh;
pub use retriever::InvoiceRetriever;
pub use scheduler::{LoopBudget, LoopExit, Scheduler};
pub use store::InvoiceStore;
pub use submitter::CancellationSubmitter;
