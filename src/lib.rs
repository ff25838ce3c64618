pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod pac;
pub mod service;

pub use config::AppConfig;
pub use error::{CancellationError, PacError, RetrievalError};
pub use pac::{HttpPacClient, PacGateway};
pub use service::InvoiceConsole;
