//! Utility modules for recon-pipeline

pub mod backup;
pub mod log_printer;
pub mod sleeper;

pub use backup::{backup_path, create_backup};
pub use log_printer::LogPrinter;
pub use sleeper::{RecordingSleeper, Sleeper, TokioSleeper};
