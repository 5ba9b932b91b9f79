pub mod batch;
pub mod scanner;

pub use batch::{BatchRunner, RunSummary};
pub use scanner::DirectoryScanner;
