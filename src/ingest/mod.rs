pub mod tokenizer;
pub mod filter;
pub mod scanner;
pub mod entry;
pub mod driver;

pub use tokenizer::{tokenize, FIELD_COUNT};
pub use filter::{is_eligible, COMMENT_MARKER};
pub use scanner::{scan_file, scan_file_with_timeout, TokenizedLine};
pub use entry::{EmptyCommandPolicy, TaskEntry};
pub use driver::{run, RunSummary, ScanPlan, UserOutcome};
