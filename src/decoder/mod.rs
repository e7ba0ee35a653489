pub mod classifier;
pub mod lexicon;
pub mod record;

pub use classifier::classify;
pub use lexicon::{lookup_command, lookup_status, status_or_unknown, StatusEntry, UNKNOWN_STATUS};
pub use record::*;
