pub mod memory_cache;
pub mod response_ledger;

pub use memory_cache::{CacheKey, ReadThroughCache};
pub use response_ledger::ResponseLedger;
