pub mod config;
pub mod executor;
pub mod harvest;
pub mod key;
pub mod model;
pub mod stats;
pub mod store;
pub mod telemetry;
pub mod traits;
pub mod tree;

// Re-export common types for convenience
pub use config::HarvestConfig;
pub use executor::*;
pub use key::ItemTime;
pub use model::*;
pub use stats::{PopularityAggregator, UsageEvent, UsageKind};
pub use store::{ColumnStore, MemoryColumnStore, StoreError, StoringSink};
pub use traits::*;
pub use tree::{find_all_by_tag_name, find_first_by_tag_name, Element, TreeNode};
