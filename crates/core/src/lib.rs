pub mod config;
pub mod context;
pub mod error;
pub mod key;
pub mod node;

pub use config::{load_dotenv, HiveConfig, SchedulerConfig};
pub use context::EventContext;
pub use error::*;
pub use key::DataKey;
pub use node::{AlgorithmId, AlgorithmNode, ResourceClass};
