// feedq Infrastructure - In-process Adapter
// Implements: BackingStore, Connector (tests and single-process runs)

mod broker;
mod connector;
mod store;

pub use broker::MemoryBroker;
pub use connector::{MemoryConnector, MEMORY_URL};
pub use store::MemoryStore;
