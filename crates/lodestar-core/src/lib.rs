pub mod errors;
pub mod instance;
pub mod keys;
pub mod registry;
pub mod store;
pub mod time;

pub use errors::{RegistryError, StoreError};
pub use instance::ServiceInstance;
pub use registry::{ServiceRegistry, DEFAULT_TTL};
pub use store::RegistryStore;
pub use time::{Clock, ManualClock, SystemClock};
