mod handle;
mod types;

pub use handle::ServerInstance;
pub use types::{InstanceData, LifecycleState, StartData};
