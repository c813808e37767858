//! The fleet dispatcher: client selection policies, a weighted job
//! queue, and failover over a set of [`fleetcast_client::BackendClient`]s.

pub mod dispatcher;
pub mod error;
pub mod events;
pub mod queue;
pub mod selection;
pub mod state;

pub use dispatcher::{JobFilter, Pool, RunOptions};
pub use error::PoolError;
pub use events::DispatcherEvent;
pub use selection::SelectionMode;
