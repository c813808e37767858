//! Shared data model and plumbing for the fleetcast dispatcher: the
//! [`workflow`] tree shape, stable [`ids`], per-backend [`credentials`] and
//! [`os_type`] discovery, and the typed [`hub`] used to fan events out to
//! subscribers.
//!
//! Deliberately the smallest crate in the workspace — it holds only what
//! every other crate needs to agree on, not behavior.

pub mod credentials;
pub mod hub;
pub mod ids;
pub mod os_type;
pub mod workflow;

pub use credentials::Credentials;
pub use hub::EventHub;
pub use ids::{ClientId, PromptId};
pub use os_type::OsType;
pub use workflow::{InputValue, NodeId, Workflow, WorkflowNode};
