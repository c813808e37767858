//! Public facade for the fleetcast workspace.
//!
//! All user code should only need `use fleetcast::prelude::*;` — the
//! individual `fleetcast-*` crates remain addressable directly for callers
//! who want a narrower dependency, but this crate is the one entry point.
//!
//! # Quick-start
//!
//! ```rust,no_run
//! use fleetcast::prelude::*;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // 1. Register a backend and build the dispatcher.
//! let pool = Pool::new(SelectionMode::PickLowest);
//! let client = BackendClient::new(
//!     ClientId::from("gpu-0"),
//!     "http://127.0.0.1:8188",
//!     Credentials::None,
//! );
//! pool.add_client(client).await;
//!
//! // 2. Describe which workflow paths a submission may fill in.
//! let workflow = Workflow::new(); // normally loaded from a saved API-format graph
//! let template = PromptTemplate::new(&workflow, ["checkpoint"], ["images"])
//!     .set_input_node("checkpoint", vec!["4.inputs.ckpt_name".to_string()])?
//!     .set_output_node("images", "9")?;
//!
//! // 3. Dispatch a job; `run` picks a client, submits, and correlates events.
//! let outcome = pool
//!     .run(
//!         move |client: Arc<BackendClient>, _idx: usize| {
//!             let template = template.clone();
//!             async move {
//!                 let template = template
//!                     .input("checkpoint", serde_json::json!("sd_xl_base.safetensors"), None)
//!                     .map_err(|e| PoolError::Execution(e.to_string()))?;
//!                 CallWrapper::new(client, template)
//!                     .run()
//!                     .await
//!                     .map_err(|e| PoolError::Execution(e.to_string()))
//!             }
//!         },
//!         0,
//!         JobFilter::default(),
//!         RunOptions::default(),
//!     )
//!     .await?;
//! println!("{:?}", outcome.get("images"));
//! # Ok(())
//! # }
//! ```

pub mod prelude {
    pub use fleetcast_client::{
        BackendClient, ClientError, ClientEvent, HttpApi, PreviewMime, QueuePosition,
        QueuePromptResponse, QueueSnapshot, QueueStatus,
    };
    pub use fleetcast_lifecycle::{CallWrapper, FailureKind, LifecycleError, Outcome};
    pub use fleetcast_pool::{DispatcherEvent, JobFilter, Pool, PoolError, RunOptions, SelectionMode};
    pub use fleetcast_template::{PathEncoding, PromptTemplate, TemplateError};
    pub use fleetcast_types::{
        ClientId, Credentials, EventHub, InputValue, NodeId, OsType, PromptId, Workflow,
        WorkflowNode,
    };
}

pub use prelude::*;
