//! weatherdeck cloud engine
//!
//! This crate holds everything a stack declaration needs to reach a cloud
//! provider: the resource graph, the plan/apply engine, the state file and
//! the provider abstraction.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  deck CLI                        │
//! │        (deck preview / up / destroy)             │
//! └─────────────────┬───────────────────────────────┘
//!                   │ ResourceGraph
//! ┌─────────────────▼───────────────────────────────┐
//! │               weatherdeck-cloud                  │
//! │  ┌──────────────┐  ┌──────────────┐             │
//! │  │    Engine    │  │  State Mgmt  │             │
//! │  │ plan / waves │  │ .weatherdeck │             │
//! │  └──────┬───────┘  └──────────────┘             │
//! │         │ trait CloudProvider                    │
//! └─────────┼───────────────────────────────────────┘
//!           │
//! ┌─────────▼───────┐
//! │      azure      │
//! │  (az CLI)       │
//! └─────────────────┘
//! ```

pub mod action;
pub mod archive;
pub mod engine;
pub mod error;
pub mod graph;
pub mod provider;
pub mod state;

// Re-exports
pub use action::{Action, ActionResult, ActionType, ApplyResult, Plan, PlanSummary};
pub use engine::{Engine, inputs_digest, plan_against};
pub use error::{CloudError, Result};
pub use graph::{
    Fragment, Input, OutputRef, OutputTable, ResourceDecl, ResourceGraph, ResourceId, Resolved,
};
pub use provider::{AuthStatus, CloudProvider, ResourceConfig, ResourceOutputs};
pub use state::{ResourceState, ResourceStatus, StackState, StateLock, StateManager};
