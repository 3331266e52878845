//! Stacks of the weather forecast service
//!
//! A stack is one deployable instance of the service's Azure topology. This
//! crate reads stack settings from `deck.kdl` and renders them into a
//! [`ResourceGraph`](weatherdeck_cloud::ResourceGraph) for the engine.

pub mod error;
pub mod freeze;
pub mod model;
pub mod naming;
pub mod parser;
pub mod topology;

pub use error::{Result, StackError};
pub use freeze::{RenderContext, check_freeze};
pub use model::{Operator, StackSettings, Variant};
pub use naming::{Names, stack_prefix, storage_account_name};
pub use parser::{load_stack, parse_stack_file, parse_stacks};
pub use topology::{PLACEHOLDER_PRINCIPAL_ID, render};
