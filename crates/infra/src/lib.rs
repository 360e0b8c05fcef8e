//! Infrastructure layer: collaborator ports, configuration and the engine.

pub mod config;
pub mod engine;
pub mod error;
pub mod store;

mod integration_tests;

pub use config::{CustomAmountCap, EngineConfig};
pub use engine::{Collaborators, InMemoryCollaborators, ReimbursementEngine};
pub use error::{EngineError, StoreError};
