//! Stack management module
//!
//! This module implements the stacked-branch functionality on top of the
//! state store:
//! - Graph queries over parent links (ordering, heritage)
//! - Restacking with resumable conflict handling
//! - Branch registration, submission and pull request mirroring

pub mod graph;
pub mod remote;
pub mod restack;
pub mod service;
pub mod sync_state;

pub use graph::HeritageEntry;
pub use restack::{
    RestackConflict, RestackGit, RestackManager, RestackReport, RestackSummary,
};
pub use service::StackService;
pub use sync_state::RestackState;
