//! Workflow orchestration.
//!
//! Workflows are explicit ordered sequences of step functions threaded
//! through plain context structs — no step framework, no dispatch. Each
//! invocation is stateless and owns nothing beyond its request.

pub mod check_creation;
pub mod compliance;
pub mod fixer_creation;
