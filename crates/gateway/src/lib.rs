//! reka gateway: the orchestrator plus its HTTP and command-line surfaces.

pub mod api;
pub mod bootstrap;
pub mod brain;
pub mod cli;
pub mod state;
