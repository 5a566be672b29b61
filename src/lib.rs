//! Theory-of-constraints parallel transfer coordinator: moves large file
//! trees between cloud storage providers by orchestrating an external
//! data mover over its JSON-RPC control API. See the module docs on
//! [`coordinator`] for the orchestration contract.

pub mod classify;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod credential;
pub mod error;
pub mod format;
pub mod logging;
pub mod model;
pub mod mover;
pub mod worker;

pub use error::{Error, Result};
