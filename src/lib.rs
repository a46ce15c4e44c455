//! profhub core library: record store, HTTP API, remote fetch and command runner.

mod api;
mod config;
mod duration;
mod error;
mod exec;
mod export;
mod fetch;
mod model;
mod server;
mod store;
mod validation;

pub use api::*;
pub use config::*;
pub use duration::*;
pub use error::*;
pub use exec::*;
pub use export::*;
pub use fetch::*;
pub use model::*;
pub use server::*;
pub use store::*;
pub use validation::*;
