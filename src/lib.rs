//! intentbot: a chat bot that turns free-form intent strings into
//! on-chain command executions.
//!
//! Every intent runs through the same sequential pipeline: preview the
//! intent against the command contract, make sure the payment token's
//! allowance covers the previewed amount, submit the command transaction,
//! wait for its receipt, and render a result that states plainly whether
//! any value left the user's account.

pub mod agent;
pub mod bootstrap;
pub mod chain;
pub mod channels;
pub mod cli;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod settings;
pub mod vault;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use error::{Error, Result};
