//! Client for the UIT+ HPC service.

pub mod client;
pub mod config;
pub mod dto;
pub mod infrastructure;
pub mod job;
pub mod login;

#[rustfmt::skip]
pub use self::{
    client::{Client, ClientParts, Connection, ScriptSource, Target},
    config::{ConfigOverrides, ConfigResolver, ResolvedConfig, UitConfig},
    job::PbsJob,
};
pub use service::prelude::{ParseOutcome, Table};
