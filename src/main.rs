#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

use anyhow::Result;
use clap::Parser;

mod aggregate;
mod cli;
mod client;
mod config;
mod constants;
mod coordinator;
mod ctx;
mod errors;
mod models;
mod subcommands;

#[tokio::main]
async fn main() -> Result<()> {
    cli::Cli::parse().run().await
}
