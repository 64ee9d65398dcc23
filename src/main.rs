#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

use anyhow::Result;
use clap::Parser;

mod annotation;
mod cli;
mod config;
mod constants;
mod ctx;
mod errors;
mod export;
mod git;
mod host;
mod remote;
mod stack;
mod subcommands;
mod sync;

#[cfg(test)]
mod testing;

#[tokio::main]
async fn main() -> Result<()> {
    cli::Cli::parse().init_tracing_subscriber()?.run().await
}
