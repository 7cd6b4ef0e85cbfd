//! Command-line interface for the EO metadata registrar.
#![forbid(unsafe_code)]

use std::io::Write;

use clap::{Parser, Subcommand};
use log::debug;

mod catalog;
mod error;
mod harvest;
mod register;
mod serve;

pub use error::CliError;

use harvest::HarvestArgs;
use register::{DeregisterArgs, RegisterArgs};
use serve::ServeArgs;

pub(crate) const ARG_TARGET: &str = "target";
pub(crate) const ENV_TARGET: &str = "REGISTRAR_TARGET";
pub(crate) const ARG_TYPE: &str = "type";
pub(crate) const ENV_TYPE: &str = "REGISTRAR_KIND";
pub(crate) const ARG_IDENTIFIER: &str = "identifier";
pub(crate) const ENV_IDENTIFIER: &str = "REGISTRAR_IDENTIFIER";
pub(crate) const ARG_SOURCE_URL: &str = "source-url";
pub(crate) const ARG_CATALOGUE_URL: &str = "catalogue-url";
pub(crate) const ENV_CATALOGUE_URL: &str = "REGISTRAR_CATALOGUE_URL";
pub(crate) const ARG_WAIT_TIME: &str = "wait-time";
pub(crate) const ARG_TIME_LIMIT: &str = "time-limit";

/// Run the registrar CLI with the current process arguments and environment.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    let mut stdout = std::io::stdout().lock();
    run_command(cli.command, &mut stdout)
}

fn run_command(command: Command, writer: &mut dyn Write) -> Result<(), CliError> {
    match command {
        Command::Register(args) => {
            init_logging();
            register::run_register(args, writer)
        }
        Command::Deregister(args) => {
            init_logging();
            register::run_deregister(args, writer)
        }
        Command::Harvest(args) => {
            init_logging();
            harvest::run_harvest(args, writer)
        }
        Command::Serve(args) => {
            init_tracing();
            serve::run_serve(args)
        }
    }
}

fn init_logging() {
    let env = env_logger::Env::default().default_filter_or("info");
    if let Err(err) = env_logger::Builder::from_env(env).try_init() {
        debug!("logger already installed: {err}");
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if let Err(err) = tracing_subscriber::fmt().with_env_filter(filter).try_init() {
        debug!("tracing subscriber already installed: {err}");
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "registrar",
    about = "Register EO products, workflows and services in a metadata catalog",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Register a resource in the catalog.
    Register(RegisterArgs),
    /// Remove a record from the catalog.
    Deregister(DeregisterArgs),
    /// Describe a remote catalogue as an ISO record.
    Harvest(HarvestArgs),
    /// Run the HTTP registration gateway.
    Serve(ServeArgs),
}

#[cfg(test)]
mod tests;
