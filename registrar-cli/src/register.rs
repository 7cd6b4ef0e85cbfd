//! `register` and `deregister` command implementations.

use std::io::Write;

use camino::Utf8PathBuf;
use clap::Parser;
use log::info;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use registrar_core::ReplaceHint;
use registrar_data::{RegistrationOutcome, ResourceKind};
use serde::{Deserialize, Serialize};

use crate::{
    ARG_IDENTIFIER, ARG_SOURCE_URL, ARG_TARGET, ARG_TYPE, CliError, ENV_IDENTIFIER, ENV_TARGET,
    ENV_TYPE,
    catalog::{CatalogConfig, SourceLocation},
};

/// CLI arguments for the `register` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Read a resource from the configured source, normalize it \
                 into catalogue records and upsert them into the catalog \
                 database. The resource type selects the backend.",
    about = "Register a resource in the catalog"
)]
#[ortho_config(prefix = "REGISTRAR")]
pub(crate) struct RegisterArgs {
    /// Path or URL of the resource, relative to the source.
    #[arg(value_name = "target")]
    #[serde(default)]
    pub(crate) target: Option<String>,
    /// Resource type: item, collection, cwl, ades, processes, catalogue, iso or json.
    #[arg(long = ARG_TYPE, value_name = "type")]
    #[serde(default)]
    pub(crate) kind: Option<String>,
    /// SQLite catalog database (default `catalog.db`).
    #[arg(long, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Local directory registration inputs are read from (default `.`).
    #[arg(long, value_name = "dir")]
    #[serde(default)]
    pub(crate) source_root: Option<Utf8PathBuf>,
    /// HTTP(S) base URL registration inputs are read from.
    #[arg(long = ARG_SOURCE_URL, value_name = "url")]
    #[serde(default)]
    pub(crate) source_url: Option<String>,
    /// Base URL of distributed assets.
    #[arg(long, value_name = "url")]
    #[serde(default)]
    pub(crate) base_url: Option<String>,
    /// Map and coverage service endpoint for derived links.
    #[arg(long, value_name = "url")]
    #[serde(default)]
    pub(crate) ows_url: Option<String>,
    /// Public base URL of registered documents.
    #[arg(long, value_name = "url")]
    #[serde(default)]
    pub(crate) public_url: Option<String>,
    /// Known collection identifiers, comma separated.
    #[arg(long, value_name = "ids", value_delimiter = ',')]
    #[serde(default)]
    pub(crate) collections: Vec<String>,
}

/// Build the catalog settings from the fields every registration command
/// carries.
macro_rules! catalog_config {
    ($args:expr) => {
        CatalogConfig::new(
            $args.database,
            SourceLocation::resolve($args.source_root, $args.source_url)?,
            $args.base_url,
            $args.ows_url,
            $args.public_url,
            $args.collections,
        )
    };
}
pub(crate) use catalog_config;

impl RegisterArgs {
    pub(crate) fn into_config(self) -> Result<RegisterConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        RegisterConfig::try_from(merged)
    }
}

/// Resolved `register` command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RegisterConfig {
    pub(crate) target: String,
    pub(crate) kind: ResourceKind,
    pub(crate) catalog: CatalogConfig,
}

impl TryFrom<RegisterArgs> for RegisterConfig {
    type Error = CliError;

    fn try_from(args: RegisterArgs) -> Result<Self, Self::Error> {
        let target = args.target.ok_or(CliError::MissingArgument {
            field: ARG_TARGET,
            env: ENV_TARGET,
        })?;
        let kind = args
            .kind
            .ok_or(CliError::MissingArgument {
                field: ARG_TYPE,
                env: ENV_TYPE,
            })?
            .parse::<ResourceKind>()?;
        Ok(Self {
            target,
            kind,
            catalog: catalog_config!(args),
        })
    }
}

/// CLI arguments for the `deregister` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(about = "Remove a record from the catalog")]
#[ortho_config(prefix = "REGISTRAR")]
pub(crate) struct DeregisterArgs {
    /// Identifier of the record to remove.
    #[arg(value_name = "identifier")]
    #[serde(default)]
    pub(crate) identifier: Option<String>,
    /// Resource type the record was registered as (default `item`).
    #[arg(long = ARG_TYPE, value_name = "type")]
    #[serde(default)]
    pub(crate) kind: Option<String>,
    /// SQLite catalog database (default `catalog.db`).
    #[arg(long, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Local directory registration inputs are read from (default `.`).
    #[arg(long, value_name = "dir")]
    #[serde(default)]
    pub(crate) source_root: Option<Utf8PathBuf>,
    /// HTTP(S) base URL registration inputs are read from.
    #[arg(long = ARG_SOURCE_URL, value_name = "url")]
    #[serde(default)]
    pub(crate) source_url: Option<String>,
    /// Base URL of distributed assets.
    #[arg(long, value_name = "url")]
    #[serde(default)]
    pub(crate) base_url: Option<String>,
    /// Map and coverage service endpoint for derived links.
    #[arg(long, value_name = "url")]
    #[serde(default)]
    pub(crate) ows_url: Option<String>,
    /// Public base URL of registered documents.
    #[arg(long, value_name = "url")]
    #[serde(default)]
    pub(crate) public_url: Option<String>,
    /// Known collection identifiers, comma separated.
    #[arg(long, value_name = "ids", value_delimiter = ',')]
    #[serde(default)]
    pub(crate) collections: Vec<String>,
}

impl DeregisterArgs {
    pub(crate) fn into_config(self) -> Result<DeregisterConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        DeregisterConfig::try_from(merged)
    }
}

/// Resolved `deregister` command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DeregisterConfig {
    pub(crate) identifier: String,
    pub(crate) kind: ResourceKind,
    pub(crate) catalog: CatalogConfig,
}

impl TryFrom<DeregisterArgs> for DeregisterConfig {
    type Error = CliError;

    fn try_from(args: DeregisterArgs) -> Result<Self, Self::Error> {
        let identifier = args.identifier.ok_or(CliError::MissingArgument {
            field: ARG_IDENTIFIER,
            env: ENV_IDENTIFIER,
        })?;
        let kind = args
            .kind
            .as_deref()
            .map_or(Ok(ResourceKind::Item), str::parse)?;
        Ok(Self {
            identifier,
            kind,
            catalog: catalog_config!(args),
        })
    }
}

pub(crate) fn run_register(args: RegisterArgs, writer: &mut dyn Write) -> Result<(), CliError> {
    let config = args.into_config()?;
    let registrar = config.catalog.open()?;
    let outcome = registrar.register(config.kind, &config.target, ReplaceHint::Replace)?;
    write_outcome(writer, &config.target, &outcome)
}

fn write_outcome(
    writer: &mut dyn Write,
    target: &str,
    outcome: &RegistrationOutcome,
) -> Result<(), CliError> {
    match outcome {
        RegistrationOutcome::Registered { identifiers } => {
            for identifier in identifiers {
                writeln!(writer, "registered {identifier}").map_err(CliError::WriteOutput)?;
            }
        }
        RegistrationOutcome::NotHarvested => {
            writeln!(writer, "nothing harvested from {target}").map_err(CliError::WriteOutput)?;
        }
    }
    Ok(())
}

pub(crate) fn run_deregister(args: DeregisterArgs, writer: &mut dyn Write) -> Result<(), CliError> {
    let config = args.into_config()?;
    let registrar = config.catalog.open()?;
    let removed = registrar.deregister(config.kind, &config.identifier)?;
    info!("removed {removed} record(s) for {}", config.identifier);
    writeln!(writer, "deregistered {} ({removed} removed)", config.identifier)
        .map_err(CliError::WriteOutput)
}

#[cfg(test)]
pub(crate) fn register_config_from_layers_for_test(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<RegisterConfig, CliError> {
    let merged = RegisterArgs::merge_from_layers(layers).map_err(CliError::from)?;
    RegisterConfig::try_from(merged)
}
