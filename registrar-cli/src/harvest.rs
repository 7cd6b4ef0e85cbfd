//! `harvest` command implementation.

use std::io::Write;

use chrono::Utc;
use clap::Parser;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use registrar_core::to_iso_xml;
use registrar_data::{HttpFetch, NormalizeContext, ReqwestFetcher, detect_and_harvest};
use serde::{Deserialize, Serialize};

use crate::{ARG_CATALOGUE_URL, CliError, ENV_CATALOGUE_URL};

/// CLI arguments for the `harvest` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Probe a remote catalogue for OGC API - Records, CSW, \
                 STAC and OpenSearch in turn and print the description of \
                 the first protocol that answers as an ISO 19139 record.",
    about = "Describe a remote catalogue as an ISO record"
)]
#[ortho_config(prefix = "REGISTRAR")]
pub(crate) struct HarvestArgs {
    /// Base URL of the remote catalogue.
    #[arg(value_name = "url")]
    #[serde(default)]
    pub(crate) catalogue_url: Option<String>,
}

impl HarvestArgs {
    pub(crate) fn into_catalogue_url(self) -> Result<String, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        merged.catalogue_url.ok_or(CliError::MissingArgument {
            field: ARG_CATALOGUE_URL,
            env: ENV_CATALOGUE_URL,
        })
    }
}

pub(crate) fn run_harvest(args: HarvestArgs, writer: &mut dyn Write) -> Result<(), CliError> {
    let base_url = args.into_catalogue_url()?;
    let fetcher = ReqwestFetcher::new()?;
    harvest_with(&fetcher, &base_url, writer)
}

pub(crate) fn harvest_with(
    fetcher: &dyn HttpFetch,
    base_url: &str,
    writer: &mut dyn Write,
) -> Result<(), CliError> {
    let description = detect_and_harvest(fetcher, base_url).ok_or_else(|| {
        CliError::NotHarvested {
            url: base_url.to_owned(),
        }
    })?;
    let record = description.into_record(&NormalizeContext::new(Utc::now()));
    let xml = to_iso_xml(&record).map_err(CliError::EncodeIso)?;
    writer
        .write_all(xml.as_bytes())
        .map_err(CliError::WriteOutput)?;
    writer.write_all(b"\n").map_err(CliError::WriteOutput)?;
    Ok(())
}
