//! Focused unit tests covering register and deregister configuration.

use super::*;
use crate::catalog::{DEFAULT_DATABASE, SourceLocation};
use crate::register::{DeregisterConfig, RegisterConfig, register_config_from_layers_for_test};
use camino::Utf8PathBuf;
use ortho_config::MergeComposer;
use registrar_data::{RegistrationError, ResourceKind};
use rstest::rstest;
use serde_json::json;

#[rstest]
#[case(None, Some("item"), ARG_TARGET, ENV_TARGET)]
#[case(Some("S2A/item.json"), None, ARG_TYPE, ENV_TYPE)]
fn converting_register_without_required_fields_errors(
    #[case] target: Option<&str>,
    #[case] kind: Option<&str>,
    #[case] field: &'static str,
    #[case] env_var: &'static str,
) {
    let args = RegisterArgs {
        target: target.map(str::to_owned),
        kind: kind.map(str::to_owned),
        ..RegisterArgs::default()
    };
    let err = RegisterConfig::try_from(args).expect_err("missing field should error");
    match err {
        CliError::MissingArgument {
            field: missing,
            env,
        } => {
            assert_eq!(missing, field);
            assert_eq!(env, env_var);
        }
        other => panic!("expected MissingArgument, found {other:?}"),
    }
}

#[rstest]
fn unknown_resource_types_are_rejected() {
    let args = RegisterArgs {
        target: Some("S2A/item.json".to_owned()),
        kind: Some("granule".to_owned()),
        ..RegisterArgs::default()
    };
    let err = RegisterConfig::try_from(args).expect_err("unknown type should error");
    match err {
        CliError::Registration(RegistrationError::UnknownKind { kind }) => {
            assert_eq!(kind, "granule");
        }
        other => panic!("expected UnknownKind, found {other:?}"),
    }
}

#[rstest]
fn register_defaults_to_a_local_source_and_catalog_db() {
    let args = RegisterArgs {
        target: Some("S2A/item.json".to_owned()),
        kind: Some("STAC-Item".to_owned()),
        collections: vec!["S2MSI1C".to_owned(), "S2MSI2A".to_owned()],
        ..RegisterArgs::default()
    };
    let config = RegisterConfig::try_from(args).expect("config should build");
    assert_eq!(config.kind, ResourceKind::Item);
    assert_eq!(config.catalog.database, Utf8PathBuf::from(DEFAULT_DATABASE));
    assert_eq!(
        config.catalog.source,
        SourceLocation::Local(Utf8PathBuf::from("."))
    );
    let ctx = config.catalog.context();
    assert!(ctx.is_known_collection("S2MSI2A"));
}

#[rstest]
fn source_url_takes_precedence_over_the_local_root() {
    let args = RegisterArgs {
        target: Some("S2A/item.json".to_owned()),
        kind: Some("item".to_owned()),
        source_root: Some(Utf8PathBuf::from("/data")),
        source_url: Some("https://data.example.com/products/".to_owned()),
        ..RegisterArgs::default()
    };
    let config = RegisterConfig::try_from(args).expect("config should build");
    match config.catalog.source {
        SourceLocation::Http(url) => assert_eq!(url.host_str(), Some("data.example.com")),
        SourceLocation::Local(root) => panic!("expected an HTTP source, found {root}"),
    }
}

#[rstest]
fn invalid_source_urls_are_reported() {
    let args = RegisterArgs {
        target: Some("S2A/item.json".to_owned()),
        kind: Some("item".to_owned()),
        source_url: Some("not a url".to_owned()),
        ..RegisterArgs::default()
    };
    let err = RegisterConfig::try_from(args).expect_err("bad URL should error");
    match err {
        CliError::InvalidUrl { field, .. } => assert_eq!(field, ARG_SOURCE_URL),
        other => panic!("expected InvalidUrl, found {other:?}"),
    }
}

#[rstest]
fn deregister_defaults_to_items() {
    let args = DeregisterArgs {
        identifier: Some("S2A_MSIL1C_20240501".to_owned()),
        ..DeregisterArgs::default()
    };
    let config = DeregisterConfig::try_from(args).expect("config should build");
    assert_eq!(config.kind, ResourceKind::Item);
    assert_eq!(config.identifier, "S2A_MSIL1C_20240501");
}

#[rstest]
fn deregister_requires_an_identifier() {
    let err = DeregisterConfig::try_from(DeregisterArgs::default())
        .expect_err("missing identifier should error");
    match err {
        CliError::MissingArgument { field, env } => {
            assert_eq!(field, ARG_IDENTIFIER);
            assert_eq!(env, ENV_IDENTIFIER);
        }
        other => panic!("expected MissingArgument, found {other:?}"),
    }
}

#[rstest]
fn merge_layers_honours_precedence() {
    let mut composer = MergeComposer::new();
    composer.push_file(
        json!({
            "database": "/srv/from-file.db",
            "kind": "collection",
            "ows_url": "https://ows.example.com",
        }),
        None,
    );
    composer.push_environment(json!({
        "database": "/srv/from-env.db",
        "target": "collections/S2.json",
    }));
    composer.push_cli(json!({ "kind": "json" }));

    let config =
        register_config_from_layers_for_test(composer.layers()).expect("merged config should build");
    assert_eq!(config.kind, ResourceKind::Json);
    assert_eq!(config.target, "collections/S2.json");
    assert_eq!(config.catalog.database, Utf8PathBuf::from("/srv/from-env.db"));
    assert_eq!(
        config.catalog.ows_url.as_deref(),
        Some("https://ows.example.com")
    );
}

#[rstest]
fn merge_layers_maps_configuration_errors() {
    let mut composer = MergeComposer::new();
    composer.push_cli(json!({ "target": 42 }));

    let err = register_config_from_layers_for_test(composer.layers())
        .expect_err("invalid config layer should map to CliError::Configuration");
    match err {
        CliError::Configuration(_) => {}
        other => panic!("expected CliError::Configuration, found {other:?}"),
    }
}
