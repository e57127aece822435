use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Serialize;

use xrbroker_core::contract::{active_runtime, functions};
use xrbroker_core::{BrokerType, BrokerUriParser, RuntimeData, TableType, query_other_broker};
use xrbroker_host::XrBrokerConfig;

pub fn load_config(path: Option<&Path>) -> Result<XrBrokerConfig> {
    match path {
        Some(path) => XrBrokerConfig::discover(Some(path))
            .with_context(|| format!("failed to load config {}", path.display())),
        None => XrBrokerConfig::discover(None).context("failed to load xrbroker.toml config"),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Every column of the table the URI addresses, if any broker can route it.
fn default_projection(uri: &str) -> Vec<String> {
    let table = [BrokerType::RuntimeBroker, BrokerType::SystemRuntimeBroker]
        .into_iter()
        .find_map(|broker| BrokerUriParser::new(broker).parse(uri).ok())
        .map(|parsed| parsed.table_type);
    let columns: &[&str] = match table {
        Some(TableType::ActiveRuntime) => &active_runtime::columns::ALL,
        Some(TableType::Functions) => &functions::columns::ALL,
        None => &[],
    };
    columns.iter().map(|c| c.to_string()).collect()
}

pub async fn query(config: &XrBrokerConfig, uri: &str, columns: &[String]) -> Result<()> {
    let deployment = config.build_deployment()?;
    let columns = if columns.is_empty() {
        default_projection(uri)
    } else {
        columns.to_vec()
    };
    let projection: Vec<&str> = columns.iter().map(String::as_str).collect();

    tracing::debug!(uri = %uri, columns = ?projection, "Running query");
    let Some(rows) = deployment.resolver().query(uri, &projection).await? else {
        bail!("no broker answers for {uri}");
    };
    print_json(&rows)
}

pub fn media_type(config: &XrBrokerConfig, uri: &str) -> Result<()> {
    let deployment = config.build_deployment()?;
    let Some(media_type) = deployment.resolver().get_type(uri)? else {
        bail!("no broker answers for {uri}");
    };
    println!("{media_type}");
    Ok(())
}

pub async fn active(
    config: &XrBrokerConfig,
    broker: BrokerType,
    major: u32,
    abi: &str,
) -> Result<()> {
    let deployment = config.build_deployment()?;
    match query_other_broker(deployment.resolver(), broker, major, abi).await? {
        Some(runtime) => print_json(&runtime),
        None => {
            eprintln!("No active OpenXR {major} runtime for ABI {abi} from {broker}");
            Ok(())
        }
    }
}

#[derive(Serialize)]
struct ListedRuntime<'a> {
    #[serde(flatten)]
    runtime: &'a RuntimeData,
    selected: bool,
}

/// Runtimes the application broker's chooser would pick from.
async fn candidates(config: &XrBrokerConfig, major: u32, abi: &str) -> Result<Vec<RuntimeData>> {
    let deployment = config.build_deployment()?;
    let source = config.runtime_source(deployment.resolver());
    Ok(source.candidates(major, abi).await?)
}

pub async fn list(config: &XrBrokerConfig, major: u32, abi: &str) -> Result<()> {
    let runtimes = candidates(config, major, abi).await?;
    let selected = config.build_repository().selected_runtime().await?;

    let listed: Vec<ListedRuntime<'_>> = runtimes
        .iter()
        .map(|runtime| ListedRuntime {
            runtime,
            selected: selected.as_deref() == Some(runtime.package_name.as_str()),
        })
        .collect();
    print_json(&listed)
}

pub async fn select(
    config: &XrBrokerConfig,
    package: &str,
    major: u32,
    abi: &str,
    force: bool,
) -> Result<()> {
    if !force {
        let available = candidates(config, major, abi).await?;
        if !available.iter().any(|r| r.package_name == package) {
            bail!(
                "no available OpenXR {major} runtime named {package} for ABI {abi} \
                 (use --force to select it anyway)"
            );
        }
    }
    let repository = config.build_repository();
    repository.update_runtime_selection(package, true).await?;
    eprintln!("Selected runtime {package}");
    Ok(())
}

pub async fn deselect(config: &XrBrokerConfig) -> Result<()> {
    let repository = config.build_repository();
    match repository.selected_runtime().await? {
        Some(package) => {
            repository.update_runtime_selection(&package, false).await?;
            eprintln!("Deselected runtime {package}");
        }
        None => eprintln!("No runtime is selected"),
    }
    Ok(())
}
