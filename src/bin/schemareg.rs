//! Binary entry point for the schemareg command-line client.
#![forbid(unsafe_code)]

use std::error::Error;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use schemareg::catalog::{FieldSchema, MetricSchema};
use schemareg::config::{RegistryConfig, StoreBackend};
use schemareg::handler::{
    CreateFieldRequest, CreateMetricRequest, FieldRef, MetricRef, OrgRef, RegistryHandler,
    Request, Response, UpdateFieldRequest, UpdateMetricRequest, UpdateTenantRequest,
};
use schemareg::types::FieldType;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "schemareg",
    version,
    about = "Manage per-organization metric schemas",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "SCHEMAREG_CONFIG",
        value_name = "FILE",
        help = "Path to the TOML config file"
    )]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        env = "SCHEMAREG_DB",
        value_name = "FILE",
        help = "SQLite database to use, overriding the configured store"
    )]
    db: Option<PathBuf>,

    #[arg(long, global = true, help = "Maximum commit attempts per write")]
    retries: Option<u32>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for responses"
    )]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Create an empty organization")]
    CreateOrg { org_id: String },

    #[command(about = "Replace an organization's metric keys and/or timestamp formats")]
    SetTenant(SetTenantCmd),

    #[command(about = "Create a metric")]
    CreateMetric {
        org_id: String,
        metric: String,
        #[arg(long = "alias", value_name = "ALIAS")]
        aliases: Vec<String>,
    },

    #[command(about = "Rename a metric or change its aliases")]
    UpdateMetric {
        org_id: String,
        metric: String,
        #[command(flatten)]
        changes: RenameArgs,
    },

    #[command(about = "Delete a metric and all of its fields")]
    DeleteMetric { org_id: String, metric: String },

    #[command(about = "Create a field on a metric")]
    CreateField {
        org_id: String,
        metric: String,
        field: String,
        #[arg(long = "type", value_name = "TYPE", help = "STRING, LONG, DOUBLE, BOOLEAN or TIMESTAMP")]
        field_type: FieldType,
        #[arg(long = "alias", value_name = "ALIAS")]
        aliases: Vec<String>,
    },

    #[command(about = "Rename a field or change its aliases")]
    UpdateField {
        org_id: String,
        metric: String,
        field: String,
        #[command(flatten)]
        changes: RenameArgs,
    },

    #[command(about = "Delete a field")]
    DeleteField {
        org_id: String,
        metric: String,
        field: String,
    },

    #[command(about = "List every metric of an organization")]
    Metrics { org_id: String },

    #[command(about = "Show one metric, looked up by name or alias")]
    Metric { org_id: String, metric: String },

    #[command(about = "Show an organization's ingestion metadata")]
    Tenant { org_id: String },

    #[command(about = "Handle a JSON request read from a file, or stdin when FILE is -")]
    Apply {
        #[arg(value_name = "FILE")]
        request: PathBuf,
    },
}

#[derive(Args, Debug)]
struct SetTenantCmd {
    org_id: String,

    #[arg(long = "metric-key", value_name = "KEY", help = "Raw event key naming the metric")]
    metric_keys: Vec<String>,

    #[arg(long = "timestamp-format", value_name = "PATTERN")]
    timestamp_formats: Vec<String>,
}

#[derive(Args, Debug)]
struct RenameArgs {
    #[arg(long, value_name = "NAME")]
    rename: Option<String>,

    #[arg(long = "add-alias", value_name = "ALIAS")]
    add_aliases: Vec<String>,

    #[arg(long = "remove-alias", value_name = "ALIAS")]
    remove_aliases: Vec<String>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("schemareg=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let mut config = RegistryConfig::load(cli.config.clone())?;
    if let Some(db) = &cli.db {
        config.store.backend = StoreBackend::Sqlite;
        config.store.path = Some(db.clone());
    }
    if let Some(retries) = cli.retries {
        config.retries = retries;
    }
    config.validate()?;

    let request = build_request(cli.command)?;
    let handler = RegistryHandler::from_config(&config)?;
    let response = handler.handle(&request)?;
    emit(cli.format, &response)
}

fn build_request(command: Command) -> Result<Request, Box<dyn Error>> {
    let request = match command {
        Command::CreateOrg { org_id } => Request::CreateOrg(OrgRef::new(org_id)),
        Command::SetTenant(cmd) => Request::UpdateTenant(UpdateTenantRequest {
            org: OrgRef::new(cmd.org_id),
            metric_keys: non_empty(cmd.metric_keys),
            timestamp_formats: non_empty(cmd.timestamp_formats),
        }),
        Command::CreateMetric {
            org_id,
            metric,
            aliases,
        } => Request::CreateMetric(CreateMetricRequest {
            metric: MetricRef::new(org_id, metric),
            aliases,
        }),
        Command::UpdateMetric {
            org_id,
            metric,
            changes,
        } => Request::UpdateMetric(UpdateMetricRequest {
            metric: MetricRef::new(org_id, metric),
            new_name: changes.rename,
            add_aliases: changes.add_aliases,
            remove_aliases: changes.remove_aliases,
        }),
        Command::DeleteMetric { org_id, metric } => {
            Request::DeleteMetric(MetricRef::new(org_id, metric))
        }
        Command::CreateField {
            org_id,
            metric,
            field,
            field_type,
            aliases,
        } => Request::CreateField(CreateFieldRequest {
            field: FieldRef::new(org_id, metric, field),
            field_type: Some(field_type),
            aliases,
        }),
        Command::UpdateField {
            org_id,
            metric,
            field,
            changes,
        } => Request::UpdateField(UpdateFieldRequest {
            field: FieldRef::new(org_id, metric, field),
            new_name: changes.rename,
            add_aliases: changes.add_aliases,
            remove_aliases: changes.remove_aliases,
        }),
        Command::DeleteField {
            org_id,
            metric,
            field,
        } => Request::DeleteField(FieldRef::new(org_id, metric, field)),
        Command::Metrics { org_id } => Request::GetMetrics(OrgRef::new(org_id)),
        Command::Metric { org_id, metric } => Request::GetMetric(MetricRef::new(org_id, metric)),
        Command::Tenant { org_id } => Request::GetTenant(OrgRef::new(org_id)),
        Command::Apply { request } => {
            let body = if request.as_os_str() == "-" {
                let mut body = String::new();
                io::stdin().read_to_string(&mut body)?;
                body
            } else {
                fs::read_to_string(&request)?
            };
            serde_json::from_str(&body)?
        }
    };
    Ok(request)
}

fn non_empty(values: Vec<String>) -> Option<Vec<String>> {
    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}

fn emit(format: OutputFormat, response: &Response) -> Result<(), Box<dyn Error>> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(response)?;
            println!("{json}");
        }
        OutputFormat::Text => print_text(response),
    }
    Ok(())
}

fn print_text(response: &Response) {
    match response {
        Response::Committed {
            org_id,
            version,
            changed,
        } => {
            if *changed {
                println!("{org_id}: committed version {version}");
            } else {
                println!("{org_id}: unchanged at version {version}");
            }
        }
        Response::Metrics {
            org_id,
            version,
            metrics,
        } => {
            println!("{org_id} (version {version}): {} metric(s)", metrics.len());
            for metric in metrics {
                print_metric(metric);
            }
        }
        Response::Metric {
            org_id,
            version,
            metric,
        } => {
            println!("{org_id} (version {version})");
            print_metric(metric);
        }
        Response::Tenant(tenant) => {
            println!("{}", tenant.org_id);
            println!("  metric keys: {}", list(&tenant.metric_key_aliases));
            println!("  timestamp formats: {}", list(&tenant.timestamp_patterns));
        }
    }
}

fn print_metric(metric: &MetricSchema) {
    println!(
        "  [{}] {}{}",
        metric.id(),
        metric.user_visible_name(),
        aliases_suffix(metric.aliases())
    );
    for field in metric.user_visible_fields() {
        print_field(field);
    }
}

fn print_field(field: &FieldSchema) {
    println!(
        "      [{}] {}: {}{}",
        field.id(),
        field.user_field_name(),
        field.field_type(),
        aliases_suffix(field.aliases())
    );
}

fn aliases_suffix(aliases: &[String]) -> String {
    if aliases.is_empty() {
        String::new()
    } else {
        format!(" (aliases: {})", aliases.join(", "))
    }
}

fn list(values: &[String]) -> String {
    if values.is_empty() {
        "-".to_string()
    } else {
        values.join(", ")
    }
}
