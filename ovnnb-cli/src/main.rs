use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tabled::{Table, Tabled};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ovnnb::db::MemoryDb;
use ovnnb::model::{AddressSet, ExternalIdMap, ExternalIds, LoadBalancer, PortGroup};
use ovnnb::{ClientConfig, MigrationReport, NbClient};

mod snapshot;

#[derive(Parser)]
#[command(name = "ovnnb")]
#[command(about = "Inspect and migrate an OVN northbound database snapshot", long_about = None)]
struct Cli {
    /// Database snapshot file
    #[arg(long, default_value = "ovnnb.json")]
    db: PathBuf,

    /// Client config file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Per-call timeout in seconds
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Version to run as, recorded in NB_Global after a migration
    #[arg(long)]
    version_stamp: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty database snapshot
    Init,

    /// Show the stored and running versions and whether a migration is due
    Status,

    /// Tag records of this controller with the vendor marker
    Migrate {
        /// Report what would be tagged without writing the snapshot
        #[arg(long)]
        dry_run: bool,
    },

    /// List records of one kind
    List {
        #[arg(value_enum)]
        kind: Kind,
    },

    /// Set an NB_Global option (an empty or missing value removes it)
    SetOption {
        key: String,
        value: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    AddressSets,
    LoadBalancers,
    PortGroups,
}

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "FIELD")]
    field: &'static str,
    #[tabled(rename = "VALUE")]
    value: String,
}

#[derive(Tabled)]
struct AddressSetRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "ADDRESSES")]
    addresses: String,
    #[tabled(rename = "VENDOR")]
    vendor: String,
}

impl From<AddressSet> for AddressSetRow {
    fn from(set: AddressSet) -> Self {
        let vendor = vendor_of(&set);
        Self {
            name: set.name,
            addresses: or_dash(set.addresses.join(",")),
            vendor,
        }
    }
}

#[derive(Tabled)]
struct LoadBalancerRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "PROTOCOL")]
    protocol: String,
    #[tabled(rename = "VIPS")]
    vips: usize,
    #[tabled(rename = "HEALTH CHECKS")]
    health_checks: usize,
    #[tabled(rename = "VENDOR")]
    vendor: String,
}

impl From<LoadBalancer> for LoadBalancerRow {
    fn from(lb: LoadBalancer) -> Self {
        let vendor = vendor_of(&lb);
        Self {
            name: lb.name,
            protocol: lb.protocol.unwrap_or_else(|| "-".to_string()),
            vips: lb.vips.len(),
            health_checks: lb.health_check.len(),
            vendor,
        }
    }
}

#[derive(Tabled)]
struct PortGroupRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "PORTS")]
    ports: usize,
    #[tabled(rename = "ACLS")]
    acls: usize,
    #[tabled(rename = "VENDOR")]
    vendor: String,
}

impl From<PortGroup> for PortGroupRow {
    fn from(pg: PortGroup) -> Self {
        let vendor = vendor_of(&pg);
        Self {
            name: pg.name,
            ports: pg.ports.len(),
            acls: pg.acls.len(),
            vendor,
        }
    }
}

fn vendor_of(record: &impl ExternalIds) -> String {
    record
        .external_ids()
        .get(ovnnb::model::VENDOR_KEY)
        .cloned()
        .unwrap_or_else(|| "-".to_string())
}

fn or_dash(s: String) -> String {
    if s.is_empty() { "-".to_string() } else { s }
}

fn client_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::from_json_file(path)?,
        None => ClientConfig::default(),
    };
    if let Some(timeout) = cli.timeout {
        config = config.with_timeout(Duration::from_secs(timeout));
    }
    if let Some(version) = &cli.version_stamp {
        config = config.with_version(version.clone());
    }
    config.validate()?;
    Ok(config)
}

fn report_rows(report: &MigrationReport) -> Vec<FieldRow> {
    vec![
        FieldRow {
            field: "state",
            value: report.state.to_string(),
        },
        FieldRow {
            field: "previous version",
            value: report.previous_version.clone().unwrap_or_else(|| "-".to_string()),
        },
        FieldRow {
            field: "router ports",
            value: report.router_ports.to_string(),
        },
        FieldRow {
            field: "port groups",
            value: report.port_groups.to_string(),
        },
        FieldRow {
            field: "address sets",
            value: report.address_sets.to_string(),
        },
        FieldRow {
            field: "load balancers",
            value: report.load_balancers.to_string(),
        },
        FieldRow {
            field: "acls",
            value: report.acls.to_string(),
        },
    ]
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("ovnnb=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = client_config(&cli)?;

    match cli.command {
        Commands::Init => {
            snapshot::init(&cli.db).await?;
            info!(db = %cli.db.display(), "Initialized database");
        }
        Commands::Status => {
            let (_, client) = open(&cli.db, config).await?;
            let stored = client.kube_ovn_version().await?;
            let state = client.migration_state().await?;
            let rows = vec![
                FieldRow {
                    field: "stored version",
                    value: stored.unwrap_or_else(|| "-".to_string()),
                },
                FieldRow {
                    field: "running version",
                    value: client.config().version.clone(),
                },
                FieldRow {
                    field: "migration",
                    value: state.to_string(),
                },
            ];
            println!("{}", Table::new(rows));
        }
        Commands::Migrate { dry_run } => {
            let (db, client) = open(&cli.db, config).await?;
            let report = client
                .migrate_vendor_external_ids()
                .await
                .context("Vendor migration failed")?;
            println!("{}", Table::new(report_rows(&report)));
            if dry_run {
                info!("Dry run, snapshot left unchanged");
            } else {
                snapshot::save(&cli.db, &db).await?;
            }
        }
        Commands::List { kind } => {
            let (_, client) = open(&cli.db, config).await?;
            let everything = ExternalIdMap::new();
            let table = match kind {
                Kind::AddressSets => {
                    let rows = client.list_address_sets(&everything).await?;
                    Table::new(rows.into_iter().map(AddressSetRow::from))
                }
                Kind::LoadBalancers => {
                    let rows = client.list_load_balancers(|_| true).await?;
                    Table::new(rows.into_iter().map(LoadBalancerRow::from))
                }
                Kind::PortGroups => {
                    let rows = client.list_port_groups(&everything).await?;
                    Table::new(rows.into_iter().map(PortGroupRow::from))
                }
            };
            println!("{table}");
        }
        Commands::SetOption { key, value } => {
            let (db, client) = open(&cli.db, config).await?;
            let value = value.unwrap_or_default();
            client.set_nb_global_option(&key, &value).await?;
            snapshot::save(&cli.db, &db).await?;
            if value.is_empty() {
                println!("Removed option {key}");
            } else {
                println!("Set option {key}={value}");
            }
        }
    }

    Ok(())
}

async fn open(path: &Path, config: ClientConfig) -> Result<(Arc<MemoryDb>, NbClient)> {
    let db = Arc::new(snapshot::load(path).await?);
    let client = NbClient::new(db.clone(), config);
    Ok((db, client))
}
