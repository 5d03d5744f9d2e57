//! srvfleet command line entry point.

use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use log::{info, warn};
use tokio::process::Command;

use srvfleet::config::Config;
use srvfleet::http::{serve, AppState};
use srvfleet::inventory::{run_playbook, write_inventory, InventoryVars};
use srvfleet::poll::StatusPoller;
use srvfleet::provision::{check_dependencies, register_instances, var_file_exists, Terraform};
use srvfleet::push::SitePublisher;
use srvfleet::runtime::DockerQueryRunner;
use srvfleet::status::query_status;
use srvfleet::{Error, FleetRegistry, ServerRecord};

#[derive(Parser)]
#[command(name = "srvfleet")]
#[command(about = "Provision and track game-server instances")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision every configured server and configure it
    Create,
    /// Destroy one instance, or the whole fleet when no id is given
    Destroy { instance_id: Option<String> },
    /// Show the registered servers
    List,
    /// Drop a server from the registry without touching infrastructure
    Forget { instance_id: String },
    /// Regenerate the ansible inventory from the registry
    Inventory,
    /// Open an ssh session to the server with this name
    Connect { name: String },
    /// Ask every registered server's status service for its report
    Poll,
    /// Publish every registered server to the site's database
    Push,
    /// Query the local game server once and print its status
    Status,
    /// Run the HTTP status service
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    let cli = Cli::parse();

    // Load configuration
    let cfg = Config::load()?;
    info!("Loaded configuration, registry at {}", cfg.registry_path.display());

    let registry = FleetRegistry::open(&cfg.registry_path);

    match cli.command {
        Commands::Create => create(&cfg, &registry).await?,
        Commands::Destroy { instance_id } => destroy(&cfg, &registry, instance_id).await?,
        Commands::List => print_servers(&registry.list()?),
        Commands::Forget { instance_id } => {
            if registry.get(&instance_id)?.is_none() {
                println!("No server with instance id {}", instance_id);
            }
            registry.remove(&instance_id)?;
        }
        Commands::Inventory => refresh_inventory(&cfg, &registry)?,
        Commands::Connect { name } => connect(&cfg, &registry, &name).await?,
        Commands::Poll => poll(&cfg, &registry).await?,
        Commands::Push => push(&cfg, &registry).await?,
        Commands::Status => {
            let runner = DockerQueryRunner::new(cfg.container_name.clone(), cfg.rcon.clone());
            let report = query_status(&runner, cfg.query_timeout())
                .await
                .map_err(Error::from)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Serve => {
            let state = AppState {
                runner: Arc::new(DockerQueryRunner::new(
                    cfg.container_name.clone(),
                    cfg.rcon.clone(),
                )),
                registry,
                query_timeout: cfg.query_timeout(),
            };
            serve(cfg.http_bind, state).await?;
        }
    }

    Ok(())
}

async fn create(cfg: &Config, registry: &FleetRegistry) -> anyhow::Result<()> {
    check_dependencies(&["aws", "terraform", "ansible-playbook"])?;
    let targets = cfg.require_servers()?;
    let vars = inventory_vars(cfg)?;
    if !var_file_exists(&cfg.terraform_dir, &cfg.tfvars_path) {
        return Err(Error::Config(format!(
            "variables file {} not found in {}",
            cfg.tfvars_path.display(),
            cfg.terraform_dir.display()
        ))
        .into());
    }

    let terraform = Terraform::new(&cfg.terraform_dir, &cfg.tfvars_path);
    terraform.apply().await?;

    let registered = register_instances(&terraform, targets, registry)
        .await
        .context("instances created so far remain in the registry; run `list` to inspect")?;
    info!("Registered {} instance(s)", registered.len());

    write_inventory(&cfg.inventory_path, &registry.list()?, &vars)?;

    info!("Waiting {:?} for instances to accept ssh", cfg.settle_delay());
    tokio::time::sleep(cfg.settle_delay()).await;

    run_playbook(&cfg.playbook_path, &cfg.inventory_path).await?;
    print_servers(&registered);
    Ok(())
}

async fn destroy(
    cfg: &Config,
    registry: &FleetRegistry,
    instance_id: Option<String>,
) -> anyhow::Result<()> {
    check_dependencies(&["aws", "terraform"])?;
    let terraform = Terraform::new(&cfg.terraform_dir, &cfg.tfvars_path);

    match instance_id {
        Some(id) => {
            let record = registry
                .get(&id)?
                .ok_or_else(|| anyhow!("no server with instance id {}", id))?;
            let resource = record
                .display_name
                .as_deref()
                .and_then(|name| cfg.target_named(name))
                .and_then(|t| t.resource.as_deref())
                .ok_or_else(|| {
                    Error::Config(format!("no resource address configured for {}", id))
                })?;
            terraform.destroy(Some(resource)).await?;
            registry.remove(&id)?;
        }
        None => {
            terraform.destroy(None).await?;
            for record in registry.list()? {
                registry.remove(&record.instance_id)?;
            }
        }
    }
    Ok(())
}

fn inventory_vars(cfg: &Config) -> srvfleet::Result<InventoryVars> {
    Ok(InventoryVars {
        remote_user: cfg.remote_user.clone(),
        ssh_private_key_path: cfg.require_ssh_key()?.to_path_buf(),
        rcon_password: cfg.require_rcon_password()?.to_string(),
    })
}

fn refresh_inventory(cfg: &Config, registry: &FleetRegistry) -> anyhow::Result<()> {
    let vars = inventory_vars(cfg)?;
    write_inventory(&cfg.inventory_path, &registry.list()?, &vars)?;
    Ok(())
}

async fn connect(cfg: &Config, registry: &FleetRegistry, name: &str) -> anyhow::Result<()> {
    check_dependencies(&["ssh"])?;
    let key = cfg.require_ssh_key()?;
    let record = registry
        .find_by_name(name)?
        .ok_or_else(|| anyhow!("no server found with the name: {}", name))?;

    let status = Command::new("ssh")
        .arg("-i")
        .arg(key)
        .arg(format!("{}@{}", cfg.remote_user, record.public_ip))
        .status()
        .await?;
    if !status.success() {
        warn!("ssh exited with {}", status);
        return Err(anyhow!("ssh connection failed with {}", status));
    }
    Ok(())
}

async fn poll(cfg: &Config, registry: &FleetRegistry) -> anyhow::Result<()> {
    let poller = StatusPoller::new(cfg.status_port, cfg.query_timeout()).map_err(Error::from)?;
    let results = poller.poll_fleet(registry).await?;
    if results.is_empty() {
        println!("No current servers.");
        return Ok(());
    }

    for result in results {
        let label = result
            .server
            .display_name
            .as_deref()
            .unwrap_or(&result.server.instance_id);
        match result.status {
            Ok(report) => println!(
                "{} ({}): map={} players={}/{} hostname={}",
                label,
                result.server.public_ip,
                report.map.as_deref().unwrap_or("-"),
                fmt_count(report.human_players),
                fmt_count(report.max_players),
                report.hostname.as_deref().unwrap_or("-"),
            ),
            Err(e) => println!("{} ({}): error: {}", label, result.server.public_ip, e),
        }
    }
    Ok(())
}

async fn push(cfg: &Config, registry: &FleetRegistry) -> anyhow::Result<()> {
    let (site_url, auth_key) = cfg.require_site()?;
    let publisher =
        SitePublisher::new(site_url, auth_key, cfg.query_timeout()).map_err(Error::from)?;
    let results = publisher.push_all(registry).await?;
    if results.is_empty() {
        println!("No current servers.");
        return Ok(());
    }

    for result in results {
        match result.outcome {
            Ok(()) => println!("Posted server {} to database.", result.server.instance_id),
            Err(e) => println!(
                "Error posting server {} to database: {}",
                result.server.instance_id, e
            ),
        }
    }
    Ok(())
}

fn fmt_count(n: Option<u32>) -> String {
    n.map(|n| n.to_string()).unwrap_or_else(|| "?".into())
}

fn print_servers(servers: &[ServerRecord]) {
    if servers.is_empty() {
        println!("No current servers.");
        return;
    }
    println!("Current servers:");
    for server in servers {
        println!("Instance ID: {}", server.instance_id);
        println!("  Public IP: {}", server.public_ip);
        println!("  Public DNS: {}", server.public_dns);
        println!("  Name: {}", server.display_name.as_deref().unwrap_or("-"));
        println!(
            "  Server Hostname: {}",
            server.server_hostname.as_deref().unwrap_or("-")
        );
        println!();
    }
}
