//! nexstor CLI - Admin Command Line Interface
//!
//! Inspects and changes datasets on a storage appliance through its
//! management API.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nexstor_client::{
    Client, CloneSnapshotParams, CreateFilesystemParams, CreateVolumeParams, DestroyParams,
    JobState, LunMappingFilter, UpdateFilesystemParams, UpdateVolumeParams,
};
use nexstor_common::Config;
use nexstor_common::config::split_addresses;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "nexstor-cli")]
#[command(about = "Storage appliance admin CLI")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Comma-separated management API addresses
    #[arg(short, long, env = "NEXSTOR_ADDRESS")]
    address: Option<String>,

    #[arg(short, long, env = "NEXSTOR_USERNAME")]
    username: Option<String>,

    #[arg(short, long, env = "NEXSTOR_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Accept self-signed certificates
    #[arg(long)]
    insecure: bool,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show license status
    License,
    /// List storage pools
    Pools,
    /// List HA clusters
    Clusters,
    /// Filesystem operations
    Filesystem {
        #[command(subcommand)]
        action: FilesystemCommands,
    },
    /// Volume operations
    Volume {
        #[command(subcommand)]
        action: VolumeCommands,
    },
    /// Snapshot operations
    Snapshot {
        #[command(subcommand)]
        action: SnapshotCommands,
    },
    /// LUN mapping operations
    Lun {
        #[command(subcommand)]
        action: LunCommands,
    },
    /// Asynchronous job operations
    Job {
        #[command(subcommand)]
        action: JobCommands,
    },
}

#[derive(Subcommand, Debug)]
enum FilesystemCommands {
    /// List child filesystems (of every pool when no parent is given)
    List {
        #[arg(long)]
        parent: Option<String>,
        /// Resume after this filesystem path (tokens belong to one parent)
        #[arg(long, requires = "parent")]
        start_after: Option<String>,
        /// Maximum number of entries (0 = all)
        #[arg(long, default_value_t = 0)]
        limit: usize,
    },
    /// Show filesystem details
    Show { path: String },
    /// Create a filesystem
    Create {
        path: String,
        /// Referenced quota (e.g., 10G, 1T)
        #[arg(long)]
        quota: Option<String>,
    },
    /// Change the referenced quota
    Resize {
        path: String,
        #[arg(long)]
        quota: String,
    },
    /// Delete a filesystem
    Delete {
        path: String,
        /// Also destroy its snapshots
        #[arg(long)]
        snapshots: bool,
        /// Promote the most recent clone if one holds the filesystem
        #[arg(long)]
        promote: bool,
    },
    /// Promote a clone
    Promote { path: String },
}

#[derive(Subcommand, Debug)]
enum VolumeCommands {
    /// List volumes under a volume group
    List {
        #[arg(long)]
        parent: String,
        /// Resume after this volume path
        #[arg(long, default_value = "")]
        start_after: String,
        /// Maximum number of entries (0 = all)
        #[arg(long, default_value_t = 0)]
        limit: usize,
    },
    /// Show volume details
    Show { path: String },
    /// Create a volume
    Create {
        path: String,
        /// Size (e.g., 10G, 1T)
        #[arg(long)]
        size: String,
        /// Thin provisioned
        #[arg(long)]
        sparse: bool,
    },
    /// Resize a volume
    Resize {
        path: String,
        #[arg(long)]
        size: String,
    },
    /// Delete a volume
    Delete {
        path: String,
        #[arg(long)]
        snapshots: bool,
        #[arg(long)]
        promote: bool,
    },
    /// Promote a clone
    Promote { path: String },
}

#[derive(Subcommand, Debug)]
enum SnapshotCommands {
    /// List snapshots of a dataset
    List {
        parent: String,
        /// Include snapshots of descendants
        #[arg(long)]
        recursive: bool,
    },
    /// Show snapshot details
    Show { path: String },
    /// Create a snapshot (dataset@name)
    Create { path: String },
    /// Delete a snapshot
    Delete { path: String },
    /// Clone a snapshot into a new dataset
    Clone {
        path: String,
        #[arg(long)]
        target: String,
        #[arg(long)]
        quota: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum LunCommands {
    /// List LUN mappings
    List {
        #[arg(long)]
        volume: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum JobCommands {
    /// Show job status
    Status { id: String },
}

const MIB: u64 = 1 << 20;
const GIB: u64 = 1 << 30;
const TIB: u64 = 1 << 40;

/// Binary units as (input suffix, display name, bytes), largest first
const SIZE_UNITS: [(char, &str, u64); 3] = [
    ('T', "TiB", TIB),
    ('G', "GiB", GIB),
    ('M', "MiB", MIB),
];

/// Bytes from a size like `500M`, `10G` or `1T`; a bare number is bytes
fn parse_size(s: &str) -> Result<u64> {
    let s = s.trim();
    let (digits, unit) = SIZE_UNITS
        .iter()
        .find_map(|&(suffix, _, unit)| {
            s.strip_suffix(suffix).map(|n| (n, unit))
        })
        .unwrap_or((s, 1));
    digits
        .parse::<u64>()
        .ok()
        .and_then(|value| value.checked_mul(unit))
        .ok_or_else(|| anyhow::anyhow!("Invalid size: '{s}'"))
}

/// Largest unit that divides `bytes` exactly, else one decimal of the largest unit below it
fn format_size(bytes: u64) -> String {
    if let Some(&(_, name, unit)) = SIZE_UNITS
        .iter()
        .find(|&&(_, _, unit)| bytes >= unit && bytes.is_multiple_of(unit))
    {
        return format!("{} {name}", bytes / unit);
    }
    match SIZE_UNITS.iter().find(|&&(_, _, unit)| bytes >= unit) {
        Some(&(_, name, unit)) => format!("{:.1} {name}", bytes as f64 / unit as f64),
        None => format!("{bytes} B"),
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

fn print_resume_token(parent: &str, token: &str) {
    if !token.is_empty() {
        println!();
        println!(
            "More entries, continue with --parent {parent} --start-after {token}"
        );
    }
}

/// Configuration file and environment, overridden by command line flags
fn load_config(args: &Args) -> Result<Config> {
    let mut config = Config::load(args.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(address) = &args.address {
        config.appliance.addresses = split_addresses(address);
    }
    if let Some(username) = &args.username {
        config.appliance.username.clone_from(username);
    }
    if let Some(password) = &args.password {
        config.appliance.password.clone_from(password);
    }
    if args.insecure {
        config.appliance.insecure_skip_verify = true;
    }
    config.validate()?;
    tracing::debug!(appliance = ?config.appliance, "configuration loaded");
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config(&args)?;
    let client = Client::from_config(&config)?;
    let addresses = &config.appliance.addresses;
    client
        .login()
        .await
        .with_context(|| format!("Failed to log in to {addresses:?}"))?;

    match args.command {
        Commands::License => {
            let license = client.license().await?;
            println!("Valid:   {}", yes_no(license.valid));
            println!(
                "Expires: {}",
                if license.expires.is_empty() { "-" } else { &license.expires }
            );
        }
        Commands::Pools => {
            let pools = client.pools().await?;
            if pools.is_empty() {
                println!("No pools found");
            } else {
                println!("{:<32}", "POOL");
                println!("{}", "-".repeat(32));
                for pool in pools {
                    println!("{:<32}", pool.pool_name);
                }
            }
        }
        Commands::Clusters => {
            let clusters = client.rsf_clusters().await?;
            if clusters.is_empty() {
                println!("Appliance is not clustered");
            }
            for cluster in clusters {
                println!("Cluster: {} ({})", cluster.cluster_name, cluster.health);
                for service in &cluster.services {
                    println!(
                        "  {:<24} {}",
                        service.name,
                        cluster.running_node(&service.name).unwrap_or("-")
                    );
                }
            }
        }
        Commands::Filesystem { action } => filesystem_command(&client, action).await?,
        Commands::Volume { action } => volume_command(&client, action).await?,
        Commands::Snapshot { action } => snapshot_command(&client, action).await?,
        Commands::Lun { action } => match action {
            LunCommands::List { volume } => {
                let mappings = match volume {
                    Some(volume) => {
                        client
                            .lun_mappings(&LunMappingFilter {
                                volume: Some(volume),
                                ..Default::default()
                            })
                            .await?
                    }
                    None => client.all_lun_mappings().await?,
                };
                if mappings.is_empty() {
                    println!("No LUN mappings found");
                } else {
                    println!(
                        "{:<40} {:<40} {:<20} {:<20} {:<6}",
                        "ID", "VOLUME", "TARGET GROUP", "HOST GROUP", "LUN"
                    );
                    println!("{}", "-".repeat(130));
                    for m in mappings {
                        println!(
                            "{:<40} {:<40} {:<20} {:<20} {:<6}",
                            m.id, m.volume, m.target_group, m.host_group, m.lun
                        );
                    }
                }
            }
        },
        Commands::Job { action } => match action {
            JobCommands::Status { id } => match client.job_status(&id).await? {
                JobState::Done => println!("Job '{id}' finished"),
                JobState::Running => println!("Job '{id}' is running"),
            },
        },
    }

    Ok(())
}

async fn filesystem_command(client: &Client, action: FilesystemCommands) -> Result<()> {
    match action {
        FilesystemCommands::List {
            parent,
            start_after,
            limit,
        } => {
            let parents = match parent {
                Some(parent) => vec![parent],
                None => client
                    .pools()
                    .await?
                    .into_iter()
                    .map(|p| p.pool_name)
                    .collect(),
            };
            println!(
                "{:<48} {:<12} {:<12} {:<4} {:<4}",
                "PATH", "USED", "AVAILABLE", "NFS", "SMB"
            );
            println!("{}", "-".repeat(84));
            for parent in parents {
                let window = client
                    .filesystems_with_starting_token(
                        &parent,
                        start_after.as_deref().unwrap_or_default(),
                        limit,
                    )
                    .await?;
                for fs in &window.items {
                    println!(
                        "{:<48} {:<12} {:<12} {:<4} {:<4}",
                        fs.path,
                        format_size(fs.bytes_used),
                        format_size(fs.bytes_available),
                        yes_no(fs.shared_over_nfs),
                        yes_no(fs.shared_over_smb),
                    );
                }
                print_resume_token(&parent, &window.next_token);
            }
        }
        FilesystemCommands::Show { path } => {
            let fs = client.get_filesystem(&path).await?;
            println!("Filesystem: {}", fs.path);
            println!("============{}", "=".repeat(fs.path.len()));
            println!(
                "Mount Point: {}",
                if fs.mount_point.is_empty() { "-" } else { &fs.mount_point }
            );
            println!("Used:        {}", format_size(fs.bytes_used));
            println!("Available:   {}", format_size(fs.bytes_available));
            println!("Quota:       {}", format_size(fs.referenced_quota_size()));
            println!("NFS:         {}", yes_no(fs.shared_over_nfs));
            println!("SMB:         {}", yes_no(fs.shared_over_smb));
        }
        FilesystemCommands::Create { path, quota } => {
            let referenced_quota_size = quota.as_deref().map(parse_size).transpose()?;
            let created = client
                .ensure_filesystem_created(&CreateFilesystemParams {
                    path: path.clone(),
                    referenced_quota_size,
                })
                .await?;
            if created {
                println!("Filesystem '{path}' created successfully");
            } else {
                println!("Filesystem '{path}' already exists");
            }
        }
        FilesystemCommands::Resize { path, quota } => {
            let params = UpdateFilesystemParams {
                referenced_quota_size: Some(parse_size(&quota)?),
            };
            client.update_filesystem(&path, &params).await?;
            println!("Filesystem '{path}' quota set to {quota}");
        }
        FilesystemCommands::Delete {
            path,
            snapshots,
            promote,
        } => {
            client
                .destroy_filesystem_with_params(
                    &path,
                    DestroyParams {
                        destroy_snapshots: snapshots,
                        promote_most_recent_clone_if_exists: promote,
                    },
                )
                .await?;
            println!("Filesystem '{path}' deleted successfully");
        }
        FilesystemCommands::Promote { path } => {
            client.promote_filesystem(&path).await?;
            println!("Filesystem '{path}' promoted");
        }
    }
    Ok(())
}

async fn volume_command(client: &Client, action: VolumeCommands) -> Result<()> {
    match action {
        VolumeCommands::List {
            parent,
            start_after,
            limit,
        } => {
            let window = client
                .volumes_with_starting_token(&parent, &start_after, limit)
                .await?;
            if window.items.is_empty() {
                println!("No volumes found");
                return Ok(());
            }
            println!("{:<48} {:<12} {:<12}", "PATH", "SIZE", "USED");
            println!("{}", "-".repeat(72));
            for vol in &window.items {
                println!(
                    "{:<48} {:<12} {:<12}",
                    vol.path,
                    format_size(vol.volume_size),
                    format_size(vol.bytes_used),
                );
            }
            print_resume_token(&parent, &window.next_token);
        }
        VolumeCommands::Show { path } => {
            let vol = client.get_volume(&path).await?;
            println!("Volume: {}", vol.path);
            println!("========{}", "=".repeat(vol.path.len()));
            println!("Size:      {}", format_size(vol.volume_size));
            println!("Used:      {}", format_size(vol.bytes_used));
            println!("Available: {}", format_size(vol.bytes_available));
        }
        VolumeCommands::Create { path, size, sparse } => {
            let volume_size = parse_size(&size)?;
            client
                .create_volume(&CreateVolumeParams {
                    path: path.clone(),
                    volume_size,
                    sparse_volume: sparse,
                })
                .await?;
            println!("Volume created successfully!");
            println!();
            println!("Path:   {path}");
            println!("Size:   {}", format_size(volume_size));
            println!("Sparse: {}", yes_no(sparse));
        }
        VolumeCommands::Resize { path, size } => {
            let volume_size = parse_size(&size)?;
            client
                .update_volume(
                    &path,
                    &UpdateVolumeParams {
                        volume_size: Some(volume_size),
                    },
                )
                .await?;
            println!("Volume '{path}' resized to {}", format_size(volume_size));
        }
        VolumeCommands::Delete {
            path,
            snapshots,
            promote,
        } => {
            client
                .destroy_volume_with_params(
                    &path,
                    DestroyParams {
                        destroy_snapshots: snapshots,
                        promote_most_recent_clone_if_exists: promote,
                    },
                )
                .await?;
            println!("Volume '{path}' deleted successfully");
        }
        VolumeCommands::Promote { path } => {
            client.promote_volume(&path).await?;
            println!("Volume '{path}' promoted");
        }
    }
    Ok(())
}

async fn snapshot_command(client: &Client, action: SnapshotCommands) -> Result<()> {
    match action {
        SnapshotCommands::List { parent, recursive } => {
            let snapshots = client.snapshots(&parent, recursive).await?;
            println!("Snapshots of: {parent}");
            println!("==============");
            if snapshots.is_empty() {
                println!("No snapshots found");
            } else {
                println!("{:<60} {:<8}", "SNAPSHOT", "CLONES");
                println!("{}", "-".repeat(70));
                for snap in snapshots {
                    println!("{:<60} {:<8}", snap.path, snap.clones.len());
                }
            }
        }
        SnapshotCommands::Show { path } => {
            let snap = client.get_snapshot(&path).await?;
            println!("Snapshot: {}", snap.path);
            println!("=========={}", "=".repeat(snap.path.len()));
            println!("Parent:       {}", snap.parent);
            println!("Created At:   {}", snap.creation_time);
            println!("Creation TXG: {}", snap.creation_txg);
            if snap.clones.is_empty() {
                println!("Clones:       -");
            } else {
                println!("Clones:");
                for clone in &snap.clones {
                    println!("  {clone}");
                }
            }
        }
        SnapshotCommands::Create { path } => {
            client.create_snapshot(&path).await?;
            println!("Snapshot '{path}' created successfully");
        }
        SnapshotCommands::Delete { path } => {
            client.destroy_snapshot(&path).await?;
            println!("Snapshot '{path}' deleted successfully");
        }
        SnapshotCommands::Clone {
            path,
            target,
            quota,
        } => {
            let referenced_quota_size = quota.as_deref().map(parse_size).transpose()?;
            client
                .clone_snapshot(
                    &path,
                    &CloneSnapshotParams {
                        target_path: target.clone(),
                        referenced_quota_size,
                    },
                )
                .await?;
            println!("Snapshot '{path}' cloned to '{target}'");
        }
    }
    Ok(())
}
