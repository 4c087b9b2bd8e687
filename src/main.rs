use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tidegate::backend::{connect_namespace_backend, selector_for, BackendConnection, TcpDialer};
use tidegate::config::ProxyConfig;
use tidegate::configcenter::create_config_center;
use tidegate::logging::init_logging;
use tracing::info;

const PROBE_READ_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "tidegate")]
#[command(about = "Backend transport toolkit for a multi-tenant SQL proxy")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate an example proxy configuration file
    Config {
        /// Config center type (file or etcd)
        #[arg(short = 't', long, default_value = "file")]
        center: String,
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Validate a proxy configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List namespaces from the configured config center
    Namespaces {
        #[arg(short, long)]
        config: PathBuf,
        /// Show a single namespace
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Dial one backend of a namespace and read its initial packet
    Probe {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        namespace: String,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Config { center, output } => generate_config(&center, output),
        Commands::Validate { config } => validate_config(config),
        Commands::Namespaces { config, name } => list_namespaces(config, name).await,
        Commands::Probe { config, namespace } => probe_backend(config, &namespace).await,
        Commands::Version => {
            show_version();
            Ok(())
        }
    }
}

fn load_config(path: &Path) -> Result<ProxyConfig> {
    ProxyConfig::load_from_file(path)
        .with_context(|| format!("failed to load config from {:?}", path))
}

fn generate_config(center: &str, output: PathBuf) -> Result<()> {
    println!("Generating {} configuration file: {:?}", center, output);
    ProxyConfig::create_example_config(&output, center).context("failed to generate config")?;
    println!("Configuration file generated successfully!");
    println!("  tidegate validate --config {:?}", output);
    Ok(())
}

fn validate_config(path: PathBuf) -> Result<()> {
    println!("Validating configuration file: {:?}", path);
    let config = load_config(&path)?;

    println!("✓ Configuration file is valid");
    println!("  Cluster: {}", config.cluster);
    println!("  Proxy address: {}", config.proxy_server.addr);
    println!("  Max connections: {}", config.proxy_server.max_connections);
    println!("  Session timeout: {}s", config.proxy_server.session_timeout);
    println!("  Config center: {}", config.config_center.center_type);
    Ok(())
}

async fn list_namespaces(path: PathBuf, name: Option<String>) -> Result<()> {
    let config = load_config(&path)?;
    init_logging(&config.log)?;

    let center = create_config_center(&config.config_center)?;
    let namespaces = match name {
        Some(name) => vec![center.get_namespace(&name).await?],
        None => center.list_all_namespaces().await?,
    };

    println!("{} namespace(s)", namespaces.len());
    for ns in &namespaces {
        println!(
            "  {} [{}] {}",
            ns.namespace,
            ns.backend.selector_type,
            ns.backend.instances.join(", ")
        );
    }
    Ok(())
}

async fn probe_backend(path: PathBuf, name: &str) -> Result<()> {
    let config = load_config(&path)?;
    init_logging(&config.log)?;

    let center = create_config_center(&config.config_center)?;
    let namespace = center.get_namespace(name).await?;
    let selector = selector_for(namespace.backend.selector()?);
    let dialer = TcpDialer::new(config.proxy_server.tcp_keep_alive);

    let mut conn = connect_namespace_backend(&namespace, selector.as_ref(), dialer).await?;
    info!(namespace = %name, address = %conn.address(), "probing backend");

    let pkt = conn.packet_io()?;
    pkt.set_read_timeout(Some(PROBE_READ_TIMEOUT));
    let greeting = pkt.read_packet().await;
    let sequence = pkt.sequence();
    conn.close().await?;

    let greeting = greeting?;
    if greeting.is_empty() {
        bail!("backend {} sent an empty initial packet", conn.address());
    }
    println!(
        "{}: initial packet of {} bytes (next sequence {}, first byte 0x{:02x})",
        conn.address(),
        greeting.len(),
        sequence,
        greeting[0]
    );
    Ok(())
}

fn show_version() {
    println!("tidegate v{}", env!("CARGO_PKG_VERSION"));
    println!("Backend transport toolkit for a multi-tenant SQL proxy");
    println!();
    println!("Target: {}", std::env::consts::ARCH);
}
