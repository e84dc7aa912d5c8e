use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use lodestar_core::{ServiceInstance, ServiceRegistry, SystemClock, DEFAULT_TTL};
use lodestar_db::RedisStore;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "lodestar")]
#[command(about = "Lodestar registry administrative CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Full connection URL; takes precedence over host, port and password
    #[arg(long, env = "REDIS_URL")]
    redis: Option<String>,

    #[arg(long, env = "REDIS_HOST", default_value = "127.0.0.1")]
    redis_host: String,

    #[arg(long, env = "REDIS_PORT", default_value_t = 6379)]
    redis_port: u16,

    #[arg(long, env = "REDIS_PASSWORD", hide_env_values = true)]
    redis_password: Option<String>,

    /// Expiry applied to records written by this tool
    #[arg(long, env = "REGISTRY_TTL_SECS", default_value_t = DEFAULT_TTL.as_secs())]
    ttl: u64,

    /// Print JSON instead of tables
    #[arg(long)]
    json: bool,
}

impl Cli {
    /// Same resolution as the discovery server, so both open the same store.
    fn redis_url(&self) -> String {
        match &self.redis {
            Some(url) => url.clone(),
            None => lodestar_db::redis_url(
                &self.redis_host,
                self.redis_port,
                self.redis_password.as_deref(),
            ),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List every live instance grouped by service
    Services,
    /// List live instances of one service
    Discover {
        #[arg(long)]
        name: String,
    },
    /// Register an instance (it expires unless something heartbeats it)
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        url: String,
    },
    /// Refresh an instance's expiry
    Heartbeat {
        #[arg(long)]
        name: String,
        #[arg(long)]
        id: Uuid,
    },
    /// Remove an instance immediately
    Unregister {
        #[arg(long)]
        name: String,
        #[arg(long)]
        id: Uuid,
    },
    /// Show registry status overview
    Status,
}

fn print_instances(instances: &[ServiceInstance]) {
    println!("{:<38} {:<16} {:<32} {:<15}", "ID", "Service", "URL", "Last heartbeat");
    println!("{}", "-".repeat(103));
    for inst in instances {
        println!(
            "{:<38} {:<16} {:<32} {:<15}",
            inst.id, inst.name, inst.url, inst.last_heartbeat
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let store = RedisStore::connect(&cli.redis_url()).await?;
    let registry = ServiceRegistry::with_clock(
        Arc::new(store),
        Duration::from_secs(cli.ttl),
        Arc::new(SystemClock),
    );

    match cli.command {
        Commands::Services => {
            let services = registry.get_all_services().await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&services)?);
            } else {
                let mut names: Vec<_> = services.keys().cloned().collect();
                names.sort();
                for name in names {
                    println!("{} ({} instances)", name, services[&name].len());
                    print_instances(&services[&name]);
                    println!();
                }
            }
        }
        Commands::Discover { name } => {
            let instances = registry.discover(&name).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&instances)?);
            } else {
                print_instances(&instances);
            }
        }
        Commands::Register { name, url } => {
            let id = registry.register(&name, &url).await?;
            println!("Instance registered: {} ({})", id, name);
        }
        Commands::Heartbeat { name, id } => {
            if registry.heartbeat(&name, &id).await? {
                println!("Heartbeat recorded for {}", id);
            } else {
                return Err(format!("instance {} of {} is not registered", id, name).into());
            }
        }
        Commands::Unregister { name, id } => {
            registry.unregister(&name, &id).await?;
            println!("Instance removed: {}", id);
        }
        Commands::Status => {
            let services = registry.get_all_services().await?;
            let instances: usize = services.values().map(Vec::len).sum();

            println!("Lodestar Registry Status Overview");
            println!("{}", "=".repeat(35));
            println!("Services:        {}", services.len());
            println!("Live instances:  {}", instances);
            println!("Record TTL:      {}s", registry.ttl().as_secs());
        }
    }

    Ok(())
}
