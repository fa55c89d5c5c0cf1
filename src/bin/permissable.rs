use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};

use permissable::{
    db, EntityRef, Permissable, PermissableConfig, PermissableResult, ResourceTarget, Settings,
    SqliteGrantStore,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "permissable grant administration", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply pending migrations
    Migrate,
    /// Grant permissions to a member on one or more resources
    Grant {
        /// Member as Type:id, e.g. User:42
        #[arg(long, value_parser = parse_entity_ref)]
        member: EntityRef,
        /// Resource as Type:id; repeat for several resources
        #[arg(long = "resource", value_parser = parse_entity_ref, required = true)]
        resources: Vec<EntityRef>,
        #[arg(required = true)]
        permissions: Vec<String>,
    },
    /// Revoke permissions from a member on one or more resources
    Revoke {
        #[arg(long, value_parser = parse_entity_ref)]
        member: EntityRef,
        #[arg(long = "resource", value_parser = parse_entity_ref, required = true)]
        resources: Vec<EntityRef>,
        #[arg(required = true)]
        permissions: Vec<String>,
    },
    /// Check whether a member holds any of the permissions on a resource
    Check {
        #[arg(long, value_parser = parse_entity_ref)]
        member: EntityRef,
        #[arg(long, value_parser = parse_entity_ref)]
        resource: EntityRef,
        #[arg(required = true)]
        permissions: Vec<String>,
        /// Do not expand through the permission chain
        #[arg(long)]
        no_chain: bool,
    },
    /// List the permissions a member holds on a resource (Type:id) or may hold on a type (Type)
    List {
        #[arg(long, value_parser = parse_entity_ref)]
        member: EntityRef,
        #[arg(long, value_parser = parse_resource_target)]
        resource: ResourceTarget,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    load_env();
    init_tracing();

    let cli = Cli::parse();
    let settings = Settings::from_env()?;
    let pool = db::init(&settings).await?;

    if let Commands::Migrate = cli.command {
        println!("Migrations applied");
        return Ok(ExitCode::SUCCESS);
    }

    let config_path = settings
        .config_path
        .as_deref()
        .context("PERMISSABLE_CONFIG not set")?;
    let config = PermissableConfig::from_path(config_path)?;
    let permissable = Permissable::builder(SqliteGrantStore::new(pool))
        .config(&config)?
        .build()?;

    match run(&permissable, cli.command).await {
        Ok(code) => Ok(code),
        Err(err) => {
            tracing::error!(kind = err.kind(), error = %err, "command failed");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run(permissable: &Permissable<SqliteGrantStore>, command: Commands) -> PermissableResult<ExitCode> {
    match command {
        Commands::Migrate => {}
        Commands::Grant { member, resources, permissions } => {
            let targets: Vec<ResourceTarget> = resources.into_iter().map(ResourceTarget::from).collect();
            let created = permissable.member(member)?.grant(permissions, &targets).await?;
            for grant in &created {
                println!("{}\t{}\t{}", grant.member(), grant.resource(), grant.permission_name);
            }
            println!("{} grant(s) created", created.len());
        }
        Commands::Revoke { member, resources, permissions } => {
            let targets: Vec<ResourceTarget> = resources.into_iter().map(ResourceTarget::from).collect();
            let removed = permissable.member(member)?.revoke(permissions, &targets).await?;
            println!("{} grant(s) removed", removed);
        }
        Commands::Check { member, resource, permissions, no_chain } => {
            let decision = permissable
                .member(member)?
                .check(permissions, &resource, !no_chain)
                .await?;
            println!("{}", decision.as_str());
            if !decision.is_allowed() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::List { member, resource } => {
            let permissions = permissable.member(member)?.permissions_for(&resource).await?;
            for permission in permissions {
                println!("{permission}");
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn parse_entity_ref(raw: &str) -> Result<EntityRef, String> {
    match raw.split_once(':') {
        Some((type_name, id)) if !type_name.is_empty() && !id.is_empty() => Ok(EntityRef::new(type_name, id)),
        _ => Err(format!("expected Type:id, got `{raw}`")),
    }
}

fn parse_resource_target(raw: &str) -> Result<ResourceTarget, String> {
    if raw.contains(':') {
        parse_entity_ref(raw).map(ResourceTarget::from)
    } else if raw.is_empty() {
        Err("expected Type or Type:id".to_string())
    } else {
        Ok(ResourceTarget::of_type(raw))
    }
}

fn load_env() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    let _ = dotenvy::from_path(crate_env);
}

fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr);

    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
