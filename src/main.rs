use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::bail;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use atelier::auth::{AccessContext, TokenGenerator};
use atelier::config::ServerConfig;
use atelier::projects::{self, IssuedToken};
use atelier::server::{AppState, create_router};
use atelier::store::{SqliteStore, Store};
use atelier::types::Role;

#[derive(Parser)]
#[command(name = "atelier")]
#[command(about = "Access control and file staging server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database
    Init {
        /// Data directory for the database
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,
    },

    /// Start the server
    Serve {
        /// TOML config file. Flags override its values.
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(long, short)]
        port: Option<u16>,

        /// Data directory for the database
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Header carrying the identity asserted by the fronting identity provider
        #[arg(long)]
        identity_header: Option<String>,
    },

    /// Project commands
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },

    /// Token commands
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },
}

#[derive(Subcommand)]
enum ProjectCommands {
    /// Create a project and its default token
    Create {
        /// Identity of the creator, who always holds the owner role
        #[arg(long)]
        owner: String,

        #[arg(long)]
        name: String,

        /// Role of the default token
        #[arg(long, default_value = "editor", value_parser = parse_role)]
        default_role: Role,

        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,

        /// Print machine-readable output
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum TokenCommands {
    /// Issue an additional project token
    Create {
        #[arg(long)]
        project: String,

        /// Identity to act as; must own the project
        #[arg(long = "as")]
        identity: String,

        #[arg(long, value_parser = parse_role)]
        role: Role,

        #[arg(long)]
        label: Option<String>,

        /// Lifetime in seconds
        #[arg(long)]
        expires_in: Option<i64>,

        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,

        /// Print machine-readable output
        #[arg(long)]
        json: bool,
    },
}

fn parse_role(s: &str) -> Result<Role, String> {
    Role::parse(s).map_err(|e| e.to_string())
}

fn open_store(data_dir: &Path) -> anyhow::Result<SqliteStore> {
    let db_path = data_dir.join("atelier.db");
    if !db_path.exists() {
        bail!(
            "Database not found at {}. Run 'atelier init' first.",
            db_path.display()
        );
    }
    let store = SqliteStore::new(&db_path)?;
    store.initialize()?;
    Ok(store)
}

fn print_token(heading: &str, issued: &IssuedToken) {
    println!();
    println!("========================================");
    println!("{heading} (save this, it won't be shown again):");
    println!();
    println!("  {}", issued.raw);
    println!();
    println!("Role: {}", issued.token.role);
    println!("========================================");
    println!();
}

fn run_init(data_dir: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(data_dir)?;

    let db_path = data_dir.join("atelier.db");
    let store = SqliteStore::new(&db_path)?;
    store.initialize()?;

    println!("Initialized database at {}", db_path.display());
    Ok(())
}

fn run_project_create(
    data_dir: &Path,
    owner: &str,
    name: &str,
    default_role: Role,
    as_json: bool,
) -> anyhow::Result<()> {
    let store = open_store(data_dir)?;
    let created =
        projects::create_project(&store, &TokenGenerator::new(), owner, name, default_role)?;

    if as_json {
        let output = json!({
            "project": created.project,
            "token": created.default_token.raw,
            "token_metadata": created.default_token.token,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!(
            "Created project '{}' ({})",
            created.project.name, created.project.id
        );
        print_token("Default token", &created.default_token);
    }
    Ok(())
}

struct TokenArgs {
    project: String,
    identity: String,
    role: Role,
    label: Option<String>,
    expires_in: Option<i64>,
}

fn run_token_create(data_dir: &Path, args: TokenArgs, as_json: bool) -> anyhow::Result<()> {
    let store = open_store(data_dir)?;
    let ctx = AccessContext::new(args.project).with_identity(args.identity);

    let issued = projects::create_token(
        &store,
        &TokenGenerator::new(),
        &ctx,
        args.role,
        args.label,
        args.expires_in,
    )?;

    if as_json {
        let output = json!({
            "token": issued.raw,
            "metadata": issued.token,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_token("Project token", &issued);
    }
    Ok(())
}

async fn run_serve(
    config_path: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
    data_dir: Option<PathBuf>,
    identity_header: Option<String>,
) -> anyhow::Result<()> {
    let mut config = match config_path {
        Some(path) => ServerConfig::load(&path)?,
        None => ServerConfig::default(),
    };
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(data_dir) = data_dir {
        config.data_dir = data_dir;
    }
    if identity_header.is_some() {
        config.identity_header = identity_header;
    }

    let store = open_store(&config.data_dir)?;
    match &config.identity_header {
        Some(header) => info!("Trusting identity claims from header {}", header),
        None => info!("No identity header configured; only project tokens are accepted"),
    }

    let addr = config.socket_addr()?;
    let state = Arc::new(AppState::new(Arc::new(store), config));
    let app = create_router(state);

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("atelier=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { data_dir } => run_init(&data_dir)?,
        Commands::Serve {
            config,
            host,
            port,
            data_dir,
            identity_header,
        } => run_serve(config, host, port, data_dir, identity_header).await?,
        Commands::Project { command } => match command {
            ProjectCommands::Create {
                owner,
                name,
                default_role,
                data_dir,
                json,
            } => run_project_create(&data_dir, &owner, &name, default_role, json)?,
        },
        Commands::Token { command } => match command {
            TokenCommands::Create {
                project,
                identity,
                role,
                label,
                expires_in,
                data_dir,
                json,
            } => {
                let args = TokenArgs {
                    project,
                    identity,
                    role,
                    label,
                    expires_in,
                };
                run_token_create(&data_dir, args, json)?;
            }
        },
    }

    Ok(())
}
