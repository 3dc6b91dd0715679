use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use serde::Serialize;
use showlist::{
    config::{
        database::{create_connection, create_tables},
        limits::{load_config, load_default_config},
        users,
    },
    core::{
        Pipeline,
        actor::Actor,
        discovery::{DiscoveredEvent, EventKey, check_events, import_events},
        import::{
            confirm_bulk_import, confirm_show_import, export_shows, preview_bulk_import,
            preview_show_import,
        },
        lifecycle::{approve_show, reject_show},
        venues::verify_venue,
    },
    errors::{Error, Result},
};
use std::{fs, path::PathBuf};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "showlist")]
#[command(about = "Show submission and moderation pipeline admin tool")]
#[command(version)]
struct Cli {
    /// User the command acts for; admin rights come from SHOWLIST_ADMIN_IDS
    #[arg(long, env = "SHOWLIST_USER_ID", global = true)]
    user_id: Option<i64>,

    /// Path to showlist.toml (defaults to ./showlist.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the catalog tables
    InitDb,
    /// Preview markdown show files without writing anything
    Preview {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Import markdown show files
    Import {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print shows as markdown
    Export {
        #[arg(required = true)]
        show_ids: Vec<i64>,
    },
    /// Check which scraped events are already imported (JSON array of keys)
    CheckEvents { file: PathBuf },
    /// Import scraped events (JSON array of events)
    ImportEvents {
        file: PathBuf,
        /// Classify only, write nothing
        #[arg(long)]
        dry_run: bool,
        /// Update shows that were already imported
        #[arg(long)]
        allow_updates: bool,
    },
    /// Approve a pending show
    Approve {
        show_id: i64,
        /// Also verify the show's unverified venues
        #[arg(long)]
        verify_venues: bool,
    },
    /// Reject a pending show
    Reject {
        show_id: i64,
        #[arg(long)]
        reason: String,
    },
    /// Mark a venue verified
    VerifyVenue { venue_id: i64 },
}

fn actor_for(user_id: Option<i64>) -> Actor {
    user_id.map_or_else(Actor::anonymous, |id| {
        if users::is_admin(id) {
            Actor::admin(id)
        } else {
            Actor::user(id)
        }
    })
}

fn read_files(paths: &[PathBuf]) -> Result<Vec<Vec<u8>>> {
    paths
        .iter()
        .map(|p| fs::read(p).map_err(Error::from))
        .collect()
}

fn read_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Result<T> {
    let contents = fs::read_to_string(path)?;
    serde_json::from_str(&contents).map_err(Into::into)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();

    let cli = Cli::parse();

    // 3. Configuration and database
    let config = match &cli.config {
        Some(path) => load_config(path),
        None => load_default_config(),
    }
    .inspect_err(|e| error!("Failed to load configuration: {}", e))?;

    let db = create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    create_tables(&db).await?;

    let pipeline = Pipeline::new(db).with_limits(config.limits);
    let actor = actor_for(cli.user_id);

    match cli.command {
        Commands::InitDb => info!("Database ready"),
        Commands::Preview { files } => {
            let contents = read_files(&files)?;
            if let [single] = contents.as_slice() {
                print_json(&preview_show_import(&pipeline, &actor, single).await?)?;
            } else {
                print_json(&preview_bulk_import(&pipeline, &actor, &contents).await?)?;
            }
        }
        Commands::Import { files } => {
            let contents = read_files(&files)?;
            if let [single] = contents.as_slice() {
                print_json(&confirm_show_import(&pipeline, &actor, single).await?)?;
            } else {
                print_json(&confirm_bulk_import(&pipeline, &actor, &contents).await?)?;
            }
        }
        Commands::Export { show_ids } => {
            for item in export_shows(&pipeline, &actor, &show_ids).await? {
                match (item.markdown, item.error) {
                    (Some(markdown), _) => println!("{markdown}"),
                    (None, error) => error!(
                        show_id = item.show_id,
                        error = error.as_deref().unwrap_or("unknown"),
                        "Export failed"
                    ),
                }
            }
        }
        Commands::CheckEvents { file } => {
            let keys: Vec<EventKey> = read_json(&file)?;
            print_json(&check_events(&pipeline, &actor, &keys).await?)?;
        }
        Commands::ImportEvents {
            file,
            dry_run,
            allow_updates,
        } => {
            let events: Vec<DiscoveredEvent> = read_json(&file)?;
            print_json(&import_events(&pipeline, &actor, &events, dry_run, allow_updates).await?)?;
        }
        Commands::Approve {
            show_id,
            verify_venues,
        } => {
            print_json(&approve_show(&pipeline, &actor, show_id, verify_venues).await?)?;
        }
        Commands::Reject { show_id, reason } => {
            print_json(&reject_show(&pipeline, &actor, show_id, &reason).await?)?;
        }
        Commands::VerifyVenue { venue_id } => {
            print_json(&verify_venue(&pipeline, &actor, venue_id).await?)?;
        }
    }

    Ok(())
}
