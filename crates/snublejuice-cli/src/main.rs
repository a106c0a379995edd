mod catalog;
mod query;

use clap::{Parser, Subcommand};
use snublejuice_core::Channel;
use tracing_subscriber::EnvFilter;

use crate::query::QueryArgs;

#[derive(Debug, Parser)]
#[command(name = "snublejuice-cli")]
#[command(about = "Snublejuice catalog maintenance and query tool")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Upsert products from a JSON array file
    Seed {
        /// Path to a JSON file holding an array of products
        file: std::path::PathBuf,
        /// Parse and validate without writing to the database
        #[arg(long)]
        dry_run: bool,
    },
    /// Record a scraped price for one product
    Price {
        /// Monopoly product index
        index: i64,
        /// Price in NOK
        price: f64,
        /// Record into the duty-free overlay under this duty-free index
        #[arg(long)]
        taxfree: Option<i64>,
    },
    /// Flag a channel's prices as fresh or stale
    Stock {
        /// `vinmonopolet` or `taxfree`
        channel: Channel,
        /// `false` opens a scrape cycle, `true` closes it
        #[arg(long, action = clap::ArgAction::Set)]
        fresh: bool,
    },
    /// Run a storefront listing query and print the page
    Query(QueryArgs),
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check database connectivity
    Ping,
    /// Apply pending migrations
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("snublejuice-cli ready; run with --help for commands");
        return Ok(());
    };

    if let Commands::Seed {
        file,
        dry_run: true,
    } = &command
    {
        let products = catalog::read_seed_file(file)?;
        println!("{} products parsed from {}", products.len(), file.display());
        return Ok(());
    }

    let config = snublejuice_core::load_app_config()?;
    let pool_config = snublejuice_db::PoolConfig::from_app_config(&config);
    let pool = snublejuice_db::connect_pool(&config.database_url, pool_config).await?;

    match command {
        Commands::Db {
            command: DbCommands::Ping,
        } => {
            snublejuice_db::health_check(&pool).await?;
            println!("database ok");
        }
        Commands::Db {
            command: DbCommands::Migrate,
        } => {
            let applied = snublejuice_db::run_migrations(&pool).await?;
            println!("{applied} migrations applied");
        }
        Commands::Seed { file, .. } => catalog::run_seed(&pool, &file).await?,
        Commands::Price {
            index,
            price,
            taxfree,
        } => catalog::run_price(&pool, index, price, taxfree).await?,
        Commands::Stock { channel, fresh } => catalog::run_stock(&pool, channel, fresh).await?,
        Commands::Query(args) => {
            let catalog = snublejuice_core::load_catalog(&config.catalog_path)?;
            query::run_query(&pool, &catalog, config.per_page, args).await?;
        }
    }

    Ok(())
}
