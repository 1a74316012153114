mod analytics;
mod api;
mod config;
mod db;
mod error;
mod extractor;
mod fetcher;
mod scrape;
mod session;
mod types;

use std::io::Read;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::api::health::HealthState;
use crate::api::routes::{router, ApiState};
use crate::config::Config;
use crate::db::SalesStore;
use crate::error::Result;
use crate::fetcher::MarketplaceClient;
use crate::scrape::{successes_or_last_error, Scraper};
use crate::session::{CookieSet, SessionManager};

#[derive(Parser)]
#[command(name = "scanner")]
#[command(about = "LEGO resale scanner: scrapes marketplace sales and serves price indicators")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API (default)
    Serve,

    /// Scrape one or more set numbers and print their indicators
    Scrape {
        /// Five-digit LEGO set numbers
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Read a raw `Cookie` header from stdin and store it as the session cache
    ImportCookies,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    let result = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(cfg).await,
        Command::Scrape { ids } => scrape(cfg, ids).await,
        Command::ImportCookies => import_cookies(cfg).await,
    };

    if let Err(e) = result {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

struct Services {
    scraper: Arc<Scraper<SessionManager, MarketplaceClient>>,
    session: Arc<SessionManager>,
    health: Arc<HealthState>,
}

async fn build_services(cfg: &Config) -> Result<Services> {
    let pool = db::connect(&cfg.db_path).await?;
    info!("Database ready at {}", cfg.db_path);

    let session = Arc::new(SessionManager::new(cfg)?);
    let source = Arc::new(MarketplaceClient::new(cfg)?);
    let health = Arc::new(HealthState::new());
    let scraper = Arc::new(Scraper::new(
        session.clone(),
        source,
        SalesStore::new(pool),
        health.clone(),
    ));
    Ok(Services { scraper, session, health })
}

async fn serve(cfg: Config) -> Result<()> {
    let services = build_services(&cfg).await?;

    let app = router(ApiState {
        scraper: services.scraper,
        session: services.session,
        health: services.health,
    });
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}

async fn scrape(cfg: Config, ids: Vec<String>) -> Result<()> {
    let services = build_services(&cfg).await?;
    let results = services
        .scraper
        .scrape_many(&ids, cfg.scrape_concurrency)
        .await;

    for (id, scrape) in successes_or_last_error(results)? {
        let report = services.scraper.report(&id).await?;
        println!("{report}");
        println!(
            "  stored {} of {} upstream items (brand -{}, price -{}, malformed -{}, dup -{})",
            scrape.stored,
            scrape.stats.api_total,
            scrape.stats.rejected_brand,
            scrape.stats.rejected_price,
            scrape.stats.rejected_malformed,
            scrape.stats.duplicates,
        );
    }
    Ok(())
}

async fn import_cookies(cfg: Config) -> Result<()> {
    let mut raw = String::new();
    std::io::stdin().read_to_string(&mut raw)?;
    let set = CookieSet::from_cookie_header(raw.trim().trim_start_matches("Cookie:"));

    SessionManager::new(&cfg)?.import(set).await
}
