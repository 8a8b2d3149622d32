use anyhow::Result;
use common::database::{self, DatabaseConfig};
use search::{ElasticsearchConfig, ElasticsearchIndex, MemoryIndex, SearchIndex};
use sqlx::migrate::Migrator;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use blog::{build_state, config::Settings, models::Post, routes};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let reindex_only = std::env::args().nth(1).as_deref() == Some("reindex");
    info!("Starting blog service");

    let settings = Settings::load()?;
    if settings.debug {
        warn!("Debug mode is enabled");
    }

    // Initialize database connection pool
    let db_config = DatabaseConfig::from_env()?;
    let pool = database::init_pool(&db_config).await?;

    if database::health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }
    database::run_migrations(&pool, &MIGRATOR).await?;

    let (index, in_process): (Arc<dyn SearchIndex>, bool) = match ElasticsearchConfig::from_env() {
        Some(config) => (Arc::new(ElasticsearchIndex::new(&config)?), false),
        None => {
            info!("ELASTICSEARCH_URL not set, using the in-process search index");
            (Arc::new(MemoryIndex::new()), true)
        }
    };

    let bind_address = settings.bind_address.clone();
    let state = build_state(settings, pool, index)?;

    // The in-process index starts empty on every boot.
    if reindex_only || in_process {
        let indexed = state.search.reindex::<Post, _>(&state.posts).await?;
        info!("Indexed {} posts into {}", indexed, state.search.backend());
        if reindex_only {
            return Ok(());
        }
    }

    let app = routes::create_router(state);

    let listener = TcpListener::bind(&bind_address).await?;
    info!("Blog service listening on {}", bind_address);
    axum::serve(listener, app).await?;

    Ok(())
}
