use std::sync::Arc;
use std::time::Duration;

use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cache;
mod config;
mod hotspots;
mod inflight;
mod location;
mod routes;

use cache::CacheService;
use config::Config;
use hotspots::firms::FirmsClient;
use hotspots::service::FireService;
use location::boundaries::BoundarySet;
use location::enricher::LocationEnricher;
use location::geocoder::ReverseGeocoder;
use routes::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "queimadas_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // The boundary dataset is optional: without it every enrichment
    // request goes straight to the fallback geocoder.
    let boundaries = match BoundarySet::load(&config.boundaries_path) {
        Ok(set) => {
            tracing::info!("loaded {} municipality zones", set.zone_count());
            Some(Arc::new(set))
        }
        Err(e) => {
            tracing::warn!(
                "boundary dataset unavailable ({}), using reverse geocoding only",
                e
            );
            None
        }
    };

    let cache = Arc::new(CacheService::new(Duration::from_secs(config.cache_ttl_secs)));

    let provider = FirmsClient::new(
        config.firms_base_url.clone(),
        config.firms_map_key.clone(),
        config.firms_area.clone(),
    );
    let geocoder = ReverseGeocoder::new(
        config.geocode_base_url.clone(),
        config.geocode_api_key.clone(),
    );
    let enricher = LocationEnricher::new(boundaries, geocoder);

    let fires = Arc::new(FireService::new(
        provider,
        enricher,
        cache,
        config.firms_sources.clone(),
        config.firms_area.clone(),
        config.max_all_records,
    ));

    let state = AppState { fires };

    let app = create_router(state).layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server starting on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
