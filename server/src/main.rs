use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod engine;
mod refresh;
mod routes;
mod upstream;
mod utils;

use config::Config;
use engine::{FetchCache, PlausibilityRule, ResourceConfig, Validator};
use refresh::{RefreshHandle, RefreshSchedule};
use routes::{create_router, AppState};
use upstream::airvisual::AirVisualClient;
use upstream::mock::SampleAirQuality;
use upstream::openmeteo::OpenMeteoClient;
use upstream::{http_client, Attempt, AIR_QUALITY_KEY, WEATHER_KEY};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "airdisplay_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    let cache = build_cache(&config)?;

    let refresher = config.prefetch_enabled.then(|| {
        RefreshHandle::spawn(
            cache.clone(),
            vec![
                RefreshSchedule::new(AIR_QUALITY_KEY, config.air_quality_poll),
                RefreshSchedule::new(WEATHER_KEY, config.weather_poll),
            ],
        )
    });

    let bind_addr = config.bind_addr.clone();
    let state = AppState {
        config: Arc::new(config),
        cache,
    };

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server starting on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(refresher) = refresher {
        refresher.shutdown().await;
    }
    tracing::info!("Server stopped");

    Ok(())
}

fn build_cache(config: &Config) -> anyhow::Result<FetchCache> {
    let air_client = http_client(config.air_quality_timeout)?;
    let weather_client = http_client(config.weather_timeout)?;

    let mut air_quality = ResourceConfig::new(AIR_QUALITY_KEY, config.air_quality_ttl)
        .timeout(config.air_quality_timeout)
        .validator(station_validator(config));

    match &config.iqair_key {
        Some(key) => {
            let primary = AirVisualClient::new(
                air_client.clone(),
                &config.airvisual_base_url,
                key,
                config.aqi_primary.clone(),
            );
            air_quality = air_quality.attempt(Attempt::new(&config.aqi_primary.city, Arc::new(primary)));

            if let Some(secondary) = &config.aqi_secondary {
                let note = format!(
                    "Using {} data ({} unavailable)",
                    secondary.city, config.aqi_primary.city
                );
                let fallback = AirVisualClient::new(air_client, &config.airvisual_base_url, key, secondary.clone());
                air_quality = air_quality.attempt(Attempt::new(&secondary.city, Arc::new(fallback)).with_note(note));
            }
        }
        None => {
            tracing::warn!("IQAIR_KEY is not set, serving sample air quality readings");
            air_quality = air_quality.attempt(Attempt::new(
                "sample",
                Arc::new(SampleAirQuality::new(config.aqi_primary.clone())),
            ));
        }
    }

    let forecast = OpenMeteoClient::new(
        weather_client,
        &config.open_meteo_base_url,
        config.site.clone(),
        &config.app_timezone,
    );
    let weather = ResourceConfig::new(WEATHER_KEY, config.weather_ttl)
        .timeout(config.weather_timeout)
        .attempt(Attempt::new("open-meteo", Arc::new(forecast)))
        .validator(Validator::new(vec![
            PlausibilityRule::new("/current/temperature", -50.0, 60.0, 25.0),
            PlausibilityRule::new("/current/humidity", 1.0, 100.0, 50.0),
        ]));

    Ok(FetchCache::builder().resource(air_quality).resource(weather).build()?)
}

fn station_validator(config: &Config) -> Validator {
    let temperature = &config.station_temperature;
    Validator::new(vec![
        PlausibilityRule::new(
            "/data/current/weather/tp",
            temperature.min,
            temperature.max,
            temperature.fallback,
        ),
        PlausibilityRule::new("/data/current/weather/hu", 1.0, 100.0, 65.0),
        PlausibilityRule::new("/data/current/weather/pr", 870.0, 1085.0, 1013.0),
    ])
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
