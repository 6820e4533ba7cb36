use std::sync::Arc;

use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use anyhow::Context;
use dotenvy::dotenv;
use tracing::{error, info};
use tracing_appender::rolling;
use utoipa::OpenApi; // ← needed for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use geo_attendance::clock::SystemClock;
use geo_attendance::config::Config;
use geo_attendance::db::init_db;
use geo_attendance::docs::ApiDoc;
use geo_attendance::routes;
use geo_attendance::service::AttendanceService;
use geo_attendance::store::mysql::MySqlStore;
use geo_attendance::utils::location_cache::CachedLocationRegistry;

#[get("/")]
async fn index() -> impl Responder {
    "Geo Attendance"
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!(
        utc_offset = %config.day_policy.offset(),
        "Server starting..."
    );

    let pool = init_db(&config.database_url).await?;
    let store = Arc::new(MySqlStore::new(pool.clone()));

    let locations = Arc::new(CachedLocationRegistry::new(
        store.clone(),
        config.location_cache_ttl,
    ));

    let locations_for_warmup = locations.clone();
    actix_web::rt::spawn(async move {
        if let Err(e) = locations_for_warmup.warmup().await {
            error!(error = ?e, "Failed to warmup location cache");
        }
    });

    let service = Data::new(AttendanceService::new(
        store,
        locations,
        Arc::new(SystemClock),
        config.day_policy,
    ));

    // Clone values for the closure (avoid move issues)
    let server_addr = config.server_addr.clone();
    let config_data = config.clone();

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // ← important: wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(Data::new(pool.clone()))
            .app_data(Data::new(config.clone()))
            .app_data(service.clone())
            .service(index)
            // Configure auth + protected routes with rate limiting
            .configure(|cfg| routes::configure(cfg, config_data.clone()))
    })
    .bind(&server_addr)
    .with_context(|| format!("Failed to bind {server_addr}"))?
    .run()
    .await?;

    Ok(())
}
