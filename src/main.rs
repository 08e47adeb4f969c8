use actix_cors::Cors;
use actix_web::{middleware::Compress, web, App, HttpServer};
use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use margin::config::ServerConfig;
use margin::notify::build_notifier;
use margin::openapi::ApiDoc;
use margin::rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
use margin::repo::Repo;
use margin::{config, AppState};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env automatically only in debug builds.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    let problems = ServerConfig::validate_env();
    if !problems.is_empty() {
        for p in &problems {
            eprintln!("{p}");
        }
        eprintln!("Please copy .env.example to .env and configure it");
        std::process::exit(1);
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let cfg = ServerConfig::from_env();
    info!("Bootstrapping margin server");
    info!("Frontend URL: {}", cfg.frontend_url.as_deref().unwrap_or("http://localhost:5173"));

    let repo = build_repo().await?;
    let notifier = build_notifier(cfg.moderation_webhook_url.as_deref(), cfg.moderation_webhook_timeout);
    let limiter = RateLimiterFacade::new(InMemoryRateLimiter::new(cfg.rate_limit_enabled), RateLimitConfig::from_env());
    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("installing prometheus recorder")?;

    let state = AppState::new(repo, notifier).with_rate_limiter(limiter).with_metrics(metrics);
    let openapi = ApiDoc::openapi();
    info!("OpenAPI spec generated");

    let frontend = cfg.frontend_url.clone();
    let server = HttpServer::new(move || {
        let mut cors = Cors::default()
            // local dev frontends
            .allowed_origin("http://localhost:5173")
            .allowed_origin("http://127.0.0.1:5173")
            .allow_any_header()
            .allowed_methods(["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
            .supports_credentials()
            .max_age(3600);
        if let Some(front) = &frontend {
            cors = cors.allowed_origin(front);
        }

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(cors)
            .app_data(web::Data::new(state.clone()))
            .configure(config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind(cfg.bind.as_str())
    .with_context(|| format!("binding {}", cfg.bind))?;

    info!("Listening on http://{}", cfg.bind);
    server.run().await?;
    Ok(())
}

#[cfg(not(feature = "postgres-store"))]
async fn build_repo() -> anyhow::Result<Arc<dyn Repo>> {
    let repo = margin::repo::inmem::InMemRepo::from_env();
    info!("Using in-memory repository backend");
    Ok(Arc::new(repo))
}

#[cfg(feature = "postgres-store")]
async fn build_repo() -> anyhow::Result<Arc<dyn Repo>> {
    use sqlx::postgres::PgPoolOptions;
    let db_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set for postgres-store")?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await
        .context("connecting to Postgres")?;
    sqlx::migrate!("./migrations").run(&pool).await.context("running migrations")?;
    info!("Using Postgres repository backend");
    Ok(Arc::new(margin::repo::pg::PgRepo::new(pool)))
}
