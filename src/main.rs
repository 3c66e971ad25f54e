use actix_cors::Cors;
use actix_web::{middleware::Compress, web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use tracing::info;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use board_api::config::Config;
use board_api::openapi::ApiDoc;
use board_api::repo::Repo;
use board_api::{AppState, SecurityHeaders};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // .env is read in debug builds only
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = Config::from_env().context("invalid configuration")?;
    info!(mode = ?cfg.status_mode, "Bootstrapping board server");

    let repo = open_repo(&cfg).await?;
    let state = AppState::new(repo.clone(), cfg.status_mode);
    let openapi = ApiDoc::openapi();

    let app_cfg = cfg.clone();
    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(SecurityHeaders::from_config(&app_cfg))
            .wrap(cors(&app_cfg))
            .app_data(web::Data::new(state.clone()))
            .configure(board_api::config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind((cfg.bind_addr.as_str(), cfg.port))
    .with_context(|| format!("failed to bind {}:{}", cfg.bind_addr, cfg.port))?;

    info!("Listening on http://{}:{}", cfg.bind_addr, cfg.port);
    let served = server.run().await;

    // runs after SIGINT/SIGTERM once in-flight requests drain
    info!("Server stopped; closing storage");
    repo.close().await;
    served.context("server error")
}

fn cors(cfg: &Config) -> Cors {
    let mut c = Cors::default()
        // local frontends during development
        .allowed_origin("http://localhost:5173")
        .allowed_origin("http://127.0.0.1:5173")
        .allowed_origin("http://localhost:3000")
        .allowed_origin("http://127.0.0.1:3000")
        .allow_any_header()
        .allowed_methods(["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .max_age(3600);
    if let Some(front) = &cfg.frontend_url {
        c = c.allowed_origin(front);
    }
    c
}

#[cfg(feature = "postgres-store")]
async fn open_repo(cfg: &Config) -> anyhow::Result<Arc<dyn Repo>> {
    use board_api::repo::pg::PgRepo;

    let url = cfg
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set for postgres-store")?;
    let repo = PgRepo::connect(url, cfg.db_max_connections)
        .await
        .context("failed to connect to Postgres")?;
    info!("Using Postgres repository backend");
    Ok(Arc::new(repo))
}

#[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
async fn open_repo(cfg: &Config) -> anyhow::Result<Arc<dyn Repo>> {
    use board_api::repo::inmem::InMemRepo;

    info!(dir = %cfg.data_dir.display(), "Using in-memory repository backend");
    let repo = InMemRepo::open(&cfg.data_dir).context("failed to load board snapshot")?;
    Ok(Arc::new(repo))
}
