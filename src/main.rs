use anyhow::{Context, Result};
use axum::Router;
use biodiversity_records::{
    app_state,
    config::{AppConfig, StartupAction},
    db, routes,
    services::{account_service::AccountService, anchor::MockAnchor, media_store::MediaStore},
    state::Pagination,
};
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + startup action ---
    let (cfg, action) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting biodiversity-records with config: {:?}", cfg);

    // --- Initialize SQLite connection ---
    let db = Arc::new(db::connect(&cfg.database_url).await?);
    db::run_migrations(&db).await?;

    match action {
        StartupAction::Migrate => {
            tracing::info!("Database migration complete.");
            return Ok(());
        }
        StartupAction::CreateAccount { username, staff } => {
            let (account, token) = AccountService::new(db.clone())
                .create_account(&username, staff)
                .await
                .with_context(|| format!("creating account `{}`", username))?;
            tracing::info!(account_id = %account.id, staff, "account created");
            println!("{}", token);
            return Ok(());
        }
        StartupAction::Serve => {}
    }

    // --- Ensure media directory exists ---
    if !Path::new(&cfg.media_dir).exists() {
        fs::create_dir_all(&cfg.media_dir)
            .with_context(|| format!("creating media directory {}", cfg.media_dir))?;
        tracing::info!("Created media directory at {}", cfg.media_dir);
    }

    // --- Initialize services ---
    let state = app_state(
        db,
        MediaStore::new(&cfg.media_dir),
        Arc::new(MockAnchor),
        Pagination {
            default_page_size: cfg.page_size,
            max_page_size: cfg.max_page_size,
        },
    );

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
