//! `cms-server`: runs the API, applies the content model, or checks it.
//!
//! Settings come from the environment (a `.env` file is honored); see `Settings::from_env`.

use clap::{Parser, Subcommand};
use modular_site_cms::{
    app_router, apply_migrations, ensure_database_exists, is_schema_version_applied, load_from_dir, model_checksum,
    resolve, AppState, Settings,
};
use sqlx::postgres::PgPoolOptions;
use std::path::PathBuf;
use tokio::net::TcpListener;

#[derive(Parser, Debug)]
#[command(name = "cms-server", about = "Modular-site CMS backend", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Content model directory (overrides CONTENT_CONFIG_PATH)
    #[arg(long, global = true)]
    content: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Command {
    /// Serve the HTTP API (default)
    Serve,
    /// Create the database if needed, apply the content model and system tables
    Migrate,
    /// Load and validate the content model without touching the database
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("modular_site_cms=info,cms_server=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut settings = Settings::from_env()?;
    if let Some(dir) = cli.content {
        settings.content_config_path = dir;
    }

    let config = load_from_dir(&settings.content_config_path).await?;
    let model = resolve(&config)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::CheckConfig => {
            let checksum = model_checksum(&config)?;
            let mut segments = model.path_segments();
            segments.sort_unstable();
            tracing::info!(entities = ?segments, %checksum, "content model is valid");
        }
        Command::Migrate => {
            ensure_database_exists(&settings.database_url).await?;
            let pool = PgPoolOptions::new()
                .max_connections(settings.db_max_connections)
                .connect(&settings.database_url)
                .await?;
            let tables = apply_migrations(&pool, &config, &settings.cms_schema).await?;
            tracing::info!(tables = tables.len(), "migration finished");
        }
        Command::Serve => {
            let pool = PgPoolOptions::new()
                .max_connections(settings.db_max_connections)
                .connect(&settings.database_url)
                .await?;
            let checksum = model_checksum(&config)?;
            match is_schema_version_applied(&pool, &settings.cms_schema, &checksum).await {
                Ok(true) => {}
                Ok(false) => tracing::warn!(%checksum, "content model has not been migrated; run `cms-server migrate`"),
                Err(e) => tracing::warn!(error = %e, "could not read schema history"),
            }
            let addr = settings.bind_addr();
            let app = app_router(AppState::new(pool, model, settings));
            let listener = TcpListener::bind(&addr).await?;
            tracing::info!("cms-server listening on http://{}", listener.local_addr()?);
            axum::serve(listener, app).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subcommands_parse() {
        let cli = Cli::try_parse_from(["cms-server", "migrate", "--content", "/tmp/model"]).unwrap();
        assert_eq!(cli.command, Some(Command::Migrate));
        assert_eq!(cli.content, Some(PathBuf::from("/tmp/model")));
        let cli = Cli::try_parse_from(["cms-server"]).unwrap();
        assert_eq!(cli.command, None);
        assert!(Cli::try_parse_from(["cms-server", "reset"]).is_err());
    }
}
