//! Imagine server - Main entry point.
//!
//! Starts the Actix-web server with configured routes and middleware.

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, http::header, web};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use imagine_lib::api;
use imagine_lib::config::Config;
use imagine_lib::db::DbPool;
use imagine_lib::middleware::RequestLogger;
use imagine_lib::services::{
    self, CleanupConfig, GenerationSessions, HttpGenerationApi, IdentityResolver, JobOrchestrator,
    OAuthClient,
};

/// Keep expired or revoked refresh tokens for a day before deleting them.
const REFRESH_TOKEN_RETENTION_SECS: u64 = 86_400;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            error!("");
            error!("Please check your environment variables:");
            error!("  - RUST_ENV must be set to 'development' or 'production'");
            error!("  - GOOGLE_CLIENT_ID/SECRET and GITHUB_CLIENT_ID/SECRET must be set");
            error!("  - IMAGINE_GENERATION_API_KEY must be set");
            error!("  - In production, values must not match development defaults");
            std::process::exit(1);
        }
    };

    info!("========================================");
    info!("  Imagine Server");
    info!("  Environment: {}", config.environment);
    info!("========================================");

    if config.is_development() {
        warn!("Running in DEVELOPMENT mode - do not use in production!");
    }

    // Initialize database
    let pool = DbPool::new(&config)
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    info!("Database connection established");

    pool.run_migrations()
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    // Outbound clients
    let generation_api = HttpGenerationApi::new(&config.generation)
        .map_err(|e| std::io::Error::other(format!("generation client: {}", e)))?;
    let oauth_client = OAuthClient::new()
        .map_err(|e| std::io::Error::other(format!("OAuth client: {}", e)))?;

    let orchestrator = Arc::new(JobOrchestrator::new(
        Arc::new(generation_api),
        &config.generation,
    ));
    let generation_sessions = GenerationSessions::new(orchestrator);
    let resolver = IdentityResolver::new(pool.clone());
    info!(
        "Generation API: {} (poll every {:?}, at most {} attempts)",
        config.generation.api_url,
        config.generation.poll_interval,
        config.generation.max_poll_attempts
    );

    // Start the cleanup background task
    let shutdown = CancellationToken::new();
    let cleanup_config = CleanupConfig {
        retention_secs: REFRESH_TOKEN_RETENTION_SECS,
        interval_secs: if config.is_development() { 60 } else { 3600 }, // 1 min dev, 1 hour prod
    };
    services::start_cleanup_task(pool.clone(), cleanup_config, shutdown.clone());

    let bind_address = config.bind_address();
    let frontend_origin = config.frontend_origin.clone();

    let worker_count = if config.is_development() {
        info!(
            "Starting server at http://{} (4 workers - development mode)",
            bind_address
        );
        4
    } else {
        let cpus = num_cpus::get();
        info!(
            "Starting server at http://{} ({} workers)",
            bind_address, cpus
        );
        cpus
    };

    let config = web::Data::new(config);
    let pool = web::Data::new(pool);
    let oauth_client = web::Data::new(oauth_client);
    let resolver = web::Data::new(resolver);
    let generation_sessions = web::Data::new(generation_sessions);

    // Start HTTP server
    let server = HttpServer::new(move || {
        // Credentialed CORS for the browser frontend
        let cors = Cors::default()
            .allowed_origin(&frontend_origin)
            .allowed_methods(vec!["GET", "POST", "DELETE", "OPTIONS"])
            .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE])
            .supports_credentials()
            .max_age(3600);

        App::new()
            // Add CORS middleware (must be before other middleware)
            .wrap(cors)
            // Add request logging middleware
            .wrap(RequestLogger)
            // Add shared state
            .app_data(config.clone())
            .app_data(pool.clone())
            .app_data(oauth_client.clone())
            .app_data(resolver.clone())
            .app_data(generation_sessions.clone())
            // OAuth routes live at the root to match the registered callbacks
            .configure(services::configure_oauth_routes)
            // Configure API routes
            .service(
                web::scope("/api/v1")
                    .configure(api::configure_health_routes)
                    .configure(api::configure_generation_routes),
            )
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api/v1/openapi.json", api::ApiDoc::openapi()),
            )
    });

    // Set worker count
    let result = server
        .workers(worker_count)
        .bind(&bind_address)?
        .run()
        .await;

    shutdown.cancel();
    result
}
