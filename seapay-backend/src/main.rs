use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::sync::Arc;

mod ai;
mod config;
mod controllers;
mod db;
mod gateway;
mod mcp;
mod models;
mod server;
mod tools;
mod widgets;
mod x402;

use ai::OpenAIClient;
use config::Config;
use db::Database;
use mcp::McpClient;
use server::BookingServer;
use widgets::WidgetLibrary;

pub struct AppState {
    pub db: Arc<Database>,
    pub config: Config,
    pub server: Arc<BookingServer>,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env();
    let port = config.port;

    log::info!("Initializing database at {}", config.database_url);
    let db = Database::new(&config.database_url).expect("Failed to initialize database");
    let db = Arc::new(db);

    log::info!("Initializing tool registry");
    let tool_registry = Arc::new(tools::create_default_registry());
    log::info!("Registered {} tools", tool_registry.len());

    log::info!("Loading widget templates");
    let widgets = WidgetLibrary::load(config.widgets_dir.as_deref())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    if config.openai_api_key.is_none() {
        log::warn!("OPENAI_API_KEY is not set - model requests will be sent without credentials");
    }
    let ai_client = OpenAIClient::new(
        config.openai_api_key.as_deref().unwrap_or(""),
        Some(&config.ai_endpoint),
        Some(&config.ai_model),
        Some(config.ai_max_tokens),
    )
    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    log::info!("Using model {} at {}", ai_client.model(), config.ai_endpoint);

    let mcp = match config.mcp_url.as_deref() {
        Some(url) => {
            let client = McpClient::new(url).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
            // A server that is not up yet is retried on the first tool call
            if let Err(e) = client.initialize().await {
                log::warn!("[MCP] Initial handshake with {} failed: {}", url, e);
            } else {
                log::info!("[MCP] Connected to {}", url);
            }
            Some(Arc::new(client))
        }
        None => {
            log::warn!("SEAPAY_MCP_URL is not set - availability and reservation tools are disabled");
            None
        }
    };

    if config::wallet_private_key().is_none() {
        log::warn!("PRIVATE_KEY is not set - payments cannot be made");
    }
    if let Some(cap) = config.x402_max_payment_atomic {
        log::info!("[X402] Payments capped at {} atomic units", cap);
    }

    let server = Arc::new(BookingServer::new(
        db.clone(),
        Arc::new(ai_client),
        tool_registry,
        mcp,
        Arc::new(widgets),
        Arc::new(config.clone()),
    ));

    log::info!("Starting SeaPay server on port {}", port);
    log::info!("ChatKit endpoint available at /chatkit");

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(AppState {
                db: Arc::clone(&db),
                config: config.clone(),
                server: Arc::clone(&server),
            }))
            .wrap(Logger::default())
            .wrap(cors)
            .configure(controllers::health::config)
            .configure(controllers::chatkit::config)
            .configure(controllers::threads::config)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
