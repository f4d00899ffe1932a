#![allow(clippy::manual_unwrap_or_default)]
#![allow(clippy::manual_unwrap_or)]
use colloquy::db::init_db;
use colloquy::logging::{init_tracing, setup_panic_hook};
use colloquy::server::router;
use colloquy::*;

use clap::Parser;
use colored::*;
use std::net::SocketAddr;
use std::sync::Arc;

async fn print_banner(state: &AppState) {
    let args = &state.args;
    println!("{}", "Starting Colloquy chat server".bold().green());
    println!("  {} {}", "Upload folder:".cyan(), args.upload_dir);
    println!("  {} {}", "Database:".cyan(), args.database);
    println!("  {} {}", "Backend URL:".cyan(), state.backend.base_url());

    let features = state.capabilities.feature_names();
    if features.is_empty() {
        println!("  {}", "Running with basic features only".yellow());
    } else {
        println!("  {} {}", "Available features:".cyan(), features.join(", "));
    }

    let extensions: Vec<&str> = state.capabilities.allowed_extensions().into_iter().collect();
    println!("  {} {}", "Allowed file types:".cyan(), extensions.join(", "));
    println!("  {} {}", "Formatter:".cyan(), state.formatter.engine_name());

    let models = state.backend.list_models().await;
    if models.is_empty() {
        println!(
            "  {}",
            format!("Backend not reachable at {}", state.backend.base_url()).red()
        );
        tracing::warn!("Backend not reachable at {}", state.backend.base_url());
    } else {
        println!("  {} {}", "Backend models:".cyan(), models.join(", "));
        tracing::info!("Backend reachable, {} models available", models.len());
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let _guard = init_tracing(&args.log_dir, args.json_logs);
    setup_panic_hook();

    let db = match init_db(&args.database).await {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = tokio::fs::create_dir_all(&args.upload_dir).await {
        eprintln!("Failed to create upload folder {}: {}", args.upload_dir, e);
        std::process::exit(1);
    }

    let state = match AppState::new(args, db) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            eprintln!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    print_banner(&state).await;

    let addr = format!("{}:{}", state.args.host, state.args.port);
    let app = router(state.clone());

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Colloquy listening on {}", addr);
    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    {
        tracing::error!("Server error: {}", e);
    }
    tracing::info!("Shutting down");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
