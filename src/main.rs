//! Keygate application entry point.
//!
//! Bootstraps the server:
//! 1. Load configuration from environment
//! 2. Open the SQLite key store, connect to Redis, build the S3 client
//! 3. Build the authentication gate and router
//! 4. Start Axum server with graceful shutdown
//!
//! Also supports `keygen` and `sign` subcommands for client-side use.

use base64::{engine::general_purpose, Engine as _};
use keygate::{
    auth::{canonical_request, sign_canonical, AppState},
    config::Config,
    keys::{KeyPairGenerator, DEFAULT_KEY_SIZE, DEFAULT_PUBLIC_EXPONENT},
    middleware::security_headers,
    routes,
    storage::{RedisCache, S3Storage, SqliteKeyStore},
};
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  keygate                                   Run the API server");
    eprintln!("  keygate keygen [bits]                     Print a new RSA key pair as JSON");
    eprintln!("  keygate sign <private_key_b64> <method> <path> [body]");
    eprintln!("                                            Print auth headers for a request signed now");
    eprintln!("  keygate --version");
}

/// Generate a key pair not bound to any stored identity.
fn keygen(bits: Option<&str>) -> CliResult {
    let bits = match bits {
        Some(b) => b.parse::<usize>()?,
        None => DEFAULT_KEY_SIZE,
    };
    let pair = KeyPairGenerator::new(bits, DEFAULT_PUBLIC_EXPONENT)?.generate("local")?;
    let output = serde_json::json!({
        "key_id": pair.record.key_id,
        "key_size": pair.record.key_size,
        "private_key": general_purpose::STANDARD.encode(pair.private_key.as_slice()),
        "public_key": general_purpose::STANDARD.encode(&pair.record.public_key),
        "fingerprint": pair.record.fingerprint,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn sign(private_key_b64: &str, method: &str, path: &str, body: &str) -> CliResult {
    let private_key = zeroize::Zeroizing::new(general_purpose::STANDARD.decode(private_key_b64)?);
    let timestamp = keygate::unix_now().to_string();
    let message = canonical_request(method, path, &timestamp, body.as_bytes());
    let signature = sign_canonical(&private_key, &message)?;
    println!("X-Timestamp: {}", timestamp);
    println!("X-Signature: {}", general_purpose::STANDARD.encode(signature));
    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

async fn serve() -> CliResult {
    // Initialize tracing with env filter support (RUST_LOG)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    tracing::info!(config = ?config, "Starting keygate on {}", config.bind_addr);

    let store = SqliteKeyStore::open(&config.database_path)?;
    tracing::info!(path = %config.database_path.display(), "Opened key store");

    let cache = RedisCache::connect(&config.redis_url).await?;
    tracing::info!("Connected to Redis");

    let objects = S3Storage::connect(
        &config.s3_bucket,
        &config.s3_region,
        config.s3_endpoint_url.as_deref(),
    )
    .await;
    tracing::info!(bucket = %objects.bucket(), region = %config.s3_region, "Configured object storage");

    let bind_addr = config.bind_addr;
    let max_body_bytes = config.max_body_bytes;
    let state = AppState::new(
        config,
        Arc::new(store),
        Arc::new(cache),
        Arc::new(objects),
    )?;

    let app = routes::api_router(&state)
        .layer(axum::extract::DefaultBodyLimit::max(max_body_bytes))
        .layer(axum::middleware::from_fn(security_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("Listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    let result = match args.get(1).map(String::as_str) {
        None => serve().await,
        Some("keygen") if args.len() <= 3 => keygen(args.get(2).map(String::as_str)),
        Some("sign") if (5..=6).contains(&args.len()) => sign(
            &args[2],
            &args[3],
            &args[4],
            args.get(5).map(String::as_str).unwrap_or(""),
        ),
        Some("--version") | Some("-V") => {
            println!("keygate {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some("--help") | Some("-h") => {
            print_usage();
            Ok(())
        }
        Some(_) => {
            print_usage();
            std::process::exit(2);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
