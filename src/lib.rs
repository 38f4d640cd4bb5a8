//! Printer Service CRM backend.
//!
//! A JSON HTTP service for a printer-repair shop: intake of service tickets,
//! status tracking, receipts, and a spreadsheet- or SQLite-backed order
//! table. `main.rs` only calls [`run`].

use std::sync::Arc;

use anyhow::Context as _;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod auth;
pub mod commands;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod escpos;
pub mod order_id;
pub mod orders;
pub mod print;
pub mod printers;
pub mod receipt_renderer;
pub mod records;
pub mod reports;
pub mod service;
pub mod storage;
pub mod store;

use crate::auth::AuthState;
use crate::config::{AppConfig, Backend};
use crate::print::ReceiptPrinter;
use crate::service::OrderService;
use crate::storage::{CredentialStore, KEY_SHEETS_TOKEN};
use crate::store::{MemoryStore, OrderStore, SheetsConfig, SheetsStore, SqliteStore};

/// Shared state handed to every HTTP handler.
#[derive(Clone)]
pub struct AppState {
    pub orders: OrderService,
    pub auth: Arc<AuthState>,
    pub receipts: Arc<ReceiptPrinter>,
}

impl AppState {
    pub fn new(orders: OrderService, auth: AuthState, receipts: ReceiptPrinter) -> Self {
        Self {
            orders,
            auth: Arc::new(auth),
            receipts: Arc::new(receipts),
        }
    }
}

/// Build the configured order store. Blocking: the Sheets client must not
/// be created on an async worker thread.
pub fn open_store(
    config: &AppConfig,
    credentials: Arc<dyn CredentialStore>,
) -> anyhow::Result<Arc<dyn OrderStore>> {
    let store: Arc<dyn OrderStore> = match config.backend {
        Backend::Sheets => {
            let mut sheets = SheetsConfig::new(&config.spreadsheet_id, &config.worksheet);
            if let Some(base) = config.sheets_api_base.as_deref() {
                sheets.api_base = base.to_string();
            }
            if !credentials.has(KEY_SHEETS_TOKEN) {
                warn!("No Google Sheets access token stored; requests will fail until one is set");
            }
            let token = Box::new(move || credentials.get(KEY_SHEETS_TOKEN));
            Arc::new(SheetsStore::new(sheets, token).context("configuring Google Sheets backend")?)
        }
        Backend::Sqlite => Arc::new(
            SqliteStore::open(&config.data_dir).context("opening SQLite order database")?,
        ),
        Backend::Memory => {
            warn!("Using the in-memory backend; orders are lost on exit");
            Arc::new(MemoryStore::new())
        }
    };
    info!(backend = store.backend_name(), "order store ready");
    Ok(store)
}

/// Structured logging: console plus a daily rolling file in `{data}/logs`.
/// The returned guard must live until exit so buffered lines are flushed.
pub fn init_tracing(config: &AppConfig) -> tracing_appender::non_blocking::WorkerGuard {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,printer_service_crm=debug,tower_http=info"));

    let log_dir = diagnostics::log_dir(&config.data_dir);
    std::fs::create_dir_all(&log_dir).ok();
    // Prune old log files before setting up the appender
    diagnostics::prune_old_logs(&log_dir);

    let file_appender = tracing_appender::rolling::daily(&log_dir, diagnostics::LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer().with_target(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();
    guard
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }
    let parsed: Vec<_> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(parsed)
}

pub async fn run() -> anyhow::Result<()> {
    diagnostics::mark_started();
    let config = AppConfig::load()?;
    let _guard = init_tracing(&config);

    let build = diagnostics::build_info();
    info!(
        version = build.version,
        git_sha = build.git_sha,
        data_dir = %config.data_dir.display(),
        "Starting Printer Service CRM"
    );

    let credentials: Arc<dyn CredentialStore> = Arc::new(config.credential_store());
    let store = {
        let config = config.clone();
        let credentials = credentials.clone();
        tokio::task::spawn_blocking(move || open_store(&config, credentials)).await??
    };

    let auth = AuthState::new(credentials);
    if !auth.is_configured() {
        warn!("No shop password set; POST /api/auth/setup to create one");
    }
    let receipts = {
        let config = config.clone();
        tokio::task::spawn_blocking(move || ReceiptPrinter::from_config(&config)).await?
    };
    let state = AppState::new(OrderService::new(store), auth, receipts);

    let app = commands::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.cors_origins));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryCredentials;

    #[test]
    fn memory_backend_opens() {
        let config = AppConfig {
            backend: Backend::Memory,
            ..AppConfig::default()
        };
        let store = open_store(&config, Arc::new(MemoryCredentials::new())).expect("store");
        assert_eq!(store.backend_name(), "memory");
    }

    #[test]
    fn sheets_backend_needs_spreadsheet_id() {
        let config = AppConfig {
            backend: Backend::Sheets,
            spreadsheet_id: String::new(),
            ..AppConfig::default()
        };
        assert!(open_store(&config, Arc::new(MemoryCredentials::new())).is_err());
    }

    #[test]
    fn sqlite_backend_creates_database() {
        let dir = std::env::temp_dir().join(format!("printer-crm-lib-{}", uuid::Uuid::new_v4()));
        let config = AppConfig {
            backend: Backend::Sqlite,
            data_dir: dir.clone(),
            ..AppConfig::default()
        };
        let store = open_store(&config, Arc::new(MemoryCredentials::new())).expect("store");
        assert_eq!(store.backend_name(), "sqlite");
        assert!(dir.join("service_orders.db").exists());
        drop(store);
        let _ = std::fs::remove_dir_all(dir);
    }
}
