//! Runtime configuration: `config.json` in the data directory, then
//! `PRINTER_CRM_*` environment overrides.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::escpos::PaperWidth;
use crate::receipt_renderer::CompanyInfo;
use crate::storage::{KeyringStore, KEY_PASSWORD_HASH, KEY_SHEETS_TOKEN};

pub const CONFIG_FILE: &str = "config.json";
const APP_DIR: &str = "ro.printerservice.crm";

pub const ENV_DATA_DIR: &str = "PRINTER_CRM_DATA_DIR";
pub const ENV_BIND: &str = "PRINTER_CRM_BIND";
pub const ENV_BACKEND: &str = "PRINTER_CRM_BACKEND";
pub const ENV_SPREADSHEET_ID: &str = "PRINTER_CRM_SPREADSHEET_ID";
pub const ENV_WORKSHEET: &str = "PRINTER_CRM_WORKSHEET";
pub const ENV_SHEETS_TOKEN: &str = "PRINTER_CRM_SHEETS_TOKEN";
pub const ENV_PASSWORD_HASH: &str = "PRINTER_CRM_PASSWORD_HASH";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Sheets,
    Sqlite,
    Memory,
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sheets" | "google" | "gsheets" => Ok(Backend::Sheets),
            "sqlite" | "local" => Ok(Backend::Sqlite),
            "memory" => Ok(Backend::Memory),
            other => Err(format!("unknown backend '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    #[serde(skip)]
    pub data_dir: PathBuf,
    pub bind_addr: String,
    pub backend: Backend,
    pub spreadsheet_id: String,
    pub worksheet: String,
    /// Override for the Sheets API host (tests, proxies).
    pub sheets_api_base: Option<String>,
    pub company: CompanyInfo,
    pub logo_path: Option<PathBuf>,
    pub receipts_dir: Option<PathBuf>,
    pub paper_width: PaperWidth,
    /// Allowed browser origins for the HTTP API. Empty allows any.
    pub cors_origins: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            bind_addr: "127.0.0.1:8787".into(),
            backend: Backend::default(),
            spreadsheet_id: String::new(),
            worksheet: "Orders".into(),
            sheets_api_base: None,
            company: CompanyInfo::default(),
            logo_path: None,
            receipts_dir: None,
            paper_width: PaperWidth::default(),
            cors_origins: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load `config.json` from the data directory and apply env overrides.
    /// A missing file yields defaults; a malformed one is an error.
    pub fn load() -> anyhow::Result<Self> {
        let data_dir = env_value(ENV_DATA_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);
        Self::load_from(&data_dir)
    }

    pub fn load_from(data_dir: &Path) -> anyhow::Result<Self> {
        let path = data_dir.join(CONFIG_FILE);
        let mut config = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            let parsed: AppConfig = serde_json::from_str(&raw)
                .map_err(|e| anyhow::anyhow!("invalid {}: {e}", path.display()))?;
            info!("Loaded configuration from {}", path.display());
            parsed
        } else {
            info!("No {} found, using defaults", path.display());
            AppConfig::default()
        };
        config.data_dir = data_dir.to_path_buf();
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Some(bind) = env_value(ENV_BIND) {
            self.bind_addr = bind;
        }
        if let Some(raw) = env_value(ENV_BACKEND) {
            match raw.parse() {
                Ok(backend) => self.backend = backend,
                Err(e) => warn!("Ignoring {ENV_BACKEND}: {e}"),
            }
        }
        if let Some(id) = env_value(ENV_SPREADSHEET_ID) {
            self.spreadsheet_id = id;
        }
        if let Some(ws) = env_value(ENV_WORKSHEET) {
            self.worksheet = ws;
        }
    }

    pub fn receipts_dir(&self) -> PathBuf {
        self.receipts_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("receipts"))
    }

    /// Keyring store with the env-provided secrets as fallbacks.
    pub fn credential_store(&self) -> KeyringStore {
        let mut store = KeyringStore::new();
        if let Some(token) = env_value(ENV_SHEETS_TOKEN) {
            store = store.with_fallback(KEY_SHEETS_TOKEN, Zeroizing::new(token));
        }
        if let Some(hash) = env_value(ENV_PASSWORD_HASH) {
            store = store.with_fallback(KEY_PASSWORD_HASH, Zeroizing::new(hash));
        }
        store
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Platform local data directory for the service.
pub fn default_data_dir() -> PathBuf {
    let base = std::env::var("LOCALAPPDATA")
        .or_else(|_| std::env::var("XDG_DATA_HOME"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            #[cfg(target_os = "windows")]
            {
                PathBuf::from(std::env::var("USERPROFILE").unwrap_or_else(|_| ".".into()))
                    .join("AppData")
                    .join("Local")
            }
            #[cfg(not(target_os = "windows"))]
            {
                PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()))
                    .join(".local")
                    .join("share")
            }
        });
    base.join(APP_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "printer-crm-config-{tag}-{}",
            uuid::Uuid::new_v4()
        ));
        fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    fn clear_env() {
        for key in [
            ENV_DATA_DIR,
            ENV_BIND,
            ENV_BACKEND,
            ENV_SPREADSHEET_ID,
            ENV_WORKSHEET,
            ENV_SHEETS_TOKEN,
            ENV_PASSWORD_HASH,
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn missing_file_gives_defaults() {
        clear_env();
        let dir = temp_dir("defaults");
        let config = AppConfig::load_from(&dir).expect("load");
        assert_eq!(config.backend, Backend::Sheets);
        assert_eq!(config.worksheet, "Orders");
        assert_eq!(config.data_dir, dir);
        assert_eq!(config.receipts_dir(), dir.join("receipts"));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    #[serial]
    fn file_values_then_env_overrides() {
        clear_env();
        let dir = temp_dir("file");
        fs::write(
            dir.join(CONFIG_FILE),
            r#"{
                "backend": "sqlite",
                "spreadsheet_id": "from-file",
                "company": { "company_name": "Print Fix SRL", "cui": "RO123" }
            }"#,
        )
        .expect("write config");

        let config = AppConfig::load_from(&dir).expect("load");
        assert_eq!(config.backend, Backend::Sqlite);
        assert_eq!(config.spreadsheet_id, "from-file");
        assert_eq!(config.company.company_name, "Print Fix SRL");
        assert_eq!(config.bind_addr, "127.0.0.1:8787");

        std::env::set_var(ENV_BACKEND, "memory");
        std::env::set_var(ENV_SPREADSHEET_ID, "from-env");
        std::env::set_var(ENV_BIND, "0.0.0.0:9000");
        let config = AppConfig::load_from(&dir).expect("load");
        assert_eq!(config.backend, Backend::Memory);
        assert_eq!(config.spreadsheet_id, "from-env");
        assert_eq!(config.bind_addr, "0.0.0.0:9000");

        clear_env();
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    #[serial]
    fn bad_backend_env_is_ignored() {
        clear_env();
        let dir = temp_dir("badenv");
        std::env::set_var(ENV_BACKEND, "postgres");
        let config = AppConfig::load_from(&dir).expect("load");
        assert_eq!(config.backend, Backend::Sheets);
        clear_env();
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    #[serial]
    fn malformed_file_is_an_error() {
        clear_env();
        let dir = temp_dir("malformed");
        fs::write(dir.join(CONFIG_FILE), "{ not json").expect("write");
        assert!(AppConfig::load_from(&dir).is_err());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn backend_names_parse() {
        assert_eq!("SQLite".parse::<Backend>(), Ok(Backend::Sqlite));
        assert_eq!(" sheets ".parse::<Backend>(), Ok(Backend::Sheets));
        assert!("mysql".parse::<Backend>().is_err());
    }
}
