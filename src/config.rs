use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// ✅ Global Config stored in `OnceLock`
static CONFIG: OnceLock<Arc<Config>> = OnceLock::new();

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub receipt_storage_path: PathBuf,
    pub document_storage_path: PathBuf,
    pub attachment_storage_path: PathBuf,
    pub ocr_service_url: Option<String>,
    pub email_service_url: Option<String>,
    pub push_service_url: Option<String>,
    pub document_service_url: Option<String>,
    /// Upper bound for every outbound call to an external service.
    pub integration_timeout: Duration,
}

impl Config {
    /// ✅ Load environment variables and set defaults
    pub fn from_env() -> Self {
        dotenv().ok(); // Load .env only once

        Self {
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            jwt_secret: env::var("JWT_SECRET").expect("JWT_SECRET must be set"),
            receipt_storage_path: PathBuf::from(
                env::var("RECEIPT_STORAGE_PATH")
                    .unwrap_or_else(|_| "storage/receipts".to_string()),
            ),
            document_storage_path: PathBuf::from(
                env::var("DOCUMENT_STORAGE_PATH")
                    .unwrap_or_else(|_| "storage/documents".to_string()),
            ),
            attachment_storage_path: PathBuf::from(
                env::var("ATTACHMENT_STORAGE_PATH")
                    .unwrap_or_else(|_| "storage/attachments".to_string()),
            ),
            ocr_service_url: env::var("OCR_SERVICE_URL").ok(),
            email_service_url: env::var("EMAIL_SERVICE_URL").ok(),
            push_service_url: env::var("PUSH_SERVICE_URL").ok(),
            document_service_url: env::var("DOCUMENT_SERVICE_URL").ok(),
            integration_timeout: Duration::from_secs(
                env::var("INTEGRATION_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(15),
            ),
        }
    }

    /// ✅ Initialize the global config
    pub fn init() {
        CONFIG
            .set(Arc::new(Self::from_env()))
            .expect("Config already initialized");
    }

    /// ✅ Safe access to Config
    pub fn get() -> Arc<Config> {
        CONFIG.get().expect("Config not initialized").clone()
    }
}
