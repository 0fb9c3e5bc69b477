/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Graceful shutdown timeout in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Page size used when a list request names none (default: `100`).
    pub default_page_size: usize,
    /// Upper bound on a list page; larger requests are clamped (default: `1000`).
    pub max_page_size: usize,
    /// Retries after a transient storage failure (default: `3`).
    pub storage_retry_attempts: u32,
    /// First retry delay in milliseconds, doubled per attempt (default: `50`).
    pub storage_retry_base_ms: u64,
    /// Postgres connection string. Without it only in-memory tables are served.
    pub database_url: Option<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default                    |
    /// |--------------------------|----------------------------|
    /// | `HOST`                   | `0.0.0.0`                  |
    /// | `PORT`                   | `3000`                     |
    /// | `CORS_ORIGINS`           | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`   | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`  | `30`                       |
    /// | `DEFAULT_PAGE_SIZE`      | `100`                      |
    /// | `MAX_PAGE_SIZE`          | `1000`                     |
    /// | `STORAGE_RETRY_ATTEMPTS` | `3`                        |
    /// | `STORAGE_RETRY_BASE_MS`  | `50`                       |
    /// | `DATABASE_URL`           | unset                      |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let default_page_size: usize = std::env::var("DEFAULT_PAGE_SIZE")
            .unwrap_or_else(|_| "100".into())
            .parse()
            .expect("DEFAULT_PAGE_SIZE must be a valid usize");

        let max_page_size: usize = std::env::var("MAX_PAGE_SIZE")
            .unwrap_or_else(|_| "1000".into())
            .parse()
            .expect("MAX_PAGE_SIZE must be a valid usize");

        assert!(
            default_page_size > 0 && default_page_size <= max_page_size,
            "DEFAULT_PAGE_SIZE must be between 1 and MAX_PAGE_SIZE"
        );

        let storage_retry_attempts: u32 = std::env::var("STORAGE_RETRY_ATTEMPTS")
            .unwrap_or_else(|_| "3".into())
            .parse()
            .expect("STORAGE_RETRY_ATTEMPTS must be a valid u32");

        let storage_retry_base_ms: u64 = std::env::var("STORAGE_RETRY_BASE_MS")
            .unwrap_or_else(|_| "50".into())
            .parse()
            .expect("STORAGE_RETRY_BASE_MS must be a valid u64");

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            default_page_size,
            max_page_size,
            storage_retry_attempts,
            storage_retry_base_ms,
            database_url,
        }
    }
}
