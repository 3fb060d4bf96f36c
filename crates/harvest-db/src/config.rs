use harvest_core::AppError;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://harvest.db";

/// Configuration for the database connection pool.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 5,
        }
    }

    /// Read configuration from environment variables.
    ///
    /// - `DATABASE_URL` (optional, defaults to `sqlite://harvest.db`)
    /// - `DATABASE_MAX_CONNECTIONS` (optional, defaults to 5)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_env_or(DEFAULT_DATABASE_URL)
    }

    /// Like [`from_env`](Self::from_env), with a caller-chosen fallback URL.
    pub fn from_env_or(default_url: &str) -> Result<Self, AppError> {
        Self::from_values(
            std::env::var("DATABASE_URL").ok(),
            std::env::var("DATABASE_MAX_CONNECTIONS").ok(),
            default_url,
        )
    }

    fn from_values(
        url: Option<String>,
        max_connections: Option<String>,
        default_url: &str,
    ) -> Result<Self, AppError> {
        let url = url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| default_url.to_string());
        if !url.starts_with("sqlite:") {
            return Err(AppError::ConfigError(format!(
                "DATABASE_URL '{url}' is not a sqlite: URL"
            )));
        }

        let max_connections = match max_connections {
            None => 5,
            Some(raw) => {
                let parsed: u32 = raw.trim().parse().map_err(|_| {
                    AppError::ConfigError(format!(
                        "Invalid DATABASE_MAX_CONNECTIONS '{raw}': must be a positive integer"
                    ))
                })?;
                if parsed == 0 {
                    return Err(AppError::ConfigError(
                        "DATABASE_MAX_CONNECTIONS must be at least 1".into(),
                    ));
                }
                parsed
            }
        };

        Ok(Self {
            url,
            max_connections,
        })
    }
}
