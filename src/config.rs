use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub report: ReportConfig,
}

/// Settings for the generative report service. When no API key is configured
/// the service runs with report generation disabled; milestone validation
/// still works and responses carry the `report_failed` warning.
#[derive(Debug, Clone)]
pub struct ReportConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl Config {
    pub fn from_env() -> Config {
        let timeout_secs = env::var("REPORT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(20);
        Config {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://blisslearn.db".into()),
            port: env::var("PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8081),
            report: ReportConfig {
                api_key: env::var("REPORT_API_KEY").ok(),
                base_url: env::var("REPORT_API_BASE")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".into()),
                model: env::var("REPORT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into()),
                timeout: Duration::from_secs(timeout_secs),
            },
        }
    }
}
