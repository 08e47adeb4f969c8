use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub frontend_url: Option<String>,
    pub moderation_webhook_url: Option<String>,
    pub moderation_webhook_timeout: Duration,
    pub rate_limit_enabled: bool,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        fn opt(name: &str) -> Option<String> { std::env::var(name).ok().filter(|v| !v.trim().is_empty()) }
        Self {
            bind: opt("MARGIN_BIND").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            frontend_url: opt("FRONTEND_URL"),
            moderation_webhook_url: opt("MODERATION_WEBHOOK_URL"),
            moderation_webhook_timeout: Duration::from_secs(
                opt("MODERATION_WEBHOOK_TIMEOUT_SECS").and_then(|v| v.parse().ok()).unwrap_or(5),
            ),
            rate_limit_enabled: opt("RATE_LIMIT_ENABLED")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(true),
        }
    }

    /// Names of required variables that are missing or invalid.
    pub fn validate_env() -> Vec<String> {
        let mut problems = Vec::new();
        match std::env::var("JWT_SECRET") {
            Err(_) => problems.push("JWT_SECRET is not set".to_string()),
            Ok(s) if s.len() < 32 => problems.push("JWT_SECRET must be at least 32 characters long".to_string()),
            Ok(_) => {}
        }
        problems
    }
}
