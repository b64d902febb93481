use std::env;

const DEFAULT_JWT_SECRET: &str = "change-me";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub frontend_url: String,
    pub stripe_secret: Option<String>,
    pub paystack_secret: Option<String>,
    pub payment_currency: String,
    pub access_token_ttl_minutes: i64,
    pub refresh_token_ttl_days: i64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL is required"))?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(5000);

        let jwt_secret = env::var("JWT_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_JWT_SECRET.to_string());
        if jwt_secret == DEFAULT_JWT_SECRET {
            tracing::warn!("using default JWT secret, set JWT_SECRET in env");
        }

        Ok(Self {
            database_url,
            host,
            port,
            jwt_secret,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            stripe_secret: non_empty_var("STRIPE_SECRET_KEY"),
            paystack_secret: non_empty_var("PAYSTACK_SECRET_KEY"),
            payment_currency: env::var("PAYMENT_CURRENCY")
                .map(|c| c.to_uppercase())
                .unwrap_or_else(|_| "USD".to_string()),
            access_token_ttl_minutes: parsed_var("ACCESS_TOKEN_TTL_MINUTES").unwrap_or(15),
            refresh_token_ttl_days: parsed_var("REFRESH_TOKEN_TTL_DAYS").unwrap_or(7),
        })
    }

    /// Configuration for tests and tooling that never touch real providers.
    pub fn for_tests(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            host: "127.0.0.1".to_string(),
            port: 0,
            jwt_secret: "test-secret".to_string(),
            frontend_url: "http://localhost:3000".to_string(),
            stripe_secret: None,
            paystack_secret: None,
            payment_currency: "USD".to_string(),
            access_token_ttl_minutes: 15,
            refresh_token_ttl_days: 7,
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_var(key: &str) -> Option<i64> {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .filter(|v| *v > 0)
}
