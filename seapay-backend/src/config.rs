use std::env;

/// Default number of thread items replayed to the model on each turn
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub openai_api_key: Option<String>,
    pub ai_endpoint: String,
    pub ai_model: String,
    pub ai_max_tokens: u32,
    /// Streamable-HTTP endpoint of the SeaPay MCP server (check_availability, reserve)
    pub mcp_url: Option<String>,
    /// Base URL of the 402-guarded reservation REST API
    pub reservation_api_base_url: String,
    /// Optional upper bound for a single x402 payment, in token atomic units
    pub x402_max_payment_atomic: Option<u128>,
    pub widgets_dir: Option<String>,
    pub history_limit: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "./.db/seapay.db".to_string()),
            openai_api_key: non_empty_var("OPENAI_API_KEY"),
            ai_endpoint: env::var("AI_ENDPOINT")
                .unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".to_string()),
            ai_model: env::var("AI_MODEL").unwrap_or_else(|_| "gpt-4.1-mini".to_string()),
            ai_max_tokens: env::var("AI_MAX_TOKENS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4096),
            mcp_url: non_empty_var("SEAPAY_MCP_URL"),
            reservation_api_base_url: env::var("SEAPAY_API_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            x402_max_payment_atomic: env::var("X402_MAX_PAYMENT_ATOMIC")
                .ok()
                .and_then(|v| v.trim().parse().ok()),
            widgets_dir: non_empty_var("WIDGETS_DIR"),
            history_limit: env::var("HISTORY_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(DEFAULT_HISTORY_LIMIT),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8000,
            database_url: "./.db/seapay.db".to_string(),
            openai_api_key: None,
            ai_endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            ai_model: "gpt-4.1-mini".to_string(),
            ai_max_tokens: 4096,
            mcp_url: None,
            reservation_api_base_url: "http://localhost:3000".to_string(),
            x402_max_payment_atomic: None,
            widgets_dir: None,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

/// Wallet key used to sign x402 payments. Read on demand so the key never
/// sits in long-lived state.
pub fn wallet_private_key() -> Option<String> {
    non_empty_var("PRIVATE_KEY")
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}
