//! Engine configuration. The only normative knob is the transport bootstrap
//! address list, read from a single environment variable.

const BOOTSTRAP_ENV_VAR: &str = "NEXT_PUBLIC_WAKU_BOOTSTRAP";

/// Default bootstrap addresses used when the environment variable is absent.
const DEFAULT_BOOTSTRAP: &[&str] = &[
    "/dns4/boot-01.waku.rill.network/tcp/443/wss",
    "/dns4/boot-02.waku.rill.network/tcp/443/wss",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub waku_bootstrap: Vec<String>,
}

impl Config {
    pub fn from_env() -> Self {
        let waku_bootstrap = match std::env::var(BOOTSTRAP_ENV_VAR) {
            Ok(raw) if !raw.trim().is_empty() => raw.split(',').map(|s| s.trim().to_string()).collect(),
            _ => {
                tracing::debug!(env_var = BOOTSTRAP_ENV_VAR, "bootstrap env var absent, using default list");
                DEFAULT_BOOTSTRAP.iter().map(|s| s.to_string()).collect()
            }
        };
        Self { waku_bootstrap }
    }
}
