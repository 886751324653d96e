//! Server Configuration

/// Default listen address
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:4242";

/// Which payment processor backs the server
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    /// Stripe, using `STRIPE_SECRET_KEY`
    Stripe,
    /// In-memory processor; no external calls, state lost on exit
    Memory,
}

impl Backend {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stripe" => Some(Self::Stripe),
            "memory" => Some(Self::Memory),
            _ => None,
        }
    }
}

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Publishable key handed to the browser by `GET /config`
    pub publishable_key: Option<String>,
    pub backend: Backend,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.into(),
            publishable_key: None,
            backend: Backend::Stripe,
        }
    }
}

impl ServerConfig {
    /// Load from environment variables
    ///
    /// - `BIND_ADDR` (default `0.0.0.0:4242`)
    /// - `STRIPE_PUBLISHABLE_KEY`
    /// - `PAYMENTS_BACKEND`: `stripe` (default) or `memory`
    ///
    /// Stripe secrets are read by the processor itself.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let backend = match var("PAYMENTS_BACKEND") {
            Some(value) => Backend::parse(&value).unwrap_or_else(|| {
                tracing::warn!(value = %value, "Unknown PAYMENTS_BACKEND, using stripe");
                Backend::Stripe
            }),
            None => defaults.backend,
        };

        Self {
            bind_addr: var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            publishable_key: var("STRIPE_PUBLISHABLE_KEY"),
            backend,
        }
    }
}
