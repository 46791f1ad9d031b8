//! Builder pattern for constructing an [`EventClient`].

use std::sync::Arc;
use std::time::Duration;

use lk_domain::config::{Config, ConnectionSettings, Domain};
use lk_domain::error::{Error, Result};

use crate::client::{ClientOptions, EventClient};
use crate::http::{HttpRequester, ReqwestRequester};
use crate::session::SessionParameters;
use crate::types::ConnectionConfig;

/// Fluent builder for [`EventClient`].
///
/// # Example
///
/// ```rust,no_run
/// # use lk_event_sdk::EventClientBuilder;
/// # use lk_domain::config::Domain;
/// let client = EventClientBuilder::new()
///     .app_id("cli_a1b2c3")
///     .app_secret("s3cr3t")
///     .domain(Domain::Lark)
///     .build()
///     .unwrap();
/// ```
pub struct EventClientBuilder {
    app_id: String,
    app_secret: Option<String>,
    domain: Domain,
    options: ClientOptions,
    params: SessionParameters,
    http: Option<Arc<dyn HttpRequester>>,
}

impl EventClientBuilder {
    pub fn new() -> Self {
        let settings = ConnectionSettings::default();
        Self {
            app_id: String::new(),
            app_secret: None,
            domain: Domain::default(),
            options: options_from(&settings),
            params: SessionParameters::from_settings(&settings),
            http: None,
        }
    }

    /// Seed every field from a loaded [`Config`].  The secret is resolved
    /// from `app_secret` or the `app_secret_env` variable.
    pub fn from_config(config: &Config) -> Self {
        Self {
            app_id: config.app.app_id.clone(),
            app_secret: config.app.resolve_secret(),
            domain: config.app.domain.clone(),
            options: options_from(&config.connection),
            params: SessionParameters::from_settings(&config.connection),
            http: None,
        }
    }

    // ── Identity ─────────────────────────────────────────────────────

    pub fn app_id(mut self, id: impl Into<String>) -> Self {
        self.app_id = id.into();
        self
    }

    pub fn app_secret(mut self, secret: impl Into<String>) -> Self {
        self.app_secret = Some(secret.into());
        self
    }

    /// Feishu (default), Lark, or a custom base URL.
    pub fn domain(mut self, domain: Domain) -> Self {
        self.domain = domain;
        self
    }

    // ── Behavior ─────────────────────────────────────────────────────

    /// Reconnect after a disconnect (default on).
    pub fn auto_reconnect(mut self, on: bool) -> Self {
        self.options.auto_reconnect = on;
        self
    }

    /// Timeout of the negotiation HTTP call (default 15s).
    pub fn negotiate_timeout(mut self, d: Duration) -> Self {
        self.options.negotiate_timeout = d;
        self
    }

    /// Value of the `locale` header on the negotiation call (default `zh`).
    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.options.locale = locale.into();
        self
    }

    /// Age after which an incomplete message is discarded (default 10s).
    pub fn fragment_expiry(mut self, d: Duration) -> Self {
        self.options.fragment_expiry = d;
        self
    }

    /// Use a custom HTTP stack for negotiation.
    pub fn http_requester(mut self, http: Arc<dyn HttpRequester>) -> Self {
        self.http = Some(http);
        self
    }

    // ── Initial tunables (overwritten by the server) ─────────────────

    pub fn ping_interval(mut self, d: Duration) -> Self {
        self.params.ping_interval = d;
        self
    }

    /// Retries per reconnect cycle; negative retries forever.
    pub fn reconnect_count(mut self, n: i64) -> Self {
        self.params.reconnect_count = n;
        self
    }

    pub fn reconnect_interval(mut self, d: Duration) -> Self {
        self.params.reconnect_interval = d;
        self
    }

    pub fn reconnect_nonce(mut self, d: Duration) -> Self {
        self.params.reconnect_nonce = d;
        self
    }

    /// Build the [`EventClient`].
    pub fn build(self) -> Result<EventClient> {
        if self.app_id.trim().is_empty() {
            return Err(Error::Config("app_id is required".into()));
        }
        let app_secret = self
            .app_secret
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::Config("app_secret is required".into()))?;
        if self.params.ping_interval.is_zero() {
            return Err(Error::Config("ping_interval must be positive".into()));
        }

        let http: Arc<dyn HttpRequester> = match self.http {
            Some(http) => http,
            None => Arc::new(ReqwestRequester::new()?),
        };

        Ok(EventClient::new(
            ConnectionConfig {
                app_id: self.app_id,
                app_secret,
                domain: self.domain,
            },
            self.options,
            self.params,
            http,
        ))
    }
}

impl Default for EventClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn options_from(settings: &ConnectionSettings) -> ClientOptions {
    ClientOptions {
        auto_reconnect: settings.auto_reconnect,
        negotiate_timeout: Duration::from_millis(settings.negotiate_timeout_ms),
        locale: settings.locale.clone(),
        fragment_expiry: Duration::from_millis(settings.fragment_expiry_ms),
    }
}
