use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Application identity
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub const FEISHU_BASE_URL: &str = "https://open.feishu.cn";
pub const LARK_BASE_URL: &str = "https://open.larksuite.com";

/// Open-platform deployment the app lives on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    /// Feishu (China).
    #[default]
    Feishu,
    /// Lark (global).
    Lark,
    /// Any other base URL, e.g. a private deployment or a test server.
    #[serde(untagged)]
    Custom(String),
}

impl Domain {
    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        match self {
            Domain::Feishu => FEISHU_BASE_URL,
            Domain::Lark => LARK_BASE_URL,
            Domain::Custom(url) => url.trim_end_matches('/'),
        }
    }

    /// Map a bare host as stored in credentials (`open.feishu.cn`) to a
    /// domain. Any host other than the Feishu one selects Lark.
    pub fn from_host(host: &str) -> Self {
        if host.trim() == "open.feishu.cn" {
            Domain::Feishu
        } else {
            Domain::Lark
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub app_id: String,
    /// Inline secret. Prefer `app_secret_env` outside of local testing.
    #[serde(default)]
    pub app_secret: Option<String>,
    /// Environment variable consulted when `app_secret` is unset.
    #[serde(default = "d_secret_env")]
    pub app_secret_env: String,
    #[serde(default)]
    pub domain: Domain,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            app_secret: None,
            app_secret_env: d_secret_env(),
            domain: Domain::default(),
        }
    }
}

impl AppConfig {
    /// The inline secret if present, otherwise the value of
    /// `app_secret_env`. Empty values count as unset.
    pub fn resolve_secret(&self) -> Option<String> {
        self.app_secret
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| std::env::var(&self.app_secret_env).ok())
            .filter(|s| !s.is_empty())
    }
}

fn d_secret_env() -> String {
    "LK_APP_SECRET".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_host_picks_feishu_only_for_feishu_host() {
        assert_eq!(Domain::from_host("open.feishu.cn"), Domain::Feishu);
        assert_eq!(Domain::from_host("open.larksuite.com"), Domain::Lark);
        assert_eq!(Domain::from_host("anything.else"), Domain::Lark);
    }

    #[test]
    fn custom_base_url_trims_trailing_slash() {
        let d = Domain::Custom("http://127.0.0.1:8080/".into());
        assert_eq!(d.base_url(), "http://127.0.0.1:8080");
    }

    #[test]
    fn inline_secret_wins_over_env() {
        let cfg = AppConfig {
            app_id: "cli_a".into(),
            app_secret: Some("inline".into()),
            app_secret_env: "LK_TEST_SECRET_UNUSED".into(),
            domain: Domain::Lark,
        };
        assert_eq!(cfg.resolve_secret().as_deref(), Some("inline"));
    }
}
