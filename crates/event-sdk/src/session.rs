//! Server-tunable session parameters.

use std::time::Duration;

use lk_domain::config::ConnectionSettings;
use lk_protocol::ClientTunables;

use crate::negotiate::Negotiated;

/// Tunables for the current connection, refreshed by every negotiation and
/// every `pong` control frame.
///
/// Written only by the client's orchestrator; the heartbeat and reconnect
/// routines read a copy, so one cycle never observes a half-applied update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionParameters {
    pub connect_url: Option<String>,
    pub device_id: Option<String>,
    /// Routing id stamped on every outbound control frame.
    pub service_id: i32,
    pub ping_interval: Duration,
    /// Negative means retry forever.
    pub reconnect_count: i64,
    pub reconnect_interval: Duration,
    /// Upper bound of the random delay before the first reconnect attempt.
    pub reconnect_nonce: Duration,
}

impl Default for SessionParameters {
    fn default() -> Self {
        Self::from_settings(&ConnectionSettings::default())
    }
}

impl SessionParameters {
    pub fn from_settings(settings: &ConnectionSettings) -> Self {
        Self {
            connect_url: None,
            device_id: None,
            service_id: 0,
            ping_interval: Duration::from_secs(settings.ping_interval_secs),
            reconnect_count: settings.reconnect_count,
            reconnect_interval: Duration::from_secs(settings.reconnect_interval_secs),
            reconnect_nonce: Duration::from_secs(settings.reconnect_nonce_secs),
        }
    }

    /// Overwrite every field the server sent.  A zero ping interval would
    /// spin the heartbeat, so it is ignored.
    pub fn apply_tunables(&mut self, t: &ClientTunables) {
        if let Some(secs) = t.ping_interval.filter(|s| *s > 0) {
            self.ping_interval = Duration::from_secs(secs);
        }
        if let Some(count) = t.reconnect_count {
            self.reconnect_count = count;
        }
        if let Some(secs) = t.reconnect_interval {
            self.reconnect_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = t.reconnect_nonce {
            self.reconnect_nonce = Duration::from_secs(secs);
        }
    }

    pub fn apply_negotiated(&mut self, n: &Negotiated) {
        self.connect_url = Some(n.url.clone());
        self.device_id = n.device_id.clone();
        self.service_id = n.service_id;
        if let Some(t) = &n.tunables {
            self.apply_tunables(t);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_connection_settings() {
        let p = SessionParameters::default();
        assert_eq!(p.ping_interval, Duration::from_secs(120));
        assert_eq!(p.reconnect_count, -1);
        assert_eq!(p.reconnect_interval, Duration::from_secs(120));
        assert_eq!(p.reconnect_nonce, Duration::from_secs(30));
        assert_eq!(p.connect_url, None);
    }

    #[test]
    fn partial_tunables_leave_other_fields_alone() {
        let mut p = SessionParameters::default();
        p.apply_tunables(&ClientTunables {
            ping_interval: Some(45),
            reconnect_count: Some(3),
            ..Default::default()
        });
        assert_eq!(p.ping_interval, Duration::from_secs(45));
        assert_eq!(p.reconnect_count, 3);
        assert_eq!(p.reconnect_interval, Duration::from_secs(120));
    }

    #[test]
    fn zero_ping_interval_is_ignored() {
        let mut p = SessionParameters::default();
        p.apply_tunables(&ClientTunables {
            ping_interval: Some(0),
            ..Default::default()
        });
        assert_eq!(p.ping_interval, Duration::from_secs(120));
    }

    #[test]
    fn negotiation_sets_routing_fields() {
        let mut p = SessionParameters::default();
        p.apply_negotiated(&Negotiated {
            url: "wss://x/ws?service_id=9".into(),
            device_id: Some("d1".into()),
            service_id: 9,
            tunables: Some(ClientTunables {
                reconnect_nonce: Some(5),
                ..Default::default()
            }),
        });
        assert_eq!(p.service_id, 9);
        assert_eq!(p.device_id.as_deref(), Some("d1"));
        assert_eq!(p.connect_url.as_deref(), Some("wss://x/ws?service_id=9"));
        assert_eq!(p.reconnect_nonce, Duration::from_secs(5));
    }
}
