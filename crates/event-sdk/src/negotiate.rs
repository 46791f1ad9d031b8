//! Endpoint negotiation: trade app id/secret for a one-time WebSocket URL
//! plus the server's current client tunables.

use std::time::Duration;

use lk_domain::error::{Error, Result};
use lk_protocol::endpoint::codes;
use lk_protocol::{ClientTunables, EndpointRequest, EndpointResponse, ENDPOINT_PATH};
use reqwest::{Method, Url};

use crate::http::{HttpRequest, HttpRequester};
use crate::types::ConnectionConfig;

/// Usable result of a negotiation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiated {
    pub url: String,
    pub device_id: Option<String>,
    pub service_id: i32,
    pub tunables: Option<ClientTunables>,
}

/// POST the credentials to the gateway and parse the answer.
pub async fn negotiate(
    http: &dyn HttpRequester,
    conn: &ConnectionConfig,
    locale: &str,
    timeout: Duration,
) -> Result<Negotiated> {
    let body = serde_json::to_value(EndpointRequest {
        app_id: conn.app_id.clone(),
        app_secret: conn.app_secret.clone(),
    })?;
    let req = HttpRequest {
        method: Method::POST,
        url: format!("{}{}", conn.domain.base_url(), ENDPOINT_PATH),
        body: Some(body),
        // Consumed by the gateway.
        headers: vec![("locale".into(), locale.into())],
        timeout,
    };

    let raw = http.request(req).await?;
    let negotiated = parse_endpoint_response(&raw)?;
    tracing::debug!(
        url = %negotiated.url,
        service_id = negotiated.service_id,
        "connect config negotiated"
    );
    Ok(negotiated)
}

/// Interpret the gateway's JSON answer.
///
/// * code 0: `data.URL` is required.
/// * system busy / internal error: retryable failure.
/// * any other non-zero code: logged, then accepted only if both
///   `data.URL` and `data.ClientConfig` are present.
pub fn parse_endpoint_response(raw: &str) -> Result<Negotiated> {
    let resp: EndpointResponse = serde_json::from_str(raw).map_err(|e| Error::Negotiation {
        code: -1,
        message: format!("malformed endpoint response: {e}"),
        retryable: true,
    })?;
    let msg = resp.msg.clone().unwrap_or_default();

    if resp.code != codes::OK {
        tracing::error!(code = resp.code, msg = %msg, "endpoint negotiation returned an error code");
        if codes::is_retryable(resp.code) {
            return Err(Error::Negotiation {
                code: resp.code,
                message: if msg.is_empty() { "system busy".into() } else { msg },
                retryable: true,
            });
        }
        let complete = resp
            .data
            .as_ref()
            .is_some_and(|d| d.url.is_some() && d.client_config.is_some());
        if !complete {
            return Err(Error::Negotiation {
                code: resp.code,
                message: format!("{msg} (response carries no usable connect config)"),
                retryable: false,
            });
        }
    }

    let data = resp.data.unwrap_or_default();
    let url = data.url.filter(|u| !u.is_empty()).ok_or_else(|| Error::Negotiation {
        code: resp.code,
        message: "response carries no connect URL".into(),
        retryable: true,
    })?;
    let (device_id, service_id) = parse_connect_url(&url)?;

    Ok(Negotiated {
        url,
        device_id,
        service_id,
        tunables: data.client_config,
    })
}

/// Pull `device_id` and `service_id` out of the connect URL's query.
fn parse_connect_url(url: &str) -> Result<(Option<String>, i32)> {
    let parsed = Url::parse(url).map_err(|e| Error::Negotiation {
        code: codes::OK,
        message: format!("invalid connect URL {url:?}: {e}"),
        retryable: true,
    })?;

    let mut device_id = None;
    let mut service_id = None;
    for (k, v) in parsed.query_pairs() {
        match k.as_ref() {
            "device_id" => device_id = Some(v.into_owned()),
            "service_id" => service_id = v.parse::<i32>().ok(),
            _ => {}
        }
    }
    if service_id.is_none() {
        tracing::warn!(url = %url, "connect URL has no numeric service_id, using 0");
    }
    Ok((device_id, service_id.unwrap_or(0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lk_domain::config::Domain;
    use parking_lot::Mutex;

    const OK_BODY: &str = r#"{
        "code": 0, "msg": "ok",
        "data": {
            "URL": "wss://example.test/ws/v2?fpid=1&device_id=dev-7&service_id=33",
            "ClientConfig": {"PingInterval": 90, "ReconnectCount": 4, "ReconnectInterval": 10, "ReconnectNonce": 2}
        }
    }"#;

    #[test]
    fn success_extracts_routing_ids_and_tunables() {
        let n = parse_endpoint_response(OK_BODY).unwrap();
        assert_eq!(n.device_id.as_deref(), Some("dev-7"));
        assert_eq!(n.service_id, 33);
        assert_eq!(n.tunables.unwrap().ping_interval, Some(90));
        assert!(n.url.starts_with("wss://example.test/ws/v2"));
    }

    #[test]
    fn busy_and_internal_error_are_retryable() {
        for code in [codes::SYSTEM_BUSY, codes::INTERNAL_ERROR] {
            let raw = format!(r#"{{"code": {code}, "msg": "busy"}}"#);
            let err = parse_endpoint_response(&raw).unwrap_err();
            assert!(err.is_retryable(), "code {code} should be retryable");
        }
    }

    #[test]
    fn other_error_without_data_fails_immediately() {
        let err = parse_endpoint_response(r#"{"code": 514, "msg": "auth failed"}"#).unwrap_err();
        match err {
            Error::Negotiation { code, retryable, .. } => {
                assert_eq!(code, 514);
                assert!(!retryable);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn other_error_with_complete_data_proceeds() {
        let raw = OK_BODY.replacen("\"code\": 0", "\"code\": 403", 1);
        let n = parse_endpoint_response(&raw).unwrap();
        assert_eq!(n.service_id, 33);
    }

    #[test]
    fn success_without_url_is_an_error() {
        assert!(parse_endpoint_response(r#"{"code": 0, "data": {}}"#).is_err());
        assert!(parse_endpoint_response(r#"{"code": 0}"#).is_err());
    }

    #[test]
    fn garbage_body_is_an_error() {
        assert!(parse_endpoint_response("<html>502</html>").is_err());
        assert!(parse_endpoint_response(r#"{"msg": "no code"}"#).is_err());
    }

    #[test]
    fn missing_service_id_defaults_to_zero() {
        let raw = r#"{"code": 0, "data": {"URL": "ws://127.0.0.1:1/ws"}}"#;
        let n = parse_endpoint_response(raw).unwrap();
        assert_eq!(n.service_id, 0);
        assert_eq!(n.device_id, None);
        assert_eq!(n.tunables, None);
    }

    struct Recorder {
        seen: Mutex<Vec<HttpRequest>>,
    }

    #[async_trait]
    impl HttpRequester for Recorder {
        async fn request(&self, req: HttpRequest) -> Result<String> {
            self.seen.lock().push(req);
            Ok(OK_BODY.into())
        }
    }

    #[tokio::test]
    async fn request_carries_credentials_and_locale() {
        let rec = Recorder {
            seen: Mutex::new(Vec::new()),
        };
        let conn = ConnectionConfig {
            app_id: "cli_x".into(),
            app_secret: "sec".into(),
            domain: Domain::Lark,
        };
        negotiate(&rec, &conn, "zh", Duration::from_secs(15)).await.unwrap();

        let seen = rec.seen.lock();
        let req = &seen[0];
        assert_eq!(req.method, Method::POST);
        assert_eq!(req.url, "https://open.larksuite.com/callback/ws/endpoint");
        assert_eq!(req.headers, vec![("locale".to_string(), "zh".to_string())]);
        assert_eq!(req.timeout, Duration::from_secs(15));
        assert_eq!(
            req.body,
            Some(serde_json::json!({"AppID": "cli_x", "AppSecret": "sec"}))
        );
    }
}
