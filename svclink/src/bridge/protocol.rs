//! Wire protocol types for parent-worker control traffic.
//!
//! Two directions, one channel: [`ControlRequest`] flows parent to worker,
//! [`ServiceEvent`] flows worker to parent. Payload shapes only; framing
//! lives in [`crate::bridge::codec`].

use serde::{Deserialize, Serialize};

/// Commands from the parent to the service process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlRequest {
    /// Fire-and-forget liveness probe. No reply is expected.
    Hello,

    /// Ask the worker to report feature enablement. Answered by
    /// [`ServiceEvent::Status`].
    QueryStatus,

    /// Enable the tokened feature for `user`.
    EnableFeature {
        user: String,
        access_token: String,
        relay_token: String,
    },

    /// Ask the worker to terminate. No reply; the parent tears the channel
    /// down immediately after sending.
    Shutdown,
}

/// Messages from the service process to the parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServiceEvent {
    /// Reply to [`ControlRequest::QueryStatus`].
    Status { enabled: bool, identity: String },

    /// Unsolicited liveness signal, forwarded to the registered
    /// notification handler.
    Heartbeat,
}

/// Snapshot delivered to status-query callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    pub enabled: bool,
    pub identity: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hello_serializes() {
        insta::assert_json_snapshot!(ControlRequest::Hello, @r#"
        {
          "type": "hello"
        }
        "#);
    }

    #[test]
    fn shutdown_serializes() {
        insta::assert_json_snapshot!(ControlRequest::Shutdown, @r#"
        {
          "type": "shutdown"
        }
        "#);
    }

    #[test]
    fn query_status_serializes() {
        insta::assert_json_snapshot!(ControlRequest::QueryStatus, @r#"
        {
          "type": "query_status"
        }
        "#);
    }

    #[test]
    fn enable_feature_serializes() {
        let req = ControlRequest::EnableFeature {
            user: "alice".to_string(),
            access_token: "tok-access".to_string(),
            relay_token: "tok-relay".to_string(),
        };
        insta::assert_json_snapshot!(req, @r#"
        {
          "type": "enable_feature",
          "user": "alice",
          "access_token": "tok-access",
          "relay_token": "tok-relay"
        }
        "#);
    }

    #[test]
    fn status_serializes() {
        let event = ServiceEvent::Status {
            enabled: true,
            identity: "alice@example.com".to_string(),
        };
        insta::assert_json_snapshot!(event, @r#"
        {
          "type": "status",
          "enabled": true,
          "identity": "alice@example.com"
        }
        "#);
    }

    #[test]
    fn heartbeat_serializes() {
        insta::assert_json_snapshot!(ServiceEvent::Heartbeat, @r#"
        {
          "type": "heartbeat"
        }
        "#);
    }

    #[test]
    fn requests_deserialize() {
        let req: ControlRequest = serde_json::from_value(json!({
            "type": "enable_feature",
            "user": "bob",
            "access_token": "a",
            "relay_token": "b",
        }))
        .unwrap();
        assert_eq!(
            req,
            ControlRequest::EnableFeature {
                user: "bob".to_string(),
                access_token: "a".to_string(),
                relay_token: "b".to_string(),
            }
        );

        let req: ControlRequest = serde_json::from_value(json!({"type": "hello"})).unwrap();
        assert_eq!(req, ControlRequest::Hello);
    }

    #[test]
    fn events_deserialize() {
        let event: ServiceEvent = serde_json::from_value(json!({
            "type": "status",
            "enabled": false,
            "identity": "",
        }))
        .unwrap();
        assert_eq!(
            event,
            ServiceEvent::Status {
                enabled: false,
                identity: String::new(),
            }
        );

        let event: ServiceEvent = serde_json::from_value(json!({"type": "heartbeat"})).unwrap();
        assert_eq!(event, ServiceEvent::Heartbeat);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = serde_json::from_value::<ServiceEvent>(json!({"type": "good_day"}));
        assert!(err.is_err());
    }
}
