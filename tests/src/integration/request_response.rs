//! # Request/Response Flows
//!
//! A client posts, the server answers, in every payload shape the wire
//! supports.
//!
//! ## Flows Tested:
//!
//! 1. **post → on → response**: the response resolves the client's future
//! 2. **Deferred responses**: async listener results are sent when ready
//! 3. **Listener failure**: rejection or panic leaves the post pending
//! 4. **Callback style**: `post_with_callback` under both conventions

#[cfg(test)]
mod tests {
    use crate::harness::{echo, increment, Harness};
    use ipc_agent::{
        ArgumentMode, IpcError, Listener, PartialOptions, Payload, RemoteError, ResponseSource,
    };
    use ipc_telemetry::init_test_logging;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tokio::time::timeout;

    const STAYS_PENDING: Duration = Duration::from_millis(100);
    const RESOLVES: Duration = Duration::from_secs(5);

    // =============================================================================
    // IMMEDIATE RESPONSES
    // =============================================================================

    /// Ping {n: 1} is answered with {n: 2}
    #[tokio::test]
    async fn test_ping_scenario() {
        init_test_logging();
        let h = Harness::new(1);
        h.server.on("ping", &increment(), None).unwrap();

        let response = h.client().post("ping", json!({"n": 1})).unwrap();
        let payload = timeout(RESOLVES, response)
            .await
            .expect("post should resolve")
            .unwrap();
        assert_eq!(payload, Payload::from(json!({"n": 2})));
    }

    /// Every supported payload shape survives a full round trip
    #[tokio::test]
    async fn test_payload_shapes_round_trip() {
        init_test_logging();
        let h = Harness::new(1);
        h.server.on("echo", &echo(), None).unwrap();

        let shapes = [
            Payload::Absent,
            Payload::Value(Value::Null),
            Payload::from(json!(0)),
            Payload::from(json!("text")),
            Payload::from(json!([1, null, {"a": []}])),
            Payload::from(RemoteError::new("RangeError", "out of range")),
        ];
        for shape in shapes {
            let payload = h.client().post("echo", shape.clone()).unwrap().await.unwrap();
            assert_eq!(payload, shape);
        }
    }

    /// The same listener may be registered through both on and once
    #[tokio::test]
    async fn test_on_and_once_same_listener() {
        init_test_logging();
        let h = Harness::new(1);
        let listener = increment();
        h.server.on("ping", &listener, None).unwrap();
        h.server.once("ping", &listener, None).unwrap();
        assert_eq!(h.server.listener_count("ping"), 2);

        // Both answer; the one-shot wait observes only the first
        let payload = h.client().post("ping", json!({"n": 5})).unwrap().await.unwrap();
        assert_eq!(payload, Payload::from(json!({"n": 6})));
        assert_eq!(h.server.listener_count("ping"), 1);
    }

    /// Array mode wraps the request data before the listener sees it
    #[tokio::test]
    async fn test_array_arguments_from_instance_defaults() {
        init_test_logging();
        let h = Harness::new(1);
        h.server
            .configure(PartialOptions::new().arguments(ArgumentMode::Array), false);
        h.server.on("echo", &echo(), None).unwrap();

        let payload = h.client().post("echo", json!({"k": 1})).unwrap().await.unwrap();
        assert_eq!(payload, Payload::from(json!([{"k": 1}])));

        // A per-call override beats the instance default
        h.server
            .on(
                "raw",
                &echo(),
                Some(PartialOptions::new().arguments(ArgumentMode::Single)),
            )
            .unwrap();
        let payload = h.client().post("raw", json!({"k": 1})).unwrap().await.unwrap();
        assert_eq!(payload, Payload::from(json!({"k": 1})));
    }

    // =============================================================================
    // DEFERRED RESPONSES
    // =============================================================================

    /// A deferred listener result is sent once it resolves
    #[tokio::test]
    async fn test_deferred_response() {
        init_test_logging();
        let h = Harness::new(1);
        let listener = Listener::new(|data: Payload| {
            ResponseSource::deferred(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok::<_, RemoteError>(json!({ "got": data.as_value().cloned() }))
            })
        });
        h.server.on("slow", &listener, None).unwrap();

        let payload = timeout(RESOLVES, h.client().post("slow", json!(7)).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payload, Payload::from(json!({"got": 7})));
    }

    /// Fail scenario: a rejected listener result never answers the post
    #[tokio::test]
    async fn test_fail_scenario_stays_pending() {
        init_test_logging();
        let h = Harness::new(1);
        let listener = Listener::new(|_| {
            ResponseSource::deferred(async {
                Err::<Payload, _>(RemoteError::new("Error", "listener rejected"))
            })
        });
        h.server.on("fail", &listener, None).unwrap();

        let response = h.client().post("fail", json!({})).unwrap();
        let outcome = timeout(STAYS_PENDING, response).await;
        assert!(outcome.is_err(), "post must neither resolve nor reject");
        assert_eq!(h.client().pending_responses(), 1);
    }

    /// A listener can answer with an error value on purpose
    #[tokio::test]
    async fn test_deliberate_error_response() {
        init_test_logging();
        let h = Harness::new(1);
        let listener = Listener::new(|_| {
            ResponseSource::deferred(async {
                Ok::<_, RemoteError>(RemoteError::new("NotFound", "no such key"))
            })
        });
        h.server.on("lookup", &listener, None).unwrap();

        let payload = timeout(RESOLVES, h.client().post("lookup", ()).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payload, Payload::Error(RemoteError::new("NotFound", "no such key")));
    }

    // =============================================================================
    // CALLBACK STYLE
    // =============================================================================

    #[tokio::test]
    async fn test_post_with_callback_node_style() {
        init_test_logging();
        let h = Harness::new(1);
        h.server
            .on(
                "check",
                &Listener::new(|_| RemoteError::from_message("denied")),
                None,
            )
            .unwrap();
        h.client()
            .configure(PartialOptions::new().node_callbacks(true), true);

        let (tx, rx) = oneshot::channel();
        h.client()
            .post_with_callback("check", (), move |result| {
                let _ = tx.send(result);
            })
            .unwrap();
        let result = timeout(RESOLVES, rx).await.unwrap().unwrap();
        assert_eq!(
            result,
            Err(IpcError::Remote(RemoteError::from_message("denied")))
        );
    }

    #[tokio::test]
    async fn test_post_with_callback_value() {
        init_test_logging();
        let h = Harness::new(1);
        h.server.on("ping", &increment(), None).unwrap();

        let (tx, rx) = oneshot::channel();
        h.client()
            .post_with_callback("ping", json!({"n": 9}), move |result| {
                let _ = tx.send(result);
            })
            .unwrap();
        assert_eq!(
            timeout(RESOLVES, rx).await.unwrap().unwrap(),
            Ok(Payload::from(json!({"n": 10})))
        );
    }
}
