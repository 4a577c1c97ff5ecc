//! # Malformed Traffic
//!
//! Raw messages injected straight onto the transport, bypassing the agent's
//! encoder. Nothing here may panic, reach a listener, or answer a post it
//! was not meant for.

#[cfg(test)]
mod tests {
    use crate::harness::{echo, Harness};
    use ipc_agent::{IpcError, Listener, Payload, PeerId, RemoteError, Transport};
    use ipc_telemetry::init_test_logging;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    const GARBAGE: &[&str] = &[
        "",
        "{",
        "null",
        "[]",
        r#"{"data":1}"#,
        r#"{"channel":"ping","isError":true}"#,
        r#"{"channel":"ping","isError":true,"data":"oops"}"#,
        r#"{"channel":"ping","isError":true,"data":{"message":"no name"}}"#,
        r#"{"channel":"ping","isError":true,"data":{"name":"","message":"empty name"}}"#,
        r#"{"channel":"ping","data":1,"isResponse":true}"#,
        r#"{"channel":"pong","data":1}"#,
    ];

    #[tokio::test]
    async fn test_garbage_requests_never_reach_listeners() {
        init_test_logging();
        let h = Harness::new(1);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        h.server
            .on(
                "ping",
                &Listener::new(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
                None,
            )
            .unwrap();

        let rogue = h.hub.connect();
        for message in GARBAGE {
            rogue
                .send(PeerId::MAIN, "ping-request", (*message).to_string())
                .unwrap();
        }
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        // A well-formed request from the same peer still works
        rogue
            .send(
                PeerId::MAIN,
                "ping-request",
                r#"{"channel":"ping","data":1}"#.to_string(),
            )
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_malformed_response_fails_the_post() {
        init_test_logging();
        let h = Harness::new(1);
        let response = h.client().post("ping", ()).unwrap();

        let rogue = h.hub.connect();
        rogue
            .send(
                h.server.peer(),
                "ping-response",
                r#"{"channel":"ping","isResponse":true,"isError":true,"data":{"name":"E"}}"#
                    .to_string(),
            )
            .unwrap();

        let outcome = timeout(Duration::from_secs(5), response).await.unwrap();
        assert!(matches!(outcome, Err(IpcError::MalformedError { .. })));
    }

    #[tokio::test]
    async fn test_request_on_response_channel_is_not_an_answer() {
        init_test_logging();
        let h = Harness::new(1);
        h.server.on("ping", &echo(), None).unwrap();
        let client = h.client();
        let response = client.post("ping", json!("real")).unwrap();
        assert_eq!(response.await.unwrap(), Payload::from(json!("real")));

        // Nobody answers "quiet", so only the injected traffic arrives
        let response = client.post("quiet", ()).unwrap();
        let main = h.hub.main();
        for stray in [
            r#"{"channel":"other","data":1,"isResponse":false}"#,
            r#"{"channel":"quiet","data":1}"#,
        ] {
            main.send(h.server.peer(), "quiet-response", stray.to_string()).unwrap();
        }
        assert!(timeout(Duration::from_millis(50), response).await.is_err());
        assert_eq!(client.pending_responses(), 1);
    }

    #[tokio::test]
    async fn test_unnamed_error_result_comes_back_as_serialization_error() {
        init_test_logging();
        let h = Harness::new(1);
        h.server
            .on(
                "fail",
                &Listener::new(|_| RemoteError::new("", "lost name")),
                None,
            )
            .unwrap();

        let outcome = timeout(Duration::from_secs(5), h.client().post("fail", ()).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            outcome,
            Payload::Error(ref err) if err.name == RemoteError::SERIALIZATION_NAME
        ));
    }

    #[tokio::test]
    async fn test_hand_written_envelope_is_understood() {
        init_test_logging();
        let h = Harness::new(1);
        h.server.on("echo", &echo(), None).unwrap();
        let response = h.client().post("echo", ()).unwrap();
        assert_eq!(response.await.unwrap(), Payload::Absent);

        let rogue = h.hub.connect();
        let tap = h.server.capture("raw", None).unwrap();
        rogue
            .send(
                PeerId::MAIN,
                "raw-request",
                r#"{"channel":"raw","data":null}"#.to_string(),
            )
            .unwrap();
        assert_eq!(tap.await.unwrap(), Payload::from(json!(null)));
    }
}
