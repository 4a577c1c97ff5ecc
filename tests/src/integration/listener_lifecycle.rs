//! # Listener Lifecycle
//!
//! registered → invoked → (once) removed, or registered → removed at any
//! point, including while a deferred response is in flight.

#[cfg(test)]
mod tests {
    use crate::harness::{increment, Harness};
    use ipc_agent::{IpcError, Listener, Payload, RemoteError, ResponseSource};
    use ipc_telemetry::init_test_logging;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tokio::time::timeout;

    const STAYS_PENDING: Duration = Duration::from_millis(100);

    fn counting(hits: &Arc<AtomicUsize>) -> Listener {
        let hits = hits.clone();
        Listener::new(move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn test_on_fires_per_delivery() {
        init_test_logging();
        let h = Harness::new(1);
        let hits = Arc::new(AtomicUsize::new(0));
        h.server.on("tick", &counting(&hits), None).unwrap();

        for _ in 0..5 {
            h.client().request("tick", ()).unwrap();
        }
        assert_eq!(hits.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_once_fires_once() {
        init_test_logging();
        let h = Harness::new(1);
        let hits = Arc::new(AtomicUsize::new(0));
        h.server.once("tick", &counting(&hits), None).unwrap();

        h.client().request("tick", ()).unwrap();
        h.client().request("tick", ()).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(h.server.listener_count("tick"), 0);
    }

    #[tokio::test]
    async fn test_remove_unregistered_listener_is_noop() {
        init_test_logging();
        let h = Harness::new(1);
        let hits = Arc::new(AtomicUsize::new(0));
        let never = counting(&hits);
        assert!(!h.server.remove_listener("tick", &never).unwrap());
        assert!(!h.server.remove_all_listeners(Some("tick")).unwrap());
        assert!(!h.server.remove_all_listeners(None).unwrap());
    }

    #[tokio::test]
    async fn test_removed_listener_is_not_invoked() {
        init_test_logging();
        let h = Harness::new(1);
        let hits = Arc::new(AtomicUsize::new(0));
        let listener = counting(&hits);
        let other = counting(&hits);
        h.server.on("tick", &listener, None).unwrap();
        h.server.on("tick", &other, None).unwrap();

        assert!(h.server.remove_listener("tick", &listener).unwrap());
        h.client().request("tick", ()).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    /// Bulk removal leaves the requester side's pending waits alone
    #[tokio::test]
    async fn test_remove_all_spares_pending_post() {
        init_test_logging();
        let h = Harness::new(1);
        let client = h.client();
        client.on("a", &increment(), None).unwrap();
        client.on("b", &increment(), None).unwrap();

        let response = client.post("slow-answer", ()).unwrap();
        assert!(client.remove_all_listeners(None).unwrap());
        assert_eq!(client.listener_count("a") + client.listener_count("b"), 0);
        assert_eq!(client.pending_responses(), 1);

        h.server.respond("slow-answer", json!("done")).unwrap();
        assert_eq!(response.await.unwrap(), Payload::from(json!("done")));
    }

    /// Removing a listener while its deferred result is pending drops the response
    #[tokio::test]
    async fn test_removal_preempts_in_flight_response() {
        init_test_logging();
        let h = Harness::new(1);
        let (go_tx, go_rx) = oneshot::channel::<()>();
        let go_rx = Mutex::new(Some(go_rx));
        let listener = Listener::new(move |_| {
            let go = go_rx.lock().take();
            ResponseSource::deferred(async move {
                if let Some(go) = go {
                    let _ = go.await;
                }
                Ok::<_, RemoteError>(json!("too late"))
            })
        });
        h.server.on("job", &listener, None).unwrap();

        let response = h.client().post("job", ()).unwrap();
        assert!(h.server.remove_all_listeners(Some("job")).unwrap());
        let _ = go_tx.send(());
        assert!(timeout(STAYS_PENDING, response).await.is_err());
    }

    /// A once listener's deferred response still goes out after self-removal
    #[tokio::test]
    async fn test_once_deferred_still_answers() {
        init_test_logging();
        let h = Harness::new(1);
        let listener = Listener::new(|_| {
            ResponseSource::deferred(async {
                tokio::task::yield_now().await;
                Ok::<_, RemoteError>(json!("answered"))
            })
        });
        h.server.once("job", &listener, None).unwrap();

        let response = h.client().post("job", ()).unwrap();
        assert_eq!(h.server.listener_count("job"), 0);
        assert_eq!(
            timeout(Duration::from_secs(5), response).await.unwrap().unwrap(),
            Payload::from(json!("answered"))
        );
    }

    /// A listener that removes itself mid-delivery does not disturb its siblings
    #[tokio::test]
    async fn test_listener_removing_itself() {
        init_test_logging();
        let h = Harness::new(1);
        let hits = Arc::new(AtomicUsize::new(0));
        let server = h.server.clone();
        let me: Arc<Mutex<Option<Listener>>> = Arc::new(Mutex::new(None));
        let slot = me.clone();
        let quitter = Listener::new(move |_| {
            let own = slot.lock().take();
            if let Some(own) = own {
                server.remove_listener("tick", &own).unwrap();
            }
        });
        *me.lock() = Some(quitter.clone());
        h.server.on("tick", &quitter, None).unwrap();
        h.server.on("tick", &counting(&hits), None).unwrap();

        h.client().request("tick", ()).unwrap();
        h.client().request("tick", ()).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(h.server.listener_count("tick"), 1);
    }

    #[tokio::test]
    async fn test_capture_is_a_read_only_tap() {
        init_test_logging();
        let h = Harness::new(1);
        let tap = h.server.capture("note", None).unwrap();
        let response = h.client().post("note", json!({"memo": "hi"})).unwrap();

        assert_eq!(tap.await.unwrap(), Payload::from(json!({"memo": "hi"})));
        assert!(timeout(STAYS_PENDING, response).await.is_err());

        let tap = h.server.capture("note", None).unwrap();
        h.server.remove_all_listeners(Some("note")).unwrap();
        assert_eq!(tap.await, Err(IpcError::Cancelled));
    }
}
