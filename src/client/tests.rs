//! Client Module Tests
//!
//! ## Test Scopes
//! - **Configuration**: Command line tokens and flow files.
//! - **Submission**: Adopting the ranking returned by `/jobs`.
//! - **Polling**: Pending, completion, master moves and unreachable nodes.

#[cfg(test)]
mod tests {
    use crate::client::{ClientConfig, FogClient, PollOutcome};
    use crate::graph::types::{FlowId, TaskId, TaskSpec, TaskStatus};
    use crate::membership::types::NodeAddr;
    use crate::testing::*;
    use crate::transport::Method;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::time::Duration;

    fn ranking(ports: &[u16]) -> Value {
        let entries: Vec<Value> = ports
            .iter()
            .enumerate()
            .map(|(i, port)| json!({ "addr": addr(*port).to_string(), "score": 10.0 - i as f64 }))
            .collect();
        Value::Array(entries)
    }

    fn poll_reply(ports: &[u16], completed: bool) -> Value {
        if completed {
            json!({ "results": { "x": 42 }, "completed": true, "ranking": ranking(ports) })
        } else {
            json!({ "results": { "x": "assigned" }, "completed": false, "ranking": ranking(ports) })
        }
    }

    fn flow_spec() -> TaskSpec {
        serde_json::from_value(json!({
            "element": "task",
            "id": "x",
            "action": { "module": "echo", "payload": 42 }
        }))
        .unwrap()
    }

    fn client(transport: &Arc<ScriptedTransport>) -> FogClient {
        FogClient::new(transport.clone(), addr(3000), Duration::from_millis(1))
    }

    // ============================================================
    // CONFIGURATION TESTS
    // ============================================================

    #[test]
    fn test_client_config_from_args() {
        let config =
            ClientConfig::from_args(["host=10.0.0.5", "port=4000", "file=job.json", "poll_ms=250"])
                .unwrap();

        assert_eq!(config.entry, NodeAddr::new("10.0.0.5", 4000));
        assert_eq!(config.file.to_str(), Some("job.json"));
        assert_eq!(config.poll_period, Duration::from_millis(250));

        assert!(ClientConfig::from_args(["port=abc"]).is_err());
    }

    #[test]
    fn test_load_flow_file() {
        let path = std::env::temp_dir().join(format!("node-fog-flow-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"element":"task","id":"x","action":{"module":"echo"}}"#).unwrap();

        let spec = FogClient::load_flow(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(spec.id(), &TaskId::from("x"));
        assert!(FogClient::load_flow(&path).is_err());
    }

    // ============================================================
    // SUBMISSION TESTS
    // ============================================================

    #[tokio::test]
    async fn test_submit_adopts_returned_ranking() {
        // ARRANGE
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(
            &addr(3000),
            "/jobs",
            json!({ "flow_id": "f1", "ranking": ranking(&[3001, 3000]) }),
        );
        let mut client = client(&transport);

        // ACT
        let flow_id = client.submit(flow_spec()).await.unwrap();

        // ASSERT
        assert_eq!(flow_id, FlowId::from("f1"));
        assert_eq!(client.target(), Some(&addr(3001)));
        let body = transport.calls_to(&addr(3000))[0].body.clone().unwrap();
        assert_eq!(body["flow"]["id"], json!("x"));
        assert!(body.get("id").is_none());
    }

    // ============================================================
    // POLLING TESTS
    // ============================================================

    #[tokio::test]
    async fn test_poll_pending_then_completed() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(&addr(3000), "/result/f1", poll_reply(&[3000], false));
        transport.respond(&addr(3000), "/result/f1", poll_reply(&[3000], true));
        let mut client = client(&transport);
        let flow_id = FlowId::from("f1");

        assert_eq!(client.poll_once(&flow_id).await.unwrap(), PollOutcome::Pending);

        match client.poll_once(&flow_id).await.unwrap() {
            PollOutcome::Completed(results) => {
                assert_eq!(results.get(&TaskId::from("x")), Some(&TaskStatus::Value(json!(42))));
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_poll_follows_master_move() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(&addr(3000), "/result/f1", poll_reply(&[3002, 3000], false));
        let mut client = client(&transport);

        let outcome = client.poll_once(&FlowId::from("f1")).await.unwrap();

        assert_eq!(outcome, PollOutcome::MasterMoved(addr(3002)));
        assert_eq!(client.target(), Some(&addr(3002)));
    }

    #[tokio::test]
    async fn test_unreachable_node_shifts_to_next_candidate() {
        // ARRANGE: ranking [3001, 3002] learned at submission
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(
            &addr(3000),
            "/jobs",
            json!({ "flow_id": "f1", "ranking": ranking(&[3001, 3002]) }),
        );
        transport.refuse(&addr(3001));
        let mut client = client(&transport);
        let flow_id = client.submit(flow_spec()).await.unwrap();

        // ACT
        let outcome = client.poll_once(&flow_id).await.unwrap();

        // ASSERT
        assert_eq!(outcome, PollOutcome::Retry);
        assert_eq!(client.target(), Some(&addr(3002)));
    }

    #[tokio::test]
    async fn test_exhausted_ranking_falls_back_to_entry_once() {
        // ARRANGE
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(
            &addr(3000),
            "/jobs",
            json!({ "flow_id": "f1", "ranking": ranking(&[3001]) }),
        );
        transport.refuse(&addr(3001));
        let mut client = client(&transport);
        let flow_id = client.submit(flow_spec()).await.unwrap();

        // ACT & ASSERT: back to the entry node
        assert_eq!(client.poll_once(&flow_id).await.unwrap(), PollOutcome::Retry);
        assert_eq!(client.target(), Some(&addr(3000)));

        // ACT & ASSERT: entry gone as well
        transport.refuse(&addr(3000));
        assert!(client.poll_once(&flow_id).await.is_err());
    }

    #[tokio::test]
    async fn test_run_acknowledges_completed_flow() {
        // ARRANGE
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(
            &addr(3000),
            "/jobs",
            json!({ "flow_id": "f1", "ranking": ranking(&[3000]) }),
        );
        transport.respond(&addr(3000), "/result/f1", poll_reply(&[3000], false));
        transport.respond(&addr(3000), "/result/f1", poll_reply(&[3000], true));
        let mut client = client(&transport);

        // ACT
        let results = client.run(flow_spec()).await.unwrap();

        // ASSERT
        assert_eq!(results.get(&TaskId::from("x")), Some(&TaskStatus::Value(json!(42))));
        let calls = transport.calls_to(&addr(3000));
        let last = calls.last().unwrap();
        assert_eq!(last.method, Method::Delete);
        assert_eq!(last.path, "/result/f1");
    }
}
