//! Dispatcher Module Tests
//!
//! ## Test Scopes
//! - **Walk**: Sequential/concurrent semantics, completion propagation, force reassign.
//! - **Dispatch**: Worker selection, failover to another worker, waiting for workers.
//! - **Submission**: `/jobs` behaviour on master and slave nodes.

#[cfg(test)]
mod tests {
    use crate::dispatcher::engine::{DispatchEngine, walk};
    use crate::dispatcher::protocol::{ENDPOINT_JOBS, SubmitFlowRequest};
    use crate::engine::protocol::ENDPOINT_ENGINE;
    use crate::graph::types::{Flow, FlowId, GraphError, TaskId, TaskSpec, TaskStatus};
    use crate::membership::ranking::Candidate;
    use crate::membership::types::NodeInfo;
    use crate::testing::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn id(value: &str) -> TaskId {
        TaskId::from(value)
    }

    fn ids(values: &[&str]) -> Vec<TaskId> {
        values.iter().map(|value| id(value)).collect()
    }

    // ============================================================
    // WALK TESTS
    // ============================================================

    #[test]
    fn test_sequential_walk_dispatches_head_only() {
        // ARRANGE
        let mut flow = list_flow("f1", "sequential", &["a", "b", "c"]);

        // ACT
        let first = walk(&mut flow, &id("root"), false);
        let again = walk(&mut flow, &id("root"), false);

        // ASSERT: Only A, and not twice
        assert_eq!(first, ids(&["a"]));
        assert!(again.is_empty());
        assert!(flow.status(&id("b")).is_none());

        // ACT: A resolves
        flow.set_value(&id("a"), json!(1));
        let next = walk(&mut flow, &id("root"), false);

        // ASSERT
        assert_eq!(next, ids(&["b"]));
    }

    #[test]
    fn test_concurrent_walk_dispatches_all() {
        let mut flow = list_flow("f1", "concurrent", &["a", "b", "c"]);

        let ready = walk(&mut flow, &id("root"), false);

        assert_eq!(ready, ids(&["a", "b", "c"]));
        assert!(flow.results.values().all(TaskStatus::is_assigned));
    }

    #[test]
    fn test_walk_sequential_scenario_x_then_y() {
        // ARRANGE
        let mut flow = list_flow("f1", "sequential", &["x", "y"]);

        // ACT + ASSERT: Walk 1
        assert_eq!(walk(&mut flow, &id("root"), false), ids(&["x"]));
        assert_eq!(flow.status(&id("x")), Some(&TaskStatus::Assigned));

        // X = 42, walk 2
        flow.set_value(&id("x"), json!(42));
        assert_eq!(walk(&mut flow, &id("root"), false), ids(&["y"]));
        assert_eq!(flow.status(&id("x")), Some(&TaskStatus::Value(json!(42))));
        assert_eq!(flow.status(&id("y")), Some(&TaskStatus::Assigned));

        // Y = 7, walk 3
        flow.set_value(&id("y"), json!(7));
        assert!(walk(&mut flow, &id("root"), false).is_empty());
        assert!(flow.is_completed());
    }

    #[test]
    fn test_completed_list_is_never_rewalked() {
        let mut flow = list_flow("f1", "concurrent", &["a"]);
        walk(&mut flow, &id("root"), false);
        flow.set_value(&id("a"), json!("done"));
        walk(&mut flow, &id("root"), false);
        assert!(flow.is_completed());

        let forced = walk(&mut flow, &id("root"), true);

        assert!(forced.is_empty());
        assert!(flow.is_completed());
        assert_eq!(flow.status(&id("a")), Some(&TaskStatus::Value(json!("done"))));
    }

    #[test]
    fn test_force_reassign_skips_values() {
        // ARRANGE: a resolved, b and c in flight
        let mut flow = list_flow("f1", "concurrent", &["a", "b", "c"]);
        walk(&mut flow, &id("root"), false);
        flow.set_value(&id("a"), json!(1));

        // ACT
        let plain = walk(&mut flow, &id("root"), false);
        let forced = walk(&mut flow, &id("root"), true);

        // ASSERT
        assert!(plain.is_empty());
        assert_eq!(forced, ids(&["b", "c"]));
        assert_eq!(flow.status(&id("a")), Some(&TaskStatus::Value(json!(1))));
    }

    #[test]
    fn test_nested_list_completion_propagates() {
        // ARRANGE: root = sequential [inner = concurrent [a, b], c]
        let spec: TaskSpec = serde_json::from_value(json!({
            "element": "list", "id": "root", "type": "sequential",
            "tasks": [
                { "element": "list", "id": "inner", "type": "concurrent", "tasks": [
                    { "element": "task", "id": "a", "action": { "module": "echo" } },
                    { "element": "task", "id": "b", "action": { "module": "echo" } }
                ]},
                { "element": "task", "id": "c", "action": { "module": "echo" } }
            ]
        }))
        .unwrap();
        let mut flow = Flow::from_spec(FlowId::from("f1"), &spec).unwrap();

        // ACT + ASSERT
        assert_eq!(walk(&mut flow, &id("root"), false), ids(&["a", "b"]));

        flow.set_value(&id("a"), json!(1));
        assert!(walk(&mut flow, &id("root"), false).is_empty());

        flow.set_value(&id("b"), json!(2));
        assert_eq!(walk(&mut flow, &id("root"), false), ids(&["c"]));
        assert!(flow.is_terminal(&id("inner")));
        assert!(!flow.is_completed());
    }

    #[test]
    fn test_force_walk_never_dispatches_a_leaf_twice() {
        // ARRANGE: concurrent [a, done = sequential [d]] with d resolved
        let spec: TaskSpec = serde_json::from_value(json!({
            "element": "list", "id": "root", "type": "concurrent",
            "tasks": [
                { "element": "task", "id": "a", "action": { "module": "echo" } },
                { "element": "list", "id": "done", "type": "sequential", "tasks": [
                    { "element": "task", "id": "d", "action": { "module": "echo" } }
                ]}
            ]
        }))
        .unwrap();
        let mut flow = Flow::from_spec(FlowId::from("f1"), &spec).unwrap();
        walk(&mut flow, &id("root"), false);
        flow.set_value(&id("d"), json!(0));

        // ACT: completing `done` re-enters the root while it is being walked
        let forced = walk(&mut flow, &id("root"), true);

        // ASSERT
        assert_eq!(forced, ids(&["a"]));
        assert!(flow.is_terminal(&id("done")));
    }

    #[test]
    fn test_empty_list_completes_immediately() {
        let mut flow = list_flow("f1", "sequential", &[]);

        assert!(walk(&mut flow, &id("root"), false).is_empty());
        assert!(flow.is_completed());
    }

    // ============================================================
    // DISPATCH TESTS
    // ============================================================

    /// Master on 3000 whose only workers are the given peers.
    async fn master_with_workers(
        transport: &Arc<ScriptedTransport>,
        workers: Vec<NodeInfo>,
    ) -> Arc<crate::node::FogNode> {
        let node = test_node(3000, vec![], transport.clone());
        {
            let mut state = node.state.lock().await;
            state.join_ranking();
            state.peers.remove(&addr(3000));
            for worker in workers {
                state.peers.insert(worker);
            }
        }
        node
    }

    #[tokio::test]
    async fn test_dispatch_fails_over_to_second_worker() {
        // ARRANGE
        let transport = Arc::new(ScriptedTransport::new());
        transport.refuse(&addr(3001));
        transport.respond(&addr(3002), ENDPOINT_ENGINE, engine_reply(3002, &[task_ref("f1", "x")]));
        let node = master_with_workers(
            &transport,
            vec![reachable_peer(3001, false), reachable_peer(3002, false)],
        )
        .await;
        let dispatcher = DispatchEngine::new(node.clone());

        // ACT
        let handles = {
            let mut state = node.state.lock().await;
            state.flows.add(list_flow("f1", "sequential", &["x"]));
            dispatcher.walk_flow(&mut state, &FlowId::from("f1"), None, false)
        };
        for handle in handles {
            handle.await.unwrap();
        }

        // ASSERT
        assert_eq!(transport.calls_to(&addr(3001)).len(), 1);
        assert_eq!(transport.calls_to(&addr(3002)).len(), 1);

        let state = node.state.lock().await;
        let failed = state.peers.get(&addr(3001)).unwrap();
        assert!(!failed.is_reachable());
        assert_eq!(failed.outstanding(), 0);
        assert_eq!(
            state.peers.get(&addr(3002)).unwrap().pending_tasks,
            vec![task_ref("f1", "x")]
        );
    }

    #[tokio::test]
    async fn test_dispatch_sends_results_for_substitution() {
        // ARRANGE
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(&addr(3001), ENDPOINT_ENGINE, engine_reply(3001, &[]));
        let node = master_with_workers(&transport, vec![reachable_peer(3001, false)]).await;
        let dispatcher = DispatchEngine::new(node.clone());

        // ACT
        let handles = {
            let mut state = node.state.lock().await;
            let mut flow = list_flow("f1", "sequential", &["x", "y"]);
            walk(&mut flow, &id("root"), false);
            flow.set_value(&id("x"), json!(42));
            state.flows.add(flow);
            dispatcher.walk_flow(&mut state, &FlowId::from("f1"), None, false)
        };
        for handle in handles {
            handle.await.unwrap();
        }

        // ASSERT
        let calls = transport.calls_to(&addr(3001));
        assert_eq!(calls.len(), 1);
        let body = calls[0].body.clone().unwrap();
        assert_eq!(body["task"]["id"], "y");
        assert_eq!(body["results"]["x"], 42);
    }

    #[tokio::test]
    async fn test_dispatch_waits_for_a_worker() {
        // ARRANGE: the only worker has never been confirmed reachable
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(&addr(3001), ENDPOINT_ENGINE, engine_reply(3001, &[]));
        let node =
            master_with_workers(&transport, vec![NodeInfo::new_peer(addr(3001), 0.0, false, false)])
                .await;
        let dispatcher = DispatchEngine::new(node.clone());

        let mut handles = {
            let mut state = node.state.lock().await;
            state.flows.add(list_flow("f1", "sequential", &["x"]));
            dispatcher.walk_flow(&mut state, &FlowId::from("f1"), None, false)
        };

        // ACT: nothing can be sent yet
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(transport.calls().is_empty());

        node.state
            .lock()
            .await
            .peers
            .get_mut(&addr(3001))
            .unwrap()
            .mark_reachable();

        // ASSERT
        let handle = handles.pop().unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(transport.calls_to(&addr(3001)).len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_dropped_when_no_longer_master() {
        // ARRANGE: a higher ranked node took over
        let transport = Arc::new(ScriptedTransport::new());
        let node = master_with_workers(&transport, vec![reachable_peer(3001, false)]).await;
        let dispatcher = DispatchEngine::new(node.clone());
        {
            let mut state = node.state.lock().await;
            state.flows.add(list_flow("f1", "sequential", &["x"]));
            state.ranking.sync_score(Candidate {
                addr: addr(3009),
                score: 100.0,
                on_battery: false,
            });
        }

        // ACT
        dispatcher.submit(task_ref("f1", "x")).await.unwrap();

        // ASSERT
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_resubmit_skips_resolved_leaves() {
        let transport = Arc::new(ScriptedTransport::new());
        let node = master_with_workers(&transport, vec![reachable_peer(3001, false)]).await;
        let dispatcher = DispatchEngine::new(node.clone());
        {
            let mut state = node.state.lock().await;
            let mut flow = list_flow("f1", "concurrent", &["x"]);
            flow.set_value(&id("x"), json!(1));
            state.flows.add(flow);
        }

        for handle in dispatcher.resubmit(vec![task_ref("f1", "x")]) {
            handle.await.unwrap();
        }

        assert!(transport.calls().is_empty());
    }

    // ============================================================
    // SUBMISSION TESTS
    // ============================================================

    fn submission(flow_id: Option<&str>) -> SubmitFlowRequest {
        SubmitFlowRequest {
            id: flow_id.map(FlowId::from),
            flow: serde_json::from_value(json!({
                "element": "list", "id": "root", "type": "sequential",
                "tasks": [{ "element": "task", "id": "x", "action": { "module": "echo" } }]
            }))
            .unwrap(),
        }
    }

    #[tokio::test]
    async fn test_master_stores_walks_and_relays() {
        // ARRANGE
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(&addr(3001), ENDPOINT_ENGINE, engine_reply(3001, &[]));
        transport.respond(&addr(3002), ENDPOINT_ENGINE, engine_reply(3002, &[]));
        let node = master_with_workers(
            &transport,
            vec![reachable_peer(3001, false), reachable_peer(3002, false)],
        )
        .await;
        let dispatcher = DispatchEngine::new(node.clone());

        // ACT
        let response = dispatcher
            .receive_flow(submission(None), None)
            .await
            .unwrap();

        // ASSERT: generated id, stored, one leaf dispatched, copies relayed
        assert!(!response.flow_id.0.is_empty());
        assert!(response.ranking.is_master(&addr(3000)));
        assert!(
            eventually(|| {
                let jobs = transport
                    .calls()
                    .into_iter()
                    .filter(|call| call.path == ENDPOINT_JOBS)
                    .count();
                let engine = transport
                    .calls()
                    .into_iter()
                    .filter(|call| call.path == ENDPOINT_ENGINE)
                    .count();
                jobs == 2 && engine == 1
            })
            .await
        );

        let relay = transport
            .calls_to(&addr(3001))
            .into_iter()
            .find(|call| call.path == ENDPOINT_JOBS)
            .unwrap();
        assert!(relay.headers.contains(&("referer".to_string(), "127.0.0.1:3000".to_string())));
        assert_eq!(relay.body.unwrap()["id"], json!(response.flow_id.0));

        let state = node.state.lock().await;
        let flow = state.flows.get(&response.flow_id).unwrap();
        assert_eq!(flow.status(&id("x")), Some(&TaskStatus::Assigned));
    }

    #[tokio::test]
    async fn test_master_ignores_known_flow() {
        let transport = Arc::new(ScriptedTransport::new());
        let node = master_with_workers(&transport, vec![]).await;
        let dispatcher = DispatchEngine::new(node.clone());
        node.state
            .lock()
            .await
            .flows
            .add(list_flow("f1", "sequential", &["x"]));

        let response = dispatcher
            .receive_flow(submission(Some("f1")), None)
            .await
            .unwrap();

        assert_eq!(response.flow_id, FlowId::from("f1"));
        let state = node.state.lock().await;
        assert!(state.flows.get(&FlowId::from("f1")).unwrap().results.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_task_ids_are_rejected() {
        let transport = Arc::new(ScriptedTransport::new());
        let node = master_with_workers(&transport, vec![]).await;
        let dispatcher = DispatchEngine::new(node.clone());
        let request = SubmitFlowRequest {
            id: None,
            flow: serde_json::from_value(json!({
                "element": "list", "id": "root", "type": "concurrent",
                "tasks": [{ "element": "task", "id": "root", "action": { "module": "echo" } }]
            }))
            .unwrap(),
        };

        let result = dispatcher.receive_flow(request, None).await;

        assert!(matches!(result, Err(GraphError::DuplicateId(_))));
        assert!(node.state.lock().await.flows.is_empty());
    }

    /// Slave on 3001 following master 3000.
    async fn slave(transport: &Arc<ScriptedTransport>) -> Arc<crate::node::FogNode> {
        let node = test_node(3001, vec![], transport.clone());
        {
            let mut state = node.state.lock().await;
            state.ranking.sync_score(Candidate {
                addr: addr(3000),
                score: 10.0,
                on_battery: false,
            });
            state.join_ranking();
        }
        node
    }

    #[tokio::test]
    async fn test_slave_forwards_client_submission_to_master() {
        let transport = Arc::new(ScriptedTransport::new());
        let node = slave(&transport).await;
        let dispatcher = DispatchEngine::new(node.clone());

        let response = dispatcher
            .receive_flow(submission(Some("f1")), None)
            .await
            .unwrap();

        assert!(response.ranking.is_master(&addr(3000)));
        assert!(eventually(|| transport.calls_to(&addr(3000)).len() == 1).await);
        assert_eq!(transport.calls_to(&addr(3000))[0].path, ENDPOINT_JOBS);
        assert!(node.state.lock().await.flows.is_empty());
    }

    #[tokio::test]
    async fn test_slave_keeps_backup_from_master() {
        let transport = Arc::new(ScriptedTransport::new());
        let node = slave(&transport).await;
        let dispatcher = DispatchEngine::new(node.clone());

        dispatcher
            .receive_flow(submission(Some("f1")), Some(addr(3000)))
            .await
            .unwrap();

        let state = node.state.lock().await;
        let backup = state.flows.get(&FlowId::from("f1")).unwrap();
        assert!(backup.results.is_empty());
        assert!(transport.calls().is_empty());
    }
}
