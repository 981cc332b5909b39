//! Workflows written against the `Workflow` trait with an exhaustive step enum

use std::sync::Arc;

use serde_json::json;

use kts_workflow::{
    async_trait, response_channel, Completion, Flow, FailureKind, Reply, ReplyKind, Request,
    Transition, Workflow, WorkflowEngine,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SumStep {
    Validate,
    Add,
    Double,
}

/// Adds the `values` in the body one step at a time, then doubles the sum
struct Sum;

#[async_trait]
impl Workflow for Sum {
    type Step = SumStep;
    type State = (Vec<i64>, i64);

    fn name(&self) -> &str {
        "sum"
    }

    async fn step(
        &self,
        step: SumStep,
        mut flow: Flow<Self::State>,
    ) -> Transition<SumStep, Self::State> {
        match step {
            SumStep::Validate => {
                let values: Option<Vec<i64>> = flow
                    .request()
                    .field("values")
                    .and_then(|v| v.as_array())
                    .map(|items| items.iter().filter_map(|i| i.as_i64()).collect());
                match values {
                    Some(values) if !values.is_empty() => {
                        flow.state.0 = values;
                        flow.trigger(SumStep::Add)
                    }
                    _ => {
                        flow.set_field_error("values", "Required");
                        flow.respond()
                    }
                }
            }
            SumStep::Add => match flow.state.0.pop() {
                Some(value) => {
                    flow.state.1 += value;
                    flow.trigger(SumStep::Add)
                }
                None => flow.trigger(SumStep::Double),
            },
            SumStep::Double => {
                let total = flow.state.1 * 2;
                flow.set_result(json!({ "total": total }));
                flow.respond()
            }
        }
    }
}

async fn sum(body: serde_json::Value) -> (Completion<SumStep>, Reply) {
    let (responder, reply) = response_channel();
    let completion = WorkflowEngine::new(Sum, Request::new(body), (Vec::new(), 0), responder)
        .run(SumStep::Validate)
        .await;
    (completion, reply.await.unwrap())
}

#[tokio::test]
async fn test_enum_workflow_runs_to_reply() {
    let (completion, reply) = sum(json!({"values": [1, 2, 3]})).await;
    assert_eq!(completion, Completion::Responded(ReplyKind::Success));
    assert_eq!(reply, Reply::Success(Some(json!({"total": 12}))));
}

#[tokio::test]
async fn test_enum_workflow_short_circuits() {
    let (completion, reply) = sum(json!({"values": []})).await;
    assert_eq!(
        completion,
        Completion::Responded(ReplyKind::Failure(FailureKind::Validation))
    );
    assert_eq!(
        reply.body(),
        json!({"errfor": {"values": "Required"}, "errors": []})
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_runs_do_not_share_state() {
    let mut runs = Vec::new();
    for n in 0..64i64 {
        runs.push(tokio::spawn(async move {
            let (_, reply) = sum(json!({"values": [n, 1]})).await;
            (n, reply)
        }));
    }

    for run in runs {
        let (n, reply) = run.await.unwrap();
        assert_eq!(reply, Reply::Success(Some(json!({"total": (n + 1) * 2}))));
    }
}

#[tokio::test]
async fn test_dropped_receiver_is_disconnected() {
    let (responder, reply) = response_channel();
    drop(reply);

    let request = Request::new(json!({"values": [1]}));
    let engine = WorkflowEngine::new(Sum, request, (Vec::new(), 0), responder)
        .with_logger(Arc::new(kts_workflow::TracingLogger));
    assert_eq!(engine.run(SumStep::Validate).await, Completion::Disconnected);
}
