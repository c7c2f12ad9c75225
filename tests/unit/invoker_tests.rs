//! Unit tests for the `tools/call` façade.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use deck_forge::toolserver::correlator::{Correlator, Transport, WritePhase};
use deck_forge::toolserver::invoker::{tool_text, ToolCaller, ToolInvoker, TOOLS_CALL_METHOD};
use deck_forge::toolserver::message::{ResponseOutcome, RpcErrorPayload, RpcResponse};
use deck_forge::{AppError, Result};

struct ChannelTransport(mpsc::UnboundedSender<Value>);

impl Transport for ChannelTransport {
    fn send_frame(
        &self,
        frame: Bytes,
        _phase: WritePhase,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let _ = self.0.send(serde_json::from_slice(&frame).expect("json frame"));
            Ok(())
        })
    }
}

fn setup(timeout: Duration) -> (Arc<Correlator>, ToolInvoker, mpsc::UnboundedReceiver<Value>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let correlator = Arc::new(Correlator::new(Arc::new(ChannelTransport(tx)), timeout));
    let invoker = ToolInvoker::new(Arc::clone(&correlator));
    (correlator, invoker, rx)
}

async fn answer(
    correlator: &Correlator,
    frames: &mut mpsc::UnboundedReceiver<Value>,
    outcome: ResponseOutcome,
) -> Value {
    let frame = frames.recv().await.expect("frame");
    correlator.dispatch(RpcResponse {
        id: frame["id"].as_str().expect("id").to_owned(),
        outcome,
    });
    frame
}

#[tokio::test]
async fn invoke_wraps_name_and_arguments_in_tools_call() {
    let (correlator, invoker, mut frames) = setup(Duration::from_secs(5));

    let call = tokio::spawn(async move {
        invoker
            .call_tool("add_slide", json!({ "layout_index": 1, "title": "Overview" }))
            .await
    });
    let result = json!({ "content": [{ "type": "text", "text": "Added slide 1" }] });
    let frame = answer(&correlator, &mut frames, ResponseOutcome::Result(result.clone())).await;

    assert_eq!(frame["method"], TOOLS_CALL_METHOD);
    assert_eq!(frame["params"]["name"], "add_slide");
    assert_eq!(frame["params"]["arguments"]["title"], "Overview");
    assert_eq!(call.await.expect("join"), Ok(result));
}

#[tokio::test]
async fn rpc_error_becomes_tool_invocation_with_code() {
    let (correlator, invoker, mut frames) = setup(Duration::from_secs(5));

    let call = tokio::spawn(async move { invoker.invoke("save_presentation", json!({})).await });
    answer(
        &correlator,
        &mut frames,
        ResponseOutcome::Error(RpcErrorPayload {
            code: -32000,
            message: "disk full".into(),
        }),
    )
    .await;

    assert_eq!(
        call.await.expect("join"),
        Err(AppError::ToolInvocation {
            tool: "save_presentation".into(),
            code: Some(-32000),
            message: "disk full".into(),
        })
    );
}

#[tokio::test]
async fn is_error_result_becomes_tool_invocation_without_code() {
    let (correlator, invoker, mut frames) = setup(Duration::from_secs(5));

    let call = tokio::spawn(async move { invoker.invoke("add_bullet_points", json!({})).await });
    answer(
        &correlator,
        &mut frames,
        ResponseOutcome::Result(json!({
            "isError": true,
            "content": [{ "type": "text", "text": "slide index out of range" }]
        })),
    )
    .await;

    assert_eq!(
        call.await.expect("join"),
        Err(AppError::ToolInvocation {
            tool: "add_bullet_points".into(),
            code: None,
            message: "slide index out of range".into(),
        })
    );
}

#[tokio::test]
async fn timeout_passes_through_unwrapped() {
    let (_correlator, invoker, _frames) = setup(Duration::from_millis(50));

    let err = invoker
        .invoke("get_presentation_info", json!({}))
        .await
        .expect_err("no server, must time out");

    assert!(matches!(err, AppError::RequestTimeout { ref method, .. } if method == TOOLS_CALL_METHOD));
    assert!(err.is_unreachable());
}

#[test]
fn tool_text_joins_text_items_and_ignores_others() {
    let result = json!({
        "content": [
            { "type": "text", "text": "first" },
            { "type": "image", "data": "..." },
            { "type": "text", "text": "second" }
        ]
    });
    assert_eq!(tool_text(&result), "first\nsecond");
    assert_eq!(tool_text(&json!({})), "");
}
