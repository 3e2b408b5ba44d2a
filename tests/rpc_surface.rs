//! Native RPC surface, loopback dispatch and protocol sharing on one port.

use serde_json::{json, Value};
use std::time::Duration;

use rpc_gateway::config::DispatchMode;
use rpc_gateway::net::tls::DialOptions;
use rpc_gateway::rpc::{
    CallContext, Code, LoopbackEngine, MessageKind, MethodDescriptor, Metadata, RpcCall, RpcEngine,
};
use rpc_gateway::services::pingpong;
use rpc_gateway::Gateway;

mod common;

fn native_client(gateway: &common::RunningGateway, methods: Vec<MethodDescriptor>) -> LoopbackEngine {
    let dial = DialOptions::trusting_pem(common::CERT, common::HOST, gateway.addr.port()).unwrap();
    LoopbackEngine::new(dial, methods)
}

#[tokio::test]
async fn test_native_ping() {
    let gateway = common::start(common::pingpong_gateway(common::config(0))).await;
    let client = native_client(&gateway, vec![pingpong::ping_descriptor()]);

    let outcome = client
        .dispatch(
            RpcCall::new(&pingpong::ping_descriptor(), json!({"sender": "John"})),
            &CallContext::default(),
        )
        .await;
    assert_eq!(outcome.result.unwrap(), json!({"message": "Hello John"}));

    let outcome = client
        .dispatch(
            RpcCall::new(&pingpong::no_ping_descriptor(), json!({})),
            &CallContext::default(),
        )
        .await;
    assert_eq!(outcome.result.unwrap(), json!({"message": "HelloPong"}));

    gateway.stop().await;
}

#[tokio::test]
async fn test_native_unknown_method_is_unimplemented() {
    let gateway = common::start(common::pingpong_gateway(common::config(0))).await;
    let missing = MethodDescriptor::new(
        pingpong::SERVICE,
        "Missing",
        MessageKind::Empty,
        MessageKind::named("pingpong.PongReply"),
    );
    let client = native_client(&gateway, vec![missing.clone()]);

    let outcome = client
        .dispatch(RpcCall::new(&missing, json!({})), &CallContext::default())
        .await;
    assert_eq!(outcome.result.unwrap_err().code(), Code::Unimplemented);

    gateway.stop().await;
}

#[tokio::test]
async fn test_native_metadata_round_trip() {
    let descriptor = MethodDescriptor::new(
        "test.Echo",
        "Echo",
        MessageKind::named("test.Message"),
        MessageKind::named("test.Message"),
    );
    let registered = descriptor.clone();
    let gateway = Gateway::configure(common::config(0))
        .unwrap()
        .register_rpc(move |registry| {
            registry.unary(registered, |req: Value, ctx: CallContext| async move {
                let tenant = ctx.request_metadata().get("tenant").unwrap_or("none").to_string();
                ctx.append_header("x-tenant", tenant);
                ctx.append_trailer("x-handled", "yes");
                Ok(req)
            })?;
            Ok(())
        })
        .build()
        .unwrap();
    let gateway = common::start(gateway).await;
    let client = native_client(&gateway, vec![descriptor.clone()]);

    let mut metadata = Metadata::new();
    metadata.insert("tenant", "acme");
    let ctx = CallContext::default().with_request_metadata(metadata);

    let outcome = client
        .dispatch(RpcCall::new(&descriptor, json!({"n": 1})), &ctx)
        .await;
    assert_eq!(outcome.result.unwrap(), json!({"n": 1}));
    assert_eq!(outcome.header.get("x-tenant"), Some("acme"));
    assert_eq!(outcome.trailer.get("x-handled"), Some("yes"));

    gateway.stop().await;
}

#[tokio::test]
async fn test_native_deadline_is_enforced() {
    let descriptor = MethodDescriptor::new(
        "test.Slow",
        "Wait",
        MessageKind::Empty,
        MessageKind::Empty,
    );
    let registered = descriptor.clone();
    let gateway = Gateway::configure(common::config(0))
        .unwrap()
        .register_rpc(move |registry| {
            registry.unary(registered, |_req: Value, _ctx: CallContext| async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(json!({}))
            })?;
            Ok(())
        })
        .build()
        .unwrap();
    let gateway = common::start(gateway).await;
    let client = native_client(&gateway, vec![descriptor.clone()]);

    let ctx = CallContext::default().with_timeout(Duration::from_millis(200));
    let outcome = client
        .dispatch(RpcCall::new(&descriptor, json!({})), &ctx)
        .await;
    assert_eq!(outcome.result.unwrap_err().code(), Code::DeadlineExceeded);

    gateway.stop().await;
}

#[tokio::test]
async fn test_rest_and_native_share_one_port() {
    let gateway = common::start(common::pingpong_gateway(common::config(0))).await;
    let native = native_client(&gateway, vec![pingpong::ping_descriptor()]);
    let rest = gateway.client();

    for i in 0..8 {
        let sender = format!("caller-{i}");
        let outcome = native
            .dispatch(
                RpcCall::new(&pingpong::ping_descriptor(), json!({ "sender": sender })),
                &CallContext::default(),
            )
            .await;
        assert_eq!(outcome.result.unwrap()["message"], format!("Hello {sender}"));

        let reply: Value = rest
            .post(gateway.url("/pingpong/ping"))
            .json(&json!({ "sender": sender }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(reply["message"], format!("Hello {sender}"));
    }

    gateway.stop().await;
}

#[tokio::test]
async fn test_loopback_dispatch_matches_in_process() {
    let port = common::free_port().await;
    let config = common::config(port).with_dispatch(DispatchMode::Loopback);
    let gateway = common::start(common::pingpong_gateway(config)).await;
    let client = gateway.client();

    let response = client
        .post(gateway.url("/pingpong/ping"))
        .body(r#"{"sender":"John"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(
        response.json::<Value>().await.unwrap(),
        json!({"message": "Hello John"})
    );

    let response = client.get(gateway.url("/pingpong/pong")).send().await.unwrap();
    assert_eq!(
        response.json::<Value>().await.unwrap(),
        json!({"message": "HelloPong"})
    );

    let response = client
        .post(gateway.url("/pingpong/ping"))
        .body("not-json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

    gateway.stop().await;
}
