mod support;

use std::sync::Arc;

use serde_json::json;

use polyroute_core::{
    handler, ActionError, ActionOptions, Controller, ControllerConfig, HttpStatus, Transport,
};
use polyroute_transports::{AuthGateFactory, HttpRequest, HttpTransport};

fn widgets(transport: &Arc<HttpTransport>) -> Arc<Controller> {
    Controller::new(
        ControllerConfig::new("/widgets")
            .transport(Arc::clone(transport) as Arc<dyn Transport>)
            .action(
                "list",
                ActionOptions::new().handler(handler(|_| async { Ok(Some(json!([{"id": 1}]))) })),
            )
            .action(
                "create",
                ActionOptions::new().method("post").handler(handler(|scope| async move {
                    scope.mark_created();
                    Ok(Some(json!({"id": 2})))
                })),
            )
            .action(
                "purge",
                ActionOptions::new()
                    .method("delete")
                    .handler(handler(|_| async { Ok(None) })),
            )
            .action(
                "explode",
                ActionOptions::new().handler(support::failing_handler("boom")),
            ),
    )
    .unwrap()
}

#[tokio::test]
async fn get_returns_the_handler_payload_with_200() {
    let transport = HttpTransport::new();
    let controller = widgets(&transport);
    controller.bind().unwrap();
    assert!(transport.has_route("get", "/widgets/list"));

    let response = transport.handle(HttpRequest::new("GET", "/widgets/list")).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body, Some(json!([{"id": 1}])));
}

#[tokio::test]
async fn empty_payload_resolves_to_204() {
    let transport = HttpTransport::new();
    widgets(&transport).bind().unwrap();

    let response = transport
        .handle(HttpRequest::new("DELETE", "/widgets/purge"))
        .await;
    assert_eq!(response.status, 204);
    assert_eq!(response.body, None);
}

#[tokio::test]
async fn created_flag_resolves_to_201() {
    let transport = HttpTransport::new();
    widgets(&transport).bind().unwrap();

    let response = transport
        .handle(HttpRequest::new("POST", "/widgets/create"))
        .await;
    assert_eq!(response.status, 201);
    assert_eq!(response.body, Some(json!({"id": 2})));
}

#[tokio::test]
async fn handler_failure_becomes_a_structured_500() {
    let transport = HttpTransport::new();
    widgets(&transport).bind().unwrap();

    let response = transport
        .handle(HttpRequest::new("GET", "/widgets/explode"))
        .await;
    assert_eq!(response.status, 500);
    let body = response.body.unwrap();
    assert_eq!(body["type"], json!("polyroute"));
    assert_eq!(body["status"], json!(500));
    assert_eq!(body["message"], json!("boom"));
    assert_eq!(body["error"], json!(null));
}

#[tokio::test]
async fn unknown_route_answers_404_in_the_uniform_shape() {
    let transport = HttpTransport::new();
    widgets(&transport).bind().unwrap();

    let response = transport.handle(HttpRequest::new("GET", "/nowhere")).await;
    assert_eq!(response.status, 404);
    let body = response.body.unwrap();
    assert_eq!(body["type"], json!("polyroute"));
    assert_eq!(body["status"], json!(404));
}

#[tokio::test]
async fn head_requests_keep_the_status_but_drop_the_body() {
    let transport = HttpTransport::new();
    let controller = Controller::new(
        ControllerConfig::new("/widgets")
            .transport(Arc::clone(&transport) as Arc<dyn Transport>)
            .action(
                "list",
                ActionOptions::new()
                    .method(vec!["get", "head"])
                    .handler(handler(|_| async { Ok(Some(json!([{"id": 1}]))) })),
            ),
    )
    .unwrap();
    controller.bind().unwrap();

    let response = transport
        .handle(HttpRequest::new("HEAD", "/widgets/list"))
        .await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body, None);
}

#[tokio::test]
async fn auth_gate_rejections_short_circuit_dispatch() {
    let gate: AuthGateFactory = Arc::new(|action| {
        if action.name == "list" {
            Some(Arc::new(|request: &serde_json::Value| {
                match request["headers"]["authorization"].as_str() {
                    Some("token") => Ok(()),
                    _ => Err(ActionError::with_status(
                        HttpStatus::UNAUTHORIZED,
                        "missing credentials",
                    )),
                }
            }))
        } else {
            None
        }
    });
    let transport = HttpTransport::with_auth(gate);
    widgets(&transport).bind().unwrap();

    let denied = transport.handle(HttpRequest::new("GET", "/widgets/list")).await;
    assert_eq!(denied.status, 401);
    assert_eq!(denied.body.unwrap()["message"], json!("missing credentials"));

    let allowed = transport
        .handle(HttpRequest::new("GET", "/widgets/list").header("authorization", "token"))
        .await;
    assert_eq!(allowed.status, 200);

    // Ungated actions are unaffected.
    let purge = transport
        .handle(HttpRequest::new("DELETE", "/widgets/purge"))
        .await;
    assert_eq!(purge.status, 204);
}

#[tokio::test]
async fn handler_reads_body_params_and_query_from_the_request() {
    let transport = HttpTransport::new();
    let controller = Controller::new(
        ControllerConfig::new("/widgets")
            .transport(Arc::clone(&transport) as Arc<dyn Transport>)
            .action(
                "echo",
                ActionOptions::new().method("post").handler(handler(|scope| async move {
                    Ok(Some(json!({
                        "body": scope.body(),
                        "params": scope.params(),
                        "query": scope.query(),
                    })))
                })),
            ),
    )
    .unwrap();
    controller.bind().unwrap();

    let response = transport
        .handle(
            HttpRequest::new("POST", "/widgets/echo")
                .body(json!({"name": "gear"}))
                .params(json!({"id": "7"}))
                .query(json!({"expand": "true"})),
        )
        .await;
    assert_eq!(response.status, 200);
    assert_eq!(
        response.body,
        Some(json!({
            "body": {"name": "gear"},
            "params": {"id": "7"},
            "query": {"expand": "true"},
        }))
    );
}

#[tokio::test]
async fn duplicate_route_registration_fails_bind() {
    let transport = HttpTransport::new();
    widgets(&transport).bind().unwrap();

    let clash = Controller::new(
        ControllerConfig::new("/widgets")
            .transport(Arc::clone(&transport) as Arc<dyn Transport>)
            .action(
                "list",
                ActionOptions::new().handler(handler(|_| async { Ok(None) })),
            ),
    )
    .unwrap();
    let err = clash.bind().unwrap_err();
    assert!(err.to_string().contains("already registered"));
}

#[tokio::test]
async fn unbind_removes_http_routes() {
    let transport = HttpTransport::new();
    let controller = widgets(&transport);
    controller.bind().unwrap();
    assert_eq!(transport.route_count(), 4);

    controller.unbind().unwrap();
    assert_eq!(transport.route_count(), 0);
    let response = transport.handle(HttpRequest::new("GET", "/widgets/list")).await;
    assert_eq!(response.status, 404);
}
