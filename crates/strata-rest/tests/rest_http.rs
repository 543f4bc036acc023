//! One real-HTTP pass through the blocking client against a local mock
//! server: routing, auth header, and response inflation all together.

use std::sync::Arc;
use strata_core::{DataContext, Resource};
use strata_rest::{ReqwestClient, RestConfig, RestDataContext};

#[test]
fn test_point_fetch_through_a_real_http_client() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/exchange/v2/people/abc123")
        .match_header("authorization", "Basic a2V5OnNlY3JldA==")
        .match_header("accept", "application/vnd.api+json")
        .with_status(200)
        .with_header("content-type", "application/vnd.api+json")
        .with_body(
            r#"{"data": {"type": "people", "id": "abc123", "attributes": {"name": "Kael"}}}"#,
        )
        .create();

    let ctx = RestDataContext::new(
        RestConfig::new(server.url(), "exchange", "2", "key", "secret"),
        Arc::new(ReqwestClient::new().unwrap()),
    )
    .register_generic("people");

    let ds = ctx.datasource_for_type("people").unwrap();
    let person = ds.get(Some("id=abc123")).unwrap().into_single().unwrap();
    assert_eq!(person.id(), Some("abc123"));
    assert_eq!(
        person.to_json_api().attributes["name"],
        serde_json::json!("Kael")
    );
    mock.assert();
}

#[test]
fn test_missing_resource_through_a_real_http_client() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/exchange/v2/people/nobody")
        .with_status(404)
        .with_body(r#"{"errors": [{"detail": "no such person"}]}"#)
        .create();

    let ctx = RestDataContext::new(
        RestConfig::new(server.url(), "exchange", "2", "key", "secret"),
        Arc::new(ReqwestClient::new().unwrap()),
    )
    .register_generic("people");

    let ds = ctx.datasource_for_type("people").unwrap();
    let err = ds.get(Some("id=nobody")).expect_err("must be missing");
    assert!(err.is_not_found());
}
