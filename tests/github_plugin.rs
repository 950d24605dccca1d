//! GitHub plugin tests against a wiremock server.

use mintflow::{standard_registry, Error, ExecutionContext};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn ctx_for(server: &MockServer) -> ExecutionContext {
    ExecutionContext::builder()
        .override_base_url("github", server.uri())
        .build()
        .expect("context creation should succeed")
}

#[tokio::test]
async fn create_issue_posts_to_the_issues_endpoint() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/repos/octocat/hello-world/issues"))
        .and(header("accept", "application/vnd.github.v3+json"))
        .and(header("authorization", "Bearer ghp_testtoken"))
        .and(body_json(json!({
            "title": "Found a bug",
            "body": "Something is broken",
            "labels": ["bug", "help wanted"]
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": 1,
            "number": 1347,
            "state": "open",
            "title": "Found a bug",
            "html_url": "https://github.com/octocat/hello-world/issues/1347"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let registry = standard_registry().expect("registry should build");
    let issue = registry
        .dispatch(
            "github",
            "create_issue",
            json!({
                "token": "ghp_testtoken",
                "owner": "octocat",
                "repo": "hello-world",
                "title": "Found a bug",
                "body": "Something is broken",
                "labels": "bug, help wanted"
            }),
            &ctx_for(&server),
        )
        .await
        .expect("create_issue should succeed");

    assert_eq!(issue["number"], 1347);
    assert_eq!(issue["state"], "open");
    assert_eq!(issue["title"], "Found a bug");
}

#[tokio::test]
async fn missing_title_fails_validation_without_a_request() {
    let server = MockServer::start().await;

    let registry = standard_registry().expect("registry should build");
    let err = registry
        .dispatch(
            "github",
            "create_issue",
            json!({
                "token": "ghp_testtoken",
                "owner": "octocat",
                "repo": "hello-world"
            }),
            &ctx_for(&server),
        )
        .await
        .unwrap_err();

    let Error::Validation(details) = err else {
        panic!("expected Validation, got {err:?}");
    };
    assert_eq!(details.missing, vec!["title"]);
    assert!(server
        .received_requests()
        .await
        .expect("request recording enabled")
        .is_empty());
}

#[tokio::test]
async fn missing_connection_fields_are_enumerated_together() {
    let server = MockServer::start().await;
    let registry = standard_registry().expect("registry should build");

    let err = registry
        .dispatch(
            "github",
            "get_issue",
            json!({ "issue_number": 1 }),
            &ctx_for(&server),
        )
        .await
        .unwrap_err();
    let Error::Validation(details) = err else {
        panic!("expected Validation, got {err:?}");
    };
    assert_eq!(details.missing, vec!["token", "owner", "repo"]);
}

#[tokio::test]
async fn upstream_404_is_wrapped_with_the_github_label() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/octocat/hello-world/issues/9999"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "message": "Not Found",
            "documentation_url": "https://docs.github.com/rest"
        })))
        .mount(&server)
        .await;

    let registry = standard_registry().expect("registry should build");
    let err = registry
        .dispatch(
            "github",
            "get_issue",
            json!({
                "token": "ghp_testtoken",
                "owner": "octocat",
                "repo": "hello-world",
                "issue_number": 9999
            }),
            &ctx_for(&server),
        )
        .await
        .unwrap_err();

    let Error::Upstream(details) = err else {
        panic!("expected Upstream, got {err:?}");
    };
    assert_eq!(details.status, Some(404));
    assert_eq!(details.to_string(), "GitHub API error (404): Not Found");
}

#[tokio::test]
async fn lock_issue_puts_the_lock_subresource() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/repos/octocat/hello-world/issues/42/lock"))
        .and(body_json(json!({ "lock_reason": "resolved" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let registry = standard_registry().expect("registry should build");
    let out = registry
        .dispatch(
            "github",
            "lock_issue",
            json!({
                "token": "ghp_testtoken",
                "owner": "octocat",
                "repo": "hello-world",
                "issue_number": 42
            }),
            &ctx_for(&server),
        )
        .await
        .expect("lock_issue should succeed");
    assert_eq!(out, json!({ "locked": true }));
}

#[tokio::test]
async fn raw_graphql_parses_string_variables() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_json(json!({
            "query": "query($n: Int!) { x }",
            "variables": { "n": 7 }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "x": 7 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let registry = standard_registry().expect("registry should build");
    let out = registry
        .dispatch(
            "github",
            "raw_graphql",
            json!({
                "token": "ghp_testtoken",
                "owner": "octocat",
                "repo": "hello-world",
                "query": "query($n: Int!) { x }",
                "variables": "{\"n\": 7}"
            }),
            &ctx_for(&server),
        )
        .await
        .expect("raw_graphql should succeed");
    assert_eq!(out["data"]["x"], 7);
}
