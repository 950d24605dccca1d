//! GitHub plugin.
//!
//! Issue lifecycle actions over the REST v3 API plus a raw GraphQL
//! passthrough. All actions share the token/owner/repo connection fields
//! declared on the plugin-level schema.

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::context::ExecutionContext;
use crate::descriptor::{handler_fn, Action, PluginDescriptor};
use crate::errors::{Error, Result, ValidationError};
use crate::http::send_json;
use crate::schema::{ActionSchema, FieldSpec};

pub const PLUGIN_ID: &str = "github";
pub const DEFAULT_BASE_URL: &str = "https://api.github.com";
const UPSTREAM: &str = "GitHub API";
const ACCEPT: &str = "application/vnd.github.v3+json";
const USER_AGENT: &str = "mintflow";

#[derive(Debug, Deserialize)]
struct RepoParams {
    token: String,
    owner: String,
    repo: String,
}

fn repo_params(input: &Value) -> Result<RepoParams> {
    serde_json::from_value(input.clone()).map_err(Error::Serialization)
}

fn request(
    ctx: &ExecutionContext,
    method: reqwest::Method,
    token: &str,
    path: &str,
) -> reqwest::RequestBuilder {
    let base = ctx.base_url(PLUGIN_ID, DEFAULT_BASE_URL);
    ctx.http()
        .request(method, format!("{base}{path}"))
        .bearer_auth(token)
        .header(reqwest::header::ACCEPT, ACCEPT)
        .header(reqwest::header::USER_AGENT, USER_AGENT)
}

fn issue_number(input: &Value) -> Result<u64> {
    match input.get("issue_number") {
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| issue_number_error()),
        Some(Value::String(s)) => s.parse().map_err(|_| issue_number_error()),
        _ => Err(issue_number_error()),
    }
}

fn issue_number_error() -> Error {
    ValidationError::new("must be a positive integer")
        .with_field("issue_number")
        .into()
}

/// Comma-separated list input ("bug, help wanted") to a trimmed string array.
fn comma_list(input: &Value, field: &str) -> Vec<String> {
    input
        .get(field)
        .and_then(|v| v.as_str())
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

async fn create_issue(input: Value, ctx: ExecutionContext) -> Result<Value> {
    let params = repo_params(&input)?;
    let title = input
        .get("title")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ValidationError::new("is required").with_field("title"))?;

    let mut body = Map::new();
    body.insert("title".into(), Value::String(title.to_string()));
    if let Some(text) = input.get("body").and_then(|v| v.as_str()) {
        body.insert("body".into(), Value::String(text.to_string()));
    }
    let labels = comma_list(&input, "labels");
    if !labels.is_empty() {
        body.insert("labels".into(), json!(labels));
    }
    let assignees = comma_list(&input, "assignees");
    if !assignees.is_empty() {
        body.insert("assignees".into(), json!(assignees));
    }

    send_json(
        UPSTREAM,
        request(
            &ctx,
            reqwest::Method::POST,
            &params.token,
            &format!("/repos/{}/{}/issues", params.owner, params.repo),
        )
        .json(&Value::Object(body)),
    )
    .await
}

async fn get_issue(input: Value, ctx: ExecutionContext) -> Result<Value> {
    let params = repo_params(&input)?;
    let number = issue_number(&input)?;
    send_json(
        UPSTREAM,
        request(
            &ctx,
            reqwest::Method::GET,
            &params.token,
            &format!("/repos/{}/{}/issues/{}", params.owner, params.repo, number),
        ),
    )
    .await
}

async fn create_comment(input: Value, ctx: ExecutionContext) -> Result<Value> {
    let params = repo_params(&input)?;
    let number = issue_number(&input)?;
    let body = input
        .get("body")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ValidationError::new("is required").with_field("body"))?;
    send_json(
        UPSTREAM,
        request(
            &ctx,
            reqwest::Method::POST,
            &params.token,
            &format!(
                "/repos/{}/{}/issues/{}/comments",
                params.owner, params.repo, number
            ),
        )
        .json(&json!({ "body": body })),
    )
    .await
}

async fn lock_issue(input: Value, ctx: ExecutionContext) -> Result<Value> {
    let params = repo_params(&input)?;
    let number = issue_number(&input)?;
    let reason = input
        .get("lock_reason")
        .and_then(|v| v.as_str())
        .unwrap_or("resolved");
    send_json(
        UPSTREAM,
        request(
            &ctx,
            reqwest::Method::PUT,
            &params.token,
            &format!("/repos/{}/{}/issues/{}/lock", params.owner, params.repo, number),
        )
        .json(&json!({ "lock_reason": reason })),
    )
    .await?;
    Ok(json!({ "locked": true }))
}

async fn unlock_issue(input: Value, ctx: ExecutionContext) -> Result<Value> {
    let params = repo_params(&input)?;
    let number = issue_number(&input)?;
    send_json(
        UPSTREAM,
        request(
            &ctx,
            reqwest::Method::DELETE,
            &params.token,
            &format!("/repos/{}/{}/issues/{}/lock", params.owner, params.repo, number),
        ),
    )
    .await?;
    Ok(json!({ "locked": false }))
}

async fn raw_graphql(input: Value, ctx: ExecutionContext) -> Result<Value> {
    let params = repo_params(&input)?;
    let query = input
        .get("query")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ValidationError::new("is required").with_field("query"))?;

    let variables = match input.get("variables") {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(Value::String(raw)) => serde_json::from_str(raw).map_err(|_| {
            Error::Validation(
                ValidationError::new("Invalid JSON in variables parameter")
                    .with_field("variables"),
            )
        })?,
        Some(other) => other.clone(),
    };

    send_json(
        UPSTREAM,
        request(&ctx, reqwest::Method::POST, &params.token, "/graphql")
            .json(&json!({ "query": query, "variables": variables })),
    )
    .await
}

fn plugin_schema() -> ActionSchema {
    ActionSchema::object()
        .field(
            "action",
            FieldSpec::string()
                .describe("Operation to perform")
                .allowed(&[
                    "create_issue",
                    "get_issue",
                    "create_comment",
                    "lock_issue",
                    "unlock_issue",
                    "raw_graphql",
                ]),
        )
        .field("token", FieldSpec::string().describe("Personal access token"))
        .field("owner", FieldSpec::string().describe("Repository owner"))
        .field("repo", FieldSpec::string().describe("Repository name"))
        .field(
            "title",
            FieldSpec::string()
                .describe("Issue title")
                .hide_unless("action", "create_issue"),
        )
        .field(
            "body",
            FieldSpec::string().describe("Issue or comment body"),
        )
        .field(
            "labels",
            FieldSpec::string()
                .describe("Comma-separated label names")
                .hide_unless("action", "create_issue"),
        )
        .field(
            "assignees",
            FieldSpec::string()
                .describe("Comma-separated usernames")
                .hide_unless("action", "create_issue"),
        )
        .field(
            "issue_number",
            FieldSpec::number().describe("Issue number"),
        )
        .field(
            "query",
            FieldSpec::string()
                .describe("GraphQL query text")
                .hide_unless("action", "raw_graphql"),
        )
        .field(
            "variables",
            FieldSpec::string()
                .describe("GraphQL variables as a JSON string")
                .hide_unless("action", "raw_graphql"),
        )
        .require(&["token", "owner", "repo"])
}

pub fn plugin() -> Result<PluginDescriptor> {
    Ok(PluginDescriptor::new(PLUGIN_ID, "GitHub")?
        .with_description("Manage issues and comments on GitHub repositories")
        .with_groups(&["developer-tools"])
        .with_tags(&["github", "issues", "git"])
        .with_documentation("https://docs.github.com/en/rest/issues")
        .with_input_schema(plugin_schema())
        .with_example_input(json!({
            "action": "create_issue",
            "token": "ghp_xxxx",
            "owner": "octocat",
            "repo": "hello-world",
            "title": "Found a bug",
            "body": "Something is broken",
            "labels": "bug, help wanted"
        }))
        .with_example_output(json!({
            "id": 1,
            "number": 1347,
            "state": "open",
            "title": "Found a bug",
            "html_url": "https://github.com/octocat/hello-world/issues/1347"
        }))
        .with_action(
            Action::new("create_issue", handler_fn(create_issue))?
                .with_description("Open a new issue")
                .with_input_schema(ActionSchema::object().require(&["title"])),
        )
        .with_action(
            Action::new("get_issue", handler_fn(get_issue))?
                .with_description("Fetch one issue by number")
                .with_input_schema(ActionSchema::object().require(&["issue_number"])),
        )
        .with_action(
            Action::new("create_comment", handler_fn(create_comment))?
                .with_description("Comment on an issue")
                .with_input_schema(ActionSchema::object().require(&["issue_number", "body"])),
        )
        .with_action(
            Action::new("lock_issue", handler_fn(lock_issue))?
                .with_description("Lock an issue's conversation")
                .with_input_schema(ActionSchema::object().require(&["issue_number"])),
        )
        .with_action(
            Action::new("unlock_issue", handler_fn(unlock_issue))?
                .with_description("Unlock an issue's conversation")
                .with_input_schema(ActionSchema::object().require(&["issue_number"])),
        )
        .with_action(
            Action::new("raw_graphql", handler_fn(raw_graphql))?
                .with_description("Run a raw GraphQL query")
                .with_input_schema(ActionSchema::object().require(&["query"])),
        ))
}
