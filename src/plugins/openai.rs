//! OpenAI plugin.
//!
//! Text generation and embeddings over the chat-completions API, including a
//! streaming variant that accumulates SSE deltas into the final text.

use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::context::ExecutionContext;
use crate::descriptor::{handler_fn, Action, PluginDescriptor};
use crate::errors::{Error, Result, ValidationError};
use crate::http::{json_or_upstream, transport_error, upstream_error};
use crate::schema::{ActionSchema, FieldSpec};
use crate::sse::sse_stream;

pub const PLUGIN_ID: &str = "openai";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const UPSTREAM: &str = "OpenAI API";
const DEFAULT_TEMPERATURE: f64 = 0.7;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenAiParams {
    api_key: String,
    model: String,
    #[serde(default)]
    organization: Option<String>,
    #[serde(default)]
    base_url: Option<String>,
}

fn openai_params(input: &Value) -> Result<OpenAiParams> {
    serde_json::from_value(input.clone()).map_err(Error::Serialization)
}

fn base_url(ctx: &ExecutionContext, params: &OpenAiParams) -> String {
    if let Some(base) = ctx.base_override(PLUGIN_ID) {
        return base.to_string();
    }
    params
        .base_url
        .as_deref()
        .map(|s| s.trim_end_matches('/').to_string())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
}

fn request(
    ctx: &ExecutionContext,
    params: &OpenAiParams,
    path: &str,
) -> reqwest::RequestBuilder {
    let mut builder = ctx
        .http()
        .post(format!("{}{}", base_url(ctx, params), path))
        .bearer_auth(&params.api_key);
    if let Some(org) = &params.organization {
        builder = builder.header("OpenAI-Organization", org);
    }
    builder
}

fn chat_body(input: &Value, params: &OpenAiParams, stream: bool) -> Result<Value> {
    let prompt = input
        .get("prompt")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ValidationError::new("is required").with_field("prompt"))?;

    let mut messages = Vec::new();
    if let Some(system) = input.get("systemPrompt").and_then(|v| v.as_str()) {
        messages.push(json!({ "role": "system", "content": system }));
    }
    messages.push(json!({ "role": "user", "content": prompt }));

    let mut body = Map::new();
    body.insert("model".into(), Value::String(params.model.clone()));
    body.insert("messages".into(), Value::Array(messages));
    body.insert(
        "temperature".into(),
        json!(input
            .get("temperature")
            .and_then(|v| v.as_f64())
            .unwrap_or(DEFAULT_TEMPERATURE)),
    );
    if let Some(max_tokens) = input.get("maxTokens").and_then(|v| v.as_u64()) {
        body.insert("max_tokens".into(), json!(max_tokens));
    }
    if let Some(top_p) = input.get("topP").and_then(|v| v.as_f64()) {
        body.insert("top_p".into(), json!(top_p));
    }
    if stream {
        body.insert("stream".into(), Value::Bool(true));
    }
    Ok(Value::Object(body))
}

async fn generate_text(input: Value, ctx: ExecutionContext) -> Result<Value> {
    let params = openai_params(&input)?;
    let body = chat_body(&input, &params, false)?;

    let response = request(&ctx, &params, "/chat/completions")
        .json(&body)
        .send()
        .await
        .map_err(transport_error)?;
    let completion = json_or_upstream(UPSTREAM, response).await?;

    let text = completion["choices"][0]["message"]["content"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    Ok(json!({
        "text": text,
        "model": completion["model"],
        "usage": completion["usage"],
    }))
}

async fn create_embedding(input: Value, ctx: ExecutionContext) -> Result<Value> {
    let params = openai_params(&input)?;
    let text_input = input
        .get("input")
        .filter(|v| v.is_string() || v.is_array())
        .cloned()
        .ok_or_else(|| ValidationError::new("is required").with_field("input"))?;

    let response = request(&ctx, &params, "/embeddings")
        .json(&json!({ "model": params.model, "input": text_input }))
        .send()
        .await
        .map_err(transport_error)?;
    let body = json_or_upstream(UPSTREAM, response).await?;

    let embeddings: Vec<Value> = body["data"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .map(|item| item["embedding"].clone())
                .collect()
        })
        .unwrap_or_default();
    Ok(json!({
        "embeddings": embeddings,
        "model": body["model"],
        "usage": body["usage"],
    }))
}

async fn stream_text(input: Value, ctx: ExecutionContext) -> Result<Value> {
    let params = openai_params(&input)?;
    let body = chat_body(&input, &params, true)?;

    let response = request(&ctx, &params, "/chat/completions")
        .json(&body)
        .send()
        .await
        .map_err(transport_error)?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.map_err(transport_error)?;
        return Err(upstream_error(UPSTREAM, status, body));
    }

    let mut text = String::new();
    let mut chunks: u64 = 0;
    let mut events = Box::pin(sse_stream(response));
    while let Some(event) = events.next().await {
        let event = event?;
        let Ok(delta) = serde_json::from_str::<Value>(&event.data) else {
            continue;
        };
        if let Some(piece) = delta["choices"][0]["delta"]["content"].as_str() {
            text.push_str(piece);
            chunks += 1;
        }
    }

    Ok(json!({ "text": text, "chunks": chunks }))
}

fn plugin_schema() -> ActionSchema {
    ActionSchema::object()
        .field(
            "action",
            FieldSpec::string()
                .describe("Operation to perform")
                .allowed(&["generate_text", "create_embedding", "stream_text"]),
        )
        .field("apiKey", FieldSpec::string().describe("API key"))
        .field("model", FieldSpec::string().describe("Model name"))
        .field(
            "organization",
            FieldSpec::string().describe("Organization id"),
        )
        .field(
            "baseUrl",
            FieldSpec::string().describe("Alternative API base URL"),
        )
        .field("prompt", FieldSpec::string().describe("User prompt"))
        .field(
            "systemPrompt",
            FieldSpec::string().describe("System prompt"),
        )
        .field(
            "temperature",
            FieldSpec::number()
                .describe("Sampling temperature")
                .default_value(DEFAULT_TEMPERATURE),
        )
        .field("maxTokens", FieldSpec::number().describe("Response token cap"))
        .field("topP", FieldSpec::number().describe("Nucleus sampling cutoff"))
        .field(
            "input",
            FieldSpec::string()
                .describe("Text to embed")
                .hide_unless("action", "create_embedding"),
        )
        .require(&["apiKey", "model"])
}

pub fn plugin() -> Result<PluginDescriptor> {
    Ok(PluginDescriptor::new(PLUGIN_ID, "OpenAI")?
        .with_description("Generate text and embeddings with OpenAI models")
        .with_groups(&["ai"])
        .with_tags(&["openai", "llm", "embeddings"])
        .with_input_schema(plugin_schema())
        .with_example_input(json!({
            "action": "generate_text",
            "apiKey": "sk-...",
            "model": "gpt-4o-mini",
            "prompt": "Write a haiku about rivers"
        }))
        .with_example_output(json!({
            "text": "Silver water runs...",
            "model": "gpt-4o-mini",
            "usage": { "prompt_tokens": 12, "completion_tokens": 17 }
        }))
        .with_action(
            Action::new("generate_text", handler_fn(generate_text))?
                .with_description("Single chat completion")
                .with_input_schema(ActionSchema::object().require(&["prompt"])),
        )
        .with_action(
            Action::new("create_embedding", handler_fn(create_embedding))?
                .with_description("Embed text input")
                .with_input_schema(ActionSchema::object().require(&["input"])),
        )
        .with_action(
            Action::new("stream_text", handler_fn(stream_text))?
                .with_description("Streamed chat completion, accumulated server-side")
                .with_input_schema(ActionSchema::object().require(&["prompt"])),
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn chat_body_maps_camel_case_tuning_fields() {
        let params = OpenAiParams {
            api_key: "k".into(),
            model: "gpt-4o-mini".into(),
            organization: None,
            base_url: None,
        };
        let body = chat_body(
            &json!({
                "prompt": "hi",
                "systemPrompt": "be brief",
                "maxTokens": 64,
                "topP": 0.9
            }),
            &params,
            true,
        )
        .unwrap();
        assert_eq!(body["max_tokens"], 64);
        assert_eq!(body["top_p"], 0.9);
        assert_eq!(body["temperature"], DEFAULT_TEMPERATURE);
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
    }

    #[test]
    fn chat_body_requires_prompt() {
        let params = OpenAiParams {
            api_key: "k".into(),
            model: "m".into(),
            organization: None,
            base_url: None,
        };
        let err = chat_body(&json!({}), &params, false).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
