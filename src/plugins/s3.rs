//! S3-compatible object storage plugin.
//!
//! Talks the S3 REST API directly with AWS Signature Version 4 request
//! signing, so it works against AWS and any S3-compatible endpoint (MinIO,
//! R2) via the optional `endpoint` input.

use base64::Engine as _;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::context::ExecutionContext;
use crate::descriptor::{handler_fn, Action, PluginDescriptor};
use crate::errors::{Error, Result, ValidationError};
use crate::http::{transport_error, upstream_error};
use crate::schema::{ActionSchema, FieldSpec};

pub const PLUGIN_ID: &str = "s3-storage";
const UPSTREAM: &str = "S3 Storage";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct S3Params {
    access_key_id: String,
    secret_access_key: String,
    region: String,
    bucket: String,
    #[serde(default)]
    endpoint: Option<String>,
}

fn s3_params(input: &Value) -> Result<S3Params> {
    serde_json::from_value(input.clone()).map_err(Error::Serialization)
}

/// Virtual-hosted-style AWS URL for a bucket.
fn aws_base_url(bucket: &str, region: &str) -> String {
    format!("https://{bucket}.s3.{region}.amazonaws.com")
}

/// Base URL requests are actually sent to: a test override wins, then the
/// caller's custom endpoint, then AWS.
fn request_base(ctx: &ExecutionContext, params: &S3Params) -> String {
    if let Some(base) = ctx.base_override(PLUGIN_ID) {
        return base.to_string();
    }
    match &params.endpoint {
        Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
        None => aws_base_url(&params.bucket, &params.region),
    }
}

/// Base URL reported back to the caller in object URLs. Never the test
/// override.
fn public_base(params: &S3Params) -> String {
    match &params.endpoint {
        Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
        None => aws_base_url(&params.bucket, &params.region),
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn sha256_hex(data: &[u8]) -> String {
    hex(&Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    // HMAC-SHA256 accepts keys of any length.
    let mut mac = HmacSha256::new_from_slice(key).unwrap_or_else(|_| unreachable!());
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// RFC 3986 encoding as SigV4 requires it. Path segments keep `/` literal;
/// query components encode it.
fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

struct SigningInput<'a> {
    method: &'a str,
    path: &'a str,
    /// `key=value` pairs, unencoded; sorted during canonicalization.
    query: &'a [(String, String)],
    /// Lowercase header names with values to sign. `x-amz-date` is added
    /// automatically from `timestamp`.
    headers: &'a [(String, String)],
    payload_hash: &'a str,
    timestamp: DateTime<Utc>,
    region: &'a str,
    service: &'a str,
    access_key_id: &'a str,
    secret_access_key: &'a str,
}

struct SignedHeaders {
    amz_date: String,
    authorization: String,
}

/// Compute the SigV4 authorization header over the given header set.
fn sign_v4(input: &SigningInput<'_>) -> SignedHeaders {
    let amz_date = input.timestamp.format("%Y%m%dT%H%M%SZ").to_string();
    let date_stamp = input.timestamp.format("%Y%m%d").to_string();

    let mut query_pairs: Vec<(String, String)> = input
        .query
        .iter()
        .map(|(k, v)| (uri_encode(k, true), uri_encode(v, true)))
        .collect();
    query_pairs.sort();
    let canonical_query = query_pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut headers: Vec<(String, String)> = input.headers.to_vec();
    headers.push(("x-amz-date".to_string(), amz_date.clone()));
    headers.sort();
    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect();
    let signed_headers = headers
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        input.method,
        uri_encode(input.path, false),
        canonical_query,
        canonical_headers,
        signed_headers,
        input.payload_hash
    );

    let scope = format!(
        "{}/{}/{}/aws4_request",
        date_stamp, input.region, input.service
    );
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date,
        scope,
        sha256_hex(canonical_request.as_bytes())
    );

    let k_date = hmac_sha256(
        format!("AWS4{}", input.secret_access_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, input.region.as_bytes());
    let k_service = hmac_sha256(&k_region, input.service.as_bytes());
    let k_signing = hmac_sha256(&k_service, b"aws4_request");
    let signature = hex(&hmac_sha256(&k_signing, string_to_sign.as_bytes()));

    let authorization = format!(
        "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
        input.access_key_id, scope, signed_headers, signature
    );

    SignedHeaders {
        amz_date,
        authorization,
    }
}

fn host_of(url: &str) -> Result<String> {
    let parsed: reqwest::Url = url
        .parse()
        .map_err(|_| ValidationError::new(format!("invalid endpoint URL: '{url}'")))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| ValidationError::new(format!("invalid endpoint URL: '{url}'")))?;
    Ok(match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Whether the base URL already addresses the bucket (virtual-hosted style)
/// or needs the bucket as the first path segment (custom endpoints).
fn object_path(params: &S3Params, base: &str, key: &str) -> String {
    let virtual_hosted = base == aws_base_url(&params.bucket, &params.region);
    if virtual_hosted {
        format!("/{key}")
    } else {
        format!("/{}/{}", params.bucket, key)
    }
}

#[allow(clippy::too_many_arguments)]
async fn signed_request(
    ctx: &ExecutionContext,
    params: &S3Params,
    method: reqwest::Method,
    path: &str,
    query: &[(String, String)],
    body: Vec<u8>,
    content_type: Option<&str>,
) -> Result<reqwest::Response> {
    let base = request_base(ctx, params);
    let host = host_of(&base)?;
    let payload_hash = sha256_hex(&body);

    let signing_headers = [
        ("host".to_string(), host.clone()),
        ("x-amz-content-sha256".to_string(), payload_hash.clone()),
    ];
    let signed = sign_v4(&SigningInput {
        method: method.as_str(),
        path,
        query,
        headers: &signing_headers,
        payload_hash: &payload_hash,
        timestamp: Utc::now(),
        region: &params.region,
        service: "s3",
        access_key_id: &params.access_key_id,
        secret_access_key: &params.secret_access_key,
    });

    let mut url = format!("{base}{}", uri_encode(path, false));
    if !query.is_empty() {
        let mut pairs: Vec<(String, String)> = query
            .iter()
            .map(|(k, v)| (uri_encode(k, true), uri_encode(v, true)))
            .collect();
        pairs.sort();
        let rendered = pairs
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        url.push('?');
        url.push_str(&rendered);
    }

    let mut builder = ctx
        .http()
        .request(method, url)
        .header("x-amz-date", signed.amz_date)
        .header("x-amz-content-sha256", payload_hash)
        .header(reqwest::header::AUTHORIZATION, signed.authorization);
    if let Some(content_type) = content_type {
        builder = builder.header(reqwest::header::CONTENT_TYPE, content_type);
    }
    if !body.is_empty() {
        builder = builder.body(body);
    }
    builder.send().await.map_err(transport_error)
}

async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.map_err(transport_error)?;
    Err(upstream_error(UPSTREAM, status, body))
}

async fn upload_file(input: Value, ctx: ExecutionContext) -> Result<Value> {
    let params = s3_params(&input)?;
    let file_name = input
        .get("fileName")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ValidationError::new("is required").with_field("fileName"))?;
    let file_data = input
        .get("fileData")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ValidationError::new("is required").with_field("fileData"))?;
    let content_type = input
        .get("contentType")
        .and_then(|v| v.as_str())
        .unwrap_or("application/octet-stream");

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(file_data)
        .map_err(|_| {
            Error::Validation(
                ValidationError::new("must be valid base64").with_field("fileData"),
            )
        })?;

    let base = request_base(&ctx, &params);
    let path = object_path(&params, &base, file_name);
    let response = signed_request(
        &ctx,
        &params,
        reqwest::Method::PUT,
        &path,
        &[],
        bytes,
        Some(content_type),
    )
    .await?;
    let response = error_for_status(response).await?;

    let etag = response
        .headers()
        .get(reqwest::header::ETAG)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_matches('"').to_string());

    let public = public_base(&params);
    let public_path = object_path(&params, &public, file_name);
    Ok(json!({
        "key": file_name,
        "etag": etag,
        "url": format!("{public}{public_path}"),
    }))
}

async fn read_file(input: Value, ctx: ExecutionContext) -> Result<Value> {
    let params = s3_params(&input)?;
    let key = input
        .get("key")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ValidationError::new("is required").with_field("key"))?;

    let base = request_base(&ctx, &params);
    let path = object_path(&params, &base, key);
    let response = signed_request(
        &ctx,
        &params,
        reqwest::Method::GET,
        &path,
        &[],
        Vec::new(),
        None,
    )
    .await?;
    let response = error_for_status(response).await?;

    let header = |name: reqwest::header::HeaderName| {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string())
    };
    let content_type = header(reqwest::header::CONTENT_TYPE);
    let last_modified = header(reqwest::header::LAST_MODIFIED);
    let etag = header(reqwest::header::ETAG).map(|v| v.trim_matches('"').to_string());

    let bytes = response.bytes().await.map_err(transport_error)?;
    Ok(json!({
        "key": key,
        "contentType": content_type,
        "contentLength": bytes.len(),
        "lastModified": last_modified,
        "etag": etag,
        "fileData": base64::engine::general_purpose::STANDARD.encode(&bytes),
    }))
}

/// `ListBucketResult` as returned by ListObjectsV2.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListBucketResult {
    #[serde(default)]
    contents: Vec<ObjectEntry>,
    #[serde(default)]
    is_truncated: bool,
    #[serde(default)]
    next_continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ObjectEntry {
    key: String,
    #[serde(default)]
    last_modified: Option<String>,
    #[serde(rename = "ETag", default)]
    e_tag: Option<String>,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    storage_class: Option<String>,
}

async fn list_files(input: Value, ctx: ExecutionContext) -> Result<Value> {
    let params = s3_params(&input)?;

    let mut query: Vec<(String, String)> = vec![("list-type".into(), "2".into())];
    if let Some(prefix) = input.get("prefix").and_then(|v| v.as_str()) {
        query.push(("prefix".into(), prefix.to_string()));
    }
    if let Some(max_keys) = input.get("maxKeys").and_then(|v| v.as_u64()) {
        query.push(("max-keys".into(), max_keys.to_string()));
    }
    if let Some(token) = input.get("continuationToken").and_then(|v| v.as_str()) {
        query.push(("continuation-token".into(), token.to_string()));
    }

    let base = request_base(&ctx, &params);
    let path = if base == aws_base_url(&params.bucket, &params.region) {
        "/".to_string()
    } else {
        format!("/{}", params.bucket)
    };
    let response = signed_request(
        &ctx,
        &params,
        reqwest::Method::GET,
        &path,
        &query,
        Vec::new(),
        None,
    )
    .await?;
    let response = error_for_status(response).await?;

    let body = response.text().await.map_err(transport_error)?;
    let listing: ListBucketResult = quick_xml::de::from_str(&body).map_err(xml_error)?;

    let files: Vec<Value> = listing
        .contents
        .into_iter()
        .map(|entry| {
            json!({
                "key": entry.key,
                "lastModified": entry.last_modified,
                "etag": entry.e_tag.map(|v| v.trim_matches('"').to_string()),
                "size": entry.size,
                "storageClass": entry.storage_class,
            })
        })
        .collect();

    Ok(json!({
        "files": files,
        "isTruncated": listing.is_truncated,
        "nextContinuationToken": listing.next_continuation_token,
    }))
}

fn xml_error(err: quick_xml::DeError) -> Error {
    crate::errors::UpstreamError::new(UPSTREAM, format!("unexpected list response: {err}")).into()
}

fn plugin_schema() -> ActionSchema {
    ActionSchema::object()
        .field(
            "action",
            FieldSpec::string()
                .describe("Operation to perform")
                .allowed(&["upload_file", "read_file", "list_files"]),
        )
        .field("accessKeyId", FieldSpec::string().describe("Access key id"))
        .field(
            "secretAccessKey",
            FieldSpec::string().describe("Secret access key"),
        )
        .field("region", FieldSpec::string().describe("Bucket region"))
        .field("bucket", FieldSpec::string().describe("Bucket name"))
        .field(
            "endpoint",
            FieldSpec::string().describe("Custom S3-compatible endpoint URL"),
        )
        .field(
            "fileName",
            FieldSpec::string()
                .describe("Object key to write")
                .hide_unless("action", "upload_file"),
        )
        .field(
            "fileData",
            FieldSpec::string()
                .describe("Base64-encoded file contents")
                .hide_unless("action", "upload_file"),
        )
        .field(
            "contentType",
            FieldSpec::string()
                .describe("MIME type of the uploaded object")
                .hide_unless("action", "upload_file"),
        )
        .field(
            "key",
            FieldSpec::string()
                .describe("Object key to read")
                .hide_unless("action", "read_file"),
        )
        .field(
            "prefix",
            FieldSpec::string()
                .describe("Key prefix filter")
                .hide_unless("action", "list_files"),
        )
        .field(
            "maxKeys",
            FieldSpec::number()
                .describe("Page size")
                .hide_unless("action", "list_files"),
        )
        .field(
            "continuationToken",
            FieldSpec::string()
                .describe("Continuation token from a previous page")
                .hide_unless("action", "list_files"),
        )
        .require(&["accessKeyId", "secretAccessKey", "region", "bucket"])
}

pub fn plugin() -> Result<PluginDescriptor> {
    Ok(PluginDescriptor::new(PLUGIN_ID, "S3 Storage")?
        .with_description("Store and retrieve objects in S3-compatible storage")
        .with_groups(&["storage"])
        .with_tags(&["s3", "aws", "storage", "files"])
        .with_input_schema(plugin_schema())
        .with_example_input(json!({
            "action": "upload_file",
            "accessKeyId": "AKIA...",
            "secretAccessKey": "...",
            "region": "us-east-1",
            "bucket": "my-bucket",
            "fileName": "hello.txt",
            "fileData": "aGVsbG8=",
            "contentType": "text/plain"
        }))
        .with_example_output(json!({
            "key": "hello.txt",
            "etag": "5d41402abc4b2a76b9719d911017c592",
            "url": "https://my-bucket.s3.us-east-1.amazonaws.com/hello.txt"
        }))
        .with_action(
            Action::new("upload_file", handler_fn(upload_file))?
                .with_description("Upload a base64-encoded object")
                .with_input_schema(ActionSchema::object().require(&["fileName", "fileData"])),
        )
        .with_action(
            Action::new("read_file", handler_fn(read_file))?
                .with_description("Download an object as base64")
                .with_input_schema(ActionSchema::object().require(&["key"])),
        )
        .with_action(
            Action::new("list_files", handler_fn(list_files))?
                .with_description("List objects with optional prefix and paging"),
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // Signature test vector from the AWS SigV4 documentation (the IAM
    // ListUsers example, which signs content-type, host, and x-amz-date).
    #[test]
    fn sigv4_matches_aws_reference_vector() {
        let timestamp = Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap();
        let signed = sign_v4(&SigningInput {
            method: "GET",
            path: "/",
            query: &[
                ("Action".to_string(), "ListUsers".to_string()),
                ("Version".to_string(), "2010-05-08".to_string()),
            ],
            headers: &[
                (
                    "content-type".to_string(),
                    "application/x-www-form-urlencoded; charset=utf-8".to_string(),
                ),
                ("host".to_string(), "iam.amazonaws.com".to_string()),
            ],
            payload_hash: &sha256_hex(b""),
            timestamp,
            region: "us-east-1",
            service: "iam",
            access_key_id: "AKIDEXAMPLE",
            secret_access_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
        });
        assert_eq!(signed.amz_date, "20150830T123600Z");
        assert!(signed
            .authorization
            .contains("SignedHeaders=content-type;host;x-amz-date"));
        assert!(signed.authorization.ends_with(
            "Signature=5d672d79c15b13162d9279b0855cfba6789a8edb4c82c400e06b5924a6f2b5d7"
        ));
        assert!(signed
            .authorization
            .contains("Credential=AKIDEXAMPLE/20150830/us-east-1/iam/aws4_request"));
    }

    #[test]
    fn sigv4_signs_the_s3_header_set_sorted() {
        let timestamp = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let payload_hash = sha256_hex(b"hello");
        let signed = sign_v4(&SigningInput {
            method: "PUT",
            path: "/hello.txt",
            query: &[],
            headers: &[
                (
                    "host".to_string(),
                    "test-bucket.s3.us-east-1.amazonaws.com".to_string(),
                ),
                ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ],
            payload_hash: &payload_hash,
            timestamp,
            region: "us-east-1",
            service: "s3",
            access_key_id: "AKIDEXAMPLE",
            secret_access_key: "wJalrXUtnFEMI/K7MDENG/bPxRfiCYEXAMPLEKEY",
        });
        assert!(signed
            .authorization
            .contains("SignedHeaders=host;x-amz-content-sha256;x-amz-date"));
        assert!(signed
            .authorization
            .contains("Credential=AKIDEXAMPLE/20250101/us-east-1/s3/aws4_request"));
    }

    #[test]
    fn uri_encode_keeps_path_slashes() {
        assert_eq!(uri_encode("/a b/c", false), "/a%20b/c");
        assert_eq!(uri_encode("a/b&c", true), "a%2Fb%26c");
        assert_eq!(uri_encode("safe-._~", true), "safe-._~");
    }

    #[test]
    fn object_url_uses_virtual_hosted_style_without_endpoint() {
        let params = S3Params {
            access_key_id: "k".into(),
            secret_access_key: "s".into(),
            region: "us-east-1".into(),
            bucket: "test-bucket".into(),
            endpoint: None,
        };
        let base = public_base(&params);
        assert_eq!(base, "https://test-bucket.s3.us-east-1.amazonaws.com");
        assert_eq!(object_path(&params, &base, "hello.txt"), "/hello.txt");
    }

    #[test]
    fn custom_endpoint_prefixes_bucket_in_path() {
        let params = S3Params {
            access_key_id: "k".into(),
            secret_access_key: "s".into(),
            region: "us-east-1".into(),
            bucket: "test-bucket".into(),
            endpoint: Some("http://localhost:9000/".into()),
        };
        let base = public_base(&params);
        assert_eq!(base, "http://localhost:9000");
        assert_eq!(
            object_path(&params, &base, "hello.txt"),
            "/test-bucket/hello.txt"
        );
    }

    #[test]
    fn list_response_parses_aws_xml() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>test-bucket</Name>
  <IsTruncated>true</IsTruncated>
  <NextContinuationToken>token123</NextContinuationToken>
  <Contents>
    <Key>hello.txt</Key>
    <LastModified>2024-01-01T00:00:00.000Z</LastModified>
    <ETag>"abc123"</ETag>
    <Size>5</Size>
    <StorageClass>STANDARD</StorageClass>
  </Contents>
</ListBucketResult>"#;
        let listing: ListBucketResult = quick_xml::de::from_str(xml).unwrap();
        assert!(listing.is_truncated);
        assert_eq!(listing.next_continuation_token.as_deref(), Some("token123"));
        assert_eq!(listing.contents.len(), 1);
        assert_eq!(listing.contents[0].key, "hello.txt");
        assert_eq!(listing.contents[0].size, 5);
    }
}
