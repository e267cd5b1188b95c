//! Minimal HTTP/1.1 front end
//!
//! One request per connection: read until the headers and the declared body
//! have arrived (or the read timeout fires), route, answer with JSON and close.

use crate::api::{
    ErrorResponse, FieldPromptsRequest, FinalizeRequest, QueryRequest, SchemaResponse,
    StatusResponse,
};
use crate::assistant::Assistant;
use crate::error::{AssistantError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, error, warn};

const READ_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_REQUEST_BYTES: usize = 1_000_000;

pub async fn handle_connection(assistant: Arc<Assistant>, mut stream: TcpStream) {
    let mut buffer = Vec::new();
    let mut temp_buf = [0; 8192];

    let read_result = timeout(READ_TIMEOUT, async {
        loop {
            match stream.read(&mut temp_buf).await {
                Ok(0) => break,
                Ok(n) => {
                    buffer.extend_from_slice(&temp_buf[..n]);
                    if request_complete(&buffer) || buffer.len() > MAX_REQUEST_BYTES {
                        break;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    })
    .await;

    match read_result {
        Err(_) => {
            warn!("Request read timeout");
            return;
        }
        Ok(Err(e)) => {
            warn!("Failed to read from stream: {}", e);
            return;
        }
        Ok(Ok(())) => {}
    }

    if buffer.is_empty() {
        return;
    }

    let response = match String::from_utf8(buffer) {
        Ok(request) => handle_request(&assistant, &request).await,
        Err(_) => error_response(&AssistantError::InvalidRequest(
            "Request is not valid UTF-8".to_string(),
        )),
    };

    if let Err(e) = stream.write_all(response.as_bytes()).await {
        warn!("Failed to write response: {}", e);
    }
}

/// Headers received and, if a `Content-Length` is declared, the whole body too.
fn request_complete(buffer: &[u8]) -> bool {
    let Some(headers_end) = buffer.windows(4).position(|w| w == b"\r\n\r\n") else {
        return false;
    };
    let head = String::from_utf8_lossy(&buffer[..headers_end]);
    let content_length = extract_content_length(&head).unwrap_or(0);
    buffer.len() >= headers_end + 4 + content_length
}

fn extract_content_length(request: &str) -> Option<usize> {
    request.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name.trim().eq_ignore_ascii_case("content-length") {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}

pub async fn handle_request(assistant: &Assistant, request: &str) -> String {
    let lines: Vec<&str> = request.lines().collect();
    let Some(request_line) = lines.first() else {
        return create_response(400, "{}");
    };

    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() < 2 {
        return create_response(400, "{}");
    }

    let method = parts[0];
    let (path_str, query_string) = match parts[1].split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (parts[1], None),
    };
    let path = match path_str.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };
    debug!("Request: {} {}", method, path);

    let body = request
        .find("\r\n\r\n")
        .map(|i| request[i + 4..].trim())
        .unwrap_or("");

    if method == "OPTIONS" {
        return create_response(204, "");
    }

    match route(assistant, method, path, query_string, body).await {
        Ok(Some(json)) => create_response(200, &json),
        Ok(None) => create_response(
            404,
            &format!(
                r#"{{"status":"error","error":"NotFound","detail":"No route for {} {}"}}"#,
                method,
                path.replace('"', "")
            ),
        ),
        Err(e) => {
            error!("{} {} failed: {}", method, path, e);
            error_response(&e)
        }
    }
}

/// JSON body of the matched route, or `None` if nothing matches.
async fn route(
    assistant: &Assistant,
    method: &str,
    path: &str,
    query_string: Option<&str>,
    body: &str,
) -> Result<Option<String>> {
    let json = match (method, path) {
        ("GET", "/") => to_json(&StatusResponse {
            status: "ok",
            message: "SQL Generator API is running".to_string(),
        })?,
        ("GET", "/health") => to_json(&assistant.health_check().await?)?,
        ("GET", "/schema") => to_json(&SchemaResponse {
            status: "success",
            schema: assistant.fetch_schema().await?,
        })?,
        ("POST", "/query") => {
            let request: QueryRequest = parse_body(body)?;
            to_json(&assistant.handle_query(&request).await?)?
        }
        ("POST", "/field-prompts") => {
            let request: FieldPromptsRequest = parse_body(body)?;
            to_json(&assistant.next_field_prompt(&request).await?)?
        }
        ("POST", "/finalize") => {
            let conversation_id = finalize_target(query_string, body)?;
            to_json(&assistant.finalize_insert(&conversation_id).await?)?
        }
        _ => return Ok(None),
    };
    Ok(Some(json))
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T> {
    if body.is_empty() {
        return Err(AssistantError::InvalidRequest("JSON body required".to_string()));
    }
    serde_json::from_str(body)
        .map_err(|e| AssistantError::InvalidRequest(format!("Malformed request body: {}", e)))
}

/// `conversationId` from the query string, else from the JSON body.
fn finalize_target(query_string: Option<&str>, body: &str) -> Result<String> {
    let params = parse_query(query_string.unwrap_or(""));
    if let Some(id) = params
        .get("conversationId")
        .or_else(|| params.get("conversation_id"))
        .filter(|id| !id.is_empty())
    {
        return Ok(id.clone());
    }
    if body.is_empty() {
        return Err(AssistantError::InvalidRequest("conversationId is required".to_string()));
    }
    Ok(parse_body::<FinalizeRequest>(body)?.conversation_id)
}

fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            if key.is_empty() {
                None
            } else {
                Some((key.to_string(), value.to_string()))
            }
        })
        .collect()
}

fn error_response(err: &AssistantError) -> String {
    let body = serde_json::to_string(&ErrorResponse::from(err))
        .unwrap_or_else(|_| r#"{"status":"error","error":"InternalError"}"#.to_string());
    create_response(err.status_code(), &body)
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

pub fn create_response(status: u16, body: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: application/json\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
         Access-Control-Allow-Headers: Content-Type\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        status,
        status_text(status),
        body.len(),
        body
    )
}
