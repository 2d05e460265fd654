//! Request body normalization.
//!
//! # Responsibilities
//! - Strip `thinking` / `redacted_thinking` blocks from messages and system
//! - Rewrite the model identifier for upstreams with a model override
//!
//! # Design Decisions
//! - Pure functions over bytes; no shared state is touched
//! - Best effort: a body that is not a JSON object passes through untouched
//! - An unchanged body is returned as the original bytes, not re-serialized

use axum::body::Bytes;
use serde_json::{Map, Value};

use crate::upstream::UpstreamConfig;

/// Content block kinds that carry provider-signed reasoning traces.
const THINKING_KINDS: [&str; 2] = ["thinking", "redacted_thinking"];

/// Field recording the caller's model when it is overwritten.
pub const ORIGINAL_MODEL_FIELD: &str = "_original_model";

/// Produce the body to send to `upstream`.
pub fn transform_body(body: &Bytes, upstream: &UpstreamConfig) -> Bytes {
    let Ok(Value::Object(mut root)) = serde_json::from_slice::<Value>(body) else {
        return body.clone();
    };

    let mut changed = strip_thinking_blocks(&mut root);
    if let Some(model) = &upstream.model_override {
        changed |= rewrite_model(&mut root, model);
    }

    if !changed {
        return body.clone();
    }

    match serde_json::to_vec(&Value::Object(root)) {
        Ok(encoded) => Bytes::from(encoded),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to re-encode transformed body, sending original");
            body.clone()
        }
    }
}

/// Remove thinking blocks from `messages[*].content` and `system`.
///
/// Returns true if anything was removed.
pub fn strip_thinking_blocks(root: &mut Map<String, Value>) -> bool {
    let mut changed = false;

    if let Some(Value::Array(messages)) = root.get_mut("messages") {
        for message in messages.iter_mut() {
            if let Some(Value::Array(content)) = message
                .as_object_mut()
                .and_then(|m| m.get_mut("content"))
            {
                changed |= retain_non_thinking(content);
            }
        }
    }

    if let Some(Value::Array(system)) = root.get_mut("system") {
        changed |= retain_non_thinking(system);
    }

    changed
}

fn retain_non_thinking(blocks: &mut Vec<Value>) -> bool {
    let before = blocks.len();
    blocks.retain(|block| !is_thinking_block(block));
    blocks.len() != before
}

fn is_thinking_block(block: &Value) -> bool {
    block
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(|kind| THINKING_KINDS.contains(&kind))
}

/// Move the caller's model to [`ORIGINAL_MODEL_FIELD`] and substitute `model`.
///
/// No-op (returns false) when the body has no usable model field.
pub fn rewrite_model(root: &mut Map<String, Value>, model: &str) -> bool {
    let original = match root.get("model") {
        Some(Value::Null) | None => return false,
        Some(Value::String(s)) if s.is_empty() => return false,
        Some(value) => value.clone(),
    };

    root.insert(ORIGINAL_MODEL_FIELD.to_string(), original);
    root.insert("model".to_string(), Value::String(model.to_string()));
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackupConfig, PrimaryConfig};
    use serde_json::json;

    fn primary() -> UpstreamConfig {
        UpstreamConfig::primary(&PrimaryConfig {
            oauth_token: "t".into(),
            ..PrimaryConfig::default()
        })
        .unwrap()
    }

    fn backup() -> UpstreamConfig {
        UpstreamConfig::backup(&BackupConfig {
            api_key: "k".into(),
            model: "backup-model".into(),
            ..BackupConfig::default()
        })
        .unwrap()
        .unwrap()
    }

    fn parse(bytes: &Bytes) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[test]
    fn strips_thinking_and_keeps_order() {
        let body = Bytes::from(
            json!({
                "model": "claude-x",
                "messages": [
                    {"role": "user", "content": "plain string content"},
                    {"role": "assistant", "content": [
                        {"type": "thinking", "thinking": "hmm", "signature": "sig"},
                        {"type": "text", "text": "first"},
                        {"type": "redacted_thinking", "data": "xx"},
                        {"type": "tool_use", "id": "t1", "name": "f", "input": {}},
                        {"type": "text", "text": "last"}
                    ]}
                ],
                "system": [
                    {"type": "text", "text": "be brief"},
                    {"type": "thinking", "thinking": "sys"}
                ]
            })
            .to_string(),
        );

        let out = parse(&transform_body(&body, &primary()));
        assert_eq!(out["messages"][0]["content"], "plain string content");
        assert_eq!(
            out["messages"][1]["content"],
            json!([
                {"type": "text", "text": "first"},
                {"type": "tool_use", "id": "t1", "name": "f", "input": {}},
                {"type": "text", "text": "last"}
            ])
        );
        assert_eq!(out["system"], json!([{"type": "text", "text": "be brief"}]));
        assert_eq!(out["model"], "claude-x");
    }

    #[test]
    fn malformed_body_is_identity() {
        let samples: [&[u8]; 5] = [b"{not json", b"", b"[1,2,3]", b"\"string\"", b"\xff\xfe"];
        for raw in samples {
            let body = Bytes::copy_from_slice(raw);
            assert_eq!(transform_body(&body, &backup()), body);
        }
    }

    #[test]
    fn untouched_body_keeps_exact_bytes() {
        let body = Bytes::from_static(b"{ \"model\" : \"claude-x\",  \"messages\": [] }");
        assert_eq!(transform_body(&body, &primary()), body);
    }

    #[test]
    fn backup_rewrites_model() {
        let body = Bytes::from(json!({"model": "claude-x", "max_tokens": 10}).to_string());
        let out = parse(&transform_body(&body, &backup()));
        assert_eq!(out["model"], "backup-model");
        assert_eq!(out[ORIGINAL_MODEL_FIELD], "claude-x");
        assert_eq!(out["max_tokens"], 10);
    }

    #[test]
    fn missing_model_is_not_rewritten() {
        let body = Bytes::from(json!({"messages": []}).to_string());
        let out = transform_body(&body, &backup());
        assert_eq!(out, body);
    }

    #[test]
    fn non_object_blocks_survive() {
        let mut root = json!({
            "messages": [
                null,
                {"role": "user", "content": [1, "two", null, {"type": "thinking"}]}
            ]
        });
        let changed = strip_thinking_blocks(root.as_object_mut().unwrap());
        assert!(changed);
        assert_eq!(root["messages"][0], Value::Null);
        assert_eq!(root["messages"][1]["content"], json!([1, "two", null]));
    }
}
