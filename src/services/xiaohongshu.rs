// src/services/xiaohongshu.rs

//! Xiaohongshu search via a hosted workflow API.
//!
//! There is no usable public search endpoint, so matching notes come
//! from a workflow run on a third-party platform: one streaming POST
//! carries every keyword, and the result arrives as a server-sent
//! event stream. `Message` events hold JSON whose `output` (or `data`)
//! list contains the records, each often JSON-encoded a second time.
//! `Interrupt` events are resumed until the stream runs dry.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{AppError, Result};
use crate::models::{Config, Platform, Post};
use crate::services::PlatformCrawler;
use crate::utils::http::create_client;
use crate::utils::time::now_stamp;

/// Safety bound on interrupt-resume rounds per run.
const MAX_RESUMES: usize = 10;

type Record = Map<String, Value>;

/// One parsed server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SseEvent {
    event: String,
    data: String,
}

#[derive(Debug, Default, Deserialize)]
struct MessagePayload {
    #[serde(default)]
    content: String,
    #[serde(default)]
    node_title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    error_code: i64,
    #[serde(default)]
    error_message: String,
}

#[derive(Debug, Deserialize)]
struct InterruptPayload {
    interrupt_data: InterruptData,
}

#[derive(Debug, Deserialize)]
struct InterruptData {
    event_id: String,
    #[serde(rename = "type")]
    kind: i64,
}

/// Crawler backed by the workflow API.
pub struct WorkflowCrawler {
    config: Arc<Config>,
    client: Client,
}

impl WorkflowCrawler {
    /// Create a new workflow crawler with the given configuration.
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let client = create_client(&config.crawler)?;
        Ok(Self { config, client })
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.xiaohongshu.api_base.trim_end_matches('/'),
            path
        )
    }

    /// Run the workflow once, following interrupts, and collect every
    /// record the event stream produces.
    async fn run_workflow(&self, keywords: &[String]) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        let mut interrupts = VecDeque::new();

        log::info!(
            "Starting workflow {} with {} keywords",
            self.config.xiaohongshu.workflow_id,
            keywords.len()
        );

        let body = serde_json::json!({
            "workflow_id": self.config.xiaohongshu.workflow_id,
            "parameters": { "input": keywords },
        });
        let response = self
            .client
            .post(self.endpoint("v1/workflow/stream_run"))
            .bearer_auth(self.config.xiaohongshu.api_token.trim())
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AppError::workflow(format!(
                "stream_run returned {}",
                response.status()
            )));
        }
        self.consume_stream(response, &mut records, &mut interrupts)
            .await?;

        let mut resumes = 0;
        while let Some(interrupt) = interrupts.pop_front() {
            resumes += 1;
            if resumes > MAX_RESUMES {
                log::warn!("Giving up after {MAX_RESUMES} interrupt resumes");
                break;
            }
            log::info!("Workflow interrupted, resuming event {}", interrupt.event_id);

            let body = serde_json::json!({
                "workflow_id": self.config.xiaohongshu.workflow_id,
                "event_id": interrupt.event_id,
                "resume_data": "hey",
                "interrupt_type": interrupt.kind,
            });
            let response = self
                .client
                .post(self.endpoint("v1/workflow/stream_resume"))
                .bearer_auth(self.config.xiaohongshu.api_token.trim())
                .json(&body)
                .send()
                .await?;
            if !response.status().is_success() {
                log::warn!("stream_resume returned {}", response.status());
                break;
            }
            self.consume_stream(response, &mut records, &mut interrupts)
                .await?;
        }

        Ok(records)
    }

    /// Drain one event stream into records and pending interrupts.
    async fn consume_stream(
        &self,
        response: Response,
        records: &mut Vec<Record>,
        interrupts: &mut VecDeque<InterruptData>,
    ) -> Result<()> {
        let mut stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = stream.next().await {
            buffer.extend_from_slice(&chunk?);
            for block in drain_blocks(&mut buffer) {
                if let Some(event) = parse_sse_block(&block) {
                    handle_event(event, records, interrupts);
                }
            }
        }

        // Streams are supposed to end on a blank line; tolerate ones
        // that don't.
        let tail = String::from_utf8_lossy(&buffer);
        if !tail.trim().is_empty() {
            if let Some(event) = parse_sse_block(&tail) {
                handle_event(event, records, interrupts);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PlatformCrawler for WorkflowCrawler {
    fn platform(&self) -> Platform {
        Platform::Xiaohongshu
    }

    async fn crawl(&self, keywords: &[String], seen: &HashSet<String>) -> Result<Vec<Post>> {
        let records = self.run_workflow(keywords).await?;
        log::info!("Workflow produced {} records", records.len());

        let scraped_at = now_stamp();
        let mut session = seen.clone();
        let mut out = Vec::new();
        let mut skipped = 0usize;

        for record in &records {
            match record_to_post(record, &scraped_at) {
                Some(post) => {
                    if session.insert(post.url.clone()) {
                        out.push(post);
                    }
                }
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            log::warn!("Skipped {skipped} workflow records without a note URL");
        }
        Ok(out)
    }
}

/// Split complete `\n\n`-terminated blocks off the front of the
/// buffer, leaving any partial block in place.
fn drain_blocks(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut blocks = Vec::new();
    loop {
        let Some(pos) = buffer.windows(2).position(|w| w == b"\n\n") else {
            break;
        };
        let block: Vec<u8> = buffer.drain(..pos + 2).collect();
        blocks.push(String::from_utf8_lossy(&block[..pos]).into_owned());
    }
    blocks
}

/// Parse one SSE block into an event. Lines other than `event:` and
/// `data:` (ids, comments) are ignored; multiple data lines join with
/// a newline.
fn parse_sse_block(block: &str) -> Option<SseEvent> {
    let mut event = String::new();
    let mut data_lines = Vec::new();

    for line in block.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(rest) = line.strip_prefix("event:") {
            event = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.trim_start().to_string());
        }
    }

    if event.is_empty() && data_lines.is_empty() {
        return None;
    }
    Some(SseEvent {
        event,
        data: data_lines.join("\n"),
    })
}

fn handle_event(event: SseEvent, records: &mut Vec<Record>, interrupts: &mut VecDeque<InterruptData>) {
    match event.event.to_lowercase().as_str() {
        "message" => {
            let payload: MessagePayload =
                serde_json::from_str(&event.data).unwrap_or_default();
            let fresh = records_from_content(&payload.content);
            if !fresh.is_empty() {
                log::info!(
                    "Captured {} records from [{}]",
                    fresh.len(),
                    payload.node_title.as_deref().unwrap_or("result node")
                );
                records.extend(fresh);
            }
        }
        "error" => match serde_json::from_str::<ErrorPayload>(&event.data) {
            Ok(payload) => log::error!(
                "Workflow error {}: {}",
                payload.error_code,
                payload.error_message
            ),
            Err(_) => log::error!("Workflow error event: {}", event.data),
        },
        "interrupt" => match serde_json::from_str::<InterruptPayload>(&event.data) {
            Ok(payload) => interrupts.push_back(payload.interrupt_data),
            Err(e) => log::warn!("Unparseable interrupt event: {e}"),
        },
        "done" | "finish" => log::debug!("Workflow stream finished"),
        other => log::debug!("Ignoring event '{other}'"),
    }
}

/// Pull the record list out of a Message content.
///
/// The content is JSON; its `output` (preferred) or `data` field is a
/// list whose items are objects, lists of objects, or JSON strings
/// encoding either.
fn records_from_content(content: &str) -> Vec<Record> {
    let Ok(value) = serde_json::from_str::<Value>(content) else {
        return Vec::new();
    };
    let list = match value.get("output").or_else(|| value.get("data")) {
        Some(Value::Array(items)) => items,
        _ => return Vec::new(),
    };

    let mut records = Vec::new();
    for item in list {
        match item {
            Value::String(s) => {
                if let Ok(inner) = serde_json::from_str::<Value>(s) {
                    push_records(&inner, &mut records);
                }
            }
            other => push_records(other, &mut records),
        }
    }
    records
}

fn push_records(value: &Value, out: &mut Vec<Record>) {
    match value {
        Value::Array(items) => {
            for item in items {
                if let Some(map) = item.as_object() {
                    out.push(map.clone());
                }
            }
        }
        Value::Object(map) => out.push(map.clone()),
        _ => {}
    }
}

/// First non-empty string among the given keys. Numbers are accepted
/// and stringified, since note ids sometimes arrive numeric.
fn first_string(record: &Record, keys: &[&str]) -> String {
    for key in keys {
        match record.get(*key) {
            Some(Value::String(s)) if !s.trim().is_empty() => return s.trim().to_string(),
            Some(Value::Number(n)) => return n.to_string(),
            _ => {}
        }
    }
    String::new()
}

/// Map a workflow record into a row. Records without a note URL have
/// nothing to dedup on and are dropped.
fn record_to_post(record: &Record, scraped_at: &str) -> Option<Post> {
    let url = first_string(record, &["url", "note_url", "link", "share_url"]);
    if url.is_empty() {
        return None;
    }

    Some(Post {
        author: first_string(record, &["author", "nickname", "user_name", "user"]),
        title: first_string(record, &["title", "note_title", "display_title"]),
        published_at: first_string(record, &["publish_time", "create_time", "time", "date"]),
        content: first_string(record, &["content", "desc", "description", "text"]),
        url,
        scraped_at: scraped_at.to_string(),
        ..Post::new(
            first_string(record, &["keyword", "query"]),
            "xiaohongshu",
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sse_block() {
        let event = parse_sse_block("id: 0\r\nevent: Message\r\ndata: {\"content\":\"{}\"}")
            .unwrap();
        assert_eq!(event.event, "Message");
        assert_eq!(event.data, "{\"content\":\"{}\"}");
    }

    #[test]
    fn test_parse_sse_block_empty() {
        assert_eq!(parse_sse_block("   \n"), None);
    }

    #[test]
    fn test_drain_blocks_keeps_partial() {
        let mut buffer = b"event: a\ndata: 1\n\nevent: b\ndata:".to_vec();
        let blocks = drain_blocks(&mut buffer);
        assert_eq!(blocks, vec!["event: a\ndata: 1".to_string()]);
        assert_eq!(buffer, b"event: b\ndata:".to_vec());
    }

    #[test]
    fn test_records_from_content_double_encoded() {
        // The inner list arrives as a JSON string, the way workflow
        // result nodes stringify their output.
        let content = r#"{"output": ["[{\"title\":\"笔记一\",\"note_url\":\"https://example.com/n/1\"}]"]}"#;
        let records = records_from_content(content);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["title"], "笔记一");
    }

    #[test]
    fn test_records_from_content_plain_objects() {
        let content = r#"{"data": [{"title": "直接对象"}, [{"title": "嵌套列表"}], 42]}"#;
        let records = records_from_content(content);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["title"], "直接对象");
        assert_eq!(records[1]["title"], "嵌套列表");
    }

    #[test]
    fn test_records_from_content_garbage() {
        assert!(records_from_content("not json").is_empty());
        assert!(records_from_content(r#"{"other": 1}"#).is_empty());
    }

    #[test]
    fn test_record_to_post() {
        let record: Record = serde_json::from_str(
            r#"{
                "note_url": "https://www.xiaohongshu.com/explore/abc",
                "nickname": "小红薯",
                "title": "测试笔记",
                "desc": "正文内容",
                "publish_time": "2026-03-01",
                "keyword": "张楠"
            }"#,
        )
        .unwrap();

        let post = record_to_post(&record, "2026-03-10 15:30:00").unwrap();
        assert_eq!(post.url, "https://www.xiaohongshu.com/explore/abc");
        assert_eq!(post.author, "小红薯");
        assert_eq!(post.title, "测试笔记");
        assert_eq!(post.content, "正文内容");
        assert_eq!(post.keyword, "张楠");
        assert_eq!(post.source, "xiaohongshu");
    }

    #[test]
    fn test_record_without_url_is_dropped() {
        let record: Record = serde_json::from_str(r#"{"title": "无链接"}"#).unwrap();
        assert!(record_to_post(&record, "now").is_none());
    }

    #[test]
    fn test_interrupt_payload_parse() {
        let payload: InterruptPayload = serde_json::from_str(
            r#"{"interrupt_data": {"event_id": "evt_1", "type": 2}, "node_title": "确认"}"#,
        )
        .unwrap();
        assert_eq!(payload.interrupt_data.event_id, "evt_1");
        assert_eq!(payload.interrupt_data.kind, 2);
    }
}
