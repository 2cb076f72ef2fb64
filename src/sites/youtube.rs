use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use color_eyre::eyre::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tokio::time;

use crate::errors::ChatError;
use crate::models::ChatItem;
use crate::params::{ChatType, DownloadParams};
use crate::remap::{remap, RemapEntry, RemapTable, TransformTable};
use crate::session::{Session, SessionConfig};
use crate::sites::{deliver, reached_max, should_keep, ChatDownloader, SiteTest};
use crate::utils;

/// ====== YouTube 라이브 채팅 다운로더 ======

static VALID_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:https?://)?(?:www\.)?youtube\.com/watch\?v=([A-Za-z0-9_-]{11})")
        .expect("Invalid YouTube URL regex")
});

static TESTS: [SiteTest; 2] = [
    SiteTest {
        name: "live_chat",
        url: "https://www.youtube.com/watch?v=5qap5aO4i9A",
        max_messages: 10,
    },
    SiteTest {
        name: "top_chat",
        url: "https://www.youtube.com/watch?v=jfKfPfyJRdk",
        max_messages: 5,
    },
];

/// 채팅 renderer 필드 -> 공통 스키마
static REMAPPING: Lazy<RemapTable> = Lazy::new(|| {
    HashMap::from([
        ("id", RemapEntry::Direct("id")),
        ("authorExternalChannelId", RemapEntry::Direct("author_id")),
        ("authorName", RemapEntry::Apply("author_name", "simple_text")),
        ("message", RemapEntry::Apply("message", "runs_to_text")),
        ("timestampUsec", RemapEntry::Apply("timestamp", "usec_to_int")),
        ("timestampText", RemapEntry::Apply("time_text", "simple_text")),
        ("purchaseAmountText", RemapEntry::Apply("amount", "simple_text")),
        ("authorBadges", RemapEntry::Direct("author_badges")),
    ])
});

static TRANSFORMS: Lazy<TransformTable> = Lazy::new(|| {
    HashMap::from([
        ("simple_text", parse_text as fn(Value) -> Value),
        ("runs_to_text", parse_runs as fn(Value) -> Value),
        ("usec_to_int", parse_usec as fn(Value) -> Value),
    ])
});

/// `{"simpleText": ...}` 래퍼 또는 문자열을 평문으로 변환합니다.
fn parse_text(value: Value) -> Value {
    match &value {
        Value::Object(map) => map.get("simpleText").cloned().unwrap_or(value),
        _ => value,
    }
}

/// `{"runs": [{"text": ...}, {"emoji": ...}]}`를 이어 붙인 평문으로 변환합니다.
/// 이모지는 숏컷 표기(`:wave:`)로 대체합니다.
fn parse_runs(value: Value) -> Value {
    let Some(runs) = value.get("runs").and_then(|v| v.as_array()) else {
        return parse_text(value);
    };

    let mut text = String::new();
    for run in runs {
        if let Some(t) = run.get("text").and_then(|v| v.as_str()) {
            text.push_str(t);
        } else if let Some(shortcut) = run.pointer("/emoji/shortcuts/0").and_then(|v| v.as_str()) {
            text.push_str(shortcut);
        }
    }
    Value::String(text)
}

/// 마이크로초 문자열 타임스탬프를 정수로 변환합니다.
fn parse_usec(value: Value) -> Value {
    match &value {
        Value::String(s) => s.parse::<i64>().map(Value::from).unwrap_or(value),
        _ => value,
    }
}

/// 채팅 renderer 하나를 공통 스키마 아이템으로 정규화합니다.
fn parse_live_item(renderer: &Value, message_type: &str) -> Result<ChatItem, ChatError> {
    let Some(fields) = renderer.as_object() else {
        return Err(ChatError::Parsing(
            "chat renderer is not an object".to_string(),
        ));
    };

    let mut info = Map::new();
    for (key, value) in fields {
        remap(&mut info, &REMAPPING, &TRANSFORMS, key, value.clone());
    }

    // 금액만 있는 슈퍼챗은 본문이 없을 수 있음
    if !info.contains_key("message") {
        info.insert("message".to_string(), Value::String(String::new()));
    }
    info.insert(
        "message_type".to_string(),
        Value::String(message_type.to_string()),
    );

    ChatItem::from_map(info, true)
}

pub struct YouTubeChatDownloader {
    session: Session,
}

impl YouTubeChatDownloader {
    pub fn new(config: &SessionConfig) -> Result<Self, ChatError> {
        Ok(Self {
            session: Session::new(config)?,
        })
    }

    fn video_id(&self, url: &str) -> Result<String, ChatError> {
        VALID_URL
            .captures(url)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| ChatError::UnsupportedUrl(url.to_string()))
    }

    /// 일시적 실패는 max_attempts까지 재시도하며 JSON을 가져옵니다.
    async fn fetch_with_retry(&self, url: &str, max_attempts: u32) -> Result<Value> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.session.get_json::<Value>(url).await {
                Ok(value) => return Ok(value),
                Err(e @ ChatError::Http(_)) if attempt < max_attempts => {
                    utils::log(format!(
                        "Request failed (attempt {}/{}): {}",
                        attempt, max_attempts, e
                    ));
                    time::sleep(Duration::from_secs(1)).await;
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to fetch chat data: {}", url))
                }
            }
        }
    }
}

#[async_trait]
impl ChatDownloader for YouTubeChatDownloader {
    fn name(&self) -> &'static str {
        "youtube"
    }

    fn valid_url(&self) -> &Regex {
        &VALID_URL
    }

    fn tests(&self) -> &'static [SiteTest] {
        &TESTS
    }

    async fn get_chat_messages(&self, params: &mut DownloadParams) -> Result<()> {
        params.fill_defaults();

        let video_id = self.video_id(&params.url)?;
        let chat_type = params.chat_type.unwrap_or_default();
        let max_attempts = params.max_attempts.unwrap_or(30);
        let receive_timeout =
            Duration::from_secs_f64(params.message_receive_timeout.unwrap_or(0.1));

        let mut continuation: Option<String> = None;
        let mut last_message_at = Instant::now();

        loop {
            if reached_max(params) {
                break;
            }

            let url = match &continuation {
                Some(token) => format!(
                    "https://www.youtube.com/live_chat/get_live_chat?continuation={}&pbj=1",
                    token
                ),
                None => {
                    let filter = match chat_type {
                        ChatType::Live => "all",
                        ChatType::Top => "top",
                    };
                    format!(
                        "https://www.youtube.com/live_chat?v={}&filter={}&pbj=1",
                        video_id, filter
                    )
                }
            };

            let response = self.fetch_with_retry(&url, max_attempts).await?;

            // 채팅이 닫혔거나 스트림이 끝나면 continuationContents가 사라짐
            let Some(chat) = response.pointer("/continuationContents/liveChatContinuation") else {
                utils::log(format!("Chat closed for video {}, stopping.", video_id));
                break;
            };

            let actions = chat
                .pointer("/actions")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();

            for action in &actions {
                let item_value = action.pointer("/addChatItemAction/item");
                let (renderer, message_type) = if let Some(r) =
                    item_value.and_then(|v| v.pointer("/liveChatTextMessageRenderer"))
                {
                    (r, "messages")
                } else if let Some(r) =
                    item_value.and_then(|v| v.pointer("/liveChatPaidMessageRenderer"))
                {
                    (r, "superchat")
                } else {
                    continue;
                };

                let item = parse_live_item(renderer, message_type)?;
                if !should_keep(&item, params) {
                    continue;
                }

                deliver(params, item)?;
                last_message_at = Instant::now();

                if reached_max(params) {
                    break;
                }
            }

            continuation = chat
                .pointer("/continuations/0/timedContinuationData/continuation")
                .or_else(|| chat.pointer("/continuations/0/invalidationContinuationData/continuation"))
                .and_then(|v| v.as_str())
                .map(str::to_string);

            if continuation.is_none() {
                break;
            }

            if let Some(timeout) = params.timeout {
                if last_message_at.elapsed().as_secs_f64() >= timeout {
                    utils::log(format!(
                        "No new messages for {} seconds, stopping.",
                        timeout
                    ));
                    break;
                }
            }

            time::sleep(receive_timeout).await;
        }

        Ok(())
    }
}
