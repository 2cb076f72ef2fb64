use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use color_eyre::eyre::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tokio::time;

use crate::errors::ChatError;
use crate::models::ChatItem;
use crate::params::DownloadParams;
use crate::remap::{remap, RemapEntry, RemapTable, TransformTable};
use crate::session::{Session, SessionConfig};
use crate::sites::{deliver, reached_max, should_keep, ChatDownloader, SiteTest};
use crate::utils;

/// ====== Twitch VOD 댓글 다운로더 ======

static VALID_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:https?://)?(?:www\.)?twitch\.tv/videos/(\d+)")
        .expect("Invalid Twitch URL regex")
});

static TESTS: [SiteTest; 1] = [SiteTest {
    name: "vod_comments",
    url: "https://www.twitch.tv/videos/449716115",
    max_messages: 10,
}];

/// 웹 플레이어가 쓰는 공개 Client-ID
const CLIENT_ID: &str = "kimne78kx3ncx6brgo4mv6wki5h1ko";

static REMAPPING: Lazy<RemapTable> = Lazy::new(|| {
    HashMap::from([
        ("_id", RemapEntry::Direct("id")),
        ("created_at", RemapEntry::Apply("timestamp", "rfc3339_to_usec")),
        ("content_offset_seconds", RemapEntry::Direct("time_in_seconds")),
    ])
});

static COMMENTER_REMAPPING: Lazy<RemapTable> = Lazy::new(|| {
    HashMap::from([
        ("_id", RemapEntry::Direct("author_id")),
        ("name", RemapEntry::Direct("author_name")),
        ("display_name", RemapEntry::Direct("author_display_name")),
    ])
});

static MESSAGE_REMAPPING: Lazy<RemapTable> = Lazy::new(|| {
    HashMap::from([
        ("body", RemapEntry::Direct("message")),
        ("user_badges", RemapEntry::Direct("author_badges")),
    ])
});

static TRANSFORMS: Lazy<TransformTable> =
    Lazy::new(|| HashMap::from([("rfc3339_to_usec", rfc3339_to_usec as fn(Value) -> Value)]));

/// RFC3339 타임스탬프를 epoch 마이크로초 정수로 변환합니다.
fn rfc3339_to_usec(value: Value) -> Value {
    match &value {
        Value::String(s) => chrono::DateTime::parse_from_rfc3339(s)
            .map(|dt| Value::from(dt.timestamp_micros()))
            .unwrap_or(value),
        _ => value,
    }
}

/// VOD 댓글 하나를 공통 스키마 아이템으로 정규화합니다.
/// commenter/message는 중첩 객체이므로 전용 테이블로 풀어서 리매핑합니다.
fn parse_comment(comment: &Value) -> Result<ChatItem, ChatError> {
    let Some(fields) = comment.as_object() else {
        return Err(ChatError::Parsing("comment is not an object".to_string()));
    };

    let mut info = Map::new();
    for (key, value) in fields {
        match key.as_str() {
            "commenter" => {
                if let Some(obj) = value.as_object() {
                    for (k, v) in obj {
                        remap(&mut info, &COMMENTER_REMAPPING, &TRANSFORMS, k, v.clone());
                    }
                }
            }
            "message" => {
                if let Some(obj) = value.as_object() {
                    for (k, v) in obj {
                        remap(&mut info, &MESSAGE_REMAPPING, &TRANSFORMS, k, v.clone());
                    }
                }
            }
            _ => remap(&mut info, &REMAPPING, &TRANSFORMS, key, value.clone()),
        }
    }

    // VOD는 항상 다시보기이므로 사람이 읽는 오프셋 표기도 채워 줌
    if let Some(offset) = info.get("time_in_seconds").and_then(|v| v.as_f64()) {
        info.entry("time_text".to_string())
            .or_insert_with(|| Value::String(utils::seconds_to_time_text(offset)));
    }

    info.insert(
        "message_type".to_string(),
        Value::String("messages".to_string()),
    );

    ChatItem::from_map(info, false)
}

pub struct TwitchChatDownloader {
    session: Session,
}

impl TwitchChatDownloader {
    pub fn new(config: &SessionConfig) -> Result<Self, ChatError> {
        let mut config = config.clone();
        // 맨 앞에 끼워 넣어 호출자가 지정한 헤더가 여전히 이기게 함
        config.headers.insert(
            0,
            ("Client-ID".to_string(), CLIENT_ID.to_string()),
        );
        config.headers.insert(
            1,
            (
                "Accept".to_string(),
                "application/vnd.twitchtv.v5+json".to_string(),
            ),
        );

        Ok(Self {
            session: Session::new(&config)?,
        })
    }

    fn video_id(&self, url: &str) -> Result<String, ChatError> {
        VALID_URL
            .captures(url)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| ChatError::UnsupportedUrl(url.to_string()))
    }

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
                    return Err(e).with_context(|| format!("Failed to fetch comments: {}", url))
                }
            }
        }
    }
}

#[async_trait]
impl ChatDownloader for TwitchChatDownloader {
    fn name(&self) -> &'static str {
        "twitch"
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
        let max_attempts = params.max_attempts.unwrap_or(30);
        let receive_timeout =
            Duration::from_secs_f64(params.message_receive_timeout.unwrap_or(0.1));

        let mut cursor: Option<String> = None;

        loop {
            if reached_max(params) {
                break;
            }

            let url = match &cursor {
                Some(c) => format!(
                    "https://api.twitch.tv/v5/videos/{}/comments?cursor={}",
                    video_id, c
                ),
                None => match params.start_time {
                    // start_time이 있으면 해당 오프셋부터 받기 시작
                    Some(start) => format!(
                        "https://api.twitch.tv/v5/videos/{}/comments?content_offset_seconds={}",
                        video_id, start
                    ),
                    None => format!("https://api.twitch.tv/v5/videos/{}/comments", video_id),
                },
            };

            let response = self.fetch_with_retry(&url, max_attempts).await?;

            let comments = response
                .pointer("/comments")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();

            for comment in &comments {
                let item = parse_comment(comment)?;

                // 댓글은 오프셋 오름차순이므로 end_time을 지나면 끝
                if let (Some(end), Some(t)) = (params.end_time, item.time_in_seconds) {
                    if t > end {
                        return Ok(());
                    }
                }

                if !should_keep(&item, params) {
                    continue;
                }

                deliver(params, item)?;

                if reached_max(params) {
                    break;
                }
            }

            match response.pointer("/_next").and_then(|v| v.as_str()) {
                Some(next) => cursor = Some(next.to_string()),
                None => break,
            }

            time::sleep(receive_timeout).await;
        }

        Ok(())
    }
}
