use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::ChatError;

/// ====== 정규화된 채팅 아이템 ======

/// 플랫폼과 무관한 공통 스키마의 채팅 메시지 하나.
///
/// 라이브가 아닌 소스(다시보기/VOD)에서는 `time_in_seconds`와 `time_text`도
/// 필수입니다. `extra`에는 정규화하지 않는 플랫폼 고유 필드
/// (뱃지, 후원 금액, 스티커 이미지 등)가 그대로 들어갑니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatItem {
    /// 메시지 본문
    pub message: String,
    /// 전송 시각 (epoch 기준 마이크로초)
    pub timestamp: i64,
    /// 스트림 안에서 유일한 식별자
    pub id: String,
    pub author_id: String,
    pub author_name: String,
    /// 다시보기 전용: 방송 시작 기준 오프셋 (초)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_in_seconds: Option<f64>,
    /// 다시보기 전용: 사람이 읽는 오프셋 표기 (예: "1:23:45")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_text: Option<String>,
    /// 시청자에게 표시되는 이름. `author_name`과 다를 수 있음
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_display_name: Option<String>,
    /// 정규화하지 않고 그대로 통과시키는 플랫폼 고유 필드
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn take_string(map: &mut Map<String, Value>, key: &str) -> Result<String, ChatError> {
    match map.remove(key) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Ok(other.to_string()),
        None => Err(ChatError::Parsing(format!(
            "chat item is missing required field `{}`",
            key
        ))),
    }
}

impl ChatItem {
    /// 리매핑이 끝난 필드 맵을 검증하고 ChatItem으로 확정합니다.
    /// 필수 키가 빠져 있으면 `ChatError::Parsing`으로 실패하므로,
    /// 콜백이나 누적 목록에 도달하는 아이템은 항상 스키마를 만족합니다.
    pub fn from_map(mut map: Map<String, Value>, live: bool) -> Result<Self, ChatError> {
        let message = take_string(&mut map, "message")?;

        let timestamp = map
            .remove("timestamp")
            .and_then(|v| match v {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.parse().ok(),
                _ => None,
            })
            .ok_or_else(|| {
                ChatError::Parsing("chat item is missing required field `timestamp`".to_string())
            })?;

        let id = take_string(&mut map, "id")?;
        let author_id = take_string(&mut map, "author_id")?;
        let author_name = take_string(&mut map, "author_name")?;

        let time_in_seconds = map.remove("time_in_seconds").and_then(|v| v.as_f64());
        let time_text = match map.remove("time_text") {
            Some(Value::String(s)) => Some(s),
            _ => None,
        };

        // 다시보기 모드에서는 오프셋 필드도 필수
        if !live {
            if time_in_seconds.is_none() {
                return Err(ChatError::Parsing(
                    "replay chat item is missing required field `time_in_seconds`".to_string(),
                ));
            }
            if time_text.is_none() {
                return Err(ChatError::Parsing(
                    "replay chat item is missing required field `time_text`".to_string(),
                ));
            }
        }

        let author_display_name = match map.remove("author_display_name") {
            Some(Value::String(s)) => Some(s),
            _ => None,
        };

        Ok(Self {
            message,
            timestamp,
            id,
            author_id,
            author_name,
            time_in_seconds,
            time_text,
            author_display_name,
            extra: map,
        })
    }
}

#[cfg(test)]
pub(crate) fn test_item(id: &str) -> ChatItem {
    ChatItem {
        message: format!("message {}", id),
        timestamp: 1_600_000_000_000_000,
        id: id.to_string(),
        author_id: format!("author-{}", id),
        author_name: "tester".to_string(),
        time_in_seconds: None,
        time_text: None,
        author_display_name: None,
        extra: Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn live_map() -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("message".to_string(), json!("hello"));
        map.insert("timestamp".to_string(), json!(1_600_000_000_000_000_i64));
        map.insert("id".to_string(), json!("abc"));
        map.insert("author_id".to_string(), json!("UC123"));
        map.insert("author_name".to_string(), json!("Alice"));
        map
    }

    #[test]
    fn test_from_map_live() {
        let mut map = live_map();
        map.insert("author_badges".to_string(), json!(["moderator"]));

        let item = ChatItem::from_map(map, true).unwrap();

        assert_eq!(item.message, "hello");
        assert_eq!(item.timestamp, 1_600_000_000_000_000);
        assert_eq!(item.author_name, "Alice");
        // 알려지지 않은 필드는 extra로 통과
        assert_eq!(item.extra["author_badges"], json!(["moderator"]));
    }

    #[test]
    fn test_from_map_missing_required_field() {
        let mut map = live_map();
        map.remove("author_name");

        let err = ChatItem::from_map(map, true).unwrap_err();
        assert!(matches!(err, ChatError::Parsing(_)));
        assert!(err.to_string().contains("author_name"));
    }

    #[test]
    fn test_from_map_string_timestamp() {
        let mut map = live_map();
        map.insert("timestamp".to_string(), json!("1600000000000000"));

        let item = ChatItem::from_map(map, true).unwrap();
        assert_eq!(item.timestamp, 1_600_000_000_000_000);
    }

    #[test]
    fn test_replay_requires_offset_fields() {
        let err = ChatItem::from_map(live_map(), false).unwrap_err();
        assert!(err.to_string().contains("time_in_seconds"));

        let mut map = live_map();
        map.insert("time_in_seconds".to_string(), json!(83.0));
        let err = ChatItem::from_map(map, false).unwrap_err();
        assert!(err.to_string().contains("time_text"));

        let mut map = live_map();
        map.insert("time_in_seconds".to_string(), json!(83.0));
        map.insert("time_text".to_string(), json!("1:23"));
        let item = ChatItem::from_map(map, false).unwrap();
        assert_eq!(item.time_in_seconds, Some(83.0));
        assert_eq!(item.time_text.as_deref(), Some("1:23"));
    }

    #[test]
    fn test_extra_fields_are_flattened_in_json() {
        let mut map = live_map();
        map.insert("amount".to_string(), json!("$5.00"));

        let item = ChatItem::from_map(map, true).unwrap();
        let value = serde_json::to_value(&item).unwrap();

        assert_eq!(value["amount"], json!("$5.00"));
        assert!(value.get("extra").is_none());
        assert!(value.get("time_in_seconds").is_none());
    }
}
