use std::str::FromStr;

use crate::callback::Callback;
use crate::errors::ChatError;
use crate::models::ChatItem;

/// ====== 다운로드 파라미터 ======

/// YouTube 전용: 어떤 채팅 피드를 받을지 선택합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatType {
    /// 전체 채팅 (기본값)
    #[default]
    Live,
    /// 인기 채팅
    Top,
}

impl FromStr for ChatType {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "live" => Ok(Self::Live),
            "top" => Ok(Self::Top),
            other => Err(ChatError::Parsing(format!("unknown chat type: {}", other))),
        }
    }
}

/// fetch 호출 한 번의 전체 설정.
///
/// `messages`는 반환값이 아니라 여기에 누적됩니다 — 수집 도중 실패하거나
/// 인터럽트가 걸려도 그때까지 모은 메시지를 호출자가 그대로 읽을 수 있게
/// 하기 위함입니다. 수집하는 동안에는 읽기 전용으로 취급합니다.
#[derive(Debug, Default)]
pub struct DownloadParams {
    /// 대상 스트림/비디오 URL (필수, 기본값 없음)
    pub url: String,
    /// 누적 메시지 목록. 교체하지 않고 이어 붙입니다.
    pub messages: Vec<ChatItem>,
    /// 다시보기 모드: 이 오프셋(초) 이전 메시지는 버림
    pub start_time: Option<f64>,
    /// 다시보기 모드: 이 오프셋(초) 이후 메시지는 버림
    pub end_time: Option<f64>,
    /// 정규화된 메시지마다 한 번씩 호출되는 콜백
    pub callback: Option<Callback>,
    /// 일시적 fetch 실패 재시도 상한
    pub max_attempts: Option<u32>,
    /// N개 수집 후 중단
    pub max_messages: Option<usize>,
    /// 유지할 메시지 카테고리 필터
    pub message_types: Option<Vec<String>>,
    /// YouTube 전용 모드 선택
    pub chat_type: Option<ChatType>,
    /// N초 동안 새 메시지가 없으면 중단
    pub timeout: Option<f64>,
    /// 폴링 사이 대기 시간 (초). 인터럽트가 끼어들 수 있도록 짧게 유지
    pub message_receive_timeout: Option<f64>,
}

impl DownloadParams {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// 문서화된 기본값을 비어 있는 필드에만 채워 넣습니다.
    /// 호출자가 지정한 값은 절대 덮어쓰지 않으며, 두 번 호출해도 결과가 같습니다.
    pub fn fill_defaults(&mut self) {
        if self.max_attempts.is_none() {
            self.max_attempts = Some(30);
        }
        if self.message_types.is_none() {
            self.message_types = Some(vec!["messages".to_string()]);
        }
        if self.chat_type.is_none() {
            self.chat_type = Some(ChatType::Live);
        }
        if self.message_receive_timeout.is_none() {
            self.message_receive_timeout = Some(0.1);
        }
        // start_time / end_time / callback / max_messages / timeout은 기본값이 "없음"
    }
}
