pub mod twitch;
pub mod youtube;

use std::collections::HashSet;

use async_trait::async_trait;
use color_eyre::eyre::Result;
use regex::Regex;

use crate::callback::perform_callback;
use crate::errors::ChatError;
use crate::models::ChatItem;
use crate::params::DownloadParams;
use crate::session::SessionConfig;

/// ====== 사이트 공통 계약 ======

/// 사이트별 테스트 픽스처. 외부 검증 하네스(`test-sites` 서브커맨드)가 돌립니다.
/// 사이트마다 정적으로 선언된 목록 하나만 허용되며, 등록 시점에 검증됩니다.
#[derive(Debug, Clone, Copy)]
pub struct SiteTest {
    pub name: &'static str,
    pub url: &'static str,
    /// 픽스처 실행 시 수집할 최대 메시지 수
    pub max_messages: usize,
}

/// 플랫폼별 다운로더가 구현하는 공통 인터페이스.
/// 구현체는 자신의 HTTP 세션을 독점 소유합니다 — 세션을 인스턴스 간에
/// 공유하면 쿠키/헤더가 섞이므로 스트림마다 새 다운로더를 만듭니다.
#[async_trait]
pub trait ChatDownloader: Send + Sync {
    /// 사이트 이름 (로그/CLI 표시용)
    fn name(&self) -> &'static str;

    /// 이 사이트가 처리할 수 있는 URL인지 판별하는 정규표현식
    fn valid_url(&self) -> &Regex;

    /// 정적으로 선언된 테스트 픽스처 목록
    fn tests(&self) -> &'static [SiteTest];

    /// 채팅 메시지를 수집합니다.
    ///
    /// 수집한 메시지는 `params.messages`에 누적되며, 도중에 실패해도
    /// 그때까지의 메시지는 버려지지 않고 호출자가 읽을 수 있습니다.
    async fn get_chat_messages(&self, params: &mut DownloadParams) -> Result<()>;
}

/// ====== 사이트 레지스트리 ======

/// 등록된 모든 사이트를 생성합니다. 사이트마다 독립 세션을 가집니다.
pub fn all_sites(config: &SessionConfig) -> Result<Vec<Box<dyn ChatDownloader>>, ChatError> {
    let sites: Vec<Box<dyn ChatDownloader>> = vec![
        Box::new(youtube::YouTubeChatDownloader::new(config)?),
        Box::new(twitch::TwitchChatDownloader::new(config)?),
    ];
    validate_tests(&sites)?;
    Ok(sites)
}

/// URL을 처리할 수 있는 사이트를 찾아 생성합니다.
pub fn resolve_site(
    url: &str,
    config: &SessionConfig,
) -> Result<Box<dyn ChatDownloader>, ChatError> {
    let sites = all_sites(config)?;
    sites
        .into_iter()
        .find(|site| site.valid_url().is_match(url))
        .ok_or_else(|| ChatError::UnsupportedUrl(url.to_string()))
}

/// 등록 시점의 테스트 픽스처 검증.
/// 픽스처 이름은 비어 있을 수 없고 사이트 안에서 유일해야 하며,
/// 픽스처 URL은 선언한 사이트가 실제로 처리할 수 있어야 합니다.
fn validate_tests(sites: &[Box<dyn ChatDownloader>]) -> Result<(), ChatError> {
    for site in sites {
        let mut seen = HashSet::new();
        for test in site.tests() {
            if test.name.is_empty() {
                return Err(ChatError::Parsing(format!(
                    "{}: test fixture with an empty name",
                    site.name()
                )));
            }
            if !seen.insert(test.name) {
                return Err(ChatError::Parsing(format!(
                    "{}: duplicate test fixture `{}`",
                    site.name(),
                    test.name
                )));
            }
            if !site.valid_url().is_match(test.url) {
                return Err(ChatError::Parsing(format!(
                    "{}: test fixture `{}` has a URL the site cannot handle: {}",
                    site.name(),
                    test.name,
                    test.url
                )));
            }
        }
    }
    Ok(())
}

/// ====== 공통 메시지 파이프라인 ======

/// 시간 범위와 message_types 필터를 적용합니다.
/// 카테고리를 밝히지 않은 아이템은 기본 카테고리("messages")로 취급합니다.
pub(crate) fn should_keep(item: &ChatItem, params: &DownloadParams) -> bool {
    if let (Some(start), Some(t)) = (params.start_time, item.time_in_seconds) {
        if t < start {
            return false;
        }
    }
    if let (Some(end), Some(t)) = (params.end_time, item.time_in_seconds) {
        if t > end {
            return false;
        }
    }

    if let Some(types) = &params.message_types {
        let message_type = item
            .extra
            .get("message_type")
            .and_then(|v| v.as_str())
            .unwrap_or("messages");
        if !types.iter().any(|t| t == message_type) {
            return false;
        }
    }

    true
}

/// max_messages에 도달했는지 확인합니다.
pub(crate) fn reached_max(params: &DownloadParams) -> bool {
    match params.max_messages {
        Some(max) => params.messages.len() >= max,
        None => false,
    }
}

/// 정규화된 메시지 하나를 콜백에 전달한 뒤 누적 목록에 추가합니다.
/// 콜백이 실패하면 해당 아이템은 추가되지 않지만 이전 아이템들은 유지됩니다.
pub(crate) fn deliver(params: &mut DownloadParams, item: ChatItem) -> Result<()> {
    if let Some(callback) = params.callback.as_mut() {
        perform_callback(callback, &item)?;
    }
    params.messages.push(item);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::Callback;
    use crate::models::test_item;
    use serde_json::json;

    #[test]
    fn test_resolve_known_urls() {
        let config = SessionConfig::default();
        let site = resolve_site("https://www.youtube.com/watch?v=5qap5aO4i9A", &config).unwrap();
        assert_eq!(site.name(), "youtube");

        let site = resolve_site("https://www.twitch.tv/videos/449716115", &config).unwrap();
        assert_eq!(site.name(), "twitch");
    }

    #[test]
    fn test_unsupported_url() {
        let err = resolve_site("https://example.com/stream", &SessionConfig::default())
            .err()
            .expect("should not resolve");
        assert!(matches!(err, ChatError::UnsupportedUrl(_)));
    }

    #[test]
    fn test_registered_fixtures_are_valid() {
        // all_sites가 등록 검증까지 통과해야 함
        let sites = all_sites(&SessionConfig::default()).unwrap();
        assert_eq!(sites.len(), 2);
        for site in &sites {
            assert!(!site.tests().is_empty());
        }
    }

    #[test]
    fn test_should_keep_time_window() {
        let mut params = DownloadParams::new("url");
        params.fill_defaults();
        params.start_time = Some(60.0);
        params.end_time = Some(120.0);

        let mut item = test_item("a");
        item.time_in_seconds = Some(30.0);
        assert!(!should_keep(&item, &params));

        item.time_in_seconds = Some(90.0);
        assert!(should_keep(&item, &params));

        item.time_in_seconds = Some(180.0);
        assert!(!should_keep(&item, &params));
    }

    #[test]
    fn test_should_keep_message_types() {
        let mut params = DownloadParams::new("url");
        params.fill_defaults(); // 기본 필터는 ["messages"]

        let plain = test_item("a");
        assert!(should_keep(&plain, &params));

        let mut superchat = test_item("b");
        superchat
            .extra
            .insert("message_type".to_string(), json!("superchat"));
        assert!(!should_keep(&superchat, &params));

        params.message_types = Some(vec!["messages".to_string(), "superchat".to_string()]);
        assert!(should_keep(&superchat, &params));
    }

    #[test]
    fn test_abort_keeps_collected_messages() {
        let mut params = DownloadParams::new("url");
        params.fill_defaults();

        // 4번째 원본 아이템에서 전송 실패가 나는 fetch 루프 시뮬레이션
        let raw_items: Vec<Result<ChatItem, ChatError>> = vec![
            Ok(test_item("1")),
            Ok(test_item("2")),
            Ok(test_item("3")),
            Err(ChatError::JsonParse("Service unavailable".to_string())),
        ];

        let result = (|| -> Result<()> {
            for raw in raw_items {
                let item = raw?;
                deliver(&mut params, item)?;
            }
            Ok(())
        })();

        assert!(result.is_err());
        assert_eq!(params.messages.len(), 3);
        for (i, item) in params.messages.iter().enumerate() {
            assert_eq!(item.id, format!("{}", i + 1));
            assert!(!item.author_name.is_empty());
        }
    }

    #[test]
    fn test_failing_callback_keeps_previous_messages() {
        let mut params = DownloadParams::new("url");
        params.fill_defaults();

        let mut calls = 0;
        params.callback = Some(Callback::new("flaky", move |_item| {
            calls += 1;
            if calls >= 3 {
                Err(color_eyre::eyre::eyre!("downstream is gone"))
            } else {
                Ok(())
            }
        }));

        let mut result = Ok(());
        for id in ["1", "2", "3"] {
            result = deliver(&mut params, test_item(id));
            if result.is_err() {
                break;
            }
        }

        assert!(result.is_err());
        assert_eq!(params.messages.len(), 2);
    }
}
