use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT_LANGUAGE, USER_AGENT};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::ChatError;
use crate::utils;

/// ====== HTTP 세션 ======

/// 기본 User-Agent (데스크탑 Chrome)
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/86.0.4240.111 Safari/537.36";
const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US, en";

/// 다운로더 인스턴스 하나가 소유하는 세션 설정 스냅샷.
/// 생성 이후에는 바꾸지 않으며, 인스턴스 간에 공유하지 않습니다
/// (쿠키/헤더가 다른 다운로더로 새는 것을 막기 위함).
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// 기본 헤더 위에 덮어쓸 추가 헤더. 키가 겹치면 이쪽이 우선
    pub headers: Vec<(String, String)>,
    /// 브라우저에서 내보낸 Netscape 형식 쿠키 파일 경로
    pub cookies: Option<PathBuf>,
}

/// 다운로더 하나가 수명 동안 재사용하는 인증된 HTTP 세션.
/// 커넥션 풀은 drop 시점에 해제됩니다.
pub struct Session {
    client: reqwest::Client,
}

impl Session {
    /// 새 세션을 초기화합니다.
    /// 쿠키 파일 경로가 지정되었는데 존재하지 않으면 `ChatError::Cookie`로
    /// 즉시 실패하며, 반쯤 초기화된 세션은 만들지 않습니다.
    pub fn new(config: &SessionConfig) -> Result<Self, ChatError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static(DEFAULT_ACCEPT_LANGUAGE),
        );

        for (key, value) in &config.headers {
            let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
                ChatError::Parsing(format!("invalid header name `{}`: {}", key, e))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                ChatError::Parsing(format!("invalid header value for `{}`: {}", key, e))
            })?;
            headers.insert(name, value);
        }

        let jar = Arc::new(Jar::default());
        if let Some(path) = &config.cookies {
            if !path.exists() {
                return Err(ChatError::Cookie(format!(
                    "the file \"{}\" could not be found",
                    path.display()
                )));
            }
            load_netscape_cookies(path, &jar)?;
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .cookie_provider(jar)
            .build()?;

        Ok(Self { client })
    }

    /// 세션으로 GET 요청을 보냅니다.
    pub async fn get(&self, url: &str) -> Result<reqwest::Response, ChatError> {
        Ok(self.client.get(url).send().await?)
    }

    /// GET 요청 후 본문을 JSON으로 파싱합니다.
    /// 파싱에 실패하면 (보통 "Video unavailable" 같은 HTML 에러 페이지)
    /// 페이지 제목을 담아 `ChatError::JsonParse`로 실패합니다.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ChatError> {
        let text = self.get(url).await?.text().await?;

        serde_json::from_str(&text).map_err(|_| {
            let title = utils::get_title_of_webpage(&text)
                .unwrap_or_else(|| "unknown page".to_string());
            ChatError::JsonParse(title)
        })
    }

    /// 세션 기본 헤더 위에 추가 헤더를 병합해 POST 요청을 보내고
    /// JSON 본문을 반환합니다. 키가 겹치면 추가 헤더가 우선하며,
    /// 전송 계층 실패는 그대로 전파합니다.
    pub async fn post_json(
        &self,
        url: &str,
        body: &Value,
        extra_headers: &[(&str, &str)],
    ) -> Result<Value, ChatError> {
        let mut request = self.client.post(url).json(body);
        for (key, value) in extra_headers {
            request = request.header(*key, *value);
        }
        Ok(request.send().await?.json().await?)
    }
}

/// Netscape/Mozilla 형식 쿠키 파일을 쿠키 저장소에 로드합니다.
/// 만료 시각 컬럼은 의도적으로 무시하므로, 내보낸 시점에 이미 만료된
/// 쿠키나 세션 전용 쿠키도 그대로 사용됩니다.
fn load_netscape_cookies(path: &Path, jar: &Jar) -> Result<(), ChatError> {
    let content = fs::read_to_string(path).map_err(|e| {
        ChatError::Cookie(format!("failed to read \"{}\": {}", path.display(), e))
    })?;

    for line in content.lines() {
        let line = line.trim();
        // #HttpOnly_ 접두사가 붙은 줄은 주석이 아니라 실제 쿠키
        let raw = line.strip_prefix("#HttpOnly_").unwrap_or(line);
        if raw.is_empty() || raw.starts_with('#') {
            continue;
        }

        // domain, include-subdomains, path, secure, expiry, name, value
        let fields: Vec<&str> = raw.split('\t').collect();
        if fields.len() != 7 {
            continue;
        }
        let (domain, cookie_path, secure, name, value) =
            (fields[0], fields[2], fields[3], fields[5], fields[6]);

        let host = domain.trim_start_matches('.');
        let scheme = if secure.eq_ignore_ascii_case("TRUE") {
            "https"
        } else {
            "http"
        };
        let url: reqwest::Url = format!("{}://{}/", scheme, host)
            .parse()
            .map_err(|e| ChatError::Cookie(format!("invalid cookie domain `{}`: {}", domain, e)))?;

        let set_cookie = format!("{}={}; Domain={}; Path={}", name, value, host, cookie_path);
        jar.add_cookie_str(&set_cookie, &url);
    }

    Ok(())
}
