use thiserror::Error;

/// ====== 에러 타입 정의 ======

/// 다운로더 전역에서 쓰는 에러 분류.
/// 세션 초기화 실패는 치명적이며 즉시 전파되고,
/// 메시지 파이프라인의 실패는 전파되더라도 그때까지 누적된 메시지를 버리지 않습니다.
#[derive(Error, Debug)]
pub enum ChatError {
    /// 설정 단계: 지정한 쿠키 파일을 사용할 수 없음
    #[error("cookie error: {0}")]
    Cookie(String),

    /// 응답 단계: 서버가 JSON이 아닌 본문을 반환함 (보통 HTML 에러 페이지).
    /// 진단을 위해 페이지 제목을 담습니다.
    #[error("unable to parse JSON response (page title: {0})")]
    JsonParse(String),

    /// 설정 단계: 호출자 콜백이 채팅 아이템을 받지 못함.
    /// 문제의 콜백 이름을 담습니다.
    #[error("invalid callback function: {0}")]
    Callback(String),

    /// 구조가 예상과 다른 원본 페이로드를 만났을 때의 정규화 실패
    #[error("unable to parse chat data: {0}")]
    Parsing(String),

    /// 전송 계층 실패는 그대로 감쌉니다
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// 어떤 사이트도 처리할 수 없는 URL
    #[error("unsupported URL: {0}")]
    UnsupportedUrl(String),
}
