use chrono::{Duration as ChronoDuration, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use once_cell::sync::Lazy;
use regex::Regex;

/// ====== 공통 로그 함수 (KST 기준) ======
pub fn log(msg: impl AsRef<str>) {
    let now = Utc::now() + ChronoDuration::hours(9);
    println!("{} {}", now.format("%Y-%m-%d %H:%M:%S"), msg.as_ref());
}

/// ====== 공통 Progress Bar 생성 함수 ======
/// 표준 스타일의 ProgressBar를 생성합니다.
pub fn create_progress_bar(total: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>7}/{len:7} ({eta}) {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.set_message(message.to_string());
    pb
}

/// ====== HTML <title> 추출 ======

static TITLE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("Invalid title regex"));

/// HTML 문자열에서 `<title>` 텍스트를 추출합니다.
/// JSON 파싱에 실패했을 때 플랫폼 에러 페이지의 제목을
/// 진단 메시지로 내보내기 위한 용도입니다.
pub fn get_title_of_webpage(html: &str) -> Option<String> {
    let caps = TITLE_REGEX.captures(html)?;
    Some(caps.get(1)?.as_str().trim().to_string())
}

/// ====== 시간 표기 변환 ======

/// `"1:23:45"` 또는 `"83.5"` 형식의 문자열을 초 단위로 변환합니다.
/// 앞에 `-`가 붙으면 음수 오프셋으로 해석합니다.
pub fn time_text_to_seconds(text: &str) -> Option<f64> {
    let text = text.trim();
    let (sign, body) = match text.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, text),
    };
    if body.is_empty() {
        return None;
    }

    let mut seconds = 0.0;
    for part in body.split(':') {
        let value: f64 = part.trim().parse().ok()?;
        seconds = seconds * 60.0 + value;
    }
    Some(sign * seconds)
}

/// 초 단위 오프셋을 사람이 읽는 `"h:mm:ss"` 표기로 변환합니다.
pub fn seconds_to_time_text(seconds: f64) -> String {
    let negative = seconds < 0.0;
    let total = seconds.abs().round() as i64;
    let (hours, minutes, secs) = (total / 3600, (total % 3600) / 60, total % 60);

    let text = if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    };

    if negative {
        format!("-{}", text)
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_title_of_webpage() {
        let html = "<html><head><TITLE> Video unavailable </TITLE></head><body></body></html>";
        assert_eq!(
            get_title_of_webpage(html),
            Some("Video unavailable".to_string())
        );
        assert_eq!(get_title_of_webpage("{\"not\": \"html\"}"), None);
    }

    #[test]
    fn test_time_text_to_seconds() {
        assert_eq!(time_text_to_seconds("1:23:45"), Some(5025.0));
        assert_eq!(time_text_to_seconds("0:45"), Some(45.0));
        assert_eq!(time_text_to_seconds("83.5"), Some(83.5));
        assert_eq!(time_text_to_seconds("-1:30"), Some(-90.0));
        assert_eq!(time_text_to_seconds("abc"), None);
        assert_eq!(time_text_to_seconds(""), None);
    }

    #[test]
    fn test_seconds_to_time_text() {
        assert_eq!(seconds_to_time_text(5025.0), "1:23:45");
        assert_eq!(seconds_to_time_text(45.0), "0:45");
        assert_eq!(seconds_to_time_text(-90.0), "-1:30");
        assert_eq!(seconds_to_time_text(0.0), "0:00");
    }
}
