use std::fs;
use std::path::PathBuf;

use color_eyre::eyre::{Context, Result};
use mimalloc::MiMalloc;
use structopt::StructOpt;

use crate::callback::Callback;
use crate::errors::ChatError;
use crate::models::ChatItem;
use crate::params::{ChatType, DownloadParams};
use crate::session::SessionConfig;

mod callback;
mod errors;
mod models;
mod params;
mod remap;
mod session;
mod sites;
mod utils;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// ====== CLI 구조체 ======

#[derive(StructOpt, Debug)]
#[structopt(name = "chat-dl", about = "라이브 스트리밍 채팅 다운로더")]
pub enum Opt {
    /// 채팅 다운로드 모드
    #[structopt(name = "download")]
    Download(DownloadOpt),

    /// 등록된 사이트와 테스트 픽스처 출력
    #[structopt(name = "sites")]
    Sites,

    /// 사이트별 테스트 픽스처 실행 모드
    #[structopt(name = "test-sites")]
    TestSites(TestSitesOpt),
}

/// 채팅 다운로드 모드 옵션
#[derive(StructOpt, Debug)]
pub struct DownloadOpt {
    /// 대상 스트림/비디오 URL
    pub url: String,

    /// 수집한 메시지를 저장할 JSON 파일 경로
    #[structopt(long)]
    pub output: Option<PathBuf>,

    /// 브라우저에서 내보낸 Netscape 형식 쿠키 파일
    #[structopt(long)]
    pub cookies: Option<PathBuf>,

    /// 이 오프셋 이후 메시지만 유지 (초 또는 "1:23:45", 다시보기 전용)
    #[structopt(long)]
    pub start_time: Option<String>,

    /// 이 오프셋 이전 메시지만 유지 (다시보기 전용)
    #[structopt(long)]
    pub end_time: Option<String>,

    /// N개 수집 후 중단
    #[structopt(long)]
    pub max_messages: Option<usize>,

    /// 일시적 fetch 실패 재시도 상한
    #[structopt(long)]
    pub max_attempts: Option<u32>,

    /// 유지할 메시지 카테고리 (쉼표 구분, 예: messages,superchat)
    #[structopt(long, use_delimiter = true)]
    pub message_types: Option<Vec<String>>,

    /// live 또는 top (YouTube 전용)
    #[structopt(long)]
    pub chat_type: Option<ChatType>,

    /// N초 동안 새 메시지가 없으면 중단
    #[structopt(long)]
    pub timeout: Option<f64>,
}

/// 테스트 픽스처 실행 모드 옵션
#[derive(StructOpt, Debug)]
pub struct TestSitesOpt {
    /// 특정 사이트만 실행 (예: youtube)
    #[structopt(long)]
    pub site: Option<String>,
}

/// ====== 엔트리포인트 ======

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let opt = Opt::from_args();

    match opt {
        Opt::Download(opts) => run_download(&opts).await?,
        Opt::Sites => run_sites()?,
        Opt::TestSites(opts) => run_test_sites(&opts).await?,
    }

    Ok(())
}

/// 채팅 다운로드 모드 실행
async fn run_download(opts: &DownloadOpt) -> Result<()> {
    let config = SessionConfig {
        cookies: opts.cookies.clone(),
        ..Default::default()
    };
    let site = sites::resolve_site(&opts.url, &config)?;
    utils::log(format!("Using site: {}", site.name()));

    let mut params = DownloadParams::new(&opts.url);
    params.start_time = parse_time_opt(opts.start_time.as_deref())?;
    params.end_time = parse_time_opt(opts.end_time.as_deref())?;
    params.max_messages = opts.max_messages;
    params.max_attempts = opts.max_attempts;
    params.message_types = opts.message_types.clone();
    params.chat_type = opts.chat_type;
    params.timeout = opts.timeout;
    params.callback = Some(Callback::new("print_message", |item: &ChatItem| {
        let time = item
            .time_text
            .clone()
            .unwrap_or_else(|| format_timestamp(item.timestamp));
        println!("[{}] {}: {}", time, item.author_name, item.message);
        Ok(())
    }));

    // Ctrl+C로 끊어도 그때까지 수집한 메시지는 저장한다
    let result: Result<()> = tokio::select! {
        r = site.get_chat_messages(&mut params) => r,
        _ = tokio::signal::ctrl_c() => {
            utils::log("Interrupted, saving collected messages.");
            Ok(())
        }
    };

    utils::log(format!("Collected {} messages.", params.messages.len()));

    if let Some(output) = &opts.output {
        let json = serde_json::to_string_pretty(&params.messages)?;
        fs::write(output, json)
            .with_context(|| format!("Failed to write output file: {:?}", output))?;
        utils::log(format!("Saved to {:?}", output));
    }

    result
}

/// 등록된 사이트와 테스트 픽스처 출력
fn run_sites() -> Result<()> {
    let sites = sites::all_sites(&SessionConfig::default())?;
    for site in &sites {
        println!("{}", site.name());
        for test in site.tests() {
            println!(
                "  {} -> {} (max {} messages)",
                test.name, test.url, test.max_messages
            );
        }
    }
    Ok(())
}

/// 사이트별 테스트 픽스처 실행
async fn run_test_sites(opts: &TestSitesOpt) -> Result<()> {
    let config = SessionConfig::default();
    let sites = sites::all_sites(&config)?;

    let total: usize = sites
        .iter()
        .filter(|s| opts.site.as_deref().map_or(true, |n| s.name() == n))
        .map(|s| s.tests().len())
        .sum();
    let pb = utils::create_progress_bar(total as u64, "Running site fixtures...");

    let mut failures = 0;
    for site in &sites {
        if let Some(name) = &opts.site {
            if site.name() != name {
                continue;
            }
        }

        for test in site.tests() {
            utils::log(format!(
                "Running {}::{} ({})",
                site.name(),
                test.name,
                test.url
            ));

            let mut params = DownloadParams::new(test.url);
            params.max_messages = Some(test.max_messages);
            params.timeout = Some(30.0);

            match site.get_chat_messages(&mut params).await {
                Ok(()) => utils::log(format!("  OK, {} messages", params.messages.len())),
                Err(e) => {
                    failures += 1;
                    utils::log(format!(
                        "  FAILED after {} messages: {}",
                        params.messages.len(),
                        e
                    ));
                }
            }
            pb.inc(1);
        }
    }
    pb.finish_with_message("Done");

    if failures > 0 {
        utils::log(format!("{} fixture(s) failed", failures));
    }
    Ok(())
}

/// "1:23:45" 또는 초 단위 문자열을 파싱합니다.
fn parse_time_opt(value: Option<&str>) -> Result<Option<f64>> {
    match value {
        None => Ok(None),
        Some(text) => utils::time_text_to_seconds(text)
            .map(Some)
            .ok_or_else(|| ChatError::Parsing(format!("invalid time value: {}", text)).into()),
    }
}

/// epoch 마이크로초를 로그에 쓰기 좋은 시각 문자열로 변환합니다.
fn format_timestamp(usec: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp_micros(usec)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| usec.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_time_opt() {
        assert_eq!(parse_time_opt(None).unwrap(), None);
        assert_eq!(parse_time_opt(Some("1:23:45")).unwrap(), Some(5025.0));
        assert_eq!(parse_time_opt(Some("90")).unwrap(), Some(90.0));
        assert!(parse_time_opt(Some("not a time")).is_err());
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(
            format_timestamp(1_577_836_800_000_000),
            "2020-01-01 00:00:00"
        );
    }
}
