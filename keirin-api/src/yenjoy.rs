//! Client for the Yenjoy HTML site (race result pages).

use std::time::Duration;

use chrono::NaiveDate;
use encoding_rs::{EUC_JP, Encoding, SHIFT_JIS};
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, RETRY_AFTER};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{ApiError, ApiResult};
use crate::rate_limit::RateLimiter;

pub const DEFAULT_BASE_URL: &str = "https://www.yen-joy.net";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/91.0.4472.124 Safari/537.36 KeirinPipeline/0.1.0";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;
const THROTTLE_ENDPOINT: &str = "yenjoy";

#[derive(Debug, Clone)]
pub struct YenjoyConfig {
    pub base_url: String,
    /// Minimum spacing between requests, seconds.
    pub request_interval: f64,
    pub retry_count: u32,
    /// Base of the linear retry wait: attempt N sleeps `N * base` seconds.
    pub retry_backoff_base: f64,
    /// Jitter fraction applied to the request spacing, `0.0..=1.0`.
    pub jitter: f64,
}

impl Default for YenjoyConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_interval: 1.0,
            retry_count: 3,
            retry_backoff_base: 3.0,
            jitter: 0.2,
        }
    }
}

/// A fetched and charset-decoded result page.
#[derive(Debug, Clone)]
pub struct HtmlPage {
    pub url: String,
    pub status: u16,
    pub content: String,
}

/// HTTP GET with charset-tolerant decoding and the shared retry policy.
pub struct YenjoyClient {
    http: reqwest::Client,
    base_url: String,
    retry_count: u32,
    retry_backoff_base: f64,
    rate_limiter: RateLimiter,
}

impl YenjoyClient {
    pub fn new(config: YenjoyConfig) -> ApiResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Accept",
            HeaderValue::from_static("application/json, text/javascript, */*; q=0.01"),
        );
        headers.insert("Referer", HeaderValue::from_static("https://yenjoy.keirin.jp/"));

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retry_count: config.retry_count.max(1),
            retry_backoff_base: config.retry_backoff_base.max(0.0),
            rate_limiter: RateLimiter::new(config.request_interval.max(0.0), config.jitter),
        })
    }

    /// Race result page URL:
    /// `{base}/kaisai/race/result/detail/{YYYYMM}/{venue:02}/{cup start
    /// YYYYMMDD}/{race date YYYYMMDD}/{race number}`.
    pub fn result_page_url(
        &self,
        cup_start_date: NaiveDate,
        race_date: NaiveDate,
        venue_id: &str,
        race_number: i64,
    ) -> String {
        format!(
            "{}/kaisai/race/result/detail/{}/{:0>2}/{}/{}/{}",
            self.base_url,
            cup_start_date.format("%Y%m"),
            venue_id,
            cup_start_date.format("%Y%m%d"),
            race_date.format("%Y%m%d"),
            race_number,
        )
    }

    /// Fetch one page. Retry policy mirrors the JSON client; a body that
    /// cannot be decoded by any known charset fails without retry.
    pub async fn get_html(&self, url: &str) -> ApiResult<HtmlPage> {
        for attempt in 0..self.retry_count {
            self.throttle().await;
            debug!(%url, attempt, "html request");

            let response = match self.http.get(url).send().await {
                Ok(response) => response,
                Err(error) => {
                    let wait = self.retry_wait(attempt);
                    warn!(%url, %error, wait_secs = wait.as_secs(), "network error, retrying");
                    sleep(wait).await;
                    continue;
                }
            };

            let status = response.status();
            debug!(%url, status = status.as_u16(), "html response");

            if status.is_success() {
                let declared_charset = response
                    .headers()
                    .get(CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(charset_from_content_type);

                let body = match response.bytes().await {
                    Ok(bytes) => bytes,
                    Err(error) => {
                        let wait = self.retry_wait(attempt);
                        warn!(%url, %error, "failed reading response body, retrying");
                        sleep(wait).await;
                        continue;
                    }
                };

                let content = decode_body(&body, declared_charset.as_deref())
                    .ok_or_else(|| ApiError::Charset { url: url.to_string() })?;
                return Ok(HtmlPage {
                    url: url.to_string(),
                    status: status.as_u16(),
                    content,
                });
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
                warn!(%url, retry_after, "rate limited, honoring retry-after");
                sleep(Duration::from_secs(retry_after)).await;
            } else if status.is_server_error() {
                let wait = self.retry_wait(attempt);
                warn!(%url, status = status.as_u16(), "server error, retrying");
                sleep(wait).await;
            } else {
                warn!(%url, status = status.as_u16(), "client error, not retrying");
                return Err(ApiError::Status {
                    status: status.as_u16(),
                    url: url.to_string(),
                });
            }
        }

        warn!(%url, retries = self.retry_count, "all retries failed");
        Err(ApiError::RetriesExhausted {
            url: url.to_string(),
        })
    }

    fn retry_wait(&self, attempt: u32) -> Duration {
        Duration::from_secs_f64((attempt + 1) as f64 * self.retry_backoff_base)
    }

    async fn throttle(&self) {
        self.rate_limiter.wait(THROTTLE_ENDPOINT).await;
    }
}

/// Strict-decode the body: UTF-8, then the server-declared charset, then
/// Shift_JIS, then EUC-JP. First lossless decode wins.
fn decode_body(bytes: &[u8], declared_charset: Option<&str>) -> Option<String> {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Some(text.to_string());
    }

    let mut candidates: Vec<&'static Encoding> = Vec::new();
    if let Some(label) = declared_charset {
        if let Some(encoding) = Encoding::for_label(label.as_bytes()) {
            candidates.push(encoding);
        }
    }
    candidates.push(SHIFT_JIS);
    candidates.push(EUC_JP);

    for encoding in candidates {
        if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(bytes) {
            return Some(text.into_owned());
        }
    }
    None
}

fn charset_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').find_map(|part| {
        let part = part.trim();
        part.strip_prefix("charset=")
            .map(|cs| cs.trim_matches('"').to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> YenjoyClient {
        YenjoyClient::new(YenjoyConfig::default()).unwrap()
    }

    #[test]
    fn result_url_layout_matches_site_scheme() {
        let url = client().result_page_url(
            NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 12).unwrap(),
            "5",
            7,
        );
        assert_eq!(
            url,
            "https://www.yen-joy.net/kaisai/race/result/detail/202401/05/20240110/20240112/7"
        );
    }

    #[test]
    fn venue_codes_keep_existing_two_digits() {
        let url = client().result_page_url(
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
            "34",
            12,
        );
        assert!(url.ends_with("/202403/34/20240301/20240302/12"));
    }

    #[test]
    fn decodes_shift_jis_bodies() {
        let (encoded, _, _) = SHIFT_JIS.encode("レース評");
        assert_eq!(decode_body(&encoded, None).as_deref(), Some("レース評"));
    }

    #[test]
    fn declared_charset_wins_over_fallbacks() {
        let (encoded, _, _) = EUC_JP.encode("検車場レポート");
        let decoded = decode_body(&encoded, Some("euc-jp"));
        assert_eq!(decoded.as_deref(), Some("検車場レポート"));
    }

    #[test]
    fn utf8_bodies_pass_through() {
        assert_eq!(decode_body("周回".as_bytes(), None).as_deref(), Some("周回"));
    }

    #[test]
    fn charset_header_parsing() {
        assert_eq!(
            charset_from_content_type("text/html; charset=Shift_JIS").as_deref(),
            Some("Shift_JIS")
        );
        assert_eq!(charset_from_content_type("text/html"), None);
    }
}
