//! Client for the Winticket JSON API.

use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};

use keirin_contracts::{CupDetailResponse, MonthlyCupsResponse, OddsResponse, RaceCardResponse};

use crate::error::{ApiError, ApiResult};
use crate::rate_limit::RateLimiter;

pub const DEFAULT_BASE_URL: &str = "https://api.winticket.jp/v1/keirin";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/91.0.4472.124 Safari/537.36 Edg/91.0.864.59 KeirinPipeline/0.1.0";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;
const THROTTLE_ENDPOINT: &str = "winticket";

#[derive(Debug, Clone)]
pub struct WinticketConfig {
    pub base_url: String,
    /// Minimum spacing between requests, seconds.
    pub request_interval: f64,
    pub retry_count: u32,
    /// Base of the linear retry wait: attempt N sleeps `N * base` seconds.
    pub retry_backoff_base: f64,
    /// Jitter fraction applied to the request spacing, `0.0..=1.0`.
    pub jitter: f64,
}

impl Default for WinticketConfig {
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

/// Stateful session against the Winticket API: persistent headers, call
/// spacing, and the retry policy for transient failures.
pub struct WinticketClient {
    http: reqwest::Client,
    base_url: String,
    retry_count: u32,
    retry_backoff_base: f64,
    rate_limiter: RateLimiter,
}

impl WinticketClient {
    pub fn new(config: WinticketConfig) -> ApiResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("Accept", HeaderValue::from_static("application/json"));
        headers.insert("Origin", HeaderValue::from_static("https://www.winticket.jp"));

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

    /// Monthly listing: regions, venues and cups for the month containing
    /// `date` (`YYYYMMDD`, expected to be the first of the month).
    pub async fn get_monthly_cups(&self, date: &str) -> ApiResult<MonthlyCupsResponse> {
        let parsed = NaiveDate::parse_from_str(date, "%Y%m%d")
            .map_err(|_| ApiError::InvalidDate(date.to_string()))?;
        if parsed.day() != 1 {
            warn!(date, "monthly listing date is not the first of the month");
        }

        let value = self
            .get_json("/cups", &[("date", date), ("fields", "month"), ("pfm", "web")])
            .await?;
        self.decode("/cups", value)
    }

    /// Cup detail: the cup itself plus its schedules and races.
    pub async fn get_cup_detail(&self, cup_id: &str) -> ApiResult<CupDetailResponse> {
        let path = format!("/cups/{cup_id}");
        let value = self
            .get_json(&path, &[("fields", "cup,schedules,races"), ("pfm", "web")])
            .await?;
        let detail: CupDetailResponse = self.decode(&path, value)?;
        if detail.cup.is_none() {
            return Err(ApiError::Shape {
                url: self.url(&path),
                message: "missing cup section".to_string(),
            });
        }
        Ok(detail)
    }

    /// Race card: players, entries, rider records and the line prediction.
    pub async fn get_race_card(
        &self,
        cup_id: &str,
        index: i64,
        race_number: i64,
    ) -> ApiResult<RaceCardResponse> {
        let path = format!("/cups/{cup_id}/schedules/{index}/races/{race_number}");
        let value = self
            .get_json(
                &path,
                &[("fields", "players,entries,records,linePrediction"), ("pfm", "web")],
            )
            .await?;
        let card: RaceCardResponse = self.decode(&path, value)?;
        if !card.has_required_sections() {
            return Err(ApiError::Shape {
                url: self.url(&path),
                message: "none of players/entries/records present".to_string(),
            });
        }
        Ok(card)
    }

    /// Odds for one race, all seven bet types.
    pub async fn get_race_odds(
        &self,
        cup_id: &str,
        index: i64,
        race_number: i64,
    ) -> ApiResult<OddsResponse> {
        let path = format!("/cups/{cup_id}/schedules/{index}/races/{race_number}/odds");
        let value = self.get_json(&path, &[("pfm", "web")]).await?;
        self.decode(&path, value)
    }

    fn retry_wait(&self, attempt: u32) -> Duration {
        Duration::from_secs_f64((attempt + 1) as f64 * self.retry_backoff_base)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn decode<T: serde::de::DeserializeOwned>(&self, path: &str, value: Value) -> ApiResult<T> {
        serde_json::from_value(value).map_err(|e| ApiError::Decode {
            url: self.url(path),
            message: e.to_string(),
        })
    }

    async fn throttle(&self) {
        self.rate_limiter.wait(THROTTLE_ENDPOINT).await;
    }

    /// One GET with the stage-wide retry policy: 429 honors `Retry-After`
    /// (default 60 s), 5xx and network faults back off linearly, other 4xx
    /// fail immediately, success must parse as JSON.
    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> ApiResult<Value> {
        let url = self.url(path);

        for attempt in 0..self.retry_count {
            self.throttle().await;
            debug!(%url, ?query, attempt, "api request");

            let response = match self.http.get(&url).query(query).send().await {
                Ok(response) => response,
                Err(error) => {
                    let wait = self.retry_wait(attempt);
                    warn!(%url, %error, wait_secs = wait.as_secs(), "network error, retrying");
                    sleep(wait).await;
                    continue;
                }
            };

            let status = response.status();
            debug!(%url, status = status.as_u16(), "api response");

            if status.is_success() {
                let text = match response.text().await {
                    Ok(text) => text,
                    Err(error) => {
                        let wait = self.retry_wait(attempt);
                        warn!(%url, %error, "failed reading response body, retrying");
                        sleep(wait).await;
                        continue;
                    }
                };
                return serde_json::from_str(&text).map_err(|e| ApiError::Decode {
                    url: url.clone(),
                    message: e.to_string(),
                });
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
                warn!(
                    %url,
                    retry_after,
                    attempt = attempt + 1,
                    retries = self.retry_count,
                    "rate limited, honoring retry-after"
                );
                sleep(Duration::from_secs(retry_after)).await;
            } else if status.is_server_error() {
                let wait = self.retry_wait(attempt);
                warn!(
                    %url,
                    status = status.as_u16(),
                    wait_secs = wait.as_secs(),
                    "server error, retrying"
                );
                sleep(wait).await;
            } else {
                warn!(%url, status = status.as_u16(), "client error, not retrying");
                return Err(ApiError::Status {
                    status: status.as_u16(),
                    url,
                });
            }
        }

        warn!(%url, retries = self.retry_count, "all retries failed");
        Err(ApiError::RetriesExhausted { url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_malformed_monthly_date() {
        let client = WinticketClient::new(WinticketConfig::default()).unwrap();
        let err = client.get_monthly_cups("2024-01-01").await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidDate(_)));
    }

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let client = WinticketClient::new(WinticketConfig {
            base_url: "http://localhost:9/".to_string(),
            ..WinticketConfig::default()
        })
        .unwrap();
        assert_eq!(client.url("/cups"), "http://localhost:9/cups");
    }
}
