use crate::{
    Config, Document,
    config::HttpConfig,
    error::HttpError,
    source::{envcanada::ConditionsFetcher, envcanada::OutlookFetcher, openweather::ForecastFetcher},
};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use std::{convert::TryFrom, fmt::Debug};

pub mod envcanada;
pub mod openweather;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobId {
    Conditions,
    Forecast,
    Outlook,
}

impl JobId {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobId::Conditions => "conditions",
            JobId::Forecast => "forecast",
            JobId::Outlook => "outlook",
        }
    }

    pub const fn all() -> &'static [JobId] {
        &[JobId::Conditions, JobId::Forecast, JobId::Outlook]
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for JobId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "conditions" => Ok(JobId::Conditions),
            "forecast" => Ok(JobId::Forecast),
            "outlook" => Ok(JobId::Outlook),
            _ => Err(anyhow::anyhow!(
                "Unknown job '{value}'. Supported jobs: conditions, forecast, outlook."
            )),
        }
    }
}

/// One upstream read turned into one publishable document.
#[async_trait]
pub trait Fetcher: Send + Sync + Debug {
    async fn fetch(&self) -> anyhow::Result<Document>;
}

/// Construct the fetcher for a job from config.
pub fn fetcher_from_config(id: JobId, config: &Config) -> anyhow::Result<Box<dyn Fetcher>> {
    let http = http_client(&config.http)?;

    let boxed: Box<dyn Fetcher> = match id {
        JobId::Conditions => Box::new(ConditionsFetcher::new(http, config)?),
        JobId::Forecast => {
            let api_key = config.forecast.api_key()?;
            Box::new(ForecastFetcher::new(http, api_key, config))
        }
        JobId::Outlook => Box::new(OutlookFetcher::new(http, config)),
    };

    Ok(boxed)
}

pub(crate) fn http_client(http: &HttpConfig) -> anyhow::Result<Client> {
    Client::builder()
        .timeout(http.timeout())
        .user_agent(concat!("wxfeed/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to create HTTP client")
}

/// GET a URL and return the body, turning non-success statuses into [`HttpError`].
pub(crate) async fn get_text(
    http: &Client,
    service: &'static str,
    url: &str,
    query: &[(&str, String)],
) -> anyhow::Result<String> {
    let res = http
        .get(url)
        .query(query)
        .send()
        .await
        .with_context(|| format!("Failed to send request to {service}"))?;

    let status = res.status();
    let body = res
        .text()
        .await
        .with_context(|| format!("Failed to read {service} response body"))?;

    if !status.is_success() {
        return Err(HttpError::from_status(service, status, &body).into());
    }

    tracing::debug!(service, %status, bytes = body.len(), "response received");
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_as_str_roundtrip() {
        for id in JobId::all() {
            let s = id.as_str();
            let parsed = JobId::try_from(s).expect("roundtrip should succeed");
            assert_eq!(*id, parsed);
        }
    }

    #[test]
    fn unknown_job_error() {
        let err = JobId::try_from("doesnotexist").unwrap_err();
        assert!(err.to_string().contains("Unknown job"));
    }

    #[test]
    fn forecast_fetcher_errors_when_missing_api_key() {
        let mut cfg = Config::default();
        cfg.forecast.api_key_env = "WXFEED_TEST_KEY_THAT_IS_NEVER_SET".to_string();

        let err = fetcher_from_config(JobId::Forecast, &cfg).unwrap_err();
        assert!(err.to_string().contains("No API key found"));
    }

    #[test]
    fn feed_fetchers_need_no_key() {
        let cfg = Config::default();
        assert!(fetcher_from_config(JobId::Conditions, &cfg).is_ok());
        assert!(fetcher_from_config(JobId::Outlook, &cfg).is_ok());
    }

    #[test]
    fn conditions_fetcher_rejects_bad_offset() {
        let mut cfg = Config::default();
        cfg.location.utc_offset_hours = 99;

        let err = fetcher_from_config(JobId::Conditions, &cfg).unwrap_err();
        assert!(err.to_string().contains("utc_offset_hours"));
    }

    /// Serve one canned HTTP response on a local port and return its URL.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        use tokio::{
            io::{AsyncReadExt, AsyncWriteExt},
            net::TcpListener,
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();

            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }

            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        format!("http://{addr}/onecall")
    }

    async fn fetch_status(status_line: &'static str, body: &'static str) -> anyhow::Result<String> {
        let url = serve_once(status_line, body).await;
        let http = http_client(&HttpConfig::default()).unwrap();
        get_text(&http, "OpenWeather", &url, &[("appid", "KEY".to_string())]).await
    }

    #[tokio::test]
    async fn unauthorized_becomes_bad_credentials() {
        let err = fetch_status("401 Unauthorized", r#"{"cod":401}"#).await.unwrap_err();

        match err.downcast_ref::<HttpError>() {
            Some(HttpError::BadCredentials { status, body, .. }) => {
                assert_eq!(status.as_u16(), 401);
                assert_eq!(body, r#"{"cod":401}"#);
            }
            other => panic!("expected bad credentials, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn too_many_requests_becomes_quota_exceeded() {
        let err = fetch_status("429 Too Many Requests", "slow down").await.unwrap_err();
        assert!(matches!(err.downcast_ref::<HttpError>(), Some(HttpError::QuotaExceeded { .. })));
    }

    #[tokio::test]
    async fn success_returns_body() {
        let body = fetch_status("200 OK", "<feed/>").await.unwrap();
        assert_eq!(body, "<feed/>");
    }
}
