use reqwest::StatusCode;
use thiserror::Error;

/// Problems with the Environment Canada Atom feed.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed is not well-formed XML: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("feed has no '{0}' entry")]
    MissingEntry(&'static str),

    #[error("current conditions summary has no {0} field")]
    MissingField(&'static str),

    #[error("could not read {field} from '{value}'")]
    InvalidField { field: &'static str, value: String },
}

/// Problems with the One Call forecast document.
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("forecast JSON is malformed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("forecast has {got} hourly samples, at least {need} are required for a 24h trend")]
    TooFewHourly { got: usize, need: usize },

    #[error("forecast timestamp {0} is out of range")]
    BadTimestamp(i64),
}

/// Non-success HTTP answers, classified where the status has a known meaning.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("{service} rejected the API key (status {status}): {body}")]
    BadCredentials { service: &'static str, status: StatusCode, body: String },

    #[error("{service} quota exceeded (status {status}): {body}")]
    QuotaExceeded { service: &'static str, status: StatusCode, body: String },

    #[error("{service} request failed with status {status}: {body}")]
    Status { service: &'static str, status: StatusCode, body: String },
}

impl HttpError {
    pub fn from_status(service: &'static str, status: StatusCode, body: &str) -> Self {
        let body = truncate_body(body);
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                HttpError::BadCredentials { service, status, body }
            }
            StatusCode::TOO_MANY_REQUESTS => HttpError::QuotaExceeded { service, status, body },
            _ => HttpError::Status { service, status, body },
        }
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_statuses() {
        let err = HttpError::from_status("OpenWeather", StatusCode::UNAUTHORIZED, "bad key");
        assert!(matches!(err, HttpError::BadCredentials { .. }));

        let err = HttpError::from_status("OpenWeather", StatusCode::TOO_MANY_REQUESTS, "");
        assert!(matches!(err, HttpError::QuotaExceeded { .. }));
        assert!(err.to_string().contains("quota exceeded"));

        let err = HttpError::from_status("feed", StatusCode::BAD_GATEWAY, "oops");
        assert!(matches!(err, HttpError::Status { .. }));
    }

    #[test]
    fn long_bodies_are_truncated_on_char_boundaries() {
        let body = "é".repeat(300);
        let short = truncate_body(&body);

        assert!(short.ends_with("..."));
        assert_eq!(short.chars().count(), 203);
        assert_eq!(truncate_body("short"), "short");
    }
}
