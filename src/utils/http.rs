// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use crate::error::Result;
use crate::models::HttpConfig;

/// Create a configured asynchronous HTTP client with a request timeout.
pub fn create_async_client(config: &HttpConfig, timeout_secs: u64) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(timeout_secs))
        .build()?;
    Ok(client)
}

/// Shorten a response body for inclusion in an error message.
pub fn body_excerpt(body: &str) -> String {
    const MAX: usize = 200;
    let body = body.trim();
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_builds() {
        assert!(create_async_client(&HttpConfig::default(), 5).is_ok());
    }

    #[test]
    fn test_body_excerpt() {
        assert_eq!(body_excerpt("  error  "), "error");
        let long = "x".repeat(250);
        assert_eq!(body_excerpt(&long).len(), 203);
    }
}
