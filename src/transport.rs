// ABOUTME: Blocking HTTP transport shared by both service clients
// ABOUTME: Builds requests, checks status, decodes JSON or bytes, scrapes CSRF tokens

use crate::{config::Connection, Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::COOKIE;
use reqwest::Method;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

static CSRF_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"data-csrftoken="([^"]*)""#).expect("valid csrf pattern"));

fn truncate_str(s: &str, max_chars: usize) -> String {
    if s.len() <= max_chars {
        return s.to_string();
    }

    // Find a valid UTF-8 boundary at or before max_chars
    let mut boundary = max_chars;
    while boundary > 0 && !s.is_char_boundary(boundary) {
        boundary -= 1;
    }

    if boundary == 0 {
        return String::new();
    }

    format!("{}...", &s[..boundary])
}

/// Pulls the `data-csrftoken` attribute out of a rendered page.
pub fn extract_csrf_token(html: &str) -> String {
    CSRF_TOKEN
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

pub struct Transport {
    client: Client,
    connection: Connection,
}

impl Transport {
    pub fn new(connection: Connection) -> Result<Self> {
        let mut builder = Client::builder()
            .user_agent(concat!("wikiport/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(!connection.verify_tls);
        if let Some(secs) = connection.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Transport {
            client: builder.build()?,
            connection,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn token(&self) -> &str {
        &self.connection.token
    }

    pub fn cookie(&self) -> Option<&str> {
        self.connection.session_cookie()
    }

    /// Absolute URL for a path rooted at the service origin.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.connection.origin(), path)
        } else {
            format!("{}/{}", self.connection.origin(), path)
        }
    }

    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = self.url(path);
        debug!(method = method.as_str(), url = url.as_str(), "request");
        self.client.request(method, url)
    }

    /// Same as [`Transport::request`] with the session cookie attached.
    pub fn session_request(&self, method: Method, path: &str, cookie: &str) -> RequestBuilder {
        self.request(method, path).header(COOKIE, cookie)
    }

    pub fn send_json<T: DeserializeOwned>(&self, endpoint: &str, request: RequestBuilder) -> Result<T> {
        let response = checked(endpoint, request)?;

        // Get response text for better error messages
        let body = response.text()?;
        serde_json::from_str(&body).map_err(|e| {
            debug!(
                endpoint,
                "failed to parse response: {} (body: {})",
                e,
                truncate_str(&body, 500)
            );
            Error::Parse(e)
        })
    }

    pub fn send_bytes(&self, endpoint: &str, request: RequestBuilder) -> Result<Vec<u8>> {
        let response = checked(endpoint, request)?;
        Ok(response.bytes()?.to_vec())
    }

    /// Fetches `page_path` with the session cookie and returns its CSRF token,
    /// or an empty string when there is no cookie or no token on the page.
    pub fn csrf_token(&self, page_path: &str) -> Result<String> {
        let Some(cookie) = self.cookie() else {
            return Ok(String::new());
        };

        let request = self.session_request(Method::GET, page_path, cookie);
        let response = checked(page_path, request)?;
        Ok(extract_csrf_token(&response.text()?))
    }
}

fn checked(endpoint: &str, request: RequestBuilder) -> Result<reqwest::blocking::Response> {
    let response = request.send()?;

    let status = response.status();
    if !status.is_success() {
        let message = response.text().unwrap_or_default();
        let preview = truncate_str(&message, 100);
        return Err(Error::Api {
            endpoint: endpoint.into(),
            status: status.as_u16(),
            message: preview,
        });
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_str_short() {
        assert_eq!(truncate_str("hello", 100), "hello");
    }

    #[test]
    fn test_truncate_str_long() {
        let result = truncate_str("hello world", 7);
        assert!(result.starts_with("hello"));
        assert!(result.ends_with("..."));
    }

    #[test]
    fn test_truncate_str_utf8() {
        let text = "Hello 世界 World";
        let result = truncate_str(text, 7);
        assert_eq!(result, "Hello ...");
    }

    #[test]
    fn test_extract_csrf_token() {
        let html = r#"<body data-csrftoken="abc-123" data-other="x">"#;
        assert_eq!(extract_csrf_token(html), "abc-123");
    }

    #[test]
    fn test_extract_csrf_token_missing() {
        assert_eq!(extract_csrf_token("<body>"), "");
        assert_eq!(extract_csrf_token(r#"<body data-csrftoken="unterminated>"#), "");
    }

    #[test]
    fn test_url_joining() {
        let conn = Connection::new("wiki.local", "t").with_scheme("http");
        let transport = Transport::new(conn).unwrap();
        assert_eq!(transport.url("/_api/pages.get"), "http://wiki.local/_api/pages.get");
        assert_eq!(transport.url("api/groups"), "http://wiki.local/api/groups");
    }

    #[test]
    fn test_csrf_without_cookie_is_empty() {
        let transport = Transport::new(Connection::new("127.0.0.1:9", "t")).unwrap();
        assert_eq!(transport.csrf_token("/").unwrap(), "");
    }
}
