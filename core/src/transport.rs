//! Blocking HTTP execution of `HttpRequest` values.

use std::fmt;
use std::time::Duration;

use ureq::{Agent, RequestBuilder};

use crate::error::{CrowdError, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Performs one HTTP exchange.
///
/// Any status code the server answers with is a successful `execute`; only
/// failures below HTTP (connect, DNS, TLS, timeout, reading the body) are
/// errors, reported as `CrowdError::Transport`. A body that is not valid
/// UTF-8 still yields a response; it is decoded lossily and left for the
/// protocol layer to reject.
pub trait Transport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// `ureq`-backed transport. No retries; redirects follow ureq's defaults.
#[derive(Clone)]
pub struct UreqTransport {
    agent: Agent,
}

impl UreqTransport {
    /// `timeout` bounds a whole exchange, from connect to the end of the body.
    pub fn new(timeout: Option<Duration>) -> Self {
        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(timeout)
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(None)
    }
}

impl fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UreqTransport").finish_non_exhaustive()
    }
}

fn with_headers<B>(mut builder: RequestBuilder<B>, headers: &[(String, String)]) -> RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let url = request.url.as_str();
        let sent = match request.method {
            HttpMethod::Get => with_headers(self.agent.get(url), &request.headers).call(),
            HttpMethod::Delete => with_headers(self.agent.delete(url), &request.headers).call(),
            HttpMethod::Post => {
                let builder = with_headers(self.agent.post(url), &request.headers);
                match request.body.as_deref() {
                    Some(body) => builder.send(body),
                    None => builder.send_empty(),
                }
            }
        };
        let mut response = sent.map_err(|e| {
            tracing::warn!(method = %request.method, url, error = %e, "Crowd request failed");
            CrowdError::Transport(e.to_string())
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let bytes = response
            .body_mut()
            .read_to_vec()
            .map_err(|e| CrowdError::Transport(format!("failed to read response body: {e}")))?;
        let body = match String::from_utf8(bytes) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(status, url, "Crowd response body is not valid UTF-8");
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            }
        };

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;

    use super::*;

    /// Answer a single connection with `status` and the raw `body` bytes.
    fn respond_once(status: &str, body: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let status = status.to_string();
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let head = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            stream.write_all(head.as_bytes()).unwrap();
            stream.write_all(body).unwrap();
        });
        format!("http://{addr}/crowd")
    }

    fn get(url: String) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    #[test]
    fn invalid_utf8_body_keeps_the_status() {
        let transport = UreqTransport::new(Some(Duration::from_secs(5)));
        let response = transport
            .execute(&get(respond_once("500 Internal Server Error", &[0xff, 0xfe])))
            .unwrap();
        assert_eq!(response.status, 500);
        assert_eq!(response.body, "\u{fffd}\u{fffd}");

        let response = transport
            .execute(&get(respond_once("200 OK", &[0xff, 0xfe, b'<', b'x'])))
            .unwrap();
        assert_eq!(response.status, 200);
        assert!(response.body.ends_with("<x"));
    }

    #[test]
    fn connection_refused_is_a_transport_error() {
        // Bind then drop to get a local port with nothing listening on it.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let transport = UreqTransport::new(Some(Duration::from_secs(2)));
        let request = HttpRequest {
            method: HttpMethod::Get,
            url: format!("http://127.0.0.1:{port}/crowd"),
            headers: Vec::new(),
            body: None,
        };
        let err = transport.execute(&request).unwrap_err();
        assert!(matches!(err, CrowdError::Transport(_)));
    }
}
