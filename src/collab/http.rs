// ABOUTME: Minimal HTTP/1.1 client over a plain TCP connection.
// ABOUTME: Shared by the webhook trigger and the HTTP health probe.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use std::time::Duration;
use tokio::net::TcpStream;

use super::CollaboratorError;

/// Status and body of a completed request.
#[derive(Debug)]
pub(crate) struct HttpResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

/// Parse and validate an `http://` URL.
pub(crate) fn parse_url(url: &str) -> Result<Uri, CollaboratorError> {
    let invalid = |reason: &str| CollaboratorError::InvalidUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    };
    let uri: Uri = url.parse().map_err(|_| invalid("not a valid URL"))?;
    match uri.scheme_str() {
        Some("http") => {}
        Some(_) => return Err(invalid("only http:// URLs are supported")),
        None => return Err(invalid("missing scheme")),
    }
    if uri.host().is_none() {
        return Err(invalid("missing host"));
    }
    Ok(uri)
}

/// Send one request and read the whole response within `timeout`.
pub(crate) async fn send(
    method: Method,
    uri: &Uri,
    body: Bytes,
    timeout: Duration,
) -> Result<HttpResponse, CollaboratorError> {
    tokio::time::timeout(timeout, send_inner(method, uri, body))
        .await
        .map_err(|_| CollaboratorError::Http {
            url: uri.to_string(),
            reason: format!("no response within {:?}", timeout),
        })?
}

async fn send_inner(
    method: Method,
    uri: &Uri,
    body: Bytes,
) -> Result<HttpResponse, CollaboratorError> {
    let http_err = |reason: String| CollaboratorError::Http {
        url: uri.to_string(),
        reason,
    };

    let host = uri.host().unwrap_or("localhost");
    let port = uri.port_u16().unwrap_or(80);
    let stream = TcpStream::connect((host, port))
        .await
        .map_err(|e| http_err(format!("connection failed: {}", e)))?;

    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .map_err(|e| http_err(format!("HTTP handshake failed: {}", e)))?;
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            tracing::debug!("http connection closed with error: {}", e);
        }
    });

    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    let authority = uri
        .authority()
        .map(|a| a.as_str().to_string())
        .unwrap_or_else(|| host.to_string());
    let req = Request::builder()
        .method(method)
        .uri(path)
        .header(hyper::header::HOST, authority)
        .header(hyper::header::USER_AGENT, concat!("hoist/", env!("CARGO_PKG_VERSION")))
        .body(Full::new(body))
        .map_err(|e| http_err(format!("failed to build request: {}", e)))?;

    let resp = sender
        .send_request(req)
        .await
        .map_err(|e| http_err(format!("request failed: {}", e)))?;
    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .map_err(|e| http_err(format!("failed to read response: {}", e)))?
        .to_bytes();

    Ok(HttpResponse { status, body })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_http_url() {
        let uri = parse_url("http://staging.internal:8080/healthz").unwrap();
        assert_eq!(uri.host(), Some("staging.internal"));
        assert_eq!(uri.port_u16(), Some(8080));
    }

    #[test]
    fn rejects_https_and_relative_urls() {
        assert!(matches!(
            parse_url("https://example.com/"),
            Err(CollaboratorError::InvalidUrl { .. })
        ));
        assert!(parse_url("/healthz").is_err());
    }
}
