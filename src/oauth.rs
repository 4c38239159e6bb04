//! The sign-in flow: send the user to GitHub's authorization page, catch the
//! redirect on a local listener, trade the one-time code for a bearer token.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::Error;
use crate::token::TokenStore;

/// Where to send the user agent to authorize this app.
pub fn authorize_url(cfg: &Config) -> String {
    format!(
        "{}/login/oauth/authorize?client_id={}&redirect_uri={}&scope={}",
        cfg.auth_base,
        cfg.client_id,
        urlencoding::encode(&cfg.redirect_uri),
        urlencoding::encode(&cfg.scope),
    )
}

#[derive(Serialize)]
struct ExchangeRequest<'a> {
    client_id: &'a str,
    code: &'a str,
    redirect_uri: &'a str,
}

#[derive(Deserialize)]
struct ExchangeResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Trade the one-time authorization code for a bearer token.
///
/// No client secret is sent, mirroring a public OAuth client: GitHub only
/// honors this for apps configured without one, and a confidential app's
/// secret must never ship in a client-side tool like this.
pub async fn exchange_code(
    http: &reqwest::Client,
    cfg: &Config,
    code: &str,
) -> crate::error::Result<String> {
    let resp = http
        .post(format!("{}/login/oauth/access_token", cfg.auth_base))
        .header("Accept", "application/json")
        .json(&ExchangeRequest {
            client_id: &cfg.client_id,
            code,
            redirect_uri: &cfg.redirect_uri,
        })
        .send()
        .await?;

    if !resp.status().is_success() {
        let status = resp.status();
        warn!(%status, "token endpoint returned non-success");
        return Err(Error::AuthExchange {
            message: format!("token endpoint returned {status}"),
        });
    }

    let body: ExchangeResponse = resp.json().await.map_err(|e| Error::AuthExchange {
        message: format!("malformed token endpoint response: {e}"),
    })?;

    match body.access_token {
        Some(token) if !token.is_empty() => {
            debug!("token exchange succeeded");
            Ok(token)
        }
        _ => {
            let message = body
                .error_description
                .or(body.error)
                .unwrap_or_else(|| "response carried no access_token".to_string());
            warn!("token exchange rejected: {message}");
            Err(Error::AuthExchange { message })
        }
    }
}

/// Exchange the code and persist the token. The store is only written after
/// a successful exchange; a rejected code leaves it untouched.
pub async fn complete_from_callback(
    http: &reqwest::Client,
    cfg: &Config,
    store: &TokenStore,
    code: &str,
) -> Result<String> {
    let token = exchange_code(http, cfg, code).await?;
    store.save(&token)?;
    Ok(token)
}

/// Accept exactly one HTTP request on the redirect URI's host:port and pull
/// the `code` query parameter out of it.
pub async fn wait_for_callback(redirect_uri: &str) -> Result<String> {
    let addr = callback_addr(redirect_uri)?;
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to listen on {addr} for the OAuth callback"))?;

    let (mut stream, peer) = listener.accept().await?;
    debug!(%peer, "callback connection accepted");

    let mut buf = vec![0u8; 4096];
    let n = stream.read(&mut buf).await?;
    let request = String::from_utf8_lossy(&buf[..n]);
    let code = extract_code(&request);

    // Static page only. Echoing the code back would leave it in the page
    // source, where a reload could resubmit it.
    let page = match code {
        Some(_) => "<html><body><p>Signed in. You can close this tab.</p></body></html>",
        None => "<html><body><p>Authorization failed: no code received.</p></body></html>",
    };
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        page.len(),
        page
    );
    stream.write_all(response.as_bytes()).await?;

    code.context("callback request carried no code parameter")
}

/// `http://localhost:8080/callback` → `127.0.0.1:8080`.
fn callback_addr(redirect_uri: &str) -> Result<String> {
    let rest = redirect_uri
        .strip_prefix("http://")
        .context("redirect URI must be http:// to host the local callback")?;
    let host_port = rest.split('/').next().unwrap_or(rest);
    let (host, port) = match host_port.split_once(':') {
        Some((h, p)) => (
            h,
            p.parse::<u16>()
                .with_context(|| format!("invalid port in redirect URI: {p}"))?,
        ),
        None => (host_port, 80),
    };
    let host = if host == "localhost" { "127.0.0.1" } else { host };
    Ok(format!("{host}:{port}"))
}

fn extract_code(request: &str) -> Option<String> {
    let line = request.lines().next()?;
    let target = line.split_whitespace().nth(1)?;
    let query = target.split_once('?')?.1;
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == "code").then(|| v.to_string())
    })
}
