//! Tunnelling the WebSocket TCP stream through an HTTP or SOCKS5 proxy.

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use secrecy::{ExposeSecret as _, SecretString};
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
use tokio::net::TcpStream;

use super::error::WsError;
use crate::Result;
use crate::error::Error;
use crate::types::Url;

const DEFAULT_HTTP_PROXY_PORT: u16 = 80;
const DEFAULT_SOCKS_PROXY_PORT: u16 = 1080;

/// Upper bound for the proxy's reply to a `CONNECT` request.
const MAX_CONNECT_RESPONSE: usize = 8 * 1024;

const SOCKS_VERSION: u8 = 0x05;
const SOCKS_NO_AUTH: u8 = 0x00;
const SOCKS_USERNAME_PASSWORD: u8 = 0x02;
const SOCKS_NO_ACCEPTABLE_METHOD: u8 = 0xFF;
const SOCKS_CMD_CONNECT: u8 = 0x01;
const SOCKS_ATYP_IPV4: u8 = 0x01;
const SOCKS_ATYP_DOMAIN: u8 = 0x03;
const SOCKS_ATYP_IPV6: u8 = 0x04;

#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ProxyProtocol {
    /// HTTP/1.1 `CONNECT` tunnel
    Http,
    /// SOCKS version 5
    Socks5,
}

#[non_exhaustive]
#[derive(Clone)]
pub struct ProxyAuth {
    pub username: String,
    pub password: SecretString,
}

impl ProxyAuth {
    #[must_use]
    pub fn new(username: String, password: String) -> Self {
        Self {
            username,
            password: SecretString::from(password),
        }
    }
}

impl fmt::Debug for ProxyAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyAuth")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Proxy through which every connection of a session is routed.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub protocol: ProxyProtocol,
    pub host: String,
    pub port: u16,
    pub auth: Option<ProxyAuth>,
}

impl ProxyConfig {
    #[must_use]
    pub fn new<S: Into<String>>(protocol: ProxyProtocol, host: S, port: u16) -> Self {
        Self {
            protocol,
            host: host.into(),
            port,
            auth: None,
        }
    }

    /// Parse `http://[user:password@]host[:port]` or `socks5://[user:password@]host[:port]`.
    pub fn from_url(url: &str) -> Result<Self> {
        let url = Url::parse(url)?;
        let (protocol, default_port) = match url.scheme() {
            "http" => (ProxyProtocol::Http, DEFAULT_HTTP_PROXY_PORT),
            "socks5" | "socks5h" => (ProxyProtocol::Socks5, DEFAULT_SOCKS_PROXY_PORT),
            other => return Err(Error::validation(format!("unsupported proxy scheme: {other}"))),
        };
        let host = url
            .host_str()
            .ok_or_else(|| Error::validation("proxy url has no host"))?;

        let mut proxy = Self::new(protocol, host, url.port().unwrap_or(default_port));
        if !url.username().is_empty() {
            proxy.auth = Some(ProxyAuth::new(
                url.username().to_owned(),
                url.password().unwrap_or_default().to_owned(),
            ));
        }

        Ok(proxy)
    }

    #[must_use]
    pub fn with_auth(mut self, auth: ProxyAuth) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Open a TCP stream to the proxy and ask it to relay to `host:port`.
    pub(crate) async fn tunnel(&self, host: &str, port: u16) -> Result<TcpStream> {
        let mut stream = TcpStream::connect((self.host.as_str(), self.port)).await?;

        match self.protocol {
            ProxyProtocol::Http => http_connect(&mut stream, self.auth.as_ref(), host, port).await?,
            ProxyProtocol::Socks5 => {
                socks5_connect(&mut stream, self.auth.as_ref(), host, port).await?;
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(proxy = %self.protocol, %host, port, "proxy tunnel established");

        Ok(stream)
    }
}

async fn http_connect(
    stream: &mut TcpStream,
    auth: Option<&ProxyAuth>,
    host: &str,
    port: u16,
) -> Result<()> {
    let mut request = format!("CONNECT {host}:{port} HTTP/1.1\r\nHost: {host}:{port}\r\n");
    if let Some(auth) = auth {
        let credentials = format!("{}:{}", auth.username, auth.password.expose_secret());
        request.push_str("Proxy-Authorization: Basic ");
        request.push_str(&STANDARD.encode(credentials));
        request.push_str("\r\n");
    }
    request.push_str("\r\n");
    stream.write_all(request.as_bytes()).await?;

    let mut response = Vec::with_capacity(256);
    let mut byte = [0_u8; 1];
    // Read byte-wise so nothing past the header block is consumed from the tunnel
    while !response.ends_with(b"\r\n\r\n") {
        if response.len() >= MAX_CONNECT_RESPONSE {
            return Err(WsError::Proxy("CONNECT response headers too large".to_owned()).into());
        }
        if stream.read(&mut byte).await? == 0 {
            return Err(WsError::Proxy("proxy closed the connection during CONNECT".to_owned()).into());
        }
        response.push(byte[0]);
    }

    let head = String::from_utf8_lossy(&response);
    let status_line = head.lines().next().unwrap_or_default();
    if status_line.split_whitespace().nth(1) == Some("200") {
        Ok(())
    } else {
        Err(WsError::Proxy(format!("CONNECT rejected: {status_line}")).into())
    }
}

async fn socks5_connect(
    stream: &mut TcpStream,
    auth: Option<&ProxyAuth>,
    host: &str,
    port: u16,
) -> Result<()> {
    let greeting: &[u8] = if auth.is_some() {
        &[SOCKS_VERSION, 2, SOCKS_NO_AUTH, SOCKS_USERNAME_PASSWORD]
    } else {
        &[SOCKS_VERSION, 1, SOCKS_NO_AUTH]
    };
    stream.write_all(greeting).await?;

    let mut choice = [0_u8; 2];
    stream.read_exact(&mut choice).await?;
    if choice[0] != SOCKS_VERSION {
        return Err(WsError::Proxy(format!("unexpected SOCKS version {}", choice[0])).into());
    }

    match (choice[1], auth) {
        (SOCKS_NO_AUTH, _) => {}
        (SOCKS_USERNAME_PASSWORD, Some(auth)) => socks5_authenticate(stream, auth).await?,
        (SOCKS_NO_ACCEPTABLE_METHOD, _) => {
            return Err(WsError::Proxy("no acceptable SOCKS authentication method".to_owned()).into());
        }
        (method, _) => {
            return Err(WsError::Proxy(format!("unsupported SOCKS method {method:#04x}")).into());
        }
    }

    let host_len = u8::try_from(host.len())
        .map_err(|_e| WsError::Proxy(format!("host name too long for SOCKS5: {host}")))?;
    let mut request = Vec::with_capacity(7 + host.len());
    request.extend_from_slice(&[SOCKS_VERSION, SOCKS_CMD_CONNECT, 0x00, SOCKS_ATYP_DOMAIN, host_len]);
    request.extend_from_slice(host.as_bytes());
    request.extend_from_slice(&port.to_be_bytes());
    stream.write_all(&request).await?;

    let mut reply = [0_u8; 4];
    stream.read_exact(&mut reply).await?;
    if reply[1] != 0x00 {
        return Err(WsError::Proxy(format!("SOCKS5 connect failed with reply code {}", reply[1])).into());
    }

    // Discard the bound address, whose length depends on its type
    let remaining = match reply[3] {
        SOCKS_ATYP_IPV4 => 4 + 2,
        SOCKS_ATYP_IPV6 => 16 + 2,
        SOCKS_ATYP_DOMAIN => {
            let mut len = [0_u8; 1];
            stream.read_exact(&mut len).await?;
            usize::from(len[0]) + 2
        }
        other => {
            return Err(WsError::Proxy(format!("unknown SOCKS5 address type {other}")).into());
        }
    };
    let mut bound = vec![0_u8; remaining];
    stream.read_exact(&mut bound).await?;

    Ok(())
}

async fn socks5_authenticate(stream: &mut TcpStream, auth: &ProxyAuth) -> Result<()> {
    let username = auth.username.as_bytes();
    let password = auth.password.expose_secret().as_bytes();
    let (Ok(username_len), Ok(password_len)) =
        (u8::try_from(username.len()), u8::try_from(password.len()))
    else {
        return Err(WsError::Proxy("SOCKS5 credentials longer than 255 bytes".to_owned()).into());
    };

    let mut request = Vec::with_capacity(3 + username.len() + password.len());
    request.push(0x01);
    request.push(username_len);
    request.extend_from_slice(username);
    request.push(password_len);
    request.extend_from_slice(password);
    stream.write_all(&request).await?;

    let mut status = [0_u8; 2];
    stream.read_exact(&mut status).await?;
    if status[1] == 0x00 {
        Ok(())
    } else {
        Err(WsError::Proxy("SOCKS5 authentication rejected".to_owned()).into())
    }
}
