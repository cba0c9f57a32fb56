use std::sync::Arc;

use bon::Builder;
use secrecy::SecretString;
use url::Url;

use super::endpoint::{DEFAULT_USER_AGENT, Endpoint, StreamKind};
use crate::Result;
use crate::error::Error;
use crate::ws::Session;
use crate::ws::config::Config as WsConfig;
use crate::ws::proxy::ProxyConfig;

/// Settings shared by every socket a [`Client`] opens.
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct Config {
    /// Token appended to the streaming URL; required to open a socket
    #[builder(into)]
    pub access_token: Option<SecretString>,
    #[builder(default = DEFAULT_USER_AGENT.to_owned(), into)]
    pub user_agent: String,
    pub proxy: Option<ProxyConfig>,
    /// Liveness and reconnection settings
    #[builder(default)]
    pub ws: WsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Factory for streaming sockets on one server.
///
/// # Example
///
/// ```rust, no_run
/// use fedi_streaming::streaming::{Client, Config, Event, StreamKind};
/// use futures::StreamExt as _;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = Config::builder().access_token("token").build();
///     let client = Client::new("https://example.social/api/v1", config)?;
///
///     let session = client.socket(StreamKind::User, None)?;
///     let mut events = Box::pin(session.events());
///
///     while let Some(event) = events.next().await {
///         if let Event::Update(status) = event? {
///             println!("{}", status.content);
///         }
///     }
///
///     Ok(())
/// }
/// ```
#[derive(Clone, Debug)]
pub struct Client {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
    base_url: Url,
    config: Config,
}

impl Client {
    /// Create a client for the server at `base_url` (`http`, `https`, `ws` or `wss`).
    pub fn new(base_url: &str, config: Config) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        if !matches!(base_url.scheme(), "http" | "https" | "ws" | "wss") {
            return Err(Error::validation(format!(
                "unsupported scheme for streaming: {}",
                base_url.scheme()
            )));
        }
        if base_url.host_str().is_none() {
            return Err(Error::validation("base url has no host"));
        }

        Ok(Self {
            inner: Arc::new(ClientInner { base_url, config }),
        })
    }

    /// `{base}/streaming`, with `http` and `https` mapped to `ws` and `wss`.
    pub fn streaming_url(&self) -> Result<Url> {
        let mut url = self.inner.base_url.clone();

        let scheme = match url.scheme() {
            "http" => Some("ws"),
            "https" => Some("wss"),
            _ => None,
        };
        if let Some(scheme) = scheme {
            url.set_scheme(scheme)
                .map_err(|()| Error::validation(format!("cannot switch scheme to {scheme}")))?;
        }

        let path = format!("{}/streaming", url.path().trim_end_matches('/'));
        url.set_path(&path);
        url.set_query(None);
        url.set_fragment(None);

        Ok(url)
    }

    /// Open a socket on `stream` and start it.
    ///
    /// Fails without connecting when no access token is configured, or when
    /// [`StreamKind::List`] is requested without a list id.
    pub fn socket(&self, stream: StreamKind, list_id: Option<String>) -> Result<Session> {
        let endpoint = self.endpoint(stream, list_id)?;
        let session = Session::new(endpoint, self.inner.config.ws.clone());
        session.start()?;

        Ok(session)
    }

    fn endpoint(&self, stream: StreamKind, list_id: Option<String>) -> Result<Endpoint> {
        let config = &self.inner.config;
        let Some(token) = config.access_token.clone() else {
            return Err(Error::validation("accessToken is required"));
        };

        let mut endpoint = Endpoint::new(self.streaming_url()?, stream, list_id)?
            .with_access_token(token)
            .with_user_agent(config.user_agent.clone());
        if let Some(proxy) = &config.proxy {
            endpoint = endpoint.with_proxy(proxy.clone());
        }

        Ok(endpoint)
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }
}
