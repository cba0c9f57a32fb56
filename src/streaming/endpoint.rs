use secrecy::{ExposeSecret as _, SecretString};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::Result;
use crate::error::Error;
use crate::ws::proxy::ProxyConfig;

/// User agent sent when the caller does not configure one.
pub const DEFAULT_USER_AGENT: &str = concat!("fedi-streaming/", env!("CARGO_PKG_VERSION"));

/// Which timeline a session follows.
#[non_exhaustive]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum StreamKind {
    /// Home timeline and notifications of the authenticated user
    User,
    LocalTimeline,
    HybridTimeline,
    GlobalTimeline,
    /// Direct-message threads
    Conversation,
    /// A user-defined list; requires a list id
    List,
}

/// Immutable description of the stream a session connects to.
///
/// Every reconnection reuses the same descriptor.
#[derive(Debug, Clone)]
pub struct Endpoint {
    base_url: Url,
    stream: StreamKind,
    list_id: Option<String>,
    access_token: Option<SecretString>,
    user_agent: String,
    proxy: Option<ProxyConfig>,
}

impl Endpoint {
    /// Describe a stream under `base_url`, which must be a `ws` or `wss` URL.
    ///
    /// `list_id` is required for [`StreamKind::List`] and ignored otherwise.
    pub fn new(base_url: Url, stream: StreamKind, list_id: Option<String>) -> Result<Self> {
        if !matches!(base_url.scheme(), "ws" | "wss") {
            return Err(Error::validation(format!(
                "streaming endpoint must use ws or wss, got {}",
                base_url.scheme()
            )));
        }
        if base_url.host_str().is_none() {
            return Err(Error::validation("streaming endpoint has no host"));
        }

        let list_id = match stream {
            StreamKind::List => match list_id {
                Some(id) if !id.is_empty() => Some(id),
                _ => return Err(Error::validation("list id is required for the list stream")),
            },
            _ => None,
        };

        Ok(Self {
            base_url,
            stream,
            list_id,
            access_token: None,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            proxy: None,
        })
    }

    #[must_use]
    pub fn with_access_token(mut self, token: SecretString) -> Self {
        self.access_token = Some(token);
        self
    }

    #[must_use]
    pub fn with_user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Full request URL: `{base}/?stream=<kind>[&list=<id>][&access_token=<token>]`.
    ///
    /// The returned URL contains the access token in clear text.
    #[must_use]
    pub fn request_url(&self) -> Url {
        let mut url = self.base_url.clone();
        let path = format!("{}/", url.path().trim_end_matches('/'));
        url.set_path(&path);
        url.set_query(None);

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("stream", &self.stream.to_string());
            if let Some(list_id) = &self.list_id {
                query.append_pair("list", list_id);
            }
            if let Some(token) = &self.access_token {
                query.append_pair("access_token", token.expose_secret());
            }
        }

        url
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn stream(&self) -> StreamKind {
        self.stream
    }

    #[must_use]
    pub fn list_id(&self) -> Option<&str> {
        self.list_id.as_deref()
    }

    #[must_use]
    pub fn has_access_token(&self) -> bool {
        self.access_token.is_some()
    }

    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    #[must_use]
    pub fn proxy(&self) -> Option<&ProxyConfig> {
        self.proxy.as_ref()
    }
}
