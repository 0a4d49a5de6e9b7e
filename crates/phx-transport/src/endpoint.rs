//! Where a transport connects to.

use std::collections::BTreeMap;

use phx_protocol::PROTOCOL_VERSION;
use url::Url;

use crate::TransportError;

/// The server URL plus the caller's connection parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: Url,
    params: BTreeMap<String, String>,
}

impl Endpoint {
    /// Creates an endpoint from an already parsed URL.
    pub fn new(url: Url, params: BTreeMap<String, String>) -> Self {
        Self { url, params }
    }

    /// Parses `url` into an endpoint with no parameters.
    ///
    /// # Errors
    /// Returns [`TransportError::InvalidEndpoint`] if `url` doesn't parse.
    pub fn parse(url: &str) -> Result<Self, TransportError> {
        let url = Url::parse(url)
            .map_err(|e| TransportError::InvalidEndpoint(format!("{url}: {e}")))?;
        Ok(Self::new(url, BTreeMap::new()))
    }

    /// Adds a connection parameter.
    pub fn with_param(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// The URL as configured, without connection parameters.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The URL scheme, used to pick a transport.
    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    /// The caller's connection parameters.
    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// The URL to actually dial.
    ///
    /// Appends the protocol version (`vsn`) and then every connection
    /// parameter to the query string. A caller-supplied `vsn` replaces
    /// the default one.
    pub fn connect_url(&self) -> Url {
        let mut url = self.url.clone();
        let vsn = self
            .params
            .get("vsn")
            .map_or(PROTOCOL_VERSION, String::as_str);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("vsn", vsn);
            for (key, value) in &self.params {
                if key != "vsn" {
                    query.append_pair(key, value);
                }
            }
        }
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_url_appends_version() {
        let endpoint = Endpoint::parse("ws://localhost/socket/websocket").unwrap();
        assert_eq!(
            endpoint.connect_url().as_str(),
            "ws://localhost/socket/websocket?vsn=1.0.0"
        );
        assert_eq!(endpoint.scheme(), "ws");
    }

    #[test]
    fn test_connect_url_appends_params_after_version() {
        let endpoint = Endpoint::parse("wss://example.com/socket/websocket")
            .unwrap()
            .with_param("user_id", "7")
            .with_param("token", "a b");
        assert_eq!(
            endpoint.connect_url().as_str(),
            "wss://example.com/socket/websocket?vsn=1.0.0&token=a+b&user_id=7"
        );
    }

    #[test]
    fn test_caller_vsn_overrides_default() {
        let endpoint = Endpoint::parse("ws://localhost/socket")
            .unwrap()
            .with_param("vsn", "2.0.0");
        assert_eq!(
            endpoint.connect_url().as_str(),
            "ws://localhost/socket?vsn=2.0.0"
        );
    }

    #[test]
    fn test_connect_url_leaves_configured_url_alone() {
        let endpoint = Endpoint::parse("ws://localhost/socket").unwrap();
        let _ = endpoint.connect_url();
        assert_eq!(endpoint.url().query(), None);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = Endpoint::parse("not a url").unwrap_err();
        assert!(matches!(err, TransportError::InvalidEndpoint(_)));
    }
}
