use std::path::PathBuf;

use reqwest::Url;

/// Endpoint used when neither a flag nor the environment names one.
pub const DEFAULT_SPACE_URL: &str = "https://daveyRI-SAM4.hf.space";

/// Uploads larger than this are rejected before reaching a handler.
pub const DEFAULT_BODY_LIMIT: usize = 50 * 1024 * 1024;

/// Environment variables consulted by [`RelayConfig::from_env`], in priority order.
pub const SPACE_URL_VARS: [&str; 2] = ["HF_SPACE_URL", "NEXT_PUBLIC_HF_SPACE_URL"];
pub const TOKEN_VAR: &str = "HF_TOKEN";

/// Settings shared by every request, built once at startup.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Base URL of the remote inference endpoint, without a trailing slash.
    pub space_url: String,
    /// Bearer credential for private endpoints.
    pub token: Option<String>,
    /// Directory where uploads are staged.
    pub temp_dir: PathBuf,
    pub body_limit: usize,
    /// Directory with the browser front-end, served for unknown paths.
    pub static_dir: Option<PathBuf>,
    pub permissive_cors: bool,
}

impl RelayConfig {
    pub fn new(space_url: impl Into<String>) -> Self {
        Self {
            space_url: String::new(),
            token: None,
            temp_dir: std::env::temp_dir(),
            body_limit: DEFAULT_BODY_LIMIT,
            static_dir: None,
            permissive_cors: false,
        }
        .with_space_url(space_url)
    }

    /// Reads the endpoint and credential from the process environment.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let space_url = SPACE_URL_VARS
            .into_iter()
            .filter_map(|key| lookup(key))
            .find(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SPACE_URL.to_string());

        Self::new(space_url).with_token(lookup(TOKEN_VAR))
    }

    pub fn with_space_url(mut self, space_url: impl Into<String>) -> Self {
        self.space_url = space_url.into().trim().trim_end_matches('/').to_string();
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    pub fn with_static_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.static_dir = dir;
        self
    }

    pub fn with_permissive_cors(mut self, enabled: bool) -> Self {
        self.permissive_cors = enabled;
        self
    }

    /// Host of the remote endpoint, if the URL parses.
    pub fn space_host(&self) -> Option<String> {
        Url::parse(&self.space_url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_ascii_lowercase))
    }

    /// The credential to present when fetching `target`.
    ///
    /// Only resources on the endpoint's own host get the token.
    pub fn credential_for(&self, target: &Url) -> Option<&str> {
        let token = self.token.as_deref()?;
        let host = target.host_str()?.to_ascii_lowercase();
        (self.space_host()? == host).then_some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = RelayConfig::from_vars(lookup(&[]));
        assert_eq!(config.space_url, DEFAULT_SPACE_URL);
        assert!(config.token.is_none());
        assert_eq!(config.body_limit, DEFAULT_BODY_LIMIT);
    }

    #[test]
    fn first_non_empty_variable_wins() {
        let config = RelayConfig::from_vars(lookup(&[
            ("HF_SPACE_URL", "  "),
            ("NEXT_PUBLIC_HF_SPACE_URL", "https://me-sam.hf.space/"),
            ("HF_TOKEN", "hf_secret"),
        ]));
        assert_eq!(config.space_url, "https://me-sam.hf.space");
        assert_eq!(config.token.as_deref(), Some("hf_secret"));
    }

    #[test]
    fn blank_token_is_ignored() {
        let config = RelayConfig::new("https://a.hf.space").with_token(Some(" ".into()));
        assert!(config.token.is_none());
    }

    #[test]
    fn credential_only_for_endpoint_host() {
        let config = RelayConfig::new("https://Me-Sam.hf.space").with_token(Some("hf_x".into()));
        let own = Url::parse("https://me-sam.hf.space/gradio_api/file=/tmp/a.png").unwrap();
        let other = Url::parse("https://example.com/a.png").unwrap();
        assert_eq!(config.credential_for(&own), Some("hf_x"));
        assert_eq!(config.credential_for(&other), None);
    }
}
