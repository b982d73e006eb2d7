/// Content API connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Base URL of the content API
    pub api_url: String,
    /// Bearer token, if the API requires one
    pub token: Option<String>,
}

impl Config {
    /// Build configuration from the parsed `--api-url` and `--token` values.
    ///
    /// Both fall back to `EUREKA_API_URL` / `EUREKA_API_TOKEN` at parse time.
    /// A blank URL counts as missing and an empty token as none.
    pub fn resolve(api_url: Option<String>, token: Option<String>) -> Result<Self, ConfigError> {
        let api_url = api_url
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::MissingApiUrl)?;
        let token = token.filter(|token| !token.is_empty());

        Ok(Self { api_url, token })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("EUREKA_API_URL environment variable not set (or pass --api-url)")]
    MissingApiUrl,
}
