use std::fmt;
use std::path::PathBuf;

use futures::{stream, StreamExt, TryStreamExt};
use log::info;
use reqwest::Client;
use tokio::io::AsyncReadExt;
use url::Url;

use crate::error::{BenchlogError, Result};

const CONCURRENCY: usize = 4;

/// Where a payload or history document is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Stdin,
    File(PathBuf),
    Url(Url),
}

impl Source {
    /// `-` is stdin, `http(s)://` is a URL, anything else a file path.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw == "-" {
            return Ok(Self::Stdin);
        }

        if raw.starts_with("http://") || raw.starts_with("https://") {
            let url = Url::parse(raw)
                .map_err(|e| BenchlogError::Config(format!("Invalid source URL `{raw}`: {e}")))?;
            return Ok(Self::Url(url));
        }

        Ok(Self::File(PathBuf::from(raw)))
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdin => write!(f, "<stdin>"),
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Url(url) => write!(f, "{url}"),
        }
    }
}

/// Bearer token for URL sources. Never printed.
pub struct Token(String);

impl Token {
    /// Trims `raw`. A blank value, such as an exported but empty
    /// `BENCHLOG_TOKEN`, means no token.
    pub fn parse(raw: &str) -> Option<Self> {
        let token = raw.trim();
        (!token.is_empty()).then(|| Self(token.to_owned()))
    }

    fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<redacted>")
    }
}

pub struct SourceLoader {
    client: Client,
    token: Option<Token>,
}

impl SourceLoader {
    pub fn new(token: Option<Token>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("benchlog/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BenchlogError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, token })
    }

    /// Helper to build authenticated requests
    fn auth_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = &self.token {
            request.bearer_auth(token.as_str())
        } else {
            request
        }
    }

    pub async fn load(&self, source: &Source) -> Result<String> {
        info!("Reading {source}");

        match source {
            Source::Stdin => {
                let mut text = String::new();
                tokio::io::stdin().read_to_string(&mut text).await?;
                Ok(text)
            }
            Source::File(path) => Ok(tokio::fs::read_to_string(path).await?),
            Source::Url(url) => {
                let request = self.auth_request(self.client.get(url.clone()));
                let response = request.send().await?.error_for_status()?;
                Ok(response.text().await?)
            }
        }
    }

    /// Loads every source, keeping the input order.
    pub async fn load_all(&self, sources: &[Source]) -> Result<Vec<String>> {
        stream::iter(sources)
            .map(|source| self.load(source))
            .buffered(CONCURRENCY)
            .try_collect()
            .await
    }
}
