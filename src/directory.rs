//! Directory client — resolves an organization identifier to its public members.

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::DirectoryConfig;
use crate::error::{ConfigError, LookupError};

/// Looks up the public members of an organization.
///
/// `Ok(vec![])` covers both "no public members" and "organization not found".
/// Every other failure is a `LookupError`.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn list_members(&self, identifier: &str) -> Result<Vec<String>, LookupError>;
}

/// Identifiers are restricted to the charset the extractor produces, so they
/// can be placed in a URL path without escaping.
pub fn is_valid_identifier(identifier: &str) -> bool {
    !identifier.is_empty()
        && identifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[derive(Debug, Deserialize)]
struct Member {
    login: String,
}

/// GitHub REST client for `GET /orgs/{org}/public_members`.
pub struct GitHubDirectory {
    client: reqwest::Client,
    base_url: String,
    token: Option<SecretString>,
    timeout: std::time::Duration,
    max_pages: u32,
    per_page: u32,
}

impl GitHubDirectory {
    pub fn new(config: &DirectoryConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("orgscan/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                key: "GITHUB_API_URL".to_string(),
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            timeout: config.timeout,
            max_pages: config.max_pages.max(1),
            per_page: config.per_page.clamp(1, 100),
        })
    }

    fn members_url(&self, identifier: &str) -> String {
        format!("{}/orgs/{identifier}/public_members", self.base_url)
    }

    fn request_error(&self, identifier: &str, e: reqwest::Error) -> LookupError {
        if e.is_timeout() {
            LookupError::Timeout {
                identifier: identifier.to_string(),
                timeout: self.timeout,
            }
        } else {
            LookupError::Request {
                identifier: identifier.to_string(),
                reason: e.to_string(),
            }
        }
    }

    /// Fetch one page. `None` means the organization does not exist.
    async fn fetch_page(
        &self,
        identifier: &str,
        page: u32,
    ) -> Result<Option<Vec<Member>>, LookupError> {
        let mut request = self
            .client
            .get(self.members_url(identifier))
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .query(&[("per_page", self.per_page), ("page", page)]);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let resp = request
            .send()
            .await
            .map_err(|e| self.request_error(identifier, e))?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let members = resp
                    .json::<Vec<Member>>()
                    .await
                    .map_err(|e| {
                        if e.is_timeout() {
                            self.request_error(identifier, e)
                        } else {
                            LookupError::Decode {
                                identifier: identifier.to_string(),
                                reason: e.to_string(),
                            }
                        }
                    })?;
                Ok(Some(members))
            }
            status => {
                let body = resp.text().await.unwrap_or_default();
                warn!(
                    identifier,
                    status = status.as_u16(),
                    body = %body.chars().take(200).collect::<String>(),
                    "Directory lookup failed"
                );
                Err(LookupError::Status {
                    identifier: identifier.to_string(),
                    status: status.as_u16(),
                })
            }
        }
    }
}

#[async_trait]
impl Directory for GitHubDirectory {
    async fn list_members(&self, identifier: &str) -> Result<Vec<String>, LookupError> {
        if !is_valid_identifier(identifier) {
            return Err(LookupError::InvalidIdentifier {
                identifier: identifier.to_string(),
            });
        }

        let mut logins = Vec::new();
        for page in 1..=self.max_pages {
            let Some(members) = self.fetch_page(identifier, page).await? else {
                if page == 1 {
                    debug!(identifier, "Organization not found");
                }
                break;
            };

            let count = members.len();
            logins.extend(members.into_iter().map(|m| m.login));
            if count < self.per_page as usize {
                break;
            }
            if page == self.max_pages {
                warn!(
                    identifier,
                    pages = self.max_pages,
                    "Member listing truncated at page cap"
                );
            }
        }

        debug!(identifier, members = logins.len(), "Directory lookup complete");
        Ok(logins)
    }
}
