// ABOUTME: GitHub REST and GraphQL API client
// ABOUTME: Resolves repositories, fetches base64 encoded file contents and runs GraphQL queries

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use url::Url;

use super::error::{Result, SourceError};
use super::{GraphqlClient, Repository, RepositoryInfo, SourceProvider};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const GITHUB_API_VERSION: &str = "2022-11-28";

/// Connection details shared by the client and the repositories it resolves
#[derive(Clone)]
struct GithubApi {
    client: Client,
    api_url: String,
    token: Option<String>,
}

impl GithubApi {
    fn get(&self, url: &str) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let mut request = self
            .client
            .request(method, url)
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
            .header(USER_AGENT, concat!("actions-toolkit/", env!("CARGO_PKG_VERSION")));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request
    }
}

pub struct GithubClient {
    api: GithubApi,
}

impl GithubClient {
    pub fn new(api_url: Option<String>, token: Option<String>) -> Self {
        let api_url = api_url
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        Self {
            api: GithubApi {
                client: Client::new(),
                api_url,
                token,
            },
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api.api_url
    }

    /// Resolve a repository without boxing it
    pub async fn repository(&self, name: &str) -> Result<GithubRepository> {
        validate_name(name)?;

        let url = endpoint(&self.api.api_url, ["repos"].into_iter().chain(name.split('/')))?;
        debug!("Fetching repository metadata from {}", url);

        let response = self.api.get(&url).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(SourceError::RepositoryNotFound {
                name: name.to_string(),
            }),
            status if !status.is_success() => Err(SourceError::Status {
                url,
                status: status.as_u16(),
            }),
            _ => {
                let payload: RepositoryPayload = response.json().await?;
                Ok(GithubRepository {
                    api: self.api.clone(),
                    info: payload.into(),
                })
            }
        }
    }
}

#[async_trait]
impl GraphqlClient for GithubClient {
    async fn graphql(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let url = graphql_url(&self.api.api_url)?;
        debug!("Posting GraphQL query to {}", url);

        let response = self
            .api
            .request(Method::POST, &url)
            .json(&json!({"query": query, "variables": variables}))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                url,
                status: status.as_u16(),
            });
        }
        graphql_data(response.json().await?)
    }
}

#[async_trait]
impl SourceProvider for GithubClient {
    async fn get_repo(&self, name: &str) -> Result<Box<dyn Repository>> {
        Ok(Box::new(self.repository(name).await?))
    }
}

pub struct GithubRepository {
    api: GithubApi,
    info: RepositoryInfo,
}

#[async_trait]
impl Repository for GithubRepository {
    fn info(&self) -> &RepositoryInfo {
        &self.info
    }

    async fn get_contents(&self, path: &str) -> Result<String> {
        let url = contents_url(&self.api.api_url, &self.info.full_name, path)?;
        debug!("Fetching contents from {}", url);

        let response = self.api.get(&url).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(SourceError::FileNotFound {
                repository: self.info.full_name.clone(),
                path: path.to_string(),
            }),
            status if !status.is_success() => Err(SourceError::Status {
                url,
                status: status.as_u16(),
            }),
            _ => {
                let payload: serde_json::Value = response.json().await?;
                decode_contents(path, payload)
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct RepositoryPayload {
    name: String,
    full_name: String,
    owner: OwnerPayload,
    #[serde(default)]
    default_branch: Option<String>,
    #[serde(default)]
    html_url: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OwnerPayload {
    login: String,
}

impl From<RepositoryPayload> for RepositoryInfo {
    fn from(payload: RepositoryPayload) -> Self {
        Self {
            name: payload.name,
            full_name: payload.full_name,
            owner: payload.owner.login,
            default_branch: payload.default_branch,
            html_url: payload.html_url,
            description: payload.description,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    errors: Vec<GraphqlErrorPayload>,
}

#[derive(Debug, Deserialize)]
struct GraphqlErrorPayload {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ContentsPayload {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

fn validate_name(name: &str) -> Result<()> {
    match name.split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
            Ok(())
        }
        _ => Err(SourceError::InvalidName {
            name: name.to_string(),
        }),
    }
}

/// Append percent-encoded path segments to the API base URL
fn endpoint<'a>(api_url: &str, segments: impl IntoIterator<Item = &'a str>) -> Result<String> {
    let invalid = |message: String| SourceError::InvalidUrl {
        url: api_url.to_string(),
        message,
    };
    let mut url = Url::parse(api_url).map_err(|e| invalid(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| invalid("not a base URL".to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url.into())
}

fn contents_url(api_url: &str, full_name: &str, path: &str) -> Result<String> {
    let segments = ["repos"]
        .into_iter()
        .chain(full_name.split('/'))
        .chain(["contents"])
        .chain(path.split('/').filter(|segment| !segment.is_empty()));
    endpoint(api_url, segments)
}

/// GitHub Enterprise serves GraphQL at `/api/graphql` next to the `/api/v3` REST root
fn graphql_url(api_url: &str) -> Result<String> {
    endpoint(api_url.strip_suffix("/v3").unwrap_or(api_url), ["graphql"])
}

/// Unwrap the `data` member, failing on any reported GraphQL error
fn graphql_data(payload: serde_json::Value) -> Result<serde_json::Value> {
    let response: GraphqlResponse =
        serde_json::from_value(payload).map_err(|e| SourceError::Graphql {
            message: e.to_string(),
        })?;
    if !response.errors.is_empty() {
        let messages: Vec<_> = response.errors.into_iter().map(|e| e.message).collect();
        return Err(SourceError::Graphql {
            message: messages.join("; "),
        });
    }
    response.data.ok_or_else(|| SourceError::Graphql {
        message: "response carried no data".to_string(),
    })
}

/// Decode a `GET /repos/{owner}/{repo}/contents/{path}` response body
fn decode_contents(path: &str, payload: serde_json::Value) -> Result<String> {
    let decode_error = |message: String| SourceError::Decode {
        path: path.to_string(),
        message,
    };

    if payload.is_array() {
        return Err(decode_error("path is a directory".to_string()));
    }
    let payload: ContentsPayload =
        serde_json::from_value(payload).map_err(|e| decode_error(e.to_string()))?;
    if payload.kind != "file" {
        return Err(decode_error(format!("path is a {}", payload.kind)));
    }

    let content = payload.content.unwrap_or_default();
    let bytes = match payload.encoding.as_deref() {
        Some("base64") => {
            let cleaned: String = content.chars().filter(|c| !c.is_whitespace()).collect();
            BASE64
                .decode(cleaned)
                .map_err(|e| decode_error(e.to_string()))?
        }
        Some("none") | None if content.is_empty() => {
            // GitHub omits content for files over 1MB
            return Err(decode_error("file too large for the contents API".to_string()));
        }
        _ => content.into_bytes(),
    };

    String::from_utf8(bytes).map_err(|e| decode_error(e.to_string()))
}
