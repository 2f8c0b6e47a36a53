use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("wikisync/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum GithubError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Api {
        status: StatusCode,
        body: String,
        rate_limited: bool,
    },
    #[error("invalid base64 payload: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("unsupported content encoding: {0}")]
    Encoding(String),
    #[error("path is not a file: {0}")]
    NotAFile(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    NotFound,
    Auth,
    RateLimit,
    Transient,
    Permanent,
}

/// Owner, name and optional ref of the repository being mirrored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryRef {
    pub owner: String,
    pub repo: String,
    pub reference: Option<String>,
}

impl RepositoryRef {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            reference: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

impl std::fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: String,
    pub content_hash: String,
    pub kind: EntryKind,
}

impl TreeEntry {
    pub fn file(path: impl Into<String>, content_hash: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content_hash: content_hash.into(),
            kind: EntryKind::File,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// Read-only view of one repository at a point in time.
#[async_trait]
pub trait RemoteTree: Send + Sync {
    async fn default_ref(&self) -> Result<String, GithubError>;
    async fn head_content_hash(&self, reference: &str) -> Result<String, GithubError>;
    async fn tree(&self, reference: &str) -> Result<Vec<TreeEntry>, GithubError>;
    async fn blob(&self, hash: &str) -> Result<Vec<u8>, GithubError>;
    async fn file_at(&self, path: &str, reference: &str) -> Result<Vec<u8>, GithubError>;
}

#[derive(Clone)]
pub struct GithubClient {
    http: Client,
    base_url: Url,
    token: String,
    repository: RepositoryRef,
}

impl GithubClient {
    pub fn new(repository: RepositoryRef, token: impl Into<String>) -> Result<Self, GithubError> {
        Self::with_base_url(DEFAULT_BASE_URL, repository, token)
    }

    pub fn with_base_url(
        base_url: &str,
        repository: RepositoryRef,
        token: impl Into<String>,
    ) -> Result<Self, GithubError> {
        Ok(Self {
            http: Client::builder().user_agent(USER_AGENT).build()?,
            base_url: Url::parse(base_url)?,
            token: token.into(),
            repository,
        })
    }

    pub fn repository(&self) -> &RepositoryRef {
        &self.repository
    }

    pub async fn get_repository(&self) -> Result<Repository, GithubError> {
        let url = self.repo_endpoint(&[])?;
        self.get_json(url).await
    }

    pub async fn get_commit(&self, reference: &str) -> Result<Commit, GithubError> {
        let url = self.repo_endpoint(&["commits", reference])?;
        self.get_json(url).await
    }

    pub async fn get_tree(&self, reference: &str, recursive: bool) -> Result<Tree, GithubError> {
        let mut url = self.repo_endpoint(&["git", "trees", reference])?;
        if recursive {
            url.query_pairs_mut().append_pair("recursive", "1");
        }
        self.get_json(url).await
    }

    pub async fn get_blob(&self, sha: &str) -> Result<Blob, GithubError> {
        let url = self.repo_endpoint(&["git", "blobs", sha])?;
        self.get_json(url).await
    }

    pub async fn get_contents(
        &self,
        path: &str,
        reference: Option<&str>,
    ) -> Result<Contents, GithubError> {
        let mut segments = vec!["contents"];
        segments.extend(path.split('/').filter(|part| !part.is_empty()));
        let mut url = self.repo_endpoint(&segments)?;
        if let Some(reference) = reference {
            url.query_pairs_mut().append_pair("ref", reference);
        }
        self.get_json(url).await
    }

    fn repo_endpoint(&self, segments: &[&str]) -> Result<Url, GithubError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(["repos", self.repository.owner.as_str(), self.repository.repo.as_str()])
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, GithubError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, GithubError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let status = response.status();
            let rate_limited = rate_limit_exhausted(response.headers());
            let body = response.text().await.unwrap_or_default();
            Err(GithubError::Api {
                status,
                body,
                rate_limited,
            })
        }
    }
}

#[async_trait]
impl RemoteTree for GithubClient {
    async fn default_ref(&self) -> Result<String, GithubError> {
        Ok(self.get_repository().await?.default_branch)
    }

    async fn head_content_hash(&self, reference: &str) -> Result<String, GithubError> {
        Ok(self.get_commit(reference).await?.sha)
    }

    async fn tree(&self, reference: &str) -> Result<Vec<TreeEntry>, GithubError> {
        let tree = self.get_tree(reference, true).await?;
        if tree.truncated {
            tracing::warn!(
                repository = %self.repository,
                reference,
                "recursive tree listing was truncated by the API"
            );
        }
        Ok(tree.tree.into_iter().map(TreeEntry::from).collect())
    }

    async fn blob(&self, hash: &str) -> Result<Vec<u8>, GithubError> {
        self.get_blob(hash).await?.decode()
    }

    async fn file_at(&self, path: &str, reference: &str) -> Result<Vec<u8>, GithubError> {
        let contents = self.get_contents(path, Some(reference)).await?;
        if contents.content_type != "file" {
            return Err(GithubError::NotAFile(path.to_string()));
        }
        // Files over 1 MB come back without an inline body.
        match contents.encoding.as_deref() {
            Some("base64") => decode_base64(contents.content.as_deref().unwrap_or_default()),
            _ if contents.content.as_deref().is_none_or(str::is_empty) => {
                self.blob(&contents.sha).await
            }
            Some(other) => Err(GithubError::Encoding(other.to_string())),
            None => Err(GithubError::Encoding("none".to_string())),
        }
    }
}

impl GithubError {
    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            GithubError::Api {
                status,
                rate_limited,
                ..
            } => Some(classify_api_status(*status, *rate_limited)),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.classification(),
            Some(ApiErrorClass::RateLimit | ApiErrorClass::Transient)
        )
    }

    pub fn is_not_found(&self) -> bool {
        self.classification() == Some(ApiErrorClass::NotFound)
    }
}

fn classify_api_status(status: StatusCode, rate_limited: bool) -> ApiErrorClass {
    if status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN && rate_limited)
    {
        ApiErrorClass::RateLimit
    } else if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ApiErrorClass::Auth
    } else if status == StatusCode::NOT_FOUND {
        ApiErrorClass::NotFound
    } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}

fn rate_limit_exhausted(headers: &HeaderMap) -> bool {
    headers
        .get("x-ratelimit-remaining")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.trim() == "0")
}

fn decode_base64(content: &str) -> Result<Vec<u8>, GithubError> {
    // The API wraps base64 payloads at 60 columns.
    let compact: String = content.split_ascii_whitespace().collect();
    Ok(STANDARD.decode(compact)?)
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Repository {
    pub full_name: String,
    pub default_branch: String,
    #[serde(default)]
    pub private: bool,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Commit {
    pub sha: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Tree {
    pub sha: String,
    pub tree: Vec<TreeItem>,
    #[serde(default)]
    pub truncated: bool,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TreeItem {
    pub path: String,
    #[serde(rename = "type")]
    pub item_type: String,
    pub sha: String,
    #[serde(default)]
    pub size: Option<u64>,
}

impl From<TreeItem> for TreeEntry {
    fn from(item: TreeItem) -> Self {
        Self {
            kind: if item.item_type == "blob" {
                EntryKind::File
            } else {
                EntryKind::Other
            },
            path: item.path,
            content_hash: item.sha,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Blob {
    pub sha: String,
    pub content: String,
    pub encoding: String,
}

impl Blob {
    pub fn decode(&self) -> Result<Vec<u8>, GithubError> {
        match self.encoding.as_str() {
            "base64" => decode_base64(&self.content),
            "utf-8" => Ok(self.content.clone().into_bytes()),
            other => Err(GithubError::Encoding(other.to_string())),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Contents {
    #[serde(rename = "type")]
    pub content_type: String,
    pub path: String,
    pub sha: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub encoding: Option<String>,
}
