//! GitHub-backed source: GraphQL for blobs and trees, raw host for full text.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use super::{
    BlobContent, EntryKind, HierarchicalSource, RepositoryDetails, SourceEntry, SourceError,
    convert_reqwest_error, join_path,
};

/// Default GitHub GraphQL endpoint.
pub const DEFAULT_GRAPHQL_URL: &str = "https://api.github.com/graphql";

/// Default user agent for GitHub requests; the API rejects anonymous agents.
pub const DEFAULT_USER_AGENT: &str = "heroes-dao/0.1";

const CONNECT_TIMEOUT_SECS: u64 = 30;

const BLOB_QUERY: &str = "query($owner: String!, $name: String!, $expression: String!) {
  repository(owner: $owner, name: $name) {
    object(expression: $expression) {
      ... on Blob { text isTruncated }
    }
  }
}";

const TREE_QUERY: &str = "query($owner: String!, $name: String!, $expression: String!) {
  repository(owner: $owner, name: $name) {
    object(expression: $expression) {
      ... on Tree { entries { name type } }
    }
  }
}";

#[derive(Debug, Deserialize)]
struct GraphqlResponse<T> {
    data: Option<RepositoryData<T>>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct RepositoryData<T> {
    repository: Option<RepositoryObject<T>>,
}

#[derive(Debug, Deserialize)]
struct RepositoryObject<T> {
    object: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlobObject {
    text: Option<String>,
    #[serde(default)]
    is_truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeObject {
    entries: Option<Vec<TreeEntry>>,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    name: String,
    #[serde(rename = "type")]
    kind: String,
}

/// Remote [`HierarchicalSource`] reading a GitHub repository.
///
/// Blobs and trees cost one GraphQL call each; `fetch_raw_blob` issues one GET
/// against `{raw_url}/{branch}/{path}`.
#[derive(Debug, Clone)]
pub struct GithubSource {
    client: Client,
    details: RepositoryDetails,
    token: String,
    graphql_url: String,
    user_agent: String,
}

impl GithubSource {
    /// Construct a source for `details`, authenticating with `token`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::MissingToken`] when `token` is blank and
    /// [`SourceError::Client`] when the HTTP client cannot be built.
    pub fn new(details: RepositoryDetails, token: impl Into<String>) -> Result<Self, SourceError> {
        let secret = token.into();
        if secret.trim().is_empty() {
            return Err(SourceError::MissingToken {
                owner: details.owner,
                name: details.name,
            });
        }
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(SourceError::Client)?;
        Ok(Self {
            client,
            details,
            token: secret,
            graphql_url: DEFAULT_GRAPHQL_URL.to_owned(),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        })
    }

    /// Point GraphQL queries at a different endpoint.
    #[must_use]
    pub fn with_graphql_url(mut self, graphql_url: impl Into<String>) -> Self {
        self.graphql_url = graphql_url.into();
        self
    }

    /// Override the default user agent string.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Repository this source reads from.
    #[must_use]
    pub fn details(&self) -> &RepositoryDetails {
        &self.details
    }

    fn expression(&self, path: &str) -> String {
        format!("{}:{}", self.details.branch, path.trim_start_matches('/'))
    }

    fn raw_url(&self, path: &str) -> String {
        join_path(&join_path(&self.details.raw_url, &self.details.branch), path)
    }

    async fn query<T: DeserializeOwned>(&self, query: &str, path: &str) -> Result<T, SourceError> {
        let url = self.graphql_url.as_str();
        let body = json!({
            "query": query,
            "variables": {
                "owner": self.details.owner,
                "name": self.details.name,
                "expression": self.expression(path),
            },
        });
        debug!("graphql query for {}", self.expression(path));
        let text = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .header(USER_AGENT, self.user_agent.as_str())
            .json(&body)
            .send()
            .await
            .map_err(|err| convert_reqwest_error(err, url))?
            .error_for_status()
            .map_err(|err| convert_reqwest_error(err, url))?
            .text()
            .await
            .map_err(|err| convert_reqwest_error(err, url))?;
        let response: GraphqlResponse<T> =
            serde_json::from_str(&text).map_err(|source| SourceError::Decode {
                url: url.to_owned(),
                source,
            })?;
        unwrap_object(response, path)
    }
}

fn unwrap_object<T>(response: GraphqlResponse<T>, path: &str) -> Result<T, SourceError> {
    if !response.errors.is_empty() {
        let message = response
            .errors
            .into_iter()
            .map(|err| err.message)
            .collect::<Vec<_>>()
            .join("; ");
        return Err(SourceError::Query {
            path: path.to_owned(),
            message,
        });
    }
    response
        .data
        .and_then(|data| data.repository)
        .and_then(|repository| repository.object)
        .ok_or_else(|| SourceError::MissingObject {
            path: path.to_owned(),
        })
}

fn entry_kind(kind: &str) -> Option<EntryKind> {
    match kind {
        "blob" => Some(EntryKind::Blob),
        "tree" => Some(EntryKind::Tree),
        _ => None,
    }
}

#[async_trait(?Send)]
impl HierarchicalSource for GithubSource {
    async fn fetch_blob(&self, path: &str) -> Result<BlobContent, SourceError> {
        let blob: BlobObject = self.query(BLOB_QUERY, path).await?;
        let text = blob.text.ok_or_else(|| SourceError::UnexpectedKind {
            path: path.to_owned(),
            expected: EntryKind::Blob,
        })?;
        Ok(BlobContent {
            text,
            truncated: blob.is_truncated,
        })
    }

    async fn fetch_tree(&self, path: &str) -> Result<Vec<SourceEntry>, SourceError> {
        let tree: TreeObject = self.query(TREE_QUERY, path).await?;
        let entries = tree.entries.ok_or_else(|| SourceError::UnexpectedKind {
            path: path.to_owned(),
            expected: EntryKind::Tree,
        })?;
        Ok(entries
            .into_iter()
            .filter_map(|entry| match entry_kind(&entry.kind) {
                Some(kind) => Some(SourceEntry {
                    name: entry.name,
                    kind,
                }),
                None => {
                    warn!("skipping {} entry {} under {path}", entry.kind, entry.name);
                    None
                }
            })
            .collect())
    }

    async fn fetch_raw_blob(&self, path: &str) -> Result<String, SourceError> {
        let url = self.raw_url(path);
        debug!("raw fetch {url}");
        self.client
            .get(&url)
            .header(USER_AGENT, self.user_agent.as_str())
            .header(AUTHORIZATION, format!("token {}", self.token))
            .send()
            .await
            .map_err(|err| convert_reqwest_error(err, &url))?
            .error_for_status()
            .map_err(|err| convert_reqwest_error(err, &url))?
            .text()
            .await
            .map_err(|err| convert_reqwest_error(err, &url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn source() -> GithubSource {
        let details = RepositoryDetails::new(
            "HertzDevil",
            "feh-assets-json",
            "master",
            "https://raw.githubusercontent.com/HertzDevil/feh-assets-json/",
        );
        GithubSource::new(details, "secret").expect("token is present")
    }

    #[rstest]
    fn rejects_blank_tokens() {
        let details = RepositoryDetails::new("o", "r", "main", "https://raw.example.org");
        let err = GithubSource::new(details, "  ").expect_err("blank token");
        assert!(matches!(err, SourceError::MissingToken { .. }));
    }

    #[rstest]
    fn builders_override_endpoint_and_agent(source: GithubSource) {
        assert_eq!(source.graphql_url, DEFAULT_GRAPHQL_URL);
        assert_eq!(source.user_agent, DEFAULT_USER_AGENT);
        let source = source
            .with_graphql_url("https://ghe.example.test/api/graphql")
            .with_user_agent("heroes-dao/test");
        assert_eq!(source.graphql_url, "https://ghe.example.test/api/graphql");
        assert_eq!(source.user_agent, "heroes-dao/test");
    }

    #[rstest]
    fn builds_branch_expressions(source: GithubSource) {
        assert_eq!(
            source.expression("files/assets/Common/SRPG/Person"),
            "master:files/assets/Common/SRPG/Person"
        );
    }

    #[rstest]
    fn builds_raw_urls(source: GithubSource) {
        assert_eq!(
            source.raw_url("files/assets/Common/SRPG/Grow.json"),
            "https://raw.githubusercontent.com/HertzDevil/feh-assets-json/master/files/assets/Common/SRPG/Grow.json"
        );
    }

    #[rstest]
    fn decodes_blob_responses() {
        let response: GraphqlResponse<BlobObject> = serde_json::from_str(
            r#"{"data":{"repository":{"object":{"text":"[]","isTruncated":true}}}}"#,
        )
        .expect("valid response");
        let blob = unwrap_object(response, "a.json").expect("object present");
        assert_eq!(blob.text.as_deref(), Some("[]"));
        assert!(blob.is_truncated);
    }

    #[rstest]
    fn null_objects_are_missing() {
        let response: GraphqlResponse<TreeObject> =
            serde_json::from_str(r#"{"data":{"repository":{"object":null}}}"#)
                .expect("valid response");
        let err = unwrap_object(response, "nope").expect_err("missing object");
        assert!(matches!(err, SourceError::MissingObject { path } if path == "nope"));
    }

    #[rstest]
    fn reported_errors_are_query_failures() {
        let response: GraphqlResponse<TreeObject> = serde_json::from_str(
            r#"{"data":null,"errors":[{"message":"Bad credentials"},{"message":"again"}]}"#,
        )
        .expect("valid response");
        let err = unwrap_object(response, "files").expect_err("query failed");
        match err {
            SourceError::Query { message, .. } => assert_eq!(message, "Bad credentials; again"),
            other => panic!("expected Query, found {other:?}"),
        }
    }

    #[rstest]
    fn tree_entries_decode_kinds() {
        let tree: TreeObject = serde_json::from_str(
            r#"{"entries":[{"name":"a.json","type":"blob"},{"name":"sub","type":"tree"},{"name":"mod","type":"commit"}]}"#,
        )
        .expect("valid tree");
        let kinds: Vec<Option<EntryKind>> = tree
            .entries
            .unwrap_or_default()
            .iter()
            .map(|entry| entry_kind(&entry.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![Some(EntryKind::Blob), Some(EntryKind::Tree), None]
        );
    }
}
