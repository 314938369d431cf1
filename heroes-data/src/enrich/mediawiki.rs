//! MediaWiki `imageinfo` client.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use heroes_core::LOOKUP_BATCH_SIZE;
use reqwest::Client;
use reqwest::header::USER_AGENT;
use serde::Deserialize;
use url::Url;

use super::{EnrichError, ImageLookup, LookupBatch};

/// Default user agent for wiki requests.
pub const DEFAULT_USER_AGENT: &str = "heroes-dao/0.1";

const TITLE_SEPARATOR: &str = "|";
const REVISION_MARKER: &str = "/revision/";
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Location of the wiki API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikiDetails {
    /// URL of the `api.php` endpoint.
    pub base_url: String,
}

impl WikiDetails {
    /// Describe the wiki served at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ImageInfoResponse {
    query: Option<QueryBody>,
}

#[derive(Debug, Deserialize)]
struct QueryBody {
    #[serde(default)]
    normalized: Vec<Normalisation>,
    #[serde(default)]
    pages: HashMap<String, Page>,
}

#[derive(Debug, Deserialize)]
struct Normalisation {
    from: String,
    to: String,
}

#[derive(Debug, Deserialize)]
struct Page {
    title: String,
    #[serde(default)]
    imageinfo: Vec<ImageInfo>,
}

#[derive(Debug, Deserialize)]
struct ImageInfo {
    url: String,
}

/// [`ImageLookup`] backed by a MediaWiki API endpoint.
///
/// Issues `GET {base}?action=query&prop=imageinfo&iiprop=url&titles=A|B&format=json`.
#[derive(Debug, Clone)]
pub struct MediaWikiImageLookup {
    client: Client,
    base_url: Url,
    user_agent: String,
}

impl MediaWikiImageLookup {
    /// Construct a client for the wiki described by `details`.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichError::InvalidUrl`] when the base URL does not parse
    /// and [`EnrichError::Client`] when the HTTP client cannot be built.
    pub fn new(details: &WikiDetails) -> Result<Self, EnrichError> {
        let base_url = Url::parse(&details.base_url).map_err(|source| EnrichError::InvalidUrl {
            url: details.base_url.clone(),
            source,
        })?;
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(EnrichError::Client)?;
        Ok(Self {
            client,
            base_url,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        })
    }

    /// Override the default user agent string.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    fn query_url(&self, titles: &[String]) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("action", "query")
            .append_pair("prop", "imageinfo")
            .append_pair("iiprop", "url")
            .append_pair("titles", &titles.join(TITLE_SEPARATOR))
            .append_pair("format", "json");
        url
    }
}

/// Drop the revision qualifier the wiki appends to file URLs.
fn strip_revision(url: &str) -> &str {
    url.split_once(REVISION_MARKER).map_or(url, |(head, _)| head)
}

/// Map a response back onto the titles that were requested.
fn project(titles: &[String], response: ImageInfoResponse) -> LookupBatch {
    let Some(query) = response.query else {
        return LookupBatch::new();
    };
    let renamed: HashMap<String, String> = query
        .normalized
        .into_iter()
        .map(|rename| (rename.from, rename.to))
        .collect();
    let by_page_title: HashMap<String, String> = query
        .pages
        .into_values()
        .filter_map(|page| {
            let info = page.imageinfo.into_iter().next()?;
            Some((page.title, strip_revision(&info.url).to_owned()))
        })
        .collect();
    titles
        .iter()
        .filter_map(|title| {
            let canonical = renamed.get(title).unwrap_or(title);
            by_page_title
                .get(canonical)
                .map(|url| (title.clone(), url.clone()))
        })
        .collect()
}

#[async_trait(?Send)]
impl ImageLookup for MediaWikiImageLookup {
    async fn lookup(&self, titles: &[String]) -> Result<LookupBatch, EnrichError> {
        if titles.len() > LOOKUP_BATCH_SIZE {
            return Err(EnrichError::BatchTooLarge {
                requested: titles.len(),
                limit: LOOKUP_BATCH_SIZE,
            });
        }
        if titles.is_empty() {
            return Ok(LookupBatch::new());
        }
        let url = self.query_url(titles);
        let text = self
            .client
            .get(url.clone())
            .header(USER_AGENT, self.user_agent.as_str())
            .send()
            .await
            .map_err(|err| convert_reqwest_error(err, url.as_str()))?
            .error_for_status()
            .map_err(|err| convert_reqwest_error(err, url.as_str()))?
            .text()
            .await
            .map_err(|err| convert_reqwest_error(err, url.as_str()))?;
        let response: ImageInfoResponse =
            serde_json::from_str(&text).map_err(|source| EnrichError::Decode {
                url: url.to_string(),
                source,
            })?;
        Ok(project(titles, response))
    }
}

fn convert_reqwest_error(error: reqwest::Error, url: &str) -> EnrichError {
    if let Some(status) = error.status() {
        return EnrichError::Http {
            url: url.to_owned(),
            status: status.as_u16(),
            message: error.to_string(),
        };
    }

    let kind = if error.is_timeout() {
        std::io::ErrorKind::TimedOut
    } else {
        std::io::ErrorKind::Other
    };
    EnrichError::Network {
        url: url.to_owned(),
        source: std::io::Error::new(kind, error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("failed to build Tokio runtime")
            .block_on(future)
    }

    #[fixture]
    fn lookup() -> MediaWikiImageLookup {
        MediaWikiImageLookup::new(&WikiDetails::new("https://feheroes.fandom.com/api.php"))
            .expect("valid wiki URL")
    }

    #[rstest]
    #[case(
        "https://static.wikia.nocookie.net/feheroes_gamepedia_en/images/a/a1/X.png/revision/latest?cb=2023",
        "https://static.wikia.nocookie.net/feheroes_gamepedia_en/images/a/a1/X.png"
    )]
    #[case("https://img.example.org/Y.png", "https://img.example.org/Y.png")]
    fn strips_revision_suffix(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(strip_revision(raw), expected);
    }

    #[rstest]
    fn user_agent_can_be_overridden(lookup: MediaWikiImageLookup) {
        assert_eq!(lookup.user_agent, DEFAULT_USER_AGENT);
        let lookup = lookup.with_user_agent("heroes-dao/test");
        assert_eq!(lookup.user_agent, "heroes-dao/test");
    }

    #[rstest]
    fn builds_imageinfo_queries(lookup: MediaWikiImageLookup) {
        let url = lookup.query_url(&["File:A B.png".to_owned(), "File:C.png".to_owned()]);
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("action".to_owned(), "query".to_owned()),
                ("prop".to_owned(), "imageinfo".to_owned()),
                ("iiprop".to_owned(), "url".to_owned()),
                ("titles".to_owned(), "File:A B.png|File:C.png".to_owned()),
                ("format".to_owned(), "json".to_owned()),
            ]
        );
    }

    #[rstest]
    fn projects_normalised_titles_onto_requests() {
        let response: ImageInfoResponse = serde_json::from_str(
            r#"{"query":{
                "normalized":[{"from":"File:Fury_3.png","to":"File:Fury 3.png"}],
                "pages":{
                    "-1":{"title":"File:Missing.png","missing":""},
                    "42":{"title":"File:Fury 3.png","imageinfo":[{"url":"https://img/Fury_3.png/revision/latest"}]}
                }
            }}"#,
        )
        .expect("valid response");
        let titles = vec!["File:Fury_3.png".to_owned(), "File:Missing.png".to_owned()];
        let batch = project(&titles, response);
        assert_eq!(batch.len(), 1);
        assert_eq!(
            batch.get("File:Fury_3.png").map(String::as_str),
            Some("https://img/Fury_3.png")
        );
    }

    #[rstest]
    fn rejects_oversized_batches_before_any_request(lookup: MediaWikiImageLookup) {
        let titles: Vec<String> = (0..51).map(|i| format!("File:{i}.png")).collect();
        let err = block_on(lookup.lookup(&titles)).expect_err("too many titles");
        assert!(matches!(
            err,
            EnrichError::BatchTooLarge {
                requested: 51,
                limit: 50
            }
        ));
    }

    #[rstest]
    fn rejects_unparseable_base_urls() {
        let err = MediaWikiImageLookup::new(&WikiDetails::new("not a url"))
            .expect_err("invalid URL");
        assert!(matches!(err, EnrichError::InvalidUrl { .. }));
    }
}
