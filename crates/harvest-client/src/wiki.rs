use std::time::Duration;

use harvest_core::error::AppError;
use harvest_core::models::{ListCursor, PageListing, PageTask};
use harvest_core::traits::PageSource;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

pub const DEFAULT_API_URL: &str = "https://conanexiles.fandom.com/api.php";

/// Categories walked by default, in listing order.
pub const DEFAULT_CATEGORIES: [&str; 4] = ["Thralls", "NPCs", "Creatures", "Pets"];

/// Anonymous read-only client for the MediaWiki action API.
///
/// The listing walks each configured category in turn through
/// `list=categorymembers`; a [`ListCursor`] names the category index and the
/// `cmcontinue` token within it. Page content comes from `prop=revisions`.
#[derive(Clone)]
pub struct MediaWikiClient {
    client: Client,
    api_url: Url,
    categories: Vec<String>,
    batch_limit: u32,
    timeout_secs: u64,
}

impl MediaWikiClient {
    pub fn new(api_url: &str) -> Result<Self, AppError> {
        Self::with_timeout(api_url, Duration::from_secs(30))
    }

    pub fn with_timeout(api_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let api_url = Url::parse(api_url)
            .map_err(|e| AppError::ConfigError(format!("Invalid wiki API URL '{api_url}': {e}")))?;
        match api_url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(AppError::ConfigError(format!(
                    "Wiki API URL scheme '{scheme}' is not allowed (only http/https)"
                )));
            }
        }

        let client = Client::builder()
            .user_agent(concat!("harvest/", env!("CARGO_PKG_VERSION"), " (wiki entity harvester)"))
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            api_url,
            categories: DEFAULT_CATEGORIES.iter().map(ToString::to_string).collect(),
            batch_limit: 500,
            timeout_secs: timeout.as_secs(),
        })
    }

    /// Replace the walked categories (names without the `Category:` prefix).
    pub fn with_categories<I, T>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    /// Pages per listing request (`cmlimit`, at most 500 for anonymous reads).
    pub fn with_batch_limit(mut self, limit: u32) -> Self {
        self.batch_limit = limit.clamp(1, 500);
        self
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    fn query_url(&self, params: &[(&str, &str)]) -> Url {
        let mut url = self.api_url.clone();
        url.query_pairs_mut()
            .extend_pairs(params)
            .append_pair("format", "json")
            .append_pair("formatversion", "2");
        url
    }

    async fn get_json<T: DeserializeOwned>(&self, params: &[(&str, &str)]) -> Result<T, AppError> {
        let url = self.query_url(params);
        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(self.timeout_secs)
            } else if e.is_connect() || e.is_request() {
                AppError::NetworkError(format!("Request to {url} failed: {e}"))
            } else {
                AppError::HttpError(e.to_string())
            }
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AppError::RateLimitExceeded);
        }
        if !status.is_success() {
            return Err(AppError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(self.timeout_secs)
            } else {
                AppError::NetworkError(format!("Failed to read response body: {e}"))
            }
        })?;

        let envelope: ApiEnvelope<T> = serde_json::from_str(&body)
            .map_err(|e| AppError::MalformedResponse(format!("Undecodable response from {url}: {e}")))?;
        if let Some(error) = envelope.error {
            return Err(error.into_app_error());
        }
        envelope
            .body
            .ok_or_else(|| AppError::MalformedResponse(format!("Response from {url} has no query")))
    }
}

impl PageSource for MediaWikiClient {
    async fn list_pages(&self, cursor: &ListCursor) -> Result<PageListing, AppError> {
        let Some(category) = self.categories.get(cursor.category) else {
            return Ok(PageListing::default());
        };

        let title = format!("Category:{category}");
        let limit = self.batch_limit.to_string();
        let mut params = vec![
            ("action", "query"),
            ("list", "categorymembers"),
            ("cmtitle", title.as_str()),
            ("cmtype", "page"),
            ("cmlimit", limit.as_str()),
        ];
        if let Some(token) = &cursor.token {
            params.push(("cmcontinue", token.as_str()));
        }

        let response: CategoryMembersResponse = self.get_json(&params).await?;
        let pages = response
            .query
            .categorymembers
            .into_iter()
            .map(|member| PageTask::new(member.pageid, member.title))
            .collect();

        let next = match response.continuation.and_then(|c| c.cmcontinue) {
            Some(token) => Some(ListCursor {
                category: cursor.category,
                token: Some(token),
            }),
            None if cursor.category + 1 < self.categories.len() => Some(ListCursor {
                category: cursor.category + 1,
                token: None,
            }),
            None => None,
        };

        tracing::debug!(%category, cursor = %cursor, "Listed category members");
        Ok(PageListing { pages, next })
    }

    async fn fetch_page(&self, task: &PageTask) -> Result<String, AppError> {
        let page_id = task.page_id.to_string();
        let params = [
            ("action", "query"),
            ("prop", "revisions"),
            ("rvprop", "content|timestamp"),
            ("rvslots", "main"),
            ("pageids", page_id.as_str()),
        ];

        let response: RevisionsResponse = self.get_json(&params).await?;
        let page = response
            .query
            .pages
            .into_iter()
            .next()
            .ok_or_else(|| AppError::MalformedResponse(format!("No page in response for {page_id}")))?;

        if page.missing || page.invalid {
            return Err(AppError::PageNotFound(format!("{} ({page_id})", task.title)));
        }

        let revision = page.revisions.into_iter().next().ok_or_else(|| {
            AppError::PageNotFound(format!("{} ({page_id}) has no revisions", task.title))
        })?;

        Ok(revision
            .slots
            .and_then(|slots| slots.main.content)
            .or(revision.content)
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Response shapes (formatversion=2)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    error: Option<ApiError>,
    #[serde(flatten)]
    body: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    #[serde(default)]
    info: String,
}

impl ApiError {
    fn into_app_error(self) -> AppError {
        match self.code.as_str() {
            "ratelimited" | "maxlag" => AppError::RateLimitExceeded,
            "readonly" | "internal_api_error_DBQueryError" => {
                AppError::NetworkError(format!("Wiki temporarily unavailable: {}", self.info))
            }
            _ => AppError::MalformedResponse(format!("API error {}: {}", self.code, self.info)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CategoryMembersResponse {
    #[serde(rename = "continue")]
    continuation: Option<CategoryContinue>,
    query: CategoryMembersQuery,
}

#[derive(Debug, Deserialize)]
struct CategoryContinue {
    cmcontinue: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CategoryMembersQuery {
    #[serde(default)]
    categorymembers: Vec<CategoryMember>,
}

#[derive(Debug, Deserialize)]
struct CategoryMember {
    pageid: u64,
    title: String,
}

#[derive(Debug, Deserialize)]
struct RevisionsResponse {
    query: RevisionsQuery,
}

#[derive(Debug, Deserialize)]
struct RevisionsQuery {
    #[serde(default)]
    pages: Vec<RevisionPage>,
}

#[derive(Debug, Deserialize)]
struct RevisionPage {
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    invalid: bool,
    #[serde(default)]
    revisions: Vec<Revision>,
}

#[derive(Debug, Deserialize)]
struct Revision {
    slots: Option<RevisionSlots>,
    /// Pre-slots wikis put the text on the revision itself.
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RevisionSlots {
    main: RevisionSlot,
}

#[derive(Debug, Deserialize)]
struct RevisionSlot {
    content: Option<String>,
}
