//! Paged collections over list endpoints.
//!
//! A [`PagedCollection`] is seeded from the first page of a list response
//! and fetches later pages on demand by following the continuation token.
//! Items are only ever appended; the *page window* always covers the most
//! recently appended page.
//!
//! Fetches are single-flight: concurrent [`next_page`](PagedCollection::next_page)
//! and [`next_item`](PagedCollection::next_item) calls on one collection are
//! serialised by an internal async lock, so a second fetch never starts
//! while one is outstanding.

use crate::client::PipelineClient;
use cirrus_core::{ClientError, ClientResult, Context, HeaderMap, HttpRequest, Method};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;

/// Dotted JSON paths to the item array and continuation token of a page.
///
/// Each path is split on `.` and walked through nested objects. A path
/// that reaches its target value more than once (for example an array at
/// `a` when looking up `a.b`) is ambiguous and resolves to nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagedCodingKeys {
    /// Path to the item array.
    pub items: String,
    /// Path to the continuation token.
    pub continuation_token: String,
}

impl Default for PagedCodingKeys {
    fn default() -> Self {
        Self {
            items: "items".to_string(),
            continuation_token: "continuationToken".to_string(),
        }
    }
}

impl PagedCodingKeys {
    /// Creates coding keys from two dotted paths.
    #[must_use]
    pub fn new(items: impl Into<String>, continuation_token: impl Into<String>) -> Self {
        Self {
            items: items.into(),
            continuation_token: continuation_token.into(),
        }
    }

    /// Resolves the item array in `page`.
    #[must_use]
    pub fn items<'a>(&self, page: &'a Value) -> Option<&'a Vec<Value>> {
        resolve(&self.items, page, Value::as_array)
    }

    /// Resolves the continuation token in `page`.
    #[must_use]
    pub fn continuation_token<'a>(&self, page: &'a Value) -> Option<&'a str> {
        resolve(&self.continuation_token, page, Value::as_str)
    }
}

/// Walks `path` through `page`, collecting the single value `pick` accepts.
fn resolve<'a, T: ?Sized>(
    path: &str,
    page: &'a Value,
    pick: impl Fn(&'a Value) -> Option<&'a T>,
) -> Option<&'a T> {
    let mut current = page.as_object()?;
    let mut found = None;

    for component in path.split('.') {
        let value = current.get(component)?;
        if let Some(hit) = pick(value) {
            if found.is_some() {
                return None;
            }
            found = Some(hit);
        } else if let Some(object) = value.as_object() {
            current = object;
        }
    }
    found
}

/// Maps a continuation token to the URL of the next page.
///
/// Services whose tokens are not ready-to-use URLs plug in their own
/// mapping with [`PagedCollection::with_delegate`]. Query parameters added
/// to `query_params` are appended to the returned URL.
pub trait PagedCollectionDelegate: Send + Sync {
    /// Returns the URL of the page identified by `token`.
    fn continuation_url(
        &self,
        token: &str,
        query_params: &mut BTreeMap<String, String>,
        request_url: &str,
    ) -> ClientResult<String>;
}

#[derive(Debug)]
struct PageState<T> {
    items: Vec<T>,
    page_range: Range<usize>,
    continuation_token: Option<String>,
    cursor: usize,
}

impl<T> PageState<T> {
    fn page(&self) -> &[T] {
        &self.items[self.page_range.clone()]
    }
}

/// A lazily fetched, append-only sequence of `T`.
///
/// # Example
///
/// ```
/// use cirrus_client::{ClientOptions, PagedCodingKeys, PagedCollection, PipelineClient};
/// use cirrus_core::{Context, HttpRequest, Method};
/// use cirrus_test::{json_response, MockTransport};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let transport = MockTransport::new()
///     .with_response(json_response(200, &json!({"items": [1, 2], "continuationToken": "page2"})))
///     .with_response(json_response(200, &json!({"items": [3]})));
/// let client = PipelineClient::new(
///     "https://example.com",
///     Arc::new(transport),
///     Vec::new(),
///     ClientOptions::default(),
/// )
/// .unwrap();
///
/// let request = HttpRequest::parse(Method::GET, "https://example.com/numbers").unwrap();
/// let numbers = PagedCollection::<u32>::fetch(&client, request, Context::new(), PagedCodingKeys::default())
///     .await
///     .unwrap();
///
/// assert_eq!(numbers.next_page().await.unwrap(), Some(vec![3]));
/// assert_eq!(numbers.next_page().await.unwrap(), None);
/// assert_eq!(numbers.items(), vec![1, 2, 3]);
/// # });
/// ```
pub struct PagedCollection<T> {
    client: PipelineClient,
    coding_keys: PagedCodingKeys,
    request_headers: HeaderMap,
    request_url: String,
    delegate: Option<Arc<dyn PagedCollectionDelegate>>,
    state: Mutex<PageState<T>>,
    fetch_gate: tokio::sync::Mutex<()>,
}

impl<T> PagedCollection<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Creates a collection from the first page's body.
    ///
    /// `request` is the request that produced `body`; its URL and headers
    /// are reused for continuation requests. Fails with a decoding error if
    /// `body` is not a JSON object with an item array at
    /// `coding_keys.items`.
    pub fn new(
        client: &PipelineClient,
        request: &HttpRequest,
        body: &[u8],
        coding_keys: PagedCodingKeys,
    ) -> ClientResult<Self> {
        let (items, continuation_token) = decode_page(&coding_keys, body)?;
        let page_range = 0..items.len();

        Ok(Self {
            client: client.clone(),
            coding_keys,
            request_headers: request.headers.clone(),
            request_url: request.uri.to_string(),
            delegate: None,
            state: Mutex::new(PageState {
                items,
                page_range,
                continuation_token,
                cursor: 0,
            }),
            fetch_gate: tokio::sync::Mutex::new(()),
        })
    }

    /// Runs `request` and seeds a collection from its response.
    ///
    /// Continuation requests carry the headers of `request` as given, not
    /// the headers stages added while sending it.
    pub async fn fetch(
        client: &PipelineClient,
        request: HttpRequest,
        context: Context,
        coding_keys: PagedCodingKeys,
    ) -> ClientResult<Self> {
        let template = request.clone();
        let response = client.run(request, context).await?;
        Self::new(client, &template, &response.body, coding_keys)
    }

    /// Replaces the default continuation mapping.
    #[must_use]
    pub fn with_delegate(mut self, delegate: Arc<dyn PagedCollectionDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    /// Every item fetched so far.
    #[must_use]
    pub fn items(&self) -> Vec<T> {
        self.state.lock().items.clone()
    }

    /// The items of the most recently fetched page.
    #[must_use]
    pub fn page_items(&self) -> Vec<T> {
        self.state.lock().page().to_vec()
    }

    /// The continuation token of the most recently fetched page.
    #[must_use]
    pub fn continuation_token(&self) -> Option<String> {
        self.state.lock().continuation_token.clone()
    }

    /// Number of items fetched so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Returns true if no items have been fetched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true while a continuation token is pending.
    #[must_use]
    pub fn has_more_pages(&self) -> bool {
        self.state
            .lock()
            .continuation_token
            .as_deref()
            .is_some_and(|token| !token.is_empty())
    }

    /// Fetches the next page.
    ///
    /// Returns `Ok(None)` once the service stops returning a continuation
    /// token. Otherwise the new items are appended and returned, and the
    /// page window moves to them.
    pub async fn next_page(&self) -> ClientResult<Option<Vec<T>>> {
        let _gate = self.fetch_gate.lock().await;
        self.fetch_next_page().await
    }

    /// Returns the next item, fetching a page when the window is exhausted.
    ///
    /// Returns `Ok(None)` when no further items exist.
    pub async fn next_item(&self) -> ClientResult<Option<T>> {
        let _gate = self.fetch_gate.lock().await;

        {
            let mut state = self.state.lock();
            let cursor = state.cursor;
            if let Some(item) = state.page().get(cursor).cloned() {
                state.cursor += 1;
                return Ok(Some(item));
            }
        }

        let page = self.fetch_next_page().await?;
        let mut state = self.state.lock();
        match page.and_then(|page| page.into_iter().next()) {
            Some(item) => {
                state.cursor = 1;
                Ok(Some(item))
            }
            None => {
                state.cursor = 0;
                Ok(None)
            }
        }
    }

    /// Fetches and appends one page. Callers hold `fetch_gate`.
    async fn fetch_next_page(&self) -> ClientResult<Option<Vec<T>>> {
        let Some(token) = self
            .continuation_token()
            .filter(|token| !token.is_empty())
        else {
            return Ok(None);
        };

        tracing::info!(continuation_token = %token, "fetching next page");

        let mut query_params = BTreeMap::new();
        let url = match &self.delegate {
            Some(delegate) => {
                delegate.continuation_url(&token, &mut query_params, &self.request_url)?
            }
            None => self.client.format(&token, std::iter::empty::<(&str, &str)>())?,
        };

        let request = self.client.request(
            Method::GET,
            &url,
            &query_params,
            self.request_headers.clone(),
            None,
        )?;
        let response = self.client.run(request, Context::new()).await?;
        let (new_items, continuation_token) = decode_page(&self.coding_keys, &response.body)?;

        let mut state = self.state.lock();
        let start = state.items.len();
        state.items.extend(new_items.iter().cloned());
        state.page_range = start..state.items.len();
        state.continuation_token = continuation_token;
        state.cursor = 0;
        Ok(Some(new_items))
    }
}

fn decode_page<T: DeserializeOwned>(
    coding_keys: &PagedCodingKeys,
    body: &[u8],
) -> ClientResult<(Vec<T>, Option<String>)> {
    if body.is_empty() {
        return Err(ClientError::decoding("response data expected but not found"));
    }
    let page: Value = serde_json::from_slice(body)
        .map_err(|e| ClientError::decoding_with_source("page is not valid JSON", e))?;
    if !page.is_object() {
        return Err(ClientError::decoding("response data expected but not found"));
    }

    let items = coding_keys
        .items(&page)
        .ok_or_else(|| ClientError::decoding("paged response expected but not found"))?;
    let items = items
        .iter()
        .map(<T as serde::Deserialize>::deserialize)
        .collect::<Result<Vec<T>, _>>()
        .map_err(|e| ClientError::decoding_with_source("page items have unexpected shape", e))?;
    let token = coding_keys.continuation_token(&page).map(str::to_string);

    Ok((items, token))
}

impl<T> std::fmt::Debug for PagedCollection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PagedCollection")
            .field("request_url", &self.request_url)
            .field("coding_keys", &self.coding_keys)
            .field("items", &state.items.len())
            .field("page_range", &state.page_range)
            .field("continuation_token", &state.continuation_token)
            .finish_non_exhaustive()
    }
}
