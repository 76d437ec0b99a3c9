//! Pipeline context.
//!
//! The [`Context`] carries out-of-band values through the lifetime of a
//! request: the allowed status codes, the cancellation token, the decoded
//! payload produced by a stage, and so on. Stages communicate through it
//! without knowing about each other.
//!
//! # Structure
//!
//! A context is an immutable, singly-linked list of key/value nodes:
//!
//! ```text
//! head ──► (DeserializedData) ──► (CancellationToken) ──► (AllowedStatusCodes) ──► ∅
//! ```
//!
//! Adding a value never mutates an existing node. It allocates a new head
//! whose parent is the previous head, so two contexts derived from the same
//! base share the common suffix. Lookups walk from the head toward the root
//! and the first (most recently added) match wins.

use crate::cancellation::CancellationToken;
use bytes::Bytes;
use std::any::Any;
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Status codes treated as success when the context sets none.
pub const DEFAULT_ALLOWED_STATUS_CODES: &[u16] = &[200];

/// A type-erased, shareable context value.
pub type ContextValue = Arc<dyn Any + Send + Sync>;

/// Well-known context keys.
///
/// Values stored under the built-in keys have fixed types, which the typed
/// helpers on [`Context`] rely on:
///
/// | Key                  | Value type             |
/// |----------------------|------------------------|
/// | `AllowedStatusCodes` | `HashSet<u16>`         |
/// | `AllowedHeaders`     | `Vec<String>`          |
/// | `CancellationToken`  | [`CancellationToken`]  |
/// | `DeserializedData`   | `Bytes`                |
/// | `RequestStartTime`   | `Instant`              |
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContextKey {
    /// HTTP status codes treated as success for this call.
    AllowedStatusCodes,
    /// Header names that may be logged without redaction.
    AllowedHeaders,
    /// Cooperative cancellation token for this call.
    CancellationToken,
    /// Response payload decoded by a stage, preferred over the raw body.
    DeserializedData,
    /// When the request entered the pipeline.
    RequestStartTime,
    /// Caller-defined key.
    Custom(Cow<'static, str>),
}

impl ContextKey {
    /// Creates a caller-defined key.
    #[must_use]
    pub fn custom(name: impl Into<Cow<'static, str>>) -> Self {
        Self::Custom(name.into())
    }

    /// Returns the key name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::AllowedStatusCodes => "allowedStatusCodes",
            Self::AllowedHeaders => "allowedHeaders",
            Self::CancellationToken => "cancellationToken",
            Self::DeserializedData => "deserializedData",
            Self::RequestStartTime => "requestStartTime",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Node {
    key: ContextKey,
    value: ContextValue,
    parent: Option<Arc<Node>>,
}

/// Immutable, structurally shared key/value chain.
///
/// Cloning a context is O(1): it copies the head pointer. A context is
/// `Send + Sync` and can be read from many tasks at once; concurrent
/// [`add`](Self::add) calls on the same base produce independent heads.
///
/// # Example
///
/// ```
/// use cirrus_core::{Context, ContextKey};
///
/// let base = Context::new().add(ContextKey::custom("tenant"), "contoso".to_string());
/// let local = base.add(ContextKey::custom("tenant"), "fabrikam".to_string());
///
/// assert_eq!(base.value::<String>(&ContextKey::custom("tenant")).unwrap(), "contoso");
/// assert_eq!(local.value::<String>(&ContextKey::custom("tenant")).unwrap(), "fabrikam");
/// ```
#[derive(Clone, Default)]
pub struct Context {
    head: Option<Arc<Node>>,
}

impl Context {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a context from key/value pairs, added in iteration order.
    pub fn of<I, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (ContextKey, V)>,
        V: Any + Send + Sync,
    {
        entries
            .into_iter()
            .fold(Self::new(), |ctx, (key, value)| ctx.add(key, value))
    }

    /// Returns a new context with `value` stored under `key`.
    ///
    /// `self` is left untouched.
    #[must_use]
    pub fn add<V: Any + Send + Sync>(&self, key: ContextKey, value: V) -> Self {
        self.add_shared(key, Arc::new(value))
    }

    /// Returns a new context with an already type-erased value.
    #[must_use]
    pub fn add_shared(&self, key: ContextKey, value: ContextValue) -> Self {
        Self {
            head: Some(Arc::new(Node {
                key,
                value,
                parent: self.head.clone(),
            })),
        }
    }

    /// Returns the most recently added value for `key`, if any.
    #[must_use]
    pub fn raw(&self, key: &ContextKey) -> Option<&ContextValue> {
        self.nodes().find(|node| &node.key == key).map(|node| &node.value)
    }

    /// Returns the most recently added value for `key` as a `T`.
    ///
    /// Returns `None` if the key is absent or if the most recent value has
    /// a different type. Older values are never consulted once a match is
    /// found.
    #[must_use]
    pub fn value<T: Any + Send + Sync>(&self, key: &ContextKey) -> Option<&T> {
        self.raw(key).and_then(|value| value.downcast_ref::<T>())
    }

    /// Returns true if a value is present for `key`.
    #[must_use]
    pub fn contains(&self, key: &ContextKey) -> bool {
        self.raw(key).is_some()
    }

    /// Number of nodes in the chain, including shadowed entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes().count()
    }

    /// Returns true if nothing has been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Iterates all entries from newest to oldest, including shadowed ones.
    pub fn iter(&self) -> impl Iterator<Item = (&ContextKey, &ContextValue)> {
        self.nodes().map(|node| (&node.key, &node.value))
    }

    /// Returns the effective value of every key.
    #[must_use]
    pub fn to_map(&self) -> HashMap<ContextKey, ContextValue> {
        let mut map = HashMap::new();
        for (key, value) in self.iter() {
            map.entry(key.clone()).or_insert_with(|| Arc::clone(value));
        }
        map
    }

    /// Folds every entry of `other` onto `self`.
    ///
    /// Entries of `other` are replayed oldest to newest, so the result
    /// preserves `other`'s internal ordering. On a key collision the value
    /// from `other` wins: pass the more specific context as the argument.
    #[must_use]
    pub fn merge(&self, other: &Context) -> Self {
        let mut entries: Vec<_> = other.iter().collect();
        entries.reverse();
        entries.into_iter().fold(self.clone(), |ctx, (key, value)| {
            ctx.add_shared(key.clone(), Arc::clone(value))
        })
    }

    /// Returns true if both contexts share the same head node.
    #[must_use]
    pub fn ptr_eq(&self, other: &Context) -> bool {
        match (&self.head, &other.head) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    fn nodes(&self) -> Nodes<'_> {
        Nodes {
            current: self.head.as_deref(),
        }
    }

    // Typed helpers for the built-in keys

    /// Sets the status codes treated as success.
    #[must_use]
    pub fn with_allowed_status_codes(&self, codes: impl IntoIterator<Item = u16>) -> Self {
        let codes: HashSet<u16> = codes.into_iter().collect();
        self.add(ContextKey::AllowedStatusCodes, codes)
    }

    /// Returns the allowed status codes, if set.
    #[must_use]
    pub fn allowed_status_codes(&self) -> Option<&HashSet<u16>> {
        self.value(&ContextKey::AllowedStatusCodes)
    }

    /// Whether `status` passes the status-code gate: the allowed codes when
    /// set, otherwise [`DEFAULT_ALLOWED_STATUS_CODES`].
    #[must_use]
    pub fn is_status_allowed(&self, status: u16) -> bool {
        self.allowed_status_codes().map_or_else(
            || DEFAULT_ALLOWED_STATUS_CODES.contains(&status),
            |codes| codes.contains(&status),
        )
    }

    /// Sets the header names that may be logged verbatim.
    #[must_use]
    pub fn with_allowed_headers<I, S>(&self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let headers: Vec<String> = headers
            .into_iter()
            .map(|h| h.into().to_ascii_lowercase())
            .collect();
        self.add(ContextKey::AllowedHeaders, headers)
    }

    /// Returns the per-call allowed header names, if set.
    #[must_use]
    pub fn allowed_headers(&self) -> Option<&Vec<String>> {
        self.value(&ContextKey::AllowedHeaders)
    }

    /// Attaches a cancellation token.
    #[must_use]
    pub fn with_cancellation_token(&self, token: CancellationToken) -> Self {
        self.add(ContextKey::CancellationToken, token)
    }

    /// Attaches a cancellation token, applying the client's default timeout.
    ///
    /// - A supplied token without its own timeout inherits `default_timeout`.
    /// - Without a token, a fresh token is created if `default_timeout` is set.
    /// - With neither, the context is returned unchanged.
    #[must_use]
    pub fn with_cancellation(
        &self,
        token: Option<CancellationToken>,
        default_timeout: Option<Duration>,
    ) -> Self {
        match (token, default_timeout) {
            (Some(token), Some(timeout)) => {
                token.apply_default_timeout(timeout);
                self.with_cancellation_token(token)
            }
            (Some(token), None) => self.with_cancellation_token(token),
            (None, Some(timeout)) => {
                self.with_cancellation_token(CancellationToken::with_timeout(timeout))
            }
            (None, None) => self.clone(),
        }
    }

    /// Returns the cancellation token, if any.
    #[must_use]
    pub fn cancellation_token(&self) -> Option<&CancellationToken> {
        self.value(&ContextKey::CancellationToken)
    }

    /// Stores a decoded response payload.
    #[must_use]
    pub fn with_deserialized_data(&self, data: Bytes) -> Self {
        self.add(ContextKey::DeserializedData, data)
    }

    /// Returns the decoded response payload, if a stage produced one.
    #[must_use]
    pub fn deserialized_data(&self) -> Option<&Bytes> {
        self.value(&ContextKey::DeserializedData)
    }

    /// Records when the request entered the pipeline.
    #[must_use]
    pub fn with_request_start_time(&self, started_at: Instant) -> Self {
        self.add(ContextKey::RequestStartTime, started_at)
    }

    /// Returns when the request entered the pipeline, if recorded.
    #[must_use]
    pub fn request_start_time(&self) -> Option<Instant> {
        self.value::<Instant>(&ContextKey::RequestStartTime).copied()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.nodes().map(|node| node.key.as_str()))
            .finish()
    }
}

struct Nodes<'a> {
    current: Option<&'a Node>,
}

impl<'a> Iterator for Nodes<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.current?;
        self.current = node.parent.as_deref();
        Some(node)
    }
}
