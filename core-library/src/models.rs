//! Logical row shapes of the media index cache.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

use crate::error::{LibraryError, Result};

/// Stored resume key of a fully synced parent.
pub const SYNCED_RESUME_KEY: &str = "SYNCED";

const MIME_TYPE_SEPARATOR: char = ',';

// =============================================================================
// Sync source and resume state
// =============================================================================

/// Which of the two bound authorities a row or a sync run belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncSource {
    Local,
    Cloud,
}

impl SyncSource {
    pub const ALL: [SyncSource; 2] = [SyncSource::Local, SyncSource::Cloud];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncSource::Local => "local",
            SyncSource::Cloud => "cloud",
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, SyncSource::Local)
    }

    /// Column pair `(resume_key, authority)` holding this source's resume
    /// state in `search_requests`.
    pub(crate) fn search_resume_columns(&self) -> (&'static str, &'static str) {
        match self {
            SyncSource::Local => ("local_sync_resume_key", "local_authority"),
            SyncSource::Cloud => ("cloud_sync_resume_key", "cloud_authority"),
        }
    }
}

impl fmt::Display for SyncSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SyncSource {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "local" => Ok(SyncSource::Local),
            "cloud" => Ok(SyncSource::Cloud),
            other => Err(LibraryError::invalid_input(
                "sync_source",
                format!("unknown sync source '{}'", other),
            )),
        }
    }
}

/// Scheduler wire codes: 1 is local, 2 is cloud. Anything else, including the
/// combined "local and cloud" code 0, is rejected.
impl TryFrom<i32> for SyncSource {
    type Error = LibraryError;

    fn try_from(code: i32) -> Result<Self> {
        match code {
            1 => Ok(SyncSource::Local),
            2 => Ok(SyncSource::Cloud),
            other => Err(LibraryError::invalid_input(
                "sync_source",
                format!("invalid sync source code {}", other),
            )),
        }
    }
}

/// Position of a paged sync: an opaque continuation token or the terminal
/// marker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResumeKey {
    Token(String),
    Synced,
}

impl ResumeKey {
    /// Parse a stored column value. Empty values are treated as absent.
    pub fn from_stored(value: Option<String>) -> Option<Self> {
        match value {
            None => None,
            Some(v) if v.is_empty() => None,
            Some(v) if v == SYNCED_RESUME_KEY => Some(ResumeKey::Synced),
            Some(v) => Some(ResumeKey::Token(v)),
        }
    }

    /// Interpret the continuation token a provider attached to a page. A
    /// missing or empty token means there are no further pages.
    pub fn from_provider(token: Option<&str>) -> Self {
        match token {
            None | Some("") | Some(SYNCED_RESUME_KEY) => ResumeKey::Synced,
            Some(t) => ResumeKey::Token(t.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ResumeKey::Token(t) => t,
            ResumeKey::Synced => SYNCED_RESUME_KEY,
        }
    }

    pub fn is_synced(&self) -> bool {
        matches!(self, ResumeKey::Synced)
    }

    pub fn token(&self) -> Option<&str> {
        match self {
            ResumeKey::Token(t) => Some(t),
            ResumeKey::Synced => None,
        }
    }
}

/// Immutable snapshot of one (parent, source) resume position and the
/// authority it was obtained from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResumeState {
    pub key: Option<ResumeKey>,
    pub authority: Option<String>,
}

impl ResumeState {
    pub fn never_synced() -> Self {
        Self::default()
    }

    pub fn synced(authority: impl Into<String>) -> Self {
        Self {
            key: Some(ResumeKey::Synced),
            authority: Some(authority.into()),
        }
    }

    pub fn partial(token: impl Into<String>, authority: impl Into<String>) -> Self {
        Self {
            key: Some(ResumeKey::Token(token.into())),
            authority: Some(authority.into()),
        }
    }

    pub fn is_synced(&self) -> bool {
        self.key.as_ref().is_some_and(ResumeKey::is_synced)
    }

    /// Token to resume from, `None` when starting from the first page.
    pub fn start_token(&self) -> Option<&str> {
        self.key.as_ref().and_then(ResumeKey::token)
    }

    /// True when progress was recorded against a different authority.
    pub fn is_bound_to_other(&self, authority: &str) -> bool {
        self.authority.as_deref().is_some_and(|a| a != authority)
    }
}

// =============================================================================
// Search requests
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuggestionType {
    Face,
    Location,
    Date,
    Album,
    History,
    Text,
}

impl SuggestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionType::Face => "FACE",
            SuggestionType::Location => "LOCATION",
            SuggestionType::Date => "DATE",
            SuggestionType::Album => "ALBUM",
            SuggestionType::History => "HISTORY",
            SuggestionType::Text => "TEXT",
        }
    }
}

impl FromStr for SuggestionType {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "FACE" => Ok(SuggestionType::Face),
            "LOCATION" => Ok(SuggestionType::Location),
            "DATE" => Ok(SuggestionType::Date),
            "ALBUM" => Ok(SuggestionType::Album),
            "HISTORY" => Ok(SuggestionType::History),
            "TEXT" => Ok(SuggestionType::Text),
            other => Err(LibraryError::invalid_input(
                "suggestion_type",
                format!("unknown suggestion type '{}'", other),
            )),
        }
    }
}

/// The suggestion a search request was started from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionRef {
    pub media_set_id: String,
    pub authority: String,
    pub suggestion_type: SuggestionType,
}

/// A search to be created. Needs search text, a suggestion, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewSearchRequest {
    pub search_text: Option<String>,
    pub suggestion: Option<SuggestionRef>,
    pub mime_types: Option<Vec<String>>,
}

impl NewSearchRequest {
    pub fn text(search_text: impl Into<String>) -> Self {
        Self {
            search_text: Some(search_text.into()),
            ..Self::default()
        }
    }

    pub fn from_suggestion(suggestion: SuggestionRef, search_text: Option<String>) -> Self {
        Self {
            search_text,
            suggestion: Some(suggestion),
            mime_types: None,
        }
    }

    pub fn with_mime_types(mut self, mime_types: Vec<String>) -> Self {
        self.mime_types = Some(mime_types);
        self
    }

    pub fn validate(&self) -> Result<()> {
        let has_text = self.search_text.as_deref().is_some_and(|t| !t.is_empty());
        let has_suggestion = self
            .suggestion
            .as_ref()
            .is_some_and(|s| !s.media_set_id.is_empty() && !s.authority.is_empty());
        if !has_text && !has_suggestion {
            return Err(LibraryError::invalid_input(
                "search_request",
                "either search text or a suggestion is required",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub id: i64,
    pub search_text: Option<String>,
    pub suggestion: Option<SuggestionRef>,
    pub mime_types: Option<Vec<String>>,
    pub local_resume: ResumeState,
    pub cloud_resume: ResumeState,
}

impl SearchRequest {
    pub fn resume_state(&self, source: SyncSource) -> &ResumeState {
        match source {
            SyncSource::Local => &self.local_resume,
            SyncSource::Cloud => &self.cloud_resume,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct SearchRequestRow {
    pub id: i64,
    pub search_text: Option<String>,
    pub media_set_id: Option<String>,
    pub suggestion_authority: Option<String>,
    pub suggestion_type: Option<String>,
    pub mime_types: Option<String>,
    pub local_sync_resume_key: Option<String>,
    pub local_authority: Option<String>,
    pub cloud_sync_resume_key: Option<String>,
    pub cloud_authority: Option<String>,
}

impl TryFrom<SearchRequestRow> for SearchRequest {
    type Error = LibraryError;

    fn try_from(row: SearchRequestRow) -> Result<Self> {
        let suggestion = match (row.media_set_id, row.suggestion_authority) {
            (Some(media_set_id), Some(authority)) => {
                let suggestion_type = row
                    .suggestion_type
                    .as_deref()
                    .unwrap_or("TEXT")
                    .parse::<SuggestionType>()
                    .map_err(|e: LibraryError| LibraryError::CorruptRow {
                        table: "search_requests".to_string(),
                        message: e.to_string(),
                    })?;
                Some(SuggestionRef {
                    media_set_id,
                    authority,
                    suggestion_type,
                })
            }
            _ => None,
        };

        Ok(SearchRequest {
            id: row.id,
            search_text: row.search_text,
            suggestion,
            mime_types: split_mime_types(row.mime_types),
            local_resume: ResumeState {
                key: ResumeKey::from_stored(row.local_sync_resume_key),
                authority: row.local_authority,
            },
            cloud_resume: ResumeState {
                key: ResumeKey::from_stored(row.cloud_sync_resume_key),
                authority: row.cloud_authority,
            },
        })
    }
}

// =============================================================================
// Media sets
// =============================================================================

/// A named collection of media under a category, owned by one authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSet {
    /// Local surrogate key referenced by `media_in_media_set`.
    pub picker_id: i64,
    pub category_id: String,
    pub media_set_id: String,
    pub authority: String,
    pub display_name: Option<String>,
    pub cover_media_id: Option<String>,
    pub mime_types: Option<Vec<String>>,
    pub resume_key: Option<ResumeKey>,
}

#[derive(Debug, FromRow)]
pub(crate) struct MediaSetRow {
    pub picker_id: i64,
    pub category_id: String,
    pub media_set_id: String,
    pub authority: String,
    pub display_name: Option<String>,
    pub cover_media_id: Option<String>,
    pub mime_types: Option<String>,
    pub media_resume_key: Option<String>,
}

impl From<MediaSetRow> for MediaSet {
    fn from(row: MediaSetRow) -> Self {
        MediaSet {
            picker_id: row.picker_id,
            category_id: row.category_id,
            media_set_id: row.media_set_id,
            authority: row.authority,
            display_name: row.display_name,
            cover_media_id: row.cover_media_id,
            mime_types: split_mime_types(row.mime_types),
            resume_key: ResumeKey::from_stored(row.media_resume_key),
        }
    }
}

/// Media-set columns written by a sync page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSetRecord {
    pub media_set_id: String,
    pub authority: String,
    pub display_name: Option<String>,
    pub cover_media_id: Option<String>,
    pub mime_types: Option<Vec<String>>,
}

// =============================================================================
// Cached media
// =============================================================================

/// Parent that owns a set of cached media rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaParent {
    SearchRequest(i64),
    MediaSet(i64),
}

impl MediaParent {
    pub fn id(&self) -> i64 {
        match self {
            MediaParent::SearchRequest(id) | MediaParent::MediaSet(id) => *id,
        }
    }

    pub(crate) fn table(&self) -> &'static str {
        match self {
            MediaParent::SearchRequest(_) => "search_result_media",
            MediaParent::MediaSet(_) => "media_in_media_set",
        }
    }

    pub(crate) fn parent_column(&self) -> &'static str {
        match self {
            MediaParent::SearchRequest(_) => "search_request_id",
            MediaParent::MediaSet(_) => "media_set_picker_id",
        }
    }
}

impl fmt::Display for MediaParent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaParent::SearchRequest(id) => write!(f, "search_request:{}", id),
            MediaParent::MediaSet(id) => write!(f, "media_set:{}", id),
        }
    }
}

/// Denormalized copy of provider media columns, keyed by
/// `(parent, authority, media_id)`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct MediaRecord {
    pub authority: String,
    pub media_id: String,
    pub local_id: Option<String>,
    pub cloud_id: Option<String>,
    pub is_local: bool,
    pub mime_type: Option<String>,
    pub date_taken_ms: Option<i64>,
    pub size_bytes: Option<i64>,
    pub duration_ms: Option<i64>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub display_name: Option<String>,
}

/// What to do when a written media row already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Overwrite columns that differ.
    Replace,
    /// Keep the existing row.
    Ignore,
}

impl ConflictPolicy {
    /// Local writes refresh rows; cloud writes never overwrite.
    pub fn for_source(source: SyncSource) -> Self {
        match source {
            SyncSource::Local => ConflictPolicy::Replace,
            SyncSource::Cloud => ConflictPolicy::Ignore,
        }
    }
}

// =============================================================================
// Suggestions and history
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct SearchHistoryEntry {
    pub authority: Option<String>,
    pub search_text: Option<String>,
    pub media_set_id: Option<String>,
    pub cover_media_id: Option<String>,
    pub created_at_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedSuggestion {
    pub authority: String,
    pub search_text: Option<String>,
    pub media_set_id: Option<String>,
    pub suggestion_type: SuggestionType,
    pub cover_media_id: Option<String>,
    pub created_at_ms: i64,
}

pub(crate) fn join_mime_types(mime_types: Option<&[String]>) -> Option<String> {
    mime_types
        .filter(|m| !m.is_empty())
        .map(|m| m.join(&MIME_TYPE_SEPARATOR.to_string()))
}

pub(crate) fn split_mime_types(value: Option<String>) -> Option<Vec<String>> {
    value.filter(|v| !v.is_empty()).map(|v| {
        v.split(MIME_TYPE_SEPARATOR)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}
