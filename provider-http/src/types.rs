//! Provider API response types
//!
//! Data structures for deserializing the provider's JSON responses.

use bridge_traits::{ProviderCapabilities, ProviderRow};
use serde::{Deserialize, Serialize};

/// A media item or media set as returned by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRow {
    pub id: String,

    /// Set by cloud providers for items mirroring a device item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_media_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    /// Milliseconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_taken_millis: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_millis: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_media_id: Option<String>,
}

impl From<WireRow> for ProviderRow {
    fn from(row: WireRow) -> Self {
        ProviderRow {
            id: row.id,
            local_media_id: row.local_media_id,
            mime_type: row.mime_type,
            date_taken_ms: row.date_taken_millis,
            size_bytes: row.size_bytes,
            duration_ms: row.duration_millis,
            width: row.width,
            height: row.height,
            display_name: row.display_name,
            cover_media_id: row.cover_media_id,
        }
    }
}

/// A page of rows.
///
/// `items` may be absent on the wire; that is reported as a missing page, not
/// an empty one.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse {
    pub items: Option<Vec<WireRow>>,

    /// Token for next page
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitiesResponse {
    #[serde(default)]
    pub search_enabled: bool,

    #[serde(default)]
    pub media_categories_enabled: bool,
}

impl From<CapabilitiesResponse> for ProviderCapabilities {
    fn from(response: CapabilitiesResponse) -> Self {
        ProviderCapabilities {
            search_enabled: response.search_enabled,
            media_categories_enabled: response.media_categories_enabled,
        }
    }
}
