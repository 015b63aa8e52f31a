//! Remote catalog collaborator.
//!
//! The resolution pipeline only needs three calls: top-N search, a snapshot of
//! the target collection, and batched additions. `Catalog` is that seam;
//! `SpotifyCatalog` implements it against the Spotify Web API with a blocking
//! client, since lines are resolved strictly one after another.

use log::{debug, info, warn};
use rustc_hash::FxHashSet;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::models::{CandidateTrack, InventoryEntry, ItemKind};

const SPOTIFY_API_BASE: &str = "https://api.spotify.com/v1";
const USER_AGENT: &str = concat!("track-reconcile/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Spotify rejects more than 100 uris per add call
pub const MAX_ADD_BATCH: usize = 100;

/// Playlist page size (API maximum)
const INVENTORY_PAGE_SIZE: usize = 100;

/// Catalog client errors
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("{failed} of {batches} add batches failed (last: {last})")]
    BatchesFailed {
        failed: usize,
        batches: usize,
        last: String,
    },
}

/// What the resolution pipeline needs from the remote side.
pub trait Catalog {
    /// Search tracks, best hits first.
    fn search(&self, query: &str) -> Result<Vec<CandidateTrack>, CatalogError>;

    /// Append the target collection's contents to `into`, page by page. On
    /// error, whatever was appended before the failure stays usable.
    fn current_inventory(&self, into: &mut Vec<InventoryEntry>) -> Result<(), CatalogError>;

    /// Add tracks to the target collection. Duplicate ids are sent once.
    fn add_items(&self, ids: &[String]) -> Result<(), CatalogError>;
}

/// Accept either a share link (".../playlist/<id>?si=...") or a bare id.
pub fn extract_playlist_id(link: &str) -> String {
    match link.split_once("playlist/") {
        Some((_, rest)) => rest.split(['?', '/']).next().unwrap_or(rest).to_string(),
        None => link.trim().to_string(),
    }
}

// ============================================================================
// Spotify Web API payloads
// ============================================================================

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: Option<Paging<TrackObject>>,
}

#[derive(Debug, Deserialize)]
struct Paging<T> {
    items: Vec<T>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    track: Option<TrackObject>,
}

#[derive(Debug, Deserialize)]
struct TrackObject {
    #[serde(default)]
    name: String,
    #[serde(default)]
    artists: Vec<ArtistObject>,
    #[serde(default)]
    uri: String,
    #[serde(rename = "type", default)]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct ArtistObject {
    name: String,
}

impl From<TrackObject> for CandidateTrack {
    fn from(t: TrackObject) -> Self {
        CandidateTrack {
            kind: ItemKind::from(t.kind.as_str()),
            name: t.name,
            artists: t.artists.into_iter().map(|a| a.name).collect(),
            uri: t.uri,
        }
    }
}

// ============================================================================
// Spotify client
// ============================================================================

/// Spotify Web API client bound to one target playlist.
///
/// Takes an already-issued bearer token; obtaining one is up to the caller.
pub struct SpotifyCatalog {
    http_client: reqwest::blocking::Client,
    token: String,
    playlist_id: String,
    batch_pause: Duration,
}

impl SpotifyCatalog {
    pub fn new(token: &str, playlist: &str) -> Result<Self, CatalogError> {
        let http_client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            token: token.to_string(),
            playlist_id: extract_playlist_id(playlist),
            batch_pause: Duration::from_secs(1),
        })
    }

    pub fn playlist_id(&self) -> &str {
        &self.playlist_id
    }

    fn check(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, CatalogError> {
        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(CatalogError::RateLimited { retry_after });
        }

        if !status.is_success() {
            let error_text = response.text().unwrap_or_default();
            return Err(CatalogError::Api(status.as_u16(), error_text));
        }

        Ok(response)
    }

    fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, CatalogError> {
        let response = self
            .http_client
            .get(url)
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        Self::check(response)?
            .json()
            .map_err(|e| CatalogError::Parse(e.to_string()))
    }
}

impl Catalog for SpotifyCatalog {
    fn search(&self, query: &str) -> Result<Vec<CandidateTrack>, CatalogError> {
        debug!("Searching: {:?}", query);
        let url = format!("{}/search", SPOTIFY_API_BASE);
        let response: SearchResponse = self.get_json(
            &url,
            &[
                ("q", query.to_string()),
                ("type", "track".to_string()),
                ("limit", "1".to_string()),
            ],
        )?;

        Ok(response
            .tracks
            .map(|page| page.items.into_iter().map(CandidateTrack::from).collect())
            .unwrap_or_default())
    }

    fn current_inventory(&self, into: &mut Vec<InventoryEntry>) -> Result<(), CatalogError> {
        let first_url = format!("{}/playlists/{}/tracks", SPOTIFY_API_BASE, self.playlist_id);
        let mut page: Paging<PlaylistItem> = self.get_json(
            &first_url,
            &[
                ("limit", INVENTORY_PAGE_SIZE.to_string()),
                ("fields", "items(track(name,type,uri,artists(name))),next".to_string()),
            ],
        )?;

        loop {
            into.extend(
                page.items
                    .into_iter()
                    .filter_map(|item| item.track)
                    .map(|t| InventoryEntry::from(&CandidateTrack::from(t))),
            );
            debug!("Inventory page loaded ({} entries so far)", into.len());

            // `next` already carries the paging query
            match page.next {
                Some(next_url) => page = self.get_json(&next_url, &[])?,
                None => break,
            }
        }

        Ok(())
    }

    fn add_items(&self, ids: &[String]) -> Result<(), CatalogError> {
        let url = format!("{}/playlists/{}/tracks", SPOTIFY_API_BASE, self.playlist_id);
        send_in_batches(ids, self.batch_pause, |chunk| {
            let response = self
                .http_client
                .post(&url)
                .bearer_auth(&self.token)
                .json(&serde_json::json!({ "uris": chunk }))
                .send()
                .map_err(|e| CatalogError::Network(e.to_string()))?;
            Self::check(response).map(|_| ())
        })
    }
}

/// Deduplicate `ids` and hand them to `send` in chunks of `MAX_ADD_BATCH`,
/// pausing between chunks. A failed chunk is logged and the rest are still
/// sent; the failures come back as one `BatchesFailed`.
fn send_in_batches<F>(ids: &[String], pause: Duration, mut send: F) -> Result<(), CatalogError>
where
    F: FnMut(&[&String]) -> Result<(), CatalogError>,
{
    let mut seen = FxHashSet::default();
    let unique: Vec<&String> = ids.iter().filter(|id| seen.insert(id.as_str())).collect();
    if unique.is_empty() {
        return Ok(());
    }

    info!("Adding {} tracks to playlist...", unique.len());
    let mut batches = 0;
    let mut failed = 0;
    let mut last = String::new();

    for (i, chunk) in unique.chunks(MAX_ADD_BATCH).enumerate() {
        if i > 0 && !pause.is_zero() {
            std::thread::sleep(pause);
        }
        batches += 1;
        if let Err(e) = send(chunk) {
            warn!("Add batch {} ({} tracks) failed: {}", i + 1, chunk.len(), e);
            failed += 1;
            last = e.to_string();
        }
    }

    if failed > 0 {
        return Err(CatalogError::BatchesFailed {
            failed,
            batches,
            last,
        });
    }
    Ok(())
}
