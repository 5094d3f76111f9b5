//! Persisted entity models shared by storage, repositories and playback.

use chrono::Utc;
use uuid::Uuid;

use crate::store::Record;

/// Collection name for tracks.
pub const TRACKS: &str = "tracks";
/// Collection name for playlists.
pub const PLAYLISTS: &str = "playlists";
/// Creation-time secondary index declared on both collections.
pub const BY_DATE: &str = "by_date";

/// Maximum playlist name length accepted by the form.
pub const PLAYLIST_NAME_MAX: usize = 50;
/// Maximum playlist description length accepted by the form.
pub const PLAYLIST_DESCRIPTION_MAX: usize = 200;

/// Fixed genre vocabulary offered at upload time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
pub enum Genre {
    Pop,
    Rock,
    Rap,
    #[serde(rename = "Hip-Hop")]
    HipHop,
    Jazz,
    Classical,
    Electronic,
    #[serde(rename = "R&B")]
    Rnb,
    Country,
    #[default]
    Other,
}

impl Genre {
    /// Maps a free-form tag value onto the fixed vocabulary.
    pub fn from_tag(value: &str) -> Genre {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "pop" => Genre::Pop,
            "rock" => Genre::Rock,
            "rap" => Genre::Rap,
            "hip-hop" | "hip hop" | "hiphop" => Genre::HipHop,
            "jazz" => Genre::Jazz,
            "classical" => Genre::Classical,
            "electronic" | "electronica" | "edm" => Genre::Electronic,
            "r&b" | "rnb" | "rhythm and blues" => Genre::Rnb,
            "country" => Genre::Country,
            _ => Genre::Other,
        }
    }
}

/// One imported audio file, payload included.
///
/// The id is assigned once at creation and never reused after deletion.
/// `added_at` (UTC milliseconds) is the default ordering key.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Track {
    pub id: String,
    pub title: String,
    pub artist: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub genre: Genre,
    /// Probed duration in seconds; 0.0 when the payload was unprobeable.
    pub duration: f64,
    pub mime_type: String,
    /// Payload size in bytes.
    pub size: u64,
    /// Creation timestamp in UTC milliseconds.
    pub added_at: i64,
    /// Binary audio payload, owned by the store once persisted.
    #[serde(with = "base64_bytes")]
    pub file: Vec<u8>,
    /// Opaque encoded cover image, stored inline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
}

impl Record for Track {
    fn id(&self) -> &str {
        &self.id
    }

    fn index_key(&self, index: &str) -> Option<i64> {
        (index == BY_DATE).then_some(self.added_at)
    }
}

/// Track fields supplied by the file-intake collaborator; id and creation
/// timestamp are synthesized by the repository at add time.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackDraft {
    pub title: String,
    pub artist: String,
    pub description: Option<String>,
    pub genre: Genre,
    pub duration: f64,
    pub mime_type: String,
    pub size: u64,
    pub file: Vec<u8>,
    pub cover_image: Option<String>,
}

impl TrackDraft {
    pub fn into_track(self, id: String, added_at: i64) -> Track {
        Track {
            id,
            title: self.title,
            artist: self.artist,
            description: self.description,
            genre: self.genre,
            duration: self.duration,
            mime_type: self.mime_type,
            size: self.size,
            added_at,
            file: self.file,
            cover_image: self.cover_image,
        }
    }
}

/// A named, ordered selection of track ids.
///
/// Ids are weak references: deleting a track does not cascade into
/// playlists, dangling ids are filtered at read time.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    /// Owner label shown alongside the playlist.
    pub artist: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Ordered member track ids, duplicates disallowed.
    #[serde(default)]
    pub track_ids: Vec<String>,
    /// Creation timestamp in UTC milliseconds.
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
}

impl Record for Playlist {
    fn id(&self) -> &str {
        &self.id
    }

    fn index_key(&self, index: &str) -> Option<i64> {
        (index == BY_DATE).then_some(self.created_at)
    }
}

/// Validated playlist fields; construction rejects out-of-bounds values
/// before anything reaches the store.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistDraft {
    name: String,
    artist: String,
    description: Option<String>,
    cover_image: Option<String>,
}

impl PlaylistDraft {
    pub fn new(
        name: &str,
        artist: &str,
        description: Option<&str>,
        cover_image: Option<String>,
    ) -> Result<Self, String> {
        let name = name.trim();
        if name.is_empty() {
            return Err("Playlist name is required".to_string());
        }
        if name.chars().count() > PLAYLIST_NAME_MAX {
            return Err(format!(
                "Playlist name must be at most {} characters",
                PLAYLIST_NAME_MAX
            ));
        }
        if let Some(description) = description {
            if description.chars().count() > PLAYLIST_DESCRIPTION_MAX {
                return Err(format!(
                    "Playlist description must be at most {} characters",
                    PLAYLIST_DESCRIPTION_MAX
                ));
            }
        }
        Ok(Self {
            name: name.to_string(),
            artist: artist.to_string(),
            description: description.map(str::to_string),
            cover_image,
        })
    }

    pub fn into_playlist(self, id: String, created_at: i64) -> Playlist {
        Playlist {
            id,
            name: self.name,
            artist: self.artist,
            description: self.description,
            track_ids: Vec::new(),
            created_at,
            cover_image: self.cover_image,
        }
    }
}

/// New unique record id.
pub fn new_record_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current UTC time in milliseconds, the creation-timestamp format used by
/// both collections.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Binary payloads are carried as base64 inside the JSON record body.
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_track() -> Track {
        TrackDraft {
            title: "First Light".to_string(),
            artist: "The Harbor".to_string(),
            description: Some("demo".to_string()),
            genre: Genre::HipHop,
            duration: 200.0,
            mime_type: "audio/mpeg".to_string(),
            size: 4,
            file: vec![0x00, 0x01, 0xfe, 0xff],
            cover_image: None,
        }
        .into_track("track-1".to_string(), 1_700_000_000_000)
    }

    #[test]
    fn test_track_record_round_trips_through_json_with_payload() {
        let track = sample_track();
        let encoded = serde_json::to_string(&track).expect("track should serialize");
        assert!(encoded.contains("\"Hip-Hop\""));
        // Payload must be base64 text, not a JSON byte array.
        assert!(encoded.contains(&base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            &track.file
        )));

        let decoded: Track = serde_json::from_str(&encoded).expect("track should deserialize");
        assert_eq!(decoded, track);
    }

    #[test]
    fn test_genre_serde_names_match_fixed_vocabulary() {
        assert_eq!(serde_json::to_string(&Genre::Rnb).unwrap(), "\"R&B\"");
        assert_eq!(
            serde_json::from_str::<Genre>("\"Hip-Hop\"").unwrap(),
            Genre::HipHop
        );
        assert_eq!(serde_json::from_str::<Genre>("\"Pop\"").unwrap(), Genre::Pop);
    }

    #[test]
    fn test_genre_from_tag_maps_loose_spellings() {
        assert_eq!(Genre::from_tag("Hip Hop"), Genre::HipHop);
        assert_eq!(Genre::from_tag("rnb"), Genre::Rnb);
        assert_eq!(Genre::from_tag("  Rock "), Genre::Rock);
        assert_eq!(Genre::from_tag("post-dubstep revival"), Genre::Other);
    }

    #[test]
    fn test_playlist_draft_enforces_name_bounds() {
        assert!(PlaylistDraft::new("", "me", None, None).is_err());
        assert!(PlaylistDraft::new("   ", "me", None, None).is_err());

        let at_limit = "n".repeat(PLAYLIST_NAME_MAX);
        assert!(PlaylistDraft::new(&at_limit, "me", None, None).is_ok());

        let over_limit = "n".repeat(PLAYLIST_NAME_MAX + 1);
        assert!(PlaylistDraft::new(&over_limit, "me", None, None).is_err());
    }

    #[test]
    fn test_playlist_draft_enforces_description_bound() {
        let at_limit = "d".repeat(PLAYLIST_DESCRIPTION_MAX);
        assert!(PlaylistDraft::new("mix", "me", Some(&at_limit), None).is_ok());

        let over_limit = "d".repeat(PLAYLIST_DESCRIPTION_MAX + 1);
        assert!(PlaylistDraft::new("mix", "me", Some(&over_limit), None).is_err());
    }

    #[test]
    fn test_index_keys_expose_creation_timestamps() {
        let track = sample_track();
        assert_eq!(track.index_key(BY_DATE), Some(track.added_at));
        assert_eq!(track.index_key("by_title"), None);

        let playlist = PlaylistDraft::new("mix", "me", None, None)
            .unwrap()
            .into_playlist("playlist-1".to_string(), 42);
        assert_eq!(playlist.index_key(BY_DATE), Some(42));
    }
}
