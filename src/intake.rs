//! File-intake glue: builds track drafts from on-disk audio files.
//!
//! Reads the payload, probes its duration, and pulls title/artist/genre from
//! embedded tags with filename fallbacks. The resulting [`TrackDraft`] is the
//! bundle `TrackRepository::add` expects; duration is pre-computed here so
//! the repository never touches the payload.

use std::io::Cursor;
use std::path::Path;

use lofty::file::TaggedFileExt;
use lofty::prelude::Accessor;
use lofty::tag::Tag;
use log::{debug, warn};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::model::{Genre, TrackDraft};

/// Probes an audio payload for its duration in seconds. Returns `None` when
/// the payload cannot be decoded; callers default to 0.
pub fn probe_duration(payload: &[u8], mime_type: &str) -> Option<f64> {
    let source = MediaSourceStream::new(
        Box::new(Cursor::new(payload.to_vec())),
        Default::default(),
    );
    let mut hint = Hint::new();
    if let Some(extension) = extension_for_mime(mime_type) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .ok()?;
    let track = probed.format.default_track()?;
    let params = &track.codec_params;

    if let (Some(time_base), Some(frames)) = (params.time_base, params.n_frames) {
        let time = time_base.calc_time(frames);
        return Some(time.seconds as f64 + time.frac);
    }
    let frames = params.n_frames? as f64;
    let sample_rate = params.sample_rate? as f64;
    Some(frames / sample_rate)
}

/// Builds a track draft from one audio file on disk.
pub fn draft_from_file(path: &Path) -> Result<TrackDraft, std::io::Error> {
    let file = std::fs::read(path)?;
    let size = file.len() as u64;
    let mime_type = mime_for_path(path).to_string();

    let tagged = match lofty::read_from_path(path) {
        Ok(tagged) => Some(tagged),
        Err(err) => {
            warn!(
                "Intake: No readable tags in {}: {}",
                path.display(),
                err
            );
            None
        }
    };
    let tag: Option<&Tag> = tagged
        .as_ref()
        .and_then(|file| file.primary_tag().or_else(|| file.first_tag()));

    let title = tag
        .and_then(|tag| tag.title().map(|value| value.into_owned()))
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| fallback_title(path));
    let artist = tag
        .and_then(|tag| tag.artist().map(|value| value.into_owned()))
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "Unknown Artist".to_string());
    let genre = tag
        .and_then(|tag| tag.genre().map(|value| Genre::from_tag(&value)))
        .unwrap_or_default();

    let duration = probe_duration(&file, &mime_type).unwrap_or(0.0);
    debug!(
        "Intake: Drafted '{}' by '{}' ({} bytes, {:.1}s)",
        title, artist, size, duration
    );

    Ok(TrackDraft {
        title,
        artist,
        description: None,
        genre,
        duration,
        mime_type,
        size,
        file,
        cover_image: None,
    })
}

fn fallback_title(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Untitled".to_string())
}

fn mime_for_path(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "mp3" => "audio/mpeg",
        "flac" => "audio/flac",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "m4a" | "mp4" => "audio/mp4",
        "aac" => "audio/aac",
        _ => "application/octet-stream",
    }
}

fn extension_for_mime(mime_type: &str) -> Option<&'static str> {
    match mime_type {
        "audio/mpeg" => Some("mp3"),
        "audio/flac" => Some("flac"),
        "audio/wav" | "audio/x-wav" => Some("wav"),
        "audio/ogg" => Some("ogg"),
        "audio/mp4" => Some("m4a"),
        "audio/aac" => Some("aac"),
        _ => None,
    }
}
