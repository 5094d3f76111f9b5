//! Local-first media library: typed persistent storage over an indexed
//! key/value store, cached repositories for tracks and playlists, and a
//! queue-navigating playback engine driven by media-backend events.

pub mod config;
pub mod error;
pub mod intake;
pub mod library;
pub mod media;
pub mod model;
pub mod notifier;
pub mod playback;
pub mod protocol;
pub mod repository;
pub mod store;
