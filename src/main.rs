use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use log::error;
use tokio::sync::broadcast::{self, Receiver, Sender};

use tunevault::config::{self, Config};
use tunevault::library::LibraryManager;
use tunevault::media::ClockBackend;
use tunevault::model::{BY_DATE, PLAYLISTS, TRACKS};
use tunevault::notifier::{NotificationCenter, Notifier};
use tunevault::playback::{PlaybackEngine, PlaybackState};
use tunevault::protocol::{LibraryMessage, Message, PlaybackMessage};
use tunevault::repository::Repository;
use tunevault::store::{CollectionSpec, StoreProvider};

const USAGE: &str = "usage: tunevault <command>

commands:
  import <file>...   import audio files into the library
  list               list library tracks in creation order
  playlists          list playlists
  play <track-id>    play one track with the library as queue";

fn main() -> ExitCode {
    let mut clog = colog::default_builder();
    clog.filter(None, log::LevelFilter::Info);
    clog.init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        return ExitCode::FAILURE;
    };

    let data_dir = config::default_data_dir();
    let config = Config::load_or_create(&data_dir.join("config.toml"));

    let provider = match StoreProvider::open(
        &config.database_path(&data_dir),
        vec![
            CollectionSpec::new(TRACKS).with_index(BY_DATE),
            CollectionSpec::new(PLAYLISTS).with_index(BY_DATE),
        ],
    ) {
        Ok(provider) => provider,
        Err(err) => {
            error!("Main: Could not open the library database: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let (bus_sender, _) = broadcast::channel::<Message>(1024);
    spawn_managers(&bus_sender, &config, provider);

    match command.as_str() {
        "import" if args.len() > 1 => {
            let paths: Vec<PathBuf> = args[1..].iter().map(PathBuf::from).collect();
            import(&bus_sender, paths)
        }
        "list" => list_tracks(&bus_sender),
        "playlists" => list_playlists(&bus_sender),
        "play" if args.len() == 2 => play(&bus_sender, args[1].clone()),
        _ => {
            eprintln!("{}", USAGE);
            ExitCode::FAILURE
        }
    }
}

fn spawn_managers(bus_sender: &Sender<Message>, config: &Config, provider: StoreProvider) {
    let notifier = Notifier::new(bus_sender.clone());

    let mut center = NotificationCenter::with_dismiss_after(
        bus_sender.subscribe(),
        bus_sender.clone(),
        Duration::from_millis(config.notifications.dismiss_after_ms),
    );
    thread::spawn(move || center.run());

    let tracks = Repository::new(
        provider.collection(TRACKS).expect("tracks declared at open"),
        notifier.clone(),
    );
    let playlists = Repository::new(
        provider
            .collection(PLAYLISTS)
            .expect("playlists declared at open"),
        notifier.clone(),
    );
    let mut library = LibraryManager::new(
        bus_sender.subscribe(),
        bus_sender.clone(),
        tracks,
        playlists,
        notifier.clone(),
    );
    thread::spawn(move || library.run());

    let backend = ClockBackend::with_tick_interval(
        bus_sender.clone(),
        Duration::from_millis(config.playback.progress_interval_ms),
    );
    let mut engine = PlaybackEngine::new(
        bus_sender.subscribe(),
        bus_sender.clone(),
        backend,
        notifier,
    );
    let initial_volume = config.playback.initial_volume;
    thread::spawn(move || {
        engine.set_volume(initial_volume);
        engine.run();
    });
}

fn import(bus_sender: &Sender<Message>, paths: Vec<PathBuf>) -> ExitCode {
    let mut receiver = bus_sender.subscribe();
    let mut failures = 0;
    for path in paths {
        if bus_sender
            .send(Message::Library(LibraryMessage::ImportTrack(path.clone())))
            .is_err()
        {
            return ExitCode::FAILURE;
        }
        // One outcome per file, matched by path; unrelated snapshots from
        // startup or earlier imports are ignored.
        loop {
            match receiver.blocking_recv() {
                Ok(Message::Library(LibraryMessage::ImportSucceeded {
                    path: done, ..
                })) if done == path => {
                    println!("imported {}", path.display());
                    break;
                }
                Ok(Message::Library(LibraryMessage::ImportFailed {
                    path: failed,
                    reason,
                })) if failed == path => {
                    eprintln!("failed to import {}: {}", failed.display(), reason);
                    failures += 1;
                    break;
                }
                Ok(_) => {}
                Err(_) => return ExitCode::FAILURE,
            }
        }
    }
    if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn list_tracks(bus_sender: &Sender<Message>) -> ExitCode {
    let mut receiver = bus_sender.subscribe();
    let _ = bus_sender.send(Message::Library(LibraryMessage::ReloadTracks));
    loop {
        match receiver.blocking_recv() {
            Ok(Message::Library(LibraryMessage::TracksChanged(tracks))) => {
                for track in tracks {
                    println!(
                        "{}  {:>7.1}s  {} - {}",
                        track.id, track.duration, track.artist, track.title
                    );
                }
                return ExitCode::SUCCESS;
            }
            Ok(_) => {}
            Err(_) => return ExitCode::FAILURE,
        }
    }
}

fn list_playlists(bus_sender: &Sender<Message>) -> ExitCode {
    let mut receiver = bus_sender.subscribe();
    let _ = bus_sender.send(Message::Library(LibraryMessage::ReloadPlaylists));
    loop {
        match receiver.blocking_recv() {
            Ok(Message::Library(LibraryMessage::PlaylistsChanged(playlists))) => {
                for playlist in playlists {
                    println!(
                        "{}  {:>3} tracks  {} - {}",
                        playlist.id, playlist.track_count, playlist.artist, playlist.name
                    );
                }
                return ExitCode::SUCCESS;
            }
            Ok(_) => {}
            Err(_) => return ExitCode::FAILURE,
        }
    }
}

fn play(bus_sender: &Sender<Message>, track_id: String) -> ExitCode {
    let mut receiver = bus_sender.subscribe();
    let _ = bus_sender.send(Message::Library(LibraryMessage::PlayTrack { track_id }));
    watch_session(&mut receiver)
}

/// Prints session snapshots until playback winds down.
fn watch_session(receiver: &mut Receiver<Message>) -> ExitCode {
    let mut started = false;
    loop {
        match receiver.blocking_recv() {
            Ok(Message::Playback(PlaybackMessage::SessionChanged(snapshot))) => {
                let title = snapshot.current_track_title.as_deref().unwrap_or("-");
                println!(
                    "{:?}  {:>6.1}s / {:>6.1}s  {}",
                    snapshot.state, snapshot.current_time, snapshot.duration, title
                );
                if snapshot.state != PlaybackState::Stopped {
                    started = true;
                } else if started {
                    return ExitCode::SUCCESS;
                }
            }
            Ok(Message::Notification(_)) if !started => {
                // A lookup failure arrives as a notification before any
                // snapshot; the center already logged it.
                return ExitCode::FAILURE;
            }
            Ok(_) => {}
            Err(_) => return ExitCode::FAILURE,
        }
    }
}
