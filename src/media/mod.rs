// SPDX-License-Identifier: MPL-2.0

//! Media playback backends for plan items.
//!
//! Each scheduled item owns one player. The player is paused (buffering) as
//! soon as the item is scheduled, played at its start time and stopped at its
//! end time. Players report state changes through [`Player::poll`], which the
//! scheduler turns into lifecycle notifications.
//!
//! # Module Structure
//!
//! - [`gst`]: GStreamer `playbin` pipelines (`gstreamer` feature)
//! - [`headless`]: state-only player that just logs, for devices without a display
//!
//! # Item Kinds
//!
//! | Kind | Pipeline | Audio |
//! |------|----------|-------|
//! | `image` | `playbin` → `imagefreeze` video sink | - |
//! | `video` | `playbin` | muted |
//! | `audiovideo` | `playbin` | yes |

#[cfg(feature = "gstreamer")]
mod gst;
mod headless;

use std::path::Path;

use eyre::{WrapErr, eyre};
use url::Url;

#[cfg(feature = "gstreamer")]
pub use gst::GstPlayer;
pub use headless::HeadlessPlayer;

/// What kind of media an item plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
    AudioVideo,
}

/// Coarse pipeline state as seen by the item handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaState {
    Stopped,
    Paused,
    Playing,
}

/// Something a player reported since the last poll.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    State(MediaState),
    Eos,
    Error(String),
}

pub trait Player {
    /// Preroll without presenting anything.
    fn pause(&mut self) -> eyre::Result<()>;
    fn play(&mut self) -> eyre::Result<()>;
    /// Release the pipeline. Safe to call in any state, including twice.
    fn stop(&mut self) -> eyre::Result<()>;
    /// Drain pending reports without blocking.
    fn poll(&mut self) -> Vec<MediaEvent>;
}

pub trait PlayerFactory {
    type Player: Player;

    fn open(&mut self, kind: MediaKind, url: &str) -> eyre::Result<Self::Player>;
}

/// Backend selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    #[cfg(feature = "gstreamer")]
    Gstreamer,
    Headless,
}

impl Backend {
    /// Pick the backend, falling back to headless when built without GStreamer.
    #[must_use]
    pub fn select(headless: bool) -> Self {
        if headless {
            return Backend::Headless;
        }

        #[cfg(feature = "gstreamer")]
        {
            Backend::Gstreamer
        }

        #[cfg(not(feature = "gstreamer"))]
        {
            tracing::warn!("built without GStreamer support, running headless");
            Backend::Headless
        }
    }
}

/// Player of whichever backend is active.
#[derive(Debug)]
pub enum MediaPlayer {
    #[cfg(feature = "gstreamer")]
    Gstreamer(GstPlayer),
    Headless(HeadlessPlayer),
}

impl PlayerFactory for Backend {
    type Player = MediaPlayer;

    fn open(&mut self, kind: MediaKind, url: &str) -> eyre::Result<MediaPlayer> {
        let uri = to_uri(url)?;
        match self {
            #[cfg(feature = "gstreamer")]
            Backend::Gstreamer => GstPlayer::new(kind, uri.as_str()).map(MediaPlayer::Gstreamer),
            Backend::Headless => Ok(MediaPlayer::Headless(HeadlessPlayer::new(kind, uri.into()))),
        }
    }
}

impl Player for MediaPlayer {
    fn pause(&mut self) -> eyre::Result<()> {
        match self {
            #[cfg(feature = "gstreamer")]
            MediaPlayer::Gstreamer(player) => player.pause(),
            MediaPlayer::Headless(player) => player.pause(),
        }
    }

    fn play(&mut self) -> eyre::Result<()> {
        match self {
            #[cfg(feature = "gstreamer")]
            MediaPlayer::Gstreamer(player) => player.play(),
            MediaPlayer::Headless(player) => player.play(),
        }
    }

    fn stop(&mut self) -> eyre::Result<()> {
        match self {
            #[cfg(feature = "gstreamer")]
            MediaPlayer::Gstreamer(player) => player.stop(),
            MediaPlayer::Headless(player) => player.stop(),
        }
    }

    fn poll(&mut self) -> Vec<MediaEvent> {
        match self {
            #[cfg(feature = "gstreamer")]
            MediaPlayer::Gstreamer(player) => player.poll(),
            MediaPlayer::Headless(player) => player.poll(),
        }
    }
}

/// Turn a plan url into a URI a pipeline accepts.
///
/// Anything with a scheme is passed through, bare paths become `file://` URIs.
///
/// # Errors
///
/// Fails if a relative path cannot be anchored at the working directory.
pub fn to_uri(url: &str) -> eyre::Result<Url> {
    if let Ok(uri) = Url::parse(url) {
        return Ok(uri);
    }

    let path = Path::new(url);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .wrap_err("no working directory to resolve relative media paths")?
            .join(path)
    };

    Url::from_file_path(&absolute)
        .map_err(|()| eyre!("cannot express {} as a file URI", absolute.display()))
}
