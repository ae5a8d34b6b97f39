// SPDX-License-Identifier: MPL-2.0

//! GStreamer `playbin` player.
//!
//! Pipelines are created paused so they buffer ahead of their start time.
//! Bus messages are drained without blocking from [`Player::poll`].

use gstreamer::prelude::*;
use tracing::{debug, error, warn};

use super::{MediaEvent, MediaKind, MediaState, Player};

/// Network buffer for `playbin`, in bytes.
const BUFFER_SIZE: i32 = 1 << 22;

/// Video sink holding the single decoded frame of an image on screen.
const IMAGE_SINK: &str = "imagefreeze ! videoconvert ! videoscale ! autovideosink";

pub struct GstPlayer {
    pipeline: gstreamer::Element,
    uri: String,
}

impl GstPlayer {
    /// Build a `playbin` for `uri`. Nothing is decoded until it is paused.
    pub fn new(kind: MediaKind, uri: &str) -> eyre::Result<Self> {
        gstreamer::init()?;

        let mut builder = gstreamer::ElementFactory::make("playbin")
            .property("uri", uri)
            .property("buffer-size", BUFFER_SIZE);

        match kind {
            MediaKind::Image => {
                let sink = gstreamer::parse::bin_from_description(IMAGE_SINK, true)?;
                builder = builder.property("video-sink", sink.upcast::<gstreamer::Element>());
            }
            MediaKind::Video => builder = builder.property("mute", true),
            MediaKind::AudioVideo => {}
        }

        let pipeline = builder
            .build()
            .map_err(|why| eyre::eyre!("failed to create playbin for {uri}: {why}"))?;

        debug!(?kind, uri, "created pipeline");

        Ok(Self {
            pipeline,
            uri: uri.to_owned(),
        })
    }

    fn set_state(&self, state: gstreamer::State) -> eyre::Result<()> {
        self.pipeline
            .set_state(state)
            .map_err(|e| eyre::eyre!("failed to set {} to {state:?}: {e:?}", self.uri))?;
        Ok(())
    }
}

impl Player for GstPlayer {
    fn pause(&mut self) -> eyre::Result<()> {
        self.set_state(gstreamer::State::Paused)
    }

    fn play(&mut self) -> eyre::Result<()> {
        self.set_state(gstreamer::State::Playing)
    }

    fn stop(&mut self) -> eyre::Result<()> {
        self.set_state(gstreamer::State::Null)
    }

    fn poll(&mut self) -> Vec<MediaEvent> {
        use gstreamer::MessageView;

        let Some(bus) = self.pipeline.bus() else {
            return Vec::new();
        };

        let mut events = Vec::new();
        while let Some(msg) = bus.pop() {
            match msg.view() {
                MessageView::Eos(_) => events.push(MediaEvent::Eos),
                MessageView::Error(err) => {
                    error!(
                        uri = %self.uri,
                        src = ?err.src().map(|s| s.path_string()),
                        error = %err.error(),
                        debug = ?err.debug(),
                        "GStreamer pipeline error"
                    );
                    events.push(MediaEvent::Error(err.error().to_string()));
                }
                MessageView::Warning(warning) => {
                    warn!(
                        uri = %self.uri,
                        src = ?warning.src().map(|s| s.path_string()),
                        error = %warning.error(),
                        "GStreamer pipeline warning"
                    );
                }
                MessageView::StateChanged(change) => {
                    if change.src().is_some_and(|src| src == &self.pipeline) {
                        let state = match change.current() {
                            gstreamer::State::Playing => Some(MediaState::Playing),
                            gstreamer::State::Paused | gstreamer::State::Ready => {
                                Some(MediaState::Paused)
                            }
                            gstreamer::State::Null => Some(MediaState::Stopped),
                            _ => None,
                        };

                        if let Some(state) = state {
                            events.push(MediaEvent::State(state));
                        }
                    }
                }
                _ => {}
            }
        }

        events
    }
}

impl std::fmt::Debug for GstPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GstPlayer")
            .field("uri", &self.uri)
            .field("state", &self.pipeline.current_state())
            .finish()
    }
}

impl Drop for GstPlayer {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!(?e, "Failed to stop pipeline on drop");
        }
    }
}
