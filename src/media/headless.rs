// SPDX-License-Identifier: MPL-2.0

//! Player without a pipeline.
//!
//! Used when the device runs headless or GStreamer support is compiled out.
//! Transitions are reported on the next poll exactly like a real pipeline
//! would, so scheduling behaves the same.

use std::collections::VecDeque;

use tracing::info;

use super::{MediaEvent, MediaKind, MediaState, Player};

#[derive(Debug)]
pub struct HeadlessPlayer {
    kind: MediaKind,
    uri: String,
    state: MediaState,
    reports: VecDeque<MediaEvent>,
}

impl HeadlessPlayer {
    #[must_use]
    pub fn new(kind: MediaKind, uri: String) -> Self {
        Self {
            kind,
            uri,
            state: MediaState::Stopped,
            reports: VecDeque::new(),
        }
    }

    fn transition(&mut self, state: MediaState) {
        if self.state != state {
            info!(kind = ?self.kind, uri = %self.uri, from = ?self.state, to = ?state, "headless player");
            self.state = state;
            self.reports.push_back(MediaEvent::State(state));
        }
    }
}

impl Player for HeadlessPlayer {
    fn pause(&mut self) -> eyre::Result<()> {
        self.transition(MediaState::Paused);
        Ok(())
    }

    fn play(&mut self) -> eyre::Result<()> {
        self.transition(MediaState::Playing);
        Ok(())
    }

    fn stop(&mut self) -> eyre::Result<()> {
        self.transition(MediaState::Stopped);
        Ok(())
    }

    fn poll(&mut self) -> Vec<MediaEvent> {
        self.reports.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_transitions_report_once() {
        let mut player = HeadlessPlayer::new(MediaKind::Image, "file:///a.png".into());
        player.stop().unwrap();
        player.play().unwrap();
        player.play().unwrap();
        player.stop().unwrap();
        player.stop().unwrap();

        assert_eq!(
            player.poll(),
            vec![
                MediaEvent::State(MediaState::Playing),
                MediaEvent::State(MediaState::Stopped)
            ]
        );
        assert!(player.poll().is_empty());
    }
}
