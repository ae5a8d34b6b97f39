// SPDX-License-Identifier: MPL-2.0

//! Handler for media items (images, videos).

use eyre::{WrapErr, eyre};
use tracing::{debug, warn};

use crate::{
    media::{MediaEvent, MediaKind, MediaState, Player, PlayerFactory},
    plan::Task,
    scheduler::{Lifecycle, TaskHandler},
};

/// A scheduled item and its player.
#[derive(Debug)]
pub struct Item<P> {
    kind: MediaKind,
    url: String,
    player: P,
    state: MediaState,
    // Set once the player reached Playing.
    shown: bool,
}

#[cfg(test)]
impl<P> Item<P> {
    #[must_use]
    pub fn state(&self) -> MediaState {
        self.state
    }
}

/// Opens one player per item through `F`.
#[derive(Debug)]
pub struct ItemHandler<F> {
    factory: F,
}

impl<F: PlayerFactory> ItemHandler<F> {
    #[must_use]
    pub fn new(factory: F) -> Self {
        Self { factory }
    }
}

impl<F: PlayerFactory> TaskHandler for ItemHandler<F> {
    type Handle = Item<F::Player>;

    fn schedule_task(&mut self, task: &Task) -> eyre::Result<Self::Handle> {
        let kind = task
            .kind
            .media()
            .ok_or_else(|| eyre!("{} is not a media item", task.kind.as_str()))?;
        let url = task
            .url()
            .ok_or_else(|| eyre!("{} item has no url", task.kind.as_str()))?;

        let mut player = self
            .factory
            .open(kind, url)
            .wrap_err_with(|| format!("failed to open {url}"))?;

        // Prerolls while waiting for the start time.
        player
            .pause()
            .wrap_err_with(|| format!("failed to preroll {url}"))?;

        Ok(Item {
            kind,
            url: url.to_owned(),
            player,
            state: MediaState::Stopped,
            shown: false,
        })
    }

    fn start_task(&mut self, item: &mut Self::Handle) -> eyre::Result<()> {
        debug!(kind = ?item.kind, url = %item.url, "playing item");
        item.player
            .play()
            .wrap_err_with(|| format!("failed to play {}", item.url))
    }

    fn stop_task(&mut self, mut item: Self::Handle) -> eyre::Result<()> {
        debug!(kind = ?item.kind, url = %item.url, "stopping item");
        item.player
            .stop()
            .wrap_err_with(|| format!("failed to stop {}", item.url))
    }

    fn poll_task(&mut self, item: &mut Self::Handle) -> Vec<Lifecycle> {
        let mut reports = Vec::new();

        for event in item.player.poll() {
            match event {
                MediaEvent::State(state) if state == item.state => {}
                MediaEvent::State(state) => {
                    item.state = state;
                    match state {
                        MediaState::Playing => {
                            item.shown = true;
                            reports.push(Lifecycle::Active);
                        }
                        MediaState::Stopped if item.shown => {
                            reports.push(Lifecycle::Inactive);
                        }
                        MediaState::Stopped | MediaState::Paused => {}
                    }
                }
                MediaEvent::Eos => {
                    debug!(url = %item.url, "end of stream");
                    reports.push(Lifecycle::Finished);
                }
                MediaEvent::Error(why) => {
                    warn!(url = %item.url, "playback failed: {why}");
                    reports.push(Lifecycle::Finished);
                }
            }
        }

        reports
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, collections::HashMap, rc::Rc};

    use super::*;
    use crate::{
        clock::ManualClock,
        media::Backend,
        plan::{Payload, TaskKind, item},
        scheduler::{Scheduler, Settings},
    };

    type Injected = Rc<RefCell<HashMap<String, Vec<MediaEvent>>>>;

    /// Player whose reports are injected by the test.
    #[derive(Debug)]
    struct FakePlayer {
        url: String,
        injected: Injected,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl FakePlayer {
        fn record(&self, action: &str) {
            self.log.borrow_mut().push(format!("{action} {}", self.url));
        }
    }

    impl Player for FakePlayer {
        fn pause(&mut self) -> eyre::Result<()> {
            self.record("pause");
            Ok(())
        }

        fn play(&mut self) -> eyre::Result<()> {
            self.record("play");
            Ok(())
        }

        fn stop(&mut self) -> eyre::Result<()> {
            self.record("stop");
            Ok(())
        }

        fn poll(&mut self) -> Vec<MediaEvent> {
            self.injected
                .borrow_mut()
                .remove(&self.url)
                .unwrap_or_default()
        }
    }

    #[derive(Debug, Default)]
    struct FakeFactory {
        injected: Injected,
        log: Rc<RefCell<Vec<String>>>,
        unreachable: Vec<String>,
    }

    impl PlayerFactory for FakeFactory {
        type Player = FakePlayer;

        fn open(&mut self, _kind: MediaKind, url: &str) -> eyre::Result<FakePlayer> {
            if self.unreachable.iter().any(|u| u == url) {
                eyre::bail!("no such resource");
            }

            Ok(FakePlayer {
                url: url.to_owned(),
                injected: self.injected.clone(),
                log: self.log.clone(),
            })
        }
    }

    fn scheduler(factory: FakeFactory) -> Scheduler<ItemHandler<FakeFactory>, ManualClock> {
        let mut scheduler = Scheduler::new(
            "items",
            ItemHandler::new(factory),
            ManualClock::at(0.0),
            Settings::default(),
        );
        scheduler.start();
        scheduler
    }

    #[test]
    fn items_preroll_play_and_stop() {
        let factory = FakeFactory::default();
        let log = factory.log.clone();
        let mut scheduler = scheduler(factory);

        scheduler.change_plan(vec![item(10.0, 20.0, "a")]);
        assert_eq!(*log.borrow(), ["pause a"]);

        scheduler.advance(10.0);
        scheduler.advance(20.0);
        assert_eq!(*log.borrow(), ["pause a", "play a", "stop a"]);
    }

    #[test]
    fn unreachable_items_are_skipped() {
        let factory = FakeFactory {
            unreachable: vec!["gone".into()],
            ..FakeFactory::default()
        };
        let log = factory.log.clone();
        let mut scheduler = scheduler(factory);

        scheduler.change_plan(vec![item(0.0, 10.0, "gone"), item(0.0, 10.0, "b")]);
        assert_eq!(scheduler.live_tasks().count(), 1);
        assert_eq!(*log.borrow(), ["pause b"]);
    }

    #[test]
    fn end_of_stream_finishes_item() {
        let factory = FakeFactory::default();
        let (log, injected) = (factory.log.clone(), factory.injected.clone());
        let mut scheduler = scheduler(factory);

        scheduler.change_plan(vec![item(0.0, 30.0, "clip")]);
        scheduler.advance(0.0);

        injected.borrow_mut().insert(
            "clip".into(),
            vec![MediaEvent::State(MediaState::Playing), MediaEvent::Eos],
        );
        let reports: Vec<_> = scheduler.poll().into_iter().map(|(_, l)| l).collect();
        assert_eq!(reports, [Lifecycle::Active, Lifecycle::Finished]);

        assert!(!scheduler.has_live());
        assert_eq!(log.borrow().last().map(String::as_str), Some("stop clip"));
        assert_eq!(scheduler.pending_events(), 0);
    }

    #[test]
    fn stopping_after_shown_is_inactive() {
        let factory = FakeFactory::default();
        let mut handler = ItemHandler::new(factory);
        let injected = handler.factory.injected.clone();

        let mut clip = handler.schedule_task(&item(0.0, 1.0, "clip")).unwrap();

        injected.borrow_mut().insert(
            "clip".into(),
            vec![
                MediaEvent::State(MediaState::Stopped),
                MediaEvent::State(MediaState::Paused),
            ],
        );
        assert!(handler.poll_task(&mut clip).is_empty());

        injected.borrow_mut().insert(
            "clip".into(),
            vec![
                MediaEvent::State(MediaState::Playing),
                MediaEvent::State(MediaState::Playing),
                MediaEvent::State(MediaState::Stopped),
            ],
        );
        assert_eq!(
            handler.poll_task(&mut clip),
            [Lifecycle::Active, Lifecycle::Inactive]
        );
        assert_eq!(clip.state(), MediaState::Stopped);
    }

    #[test]
    fn errors_finish_item() {
        let mut handler = ItemHandler::new(FakeFactory::default());
        let injected = handler.factory.injected.clone();
        let mut clip = handler.schedule_task(&item(0.0, 1.0, "clip")).unwrap();

        injected
            .borrow_mut()
            .insert("clip".into(), vec![MediaEvent::Error("decoder".into())]);
        assert_eq!(handler.poll_task(&mut clip), [Lifecycle::Finished]);
    }

    #[test]
    fn layout_tasks_are_rejected() {
        let mut handler = ItemHandler::new(Backend::Headless);
        let task = Task::new(
            TaskKind::Layout,
            0.0,
            1.0,
            Payload::Layout(Default::default()),
        )
        .unwrap();
        assert!(handler.schedule_task(&task).is_err());
    }

    #[test]
    fn headless_items_report_activity() {
        let mut scheduler = Scheduler::new(
            "items",
            ItemHandler::new(Backend::Headless),
            ManualClock::at(0.0),
            Settings::default(),
        );
        scheduler.start();
        scheduler.change_plan(vec![item(0.0, 5.0, "/srv/a.png")]);
        scheduler.advance(0.0);

        let reports: Vec<_> = scheduler.poll().into_iter().map(|(_, l)| l).collect();
        assert_eq!(reports, [Lifecycle::Active]);
    }
}
