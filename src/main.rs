// SPDX-License-Identifier: MPL-2.0

mod clock;
mod item;
mod layout;
mod media;
mod plan;
mod plan_source;
mod power;
mod scheduler;
mod timer;
mod window;

use std::{path::PathBuf, time::Duration};

use calloop::{
    EventLoop,
    signals::{Signal, Signals},
};
use eyre::eyre;
use telescreen_config::Config;
use tracing::{error, info, info_span, warn};
use tracing_subscriber::{EnvFilter, prelude::*};

use crate::{
    clock::{Clock, SystemClock, Timestamp},
    item::ItemHandler,
    layout::{LayoutHandler, Screen},
    media::Backend,
    plan::{Routed, Task},
    power::{LoggingPower, Power},
    scheduler::{Lifecycle, Scheduler, Settings},
};

fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    // Logging is not up yet, so config errors go to stderr.
    let config = Config::load().unwrap_or_else(|why| {
        eprintln!("config file error, falling back to defaults: {why}");
        Config::default()
    });

    init_logger(&config.log_filter);

    info!(machine = %config.machine, plan = %config.plan_path.display(), "starting telescreen");

    let mut event_loop: EventLoop<'static, Telescreen> = EventLoop::try_new()?;
    let handle = event_loop.handle();

    let signals = Signals::new(&[Signal::SIGINT, Signal::SIGTERM])?;
    handle
        .insert_source(signals, |event, _, state: &mut Telescreen| {
            info!(signal = ?event.signal(), "received signal, exiting");
            state.exit = true;
        })
        .map_err(|err| eyre!("failed to register signal handler: {}", err.error))?;

    // Dropping the watcher stops it.
    let _watcher = match plan_source::watch(&config.plan_path, &handle) {
        Ok(watcher) => Some(watcher),
        Err(why) => {
            warn!("plan file will not be reloaded on changes: {why:?}");
            None
        }
    };

    let mut state = Telescreen::new(&config);

    if state.plan_path.exists() {
        state.reload_plan();
    }

    state.start();

    while !state.exit {
        let timeout = state.next_wakeup(SystemClock.now());
        event_loop.dispatch(timeout, &mut state)?;
        state.advance(SystemClock.now());
    }

    state.shutdown();
    Ok(())
}

fn init_logger(fallback: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();
}

/// Daemon state shared with event loop callbacks.
pub struct Telescreen {
    items: Scheduler<ItemHandler<Backend>, SystemClock>,
    layouts: Scheduler<LayoutHandler, SystemClock>,
    power: Power<LoggingPower>,
    plan_path: PathBuf,
    media_poll: Duration,
    exit: bool,
}

impl Telescreen {
    fn new(config: &Config) -> Self {
        let settings = Settings {
            horizon: config.lookahead().as_secs_f64(),
            tick_interval: config.tick().as_secs_f64(),
        };

        let backend = Backend::select(config.headless);
        info!(?backend, "selected media backend");

        let screen = Screen::new(config.screen.width, config.screen.height);

        Self {
            items: Scheduler::new("items", ItemHandler::new(backend), SystemClock, settings),
            layouts: Scheduler::new(
                "layout",
                LayoutHandler::new(screen),
                SystemClock,
                settings,
            ),
            power: Power::new(LoggingPower::new(config.displays)),
            plan_path: config.plan_path.clone(),
            media_poll: config.media_poll(),
            exit: false,
        }
    }

    fn start(&mut self) {
        self.items.start();
        self.layouts.start();
    }

    /// Route a new plan to the schedulers.
    pub fn change_plan(&mut self, tasks: Vec<Task>) {
        let Routed { items, layouts } = plan::split(tasks);
        let (item_count, layout_count) = (items.len(), layouts.len());

        let items_change = self.items.change_plan(items);
        let layouts_change = self.layouts.change_plan(layouts);

        info!(
            items = item_count,
            layouts = layout_count,
            ?items_change,
            ?layouts_change,
            "installed plan"
        );

        self.update_power();
    }

    /// Re-read the plan file. On failure the current plan keeps running.
    pub fn reload_plan(&mut self) {
        let _span = info_span!("reload_plan", path = %self.plan_path.display()).entered();

        match plan::load(&self.plan_path) {
            Ok(tasks) => self.change_plan(tasks),
            Err(why) => error!("failed to load plan, keeping the current one: {why:?}"),
        }
    }

    /// How long the event loop may sleep.
    fn next_wakeup(&self, now: Timestamp) -> Option<Duration> {
        let deadline = match (self.items.next_deadline(), self.layouts.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        let timeout = deadline.map(|at| clock::until(now, at));

        // Bus messages are only seen when polled.
        if self.items.has_live() {
            return Some(timeout.map_or(self.media_poll, |t| t.min(self.media_poll)));
        }

        timeout
    }

    fn advance(&mut self, now: Timestamp) {
        self.items.advance(now);
        self.layouts.advance(now);

        let items = self.items.poll().into_iter().map(|report| ("items", report));
        let layouts = self.layouts.poll().into_iter().map(|report| ("layout", report));
        for (route, (id, lifecycle)) in items.chain(layouts) {
            match lifecycle {
                Lifecycle::Active => info!(route, ?id, "task appeared"),
                Lifecycle::Inactive => info!(route, ?id, "task disappeared"),
                Lifecycle::Finished => info!(route, ?id, "task finished early"),
            }
        }

        self.update_power();
    }

    /// Keep the displays on while any item is live.
    fn update_power(&mut self) {
        self.power.request(self.items.has_live());
    }

    fn shutdown(&mut self) {
        self.items.shutdown();
        self.layouts.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn telescreen(plan_path: PathBuf) -> Telescreen {
        let config = Config::default()
            .headless(true)
            .plan_path(plan_path)
            .media_poll_ms(50u64);
        Telescreen::new(&config)
    }

    #[test]
    fn plans_are_routed_by_kind() {
        let mut state = telescreen(PathBuf::from("/nonexistent/plan.json"));
        state.start();

        let now = SystemClock.now();
        let tasks = plan::parse(&format!(
            r#"[
                {{"kind": "image", "start": {now}, "end": {end}, "url": "/srv/a.png"}},
                {{"kind": "layout", "start": {now}, "end": {end}, "mode": "sidebar"}}
            ]"#,
            end = now + 30.0
        ))
        .unwrap();
        state.change_plan(tasks);

        assert_eq!(state.items.live_tasks().count(), 1);
        assert_eq!(state.layouts.live_tasks().count(), 1);

        assert_eq!(state.power.powered(), Some(true));

        state.shutdown();
        assert!(!state.items.has_live());
        assert!(!state.layouts.has_live());
    }

    #[test]
    fn failed_reload_keeps_current_plan() {
        let mut state = telescreen(PathBuf::from("/nonexistent/plan.json"));
        state.start();

        let now = SystemClock.now();
        state.change_plan(vec![plan::item(now, now + 30.0, "/srv/a.png")]);
        state.reload_plan();

        assert_eq!(state.items.live_tasks().count(), 1);
    }

    #[test]
    fn live_media_caps_the_wakeup() {
        let mut state = telescreen(PathBuf::from("/nonexistent/plan.json"));
        state.start();

        let now = SystemClock.now();
        assert!(state.next_wakeup(now).is_some_and(|t| t > Duration::from_millis(50)));

        state.change_plan(vec![plan::item(now, now + 30.0, "/srv/a.png")]);
        let now = SystemClock.now();
        assert_eq!(state.next_wakeup(now), Some(Duration::ZERO));

        state.advance(now);
        assert_eq!(state.next_wakeup(now), Some(Duration::from_millis(50)));
    }

    #[test]
    fn displays_follow_item_activity() {
        let mut state = telescreen(PathBuf::from("/nonexistent/plan.json"));
        state.start();

        let now = SystemClock.now();
        state.change_plan(Vec::new());
        assert_eq!(state.power.powered(), Some(false));

        state.change_plan(vec![plan::item(now, now + 1.0, "/srv/a.png")]);
        assert_eq!(state.power.powered(), Some(true));

        // the item's window is over
        state.advance(now + 1.0);
        assert!(!state.items.has_live());
        assert_eq!(state.power.powered(), Some(false));
    }
}
