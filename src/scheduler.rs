// SPDX-License-Identifier: MPL-2.0

//! Plan scheduler.
//!
//! Turns a time-windowed plan into start/stop actions on a [`TaskHandler`].
//! Only tasks starting within the lookahead horizon are materialized. A new
//! plan that agrees with the installed one in the near-term window is handed
//! off without touching what is already playing; any other plan stops every
//! live task and cancels every pending event before being installed.
//!
//! The scheduler never sleeps. The event loop drives it through
//! [`Scheduler::advance`], waking at [`Scheduler::next_deadline`].

use std::collections::{BTreeMap, VecDeque};

use tracing::{debug, info, warn};

use crate::{
    clock::{Clock, Timestamp},
    plan::Task,
    timer::{EventId, Timers},
    window::{due_window, pop_queue_tasks},
};

/// Realizes tasks of one kind. The scheduler owns the handles it returns.
pub trait TaskHandler {
    type Handle;

    /// Prepare a due task, e.g. start buffering.
    fn schedule_task(&mut self, task: &Task) -> eyre::Result<Self::Handle>;

    /// The task's start time has come.
    fn start_task(&mut self, handle: &mut Self::Handle) -> eyre::Result<()>;

    /// Tear the task down. Must be safe even if it never started.
    fn stop_task(&mut self, handle: Self::Handle) -> eyre::Result<()>;

    /// Report lifecycle changes since the last poll.
    fn poll_task(&mut self, _handle: &mut Self::Handle) -> Vec<Lifecycle> {
        Vec::new()
    }
}

/// Advisory state reported by a handler for a live task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Visible or otherwise in effect.
    Active,
    /// No longer visible, but not finished.
    Inactive,
    /// Ended on its own; the scheduler stops it.
    Finished,
}

/// Identity of a live task within one scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LiveId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Start(LiveId),
    End(LiveId),
}

struct Live<T> {
    task: Task,
    handle: T,
    events: [EventId; 2],
}

/// How a new plan was installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanChange {
    /// Near-term window differed: everything live was stopped.
    Reset,
    /// Near-term window matched: live tasks were kept.
    Handoff,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settings {
    /// Lookahead in seconds.
    pub horizon: f64,
    /// Seconds between periodic scheduling passes.
    pub tick_interval: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            horizon: 60.0,
            tick_interval: 5.0,
        }
    }
}

pub struct Scheduler<H: TaskHandler, C: Clock> {
    name: &'static str,
    handler: H,
    clock: C,
    settings: Settings,
    // Only used to detect differences to the next plan.
    plan: Vec<Task>,
    // Tasks not materialized yet.
    queue: VecDeque<Task>,
    live: BTreeMap<LiveId, Live<H::Handle>>,
    timers: Timers<Event>,
    // None while idle.
    next_tick: Option<Timestamp>,
    next_id: u64,
}

impl<H: TaskHandler, C: Clock> Scheduler<H, C> {
    pub fn new(name: &'static str, handler: H, clock: C, settings: Settings) -> Self {
        Self {
            name,
            handler,
            clock,
            settings,
            plan: Vec::new(),
            queue: VecDeque::new(),
            live: BTreeMap::new(),
            timers: Timers::new(),
            next_tick: None,
            next_id: 0,
        }
    }

    /// Start periodic scheduling. The first pass runs immediately.
    pub fn start(&mut self) {
        if self.next_tick.is_some() {
            return;
        }

        info!(scheduler = self.name, "starting scheduling loop");
        let now = self.clock.now();
        self.tick(now);
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.next_tick.is_some()
    }

    /// Install a new plan from the controller and immediately reschedule.
    pub fn change_plan(&mut self, mut plan: Vec<Task>) -> PlanChange {
        plan.sort_by(|a, b| a.start.total_cmp(&b.start));

        // The queue is consumed, the plan stays as it is.
        let mut queue: VecDeque<Task> = plan.iter().cloned().collect();
        let now = self.clock.now();
        let horizon = self.settings.horizon;

        // Catch up first so nothing due under the old plan is lost.
        self.schedule(now);

        let unchanged = due_window(&self.plan, now, horizon) == due_window(&plan, now, horizon);

        let change = if unchanged {
            info!(scheduler = self.name, tasks = plan.len(), "adjusting schedule");

            // Advance the new queue to where the old one is, so tasks that
            // are already live are not materialized a second time.
            let skipped = pop_queue_tasks(&mut queue, now, horizon);
            debug!(scheduler = self.name, skipped = skipped.len(), "handed off live window");
            PlanChange::Handoff
        } else {
            info!(scheduler = self.name, tasks = plan.len(), "resetting schedule");
            self.reset();
            PlanChange::Reset
        };

        self.plan = plan;
        self.queue = queue;
        self.schedule(now);

        change
    }

    /// Materialize every queued task relevant within the horizon of `now`.
    pub fn schedule(&mut self, now: Timestamp) {
        for task in pop_queue_tasks(&mut self.queue, now, self.settings.horizon) {
            self.schedule_task(task, now);
        }
    }

    fn schedule_task(&mut self, task: Task, now: Timestamp) {
        let handle = match self.handler.schedule_task(&task) {
            Ok(handle) => handle,
            Err(why) => {
                warn!(scheduler = self.name, ?task, "failed to schedule task: {why:#}");
                return;
            }
        };

        let id = LiveId(self.next_id);
        self.next_id += 1;

        let events = [
            self.add_event(task.start, now, Event::Start(id)),
            self.add_event(task.end, now, Event::End(id)),
        ];

        info!(scheduler = self.name, ?id, kind = task.kind.as_str(), start = task.start, end = task.end, "scheduled task");

        self.live.insert(
            id,
            Live {
                task,
                handle,
                events,
            },
        );
    }

    fn add_event(&mut self, at: Timestamp, now: Timestamp, event: Event) -> EventId {
        self.timers.add(at, now, event)
    }

    /// Fire everything due at `now`, in deadline order.
    pub fn advance(&mut self, now: Timestamp) {
        loop {
            let event_at = self.timers.next_deadline().filter(|at| *at <= now);
            let tick_at = self.next_tick.filter(|at| *at <= now);

            match (event_at, tick_at) {
                (Some(event_at), Some(tick_at)) if tick_at < event_at => self.tick(now),
                (Some(_), _) => {
                    if let Some((_, event)) = self.timers.pop_due(now) {
                        self.dispatch(event);
                    }
                }
                (None, Some(_)) => self.tick(now),
                (None, None) => break,
            }
        }
    }

    fn tick(&mut self, now: Timestamp) {
        self.schedule(now);
        self.next_tick = Some(now + self.settings.tick_interval);
    }

    fn dispatch(&mut self, event: Event) {
        match event {
            Event::Start(id) => {
                let Some(live) = self.live.get_mut(&id) else {
                    return;
                };

                debug!(scheduler = self.name, ?id, "starting task");
                if let Err(why) = self.handler.start_task(&mut live.handle) {
                    warn!(scheduler = self.name, ?id, "failed to start task: {why:#}");
                    self.stop_live(id, "start failed");
                }
            }
            Event::End(id) => {
                self.stop_live(id, "window ended");
            }
        }
    }

    /// Stop a live task ahead of its end time.
    ///
    /// Stopping a task that is no longer live is a no-op.
    ///
    /// # Errors
    ///
    /// Fails if the scheduler was never started.
    pub fn stop_task(&mut self, id: LiveId) -> eyre::Result<()> {
        if !self.is_running() {
            eyre::bail!("{} scheduler stopping {id:?} before it was started", self.name);
        }

        if !self.stop_live(id, "stopped") {
            debug!(scheduler = self.name, ?id, "task already stopped");
        }

        Ok(())
    }

    fn stop_live(&mut self, id: LiveId, reason: &'static str) -> bool {
        // Out of the live set before the handler runs.
        let Some(live) = self.live.remove(&id) else {
            return false;
        };

        for event in live.events {
            self.timers.cancel(event);
        }

        info!(scheduler = self.name, ?id, reason, kind = live.task.kind.as_str(), "stopping task");
        if let Err(why) = self.handler.stop_task(live.handle) {
            warn!(scheduler = self.name, ?id, "failed to stop task: {why:#}");
        }

        true
    }

    /// Stop every live task and cancel every pending event.
    fn reset(&mut self) {
        for (id, live) in std::mem::take(&mut self.live) {
            info!(scheduler = self.name, ?id, kind = live.task.kind.as_str(), "stopping task on reset");
            if let Err(why) = self.handler.stop_task(live.handle) {
                warn!(scheduler = self.name, ?id, "failed to stop task: {why:#}");
            }
        }

        if !self.timers.is_empty() {
            let cancelled = self.timers.clear();
            debug!(scheduler = self.name, cancelled, "cancelled pending events");
        }
    }

    /// Collect lifecycle reports from the handler; finished tasks are stopped.
    pub fn poll(&mut self) -> Vec<(LiveId, Lifecycle)> {
        let mut reports = Vec::new();
        for (id, live) in &mut self.live {
            for lifecycle in self.handler.poll_task(&mut live.handle) {
                reports.push((*id, lifecycle));
            }
        }

        for (id, lifecycle) in &reports {
            match lifecycle {
                Lifecycle::Active => debug!(scheduler = self.name, ?id, "task active"),
                Lifecycle::Inactive => debug!(scheduler = self.name, ?id, "task inactive"),
                Lifecycle::Finished => {
                    if let Err(why) = self.stop_task(*id) {
                        warn!(scheduler = self.name, ?id, "finished task left running: {why:#}");
                    }
                }
            }
        }

        reports
    }

    /// Stop everything and go idle.
    pub fn shutdown(&mut self) {
        info!(
            scheduler = self.name,
            live = self.live.len(),
            pending = self.timers.len(),
            "shutting down"
        );
        self.reset();
        self.next_tick = None;
    }

    /// Earliest time at which [`Self::advance`] has something to do.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Timestamp> {
        match (self.timers.next_deadline(), self.next_tick) {
            (Some(event), Some(tick)) => Some(event.min(tick)),
            (event, tick) => event.or(tick),
        }
    }

    #[must_use]
    pub fn has_live(&self) -> bool {
        !self.live.is_empty()
    }

    #[cfg(test)]
    pub fn live_tasks(&self) -> impl Iterator<Item = (LiveId, &Task)> {
        self.live.iter().map(|(id, live)| (*id, &live.task))
    }

    #[cfg(test)]
    #[must_use]
    pub fn pending_events(&self) -> usize {
        self.timers.len()
    }

    #[cfg(test)]
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    #[cfg(test)]
    #[must_use]
    pub fn handler(&self) -> &H {
        &self.handler
    }

    #[cfg(test)]
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }
}
