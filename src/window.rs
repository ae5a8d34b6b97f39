// SPDX-License-Identifier: MPL-2.0

//! Windowed views over a sorted plan.
//!
//! Expiry is half-open: a task whose `end <= now` is over, a task whose
//! `start == now` is due.

use std::collections::VecDeque;

use crate::{clock::Timestamp, plan::Task};

/// Tasks overlapping the open interval `(after, before)`, in plan order.
///
/// Only used to compare two plans, never to schedule.
#[must_use]
pub fn plan_window(plan: &[Task], after: Timestamp, before: Timestamp) -> Vec<&Task> {
    plan.iter()
        .filter(|task| task.end > after && task.start < before)
        .collect()
}

/// Tasks of a sorted `plan` that [`pop_queue_tasks`] would hand out at `now`.
///
/// Same as [`plan_window`] up to `now + horizon`, plus the tasks starting
/// exactly at that instant, which are already due.
#[must_use]
pub fn due_window(plan: &[Task], now: Timestamp, horizon: f64) -> Vec<&Task> {
    let before = now + horizon;
    let mut window = plan_window(plan, now, before);
    window.extend(
        plan.iter()
            .filter(|task| task.start == before && task.end > now),
    );
    window
}

/// Pop every task from the head of `queue` that is relevant within `horizon`
/// seconds of `now`.
///
/// Expired tasks are dropped without being returned. The first task that
/// starts after `now + horizon` stays at the head of the queue.
pub fn pop_queue_tasks(queue: &mut VecDeque<Task>, now: Timestamp, horizon: f64) -> Vec<Task> {
    let mut due = Vec::new();

    while let Some(task) = queue.pop_front() {
        if task.end <= now {
            tracing::trace!(?task, now, "discarding expired task");
            continue;
        }

        if task.start > now + horizon {
            queue.push_front(task);
            break;
        }

        due.push(task);
    }

    due
}
