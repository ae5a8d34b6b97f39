// SPDX-License-Identifier: MPL-2.0

//! Plan data model and parsing of the controller's task descriptors.

use std::{fs, path::Path};

use eyre::{WrapErr, bail, eyre};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{clock::Timestamp, layout::Layout, media::MediaKind};

/// Which handler interprets a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Image,
    Video,
    AudioVideo,
    Layout,
}

/// Scheduler a task kind belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Items,
    Layout,
}

impl TaskKind {
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            "audiovideo" => Some(Self::AudioVideo),
            "layout" => Some(Self::Layout),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::AudioVideo => "audiovideo",
            Self::Layout => "layout",
        }
    }

    #[must_use]
    pub fn route(self) -> Route {
        match self {
            Self::Image | Self::Video | Self::AudioVideo => Route::Items,
            Self::Layout => Route::Layout,
        }
    }

    #[must_use]
    pub fn media(self) -> Option<MediaKind> {
        match self {
            Self::Image => Some(MediaKind::Image),
            Self::Video => Some(MediaKind::Video),
            Self::AudioVideo => Some(MediaKind::AudioVideo),
            Self::Layout => None,
        }
    }
}

/// Kind specific data of a task.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Url(String),
    Layout(Layout),
}

/// A scheduled unit of work. Equality is structural and drives plan diffing.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub kind: TaskKind,
    pub start: Timestamp,
    pub end: Timestamp,
    pub payload: Payload,
}

impl Task {
    /// # Errors
    ///
    /// Fails on non-finite times or when `start > end`.
    pub fn new(
        kind: TaskKind,
        start: Timestamp,
        end: Timestamp,
        payload: Payload,
    ) -> eyre::Result<Self> {
        if !start.is_finite() || !end.is_finite() {
            bail!("task times must be finite (start {start}, end {end})");
        }

        if start > end {
            bail!("task ends before it starts (start {start}, end {end})");
        }

        Ok(Self {
            kind,
            start,
            end,
            payload,
        })
    }

    #[must_use]
    pub fn url(&self) -> Option<&str> {
        match &self.payload {
            Payload::Url(url) => Some(url),
            Payload::Layout(_) => None,
        }
    }
}

/// A task as sent by the controller, before validation.
///
/// Kind specific fields live either under `payload` or next to the times.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskDescriptor {
    #[serde(alias = "type")]
    pub kind: String,
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Deserialize)]
struct ItemPayload {
    #[serde(alias = "uri")]
    url: String,
}

impl TryFrom<TaskDescriptor> for Task {
    type Error = eyre::Report;

    fn try_from(descriptor: TaskDescriptor) -> eyre::Result<Self> {
        let kind = TaskKind::parse(&descriptor.kind)
            .ok_or_else(|| eyre!("unknown task kind {:?}", descriptor.kind))?;

        let fields = match descriptor.payload {
            Some(payload @ Value::Object(_)) => payload,
            Some(other) => bail!("{} payload must be an object, got {other}", kind.as_str()),
            None => Value::Object(descriptor.extra),
        };

        let payload = match kind.route() {
            Route::Items => {
                let item: ItemPayload = serde_json::from_value(fields)
                    .wrap_err_with(|| format!("invalid {} payload", kind.as_str()))?;
                Payload::Url(item.url)
            }
            Route::Layout => Payload::Layout(
                serde_json::from_value(fields).wrap_err("invalid layout payload")?,
            ),
        };

        Task::new(kind, descriptor.start, descriptor.end, payload)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PlanFile {
    Bare(Vec<Value>),
    Message { plan: Vec<Value> },
}

/// Parse a plan document, skipping malformed tasks.
///
/// # Errors
///
/// Fails only when the document as a whole is not a plan.
pub fn parse(json: &str) -> eyre::Result<Vec<Task>> {
    let entries = match serde_json::from_str(json).wrap_err("plan is not valid JSON")? {
        PlanFile::Bare(entries) | PlanFile::Message { plan: entries } => entries,
    };

    let total = entries.len();
    let tasks: Vec<Task> = entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            let result = serde_json::from_value::<TaskDescriptor>(entry)
                .map_err(eyre::Report::from)
                .and_then(Task::try_from);

            match result {
                Ok(task) => Some(task),
                Err(why) => {
                    tracing::warn!(index, "skipping malformed task: {why:#}");
                    None
                }
            }
        })
        .collect();

    tracing::debug!(total, valid = tasks.len(), "parsed plan");
    Ok(tasks)
}

/// Read and parse the plan file at `path`.
///
/// # Errors
///
/// Fails if the file cannot be read or does not contain a plan.
pub fn load(path: &Path) -> eyre::Result<Vec<Task>> {
    let json = fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read plan {}", path.display()))?;
    parse(&json).wrap_err_with(|| format!("failed to parse plan {}", path.display()))
}

/// A plan split by the scheduler responsible for each task.
#[derive(Debug, Default, PartialEq)]
pub struct Routed {
    pub items: Vec<Task>,
    pub layouts: Vec<Task>,
}

#[must_use]
pub fn split(tasks: Vec<Task>) -> Routed {
    let mut routed = Routed::default();
    for task in tasks {
        match task.kind.route() {
            Route::Items => routed.items.push(task),
            Route::Layout => routed.layouts.push(task),
        }
    }
    routed
}

#[cfg(test)]
pub(crate) fn item(start: Timestamp, end: Timestamp, url: &str) -> Task {
    Task::new(TaskKind::Image, start, end, Payload::Url(url.into())).unwrap()
}
