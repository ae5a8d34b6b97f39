// SPDX-License-Identifier: MPL-2.0

//! Reloads the plan whenever the controller rewrites the plan file.

use std::{ffi::OsString, path::Path};

use calloop::{LoopHandle, channel};
use eyre::{WrapErr, eyre};
use notify::{
    RecommendedWatcher, RecursiveMode, Watcher,
    event::{ModifyKind, RenameMode},
};
use tracing::{debug, warn};

use crate::Telescreen;

/// Watch the plan file at `path`.
///
/// The parent directory is watched instead of the file itself so that
/// atomic replacements (write to temp file, rename over) are noticed.
/// The returned watcher must be kept alive.
pub fn watch(path: &Path, handle: &LoopHandle<'_, Telescreen>) -> eyre::Result<RecommendedWatcher> {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let file_name: OsString = path
        .file_name()
        .ok_or_else(|| eyre!("plan path {} has no file name", path.display()))?
        .to_owned();

    let (notify_tx, notify_rx) = channel::sync_channel::<notify::Event>(20);

    handle
        .insert_source(notify_rx, |event, _, state| match event {
            channel::Event::Msg(event) => {
                debug!(kind = ?event.kind, "plan file changed");
                state.reload_plan();
            }
            channel::Event::Closed => warn!("plan watcher stopped"),
        })
        .map_err(|err| eyre!("{}", err.error))?;

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            forward(&notify_tx, res, &file_name);
        },
        notify::Config::default(),
    )
    .wrap_err("failed to create plan watcher")?;

    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .wrap_err_with(|| format!("failed to watch {}", dir.display()))?;

    debug!(dir = %dir.display(), "watching plan directory");
    Ok(watcher)
}

/// Pass relevant watcher events on to the loop.
///
/// Returns `false` if an event was relevant but the loop is gone.
fn forward(
    tx: &channel::SyncSender<notify::Event>,
    res: notify::Result<notify::Event>,
    file_name: &OsString,
) -> bool {
    match res {
        Ok(event) if touches(&event, file_name) => match tx.send(event) {
            Ok(()) => true,
            Err(why) => {
                warn!(?why, "plan change not delivered, event loop is gone");
                false
            }
        },
        Ok(_) => true,
        Err(why) => {
            warn!(?why, "plan watcher error");
            true
        }
    }
}

/// Whether `event` may have produced a new version of `file_name`.
fn touches(event: &notify::Event, file_name: &OsString) -> bool {
    let relevant = matches!(
        event.kind,
        notify::EventKind::Create(_)
            | notify::EventKind::Modify(ModifyKind::Data(_))
            | notify::EventKind::Modify(ModifyKind::Any)
            | notify::EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Both))
    );

    relevant
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(file_name.as_os_str()))
}
