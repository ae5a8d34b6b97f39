// SPDX-License-Identifier: MPL-2.0

//! Screen layouts and the handler applying scheduled layout changes.
//!
//! A layout splits the screen into the item player area and up to two web
//! panels: a sidebar on the right and a strip along the bottom.

use eyre::bail;
use serde::Deserialize;
use tracing::info;

use crate::{
    plan::{Payload, Task},
    scheduler::TaskHandler,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutMode {
    /// player covers the whole screen
    #[default]
    Full,
    /// 4:3 player with a web sidebar to its right
    Sidebar,
    /// sidebar layout plus a web panel along the bottom
    Panel,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Layout {
    pub mode: LayoutMode,
    /// url shown in the sidebar
    #[serde(default)]
    pub sidebar: Option<String>,
    /// url shown in the bottom panel
    #[serde(default)]
    pub panel: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Placement of every visible area for one layout and screen size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Regions {
    pub player: Rect,
    pub sidebar: Option<Rect>,
    pub panel: Option<Rect>,
}

impl Layout {
    /// Compute the regions for a `width` x `height` screen.
    ///
    /// Returns `None` for empty or portrait screens.
    #[must_use]
    pub fn regions(&self, width: u32, height: u32) -> Option<Regions> {
        if width == 0 || height == 0 || width < height {
            return None;
        }

        let four_thirds =
            |h: u32| u32::try_from(u64::from(h) * 4 / 3).map_or(width, |w| w.min(width));

        let regions = match self.mode {
            LayoutMode::Full => Regions {
                player: Rect {
                    x: 0,
                    y: 0,
                    width,
                    height,
                },
                sidebar: None,
                panel: None,
            },

            LayoutMode::Sidebar => {
                let size = four_thirds(height);
                Regions {
                    player: Rect {
                        x: 0,
                        y: 0,
                        width: size,
                        height,
                    },
                    sidebar: Some(Rect {
                        x: size,
                        y: 0,
                        width: width - size,
                        height,
                    }),
                    panel: None,
                }
            }

            LayoutMode::Panel => {
                let panel = height / 12;
                let upper = height - panel;
                let size = four_thirds(upper);
                Regions {
                    player: Rect {
                        x: 0,
                        y: 0,
                        width: size,
                        height: upper,
                    },
                    sidebar: Some(Rect {
                        x: size,
                        y: 0,
                        width: width - size,
                        height: upper,
                    }),
                    panel: Some(Rect {
                        x: 0,
                        y: upper,
                        width,
                        height: panel,
                    }),
                }
            }
        };

        Some(regions)
    }
}

/// Current layout of the display surface.
#[derive(Debug)]
pub struct Screen {
    width: u32,
    height: u32,
    layout: Layout,
    regions: Option<Regions>,
}

impl Screen {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        let layout = Layout::default();
        Self {
            width,
            height,
            regions: layout.regions(width, height),
            layout,
        }
    }

    #[must_use]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    #[cfg(test)]
    #[must_use]
    pub fn regions(&self) -> Option<Regions> {
        self.regions
    }

    /// Switch to `layout`. Returns whether anything changed.
    pub fn set_layout(&mut self, layout: Layout) -> bool {
        if self.layout == layout {
            return false;
        }

        self.regions = layout.regions(self.width, self.height);
        info!(
            mode = ?layout.mode,
            sidebar = layout.sidebar.as_deref().unwrap_or("about:blank"),
            panel = layout.panel.as_deref().unwrap_or("about:blank"),
            regions = ?self.regions,
            "changing layout"
        );
        self.layout = layout;
        true
    }
}

#[derive(Debug)]
pub struct LayoutTask {
    layout: Layout,
    applied: bool,
}

/// Applies layout tasks to the [`Screen`].
#[derive(Debug)]
pub struct LayoutHandler {
    screen: Screen,
}

impl LayoutHandler {
    #[must_use]
    pub fn new(screen: Screen) -> Self {
        Self { screen }
    }

    #[cfg(test)]
    #[must_use]
    pub fn screen(&self) -> &Screen {
        &self.screen
    }
}

impl TaskHandler for LayoutHandler {
    type Handle = LayoutTask;

    fn schedule_task(&mut self, task: &Task) -> eyre::Result<LayoutTask> {
        let Payload::Layout(layout) = &task.payload else {
            bail!("{} task has no layout", task.kind.as_str());
        };

        Ok(LayoutTask {
            layout: layout.clone(),
            applied: false,
        })
    }

    fn start_task(&mut self, handle: &mut LayoutTask) -> eyre::Result<()> {
        self.screen.set_layout(handle.layout.clone());
        handle.applied = true;
        Ok(())
    }

    fn stop_task(&mut self, handle: LayoutTask) -> eyre::Result<()> {
        // Only undo our own layout; a later task may have replaced it already.
        if handle.applied && self.screen.layout() == &handle.layout {
            self.screen.set_layout(Layout::default());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::ManualClock,
        plan::{TaskKind, item},
        scheduler::{Scheduler, Settings},
    };

    fn layout_task(start: f64, end: f64, mode: LayoutMode) -> Task {
        Task::new(
            TaskKind::Layout,
            start,
            end,
            Payload::Layout(Layout {
                mode,
                sidebar: Some("https://example.org/side".into()),
                panel: None,
            }),
        )
        .unwrap()
    }

    #[test]
    fn full_covers_screen() {
        let regions = Layout::default().regions(1920, 1080).unwrap();
        assert_eq!(
            regions.player,
            Rect {
                x: 0,
                y: 0,
                width: 1920,
                height: 1080
            }
        );
        assert_eq!(regions.sidebar, None);
        assert_eq!(regions.panel, None);
    }

    #[test]
    fn sidebar_keeps_four_thirds_player() {
        let layout = Layout {
            mode: LayoutMode::Sidebar,
            ..Layout::default()
        };
        let regions = layout.regions(1920, 1080).unwrap();
        assert_eq!(regions.player.width, 1440);
        assert_eq!(
            regions.sidebar,
            Some(Rect {
                x: 1440,
                y: 0,
                width: 480,
                height: 1080
            })
        );
    }

    #[test]
    fn panel_reserves_bottom_strip() {
        let layout = Layout {
            mode: LayoutMode::Panel,
            ..Layout::default()
        };
        let regions = layout.regions(1920, 1080).unwrap();
        assert_eq!(
            regions.player,
            Rect {
                x: 0,
                y: 0,
                width: 1320,
                height: 990
            }
        );
        assert_eq!(
            regions.sidebar,
            Some(Rect {
                x: 1320,
                y: 0,
                width: 600,
                height: 990
            })
        );
        assert_eq!(
            regions.panel,
            Some(Rect {
                x: 0,
                y: 990,
                width: 1920,
                height: 90
            })
        );
    }

    #[test]
    fn degenerate_screens_have_no_regions() {
        let layout = Layout::default();
        assert_eq!(layout.regions(0, 1080), None);
        assert_eq!(layout.regions(1920, 0), None);
        assert_eq!(layout.regions(1080, 1920), None);
    }

    #[test]
    fn huge_screens_do_not_overflow() {
        let layout = Layout {
            mode: LayoutMode::Sidebar,
            ..Layout::default()
        };
        let regions = layout.regions(u32::MAX, u32::MAX).unwrap();
        assert_eq!(regions.player.width, u32::MAX);
        assert_eq!(regions.sidebar.map(|r| r.width), Some(0));
    }

    #[test]
    fn set_layout_reports_changes() {
        let mut screen = Screen::new(1920, 1080);
        assert!(!screen.set_layout(Layout::default()));

        let sidebar = Layout {
            mode: LayoutMode::Sidebar,
            ..Layout::default()
        };
        assert!(screen.set_layout(sidebar.clone()));
        assert_eq!(screen.layout(), &sidebar);
        assert_eq!(screen.regions().and_then(|r| r.sidebar).map(|r| r.width), Some(480));
    }

    #[test]
    fn layout_tasks_apply_and_revert() {
        let clock = ManualClock::at(0.0);
        let mut scheduler = Scheduler::new(
            "layout",
            LayoutHandler::new(Screen::new(1920, 1080)),
            clock.clone(),
            Settings::default(),
        );
        scheduler.start();
        scheduler.change_plan(vec![
            layout_task(10.0, 20.0, LayoutMode::Sidebar),
            layout_task(20.0, 40.0, LayoutMode::Panel),
        ]);

        let mode = |scheduler: &Scheduler<LayoutHandler, ManualClock>| {
            scheduler.handler().screen().layout().mode
        };

        scheduler.advance(10.0);
        assert_eq!(mode(&scheduler), LayoutMode::Sidebar);

        // the sidebar task ends as the panel task starts; the panel must win
        scheduler.advance(20.0);
        assert_eq!(mode(&scheduler), LayoutMode::Panel);

        scheduler.advance(40.0);
        assert_eq!(mode(&scheduler), LayoutMode::Full);
    }

    #[test]
    fn item_tasks_are_rejected() {
        let mut handler = LayoutHandler::new(Screen::new(1920, 1080));
        assert!(handler.schedule_task(&item(0.0, 1.0, "a")).is_err());
    }
}
