//! Icon overlay glue: collecting icons from a chain and the redraw schedule.
//!
//! Drawing is delegated to an [`IconOverlayFactory`]. The unit draws once
//! when it starts, then redraws on a fixed interval while the overlay
//! reports pending layout work. The schedule is a tokio task that is
//! aborted as soon as the unit finishes.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;

use super::base::UnitCore;
use super::surface::VideoAdContainer;
use crate::model::{Chain, Icon, TrackingEventKind};

/// Callback invoked with the icon a viewer interacted with.
pub type IconCallback = Arc<dyn Fn(&Icon) + Send + Sync>;

/// Adapters the overlay calls back into.
#[derive(Clone)]
pub struct IconHooks {
    pub on_click: IconCallback,
    pub on_view: IconCallback,
}

/// A set of icons drawn over the container.
pub trait IconOverlay: Send + Sync {
    fn draw(&self);
    fn remove(&self);
    /// True while icon layout is not settled and another draw is needed.
    fn has_pending_redraws(&self) -> bool;
}

pub trait IconOverlayFactory: Send + Sync {
    fn add_icons(
        &self,
        icons: Vec<Icon>,
        container: Arc<dyn VideoAdContainer>,
        hooks: IconHooks,
    ) -> Arc<dyn IconOverlay>;
}

/// Icons declared anywhere in the chain, head first; the first icon per
/// program wins.
pub fn collect_icons(chain: &Chain) -> Vec<Icon> {
    let mut programs = HashSet::new();
    let mut icons = Vec::new();
    for ad in chain.ads() {
        for icon in ad.icons() {
            let fresh = match &icon.program {
                Some(program) => programs.insert(program.clone()),
                None => true,
            };
            if fresh {
                icons.push(icon.clone());
            }
        }
    }
    icons
}

/// Overlay plus redraw task owned by one unit.
#[derive(Default)]
pub(crate) struct IconSchedule {
    overlay: Mutex<Option<Arc<dyn IconOverlay>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl IconSchedule {
    /// Hand the chain's icons to `factory`, draw once and start redrawing.
    /// Does nothing when the chain declares no icons.
    pub(crate) fn attach(
        &self,
        factory: &Arc<dyn IconOverlayFactory>,
        container: Arc<dyn VideoAdContainer>,
        core: &Arc<UnitCore>,
    ) {
        let icons = collect_icons(core.chain());
        if icons.is_empty() {
            return;
        }

        let overlay = factory.add_icons(icons, container, icon_hooks(Arc::downgrade(core)));
        overlay.draw();
        *self.overlay.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&overlay));

        let interval = core.options().icon_redraw_interval();
        let handle = spawn_redraws(overlay, interval, Arc::downgrade(core));
        *self.task.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    /// Draw again, e.g. after the container was resized.
    pub(crate) fn redraw(&self) {
        let overlay = self.overlay.lock().unwrap_or_else(|e| e.into_inner()).clone();
        if let Some(overlay) = overlay {
            overlay.draw();
        }
    }

    /// Abort the schedule and remove the icons.
    pub(crate) fn detach(&self) {
        if let Some(task) = self.task.lock().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
        }
        let overlay = self.overlay.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(overlay) = overlay {
            overlay.remove();
        }
    }
}

fn icon_hooks(core: Weak<UnitCore>) -> IconHooks {
    let click_core = core.clone();
    IconHooks {
        on_click: Arc::new(move |icon: &Icon| {
            if let Some(core) = click_core.upgrade() {
                core.emit_with(TrackingEventKind::IconClick, icon_payload(icon));
            }
        }),
        on_view: Arc::new(move |icon: &Icon| {
            if let Some(core) = core.upgrade() {
                core.emit_with(TrackingEventKind::IconView, icon_payload(icon));
            }
        }),
    }
}

fn icon_payload(icon: &Icon) -> serde_json::Value {
    serde_json::to_value(icon).unwrap_or(serde_json::Value::Null)
}

fn spawn_redraws(
    overlay: Arc<dyn IconOverlay>,
    interval: Duration,
    core: Weak<UnitCore>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let live = core.upgrade().is_some_and(|core| !core.is_finished());
            if !live || !overlay.has_pending_redraws() {
                break;
            }
            tokio::time::sleep(interval).await;
            if core.upgrade().map_or(true, |core| core.is_finished()) {
                break;
            }
            overlay.draw();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AdEntry, AdReference, ChainLink, InlineAd, WrapperAd};

    fn icon(program: &str, width: u32) -> Icon {
        Icon {
            program: Some(program.to_string()),
            width,
            height: 20,
            x_position: "right".into(),
            y_position: "top".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_collect_icons_first_program_wins() {
        let inline = AdReference::from(AdEntry {
            inline: Some(InlineAd {
                icons: vec![icon("AdChoices", 10)],
                ..Default::default()
            }),
            ..Default::default()
        });
        let wrapper = AdReference::from(AdEntry {
            wrapper: Some(WrapperAd {
                ad_tag_uri: "https://inline.example.com".into(),
                icons: vec![icon("AdChoices", 99), icon("Sponsor", 30)],
                ..Default::default()
            }),
            ..Default::default()
        });

        let mut chain = Chain::new();
        let mut root = ChainLink::new("https://wrapper.example.com");
        root.ad = Some(wrapper);
        chain.push_head(root);
        let mut head = ChainLink::new("https://inline.example.com");
        head.ad = Some(inline);
        chain.push_head(head);

        let icons = collect_icons(&chain);
        assert_eq!(icons.len(), 2);
        assert_eq!(icons[0].width, 10);
        assert_eq!(icons[1].program.as_deref(), Some("Sponsor"));
    }

    #[test]
    fn test_collect_icons_empty_chain() {
        assert!(collect_icons(&Chain::new()).is_empty());
    }
}
