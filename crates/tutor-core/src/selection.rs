//! Selection capture for the "Ask about this" action.
//!
//! The broadcaster watches selection gestures on a [`SelectionSurface`],
//! places a floating action next to the selection, and only emits a
//! [`SelectionEvent`] once the reader confirms it.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::session::MIN_SELECTION_CHARS;
use crate::state::SelectionEvent;

pub const DEFAULT_GUARD_WINDOW: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Rect {
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.left && p.x < self.right && p.y >= self.top && p.y < self.bottom
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

/// Footprint of the action control and the margins used to place it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionLayout {
    pub width: f64,
    pub height: f64,
    /// Horizontal distance from the selection
    pub gap_x: f64,
    /// Vertical distance from the selection
    pub gap_y: f64,
    /// Distance kept from the right edge when neither side fits
    pub edge_margin: f64,
    /// Top position used when the control fits neither below nor above
    pub min_top: f64,
}

impl Default for ActionLayout {
    fn default() -> Self {
        Self {
            width: 150.0,
            height: 40.0,
            gap_x: 10.0,
            gap_y: 5.0,
            edge_margin: 10.0,
            min_top: 10.0,
        }
    }
}

impl ActionLayout {
    /// Top-left corner for the control next to `rect`, kept inside `viewport`.
    pub fn anchor(&self, rect: Rect, viewport: Size) -> Point {
        let mut x = rect.right + self.gap_x;
        let mut y = rect.bottom + self.gap_y;

        if x + self.width > viewport.width {
            x = rect.left - self.width - self.gap_x;
            if x < 0.0 {
                x = (viewport.width - self.width - self.edge_margin).max(0.0);
            }
        }

        if y + self.height > viewport.height {
            y = rect.top - self.height - self.gap_y;
            if y < 0.0 {
                y = self.min_top;
            }
        }

        Point { x, y }
    }
}

/// What the surface currently has selected.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionSnapshot {
    pub text: String,
    /// Bounding rectangle of the first selected range, if it has one
    pub bounds: Option<Rect>,
}

/// Anything that can report and clear a text selection.
pub trait SelectionSurface {
    fn selection(&self) -> Option<SelectionSnapshot>;
    fn viewport(&self) -> Size;
    fn clear_selection(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    PointerUp,
    KeyUp,
    TouchEnd,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingAction {
    pub text: String,
    pub anchor: Point,
    shown_at: Instant,
}

pub struct SelectionBroadcaster {
    layout: ActionLayout,
    guard: Duration,
    pending: Option<PendingAction>,
    last_timestamp: u64,
}

impl Default for SelectionBroadcaster {
    fn default() -> Self {
        Self::new(ActionLayout::default(), DEFAULT_GUARD_WINDOW)
    }
}

impl SelectionBroadcaster {
    pub fn new(layout: ActionLayout, guard: Duration) -> Self {
        Self {
            layout,
            guard,
            pending: None,
            last_timestamp: 0,
        }
    }

    pub fn pending(&self) -> Option<&PendingAction> {
        self.pending.as_ref()
    }

    /// Screen rectangle of the shown action, for hit-testing clicks.
    pub fn action_bounds(&self) -> Option<Rect> {
        self.pending.as_ref().map(|p| Rect {
            left: p.anchor.x,
            top: p.anchor.y,
            right: p.anchor.x + self.layout.width,
            bottom: p.anchor.y + self.layout.height,
        })
    }

    /// React to a gesture that may have changed the selection.
    pub fn on_gesture<S: SelectionSurface + ?Sized>(
        &mut self,
        gesture: Gesture,
        surface: &S,
        now: Instant,
    ) -> Option<&PendingAction> {
        let snapshot = surface.selection();
        let text = snapshot
            .as_ref()
            .map(|s| s.text.trim())
            .unwrap_or_default();

        if text.chars().count() <= MIN_SELECTION_CHARS {
            debug!(?gesture, "selection too short, hiding action");
            self.pending = None;
            return None;
        }

        let Some(bounds) = snapshot.as_ref().and_then(|s| s.bounds) else {
            self.pending = None;
            return None;
        };

        let anchor = self.layout.anchor(bounds, surface.viewport());
        debug!(?gesture, x = anchor.x, y = anchor.y, "showing selection action");
        self.pending = Some(PendingAction {
            text: text.to_string(),
            anchor,
            shown_at: now,
        });
        self.pending.as_ref()
    }

    /// A click landed outside the action. Returns whether the action was dismissed.
    pub fn on_click_outside(&mut self, now: Instant) -> bool {
        match &self.pending {
            Some(p) if now.duration_since(p.shown_at) < self.guard => {
                debug!("ignoring click, action just shown");
                false
            }
            Some(_) => {
                self.pending = None;
                true
            }
            None => false,
        }
    }

    /// Route a click: inside the action confirms, anywhere else may dismiss.
    pub fn on_click<S: SelectionSurface + ?Sized>(
        &mut self,
        at: Point,
        surface: &mut S,
        now: Instant,
    ) -> Option<SelectionEvent> {
        if self.action_bounds().is_some_and(|r| r.contains(at)) {
            return self.confirm(surface);
        }
        self.on_click_outside(now);
        None
    }

    /// The reader confirmed the action: emit the pending text once.
    pub fn confirm<S: SelectionSurface + ?Sized>(&mut self, surface: &mut S) -> Option<SelectionEvent> {
        let pending = self.pending.take()?;
        surface.clear_selection();

        let timestamp = self.next_timestamp();
        debug!(timestamp, chars = pending.text.chars().count(), "selection confirmed");
        Some(SelectionEvent {
            text: pending.text,
            timestamp,
        })
    }

    pub fn dismiss(&mut self) {
        self.pending = None;
    }

    fn next_timestamp(&mut self) -> u64 {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self.last_timestamp = now_ms.max(self.last_timestamp + 1);
        self.last_timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeSurface {
        selection: Option<SelectionSnapshot>,
        viewport: Size,
        cleared: usize,
    }

    impl FakeSurface {
        fn with_text(text: &str) -> Self {
            Self {
                selection: Some(SelectionSnapshot {
                    text: text.to_string(),
                    bounds: Some(Rect {
                        left: 100.0,
                        top: 100.0,
                        right: 300.0,
                        bottom: 120.0,
                    }),
                }),
                viewport: Size {
                    width: 1280.0,
                    height: 800.0,
                },
                cleared: 0,
            }
        }
    }

    impl SelectionSurface for FakeSurface {
        fn selection(&self) -> Option<SelectionSnapshot> {
            self.selection.clone()
        }

        fn viewport(&self) -> Size {
            self.viewport
        }

        fn clear_selection(&mut self) {
            self.selection = None;
            self.cleared += 1;
        }
    }

    fn rect(left: f64, top: f64, right: f64, bottom: f64) -> Rect {
        Rect {
            left,
            top,
            right,
            bottom,
        }
    }

    #[test]
    fn test_short_selections_show_nothing() {
        let now = Instant::now();
        for text in ["", "a", "abc", "  abc  ", "\n\tab\n"] {
            let surface = FakeSurface::with_text(text);
            let mut broadcaster = SelectionBroadcaster::default();
            assert!(broadcaster.on_gesture(Gesture::PointerUp, &surface, now).is_none());
            assert!(broadcaster.pending().is_none());
        }
    }

    #[test]
    fn test_short_selection_hides_existing_action() {
        let now = Instant::now();
        let mut broadcaster = SelectionBroadcaster::default();
        broadcaster.on_gesture(Gesture::PointerUp, &FakeSurface::with_text("gyroscope"), now);
        assert!(broadcaster.pending().is_some());

        broadcaster.on_gesture(Gesture::KeyUp, &FakeSurface::with_text("ab"), now);
        assert!(broadcaster.pending().is_none());
    }

    #[test]
    fn test_missing_selection_or_bounds_is_nothing_selected() {
        let now = Instant::now();
        let mut surface = FakeSurface::with_text("long enough");
        surface.selection.as_mut().unwrap().bounds = None;

        let mut broadcaster = SelectionBroadcaster::default();
        assert!(broadcaster.on_gesture(Gesture::TouchEnd, &surface, now).is_none());

        surface.selection = None;
        assert!(broadcaster.on_gesture(Gesture::TouchEnd, &surface, now).is_none());
    }

    #[test]
    fn test_confirm_emits_trimmed_text_once() {
        let now = Instant::now();
        let mut surface = FakeSurface::with_text("  servo motor control \n");
        let mut broadcaster = SelectionBroadcaster::default();
        broadcaster.on_gesture(Gesture::PointerUp, &surface, now);

        let event = broadcaster.confirm(&mut surface).unwrap();
        assert_eq!(event.text, "servo motor control");
        assert!(event.timestamp > 0);
        assert_eq!(surface.cleared, 1);

        assert!(broadcaster.confirm(&mut surface).is_none());
        assert!(broadcaster.pending().is_none());
    }

    #[test]
    fn test_new_selection_replaces_pending() {
        let now = Instant::now();
        let mut broadcaster = SelectionBroadcaster::default();
        broadcaster.on_gesture(Gesture::PointerUp, &FakeSurface::with_text("first one"), now);
        let mut second = FakeSurface::with_text("second one");
        broadcaster.on_gesture(Gesture::PointerUp, &second, now);

        let event = broadcaster.confirm(&mut second).unwrap();
        assert_eq!(event.text, "second one");
    }

    #[test]
    fn test_timestamps_strictly_increase() {
        let now = Instant::now();
        let mut surface = FakeSurface::with_text("balance control");
        let mut broadcaster = SelectionBroadcaster::default();

        broadcaster.on_gesture(Gesture::PointerUp, &surface, now);
        let first = broadcaster.confirm(&mut surface).unwrap();

        surface = FakeSurface::with_text("balance control");
        broadcaster.on_gesture(Gesture::PointerUp, &surface, now);
        let second = broadcaster.confirm(&mut surface).unwrap();

        assert!(second.timestamp > first.timestamp);
    }

    #[test]
    fn test_guard_window_suppresses_dismiss() {
        let shown = Instant::now();
        let mut broadcaster = SelectionBroadcaster::default();
        broadcaster.on_gesture(Gesture::PointerUp, &FakeSurface::with_text("trajectory"), shown);

        assert!(!broadcaster.on_click_outside(shown + Duration::from_millis(100)));
        assert!(broadcaster.pending().is_some());

        assert!(broadcaster.on_click_outside(shown + Duration::from_millis(350)));
        assert!(broadcaster.pending().is_none());
    }

    #[test]
    fn test_click_routing() {
        let shown = Instant::now();
        let later = shown + Duration::from_secs(1);
        let mut surface = FakeSurface::with_text("point cloud");
        let mut broadcaster = SelectionBroadcaster::default();
        broadcaster.on_gesture(Gesture::PointerUp, &surface, shown);

        let anchor = broadcaster.pending().unwrap().anchor;
        let inside = Point {
            x: anchor.x + 5.0,
            y: anchor.y + 5.0,
        };
        let event = broadcaster.on_click(inside, &mut surface, later);
        assert_eq!(event.unwrap().text, "point cloud");

        let mut surface = FakeSurface::with_text("point cloud");
        broadcaster.on_gesture(Gesture::PointerUp, &surface, shown);
        let outside = Point { x: 0.0, y: 0.0 };
        assert!(broadcaster.on_click(outside, &mut surface, later).is_none());
        assert!(broadcaster.pending().is_none());
        assert_eq!(surface.cleared, 0);
    }

    #[test]
    fn test_anchor_below_right() {
        let layout = ActionLayout::default();
        let viewport = Size {
            width: 1000.0,
            height: 800.0,
        };
        let p = layout.anchor(rect(100.0, 100.0, 300.0, 120.0), viewport);
        assert_eq!(p, Point { x: 310.0, y: 125.0 });
    }

    #[test]
    fn test_anchor_flips_left_and_up() {
        let layout = ActionLayout::default();
        let viewport = Size {
            width: 1000.0,
            height: 800.0,
        };
        let p = layout.anchor(rect(600.0, 740.0, 900.0, 780.0), viewport);
        assert_eq!(p, Point { x: 440.0, y: 695.0 });
    }

    #[test]
    fn test_anchor_wide_selection_pins_to_right_edge() {
        let layout = ActionLayout::default();
        let viewport = Size {
            width: 1000.0,
            height: 800.0,
        };
        let p = layout.anchor(rect(50.0, 10.0, 990.0, 30.0), viewport);
        assert_eq!(p.x, 840.0);
        assert_eq!(p.y, 35.0);
    }

    #[test]
    fn test_anchor_tall_selection_uses_min_top() {
        let layout = ActionLayout::default();
        let viewport = Size {
            width: 1000.0,
            height: 800.0,
        };
        let p = layout.anchor(rect(100.0, 20.0, 300.0, 790.0), viewport);
        assert_eq!(p.y, 10.0);
        assert_eq!(p.x, 310.0);
    }

    #[test]
    fn test_anchor_stays_in_tiny_viewport() {
        let layout = ActionLayout::default();
        let viewport = Size {
            width: 120.0,
            height: 800.0,
        };
        let p = layout.anchor(rect(10.0, 10.0, 100.0, 30.0), viewport);
        assert_eq!(p.x, 0.0);
    }
}
