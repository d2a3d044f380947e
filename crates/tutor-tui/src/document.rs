//! The lesson pane: wrapped text, scrolling, and mouse/keyboard selection.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ratatui::layout::Rect;
use tutor_core::selection::{Rect as SelRect, SelectionSnapshot, SelectionSurface, Size};

const WELCOME: &str = "\
# Physical AI & Humanoid Robotics

Welcome! Open a lesson with `tutor read path/to/lesson.md`.

Select any passage with the mouse (or press `v`, move with j/k, press `v` again) \
and choose \"Ask about this\" to send it to the study assistant as context. \
Press `c` to open the assistant, `s` to sign in, and `q` to quit.";

/// A position in wrapped-row coordinates (row, char column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Pos {
    pub row: usize,
    pub col: usize,
}

#[derive(Debug, Clone)]
struct Row {
    text: String,
    /// Last row of its paragraph
    ends_paragraph: bool,
}

pub struct Document {
    pub title: String,
    pub path: Option<PathBuf>,
    source: String,
    rows: Vec<Row>,
    wrap_width: usize,
    pub scroll: usize,
    pub cursor_row: usize,
    /// Screen area the rows are drawn into (inside borders)
    pub area: Rect,
    /// Whole terminal, for placing the action control
    pub viewport: Rect,
    selection: Option<(Pos, Pos)>,
    /// Keyboard selection in progress
    pub selecting: bool,
}

impl Document {
    pub fn welcome() -> Self {
        Self::from_text("Welcome", None, WELCOME)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read lesson {}", path.display()))?;
        let title = text
            .lines()
            .find_map(|l| l.strip_prefix("# "))
            .map(str::to_string)
            .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "Lesson".to_string());
        Ok(Self::from_text(&title, Some(path.to_path_buf()), &text))
    }

    pub fn from_text(title: &str, path: Option<PathBuf>, text: &str) -> Self {
        let mut doc = Self {
            title: title.to_string(),
            path,
            source: text.to_string(),
            rows: Vec::new(),
            wrap_width: 0,
            scroll: 0,
            cursor_row: 0,
            area: Rect::default(),
            viewport: Rect::default(),
            selection: None,
            selecting: false,
        };
        doc.layout(80);
        doc
    }

    /// Page identifier sent with chat requests, e.g. `/docs/lesson-01`.
    pub fn page_id(&self) -> Option<String> {
        self.path
            .as_ref()
            .and_then(|p| p.file_stem())
            .map(|stem| format!("/docs/{}", stem.to_string_lossy()))
    }

    /// Re-wrap for a new width. Clears the selection, since rows move.
    pub fn layout(&mut self, width: usize) {
        let width = width.max(10);
        if width == self.wrap_width {
            return;
        }
        self.wrap_width = width;
        self.rows.clear();
        self.selection = None;

        for paragraph in self.source.lines() {
            let wrapped = wrap_text_to_width(paragraph, width);
            let last = wrapped.len().saturating_sub(1);
            for (i, text) in wrapped.into_iter().enumerate() {
                self.rows.push(Row {
                    text,
                    ends_paragraph: i == last,
                });
            }
        }

        self.cursor_row = self.cursor_row.min(self.rows.len().saturating_sub(1));
        self.scroll = self.scroll.min(self.max_scroll());
    }

    pub fn rows(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|r| r.text.as_str())
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn max_scroll(&self) -> usize {
        self.rows.len().saturating_sub(self.area.height as usize)
    }

    pub fn scroll_down(&mut self, n: usize) {
        self.scroll = (self.scroll + n).min(self.max_scroll());
    }

    pub fn scroll_up(&mut self, n: usize) {
        self.scroll = self.scroll.saturating_sub(n);
    }

    pub fn cursor_down(&mut self) {
        if self.cursor_row + 1 < self.rows.len() {
            self.cursor_row += 1;
        }
        self.follow_cursor();
    }

    pub fn cursor_up(&mut self) {
        self.cursor_row = self.cursor_row.saturating_sub(1);
        self.follow_cursor();
    }

    fn follow_cursor(&mut self) {
        let height = (self.area.height as usize).max(1);
        if self.cursor_row < self.scroll {
            self.scroll = self.cursor_row;
        } else if self.cursor_row >= self.scroll + height {
            self.scroll = self.cursor_row + 1 - height;
        }
        if self.selecting {
            if let Some((anchor, _)) = self.selection {
                let head = Pos {
                    row: self.cursor_row,
                    col: self.row_len(self.cursor_row),
                };
                self.selection = Some((anchor, head));
            }
        }
    }

    /// Start or finish a keyboard (whole-row) selection. Returns true when finished.
    pub fn toggle_row_selection(&mut self) -> bool {
        if self.selecting {
            self.selecting = false;
            return true;
        }
        self.selecting = true;
        let anchor = Pos {
            row: self.cursor_row,
            col: 0,
        };
        let head = Pos {
            row: self.cursor_row,
            col: self.row_len(self.cursor_row),
        };
        self.selection = Some((anchor, head));
        false
    }

    /// Map a screen cell to a document position, if it is inside the pane.
    pub fn pos_at(&self, x: u16, y: u16) -> Option<Pos> {
        let a = self.area;
        if x < a.x || y < a.y || x >= a.x + a.width || y >= a.y + a.height {
            return None;
        }
        let row = self.scroll + (y - a.y) as usize;
        if row >= self.rows.len() {
            return None;
        }
        let col = ((x - a.x) as usize).min(self.row_len(row));
        Some(Pos { row, col })
    }

    pub fn begin_drag(&mut self, pos: Pos) {
        self.selecting = false;
        self.selection = Some((pos, pos));
    }

    pub fn extend_drag(&mut self, pos: Pos) {
        if let Some((anchor, _)) = self.selection {
            self.selection = Some((anchor, pos));
        }
    }

    pub fn clear(&mut self) {
        self.selection = None;
    }

    /// Ordered (start, end) with `end` exclusive in its row.
    pub fn selection_range(&self) -> Option<(Pos, Pos)> {
        let (a, b) = self.selection?;
        if a == b {
            return None;
        }
        Some(if a <= b { (a, b) } else { (b, a) })
    }

    pub fn selected_text(&self) -> String {
        let Some((start, end)) = self.selection_range() else {
            return String::new();
        };

        let mut out = String::new();
        for row in start.row..=end.row.min(self.rows.len().saturating_sub(1)) {
            let r = &self.rows[row];
            let from = if row == start.row { start.col } else { 0 };
            let to = if row == end.row { end.col } else { r.text.chars().count() };
            out.extend(r.text.chars().skip(from).take(to.saturating_sub(from)));
            if row != end.row {
                out.push(if r.ends_paragraph { '\n' } else { ' ' });
            }
        }
        out
    }

    fn row_len(&self, row: usize) -> usize {
        self.rows.get(row).map(|r| r.text.chars().count()).unwrap_or(0)
    }

    /// Screen rectangle covering the selection, clipped to the pane.
    fn selection_bounds(&self) -> Option<SelRect> {
        let (start, end) = self.selection_range()?;
        let a = self.area;
        let first_visible = self.scroll;
        let last_visible = self.scroll + a.height as usize;
        if end.row < first_visible || start.row >= last_visible {
            return None;
        }

        let top_row = start.row.max(first_visible) - first_visible;
        let bottom_row = end.row.min(last_visible.saturating_sub(1)) - first_visible;
        let (left, right) = if start.row == end.row {
            (start.col, end.col)
        } else {
            (0, a.width as usize)
        };

        Some(SelRect {
            left: (a.x as usize + left) as f64,
            top: (a.y as usize + top_row) as f64,
            right: (a.x as usize + right) as f64,
            bottom: (a.y as usize + bottom_row + 1) as f64,
        })
    }
}

impl SelectionSurface for Document {
    fn selection(&self) -> Option<SelectionSnapshot> {
        self.selection_range()?;
        Some(SelectionSnapshot {
            text: self.selected_text(),
            bounds: self.selection_bounds(),
        })
    }

    fn viewport(&self) -> Size {
        Size {
            width: self.viewport.width as f64,
            height: self.viewport.height as f64,
        }
    }

    fn clear_selection(&mut self) {
        self.selection = None;
        self.selecting = false;
    }
}

/// Wrap text to a maximum width, breaking at word boundaries
pub fn wrap_text_to_width(text: &str, width: usize) -> Vec<String> {
    if width == 0 || text.is_empty() {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        if current_len > 0 && current_len + 1 + word_len > width {
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }

    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str, width: u16, height: u16) -> Document {
        let mut d = Document::from_text("t", None, text);
        d.area = Rect::new(2, 3, width, height);
        d.viewport = Rect::new(0, 0, 100, 40);
        d.layout(width as usize);
        d
    }

    #[test]
    fn test_wrap_text_to_width() {
        assert_eq!(
            wrap_text_to_width("the quick brown fox", 10),
            vec!["the quick", "brown fox"]
        );
        assert_eq!(wrap_text_to_width("", 10), vec![""]);
    }

    #[test]
    fn test_drag_selection_single_row() {
        let mut d = doc("inverse kinematics solves joint angles", 40, 5);
        d.begin_drag(Pos { row: 0, col: 8 });
        d.extend_drag(Pos { row: 0, col: 18 });

        let snap = d.selection().unwrap();
        assert_eq!(snap.text, "kinematics");
        let bounds = snap.bounds.unwrap();
        assert_eq!(bounds.left, 10.0);
        assert_eq!(bounds.right, 20.0);
        assert_eq!(bounds.top, 3.0);
        assert_eq!(bounds.bottom, 4.0);
    }

    #[test]
    fn test_backwards_drag_is_normalized() {
        let mut d = doc("inverse kinematics", 40, 5);
        d.begin_drag(Pos { row: 0, col: 7 });
        d.extend_drag(Pos { row: 0, col: 0 });
        assert_eq!(d.selected_text(), "inverse");
    }

    #[test]
    fn test_multi_row_selection_joins_wrapped_rows() {
        let mut d = doc("the quick brown fox\nnext paragraph", 10, 5);
        // rows: "the quick", "brown fox", "next", "paragraph"
        d.begin_drag(Pos { row: 0, col: 4 });
        d.extend_drag(Pos { row: 2, col: 4 });
        assert_eq!(d.selected_text(), "quick brown fox\nnext");
    }

    #[test]
    fn test_click_without_drag_selects_nothing() {
        let mut d = doc("some text here", 40, 5);
        d.begin_drag(Pos { row: 0, col: 3 });
        assert!(d.selection().is_none());
    }

    #[test]
    fn test_pos_at_respects_area_and_scroll() {
        let mut d = doc("a\nb\nc\nd\ne\nf", 20, 2);
        assert_eq!(d.pos_at(0, 0), None);
        assert_eq!(d.pos_at(2, 3), Some(Pos { row: 0, col: 0 }));
        d.scroll_down(3);
        assert_eq!(d.pos_at(2, 4), Some(Pos { row: 4, col: 0 }));
    }

    #[test]
    fn test_keyboard_row_selection() {
        let mut d = doc("first row\nsecond row\nthird row", 40, 5);
        assert!(!d.toggle_row_selection());
        d.cursor_down();
        assert!(d.toggle_row_selection());
        assert_eq!(d.selected_text(), "first row\nsecond row");
    }

    #[test]
    fn test_clear_selection() {
        let mut d = doc("gripper force control", 40, 5);
        d.begin_drag(Pos { row: 0, col: 0 });
        d.extend_drag(Pos { row: 0, col: 7 });
        d.clear_selection();
        assert!(d.selection().is_none());
    }

    #[test]
    fn test_load_uses_heading_as_title() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lesson-01-sensors.md");
        std::fs::write(&path, "# Sensors and Perception\n\nLidar measures distance.").unwrap();

        let d = Document::load(&path).unwrap();
        assert_eq!(d.title, "Sensors and Perception");
        assert_eq!(d.page_id().as_deref(), Some("/docs/lesson-01-sensors"));
    }
}
