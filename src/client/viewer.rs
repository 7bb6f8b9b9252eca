//! PDF preview state: page, zoom, scroll and pane layout.

use crate::pdf;
use tracing::debug;

/// Horizontal padding of the PDF pane, in CSS pixels per side.
pub const PANE_PADDING: f64 = 16.0;
/// Pages never render narrower than this.
pub const MIN_RENDER_WIDTH: f64 = 300.0;

// Zoom is kept in tenths so stepping never accumulates float error.
const ZOOM_MIN: u8 = 1;
const ZOOM_MAX: u8 = 20;
const ZOOM_DEFAULT: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
    #[default]
    Split,
    ReportMaximized,
    PdfMaximized,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrollOffset {
    pub top: f64,
    pub left: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    ArrowLeft,
    ArrowRight,
    ArrowUp,
    ArrowDown,
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PdfViewer {
    page: u32,
    page_count: u32,
    zoom_tenths: u8,
    scroll: ScrollOffset,
    layout: Layout,
    render_width: f64,
}

impl Default for PdfViewer {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfViewer {
    pub fn new() -> Self {
        Self {
            page: 1,
            page_count: 0,
            zoom_tenths: ZOOM_DEFAULT,
            scroll: ScrollOffset::default(),
            layout: Layout::Split,
            render_width: MIN_RENDER_WIDTH,
        }
    }

    /// Reset for a new document and read its page count.
    ///
    /// Returns the page count, or `None` when lopdf cannot parse the bytes;
    /// navigation is then disabled.
    pub fn load_pdf(&mut self, data: &[u8]) -> Option<u32> {
        let inspection = pdf::inspect(data);
        self.page = 1;
        self.page_count = inspection.page_count.unwrap_or(0);
        self.zoom_tenths = ZOOM_DEFAULT;
        self.scroll = ScrollOffset::default();
        debug!("Viewer loaded document with {:?} pages", inspection.page_count);
        inspection.page_count
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn zoom(&self) -> f64 {
        f64::from(self.zoom_tenths) / 10.0
    }

    pub fn scroll(&self) -> ScrollOffset {
        self.scroll
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn render_width(&self) -> f64 {
        self.render_width
    }

    /// Width a page is drawn at: render width times zoom.
    pub fn page_width(&self) -> f64 {
        self.render_width * self.zoom()
    }

    pub fn can_go_previous(&self) -> bool {
        self.page > 1
    }

    pub fn can_go_next(&self) -> bool {
        self.page < self.page_count
    }

    /// Record the user's scroll position.
    pub fn set_scroll(&mut self, offset: ScrollOffset) {
        self.scroll = offset;
    }

    /// Move to `page`. Out-of-range or current page is a no-op (`None`).
    ///
    /// On success returns the scroll offset to restore once the new page has
    /// rendered; it is the offset held before navigating.
    pub fn go_to(&mut self, page: u32) -> Option<ScrollOffset> {
        if page == self.page || page < 1 || page > self.page_count {
            return None;
        }
        self.page = page;
        Some(self.scroll)
    }

    pub fn next_page(&mut self) -> Option<ScrollOffset> {
        self.go_to(self.page.saturating_add(1))
    }

    pub fn previous_page(&mut self) -> Option<ScrollOffset> {
        self.go_to(self.page.saturating_sub(1))
    }

    /// Arrow keys page through the document.
    pub fn on_key(&mut self, key: Key) -> Option<ScrollOffset> {
        match key {
            Key::ArrowLeft | Key::ArrowUp => self.previous_page(),
            Key::ArrowRight | Key::ArrowDown => self.next_page(),
            Key::Other => None,
        }
    }

    pub fn zoom_in(&mut self) -> f64 {
        self.zoom_tenths = (self.zoom_tenths + 1).min(ZOOM_MAX);
        self.zoom()
    }

    pub fn zoom_out(&mut self) -> f64 {
        self.zoom_tenths = self.zoom_tenths.saturating_sub(1).max(ZOOM_MIN);
        self.zoom()
    }

    /// Set an arbitrary zoom; snapped to the nearest 0.1 and clamped to
    /// `[0.1, 2.0]`. Non-finite input is ignored.
    pub fn set_zoom(&mut self, zoom: f64) -> f64 {
        if zoom.is_finite() {
            let tenths = (zoom * 10.0).round().clamp(f64::from(ZOOM_MIN), f64::from(ZOOM_MAX));
            self.zoom_tenths = tenths as u8;
        }
        self.zoom()
    }

    /// Switch layout; the container has new dimensions afterwards.
    pub fn set_layout(&mut self, layout: Layout, container_width: f64) {
        self.layout = layout;
        self.resize(container_width);
    }

    pub fn toggle_report_maximized(&mut self, container_width: f64) {
        let next = if self.layout == Layout::ReportMaximized {
            Layout::Split
        } else {
            Layout::ReportMaximized
        };
        self.set_layout(next, container_width);
    }

    pub fn toggle_pdf_maximized(&mut self, container_width: f64) {
        let next = if self.layout == Layout::PdfMaximized {
            Layout::Split
        } else {
            Layout::PdfMaximized
        };
        self.set_layout(next, container_width);
    }

    /// Container resized: recompute render width, reset zoom and scroll.
    pub fn resize(&mut self, container_width: f64) {
        self.render_width = render_width_for(container_width);
        self.zoom_tenths = ZOOM_DEFAULT;
        self.scroll = ScrollOffset::default();
    }
}

fn render_width_for(container_width: f64) -> f64 {
    if !container_width.is_finite() {
        return MIN_RENDER_WIDTH;
    }
    (container_width - 2.0 * PANE_PADDING).max(MIN_RENDER_WIDTH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::tests::sample_pdf;

    fn viewer(pages: u32) -> PdfViewer {
        let mut viewer = PdfViewer::new();
        assert_eq!(viewer.load_pdf(&sample_pdf(pages)), Some(pages));
        viewer
    }

    #[test]
    fn test_navigation_out_of_range_is_noop() {
        let mut v = viewer(3);
        assert_eq!(v.previous_page(), None);
        assert_eq!(v.page(), 1);
        assert_eq!(v.go_to(0), None);
        assert_eq!(v.go_to(4), None);
        assert_eq!(v.page(), 1);

        v.go_to(3).unwrap();
        assert_eq!(v.next_page(), None);
        assert_eq!(v.page(), 3);
        assert!(!v.can_go_next());
        assert!(v.can_go_previous());
    }

    #[test]
    fn test_scroll_restored_after_navigation() {
        let mut v = viewer(2);
        let offset = ScrollOffset { top: 120.0, left: 8.0 };
        v.set_scroll(offset);
        assert_eq!(v.next_page(), Some(offset));
        assert_eq!(v.page(), 2);
        assert_eq!(v.scroll(), offset);
    }

    #[test]
    fn test_arrow_keys() {
        let mut v = viewer(2);
        assert!(v.on_key(Key::ArrowRight).is_some());
        assert_eq!(v.page(), 2);
        assert!(v.on_key(Key::ArrowDown).is_none());
        assert!(v.on_key(Key::Other).is_none());
        assert!(v.on_key(Key::ArrowUp).is_some());
        assert_eq!(v.page(), 1);
    }

    #[test]
    fn test_zoom_clamps_in_tenths() {
        let mut v = PdfViewer::new();
        for _ in 0..30 {
            v.zoom_in();
        }
        assert_eq!(v.zoom(), 2.0);
        for _ in 0..30 {
            v.zoom_out();
        }
        assert_eq!(v.zoom(), 0.1);

        assert_eq!(v.set_zoom(5.0), 2.0);
        assert_eq!(v.set_zoom(0.0), 0.1);
        assert_eq!(v.set_zoom(1.26), 1.3);
        assert_eq!(v.set_zoom(f64::NAN), 1.3);
    }

    #[test]
    fn test_layout_change_resets_zoom_and_scroll() {
        let mut v = viewer(2);
        v.zoom_in();
        v.set_scroll(ScrollOffset { top: 50.0, left: 0.0 });

        v.toggle_pdf_maximized(1232.0);
        assert_eq!(v.layout(), Layout::PdfMaximized);
        assert_eq!(v.render_width(), 1200.0);
        assert_eq!(v.zoom(), 1.0);
        assert_eq!(v.scroll(), ScrollOffset::default());

        v.toggle_pdf_maximized(200.0);
        assert_eq!(v.layout(), Layout::Split);
        assert_eq!(v.render_width(), MIN_RENDER_WIDTH);

        v.toggle_report_maximized(800.0);
        assert_eq!(v.layout(), Layout::ReportMaximized);
    }

    #[test]
    fn test_unparseable_document_disables_navigation() {
        let mut v = PdfViewer::new();
        assert_eq!(v.load_pdf(b"not a pdf"), None);
        assert_eq!(v.page_count(), 0);
        assert_eq!(v.next_page(), None);
    }
}
