// Viewfinder overlay: the dark mask around the scan target, the corner brackets, the
// pulsing scan line and candidate dots while scanning; the frozen snapshot after a decode.
//
// The renderer paints into a transparent ARGB layer that the host composites over the
// camera picture. While live it keeps itself animated by scheduling its own next redraw;
// the host asks Viewfinder::needs_redraw each loop and calls Viewfinder::draw when
// it says so.

use std::mem;
use std::time::{Duration, Instant};

use crate::draw::{blit_opaque, clear_rect, fill_circle, fill_rect, with_alpha};
use crate::types::{FrameBuffer, Rect, ResultPoint};

const SCANNER_ALPHA: [u8; 8] = [0, 64, 128, 192, 255, 192, 128, 64];
const OPAQUE: u8 = 0xFF;

const MASK_COLOR: u32 = 0x6000_0000;
const RESULT_COLOR: u32 = 0xB000_0000;

const BRACKET_THICKNESS: i32 = 4;
const LASER_INSET: i32 = 8;
const CURRENT_POINT_RADIUS: f32 = 6.0;
const LAST_POINT_RADIUS: f32 = 3.0;

/// A redraw the renderer asked for at the end of a live draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduledRedraw {
    pub due: Instant,
    /// Only the framing rect changes between live frames; a scheduled draw repaints just this.
    pub region: Rect,
}

pub struct Viewfinder {
    accent: u32,
    animation_delay: Duration,
    result_image: Option<FrameBuffer>,
    scanner_alpha: usize,
    scan_position: i32,
    possible_points: Vec<ResultPoint>,
    last_possible_points: Vec<ResultPoint>,
    attached: bool,
    invalidated: bool,
    scheduled: Option<ScheduledRedraw>,
}

impl Viewfinder {
    /// `accent` colours the brackets, scan line and dots (0x00RRGGBB).
    pub fn new(accent: u32, animation_delay: Duration) -> Self {
        Self {
            accent: accent & 0x00FF_FFFF,
            animation_delay,
            result_image: None,
            scanner_alpha: 0,
            scan_position: 0,
            possible_points: Vec::with_capacity(5),
            last_possible_points: Vec::new(),
            attached: true,
            invalidated: true,
            scheduled: None,
        }
    }

    /// Go back to live scanning: drop the result image and redraw now.
    pub fn draw_viewfinder(&mut self) {
        self.result_image = None;
        self.invalidate();
    }

    /// Freeze on a decoded snapshot and redraw now.
    pub fn draw_result_image(&mut self, image: FrameBuffer) {
        self.result_image = Some(image);
        self.invalidate();
    }

    /// Queue a candidate point for the next live draw.
    pub fn add_possible_result_point(&mut self, point: ResultPoint) {
        self.possible_points.push(point);
    }

    /// Ask for one immediate redraw (e.g. once the framing rect becomes available).
    pub fn invalidate(&mut self) {
        self.invalidated = true;
    }

    /// The view left the display pipeline: forget any pending redraw and stop scheduling.
    pub fn detach(&mut self) {
        self.attached = false;
        self.invalidated = false;
        self.scheduled = None;
    }

    pub fn attach(&mut self) {
        self.attached = true;
        self.invalidated = true;
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn is_frozen(&self) -> bool {
        self.result_image.is_some()
    }

    pub fn result_image(&self) -> Option<&FrameBuffer> {
        self.result_image.as_ref()
    }

    pub fn scheduled(&self) -> Option<ScheduledRedraw> {
        self.scheduled
    }

    pub fn scan_position(&self) -> i32 {
        self.scan_position
    }

    pub fn scanner_alpha(&self) -> usize {
        self.scanner_alpha
    }

    pub fn possible_points(&self) -> &[ResultPoint] {
        &self.possible_points
    }

    pub fn last_possible_points(&self) -> &[ResultPoint] {
        &self.last_possible_points
    }

    pub fn needs_redraw(&self, now: Instant) -> bool {
        self.attached && (self.invalidated || self.scheduled.is_some_and(|s| s.due <= now))
    }

    /// Repaint `layer` for the given framing rect.
    /// With no framing rect nothing is painted and nothing is scheduled.
    /// A draw that only answers the schedule repaints the scheduled region and leaves the
    /// rest of `layer` as the previous draw left it.
    pub fn draw(&mut self, layer: &mut FrameBuffer, frame: Option<Rect>, now: Instant) {
        let invalidated = mem::take(&mut self.invalidated);
        let previous = self.scheduled.take();

        let Some(frame) = frame else {
            return;
        };
        if frame.is_empty() {
            return;
        }
        let width = layer.width as i32;
        let height = layer.height as i32;

        let region_only =
            !invalidated && self.result_image.is_none() && previous.is_some_and(|s| s.region == frame);
        if region_only {
            clear_rect(layer, frame);
            self.draw_live(layer, frame, frame, width / 16);
            self.schedule(frame, now);
            return;
        }

        layer.clear(0);

        // Exterior (outside the framing rect) darkened
        let mask = if self.result_image.is_some() { RESULT_COLOR } else { MASK_COLOR };
        fill_rect(layer, 0, 0, width, frame.top, mask);
        fill_rect(layer, 0, frame.top, frame.left, frame.bottom, mask);
        fill_rect(layer, frame.right, frame.top, width, frame.bottom, mask);
        fill_rect(layer, 0, frame.bottom, width, height, mask);

        if let Some(image) = &self.result_image {
            blit_opaque(layer, image, frame.left, frame.top);
            return;
        }

        let whole = Rect::new(0, 0, width, height);
        self.draw_live(layer, frame, whole, width / 16);
        self.schedule(frame, now);
    }

    /// Brackets, scan line and points; nothing outside `clip` is touched.
    fn draw_live(&mut self, layer: &mut FrameBuffer, frame: Rect, clip: Rect, bracket: i32) {
        self.draw_brackets(layer, frame, bracket, clip);
        self.draw_scan_line(layer, frame);
        self.draw_points(layer, frame);
    }

    fn schedule(&mut self, frame: Rect, now: Instant) {
        if self.attached {
            self.scheduled = Some(ScheduledRedraw { due: now + self.animation_delay, region: frame });
        }
    }

    fn draw_brackets(&self, layer: &mut FrameBuffer, f: Rect, size: i32, clip: Rect) {
        let t = BRACKET_THICKNESS;
        let c = with_alpha(self.accent, OPAQUE);
        let mut bar = |l: i32, top: i32, r: i32, b: i32| {
            fill_rect(layer, l.max(clip.left), top.max(clip.top), r.min(clip.right), b.min(clip.bottom), c);
        };
        // top-left
        bar(f.left - t, f.top - t, f.left, f.top + size);
        bar(f.left, f.top - t, f.left + size, f.top);
        // bottom-left
        bar(f.left - t, f.bottom - size, f.left, f.bottom + t);
        bar(f.left, f.bottom, f.left + size, f.bottom + t);
        // top-right
        bar(f.right, f.top - t, f.right + t, f.top + size);
        bar(f.right - size, f.top - t, f.right, f.top);
        // bottom-right
        bar(f.right, f.bottom - size, f.right + t, f.bottom + t);
        bar(f.right - size, f.bottom, f.right, f.bottom + t);
    }

    /// Pulsing sweep: opacity walks the 8-step cycle while the line steps down the frame.
    fn draw_scan_line(&mut self, layer: &mut FrameBuffer, f: Rect) {
        let color = with_alpha(self.accent, SCANNER_ALPHA[self.scanner_alpha]);
        self.scanner_alpha = (self.scanner_alpha + 1) % SCANNER_ALPHA.len();
        self.scan_position = (self.scan_position + f.height() / 50) % f.height();
        let y = f.top + self.scan_position;
        fill_rect(layer, f.left + LASER_INSET, y - 1, f.right - LASER_INSET, y + 1, color);
    }

    /// Current points at full size, last cycle's points smaller and half transparent,
    /// then current becomes last. Dots are clipped to the frame.
    fn draw_points(&mut self, layer: &mut FrameBuffer, f: Rect) {
        let current = with_alpha(self.accent, OPAQUE);
        for p in &self.possible_points {
            fill_circle(layer, f, f.left as f32 + p.x, f.top as f32 + p.y, CURRENT_POINT_RADIUS, current);
        }
        let faded = with_alpha(self.accent, OPAQUE / 2);
        for p in &self.last_possible_points {
            fill_circle(layer, f, f.left as f32 + p.x, f.top as f32 + p.y, LAST_POINT_RADIUS, faded);
        }
        let drawn = mem::take(&mut self.possible_points);
        self.last_possible_points = drawn;
    }
}
