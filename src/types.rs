// Core types shared by the camera, the decode worker and the viewfinder overlay.

/// A block of pixels, one u32 per pixel, row-major.
/// Camera frames and the screen use 0x00RRGGBB; the overlay layer uses 0xAARRGGBB.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameBuffer {
    pub width: usize,      // how wide the frame is (pixels)
    pub height: usize,     // how tall the frame is (pixels)
    pub pixels: Vec<u32>,  // length = width * height
}

impl FrameBuffer {
    /// A buffer filled with one value (0 = black for RGB, fully transparent for ARGB).
    pub fn new(width: usize, height: usize, fill: u32) -> Self {
        Self { width, height, pixels: vec![fill; width * height] }
    }

    pub fn clear(&mut self, value: u32) {
        self.pixels.fill(value);
    }

    /// Pixel at (x,y), or None when outside the buffer.
    pub fn get(&self, x: i32, y: i32) -> Option<u32> {
        if x < 0 || y < 0 {
            return None;
        }
        let (x, y) = (x as usize, y as usize);
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.pixels[y * self.width + x])
    }

    /// Copy out the pixels under `rect` (clipped to the buffer).
    /// Visual: this becomes the frozen result image shown inside the viewfinder.
    pub fn crop(&self, rect: Rect) -> Option<FrameBuffer> {
        let rect = rect.clip(self.width as i32, self.height as i32)?;
        let (w, h) = (rect.width() as usize, rect.height() as usize);
        let mut pixels = Vec::with_capacity(w * h);
        for y in rect.top..rect.bottom {
            let row = y as usize * self.width;
            pixels.extend_from_slice(&self.pixels[row + rect.left as usize..row + rect.right as usize]);
        }
        Some(FrameBuffer { width: w, height: h, pixels })
    }
}

/// Axis-aligned rectangle in surface pixels; `right`/`bottom` are exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    /// Intersect with a `width` x `height` area anchored at the origin.
    pub fn clip(&self, width: i32, height: i32) -> Option<Rect> {
        let clipped = Rect {
            left: self.left.max(0),
            top: self.top.max(0),
            right: self.right.min(width),
            bottom: self.bottom.min(height),
        };
        (!clipped.is_empty()).then_some(clipped)
    }
}

/// Size of the preview surface the camera renders into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Surface {
    pub width: u32,
    pub height: u32,
}

/// A decode candidate location, relative to the framing rect's top-left corner.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResultPoint {
    pub x: f32,
    pub y: f32,
}

impl ResultPoint {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_clips_to_buffer() {
        let mut fb = FrameBuffer::new(4, 3, 0);
        for (i, p) in fb.pixels.iter_mut().enumerate() {
            *p = i as u32;
        }
        let out = fb.crop(Rect::new(2, 1, 10, 10)).unwrap();
        assert_eq!((out.width, out.height), (2, 2));
        assert_eq!(out.pixels, vec![6, 7, 10, 11]);
    }

    #[test]
    fn crop_outside_is_none() {
        let fb = FrameBuffer::new(4, 3, 0);
        assert!(fb.crop(Rect::new(5, 5, 8, 8)).is_none());
    }
}
