// Window + software drawing utilities.
// Visual effects provided here:
// 1) A window that is the scanner's preview surface.
// 2) Alpha-blended rectangles, discs and images on the transparent overlay layer.
// 3) Compositing that layer over the camera picture.
// 4) A small 8x8 bitmap font for the notice box.

use crate::error::Error;
use crate::types::{FrameBuffer, Rect};
use font8x8::{BASIC_FONTS, UnicodeFonts};
use minifb::{Key, KeyRepeat, Window, WindowOptions};

pub struct Drawer {
    window: Window, // the on-screen window you see
}

impl Drawer {
    /// Create a window sized to the preview surface.
    /// Visual: a new empty window appears with your chosen title.
    pub fn new(title: &str, width: usize, height: usize) -> Result<Self, Error> {
        let mut window = Window::new(title, width, height, WindowOptions::default())
            .map_err(|e| Error::WindowInit(e.to_string()))?;
        window.set_target_fps(60);
        Ok(Self { window })
    }

    /// Push the pixels for this frame to the screen.
    pub fn present(&mut self, framebuffer: &FrameBuffer) -> Result<(), Error> {
        self.window
            .update_with_buffer(&framebuffer.pixels, framebuffer.width, framebuffer.height)
            .map_err(|e| Error::WindowUpdate(e.to_string()))?;
        Ok(())
    }

    /// Returns false when the user closes the window (so we can stop the loop).
    pub fn is_open(&self) -> bool {
        self.window.is_open()
    }

    /// Whether the window has focus; losing it pauses the scan.
    pub fn is_active(&mut self) -> bool {
        self.window.is_active()
    }

    pub fn esc_pressed(&self) -> bool {
        self.window.is_key_down(Key::Escape)
    }

    /// Acknowledges the notice box.
    pub fn enter_pressed_once(&self) -> bool {
        self.window.is_key_pressed(Key::Enter, KeyRepeat::No)
    }
}

/* ---------- Pixel blending ---------- */

#[inline]
fn alpha(c: u32) -> u32 {
    c >> 24
}

/// Source-over of two 0xAARRGGBB colours (not premultiplied).
#[inline]
pub fn blend_over(dst: u32, src: u32) -> u32 {
    let sa = alpha(src);
    if sa == 0 {
        return dst;
    }
    if sa == 0xFF {
        return src;
    }
    let da = alpha(dst);
    let da_part = da * (255 - sa) / 255;
    let out_a = sa + da_part;
    if out_a == 0 {
        return 0;
    }
    let channel = |shift: u32| {
        let s = (src >> shift) & 0xFF;
        let d = (dst >> shift) & 0xFF;
        ((s * sa + d * da_part) / out_a).min(255)
    };
    (out_a << 24) | (channel(16) << 16) | (channel(8) << 8) | channel(0)
}

/// Replace the alpha byte of an 0x??RRGGBB colour.
#[inline]
pub fn with_alpha(color: u32, a: u8) -> u32 {
    ((a as u32) << 24) | (color & 0x00FF_FFFF)
}

/// Blend one ARGB pixel onto the layer if (x,y) is inside bounds.
#[inline]
fn blend_pixel(layer: &mut FrameBuffer, x: i32, y: i32, color: u32) {
    if x < 0 || y < 0 {
        return;
    }
    let (x, y) = (x as usize, y as usize);
    if x >= layer.width || y >= layer.height {
        return;
    }
    let idx = y * layer.width + x;
    layer.pixels[idx] = blend_over(layer.pixels[idx], color);
}

/// Put a pixel on the framebuffer if (x,y) is inside bounds.
#[inline]
fn put_pixel(fb: &mut FrameBuffer, x: i32, y: i32, color: u32) {
    if x < 0 || y < 0 {
        return;
    }
    let (x, y) = (x as usize, y as usize);
    if x >= fb.width || y >= fb.height {
        return;
    }
    let idx = y * fb.width + x;
    fb.pixels[idx] = color;
}

/* ---------- Shapes on the overlay layer ---------- */

/// Fill [left,right) x [top,bottom) with an ARGB colour, clipped to the layer.
/// Visual: mask bands, corner brackets and the scan line are all made of these.
pub fn fill_rect(layer: &mut FrameBuffer, left: i32, top: i32, right: i32, bottom: i32, color: u32) {
    let (l, t) = (left.max(0), top.max(0));
    let (r, b) = (right.min(layer.width as i32), bottom.min(layer.height as i32));
    for y in t..b {
        for x in l..r {
            blend_pixel(layer, x, y, color);
        }
    }
}

/// Make every pixel under `rect` fully transparent again.
pub fn clear_rect(layer: &mut FrameBuffer, rect: Rect) {
    let Some(r) = rect.clip(layer.width as i32, layer.height as i32) else {
        return;
    };
    for y in r.top..r.bottom {
        let row = y as usize * layer.width;
        layer.pixels[row + r.left as usize..row + r.right as usize].fill(0);
    }
}

/// Filled disc centered at (cx,cy); nothing outside `clip` is touched.
/// Visual: a candidate point dot.
pub fn fill_circle(layer: &mut FrameBuffer, clip: Rect, cx: f32, cy: f32, radius: f32, color: u32) {
    if radius <= 0.0 {
        return;
    }
    let r2 = radius * radius;
    let (x0, x1) = ((cx - radius).floor() as i32, (cx + radius).ceil() as i32);
    let (y0, y1) = ((cy - radius).floor() as i32, (cy + radius).ceil() as i32);
    for y in y0..=y1 {
        for x in x0..=x1 {
            let dx = x as f32 + 0.5 - cx;
            let dy = y as f32 + 0.5 - cy;
            let inside = x >= clip.left && x < clip.right && y >= clip.top && y < clip.bottom;
            if inside && dx * dx + dy * dy <= r2 {
                blend_pixel(layer, x, y, color);
            }
        }
    }
}

/// Copy an RGB image onto the layer, fully opaque, with its top-left at (x,y).
/// Visual: the frozen barcode snapshot.
pub fn blit_opaque(layer: &mut FrameBuffer, img: &FrameBuffer, x: i32, y: i32) {
    for iy in 0..img.height {
        for ix in 0..img.width {
            let rgb = img.pixels[iy * img.width + ix];
            put_pixel(layer, x + ix as i32, y + iy as i32, 0xFF00_0000 | (rgb & 0x00FF_FFFF));
        }
    }
}

/// Blend the ARGB overlay layer onto the RGB screen.
/// Visual: the camera picture shows through wherever the layer is transparent.
pub fn composite(screen: &mut FrameBuffer, layer: &FrameBuffer) {
    if screen.width != layer.width || screen.height != layer.height {
        return;
    }
    for (dst, &src) in screen.pixels.iter_mut().zip(layer.pixels.iter()) {
        let a = alpha(src);
        if a == 0 {
            continue;
        }
        let mix = |shift: u32| {
            let s = (src >> shift) & 0xFF;
            let d = (*dst >> shift) & 0xFF;
            (s * a + d * (255 - a) + 127) / 255
        };
        *dst = (mix(16) << 16) | (mix(8) << 8) | mix(0);
    }
}

/* ---------- 8x8 bitmap text ---------- */

/// Draw one glyph at (x,y), with a 1-pixel black shadow for contrast.
fn draw_char(fb: &mut FrameBuffer, x: i32, y: i32, ch: char, color: u32) {
    let Some(rows) = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?')) else {
        return;
    };
    for (pass_offset, pass_color) in [(1, 0x0000_0000), (0, color)] {
        for (ry, rowbits) in rows.iter().enumerate() {
            for rx in 0..8 {
                // font8x8 stores the leftmost pixel in bit 0
                if (rowbits >> rx) & 1 != 0 {
                    put_pixel(fb, x + rx + pass_offset, y + ry as i32 + pass_offset, pass_color);
                }
            }
        }
    }
}

/// Draw a string; each glyph is 8 pixels wide with 1 pixel of spacing.
pub fn draw_text(fb: &mut FrameBuffer, mut x: i32, y: i32, text: &str, color: u32) {
    for ch in text.chars() {
        draw_char(fb, x, y, ch, color);
        x += 9;
    }
}

/// A dark box across the lower part of the screen with a message and a hint line.
/// Visual: the scanner's equivalent of an alert dialog.
pub fn draw_notice(fb: &mut FrameBuffer, message: &str, hint: &str) {
    let h = fb.height as i32;
    let w = fb.width as i32;
    let top = h - 48;
    for y in top.max(0)..h {
        for x in 0..w {
            put_pixel(fb, x, y, 0x0020_2020);
        }
    }
    draw_text(fb, 12, top + 10, message, 0x00FF_FFFF);
    draw_text(fb, 12, top + 28, hint, 0x00B0_B0B0);
}
