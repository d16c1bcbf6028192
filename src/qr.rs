// QR decoder for the decode worker, built on rqrr.
// Visual: located-but-unreadable codes show up as dots in the viewfinder; a readable one
// freezes the viewfinder on its snapshot.

use log::{debug, warn};

use crate::decode::{BarcodeFormat, DecodeHints, DecodeOutcome, Decoded, FrameDecoder};
use crate::types::{FrameBuffer, Rect, ResultPoint};

#[derive(Default)]
pub struct QrDecoder;

impl QrDecoder {
    pub fn new() -> Self {
        Self
    }
}

/// Rec. 601 luma of a 0x00RRGGBB pixel.
#[inline]
fn luma(p: u32) -> u8 {
    let r = (p >> 16) & 0xFF;
    let g = (p >> 8) & 0xFF;
    let b = p & 0xFF;
    ((r * 299 + g * 587 + b * 114) / 1000) as u8
}

/// Turn raw QR payload bytes into text using the requested character set.
pub fn bytes_to_text(raw: &[u8], charset: Option<&str>) -> String {
    match charset.map(|c| c.trim().to_ascii_uppercase()) {
        Some(c) if c == "ISO-8859-1" || c == "LATIN1" || c == "ISO8859_1" => {
            raw.iter().map(|&b| b as char).collect()
        }
        Some(c) if c != "UTF-8" && c != "UTF8" => {
            warn!("charset {c} not supported, reading payload as UTF-8");
            String::from_utf8_lossy(raw).into_owned()
        }
        _ => String::from_utf8_lossy(raw).into_owned(),
    }
}

impl FrameDecoder for QrDecoder {
    fn decode(&mut self, frame: &FrameBuffer, region: Rect, hints: &DecodeHints) -> DecodeOutcome {
        if !hints.allows(BarcodeFormat::QrCode) {
            return DecodeOutcome::Nothing;
        }
        let Some(region) = region.clip(frame.width as i32, frame.height as i32) else {
            return DecodeOutcome::Nothing;
        };
        let (left, top) = (region.left as usize, region.top as usize);
        let (w, h) = (region.width() as usize, region.height() as usize);

        let mut img = rqrr::PreparedImage::prepare_from_greyscale(w, h, |x, y| {
            luma(frame.pixels[(top + y) * frame.width + left + x])
        });

        let mut candidates = Vec::new();
        for grid in img.detect_grids() {
            let points: Vec<ResultPoint> = grid
                .bounds
                .iter()
                .map(|p| ResultPoint::new(p.x as f32, p.y as f32))
                .collect();

            let mut raw = Vec::new();
            match grid.decode_to(&mut raw) {
                Ok(meta) => {
                    debug!("QR version {:?}, ecc level {}", meta.version, meta.ecc_level);
                    let Some(snapshot) = frame.crop(region) else {
                        continue;
                    };
                    return DecodeOutcome::Found(Decoded {
                        text: bytes_to_text(&raw, hints.charset.as_deref()),
                        format: BarcodeFormat::QrCode,
                        points,
                        snapshot,
                    });
                }
                Err(e) => {
                    debug!("QR grid located but not decoded: {e:?}");
                    candidates.extend(points);
                }
            }
        }

        if candidates.is_empty() {
            DecodeOutcome::Nothing
        } else {
            DecodeOutcome::Candidates(candidates)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charset_handling() {
        assert_eq!(bytes_to_text(b"caf\xc3\xa9", None), "café");
        assert_eq!(bytes_to_text(b"caf\xe9", Some("ISO-8859-1")), "café");
        assert_eq!(bytes_to_text(b"abc", Some("Shift_JIS")), "abc");
    }

    #[test]
    fn blank_frame_has_nothing() {
        let frame = FrameBuffer::new(64, 64, 0x00FF_FFFF);
        let out = QrDecoder::new().decode(&frame, Rect::new(0, 0, 64, 64), &DecodeHints::default());
        assert!(matches!(out, DecodeOutcome::Nothing));
    }

    #[test]
    fn excluded_format_skips_work() {
        let frame = FrameBuffer::new(16, 16, 0);
        let hints = DecodeHints { formats: Some(vec![BarcodeFormat::Ean13]), charset: None };
        let out = QrDecoder::new().decode(&frame, Rect::new(0, 0, 16, 16), &hints);
        assert!(matches!(out, DecodeOutcome::Nothing));
    }

    #[test]
    fn luma_weights() {
        assert_eq!(luma(0x00FF_FFFF), 255);
        assert_eq!(luma(0), 0);
        assert!(luma(0x0000_FF00) > luma(0x00FF_0000));
    }
}
