// Runtime knobs for the scanner screen.
// Every field can be overridden with a QR_CAPTURE_* variable.

use std::str::FromStr;
use std::time::Duration;

use log::warn;

use crate::decode::{BarcodeFormat, DecodeHints};

/// What the session does when the idle watchdog fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdlePolicy {
    /// End the screen.
    Finish,
    /// Log and keep scanning.
    Ignore,
}

impl FromStr for IdlePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "finish" | "exit" => Ok(IdlePolicy::Finish),
            "ignore" | "keep" => Ok(IdlePolicy::Ignore),
            other => Err(format!("unknown idle policy '{other}'")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ScanConfig {
    pub camera_index: u32,
    pub surface_width: u32,
    pub surface_height: u32,
    /// Delay between live viewfinder redraws.
    pub animation_delay: Duration,
    pub idle_timeout: Duration,
    pub idle_policy: IdlePolicy,
    /// Stands in for the device ringer mode: muted means no beep.
    pub muted: bool,
    pub beep_volume: f32,
    pub vibrate_duration: Duration,
    /// Frame brackets, scan line and candidate points (0x00RRGGBB).
    pub accent: u32,
    /// None = every supported format.
    pub formats: Option<Vec<BarcodeFormat>>,
    pub charset: Option<String>,
    /// URI schemes the host is willing to open.
    pub schemes: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            camera_index: 0,
            surface_width: 640,
            surface_height: 480,
            animation_delay: Duration::from_millis(100),
            idle_timeout: Duration::from_secs(5 * 60),
            idle_policy: IdlePolicy::Finish,
            muted: false,
            beep_volume: 0.10,
            vibrate_duration: Duration::from_millis(200),
            accent: 0x3F_51_B5,
            formats: None,
            charset: None,
            schemes: ["http", "https", "mailto", "tel", "geo", "market"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl ScanConfig {
    /// Defaults, overridden by QR_CAPTURE_* environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` but reads variables through `lookup` (handy for tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(v) = parsed(&lookup, "QR_CAPTURE_CAMERA") { cfg.camera_index = v; }
        if let Some(v) = parsed(&lookup, "QR_CAPTURE_WIDTH") { cfg.surface_width = v; }
        if let Some(v) = parsed(&lookup, "QR_CAPTURE_HEIGHT") { cfg.surface_height = v; }
        if let Some(secs) = parsed::<u64>(&lookup, "QR_CAPTURE_IDLE_SECS") {
            cfg.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(v) = parsed(&lookup, "QR_CAPTURE_IDLE_POLICY") { cfg.idle_policy = v; }
        if let Some(v) = lookup("QR_CAPTURE_MUTE") {
            cfg.muted = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Some(v) = lookup("QR_CAPTURE_ACCENT") {
            match u32::from_str_radix(v.trim().trim_start_matches('#'), 16) {
                Ok(rgb) if rgb <= 0xFF_FF_FF => cfg.accent = rgb,
                _ => warn!("QR_CAPTURE_ACCENT: '{v}' is not an RGB hex colour, keeping default"),
            }
        }
        if let Some(v) = lookup("QR_CAPTURE_FORMATS") {
            let formats: Result<Vec<BarcodeFormat>, _> =
                split_list(&v).map(|s| s.parse::<BarcodeFormat>()).collect();
            match formats {
                Ok(list) if !list.is_empty() => cfg.formats = Some(list),
                Ok(_) => {}
                Err(e) => warn!("QR_CAPTURE_FORMATS: {e}, scanning all formats"),
            }
        }
        if let Some(v) = lookup("QR_CAPTURE_CHARSET") {
            let v = v.trim();
            if !v.is_empty() {
                cfg.charset = Some(v.to_string());
            }
        }
        if let Some(v) = lookup("QR_CAPTURE_SCHEMES") {
            let schemes: Vec<String> = split_list(&v).map(|s| s.to_ascii_lowercase()).collect();
            if !schemes.is_empty() {
                cfg.schemes = schemes;
            }
        }

        cfg
    }

    /// The decode configuration handed to the session on resume.
    pub fn decode_hints(&self) -> DecodeHints {
        DecodeHints {
            formats: self.formats.clone(),
            charset: self.charset.clone(),
        }
    }
}

fn split_list(v: &str) -> impl Iterator<Item = &str> {
    v.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("{key}: cannot parse '{raw}' ({e}), keeping default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn defaults_without_env() {
        let cfg = ScanConfig::from_lookup(|_| None);
        assert_eq!(cfg.animation_delay, Duration::from_millis(100));
        assert_eq!(cfg.idle_policy, IdlePolicy::Finish);
        assert!(cfg.formats.is_none());
        assert!(cfg.schemes.iter().any(|s| s == "https"));
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = ScanConfig::from_lookup(lookup(&[
            ("QR_CAPTURE_IDLE_SECS", "30"),
            ("QR_CAPTURE_IDLE_POLICY", "ignore"),
            ("QR_CAPTURE_MUTE", "true"),
            ("QR_CAPTURE_ACCENT", "#FF0000"),
            ("QR_CAPTURE_FORMATS", "qr_code"),
            ("QR_CAPTURE_CHARSET", "ISO-8859-1"),
            ("QR_CAPTURE_SCHEMES", "HTTPS, otpauth"),
        ]));
        assert_eq!(cfg.idle_timeout, Duration::from_secs(30));
        assert_eq!(cfg.idle_policy, IdlePolicy::Ignore);
        assert!(cfg.muted);
        assert_eq!(cfg.accent, 0xFF0000);
        assert_eq!(cfg.formats, Some(vec![BarcodeFormat::QrCode]));
        assert_eq!(cfg.charset.as_deref(), Some("ISO-8859-1"));
        assert_eq!(cfg.schemes, vec!["https".to_string(), "otpauth".to_string()]);
    }

    #[test]
    fn bad_values_keep_defaults() {
        let cfg = ScanConfig::from_lookup(lookup(&[
            ("QR_CAPTURE_WIDTH", "wide"),
            ("QR_CAPTURE_ACCENT", "nope"),
            ("QR_CAPTURE_FORMATS", "qr_code,hologram"),
        ]));
        assert_eq!(cfg.surface_width, 640);
        assert_eq!(cfg.accent, 0x3F_51_B5);
        assert!(cfg.formats.is_none());
    }
}
