// Terminal action for a decoded payload: open it as a URI with whatever the host has
// registered for its scheme.

use log::{debug, info};

use crate::error::{Error, Result};

/// Something the host can do with a payload.
pub trait Action {
    fn invoke(self: Box<Self>) -> Result<()>;
}

pub trait ActionResolver {
    /// None when the payload isn't something the host can handle.
    fn resolve(&self, payload: &str) -> Option<Box<dyn Action>>;
}

/// The URI scheme of `text` per RFC 3986 (`ALPHA *( ALPHA / DIGIT / "+" / "-" / "." ) ":"`),
/// lowercased. None for plain text.
pub fn uri_scheme(text: &str) -> Option<String> {
    let (scheme, rest) = text.split_once(':')?;
    let mut chars = scheme.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) {
        return None;
    }
    if rest.is_empty() {
        return None;
    }
    Some(scheme.to_ascii_lowercase())
}

/// Resolves payloads whose scheme is in the allowed list and opens them with the OS handler.
pub struct SystemOpener {
    schemes: Vec<String>,
}

impl SystemOpener {
    pub fn new(schemes: impl IntoIterator<Item = String>) -> Self {
        Self { schemes: schemes.into_iter().map(|s| s.to_ascii_lowercase()).collect() }
    }
}

impl ActionResolver for SystemOpener {
    fn resolve(&self, payload: &str) -> Option<Box<dyn Action>> {
        let uri = payload.trim();
        let scheme = uri_scheme(uri)?;
        if !self.schemes.contains(&scheme) {
            debug!("no handler registered for scheme '{scheme}'");
            return None;
        }
        Some(Box::new(OpenUri { uri: uri.to_string() }))
    }
}

struct OpenUri {
    uri: String,
}

impl Action for OpenUri {
    fn invoke(self: Box<Self>) -> Result<()> {
        info!("opening {}", self.uri);
        open::that(&self.uri).map_err(|e| Error::UnresolvableResult(format!("{}: {e}", self.uri)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schemes_are_parsed() {
        assert_eq!(uri_scheme("https://example.com").as_deref(), Some("https"));
        assert_eq!(uri_scheme("MAILTO:a@b.c").as_deref(), Some("mailto"));
        assert_eq!(uri_scheme("web+app:x").as_deref(), Some("web+app"));
        assert_eq!(uri_scheme("hello world"), None);
        assert_eq!(uri_scheme("1abc:def"), None);
        assert_eq!(uri_scheme("note: buy milk").as_deref(), Some("note"));
        assert_eq!(uri_scheme("two words:x"), None);
        assert_eq!(uri_scheme("https:"), None);
    }

    #[test]
    fn resolver_only_accepts_allowed_schemes() {
        let opener = SystemOpener::new(["http".to_string(), "https".to_string()]);
        assert!(opener.resolve("  https://example.com ").is_some());
        assert!(opener.resolve("ftp://example.com").is_none());
        assert!(opener.resolve("just some text").is_none());
    }
}
