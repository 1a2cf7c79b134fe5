//! The user-supplied API key.
//!
//! A [`Credential`] lives for one request. It is never written to disk and
//! its `Debug` output is redacted so it cannot leak through `tracing` fields
//! or a `{:?}` of a config struct.

use crate::error::Pdf2SchemaError;
use std::fmt;

/// An opaque, non-empty API key.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Accept a raw key as typed by the user.
    ///
    /// Surrounding whitespace is dropped; an empty result is
    /// [`Pdf2SchemaError::MissingCredential`].
    pub fn new(raw: impl AsRef<str>) -> Result<Self, Pdf2SchemaError> {
        let key = raw.as_ref().trim();
        if key.is_empty() {
            return Err(Pdf2SchemaError::MissingCredential);
        }
        Ok(Self(key.to_string()))
    }

    /// The key itself, for handing to the provider client.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_blank_are_rejected() {
        assert!(matches!(
            Credential::new(""),
            Err(Pdf2SchemaError::MissingCredential)
        ));
        assert!(matches!(
            Credential::new("   \n"),
            Err(Pdf2SchemaError::MissingCredential)
        ));
    }

    #[test]
    fn key_is_trimmed() {
        let c = Credential::new("  sk-test \n").unwrap();
        assert_eq!(c.expose(), "sk-test");
    }

    #[test]
    fn debug_is_redacted() {
        let c = Credential::new("sk-secret").unwrap();
        let shown = format!("{c:?}");
        assert!(!shown.contains("sk-secret"));
        assert_eq!(shown, "Credential(***)");
    }
}
