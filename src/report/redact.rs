/// Text shown instead of a redacted value
pub const PLACEHOLDER: &str = "Hidden Value";

/// Marker that makes a setting's value sensitive, compared upper-cased
const SENSITIVE_MARKER: &str = "LICENSE";

/// Whether a setting's value may be shown to operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Redacted,
}

impl Visibility {
    #[must_use]
    pub const fn is_redacted(self) -> bool {
        matches!(self, Self::Redacted)
    }
}

/// Decide the visibility of a setting from its name alone
///
/// License keys (`enterprise.license` and friends) are redacted wherever the
/// word appears in the name. Descriptions are never redacted.
#[must_use]
pub fn classify(name: &str) -> Visibility {
    if name.to_uppercase().contains(SENSITIVE_MARKER) {
        Visibility::Redacted
    } else {
        Visibility::Visible
    }
}
