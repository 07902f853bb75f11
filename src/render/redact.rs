use std::borrow::Cow;

/// Text substituted for every occurrence of a live secret.
pub const REDACTED_PLACEHOLDER: &str = "[REDACTED TOKEN]";

// Used in order when a secret occurs inside the ones before it.
const FALLBACK_PLACEHOLDERS: [&str; 3] = ["[REDACTED]", "[***]", "<redacted>"];

/// Scrubs known live secrets (the host's authentication token) out of outbound text.
#[derive(Debug, Clone, Default)]
pub struct SecretRedactor {
    secrets: Vec<String>,
    placeholder: &'static str,
}

impl SecretRedactor {
    pub fn new(secrets: impl IntoIterator<Item = String>) -> Self {
        let mut secrets: Vec<String> = secrets
            .into_iter()
            .filter(|secret| !secret.is_empty())
            .collect();
        // Longest first, so a secret that contains another is replaced whole.
        secrets.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        secrets.dedup();
        let placeholder = std::iter::once(REDACTED_PLACEHOLDER)
            .chain(FALLBACK_PLACEHOLDERS)
            .find(|candidate| !secrets.iter().any(|secret| candidate.contains(secret.as_str())))
            .unwrap_or("");
        Self {
            secrets,
            placeholder,
        }
    }

    /// Returns `Cow::Borrowed` when no secret occurs in `text`.
    #[must_use]
    pub fn redact<'a>(&self, text: &'a str) -> Cow<'a, str> {
        if !self
            .secrets
            .iter()
            .any(|secret| text.contains(secret.as_str()))
        {
            return Cow::Borrowed(text);
        }

        let mut scrubbed = text.to_owned();
        for secret in &self.secrets {
            if scrubbed.contains(secret.as_str()) {
                scrubbed = scrub(&scrubbed, secret, self.placeholder);
            }
        }
        Cow::Owned(scrubbed)
    }
}

fn scrub(text: &str, secret: &str, placeholder: &str) -> String {
    let mut scrubbed = text.replace(secret, placeholder);
    // A replacement can splice a new occurrence across its boundary; deleting
    // strictly shrinks the text, so this terminates.
    while scrubbed.contains(secret) {
        scrubbed = scrubbed.replace(secret, "");
    }
    scrubbed
}
