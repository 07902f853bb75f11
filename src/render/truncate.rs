/// Largest message the chat transport accepts, in characters.
pub const DEFAULT_MESSAGE_BUDGET: usize = 2000;

const FENCE_MARKER: &str = "```";

/// Code fence wrapped around an outbound block, optionally tagged with a language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fence {
    lang: &'static str,
}

impl Fence {
    pub const PLAIN: Self = Self { lang: "" };
    pub const PYTHON: Self = Self { lang: "python" };
    pub const BASH: Self = Self { lang: "bash" };

    /// Opening marker without the trailing newline.
    pub fn opening(&self) -> String {
        format!("{FENCE_MARKER}{}", self.lang)
    }

    pub fn closing(&self) -> &'static str {
        FENCE_MARKER
    }

    /// Characters [`Fence::wrap`] adds around a body.
    pub fn overhead(&self) -> usize {
        FENCE_MARKER.len() + self.lang.chars().count() + 1 + FENCE_MARKER.len()
    }

    pub fn wrap(&self, body: &str) -> String {
        format!("{}\n{body}{}", self.opening(), self.closing())
    }
}

/// Returns the last `max_chars` characters of `text`, or all of it when it already fits.
pub fn keep_tail(text: &str, max_chars: usize) -> &str {
    let total = text.chars().count();
    if total <= max_chars {
        return text;
    }

    text.char_indices()
        .nth(total - max_chars)
        .map_or("", |(idx, _)| &text[idx..])
}

/// Wraps `text` in `fence`, dropping leading characters so the whole message
/// stays within `budget`.
pub fn fit_to_budget(text: &str, fence: Fence, budget: usize) -> String {
    let room = budget.saturating_sub(fence.overhead());
    fence.wrap(keep_tail(text, room))
}
