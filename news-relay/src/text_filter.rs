use crate::config::{FilterConfig, HashtagAnchor};
use once_cell::sync::Lazy;
use regex::Regex;

static EMPHASIS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[*_~]").expect("valid emphasis pattern"));

// Pictographs plus the joiners, selectors and modifiers that glue multi-codepoint emoji together.
// The optional leading space goes with the emoji so no double space is left behind.
static EMOJI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"[ ]?[\p{Extended_Pictographic}\u{1F1E6}-\u{1F1FF}\u{1F3FB}-\u{1F3FF}\u{200D}\u{20E3}\u{FE0F}\u{E0020}-\u{E007F}]+",
    )
    .expect("valid emoji pattern")
});

/// Newsworthiness check and display-text cleanup driven by a hashtag list.
#[derive(Debug, Clone)]
pub struct TextFilter {
    hashtags: Vec<String>,
    anchor: HashtagAnchor,
}

impl TextFilter {
    pub fn new(hashtags: Vec<String>, anchor: HashtagAnchor) -> Self {
        Self { hashtags, anchor }
    }

    pub fn from_config(config: &FilterConfig) -> Self {
        Self::new(config.hashtags.clone(), config.anchor)
    }

    pub fn hashtags(&self) -> &[String] {
        &self.hashtags
    }

    /// Messages without text pass: they are captionless members of a group whose sibling carries the caption.
    pub fn accepts(&self, text: Option<&str>) -> bool {
        match text {
            None => true,
            Some(text) => {
                let plain = strip_emphasis(text);
                self.hashtags.iter().any(|hashtag| plain.contains(hashtag.as_str()))
            }
        }
    }

    /// Strips emphasis and emoji, then cuts the text right after the anchoring hashtag.
    pub fn clean(&self, text: &str) -> String {
        let plain = strip_emoji(&strip_emphasis(text));
        let cut = match self.anchor {
            HashtagAnchor::Last => self
                .hashtags
                .iter()
                .filter_map(|h| plain.rfind(h.as_str()).map(|pos| (pos, h.len())))
                .max(),
            HashtagAnchor::First => self
                .hashtags
                .iter()
                .filter_map(|h| plain.find(h.as_str()).map(|pos| (pos, h.len())))
                .min_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1))),
        };
        match cut {
            Some((pos, len)) => plain[..pos + len].trim().to_string(),
            None => plain.trim().to_string(),
        }
    }
}

pub fn strip_emphasis(text: &str) -> String {
    EMPHASIS.replace_all(text, "").into_owned()
}

pub fn strip_emoji(text: &str) -> String {
    EMOJI.replace_all(text, "").into_owned()
}
