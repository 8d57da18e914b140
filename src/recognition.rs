//! Chapter number recognition.
//!
//! Parsing chapter labels belongs to the provider layer; this module only
//! defines the contract the reconciler calls, plus a small regex-based
//! implementation used by the CLI and tests.

use crate::models::{Manga, RawChapter};
use regex::Regex;
use std::sync::LazyLock;

/// Matches an explicit chapter marker followed by a number ("Ch. 12.5", "Chapter 3").
static CHAPTER_MARKER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\bch(?:apter|\.)?|第)\s*(\d+(?:\.\d+)?)")
        .expect("Invalid CHAPTER_MARKER_REGEX")
});

/// Volume markers are stripped before falling back to the first bare number.
static VOLUME_MARKER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bvol(?:ume|\.)?\s*\d+").expect("Invalid VOLUME_MARKER_REGEX")
});

/// Matches the first bare number in a label.
static BARE_NUMBER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)").expect("Invalid BARE_NUMBER_REGEX"));

/// Annotates fetched chapters with a numeric chapter number.
pub trait ChapterNumberRecognizer: Send + Sync {
    /// Sets `chapter.chapter_number`, or leaves it `None` when unrecognized.
    fn parse(&self, chapter: &mut RawChapter, manga: &Manga);
}

/// Regex recognizer reading the chapter label, then the chapter name.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicRecognizer;

impl BasicRecognizer {
    /// Recognizes a number from a single label.
    fn recognize_label(label: &str, allow_bare: bool) -> Option<f32> {
        if let Some(caps) = CHAPTER_MARKER_REGEX.captures(label) {
            return caps.get(1).and_then(|m| m.as_str().parse().ok());
        }

        if !allow_bare {
            return None;
        }

        let stripped = VOLUME_MARKER_REGEX.replace_all(label, "");
        BARE_NUMBER_REGEX
            .captures(&stripped)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }
}

impl ChapterNumberRecognizer for BasicRecognizer {
    fn parse(&self, chapter: &mut RawChapter, _manga: &Manga) {
        // A number supplied by the provider wins.
        if chapter.chapter_number.is_some() {
            return;
        }

        chapter.chapter_number = Self::recognize_label(&chapter.chapter_txt, true)
            .or_else(|| Self::recognize_label(&chapter.name, false));
    }
}
