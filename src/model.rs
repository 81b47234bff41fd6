use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

/// One unit of commentary, activated once playback reaches its line threshold.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BreakdownSegment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markdown: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Vec<String>>,
    #[serde(
        default,
        rename = "mBelow",
        skip_serializing_if = "Option::is_none"
    )]
    pub m_below: Option<bool>,
}

impl BreakdownSegment {
    pub fn is_empty(&self) -> bool {
        self.color.is_none()
            && self.markdown.is_none()
            && self.image.is_none()
            && self.m_below.is_none()
    }

    pub fn markdown_first(&self) -> bool {
        self.m_below.unwrap_or(false)
    }

    pub fn markdown_blocks(&self) -> &[String] {
        self.markdown.as_deref().unwrap_or_default()
    }

    pub fn image_names(&self) -> &[String] {
        self.image.as_deref().unwrap_or_default()
    }
}

/// Sparse line-threshold -> segment mapping. Key `0` is always present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakdownMap {
    segments: BTreeMap<u32, BreakdownSegment>,
}

impl BreakdownMap {
    /// Callers must have checked that `segments` holds key 0.
    pub(crate) fn from_validated(segments: BTreeMap<u32, BreakdownSegment>) -> Self {
        debug_assert!(segments.contains_key(&0));
        Self { segments }
    }

    pub fn get(&self, key: u32) -> Option<&BreakdownSegment> {
        self.segments.get(&key)
    }

    pub fn contains(&self, key: u32) -> bool {
        self.segments.contains_key(&key)
    }

    pub fn keys(&self) -> impl Iterator<Item = u32> + '_ {
        self.segments.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Greatest key not above `line`, if any.
    pub fn floor_key(&self, line: i64) -> Option<u32> {
        if line < 0 {
            return None;
        }
        let bound = u32::try_from(line).unwrap_or(u32::MAX);
        self.segments.range(..=bound).next_back().map(|(key, _)| *key)
    }

    /// True for the placeholder map the session starts with: a single empty entry.
    pub fn is_default_placeholder(&self) -> bool {
        self.segments.len() == 1 && self.segments.get(&0).is_none_or(BreakdownSegment::is_empty)
    }

    pub fn image_references(&self) -> impl Iterator<Item = &str> + '_ {
        self.segments
            .values()
            .flat_map(|segment| segment.image_names().iter().map(String::as_str))
    }
}

impl Default for BreakdownMap {
    fn default() -> Self {
        let mut segments = BTreeMap::new();
        segments.insert(0, BreakdownSegment::default());
        Self { segments }
    }
}

/// Logical image name -> public URL, filled in as uploads complete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSourceMap {
    sources: BTreeMap<String, String>,
}

impl ImageSourceMap {
    /// Guarded insert: the first URL recorded for a name is kept. Returns false
    /// when a different URL was already present.
    pub fn insert_resolved(&mut self, name: &str, url: &str) -> bool {
        match self.sources.entry(name.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(url.to_string());
                true
            }
            Entry::Occupied(existing) => existing.get() == url,
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.sources.get(name).map(String::as_str)
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.sources.remove(name)
    }

    pub fn clear(&mut self) {
        self.sources.clear();
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.sources
            .iter()
            .map(|(name, url)| (name.as_str(), url.as_str()))
    }
}

/// Output of a successful audio+lyrics submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioSources {
    pub title: String,
    pub audio_url: String,
    pub lyrics: String,
}

impl AudioSources {
    pub fn is_loaded(&self) -> bool {
        !self.title.is_empty() && !self.audio_url.is_empty() && !self.lyrics.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pane {
    Intro,
    Content,
    End,
}

impl Pane {
    pub fn label(self) -> &'static str {
        match self {
            Self::Intro => "Upload",
            Self::Content => "Breakdown",
            Self::End => "End",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slide {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlideDirection {
    #[default]
    None,
    ToLeft,
    ToRight,
}

impl From<Slide> for SlideDirection {
    fn from(slide: Slide) -> Self {
        match slide {
            Slide::Left => Self::ToLeft,
            Slide::Right => Self::ToRight,
        }
    }
}
