use crate::{ItemId, ListEntity, PatchError};
use serde::{Deserialize, Serialize};
use timerange::TimeRange;

/// Span given to freshly added items until the user edits it.
pub const DEFAULT_SPAN_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoiceId(pub String);

impl VoiceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Scene,
    Dialogue,
    Sound,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scene => "scene",
            Self::Dialogue => "dialogue",
            Self::Sound => "sound",
        }
    }
}

/// Script line, dialogue line or sound cue of a scene
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: ItemId,
    pub kind: ContentKind,
    pub order_index: usize,
    pub body: String,
    pub speaker_ref: Option<VoiceId>,
    pub start_ms: u64,
    pub end_ms: u64,
}

impl ContentItem {
    /// Blank entry ready for `insert_provisional`
    pub fn draft(kind: ContentKind) -> Self {
        Self {
            id: ItemId::Provisional(0),
            kind,
            order_index: 0,
            body: String::new(),
            speaker_ref: None,
            start_ms: 0,
            end_ms: DEFAULT_SPAN_MS,
        }
    }

    pub fn time_range(&self) -> TimeRange {
        TimeRange::from_millis(self.start_ms, self.end_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentPatch {
    pub body: Option<String>,
    pub speaker_ref: Option<Option<VoiceId>>,
    pub time_range: Option<TimeRange>,
}

impl ContentPatch {
    pub fn body(body: impl Into<String>) -> Self {
        Self {
            body: Some(body.into()),
            ..Self::default()
        }
    }

    pub fn with_speaker(mut self, speaker: Option<VoiceId>) -> Self {
        self.speaker_ref = Some(speaker);
        self
    }

    pub fn with_range(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }
}

impl ListEntity for ContentItem {
    type Patch = ContentPatch;

    fn id(&self) -> ItemId {
        self.id
    }

    fn set_id(&mut self, id: ItemId) {
        self.id = id;
    }

    fn order_index(&self) -> usize {
        self.order_index
    }

    fn set_order_index(&mut self, index: usize) {
        self.order_index = index;
    }

    fn apply_patch(&mut self, patch: &ContentPatch) -> Result<(), PatchError> {
        if let Some(range) = patch.time_range {
            range.validate()?;
            self.start_ms = range.start_ms();
            self.end_ms = range.end_ms();
        }
        if let Some(body) = &patch.body {
            self.body = body.clone();
        }
        if let Some(speaker) = &patch.speaker_ref {
            self.speaker_ref = speaker.clone();
        }
        Ok(())
    }
}

/// One storyboard shot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryboardItem {
    pub id: ItemId,
    pub order_index: usize,
    pub source_file_ref: Option<String>,
    pub start_ms: u64,
    pub end_ms: u64,
    pub prompt_text: String,
}

impl StoryboardItem {
    pub fn draft() -> Self {
        Self {
            id: ItemId::Provisional(0),
            order_index: 0,
            source_file_ref: None,
            start_ms: 0,
            end_ms: DEFAULT_SPAN_MS,
            prompt_text: String::new(),
        }
    }

    /// 1-based position the server calls `storyboardOrder`
    pub fn storyboard_order(&self) -> usize {
        self.order_index + 1
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoryboardPatch {
    pub prompt_text: Option<String>,
    pub source_file_ref: Option<Option<String>>,
    pub time_range: Option<TimeRange>,
}

impl StoryboardPatch {
    pub fn prompt(text: impl Into<String>) -> Self {
        Self {
            prompt_text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn with_range(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }
}

impl ListEntity for StoryboardItem {
    type Patch = StoryboardPatch;

    fn id(&self) -> ItemId {
        self.id
    }

    fn set_id(&mut self, id: ItemId) {
        self.id = id;
    }

    fn order_index(&self) -> usize {
        self.order_index
    }

    fn set_order_index(&mut self, index: usize) {
        self.order_index = index;
    }

    fn apply_patch(&mut self, patch: &StoryboardPatch) -> Result<(), PatchError> {
        if matches!(&patch.prompt_text, Some(prompt) if prompt.trim().is_empty()) {
            return Err(PatchError::Field("storyboard prompt cannot be blank".into()));
        }
        if let Some(range) = patch.time_range {
            range.validate()?;
            self.start_ms = range.start_ms();
            self.end_ms = range.end_ms();
        }
        if let Some(prompt) = &patch.prompt_text {
            self.prompt_text = prompt.clone();
        }
        if let Some(source) = &patch.source_file_ref {
            self.source_file_ref = source.clone();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timerange::TimePoint;

    #[test]
    fn test_content_patch_applies_fields() {
        let mut item = ContentItem::draft(ContentKind::Dialogue);
        let patch = ContentPatch::body("hello")
            .with_speaker(Some(VoiceId::new("v-1")))
            .with_range(TimeRange::new(TimePoint::new(0, 2), TimePoint::new(0, 4)));
        item.apply_patch(&patch).unwrap();
        assert_eq!(item.body, "hello");
        assert_eq!(item.speaker_ref, Some(VoiceId::new("v-1")));
        assert_eq!((item.start_ms, item.end_ms), (2_000, 4_000));
    }

    #[test]
    fn test_invalid_range_leaves_item_untouched() {
        let mut item = ContentItem::draft(ContentKind::Scene);
        let before = item.clone();
        let patch = ContentPatch::body("ignored")
            .with_range(TimeRange::new(TimePoint::new(0, 9), TimePoint::new(0, 3)));
        let err = item.apply_patch(&patch).unwrap_err();
        assert!(matches!(err, PatchError::Range(_)));
        assert_eq!(item, before);
    }

    #[test]
    fn test_storyboard_blank_prompt_rejected() {
        let mut item = StoryboardItem::draft();
        assert!(item.apply_patch(&StoryboardPatch::prompt("  ")).is_err());
        item.apply_patch(&StoryboardPatch::prompt("wide shot")).unwrap();
        assert_eq!(item.prompt_text, "wide shot");
        assert_eq!(item.storyboard_order(), 1);
    }
}
