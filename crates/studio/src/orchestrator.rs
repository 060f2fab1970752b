use crate::endpoints::{ContentBackend, StoryboardBackend, StudioApi};
use crate::{LoadGuards, LoadKind, Result, StudioConfig, StudioError, VoiceSets, VoiceStatus};
use generation::{
    GenerationKind, GenerationResult, GenerationTask, PollRunner, SceneOption, SharedTask, Timer,
};
use optimistic::{
    CancelOutcome, CommitOutcome, ContentItem, ContentKind, ContentPatch, ItemId, OptimisticList,
    Placement, ReorderMode, StoryboardItem, StoryboardPatch, SyncedList, VoiceId,
};
use parking_lot::{Mutex, RwLock};
use scene_cache::{CacheEntry, SceneContentCache};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use studio_api::{ApiClient, ApiError, NoticeKind, Notifier, RequestPort, UnauthorizedHandler};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tab {
    Script,
    Audio,
    Storyboard,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListCategory {
    Script,
    Audio,
    Storyboard,
}

impl fmt::Display for ListCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Script => write!(f, "script"),
            Self::Audio => write!(f, "audio"),
            Self::Storyboard => write!(f, "storyboard"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub series_id: Option<String>,
    pub scene_id: Option<String>,
}

/// Selection shared with the list backends
pub type SharedSelection = Arc<RwLock<Selection>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// What a loader call ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied,
    /// Same kind of load already outstanding
    Skipped,
    /// Selection moved on before the response arrived
    Stale,
}

/// Everything the orchestrator talks to
#[derive(Clone)]
pub struct StudioPorts {
    pub request: Arc<dyn RequestPort>,
    pub notifier: Arc<dyn Notifier>,
    pub unauthorized: Arc<dyn UnauthorizedHandler>,
    pub timer: Arc<dyn Timer>,
    pub cache: SceneContentCache,
}

type TaskKey = (GenerationKind, String);

struct TaskSlot {
    task: SharedTask,
    cancel: CancellationToken,
}

struct StudioState {
    tab: Tab,
    previous_tab: Option<Tab>,
    prompt: String,
    chat_history: Vec<ChatMessage>,
    voices: VoiceSets,
    scenes: Vec<SceneOption>,
    tasks: HashMap<TaskKey, TaskSlot>,
    polls: CancellationToken,
}

impl Default for StudioState {
    fn default() -> Self {
        Self {
            tab: Tab::Script,
            previous_tab: None,
            prompt: String::new(),
            chat_history: Vec::new(),
            voices: VoiceSets::default(),
            scenes: Vec::new(),
            tasks: HashMap::new(),
            polls: CancellationToken::new(),
        }
    }
}

/// Single owner of the authoring screen's lists, tasks and selection.
///
/// Methods take `&self` and may run concurrently; no lock is held across an
/// await.
pub struct Orchestrator {
    api: StudioApi,
    notifier: Arc<dyn Notifier>,
    unauthorized: Arc<dyn UnauthorizedHandler>,
    cache: SceneContentCache,
    runner: PollRunner,
    selection: SharedSelection,
    state: Arc<Mutex<StudioState>>,
    loads: LoadGuards,
    script: SyncedList<ContentItem>,
    audio: SyncedList<ContentItem>,
    storyboard: SyncedList<StoryboardItem>,
}

const AUDIO_KINDS: [ContentKind; 2] = [ContentKind::Dialogue, ContentKind::Sound];

impl Orchestrator {
    pub fn new(config: &StudioConfig, ports: StudioPorts) -> Self {
        let client = ApiClient::new(ports.request);
        let api = StudioApi::new(client.clone());
        let selection: SharedSelection = Arc::new(RwLock::new(Selection {
            series_id: config.series_id.clone(),
            scene_id: None,
        }));

        let content_backend = Arc::new(ContentBackend::new(api.clone(), selection.clone()));
        let placement = config.new_item_placement;
        let script = SyncedList::new(
            OptimisticList::new(placement, ReorderMode::IdOrder),
            content_backend.clone(),
        );
        let audio = SyncedList::new(
            OptimisticList::new(placement, ReorderMode::IdOrder),
            content_backend,
        );
        let storyboard = SyncedList::new(
            OptimisticList::new(Placement::Tail, ReorderMode::MovedTo),
            Arc::new(StoryboardBackend::new(api.clone(), selection.clone())),
        );

        let runner = PollRunner::new(
            Arc::new(generation::ApiGenerationBackend::new(client)),
            ports.timer,
            config.poll,
        );

        Self {
            api,
            notifier: ports.notifier,
            unauthorized: ports.unauthorized,
            cache: ports.cache,
            runner,
            selection,
            state: Arc::new(Mutex::new(StudioState::default())),
            loads: LoadGuards::new(),
            script,
            audio,
            storyboard,
        }
    }

    // Selection

    pub fn selection(&self) -> Selection {
        self.selection.read().clone()
    }

    pub fn series_id(&self) -> Option<String> {
        self.selection.read().series_id.clone()
    }

    pub fn scene_id(&self) -> Option<String> {
        self.selection.read().scene_id.clone()
    }

    /// Switch series: every poll is cancelled and scene state is dropped.
    pub fn select_series(&self, series_id: impl Into<String>) {
        let series_id = series_id.into();
        {
            let mut selection = self.selection.write();
            selection.series_id = Some(series_id.clone());
            selection.scene_id = None;
        }
        {
            let mut state = self.state.lock();
            state.polls.cancel();
            state.polls = CancellationToken::new();
            state.tasks.clear();
            state.prompt.clear();
            state.chat_history.clear();
            state.scenes.clear();
            state.voices = VoiceSets::default();
        }
        self.clear_lists();
        tracing::info!(series = %series_id, "series selected");
    }

    /// Switch scene; generation tasks of other scenes keep running.
    pub fn select_scene(&self, scene_id: impl Into<String>) {
        let scene_id = scene_id.into();
        let changed = {
            let mut selection = self.selection.write();
            let changed = selection.scene_id.as_deref() != Some(scene_id.as_str());
            selection.scene_id = Some(scene_id.clone());
            changed
        };
        if changed {
            self.state.lock().chat_history.clear();
            self.clear_lists();
            tracing::debug!(scene = %scene_id, "scene selected");
        }
    }

    pub fn select_tab(&self, tab: Tab) {
        let mut state = self.state.lock();
        if state.tab != tab {
            state.previous_tab = Some(state.tab);
            state.tab = tab;
        }
    }

    pub fn current_tab(&self) -> Tab {
        self.state.lock().tab
    }

    pub fn previous_tab(&self) -> Option<Tab> {
        self.state.lock().previous_tab
    }

    fn clear_lists(&self) {
        self.script.replace_all(Vec::new());
        self.audio.replace_all(Vec::new());
        self.storyboard.replace_all(Vec::new());
    }

    fn is_current_scene(&self, scene_id: &str) -> bool {
        self.selection.read().scene_id.as_deref() == Some(scene_id)
    }

    fn is_current_series(&self, series_id: &str) -> bool {
        self.selection.read().series_id.as_deref() == Some(series_id)
    }

    fn require_scene(&self) -> Result<String> {
        self.scene_id().ok_or(StudioError::NoSceneSelected)
    }

    fn require_series(&self) -> Result<String> {
        self.series_id().ok_or(StudioError::NoSeriesSelected)
    }

    // Read side

    pub fn script_items(&self) -> Vec<ContentItem> {
        self.script.snapshot()
    }

    pub fn audio_items(&self) -> Vec<ContentItem> {
        self.audio.snapshot()
    }

    pub fn storyboard_items(&self) -> Vec<StoryboardItem> {
        self.storyboard.snapshot()
    }

    pub fn editing(&self, category: ListCategory) -> Option<ItemId> {
        match category {
            ListCategory::Script => self.script.with(|l| l.editing()),
            ListCategory::Audio => self.audio.with(|l| l.editing()),
            ListCategory::Storyboard => self.storyboard.with(|l| l.editing()),
        }
    }

    pub fn chat_history(&self) -> Vec<ChatMessage> {
        self.state.lock().chat_history.clone()
    }

    pub fn voices(&self) -> VoiceSets {
        self.state.lock().voices.clone()
    }

    pub fn scenes(&self) -> Vec<SceneOption> {
        self.state.lock().scenes.clone()
    }

    pub fn is_loading(&self, kind: LoadKind) -> bool {
        self.loads.is_loading(kind)
    }

    /// Last known good preview of `scene_id` in the current series
    pub fn cached_preview(&self, scene_id: &str) -> Option<CacheEntry> {
        let series_id = self.series_id()?;
        self.cache.get(&series_id, scene_id)
    }

    // Error reporting

    /// Route a failure to the unauthorized handler or a toast. Validation
    /// errors and cancellations are only returned.
    fn report(&self, err: StudioError, fallback: &str) -> StudioError {
        if err.is_unauthorized() {
            self.unauthorized.on_unauthorized();
        } else if err.is_cancelled() || err.is_validation() {
            tracing::debug!(%err, "not surfaced as a toast");
        } else {
            self.notifier
                .notify(NoticeKind::Error, &err.user_message(fallback));
        }
        err
    }

    fn succeeded(&self, text: &str) {
        self.notifier.notify(NoticeKind::Success, text);
    }

    // Loaders

    pub async fn load_scene_content(&self, scene_id: &str) -> Result<LoadOutcome> {
        let Some(_flight) = self.loads.try_acquire(LoadKind::SceneContent) else {
            return Ok(LoadOutcome::Skipped);
        };
        let fetched = self.api.list_content(scene_id, &[ContentKind::Scene]).await;
        self.apply_scene_load(scene_id, fetched, "Failed to load script", |items| {
            self.script.replace_all(items)
        })
    }

    pub async fn load_audio_content(&self, scene_id: &str) -> Result<LoadOutcome> {
        let Some(_flight) = self.loads.try_acquire(LoadKind::AudioContent) else {
            return Ok(LoadOutcome::Skipped);
        };
        let fetched = self.api.list_content(scene_id, &AUDIO_KINDS).await;
        self.apply_scene_load(scene_id, fetched, "Failed to load audio", |items| {
            self.audio.replace_all(items)
        })
    }

    pub async fn load_storyboard(&self, scene_id: &str) -> Result<LoadOutcome> {
        let Some(_flight) = self.loads.try_acquire(LoadKind::Storyboard) else {
            return Ok(LoadOutcome::Skipped);
        };
        let fetched = self.api.list_storyboard(scene_id).await;
        self.apply_scene_load(scene_id, fetched, "Failed to load storyboard", |items| {
            self.storyboard.replace_all(items)
        })
    }

    pub async fn load_chat_history(&self, scene_id: &str) -> Result<LoadOutcome> {
        let Some(_flight) = self.loads.try_acquire(LoadKind::ChatHistory) else {
            return Ok(LoadOutcome::Skipped);
        };
        let fetched = self.api.chat_history(scene_id).await;
        self.apply_scene_load(scene_id, fetched, "Failed to load chat history", |messages| {
            self.state.lock().chat_history = messages
        })
    }

    /// Configured and available voices of the current series.
    pub async fn load_voices(&self) -> Result<LoadOutcome> {
        let series_id = self.require_series()?;
        let Some(_flight) = self.loads.try_acquire(LoadKind::Voices) else {
            return Ok(LoadOutcome::Skipped);
        };
        let fetched = async {
            let configured = self.api.voices(&series_id, VoiceStatus::Configured).await?;
            let available = self.api.voices(&series_id, VoiceStatus::Available).await?;
            Ok::<_, ApiError>(VoiceSets {
                configured,
                available,
            })
        }
        .await;
        self.apply_series_load(&series_id, fetched, "Failed to load voices", |voices| {
            self.state.lock().voices = voices
        })
    }

    /// Scene options of the current series.
    pub async fn load_scenes(&self) -> Result<LoadOutcome> {
        let series_id = self.require_series()?;
        let Some(_flight) = self.loads.try_acquire(LoadKind::Scenes) else {
            return Ok(LoadOutcome::Skipped);
        };
        let fetched = self.api.scenes(&series_id).await;
        self.apply_series_load(&series_id, fetched, "Failed to load scenes", |scenes| {
            self.state.lock().scenes = scenes
        })
    }

    fn apply_scene_load<T>(
        &self,
        scene_id: &str,
        fetched: std::result::Result<T, ApiError>,
        fallback: &str,
        apply: impl FnOnce(T),
    ) -> Result<LoadOutcome> {
        let current = self.is_current_scene(scene_id);
        self.settle_load(current, fetched, fallback, apply)
    }

    fn apply_series_load<T>(
        &self,
        series_id: &str,
        fetched: std::result::Result<T, ApiError>,
        fallback: &str,
        apply: impl FnOnce(T),
    ) -> Result<LoadOutcome> {
        let current = self.is_current_series(series_id);
        self.settle_load(current, fetched, fallback, apply)
    }

    fn settle_load<T>(
        &self,
        current: bool,
        fetched: std::result::Result<T, ApiError>,
        fallback: &str,
        apply: impl FnOnce(T),
    ) -> Result<LoadOutcome> {
        match fetched {
            Ok(value) if current => {
                apply(value);
                Ok(LoadOutcome::Applied)
            }
            Err(err) if current || err.is_unauthorized() => {
                Err(self.report(StudioError::Api(err), fallback))
            }
            _ => {
                tracing::debug!("dropping response for a scene that is no longer selected");
                Ok(LoadOutcome::Stale)
            }
        }
    }

    // List operations

    fn content_list(&self, category: ListCategory) -> Result<&SyncedList<ContentItem>> {
        match category {
            ListCategory::Script => Ok(&self.script),
            ListCategory::Audio => Ok(&self.audio),
            ListCategory::Storyboard => Err(StudioError::WrongList { category }),
        }
    }

    /// Move one item; `Ok(false)` when it was already there.
    pub async fn reorder(&self, category: ListCategory, from: usize, to: usize) -> Result<bool> {
        let moved = match category {
            ListCategory::Storyboard => self.storyboard.reorder(from, to).await,
            _ => self.content_list(category)?.reorder(from, to).await,
        };
        match moved {
            Ok(true) => {
                self.succeeded("Order saved");
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(err) => Err(self.report(err.into(), "Failed to save order")),
        }
    }

    /// New blank item in edit mode. Audio lists get a dialogue line.
    pub fn add_item(&self, category: ListCategory) -> Result<ItemId> {
        match category {
            ListCategory::Script => self.add_content(category, ContentKind::Scene),
            ListCategory::Audio => self.add_content(category, ContentKind::Dialogue),
            ListCategory::Storyboard => {
                self.require_scene()?;
                Ok(self.storyboard.insert_provisional(StoryboardItem::draft())?)
            }
        }
    }

    pub fn add_content(&self, category: ListCategory, kind: ContentKind) -> Result<ItemId> {
        self.require_scene()?;
        let list = self.content_list(category)?;
        let fits = match category {
            ListCategory::Script => kind == ContentKind::Scene,
            _ => AUDIO_KINDS.contains(&kind),
        };
        if !fits {
            return Err(StudioError::WrongList { category });
        }
        Ok(list.insert_provisional(ContentItem::draft(kind))?)
    }

    pub fn begin_edit(&self, category: ListCategory, id: ItemId) -> Result<()> {
        match category {
            ListCategory::Storyboard => Ok(self.storyboard.begin_edit(id)?),
            _ => Ok(self.content_list(category)?.begin_edit(id)?),
        }
    }

    /// Create or update a script/audio item. A saved speaker is then bound to
    /// the item on a best-effort basis.
    pub async fn commit_content_edit(
        &self,
        category: ListCategory,
        id: ItemId,
        patch: ContentPatch,
    ) -> Result<CommitOutcome> {
        let list = self.content_list(category)?;
        let outcome = match list.commit_edit(id, &patch).await {
            Ok(outcome) => outcome,
            Err(err) => return Err(self.report(err.into(), "Failed to save")),
        };
        if let CommitOutcome::Saved { id: saved } = outcome {
            self.succeeded("Saved");
            let speaker = list.with(|l| l.get(saved).and_then(|item| item.speaker_ref.clone()));
            if let (Some(content_id), Some(voice_id)) = (saved.server(), speaker) {
                if let Err(err) = self.api.apply_voice(content_id, &voice_id).await {
                    tracing::warn!(
                        content_id,
                        voice = %voice_id.as_str(),
                        %err,
                        "voice binding failed"
                    );
                }
            }
        }
        Ok(outcome)
    }

    pub async fn commit_storyboard_edit(
        &self,
        id: ItemId,
        patch: StoryboardPatch,
    ) -> Result<CommitOutcome> {
        match self.storyboard.commit_edit(id, &patch).await {
            Ok(outcome) => {
                if matches!(outcome, CommitOutcome::Saved { .. }) {
                    self.succeeded("Saved");
                }
                Ok(outcome)
            }
            Err(err) => Err(self.report(err.into(), "Failed to save")),
        }
    }

    pub fn cancel_edit(&self, category: ListCategory, id: ItemId) -> Result<CancelOutcome> {
        let cancelled = match category {
            ListCategory::Storyboard => self.storyboard.cancel_edit(id),
            _ => self.content_list(category)?.cancel_edit(id),
        };
        Ok(cancelled?)
    }

    pub async fn remove_item(&self, category: ListCategory, id: ItemId) -> Result<()> {
        let removed = match category {
            ListCategory::Storyboard => self.storyboard.remove(id).await,
            _ => self.content_list(category)?.remove(id).await,
        };
        match removed {
            Ok(()) => {
                if !id.is_provisional() {
                    self.succeeded("Deleted");
                }
                Ok(())
            }
            Err(err) => Err(self.report(err.into(), "Failed to delete")),
        }
    }

    /// Ask the server to redo one shot, then reload the storyboard.
    pub async fn regenerate_storyboard_item(&self, id: ItemId) -> Result<()> {
        let scene_id = self.require_scene()?;
        let server_id = id.server().ok_or(StudioError::Unsaved(id))?;
        if let Err(err) = self.api.regenerate_storyboard(server_id).await {
            return Err(self.report(err.into(), "Failed to regenerate"));
        }
        self.succeeded("Regeneration started");
        self.load_storyboard(&scene_id).await?;
        Ok(())
    }

    // Voices

    /// Move a voice between the configured and available sets.
    pub async fn set_voice_configured(&self, voice_id: &VoiceId, configured: bool) -> Result<()> {
        let series_id = self.require_series()?;
        let status = if configured {
            VoiceStatus::Configured
        } else {
            VoiceStatus::Available
        };
        if let Err(err) = self.api.set_voice_status(&series_id, voice_id, status).await {
            return Err(self.report(err.into(), "Failed to update voice"));
        }
        self.succeeded("Voice updated");
        self.load_voices().await?;
        Ok(())
    }

    pub async fn apply_voice(&self, content_id: ItemId, voice_id: &VoiceId) -> Result<()> {
        let server_id = content_id.server().ok_or(StudioError::Unsaved(content_id))?;
        match self.api.apply_voice(server_id, voice_id).await {
            Ok(()) => {
                self.succeeded("Voice applied");
                Ok(())
            }
            Err(err) => Err(self.report(err.into(), "Failed to apply voice")),
        }
    }

    // Generation

    pub fn prompt(&self) -> String {
        self.state.lock().prompt.clone()
    }

    pub fn set_prompt(&self, prompt: impl Into<String>) {
        self.state.lock().prompt = prompt.into();
    }

    pub fn task(&self, kind: GenerationKind, scene_id: &str) -> Option<GenerationTask> {
        let state = self.state.lock();
        let slot = state.tasks.get(&(kind, scene_id.to_string()))?;
        let task = slot.task.lock().clone();
        Some(task)
    }

    /// Drop the task for (kind, scene), cancelling it if still running.
    pub fn reset_task(&self, kind: GenerationKind, scene_id: &str) {
        let removed = self.state.lock().tasks.remove(&(kind, scene_id.to_string()));
        if let Some(slot) = removed {
            slot.cancel.cancel();
            slot.task.lock().reset();
        }
    }

    /// Stop every poll loop; the view is going away.
    pub fn teardown(&self) {
        let mut state = self.state.lock();
        state.polls.cancel();
        state.polls = CancellationToken::new();
        tracing::debug!(tasks = state.tasks.len(), "orchestrator torn down");
    }

    /// Run a generation job for the current scene with the current prompt.
    pub async fn generate(&self, kind: GenerationKind) -> Result<GenerationResult> {
        let series_id = self.series_id();
        let scene_id = self.require_scene()?;
        let prompt = self.prompt();
        if prompt.trim().is_empty() {
            return Err(generation::GenerationError::EmptyPrompt.into());
        }

        // The task leaves Idle before the lock is released, so a concurrent
        // call always finds it active.
        let (task, request, cancel) = {
            let mut state = self.state.lock();
            let key = (kind, scene_id.clone());
            if let Some(slot) = state.tasks.get(&key) {
                if slot.task.lock().status().is_active() {
                    return Err(StudioError::GenerationInFlight {
                        kind,
                        scene: scene_id,
                    });
                }
            }
            let mut fresh = GenerationTask::new(kind, &scene_id);
            let request = fresh.begin_submit(&prompt)?;
            let task: SharedTask = Arc::new(Mutex::new(fresh));
            let cancel = state.polls.child_token();
            state.tasks.insert(
                key,
                TaskSlot {
                    task: Arc::clone(&task),
                    cancel: cancel.clone(),
                },
            );
            (task, request, cancel)
        };

        let outcome = self.runner.submit(&task, request, &cancel).await;
        let result = match outcome {
            Ok(result) => result,
            Err(err) => return Err(self.report(err.into(), "Generation failed")),
        };

        match kind {
            GenerationKind::Video => {
                self.finish_video(series_id.as_deref(), &scene_id, &result).await;
            }
            GenerationKind::Script if !result.scenes.is_empty() => {
                self.merge_scenes(&result.scenes);
            }
            _ => {}
        }
        self.succeeded(&format!("{kind} generation completed"));
        Ok(result)
    }

    async fn finish_video(
        &self,
        series_id: Option<&str>,
        scene_id: &str,
        result: &GenerationResult,
    ) {
        match (series_id, result.result_ref.as_deref()) {
            (Some(series_id), Some(url)) => {
                self.cache.put(
                    series_id,
                    scene_id,
                    CacheEntry::preview(url, result.last_frame.clone()),
                );
            }
            _ => tracing::warn!(scene = %scene_id, "video finished without a cacheable preview"),
        }
        if self.is_current_scene(scene_id) {
            self.state.lock().prompt.clear();
            if let Err(err) = self.load_chat_history(scene_id).await {
                tracing::debug!(%err, "chat history refresh after video failed");
            }
        }
    }

    fn merge_scenes(&self, produced: &[SceneOption]) {
        let mut state = self.state.lock();
        for scene in produced {
            match state.scenes.iter_mut().find(|s| s.id == scene.id) {
                Some(existing) => *existing = scene.clone(),
                None => state.scenes.push(scene.clone()),
            }
        }
    }
}
