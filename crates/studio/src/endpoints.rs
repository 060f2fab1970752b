/// Wire shapes and typed calls for the authoring endpoints
///
/// Content items carry their time span as a `timeRange` string in the
/// plain `MM:SS-MM:SS` form.
use crate::{ChatMessage, SharedSelection, VoiceProfile, VoiceStatus};
use generation::SceneOption;
use optimistic::{
    ContentItem, ContentKind, ItemId, ListBackend, ReorderRequest, StoryboardItem, VoiceId,
    DEFAULT_SPAN_MS,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use studio_api::{ApiClient, ApiError, Method};
use timerange::TimeRange;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: ContentKind,
    #[serde(default)]
    pub order_index: usize,
    #[serde(default, alias = "content")]
    pub body: String,
    #[serde(default, alias = "voiceId", skip_serializing_if = "Option::is_none")]
    pub speaker_ref: Option<VoiceId>,
    #[serde(default)]
    pub time_range: Option<String>,
}

impl ContentDto {
    pub fn from_item(item: &ContentItem, scene_id: Option<String>) -> Self {
        Self {
            id: item.id.server(),
            scene_id,
            kind: item.kind,
            order_index: item.order_index,
            body: item.body.clone(),
            speaker_ref: item.speaker_ref.clone(),
            time_range: Some(item.time_range().format_plain()),
        }
    }

    /// `None` for rows without a server id.
    pub fn into_item(self) -> Option<ContentItem> {
        let id = self.id?;
        let (start_ms, end_ms) = span_or_default(self.time_range.as_deref());
        Some(ContentItem {
            id: ItemId::Server(id),
            kind: self.kind,
            order_index: self.order_index,
            body: self.body,
            speaker_ref: self.speaker_ref,
            start_ms,
            end_ms,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryboardDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_id: Option<String>,
    /// 1-based
    #[serde(default)]
    pub storyboard_order: usize,
    #[serde(default, alias = "imageUrl")]
    pub source_file_ref: Option<String>,
    #[serde(default)]
    pub time_range: Option<String>,
    #[serde(default, alias = "prompt")]
    pub prompt_text: String,
}

impl StoryboardDto {
    pub fn from_item(item: &StoryboardItem, scene_id: Option<String>) -> Self {
        Self {
            id: item.id.server(),
            scene_id,
            storyboard_order: item.storyboard_order(),
            source_file_ref: item.source_file_ref.clone(),
            time_range: Some(TimeRange::from_millis(item.start_ms, item.end_ms).format_plain()),
            prompt_text: item.prompt_text.clone(),
        }
    }

    pub fn into_item(self) -> Option<StoryboardItem> {
        let id = self.id?;
        let (start_ms, end_ms) = span_or_default(self.time_range.as_deref());
        Some(StoryboardItem {
            id: ItemId::Server(id),
            order_index: self.storyboard_order.saturating_sub(1),
            source_file_ref: self.source_file_ref,
            start_ms,
            end_ms,
            prompt_text: self.prompt_text,
        })
    }
}

/// Server spans that fail to parse fall back to the default span.
fn span_or_default(raw: Option<&str>) -> (u64, u64) {
    match raw.map(TimeRange::parse_valid) {
        Some(Ok(range)) => (range.start_ms(), range.end_ms()),
        Some(Err(err)) => {
            tracing::debug!(%err, "ignoring unusable time range from server");
            (0, DEFAULT_SPAN_MS)
        }
        None => (0, DEFAULT_SPAN_MS),
    }
}

#[derive(Debug, Deserialize)]
struct Created {
    id: u64,
}

/// Ids are opaque to us and may carry anything.
fn query_value(raw: &str) -> String {
    urlencoding::encode(raw).into_owned()
}

fn content_kinds(kinds: &[ContentKind]) -> String {
    kinds
        .iter()
        .map(ContentKind::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

/// Typed calls over [`ApiClient`]
#[derive(Clone)]
pub struct StudioApi {
    client: ApiClient,
}

impl StudioApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub async fn list_content(
        &self,
        scene_id: &str,
        kinds: &[ContentKind],
    ) -> Result<Vec<ContentItem>, ApiError> {
        let path = format!(
            "/content/list?sceneId={}&type={}",
            query_value(scene_id),
            content_kinds(kinds)
        );
        let rows: Option<Vec<ContentDto>> = self.client.get(&path).await?;
        Ok(rows
            .unwrap_or_default()
            .into_iter()
            .filter(|row| kinds.contains(&row.kind))
            .filter_map(ContentDto::into_item)
            .collect())
    }

    pub async fn create_content(
        &self,
        scene_id: &str,
        item: &ContentItem,
    ) -> Result<u64, ApiError> {
        let dto = ContentDto::from_item(item, Some(scene_id.to_string()));
        let created: Created = self.client.post("/content/create", to_body(&dto)?).await?;
        Ok(created.id)
    }

    pub async fn update_content(&self, item: &ContentItem) -> Result<(), ApiError> {
        let dto = ContentDto::from_item(item, None);
        self.client
            .call_unit(Method::Post, "/content/update", Some(to_body(&dto)?))
            .await
    }

    pub async fn delete_content(&self, id: u64) -> Result<(), ApiError> {
        self.client
            .call_unit(Method::Delete, &format!("/content/{id}"), None)
            .await
    }

    pub async fn sort_content(&self, scene_id: &str, ids: &[u64]) -> Result<(), ApiError> {
        let body = json!({ "sceneId": scene_id, "ids": ids });
        self.client
            .call_unit(Method::Post, "/content/sort", Some(body))
            .await
    }

    pub async fn list_storyboard(&self, scene_id: &str) -> Result<Vec<StoryboardItem>, ApiError> {
        let rows: Option<Vec<StoryboardDto>> = self
            .client
            .get(&format!("/storyboard/list?sceneId={}", query_value(scene_id)))
            .await?;
        Ok(rows
            .unwrap_or_default()
            .into_iter()
            .filter_map(StoryboardDto::into_item)
            .collect())
    }

    pub async fn create_storyboard(
        &self,
        scene_id: &str,
        item: &StoryboardItem,
    ) -> Result<u64, ApiError> {
        let dto = StoryboardDto::from_item(item, Some(scene_id.to_string()));
        let created: Created = self.client.post("/storyboard/create", to_body(&dto)?).await?;
        Ok(created.id)
    }

    pub async fn update_storyboard(&self, item: &StoryboardItem) -> Result<(), ApiError> {
        let dto = StoryboardDto::from_item(item, None);
        self.client
            .call_unit(Method::Post, "/storyboard/update", Some(to_body(&dto)?))
            .await
    }

    pub async fn delete_storyboard(&self, id: u64) -> Result<(), ApiError> {
        self.client
            .call_unit(Method::Delete, &format!("/storyboard/{id}"), None)
            .await
    }

    /// `order` is 1-based.
    pub async fn move_storyboard(&self, id: u64, order: usize) -> Result<(), ApiError> {
        let body = json!({ "id": id, "storyboardOrder": order });
        self.client
            .call_unit(Method::Post, "/storyboard/sort", Some(body))
            .await
    }

    pub async fn regenerate_storyboard(&self, id: u64) -> Result<(), ApiError> {
        self.client
            .call_unit(Method::Post, &format!("/storyboard/{id}/regenerate"), None)
            .await
    }

    pub async fn chat_history(&self, scene_id: &str) -> Result<Vec<ChatMessage>, ApiError> {
        let messages: Option<Vec<ChatMessage>> = self
            .client
            .get(&format!("/chat/history?sceneId={}", query_value(scene_id)))
            .await?;
        Ok(messages.unwrap_or_default())
    }

    pub async fn voices(
        &self,
        series_id: &str,
        status: VoiceStatus,
    ) -> Result<Vec<VoiceProfile>, ApiError> {
        let path = format!(
            "/voice/list?seriesId={}&status={}",
            query_value(series_id),
            status.as_str()
        );
        let voices: Option<Vec<VoiceProfile>> = self.client.get(&path).await?;
        Ok(voices.unwrap_or_default())
    }

    pub async fn set_voice_status(
        &self,
        series_id: &str,
        voice_id: &VoiceId,
        status: VoiceStatus,
    ) -> Result<(), ApiError> {
        let body = json!({
            "seriesId": series_id,
            "voiceId": voice_id,
            "status": status.as_str(),
        });
        self.client
            .call_unit(Method::Post, "/voice/status", Some(body))
            .await
    }

    pub async fn apply_voice(&self, content_id: u64, voice_id: &VoiceId) -> Result<(), ApiError> {
        let body = json!({ "contentId": content_id, "voiceId": voice_id });
        self.client
            .call_unit(Method::Post, "/voice/apply", Some(body))
            .await
    }

    pub async fn scenes(&self, series_id: &str) -> Result<Vec<SceneOption>, ApiError> {
        let scenes: Option<Vec<SceneOption>> = self
            .client
            .get(&format!("/scene/list?seriesId={}", query_value(series_id)))
            .await?;
        Ok(scenes.unwrap_or_default())
    }
}

fn to_body<T: Serialize>(value: &T) -> Result<serde_json::Value, ApiError> {
    serde_json::to_value(value).map_err(|err| ApiError::Decode(err.to_string()))
}

/// The list was built with a reorder mode this endpoint has no route for.
fn unsupported_reorder(list: &str, request: &ReorderRequest) -> ApiError {
    tracing::error!(list, ?request, "reorder shape not supported");
    ApiError::rejected(-1, format!("{list} cannot be reordered that way"))
}

fn scene_of(selection: &SharedSelection) -> Result<String, ApiError> {
    selection
        .read()
        .scene_id
        .clone()
        .ok_or_else(|| ApiError::rejected(-1, "no scene selected"))
}

/// Script and audio lists
pub struct ContentBackend {
    api: StudioApi,
    selection: SharedSelection,
}

impl ContentBackend {
    pub fn new(api: StudioApi, selection: SharedSelection) -> Self {
        Self { api, selection }
    }
}

#[async_trait::async_trait]
impl ListBackend<ContentItem> for ContentBackend {
    async fn reorder(&self, request: &ReorderRequest) -> Result<(), ApiError> {
        match request {
            ReorderRequest::IdOrder(ids) => {
                let scene_id = scene_of(&self.selection)?;
                self.api.sort_content(&scene_id, ids).await
            }
            ReorderRequest::MovedTo { .. } => Err(unsupported_reorder("content", request)),
        }
    }

    async fn create(&self, item: &ContentItem) -> Result<u64, ApiError> {
        let scene_id = scene_of(&self.selection)?;
        self.api.create_content(&scene_id, item).await
    }

    async fn update(&self, item: &ContentItem) -> Result<(), ApiError> {
        self.api.update_content(item).await
    }

    async fn delete(&self, id: u64) -> Result<(), ApiError> {
        self.api.delete_content(id).await
    }
}

pub struct StoryboardBackend {
    api: StudioApi,
    selection: SharedSelection,
}

impl StoryboardBackend {
    pub fn new(api: StudioApi, selection: SharedSelection) -> Self {
        Self { api, selection }
    }
}

#[async_trait::async_trait]
impl ListBackend<StoryboardItem> for StoryboardBackend {
    async fn reorder(&self, request: &ReorderRequest) -> Result<(), ApiError> {
        match request {
            ReorderRequest::MovedTo { id, order } => self.api.move_storyboard(*id, *order).await,
            ReorderRequest::IdOrder(_) => Err(unsupported_reorder("storyboard", request)),
        }
    }

    async fn create(&self, item: &StoryboardItem) -> Result<u64, ApiError> {
        let scene_id = scene_of(&self.selection)?;
        self.api.create_storyboard(&scene_id, item).await
    }

    async fn update(&self, item: &StoryboardItem) -> Result<(), ApiError> {
        self.api.update_storyboard(item).await
    }

    async fn delete(&self, id: u64) -> Result<(), ApiError> {
        self.api.delete_storyboard(id).await
    }
}
