use optimistic::VoiceId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceProfile {
    pub voice_id: VoiceId,
    #[serde(default, alias = "name")]
    pub display_name: String,
    #[serde(default)]
    pub is_custom: bool,
    #[serde(default, alias = "sampleUrl")]
    pub sample_ref: Option<String>,
}

/// Which side of the series binding a voice list comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoiceStatus {
    Configured,
    Available,
}

impl VoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoiceStatus::Configured => "configured",
            VoiceStatus::Available => "available",
        }
    }
}

/// Voices bound to the series and voices that could be.
///
/// Moving a voice between the sets is a server call followed by a reload;
/// the sets are never edited locally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoiceSets {
    pub configured: Vec<VoiceProfile>,
    pub available: Vec<VoiceProfile>,
}

impl VoiceSets {
    pub fn find(&self, voice_id: &VoiceId) -> Option<(VoiceStatus, &VoiceProfile)> {
        let configured = self
            .configured
            .iter()
            .find(|v| &v.voice_id == voice_id)
            .map(|v| (VoiceStatus::Configured, v));
        configured.or_else(|| {
            self.available
                .iter()
                .find(|v| &v.voice_id == voice_id)
                .map(|v| (VoiceStatus::Available, v))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.configured.is_empty() && self.available.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_profile_accepts_server_aliases() {
        let profile: VoiceProfile =
            serde_json::from_value(json!({"voiceId": "v-2", "name": "Narrator"})).unwrap();
        assert_eq!(profile.display_name, "Narrator");
        assert!(!profile.is_custom);

        let sets = VoiceSets {
            configured: Vec::new(),
            available: vec![profile],
        };
        let (status, found) = sets.find(&VoiceId::new("v-2")).unwrap();
        assert_eq!(status, VoiceStatus::Available);
        assert_eq!(found.display_name, "Narrator");
    }
}
