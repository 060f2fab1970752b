use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Loader kinds that are single-flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadKind {
    SceneContent,
    AudioContent,
    Storyboard,
    ChatHistory,
    Voices,
    Scenes,
}

impl fmt::Display for LoadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoadKind::SceneContent => "scene content",
            LoadKind::AudioContent => "audio content",
            LoadKind::Storyboard => "storyboard",
            LoadKind::ChatHistory => "chat history",
            LoadKind::Voices => "voices",
            LoadKind::Scenes => "scenes",
        };
        f.write_str(name)
    }
}

/// Set of loaders with a request outstanding
#[derive(Debug, Clone, Default)]
pub struct LoadGuards {
    active: Arc<Mutex<HashSet<LoadKind>>>,
}

impl LoadGuards {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` when a load of this kind is already outstanding.
    pub fn try_acquire(&self, kind: LoadKind) -> Option<InFlight> {
        if self.active.lock().insert(kind) {
            Some(InFlight {
                active: Arc::clone(&self.active),
                kind,
            })
        } else {
            None
        }
    }

    pub fn is_loading(&self, kind: LoadKind) -> bool {
        self.active.lock().contains(&kind)
    }
}

/// Clears its flag on drop, including when the load future is dropped.
#[derive(Debug)]
pub struct InFlight {
    active: Arc<Mutex<HashSet<LoadKind>>>,
    kind: LoadKind,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.active.lock().remove(&self.kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_refused_until_drop() {
        let guards = LoadGuards::new();
        let first = guards.try_acquire(LoadKind::Voices).unwrap();
        assert!(guards.try_acquire(LoadKind::Voices).is_none());
        assert!(guards.try_acquire(LoadKind::Scenes).is_some());
        assert!(guards.is_loading(LoadKind::Voices));
        drop(first);
        assert!(!guards.is_loading(LoadKind::Voices));
        assert!(guards.try_acquire(LoadKind::Voices).is_some());
    }
}
