use crate::{
    error::{RemixError, Result},
    models::{GeneratedImage, UploadedImage},
    pipeline::RemixOutcome,
};
use chrono::{DateTime, Duration, Utc};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    AwaitingUpload,
    AwaitingInstruction,
    Generating,
}

/// The last instruction/image pair that produced an image, kept for display on later loads.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedRemix {
    pub instruction: String,
    pub image: UploadedImage,
    pub prompt: String,
    pub generated: GeneratedImage,
}

impl From<RemixOutcome> for CompletedRemix {
    fn from(outcome: RemixOutcome) -> Self {
        Self {
            instruction: outcome.instruction,
            image: outcome.image,
            prompt: outcome.prompt,
            generated: outcome.generated,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub updated_at: DateTime<Utc>,
    pub upload: Option<UploadedImage>,
    pub generating: bool,
    pub last: Option<CompletedRemix>,
}

impl Session {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            updated_at: Utc::now(),
            upload: None,
            generating: false,
            last: None,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        match (&self.upload, self.generating) {
            (None, _) => SessionPhase::AwaitingUpload,
            (Some(_), false) => SessionPhase::AwaitingInstruction,
            (Some(_), true) => SessionPhase::Generating,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Read-only snapshot handed to the page renderer.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub id: Uuid,
    pub phase: SessionPhase,
    pub upload_name: Option<String>,
    pub last: Option<CompletedRemix>,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id,
            phase: session.phase(),
            upload_name: session.upload.as_ref().map(|u| u.file_name.clone()),
            last: session.last.clone(),
        }
    }
}

#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<Uuid, Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Session>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn create(&self) -> SessionView {
        let session = Session::new();
        let view = SessionView::from(&session);
        log::debug!("Created session {}", session.id);
        self.lock().insert(session.id, session);
        view
    }

    pub fn get(&self, id: &Uuid) -> Option<SessionView> {
        self.lock().get(id).map(SessionView::from)
    }

    /// Returns the existing session or a fresh one when the id is unknown or missing.
    pub fn get_or_create(&self, id: Option<Uuid>) -> (SessionView, bool) {
        match id.and_then(|id| self.get(&id)) {
            Some(view) => (view, false),
            None => (self.create(), true),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_session<T>(&self, id: &Uuid, f: impl FnOnce(&mut Session) -> Result<T>) -> Result<T> {
        let mut sessions = self.lock();
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| RemixError::Request(format!("Unknown session {}", id)))?;
        let result = f(session)?;
        session.touch();
        Ok(result)
    }

    pub fn store_upload(&self, id: &Uuid, image: UploadedImage) -> Result<()> {
        self.with_session(id, |session| {
            if session.generating {
                return Err(RemixError::Busy);
            }
            log::info!(
                "Session {} uploaded {} ({} bytes)",
                id,
                image.file_name,
                image.bytes.len()
            );
            session.upload = Some(image);
            Ok(())
        })
    }

    pub fn upload(&self, id: &Uuid) -> Option<UploadedImage> {
        self.lock().get(id).and_then(|s| s.upload.clone())
    }

    pub fn last_result(&self, id: &Uuid) -> Option<CompletedRemix> {
        self.lock().get(id).and_then(|s| s.last.clone())
    }

    /// Moves to `Generating` and hands back the image to work on.
    pub fn begin_generation(&self, id: &Uuid) -> Result<UploadedImage> {
        self.with_session(id, |session| {
            if session.generating {
                return Err(RemixError::Busy);
            }
            let image = session.upload.clone().ok_or(RemixError::MissingUpload)?;
            session.generating = true;
            Ok(image)
        })
    }

    pub fn finish_generation(&self, id: &Uuid, outcome: RemixOutcome) -> Result<()> {
        self.with_session(id, |session| {
            session.generating = false;
            session.last = Some(outcome.into());
            Ok(())
        })
    }

    pub fn fail_generation(&self, id: &Uuid) -> Result<()> {
        self.with_session(id, |session| {
            session.generating = false;
            Ok(())
        })
    }

    /// Drops sessions untouched for longer than `max_age`; returns how many were removed.
    pub fn evict_idle(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now() - max_age;
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, session| session.generating || session.updated_at >= cutoff);
        before - sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::sample_image;

    fn outcome(instruction: &str) -> RemixOutcome {
        RemixOutcome {
            instruction: instruction.to_string(),
            image: sample_image(),
            prompt: "A prompt".to_string(),
            generated: GeneratedImage {
                url: "https://img.example/out.png".to_string(),
                revised_prompt: None,
            },
        }
    }

    #[test]
    fn test_phase_transitions() {
        let store = SessionStore::new();
        let id = store.create().id;
        assert_eq!(store.get(&id).unwrap().phase, SessionPhase::AwaitingUpload);

        assert!(matches!(
            store.begin_generation(&id),
            Err(RemixError::MissingUpload)
        ));

        store.store_upload(&id, sample_image()).unwrap();
        assert_eq!(
            store.get(&id).unwrap().phase,
            SessionPhase::AwaitingInstruction
        );

        let image = store.begin_generation(&id).unwrap();
        assert_eq!(image, sample_image());
        assert_eq!(store.get(&id).unwrap().phase, SessionPhase::Generating);
        assert!(matches!(store.begin_generation(&id), Err(RemixError::Busy)));
        assert!(matches!(
            store.store_upload(&id, sample_image()),
            Err(RemixError::Busy)
        ));

        store.finish_generation(&id, outcome("青くして")).unwrap();
        let view = store.get(&id).unwrap();
        assert_eq!(view.phase, SessionPhase::AwaitingInstruction);
        assert_eq!(view.last.unwrap().instruction, "青くして");
    }

    #[test]
    fn test_failure_keeps_previous_result() {
        let store = SessionStore::new();
        let id = store.create().id;
        store.store_upload(&id, sample_image()).unwrap();
        store.begin_generation(&id).unwrap();
        store.finish_generation(&id, outcome("first")).unwrap();

        store.begin_generation(&id).unwrap();
        store.fail_generation(&id).unwrap();

        let view = store.get(&id).unwrap();
        assert_eq!(view.phase, SessionPhase::AwaitingInstruction);
        assert_eq!(view.last.unwrap().instruction, "first");
    }

    #[test]
    fn test_get_or_create() {
        let store = SessionStore::new();
        let (first, created) = store.get_or_create(None);
        assert!(created);

        let (again, created) = store.get_or_create(Some(first.id));
        assert!(!created);
        assert_eq!(again.id, first.id);

        let (_, created) = store.get_or_create(Some(Uuid::new_v4()));
        assert!(created);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_unknown_session_is_rejected() {
        let store = SessionStore::new();
        assert!(matches!(
            store.store_upload(&Uuid::new_v4(), sample_image()),
            Err(RemixError::Request(_))
        ));
    }

    #[test]
    fn test_evict_idle_spares_generating_sessions() {
        let store = SessionStore::new();
        let idle = store.create().id;
        let busy = store.create().id;
        store.store_upload(&busy, sample_image()).unwrap();
        store.begin_generation(&busy).unwrap();

        assert_eq!(store.evict_idle(Duration::seconds(-1)), 1);
        assert!(store.get(&idle).is_none());
        assert!(store.get(&busy).is_some());
        assert_eq!(store.evict_idle(Duration::hours(1)), 0);
    }
}
