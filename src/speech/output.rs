use std::sync::Arc;
use tokio::sync::{oneshot, watch};

use super::SpeechError;
use crate::markdown::strip_markdown;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    /// Identifier handed back to the engine.
    pub id: String,
    pub name: String,
    pub language: String,
}

/// A running utterance. Sending on `cancel` (or dropping it) stops it;
/// `done` resolves once the engine has finished either way.
pub struct Utterance {
    pub done: oneshot::Receiver<Result<(), SpeechError>>,
    pub cancel: oneshot::Sender<()>,
}

pub trait SynthesisEngine: Send + Sync {
    fn is_supported(&self) -> bool;
    fn voices(&self) -> Vec<Voice>;
    fn speak(&self, text: &str, voice: Option<&Voice>) -> Result<Utterance, SpeechError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakingState {
    Idle,
    Speaking { utterance: u64 },
}

/// Read-aloud adapter. At most one utterance is active at a time.
pub struct TextToSpeech<E> {
    engine: E,
    is_supported: bool,
    language: String,
    voices: Vec<Voice>,
    selected_voice: Option<Voice>,
    state: Arc<watch::Sender<SpeakingState>>,
    active: Option<oneshot::Sender<()>>,
    next_utterance: u64,
}

impl<E: SynthesisEngine> TextToSpeech<E> {
    pub fn new(engine: E, language: &str, preferred_voice: Option<&str>) -> Self {
        let (state, _) = watch::channel(SpeakingState::Idle);
        let is_supported = engine.is_supported();

        let mut tts = Self {
            engine,
            is_supported,
            language: language.to_string(),
            voices: Vec::new(),
            selected_voice: None,
            state: Arc::new(state),
            active: None,
            next_utterance: 0,
        };
        tts.refresh_voices();

        if let Some(name) = preferred_voice {
            tts.select_voice(name);
        }
        tts
    }

    pub fn is_supported(&self) -> bool {
        self.is_supported
    }

    pub fn is_speaking(&self) -> bool {
        matches!(*self.state.borrow(), SpeakingState::Speaking { .. })
    }

    pub fn state(&self) -> SpeakingState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SpeakingState> {
        self.state.subscribe()
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    pub fn selected_voice(&self) -> Option<&Voice> {
        self.selected_voice.as_ref()
    }

    /// Re-enumerate voices. Keeps the current selection when it is still
    /// offered, otherwise falls back to the language default.
    pub fn refresh_voices(&mut self) {
        if !self.is_supported {
            return;
        }

        self.voices = self.engine.voices();
        let still_offered = self
            .selected_voice
            .as_ref()
            .is_some_and(|selected| self.voices.contains(selected));

        if !still_offered {
            self.selected_voice = default_voice(&self.voices, &self.language).cloned();
        }
        tracing::debug!(
            voices = self.voices.len(),
            selected = ?self.selected_voice.as_ref().map(|v| &v.name),
            "voice list refreshed"
        );
    }

    /// Select a voice by id or name. Returns false if no such voice exists.
    pub fn select_voice(&mut self, name: &str) -> bool {
        match self.voices.iter().find(|v| v.id == name || v.name == name) {
            Some(voice) => {
                self.selected_voice = Some(voice.clone());
                true
            }
            None => false,
        }
    }

    /// Advance to the next voice, wrapping around.
    pub fn cycle_voice(&mut self) -> Option<&Voice> {
        if self.voices.is_empty() {
            return None;
        }

        let next = self
            .selected_voice
            .as_ref()
            .and_then(|selected| self.voices.iter().position(|v| v == selected))
            .map(|i| (i + 1) % self.voices.len())
            .unwrap_or(0);
        self.selected_voice = Some(self.voices[next].clone());
        self.selected_voice.as_ref()
    }

    /// Speak `text` with markdown decoration removed, cancelling whatever was
    /// being spoken.
    pub fn speak(&mut self, text: &str) -> Result<(), SpeechError> {
        self.cancel_active();

        if !self.is_supported {
            self.state.send_replace(SpeakingState::Idle);
            return Err(SpeechError::Unsupported);
        }

        let plain = strip_markdown(text);
        let utterance = match self.engine.speak(&plain, self.selected_voice.as_ref()) {
            Ok(utterance) => utterance,
            Err(e) => {
                tracing::warn!("speech output failed to start: {}", e);
                self.state.send_replace(SpeakingState::Idle);
                return Err(e);
            }
        };

        self.next_utterance += 1;
        let id = self.next_utterance;
        self.active = Some(utterance.cancel);
        self.state.send_replace(SpeakingState::Speaking { utterance: id });

        let state = Arc::clone(&self.state);
        let done = utterance.done;
        tokio::spawn(async move {
            match done.await {
                Ok(Err(e)) => tracing::warn!("speech output error: {}", e),
                Ok(Ok(())) | Err(_) => {}
            }
            // A newer utterance owns the state now; leave it alone.
            state.send_if_modified(|current| {
                if *current == (SpeakingState::Speaking { utterance: id }) {
                    *current = SpeakingState::Idle;
                    true
                } else {
                    false
                }
            });
        });

        Ok(())
    }

    pub fn stop(&mut self) {
        self.cancel_active();
        self.state.send_replace(SpeakingState::Idle);
    }

    fn cancel_active(&mut self) {
        if let Some(cancel) = self.active.take() {
            let _ = cancel.send(());
        }
    }
}

impl<E> Drop for TextToSpeech<E> {
    fn drop(&mut self) {
        if let Some(cancel) = self.active.take() {
            let _ = cancel.send(());
        }
    }
}

fn default_voice<'a>(voices: &'a [Voice], language: &str) -> Option<&'a Voice> {
    let language = language.to_lowercase();
    voices
        .iter()
        .find(|v| v.language.to_lowercase().starts_with(&language))
        .or_else(|| voices.first())
}

#[cfg(test)]
pub(crate) mod test_engine {
    use super::*;
    use std::sync::Mutex;

    /// Records every utterance and lets the test finish or observe them.
    #[derive(Clone, Default)]
    pub struct RecordingEngine {
        pub voices: Vec<Voice>,
        pub spoken: Arc<Mutex<Vec<String>>>,
        pub live: Arc<Mutex<Vec<LiveUtterance>>>,
        pub unsupported: bool,
    }

    pub struct LiveUtterance {
        pub finish: Option<oneshot::Sender<Result<(), SpeechError>>>,
        pub cancelled: oneshot::Receiver<()>,
    }

    impl LiveUtterance {
        pub fn was_cancelled(&mut self) -> bool {
            matches!(self.cancelled.try_recv(), Ok(()))
        }
    }

    impl SynthesisEngine for RecordingEngine {
        fn is_supported(&self) -> bool {
            !self.unsupported
        }

        fn voices(&self) -> Vec<Voice> {
            self.voices.clone()
        }

        fn speak(&self, text: &str, _voice: Option<&Voice>) -> Result<Utterance, SpeechError> {
            let (done_tx, done_rx) = oneshot::channel();
            let (cancel_tx, cancel_rx) = oneshot::channel();
            self.spoken.lock().unwrap().push(text.to_string());
            self.live.lock().unwrap().push(LiveUtterance {
                finish: Some(done_tx),
                cancelled: cancel_rx,
            });
            Ok(Utterance {
                done: done_rx,
                cancel: cancel_tx,
            })
        }
    }

    pub fn voice(id: &str, language: &str) -> Voice {
        Voice {
            id: id.to_string(),
            name: id.to_string(),
            language: language.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_engine::{voice, RecordingEngine};
    use super::*;
    use pretty_assertions::assert_eq;

    fn engine_with_voices() -> RecordingEngine {
        RecordingEngine {
            voices: vec![voice("hindi", "hi-IN"), voice("nepali", "ne"), voice("english", "en-US")],
            ..Default::default()
        }
    }

    #[test]
    fn default_voice_prefers_app_language() {
        let tts = TextToSpeech::new(engine_with_voices(), "en", None);
        assert_eq!(tts.selected_voice().map(|v| v.id.as_str()), Some("english"));
    }

    #[test]
    fn default_voice_falls_back_to_first() {
        let tts = TextToSpeech::new(engine_with_voices(), "fr", None);
        assert_eq!(tts.selected_voice().map(|v| v.id.as_str()), Some("hindi"));
    }

    #[test]
    fn preferred_voice_wins_when_present() {
        let tts = TextToSpeech::new(engine_with_voices(), "en", Some("nepali"));
        assert_eq!(tts.selected_voice().map(|v| v.id.as_str()), Some("nepali"));
    }

    #[test]
    fn cycle_wraps_around() {
        let mut tts = TextToSpeech::new(engine_with_voices(), "en", None);
        assert_eq!(tts.cycle_voice().map(|v| v.id.clone()), Some("hindi".to_string()));
        assert_eq!(tts.cycle_voice().map(|v| v.id.clone()), Some("nepali".to_string()));
    }

    #[tokio::test]
    async fn speak_strips_markdown_and_reports_speaking() {
        let engine = engine_with_voices();
        let spoken = Arc::clone(&engine.spoken);
        let mut tts = TextToSpeech::new(engine, "en", None);

        tts.speak("## Rights\n**Article 16** [text](http://x)").unwrap();

        assert!(tts.is_speaking());
        assert_eq!(spoken.lock().unwrap().as_slice(), &["Rights\nArticle 16 text".to_string()]);
    }

    #[tokio::test]
    async fn second_speak_cancels_the_first() {
        let engine = engine_with_voices();
        let live = Arc::clone(&engine.live);
        let mut tts = TextToSpeech::new(engine, "en", None);

        tts.speak("first").unwrap();
        tts.speak("second").unwrap();

        let mut live = live.lock().unwrap();
        assert_eq!(live.len(), 2);
        assert!(live[0].was_cancelled());
        assert!(!live[1].was_cancelled());
        drop(live);

        assert_eq!(tts.state(), SpeakingState::Speaking { utterance: 2 });
    }

    #[tokio::test]
    async fn natural_completion_returns_to_idle() {
        let engine = engine_with_voices();
        let live = Arc::clone(&engine.live);
        let mut tts = TextToSpeech::new(engine, "en", None);
        let mut states = tts.subscribe();

        tts.speak("hello").unwrap();
        states.borrow_and_update();

        let finish = live.lock().unwrap()[0].finish.take().unwrap();
        finish.send(Ok(())).unwrap();

        states.changed().await.unwrap();
        assert_eq!(*states.borrow(), SpeakingState::Idle);
        assert!(!tts.is_speaking());
    }

    #[tokio::test]
    async fn stale_completion_does_not_end_newer_utterance() {
        let engine = engine_with_voices();
        let live = Arc::clone(&engine.live);
        let mut tts = TextToSpeech::new(engine, "en", None);

        tts.speak("first").unwrap();
        tts.speak("second").unwrap();

        let finish = live.lock().unwrap()[0].finish.take().unwrap();
        finish.send(Ok(())).unwrap();
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        assert_eq!(tts.state(), SpeakingState::Speaking { utterance: 2 });
    }

    #[tokio::test]
    async fn engine_error_returns_to_idle() {
        let engine = engine_with_voices();
        let live = Arc::clone(&engine.live);
        let mut tts = TextToSpeech::new(engine, "en", None);
        let mut states = tts.subscribe();

        tts.speak("hello").unwrap();
        states.borrow_and_update();

        let finish = live.lock().unwrap()[0].finish.take().unwrap();
        finish.send(Err(SpeechError::Engine("device busy".into()))).unwrap();

        states.changed().await.unwrap();
        assert_eq!(*states.borrow(), SpeakingState::Idle);
    }

    #[tokio::test]
    async fn stop_cancels_immediately() {
        let engine = engine_with_voices();
        let live = Arc::clone(&engine.live);
        let mut tts = TextToSpeech::new(engine, "en", None);

        tts.speak("hello").unwrap();
        tts.stop();

        assert!(!tts.is_speaking());
        assert!(live.lock().unwrap()[0].was_cancelled());
    }

    #[test]
    fn unsupported_engine_refuses_to_speak() {
        let engine = RecordingEngine {
            unsupported: true,
            ..Default::default()
        };
        let mut tts = TextToSpeech::new(engine, "en", None);

        assert!(!tts.is_supported());
        assert!(matches!(tts.speak("hi"), Err(SpeechError::Unsupported)));
        assert!(!tts.is_speaking());
    }
}
