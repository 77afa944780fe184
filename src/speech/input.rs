use tokio::sync::{mpsc, oneshot, watch};

use super::SpeechError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionResult {
    pub text: String,
    pub is_final: bool,
}

/// A live recognition stream. Results arrive on `results`; the stream ends
/// when the engine stops or `stop` is signalled.
pub struct RecognitionSession {
    pub results: mpsc::UnboundedReceiver<RecognitionResult>,
    pub stop: oneshot::Sender<()>,
}

pub trait RecognitionEngine: Send + Sync {
    fn is_supported(&self) -> bool;
    fn start(&self) -> Result<RecognitionSession, SpeechError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListeningState {
    Idle,
    Listening,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    Result(RecognitionResult),
    Ended,
}

/// Voice input adapter: accumulates finalized text in `transcript` and the
/// engine's current guess in `interim_transcript`.
pub struct SpeechToText<E> {
    engine: E,
    is_supported: bool,
    transcript: String,
    interim_transcript: String,
    session: Option<RecognitionSession>,
    state: watch::Sender<ListeningState>,
}

impl<E: RecognitionEngine> SpeechToText<E> {
    pub fn new(engine: E) -> Self {
        let (state, _) = watch::channel(ListeningState::Idle);
        let is_supported = engine.is_supported();
        tracing::debug!(is_supported, "speech input initialized");

        Self {
            engine,
            is_supported,
            transcript: String::new(),
            interim_transcript: String::new(),
            session: None,
            state,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.is_supported
    }

    pub fn is_listening(&self) -> bool {
        *self.state.borrow() == ListeningState::Listening
    }

    pub fn subscribe(&self) -> watch::Receiver<ListeningState> {
        self.state.subscribe()
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    pub fn interim_transcript(&self) -> &str {
        &self.interim_transcript
    }

    /// Input field value while listening: finalized text followed by the
    /// current guess.
    pub fn live_text(&self) -> String {
        format!("{} {}", self.transcript, self.interim_transcript)
            .trim()
            .to_string()
    }

    /// No-op when unsupported or already listening.
    pub fn start_listening(&mut self) -> Result<(), SpeechError> {
        if !self.is_supported || self.is_listening() {
            return Ok(());
        }

        let session = self.engine.start()?;
        self.session = Some(session);
        self.state.send_replace(ListeningState::Listening);
        tracing::debug!("speech input: idle -> listening");
        Ok(())
    }

    /// End recognition. Text the engine has not finalized is dropped.
    pub fn stop_listening(&mut self) {
        if let Some(session) = self.session.take() {
            let _ = session.stop.send(());
        }
        self.interim_transcript.clear();
        if self.state.send_replace(ListeningState::Idle) == ListeningState::Listening {
            tracing::debug!("speech input: listening -> idle");
        }
    }

    pub fn reset_transcript(&mut self) {
        self.transcript.clear();
        self.interim_transcript.clear();
    }

    /// Wait for the next engine event. Pends forever while idle, so it can
    /// sit in a `select!` next to other event sources.
    pub async fn next_event(&mut self) -> RecognitionEvent {
        match self.session.as_mut() {
            Some(session) => match session.results.recv().await {
                Some(result) => RecognitionEvent::Result(result),
                None => RecognitionEvent::Ended,
            },
            None => std::future::pending().await,
        }
    }

    pub fn apply(&mut self, event: RecognitionEvent) {
        match event {
            RecognitionEvent::Result(result) if result.is_final => {
                let text = result.text.trim();
                if !text.is_empty() {
                    if !self.transcript.is_empty() {
                        self.transcript.push(' ');
                    }
                    self.transcript.push_str(text);
                }
                self.interim_transcript.clear();
            }
            RecognitionEvent::Result(result) => {
                self.interim_transcript = result.text.trim().to_string();
            }
            RecognitionEvent::Ended => {
                self.session = None;
                self.interim_transcript.clear();
                self.state.send_replace(ListeningState::Idle);
                tracing::debug!("speech input ended by engine");
            }
        }
    }
}
