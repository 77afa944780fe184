use ratatui::layout::Rect;
use ratatui::widgets::ListState;
use std::collections::HashSet;
use tokio::task::{JoinError, JoinHandle};

use crate::api::{Answer, ApiError, LegalAiClient};
use crate::categories::{bundled_categories, Category, Service, ServiceDirectory, SUGGESTIONS};
use crate::config::Config;
use crate::conversation::{Conversation, Role};
use crate::speech::{
    CommandRecognizer, CommandSynthesizer, RecognitionEvent, SpeechToText, TextToSpeech,
};
use crate::view::{ViewController, ViewMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BrowserTab {
    #[default]
    Topics,
    Services,
}

/// One visible line of the category browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserRow {
    TopicCategory { index: usize, expanded: bool },
    Topic { category: usize, index: usize },
    ServiceCategory { name: String, count: usize, expanded: bool },
    Service { category: String, index: usize },
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub conversation: Conversation,
    pub view: ViewController,

    // Input box
    pub input: String,
    pub input_cursor: usize,
    /// What was typed before voice input started; dictation is appended to it.
    pub input_before_listening: String,

    // Backend
    pub api: LegalAiClient,
    pub top_k: u32,
    pub use_llm: bool,
    pub query_task: Option<JoinHandle<Result<Answer, ApiError>>>,
    pub health_task: Option<JoinHandle<bool>>,
    pub api_healthy: Option<bool>,

    // Welcome view
    pub suggestion_state: ListState,

    // Category browser
    pub browser_tab: BrowserTab,
    pub browser_state: ListState,
    pub topics: Vec<Category>,
    pub services: ServiceDirectory,
    pub expanded_topics: HashSet<String>,
    pub expanded_services: HashSet<String>,

    // Conversation view
    pub selected_message: Option<usize>,
    pub expanded_sources: HashSet<usize>,
    pub chat_scroll: u16,
    pub chat_follow: bool,
    pub chat_height: u16,

    // Layout areas for mouse hit-testing
    pub main_area: Option<Rect>,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Speech
    pub voice_input: SpeechToText<CommandRecognizer>,
    pub voice_output: TextToSpeech<CommandSynthesizer>,

    /// One-line notice shown in the footer.
    pub status: Option<String>,
}

impl App {
    pub async fn new(config: &Config, viewport_width: u16) -> anyhow::Result<Self> {
        let api = LegalAiClient::new(&config.api_base_url());
        let topics = bundled_categories()?;

        let services = match ServiceDirectory::locate(config.services_path.as_deref()) {
            Some(source) => ServiceDirectory::load(&source, &api)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!("service directory unavailable ({}): {}", source, e);
                    ServiceDirectory::new()
                }),
            None => ServiceDirectory::new(),
        };

        let voice_input = SpeechToText::new(CommandRecognizer::detect(config.stt_command.as_deref()));

        // Listing voices runs the synthesizer and waits for it
        let tts_command = config.tts_command.clone();
        let language = config.language().to_string();
        let preferred_voice = config.speech_voice.clone();
        let voice_output = tokio::task::spawn_blocking(move || {
            TextToSpeech::new(
                CommandSynthesizer::detect(tts_command.as_deref()),
                &language,
                preferred_voice.as_deref(),
            )
        })
        .await?;

        let mut app = Self::with_parts(
            api,
            config,
            topics,
            services,
            voice_input,
            voice_output,
            viewport_width,
        );

        let probe = app.api.clone();
        app.health_task = Some(tokio::spawn(async move { probe.check_health().await }));

        Ok(app)
    }

    pub fn with_parts(
        api: LegalAiClient,
        config: &Config,
        topics: Vec<Category>,
        services: ServiceDirectory,
        voice_input: SpeechToText<CommandRecognizer>,
        voice_output: TextToSpeech<CommandSynthesizer>,
        viewport_width: u16,
    ) -> Self {
        let mut suggestion_state = ListState::default();
        suggestion_state.select(Some(0));

        Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            conversation: Conversation::new(),
            view: ViewController::new(viewport_width, config.compact_width()),

            input: String::new(),
            input_cursor: 0,
            input_before_listening: String::new(),

            api,
            top_k: config.top_k(),
            use_llm: config.use_llm(),
            query_task: None,
            health_task: None,
            api_healthy: None,

            suggestion_state,

            browser_tab: BrowserTab::default(),
            browser_state: ListState::default(),
            topics,
            services,
            expanded_topics: HashSet::new(),
            expanded_services: HashSet::new(),

            selected_message: None,
            expanded_sources: HashSet::new(),
            chat_scroll: 0,
            chat_follow: true,
            chat_height: 0,

            main_area: None,

            animation_frame: 0,

            voice_input,
            voice_output,

            status: None,
        }
    }

    pub fn mode(&self) -> ViewMode {
        self.view.mode(&self.conversation)
    }

    // Asking questions

    /// Send the input box contents.
    pub fn submit_input(&mut self) -> bool {
        let text = self.input.clone();
        if !self.submit_question(&text) {
            return false;
        }

        if self.voice_input.is_listening() {
            self.voice_input.stop_listening();
        }
        self.voice_input.reset_transcript();
        self.input.clear();
        self.input_cursor = 0;
        self.input_before_listening.clear();
        true
    }

    /// Hand a question to the conversation and, if accepted, dispatch it.
    pub fn submit_question(&mut self, text: &str) -> bool {
        let Some(question) = self.conversation.submit(text) else {
            return false;
        };

        self.view.on_message_sent();
        self.selected_message = None;
        self.chat_follow = true;

        let api = self.api.clone();
        let (top_k, use_llm) = (self.top_k, self.use_llm);
        self.query_task = Some(tokio::spawn(async move {
            api.search_and_answer(&question, top_k, use_llm).await
        }));

        true
    }

    /// Record the outcome of the background request.
    pub fn finish_query(&mut self, outcome: Result<Result<Answer, ApiError>, JoinError>) {
        self.query_task = None;

        let outcome = outcome.unwrap_or_else(|e| {
            tracing::warn!("question task failed: {}", e);
            Err(ApiError::Aborted)
        });
        self.conversation.resolve(outcome);
        self.chat_follow = true;
    }

    pub fn finish_health_check(&mut self, outcome: Result<bool, JoinError>) {
        self.health_task = None;
        let healthy = outcome.unwrap_or(false);
        tracing::info!(healthy, "API health probe finished");
        self.api_healthy = Some(healthy);
    }

    pub fn new_chat(&mut self) {
        self.view.new_chat(&mut self.conversation);
        self.selected_message = None;
        self.expanded_sources.clear();
        self.chat_scroll = 0;
        self.chat_follow = true;
        self.voice_output.stop();
        self.suggestion_state.select(Some(0));
    }

    // Welcome suggestions

    pub fn suggestion_nav_down(&mut self) {
        let i = self.suggestion_state.selected().unwrap_or(0);
        self.suggestion_state
            .select(Some((i + 1).min(SUGGESTIONS.len() - 1)));
    }

    pub fn suggestion_nav_up(&mut self) {
        let i = self.suggestion_state.selected().unwrap_or(0);
        self.suggestion_state.select(Some(i.saturating_sub(1)));
    }

    pub fn activate_suggestion(&mut self) -> bool {
        match self.suggestion_state.selected().and_then(|i| SUGGESTIONS.get(i)) {
            Some(suggestion) => self.submit_question(suggestion.query),
            None => false,
        }
    }

    // Category browser

    pub fn toggle_browser(&mut self) {
        self.view.toggle_browser();
        if self.view.browser_open() && self.browser_state.selected().is_none() {
            self.browser_state.select(Some(0));
        }
    }

    pub fn switch_browser_tab(&mut self) {
        self.browser_tab = match self.browser_tab {
            BrowserTab::Topics => BrowserTab::Services,
            BrowserTab::Services => BrowserTab::Topics,
        };
        self.browser_state.select(Some(0));
    }

    pub fn browser_rows(&self) -> Vec<BrowserRow> {
        let mut rows = Vec::new();

        match self.browser_tab {
            BrowserTab::Topics => {
                for (index, category) in self.topics.iter().enumerate() {
                    let expanded = self.expanded_topics.contains(&category.id);
                    rows.push(BrowserRow::TopicCategory { index, expanded });
                    if expanded {
                        rows.extend(
                            (0..category.subcategories.len())
                                .map(|i| BrowserRow::Topic { category: index, index: i }),
                        );
                    }
                }
            }
            BrowserTab::Services => {
                for (name, services) in self.services.categories() {
                    let expanded = self.expanded_services.contains(name);
                    rows.push(BrowserRow::ServiceCategory {
                        name: name.to_string(),
                        count: services.len(),
                        expanded,
                    });
                    if expanded {
                        rows.extend((0..services.len()).map(|i| BrowserRow::Service {
                            category: name.to_string(),
                            index: i,
                        }));
                    }
                }
            }
        }

        rows
    }

    pub fn browser_nav_down(&mut self) {
        let len = self.browser_rows().len();
        if len > 0 {
            let i = self.browser_state.selected().unwrap_or(0);
            self.browser_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn browser_nav_up(&mut self) {
        let i = self.browser_state.selected().unwrap_or(0);
        self.browser_state.select(Some(i.saturating_sub(1)));
    }

    fn selected_browser_row(&self) -> Option<BrowserRow> {
        let i = self.browser_state.selected()?;
        self.browser_rows().into_iter().nth(i)
    }

    /// Enter on a category expands or collapses it; on a leaf it asks the
    /// question and closes the browser.
    pub fn browser_activate(&mut self) -> bool {
        match self.selected_browser_row() {
            Some(BrowserRow::TopicCategory { index, .. }) => {
                if let Some(id) = self.topics.get(index).map(|c| c.id.clone()) {
                    toggle(&mut self.expanded_topics, id);
                }
                false
            }
            Some(BrowserRow::ServiceCategory { name, .. }) => {
                toggle(&mut self.expanded_services, name);
                false
            }
            Some(BrowserRow::Topic { category, index }) => {
                let query = match self
                    .topics
                    .get(category)
                    .and_then(|c| c.subcategories.get(index))
                {
                    Some(topic) => topic.query.clone(),
                    None => return false,
                };
                let question = self.view.select_topic(&query);
                self.submit_question(&question)
            }
            Some(BrowserRow::Service { category, index }) => {
                let service: Option<Service> =
                    self.services.services_in(&category).get(index).cloned();
                match service {
                    Some(service) => {
                        let question = self.view.select_service(&service);
                        self.submit_question(&question)
                    }
                    None => false,
                }
            }
            None => false,
        }
    }

    /// Collapse the category of the selected row.
    pub fn browser_collapse(&mut self) {
        let Some(row) = self.selected_browser_row() else {
            return;
        };

        match row {
            BrowserRow::TopicCategory { index, .. } | BrowserRow::Topic { category: index, .. } => {
                if let Some(id) = self.topics.get(index).map(|c| c.id.clone()) {
                    self.expanded_topics.remove(&id);
                    self.select_topic_header(index);
                }
            }
            BrowserRow::ServiceCategory { name, .. } | BrowserRow::Service { category: name, .. } => {
                self.expanded_services.remove(&name);
                let position = self.browser_rows().iter().position(
                    |r| matches!(r, BrowserRow::ServiceCategory { name: n, .. } if *n == name),
                );
                self.browser_state.select(position);
            }
        }
    }

    fn select_topic_header(&mut self, index: usize) {
        let position = self.browser_rows().iter().position(
            |r| matches!(r, BrowserRow::TopicCategory { index: i, .. } if *i == index),
        );
        self.browser_state.select(position);
    }

    // Conversation view

    pub fn message_nav_down(&mut self) {
        let len = self.conversation.messages().len();
        if len == 0 {
            return;
        }
        let next = match self.selected_message {
            Some(i) => (i + 1).min(len - 1),
            None => len - 1,
        };
        self.selected_message = Some(next);
    }

    pub fn message_nav_up(&mut self) {
        let len = self.conversation.messages().len();
        if len == 0 {
            return;
        }
        let next = match self.selected_message {
            Some(i) => i.saturating_sub(1),
            None => len - 1,
        };
        self.selected_message = Some(next);
    }

    /// The selected message if it is an assistant turn, otherwise the latest
    /// assistant turn.
    pub fn target_assistant_message(&self) -> Option<usize> {
        let messages = self.conversation.messages();
        if let Some(i) = self.selected_message {
            if messages.get(i).is_some_and(|m| m.role == Role::Assistant) {
                return Some(i);
            }
        }
        messages.iter().rposition(|m| m.role == Role::Assistant)
    }

    pub fn toggle_sources(&mut self) {
        let Some(i) = self.target_assistant_message() else {
            return;
        };
        if self.conversation.messages()[i].visible_sources().is_some() {
            toggle(&mut self.expanded_sources, i);
        }
    }

    /// Read the target message aloud, or stop if something is being read.
    pub fn toggle_read_aloud(&mut self) {
        if !self.voice_output.is_supported() {
            return;
        }
        if self.voice_output.is_speaking() {
            self.voice_output.stop();
            return;
        }

        let Some(i) = self.target_assistant_message() else {
            return;
        };
        let content = self.conversation.messages()[i].content.clone();
        if let Err(e) = self.voice_output.speak(&content) {
            self.status = Some(format!("Read aloud unavailable: {}", e));
        }
    }

    pub fn cycle_voice(&mut self) {
        if !self.voice_output.is_supported() {
            return;
        }
        let Some(voice) = self.voice_output.cycle_voice().cloned() else {
            self.status = Some("No voices available".to_string());
            return;
        };

        if let Err(e) = Config::save_speech_voice(&voice.id) {
            tracing::warn!("could not persist voice choice: {}", e);
        }
        self.status = Some(format!("Voice: {} ({})", voice.name, voice.language));
    }

    // Voice input

    pub fn toggle_listening(&mut self) {
        if !self.voice_input.is_supported() {
            return;
        }

        if self.voice_input.is_listening() {
            self.stop_listening();
            return;
        }

        self.voice_input.reset_transcript();
        match self.voice_input.start_listening() {
            Ok(()) => {
                self.input_before_listening = self.input.trim_end().to_string();
                self.input_mode = InputMode::Editing;
                self.status = None;
            }
            Err(e) => {
                tracing::warn!("voice input failed to start: {}", e);
                self.status = Some(format!("Voice input failed: {}", e));
            }
        }
    }

    /// Stop dictation, keeping only finalized text in the input box.
    pub fn stop_listening(&mut self) {
        if !self.voice_input.is_listening() {
            return;
        }
        self.voice_input.stop_listening();
        self.sync_input_with_transcript();
    }

    pub fn apply_recognition(&mut self, event: RecognitionEvent) {
        self.voice_input.apply(event);
        self.sync_input_with_transcript();
    }

    /// While listening the input shows finalized and interim text; once idle
    /// only the finalized transcript remains.
    fn sync_input_with_transcript(&mut self) {
        let heard = if self.voice_input.is_listening() {
            self.voice_input.live_text()
        } else {
            self.voice_input.transcript().to_string()
        };

        self.input = match (self.input_before_listening.is_empty(), heard.is_empty()) {
            (true, _) => heard,
            (false, true) => self.input_before_listening.clone(),
            (false, false) => format!("{} {}", self.input_before_listening, heard),
        };
        self.input_cursor = self.input.chars().count();
    }

    // Layout

    pub fn on_resize(&mut self, width: u16) {
        self.view.on_resize(width);
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.conversation.is_pending() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn scroll_down(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_add(1);
    }

    pub fn scroll_up(&mut self) {
        self.chat_follow = false;
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
    }

    pub fn scroll_half_page_down(&mut self) {
        let half = (self.chat_height / 2).max(1);
        self.chat_scroll = self.chat_scroll.saturating_add(half);
    }

    pub fn scroll_half_page_up(&mut self) {
        self.chat_follow = false;
        let half = (self.chat_height / 2).max(1);
        self.chat_scroll = self.chat_scroll.saturating_sub(half);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.chat_follow = true;
    }
}

fn toggle<T: std::hash::Hash + Eq>(set: &mut HashSet<T>, value: T) {
    if !set.remove(&value) {
        set.insert(value);
    }
}

/// Await an optional task; pends forever when there is none.
pub async fn join_task<T>(task: &mut Option<JoinHandle<T>>) -> Result<T, JoinError> {
    match task.as_mut() {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}
