use crate::categories::Service;
use crate::conversation::Conversation;

pub const DEFAULT_COMPACT_WIDTH: u16 = 100;

/// Which top-level panel is visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    Welcome,
    CategoryBrowser,
    Conversation,
}

/// Tracks the browser toggle, sidebar visibility and terminal width. The
/// current [`ViewMode`] is derived, never stored.
#[derive(Debug, Clone)]
pub struct ViewController {
    browser_open: bool,
    sidebar_open: bool,
    viewport_width: u16,
    compact_width: u16,
}

impl ViewController {
    pub fn new(viewport_width: u16, compact_width: u16) -> Self {
        Self {
            browser_open: false,
            sidebar_open: true,
            viewport_width,
            compact_width,
        }
    }

    pub fn mode(&self, conversation: &Conversation) -> ViewMode {
        if self.browser_open {
            ViewMode::CategoryBrowser
        } else if conversation.is_empty() {
            ViewMode::Welcome
        } else {
            ViewMode::Conversation
        }
    }

    pub fn browser_open(&self) -> bool {
        self.browser_open
    }

    pub fn sidebar_open(&self) -> bool {
        self.sidebar_open
    }

    pub fn is_compact(&self) -> bool {
        self.viewport_width < self.compact_width
    }

    pub fn toggle_browser(&mut self) {
        self.browser_open = !self.browser_open;
    }

    pub fn close_browser(&mut self) {
        self.browser_open = false;
    }

    pub fn toggle_sidebar(&mut self) {
        self.sidebar_open = !self.sidebar_open;
    }

    pub fn on_resize(&mut self, width: u16) {
        self.viewport_width = width;
    }

    /// Called after a message was accepted. Narrow terminals give the chat
    /// the full width.
    pub fn on_message_sent(&mut self) {
        if self.is_compact() && self.sidebar_open {
            tracing::debug!(width = self.viewport_width, "collapsing sidebar");
            self.sidebar_open = false;
        }
    }

    /// "New chat": drop the history and return to the welcome view.
    pub fn new_chat(&mut self, conversation: &mut Conversation) {
        conversation.reset();
        self.browser_open = false;
    }

    /// Selecting a service closes the browser and yields the question to ask.
    pub fn select_service(&mut self, service: &Service) -> String {
        self.browser_open = false;
        service_question(&service.service_name)
    }

    /// Selecting a bundled topic closes the browser and yields its query.
    pub fn select_topic(&mut self, query: &str) -> String {
        self.browser_open = false;
        query.to_string()
    }
}

pub fn service_question(service_name: &str) -> String {
    format!("Tell me about {}", service_name)
}
