use ratatui::layout::Rect;
use tokio::sync::mpsc;

use crate::chat::{ChatClient, ChatMessage};
use crate::config::Config;
use crate::format;
use crate::tui::AppEvent;

/// Fixed reply appended as an assistant turn when a request fails.
pub const ERROR_REPLY: &str = "❌ Xin lỗi, đã xảy ra lỗi khi xử lý yêu cầu của bạn.";

/// How long "Copied!" feedback stays visible, in 300ms ticks (~1.8s).
pub const COPY_FEEDBACK_TICKS: u8 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,

    // Conversation state: append-only history, seeded with the greeting.
    pub messages: Vec<ChatMessage>,
    // Single-flight guard: true while a request is outstanding. Checked
    // before anything is appended or sent; there is no queueing.
    pub busy: bool,
    // Accumulator for the in-flight assistant reply
    pub stream_buffer: String,

    // Input state
    pub input: String,
    pub cursor: usize, // cursor position in input, in chars

    // Transcript scroll state
    pub chat_scroll: u16,
    pub chat_height: u16, // inner height of the transcript area
    pub chat_width: u16,  // inner width, for wrap estimates
    pub total_chat_lines: u16,

    // Code block selection (for copy)
    pub selected_block: Option<usize>,
    pub copy_feedback: Option<u8>, // remaining ticks of "Copied!"

    // Transient footer notice (transcript export result)
    pub notice: Option<(String, u8)>,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Transcript area for mouse hit-testing (updated during render)
    pub chat_area: Option<Rect>,

    pub client: ChatClient,
    pub config: Config,
    pub events: mpsc::UnboundedSender<AppEvent>,
}

impl App {
    pub fn new(config: Config, events: mpsc::UnboundedSender<AppEvent>) -> Self {
        let client = ChatClient::new(config.api_url());
        let greeting = ChatMessage::assistant(config.greeting());

        Self {
            should_quit: false,
            input_mode: InputMode::Editing,

            messages: vec![greeting],
            busy: false,
            stream_buffer: String::new(),

            input: String::new(),
            cursor: 0,

            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            total_chat_lines: 0,

            selected_block: None,
            copy_feedback: None,

            notice: None,

            animation_frame: 0,

            chat_area: None,

            client,
            config,
            events,
        }
    }

    /// Start a new turn. Returns the full history to POST, or `None` when the
    /// input is blank or a request is already in flight (silently ignored).
    ///
    /// On success the user message is already appended, the input is cleared,
    /// and the input affordances are disabled until the stream resolves.
    pub fn begin_submit(&mut self) -> Option<Vec<ChatMessage>> {
        let text = self.input.trim();
        if text.is_empty() || self.busy {
            return None;
        }

        self.messages.push(ChatMessage::user(text));
        self.input.clear();
        self.cursor = 0;
        self.busy = true;
        self.stream_buffer.clear();
        self.input_mode = InputMode::Normal;
        self.scroll_to_bottom();

        Some(self.messages.clone())
    }

    /// Append one streamed fragment to the in-flight reply.
    pub fn apply_delta(&mut self, fragment: &str) {
        self.stream_buffer.push_str(fragment);
        self.scroll_to_bottom();
    }

    /// Stream closed normally: the accumulated buffer becomes an assistant
    /// turn and the UI goes interactive again.
    pub fn finish_stream(&mut self) {
        let reply = std::mem::take(&mut self.stream_buffer);
        self.messages.push(ChatMessage::assistant(reply));
        self.end_turn();
    }

    /// Request or stream failed: discard the partial buffer and surface the
    /// fixed error reply as an assistant turn.
    pub fn fail_stream(&mut self) {
        self.stream_buffer.clear();
        self.messages.push(ChatMessage::assistant(ERROR_REPLY));
        self.end_turn();
    }

    // Shared "finally" path: typing indicator off, guard cleared, focus back
    // in the input box.
    fn end_turn(&mut self) {
        self.busy = false;
        self.input_mode = InputMode::Editing;
        self.scroll_to_bottom();
    }

    /// Tick animation frame and expire transient feedback (Tick event)
    pub fn tick(&mut self) {
        if self.busy {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
        if let Some(ticks) = self.copy_feedback {
            self.copy_feedback = ticks.checked_sub(1);
        }
        if let Some((text, ticks)) = self.notice.take() {
            if let Some(remaining) = ticks.checked_sub(1) {
                self.notice = Some((text, remaining));
            }
        }
    }

    pub fn set_notice(&mut self, text: impl Into<String>) {
        self.notice = Some((text.into(), COPY_FEEDBACK_TICKS));
    }

    /// Every fenced code block in the completed transcript, in order.
    pub fn code_blocks(&self) -> Vec<(String, String)> {
        let bodies: Vec<&str> = self.messages.iter().map(|m| m.content.as_str()).collect();
        format::collect_code_blocks(&bodies)
    }

    pub fn select_next_block(&mut self) {
        let count = self.code_blocks().len();
        if count == 0 {
            return;
        }
        self.selected_block = Some(match self.selected_block {
            Some(i) => (i + 1).min(count - 1),
            None => 0,
        });
        self.copy_feedback = None;
    }

    pub fn select_prev_block(&mut self) {
        let count = self.code_blocks().len();
        if count == 0 {
            return;
        }
        self.selected_block = Some(match self.selected_block {
            Some(i) => i.saturating_sub(1),
            None => count - 1,
        });
        self.copy_feedback = None;
    }

    /// The selected code block's plain text, defaulting to the most recent
    /// block when nothing is selected yet.
    pub fn selected_block_code(&mut self) -> Option<String> {
        let blocks = self.code_blocks();
        if blocks.is_empty() {
            return None;
        }
        let idx = match self.selected_block {
            Some(i) if i < blocks.len() => i,
            _ => blocks.len() - 1,
        };
        self.selected_block = Some(idx);
        Some(blocks[idx].1.clone())
    }

    // Transcript scrolling
    pub fn scroll_down(&mut self, amount: u16) {
        let max_scroll = self.total_chat_lines.saturating_sub(self.chat_height);
        self.chat_scroll = self.chat_scroll.saturating_add(amount).min(max_scroll);
    }

    pub fn scroll_up(&mut self, amount: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(amount);
    }

    pub fn scroll_half_page_down(&mut self) {
        self.scroll_down(self.chat_height / 2);
    }

    pub fn scroll_half_page_up(&mut self) {
        self.scroll_up(self.chat_height / 2);
    }

    /// Keep the newest content visible as the reply streams in. Estimates
    /// wrapped line counts from the transcript width; the estimate only has
    /// to err on the side of scrolling far enough.
    pub fn scroll_to_bottom(&mut self) {
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let count_body = |content: &str| -> u16 {
            let mut n = 0u16;
            for line in content.lines() {
                // Character count, not byte length, for proper UTF-8 handling
                let char_count = line.chars().count();
                if char_count == 0 {
                    n += 1;
                } else {
                    n += ((char_count / wrap_width) + 1) as u16;
                }
            }
            n
        };

        let mut total_lines: u16 = 0;
        for msg in &self.messages {
            total_lines += 1; // Role line ("You:" or "AI:")
            total_lines += count_body(&msg.content);
            total_lines += 1; // Blank line after message
        }

        if self.busy {
            total_lines += 1; // "AI:" line
            total_lines += count_body(&self.stream_buffer);
            total_lines += 1; // typing indicator
        }

        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };

        if total_lines > visible_height {
            self.chat_scroll = total_lines.saturating_sub(visible_height);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatRole;
    use crate::config::DEFAULT_GREETING;

    fn test_app() -> App {
        let (tx, _rx) = mpsc::unbounded_channel();
        App::new(Config::new(), tx)
    }

    #[test]
    fn starts_with_seeded_greeting() {
        let app = test_app();
        assert_eq!(app.messages.len(), 1);
        assert_eq!(app.messages[0].role, ChatRole::Assistant);
        assert_eq!(app.messages[0].content, DEFAULT_GREETING);
        assert!(!app.busy);
    }

    #[test]
    fn submit_appends_exactly_one_user_message() {
        let mut app = test_app();
        app.input = "  hello there  ".to_string();

        let payload = app.begin_submit().expect("should start a request");

        assert_eq!(app.messages.len(), 2);
        assert_eq!(app.messages[1].role, ChatRole::User);
        assert_eq!(app.messages[1].content, "hello there");
        // Payload is the full history including the new turn
        assert_eq!(payload.len(), 2);
        assert!(app.busy);
        assert!(app.input.is_empty());
        assert_eq!(app.input_mode, InputMode::Normal);
    }

    #[test]
    fn blank_input_is_a_no_op() {
        let mut app = test_app();
        app.input = "   ".to_string();
        assert!(app.begin_submit().is_none());
        assert_eq!(app.messages.len(), 1);
        assert!(!app.busy);
    }

    #[test]
    fn submit_while_busy_is_a_no_op() {
        let mut app = test_app();
        app.input = "first".to_string();
        app.begin_submit().unwrap();

        app.input = "second".to_string();
        assert!(app.begin_submit().is_none());
        assert_eq!(app.messages.len(), 2);
        // Rejected input stays in the box
        assert_eq!(app.input, "second");
    }

    #[test]
    fn streamed_fragments_become_one_assistant_turn() {
        let mut app = test_app();
        app.input = "hi".to_string();
        app.begin_submit().unwrap();

        app.apply_delta("Hel");
        app.apply_delta("lo");
        app.finish_stream();

        assert_eq!(app.messages.last().unwrap().content, "Hello");
        assert_eq!(app.messages.last().unwrap().role, ChatRole::Assistant);
        assert!(!app.busy);
        assert_eq!(app.input_mode, InputMode::Editing);
        assert!(app.stream_buffer.is_empty());
    }

    #[test]
    fn failure_discards_partial_reply_and_appends_error_text() {
        let mut app = test_app();
        app.input = "hi".to_string();
        app.begin_submit().unwrap();

        app.apply_delta("partial");
        app.fail_stream();

        // Exactly one assistant message was added, with the fixed error text
        assert_eq!(app.messages.len(), 3);
        assert_eq!(app.messages.last().unwrap().content, ERROR_REPLY);
        assert!(app.stream_buffer.is_empty());
        assert!(!app.busy);

        // And submit works again
        app.input = "retry".to_string();
        assert!(app.begin_submit().is_some());
    }

    #[test]
    fn completed_turn_restores_input_focus() {
        let mut app = test_app();
        app.input = "hi".to_string();
        app.begin_submit().unwrap();
        assert_eq!(app.input_mode, InputMode::Normal);

        app.finish_stream();
        assert_eq!(app.input_mode, InputMode::Editing);
    }

    #[test]
    fn animation_only_advances_while_busy() {
        let mut app = test_app();
        app.tick();
        assert_eq!(app.animation_frame, 0);

        app.input = "hi".to_string();
        app.begin_submit().unwrap();
        app.tick();
        assert_eq!(app.animation_frame, 1);
    }

    #[test]
    fn copy_feedback_expires_after_its_ticks() {
        let mut app = test_app();
        app.copy_feedback = Some(COPY_FEEDBACK_TICKS);
        for _ in 0..=COPY_FEEDBACK_TICKS {
            app.tick();
        }
        assert!(app.copy_feedback.is_none());
    }

    #[test]
    fn block_selection_cycles_within_bounds() {
        let mut app = test_app();
        app.messages
            .push(ChatMessage::assistant("```js\na\n```\n```py\nb\n```"));

        app.select_next_block();
        assert_eq!(app.selected_block, Some(0));
        app.select_next_block();
        assert_eq!(app.selected_block, Some(1));
        app.select_next_block();
        assert_eq!(app.selected_block, Some(1));

        assert_eq!(app.selected_block_code().unwrap(), "b\n");
    }

    #[test]
    fn copy_defaults_to_most_recent_block() {
        let mut app = test_app();
        app.messages.push(ChatMessage::assistant("```js\nfirst\n```"));
        app.messages.push(ChatMessage::assistant("```js\nlast\n```"));
        assert_eq!(app.selected_block_code().unwrap(), "last\n");
    }
}
