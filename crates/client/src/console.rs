use std::collections::VecDeque;

use bomberlan::{Color32, UiSink};

const MAX_CHAT_LINES: usize = 50;
const FADE_SECONDS: f32 = 3.0;

#[derive(Debug, Clone)]
pub struct ChatLine {
    pub name: String,
    pub color: Color32,
    pub message: String,
}

/// Screen-side state the session writes into.
#[derive(Debug)]
pub struct ConsoleUi {
    pub status: String,
    pub status_color: Color32,
    /// Animated statuses get a spinner while they are current.
    pub status_animated: bool,
    pub names: String,
    pub chat: VecDeque<ChatLine>,
    pub fade: Option<(String, f32)>,
}

impl ConsoleUi {
    pub fn new() -> Self {
        Self {
            status: String::new(),
            status_color: Color32::WHITE,
            status_animated: false,
            names: String::new(),
            chat: VecDeque::new(),
            fade: None,
        }
    }

    pub fn update(&mut self, dt: f32) {
        if let Some((_, remaining)) = &mut self.fade {
            *remaining -= dt;
            if *remaining <= 0.0 {
                self.fade = None;
            }
        }
    }

    pub fn fade_text(&self) -> Option<&str> {
        self.fade.as_ref().map(|(text, _)| text.as_str())
    }
}

impl UiSink for ConsoleUi {
    fn set_status_text(&mut self, text: &str, color: Color32, animated: bool) {
        self.status = text.to_string();
        self.status_color = color;
        self.status_animated = animated;
    }

    fn set_player_names(&mut self, names: &str) {
        self.names = names.to_string();
    }

    fn process_chat_string(&mut self, name: &str, color: Color32, message: &str) {
        if self.chat.len() == MAX_CHAT_LINES {
            self.chat.pop_front();
        }
        self.chat.push_back(ChatLine {
            name: name.to_string(),
            color,
            message: message.to_string(),
        });
    }

    fn fade_out_with_text(&mut self, message: &str) {
        self.fade = Some((message.to_string(), FADE_SECONDS));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fade_expires() {
        let mut ui = ConsoleUi::new();
        ui.fade_out_with_text("ann wins!");
        ui.update(1.0);
        assert_eq!(ui.fade_text(), Some("ann wins!"));
        ui.update(2.5);
        assert_eq!(ui.fade_text(), None);
    }

    #[test]
    fn test_chat_history_is_bounded() {
        let mut ui = ConsoleUi::new();
        for i in 0..MAX_CHAT_LINES + 5 {
            ui.process_chat_string("bob", Color32::WHITE, &i.to_string());
        }
        assert_eq!(ui.chat.len(), MAX_CHAT_LINES);
        assert_eq!(ui.chat.front().unwrap().message, "5");
    }
}
