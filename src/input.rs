use iced::keyboard::key::Named;
use iced::keyboard::{Key, Modifiers};
use unicode_width::UnicodeWidthStr;

const LINE_HEIGHT: f32 = 21.0;
const VERTICAL_PADDING: f32 = 18.0;
const MIN_LINES: usize = 1;
const MAX_LINES: usize = 6;

/// Columns the compose box fits at the default panel width. Wrap
/// estimation only has to be close enough for sizing, not exact.
const WRAP_COLUMNS: usize = 44;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitIntent {
    Submit,
    Newline,
    Other,
}

/// Plain Enter submits; Shift+Enter inserts a newline.
pub fn submit_intent(key: &Key, modifiers: Modifiers) -> SubmitIntent {
    match key {
        Key::Named(Named::Enter) if modifiers.shift() => SubmitIntent::Newline,
        Key::Named(Named::Enter) => SubmitIntent::Submit,
        _ => SubmitIntent::Other,
    }
}

/// Trimmed submission text, or None for whitespace-only drafts.
pub fn prepare_submission(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Compose-box height as a pure function of the draft text: the
/// estimated wrapped line count, clamped between MIN_LINES and
/// MAX_LINES, converted to pixels.
pub fn compose_height(text: &str) -> f32 {
    let lines: usize = text
        .split('\n')
        .map(|line| {
            let columns = UnicodeWidthStr::width(line);
            (columns.max(1) - 1) / WRAP_COLUMNS + 1
        })
        .sum();

    lines.clamp(MIN_LINES, MAX_LINES) as f32 * LINE_HEIGHT + VERTICAL_PADDING
}
