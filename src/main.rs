mod actions;
mod agent;
mod config;
mod input;
mod overlay;
mod session;

use std::time::Duration;

use iced::{
    alignment, clipboard,
    event::{self, Event as IcedEvent},
    keyboard::{self, Key},
    time,
    widget::{button, column, container, row, scrollable, text, text_editor, Space},
    window::{self, Level},
    Border, Element, Font, Length, Padding, Size, Subscription, Task, Theme,
};

use agent::StreamEvent;
use session::{ChatMessage, ChatSession, MessageStatus, Role, Submission};

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

fn main() -> iced::Result {
    let config = config::Config::load();

    // One overlay per process. A second instance has nothing to do.
    let Some(handle) = overlay::mount() else {
        return Ok(());
    };

    let size = Size::new(config.window.width as f32, config.window.height as f32);
    let min_size = Size::new(config.window.min_width as f32, config.window.min_height as f32);

    iced::application("DashPal", App::update, App::view)
        .theme(App::theme)
        .subscription(App::subscription)
        .window(window::Settings {
            size,
            min_size: Some(min_size),
            position: window::Position::Centered,
            ..Default::default()
        })
        .default_font(Font::MONOSPACE)
        .run_with(move || App::new(config, handle))
}

#[derive(Debug, Clone)]
enum Message {
    ToggleOverlay,
    CloseOverlay,
    ComposeAction(text_editor::Action),
    Submit,
    QuickAction(usize),
    Retry(u64),
    Stream(u64, StreamEvent),
    CopyMessage(u64),
    Tick,
}

struct App {
    session: ChatSession,
    compose: text_editor::Content,
    client: reqwest::Client,
    config: config::Config,
    /// Backend session key from the last completed exchange; sent with
    /// every request so the agent sees the whole conversation.
    agent_uid: Option<String>,
    loading_frame: usize,
    _overlay: overlay::OverlayHandle,
}

impl App {
    fn new(config: config::Config, handle: overlay::OverlayHandle) -> (Self, Task<Message>) {
        let app = App {
            session: ChatSession::new(),
            compose: text_editor::Content::new(),
            client: reqwest::Client::new(),
            config,
            agent_uid: None,
            loading_frame: 0,
            _overlay: handle,
        };

        let window_task = window::get_latest()
            .and_then(|id| window::change_level(id, Level::AlwaysOnTop));

        (app, window_task)
    }

    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::ToggleOverlay => {
                self.session.toggle_open();
                if self.session.is_open() {
                    iced::widget::focus_next()
                } else {
                    Task::none()
                }
            }
            Message::CloseOverlay => {
                self.session.set_open(false);
                Task::none()
            }
            Message::ComposeAction(action) => {
                self.compose.perform(action);
                Task::none()
            }
            Message::Submit => {
                let Some(prompt) = input::prepare_submission(&self.compose.text()) else {
                    return Task::none();
                };
                match self.session.submit(&prompt) {
                    Ok(submission) => {
                        self.compose = text_editor::Content::new();
                        self.launch_stream(submission)
                    }
                    Err(_) => Task::none(),
                }
            }
            Message::QuickAction(index) => {
                let Some(action) = actions::QUICK_ACTIONS.get(index) else {
                    return Task::none();
                };
                match self.session.submit(action.prompt) {
                    Ok(submission) => self.launch_stream(submission),
                    Err(_) => Task::none(),
                }
            }
            Message::Retry(message_id) => match self.session.retry(message_id) {
                Ok(submission) => self.launch_stream(submission),
                Err(_) => Task::none(),
            },
            Message::Stream(stream_id, event) => {
                match event {
                    StreamEvent::Token(token) => self.session.push_token(stream_id, &token),
                    StreamEvent::Done { uid } => {
                        if let Some(uid) = uid {
                            self.agent_uid = Some(uid);
                        }
                        self.session.finish_stream(stream_id);
                    }
                    StreamEvent::Failed(reason) => self.session.fail_stream(stream_id, &reason),
                }
                Task::none()
            }
            Message::CopyMessage(id) => {
                let copied = self
                    .session
                    .messages()
                    .iter()
                    .find(|m| m.id == id)
                    .map(|m| m.content.clone());
                match copied {
                    Some(content) => clipboard::write(content),
                    None => Task::none(),
                }
            }
            Message::Tick => {
                if self.session.is_loading() {
                    self.loading_frame = (self.loading_frame + 1) % SPINNER_FRAMES.len();
                }
                Task::none()
            }
        }
    }

    fn launch_stream(&self, submission: Submission) -> Task<Message> {
        let stream = agent::run_exchange(
            self.client.clone(),
            self.config.agent.host.clone(),
            self.agent_uid.clone(),
            submission.prompt,
        );
        let stream_id = submission.stream_id;
        Task::run(stream, move |event| Message::Stream(stream_id, event))
    }

    fn subscription(&self) -> Subscription<Message> {
        let timer = if self.session.is_loading() {
            time::every(Duration::from_millis(80)).map(|_| Message::Tick)
        } else {
            Subscription::none()
        };

        let events = event::listen_with(|event, _status, _id| {
            if let IcedEvent::Keyboard(keyboard::Event::KeyPressed {
                key: Key::Named(keyboard::key::Named::Escape),
                ..
            }) = event
            {
                Some(Message::CloseOverlay)
            } else {
                None
            }
        });

        Subscription::batch([timer, events])
    }

    fn view(&self) -> Element<Message> {
        let is_open = self.session.is_open();

        let toggle = button(text(if is_open { "✕" } else { "💬" }).size(18))
            .on_press(Message::ToggleOverlay)
            .padding(Padding::from([6, 12]))
            .style(toggle_style);

        let header = row![
            text("DashPal").size(16),
            Space::with_width(Length::Fill),
            toggle,
        ]
        .align_y(alignment::Vertical::Center)
        .spacing(10);

        let mut content = column![header].spacing(10).padding(12);
        if is_open {
            content = content.push(self.panel());
        }

        container(content)
            .width(Length::Fill)
            .height(Length::Fill)
            .into()
    }

    fn panel(&self) -> Element<Message> {
        let loading = self.session.is_loading();

        let mut feed = column![].spacing(8).padding(Padding::from([4, 2]));
        if self.session.messages().is_empty() {
            feed = feed.push(
                text("Ask about dashboards, alerts, or logs.")
                    .size(14)
                    .style(dim_text),
            );
        }
        for message in self.session.messages() {
            feed = feed.push(self.bubble(message));
        }
        let feed = scrollable(feed).height(Length::Fill).anchor_bottom();

        let mut quick_row = row![].spacing(6);
        for (i, action) in actions::QUICK_ACTIONS.iter().enumerate() {
            quick_row = quick_row.push(
                button(text(format!("{} {}", action.emoji, action.label)).size(12))
                    .padding(Padding::from([4, 8]))
                    .style(quick_action_style)
                    .on_press_maybe((!loading).then_some(Message::QuickAction(i))),
            );
        }

        let draft = self.compose.text();
        let mut compose = text_editor(&self.compose)
            .placeholder("Ask the dashboard agent...")
            .height(input::compose_height(&draft))
            .key_binding(compose_binding);
        if !loading {
            compose = compose.on_action(Message::ComposeAction);
        }

        let can_send = !loading && input::prepare_submission(&draft).is_some();
        let send = button(text("Send").size(14))
            .padding(Padding::from([8, 14]))
            .on_press_maybe(can_send.then_some(Message::Submit));

        let compose_row = row![compose, send]
            .spacing(8)
            .align_y(alignment::Vertical::Bottom);

        column![feed, quick_row, compose_row]
            .spacing(10)
            .height(Length::Fill)
            .into()
    }

    fn bubble(&self, message: &ChatMessage) -> Element<Message> {
        let waiting = message.role == Role::Assistant
            && message.content.is_empty()
            && !message.is_settled();

        let body: Element<Message> = if waiting {
            text(format!(
                "{} waiting for the agent...",
                SPINNER_FRAMES[self.loading_frame]
            ))
            .size(14)
            .style(dim_text)
            .into()
        } else {
            text(message.content.clone()).size(14).into()
        };

        let mut stack = column![body].spacing(6);

        if message.status == MessageStatus::Errored {
            let reason = message.error.as_deref().unwrap_or("stream failed");
            stack = stack.push(text(reason.to_string()).size(12).style(error_text));
            stack = stack.push(
                button(text("Retry").size(12))
                    .padding(Padding::from([2, 8]))
                    .on_press_maybe(
                        (!self.session.is_loading()).then_some(Message::Retry(message.id)),
                    ),
            );
        }

        if message.role == Role::Assistant
            && message.status == MessageStatus::Complete
            && !message.content.is_empty()
        {
            stack = stack.push(
                button(text("[Copy]").size(11))
                    .padding(0)
                    .style(copy_button_style)
                    .on_press(Message::CopyMessage(message.id)),
            );
        }

        let style: fn(&Theme) -> container::Style = match (message.role, message.status) {
            (Role::User, _) => user_bubble,
            (Role::Assistant, MessageStatus::Errored) => errored_bubble,
            (Role::Assistant, _) => assistant_bubble,
        };
        let bubble = container(stack).padding(10).max_width(320).style(style);

        container(bubble)
            .width(Length::Fill)
            .align_x(match message.role {
                Role::User => alignment::Horizontal::Right,
                Role::Assistant => alignment::Horizontal::Left,
            })
            .into()
    }

    fn theme(&self) -> Theme {
        Theme::TokyoNight
    }
}

fn compose_binding(
    key_press: text_editor::KeyPress,
) -> Option<text_editor::Binding<Message>> {
    match input::submit_intent(&key_press.key, key_press.modifiers) {
        input::SubmitIntent::Submit => Some(text_editor::Binding::Custom(Message::Submit)),
        input::SubmitIntent::Newline => Some(text_editor::Binding::Enter),
        input::SubmitIntent::Other => text_editor::Binding::from_key_press(key_press),
    }
}

// Stable style hooks: theming targets these by role and state without
// reaching into the widget tree.

fn user_bubble(theme: &Theme) -> container::Style {
    let palette = theme.extended_palette();
    container::Style {
        background: Some(palette.primary.weak.color.into()),
        text_color: Some(palette.primary.weak.text),
        border: Border {
            radius: 10.0.into(),
            ..Border::default()
        },
        ..container::Style::default()
    }
}

fn assistant_bubble(theme: &Theme) -> container::Style {
    let palette = theme.extended_palette();
    container::Style {
        background: Some(palette.background.weak.color.into()),
        border: Border {
            radius: 10.0.into(),
            ..Border::default()
        },
        ..container::Style::default()
    }
}

fn errored_bubble(theme: &Theme) -> container::Style {
    let palette = theme.extended_palette();
    container::Style {
        background: Some(palette.danger.weak.color.into()),
        text_color: Some(palette.danger.weak.text),
        border: Border {
            radius: 10.0.into(),
            ..Border::default()
        },
        ..container::Style::default()
    }
}

fn toggle_style(theme: &Theme, status: button::Status) -> button::Style {
    let palette = theme.extended_palette();
    let background = match status {
        button::Status::Hovered | button::Status::Pressed => palette.primary.strong.color,
        _ => palette.primary.base.color,
    };
    button::Style {
        background: Some(background.into()),
        text_color: palette.primary.base.text,
        border: Border {
            radius: 16.0.into(),
            ..Border::default()
        },
        ..button::Style::default()
    }
}

fn quick_action_style(theme: &Theme, status: button::Status) -> button::Style {
    let palette = theme.extended_palette();
    let background = match status {
        button::Status::Hovered | button::Status::Pressed => palette.background.strong.color,
        _ => palette.background.weak.color,
    };
    button::Style {
        background: Some(background.into()),
        text_color: palette.background.base.text,
        border: Border {
            radius: 12.0.into(),
            ..Border::default()
        },
        ..button::Style::default()
    }
}

fn copy_button_style(theme: &Theme, _status: button::Status) -> button::Style {
    button::Style {
        background: None,
        text_color: theme.extended_palette().background.strong.color,
        ..button::Style::default()
    }
}

fn dim_text(theme: &Theme) -> text::Style {
    text::Style {
        color: Some(theme.extended_palette().background.strong.color),
    }
}

fn error_text(theme: &Theme) -> text::Style {
    text::Style {
        color: Some(theme.extended_palette().danger.base.color),
    }
}
