use std::time::Instant;

use crate::session::TurnId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Focus {
    #[default]
    Input,
    Evidence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Info,
    Error,
}

#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub text: String,
    pub kind: StatusKind,
    pub since: Instant,
}

#[derive(Debug, Default)]
pub struct UIState {
    pub input: String,
    pub scroll_offset: usize,

    // Command popup state: None = typed input, Some(n) = nth filtered command
    pub command_selection: Option<usize>,

    // Evidence chip under the keyboard cursor
    pub chip_cursor: Option<(TurnId, usize)>,

    // Which panel receives arrow keys
    pub focus: Focus,

    pub show_help: bool,
    pub status: Option<StatusMessage>,
}

impl UIState {
    pub fn new() -> Self {
        Self::default()
    }
}
