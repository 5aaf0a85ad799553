use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::action::Action;
use crate::backend::{ApiError, AskResponse, ReportUpload};
use crate::command::{CommandParser, COMMANDS};
use crate::config::Config;
use crate::export;
use crate::medical::MedicalAnalysis;
use crate::session::{AnalysisState, Conversation, OpenedEvidence, Selection, TurnId};
use crate::ui_state::{Focus, StatusKind, StatusMessage, UIState};

/// Assistant text used when a question gets no answer from the backend.
pub const FAILURE_NOTICE: &str =
    "Server connection failed. Check that the MedRag backend is running and reachable.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

/// Network work the event loop must start on the controller's behalf.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Ask { id: RequestId, question: String },
    Upload { id: RequestId, path: PathBuf },
}

/// Outcome of a [`Request`], delivered back to the event loop exactly once.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    Answered {
        id: RequestId,
        result: Result<AskResponse, ApiError>,
    },
    Uploaded {
        id: RequestId,
        result: Result<MedicalAnalysis, ApiError>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AskPhase {
    Idle,
    /// `generation` is the conversation generation the question was asked in.
    Submitting { request: RequestId, generation: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum UploadStatus {
    Idle,
    Uploading { request: RequestId, file_name: String },
    Done { since: Instant },
    Failed { since: Instant, message: String },
}

/// Interaction controller: owns the session state and is its only writer.
pub struct App {
    pub config: Config,
    pub ui: UIState,
    pub animation_frame: usize,
    pub should_quit: bool,
    analysis: AnalysisState,
    conversation: Conversation,
    selection: Selection,
    ask: AskPhase,
    upload: UploadStatus,
    next_request: u64,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            ui: UIState::new(),
            animation_frame: 0,
            should_quit: false,
            analysis: AnalysisState::default(),
            conversation: Conversation::default(),
            selection: Selection::default(),
            ask: AskPhase::Idle,
            upload: UploadStatus::Idle,
            next_request: 0,
        }
    }

    pub fn analysis(&self) -> Option<&MedicalAnalysis> {
        self.analysis.current()
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn upload_status(&self) -> &UploadStatus {
        &self.upload
    }

    pub fn is_submitting(&self) -> bool {
        matches!(self.ask, AskPhase::Submitting { .. })
    }

    pub fn is_uploading(&self) -> bool {
        matches!(self.upload, UploadStatus::Uploading { .. })
    }

    /// Questions need a report to ask about.
    pub fn input_enabled(&self) -> bool {
        self.analysis.is_loaded()
    }

    fn next_request_id(&mut self) -> RequestId {
        self.next_request += 1;
        RequestId(self.next_request)
    }

    pub fn set_status(&mut self, text: impl Into<String>, kind: StatusKind) {
        self.ui.status = Some(StatusMessage {
            text: text.into(),
            kind,
            since: Instant::now(),
        });
    }

    pub fn tick(&mut self, now: Instant) {
        self.animation_frame = (self.animation_frame + 1) % 360;

        let revert_after = match &self.upload {
            UploadStatus::Done { since } => Some((*since, self.config.ui.upload_success_display())),
            UploadStatus::Failed { since, .. } => Some((*since, self.config.ui.upload_error_display())),
            _ => None,
        };
        if let Some((since, display)) = revert_after {
            if now.saturating_duration_since(since) >= display {
                self.upload = UploadStatus::Idle;
            }
        }

        let timeout = self.config.ui.status_timeout();
        if let Some(status) = &self.ui.status {
            if now.saturating_duration_since(status.since) >= timeout {
                self.ui.status = None;
            }
        }
    }

    /// Enter pressed in the input box: run a slash command or ask a question.
    pub fn submit_input(&mut self) -> Option<Request> {
        if self.ui.input.trim_start().starts_with('/') {
            let input = std::mem::take(&mut self.ui.input);
            self.reset_command_selection();
            return match CommandParser::parse(&input) {
                Ok(action) => self.perform(action),
                Err(message) => {
                    self.set_status(message, StatusKind::Error);
                    None
                }
            };
        }
        self.submit_question()
    }

    /// Append the user turn and hand back the ask request. The answer (or the
    /// failure notice) is appended when the matching settlement arrives.
    pub fn submit_question(&mut self) -> Option<Request> {
        if self.ui.input.trim().is_empty() || self.is_submitting() {
            return None;
        }
        if !self.input_enabled() {
            self.set_status("Upload a report first (/upload <path>)", StatusKind::Error);
            return None;
        }

        let question = std::mem::take(&mut self.ui.input);
        self.conversation.push_user(question.clone());

        let id = self.next_request_id();
        self.ask = AskPhase::Submitting {
            request: id,
            generation: self.conversation.generation(),
        };
        self.ui.scroll_offset = 0;
        tracing::info!(request = id.0, "question submitted");

        Some(Request::Ask { id, question })
    }

    pub fn begin_upload(&mut self, path: &Path) -> Option<Request> {
        if self.is_uploading() {
            self.set_status("An upload is already running", StatusKind::Error);
            return None;
        }
        if let Err(e) = ReportUpload::mime_for(path) {
            self.set_status(e.to_string(), StatusKind::Error);
            return None;
        }

        let id = self.next_request_id();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        tracing::info!(request = id.0, file = %file_name, "upload started");
        self.upload = UploadStatus::Uploading { request: id, file_name };

        Some(Request::Upload {
            id,
            path: path.to_path_buf(),
        })
    }

    pub fn settle(&mut self, settlement: Settlement, now: Instant) {
        match settlement {
            Settlement::Answered { id, result } => self.settle_answer(id, result),
            Settlement::Uploaded { id, result } => self.settle_upload(id, result, now),
        }
    }

    fn settle_answer(&mut self, id: RequestId, result: Result<AskResponse, ApiError>) {
        let generation = match self.ask {
            AskPhase::Submitting { request, generation } if request == id => generation,
            _ => {
                tracing::warn!(request = id.0, "ignoring answer for a request that is not pending");
                return;
            }
        };
        self.ask = AskPhase::Idle;

        if generation != self.conversation.generation() {
            tracing::info!(request = id.0, "dropping answer: history was cleared while it was pending");
            return;
        }

        match result {
            Ok(response) => {
                tracing::info!(request = id.0, chunks = response.chunks.len(), "answer received");
                self.conversation.push_assistant(response.answer, response.chunks);
            }
            Err(e) => {
                tracing::warn!(request = id.0, error = %e, "ask failed");
                self.conversation.push_failure(FAILURE_NOTICE);
            }
        }
        self.ui.scroll_offset = 0;
    }

    fn settle_upload(&mut self, id: RequestId, result: Result<MedicalAnalysis, ApiError>, now: Instant) {
        match &self.upload {
            UploadStatus::Uploading { request, .. } if *request == id => {}
            _ => {
                tracing::warn!(request = id.0, "ignoring upload result that is not pending");
                return;
            }
        }

        match result {
            Ok(analysis) => {
                tracing::info!(
                    request = id.0,
                    report_type = %analysis.report_type,
                    abnormal = analysis.abnormal.len(),
                    "report analysed"
                );
                self.analysis.replace(analysis);
                if self.config.session.clear_history_on_upload {
                    self.reset_history();
                }
                self.upload = UploadStatus::Done { since: now };
            }
            Err(e) => {
                tracing::warn!(request = id.0, error = %e, "upload failed");
                self.upload = UploadStatus::Failed {
                    since: now,
                    message: e.to_string(),
                };
            }
        }
    }

    fn reset_history(&mut self) {
        self.conversation.reset();
        self.selection.clear();
        self.ui.chip_cursor = None;
        self.ui.scroll_offset = 0;
    }

    pub fn perform(&mut self, action: Action) -> Option<Request> {
        tracing::debug!(?action, "perform");
        match action {
            Action::Help => {
                self.ui.show_help = !self.ui.show_help;
                None
            }
            Action::ClearHistory => {
                if self.is_submitting() {
                    self.set_status("Wait for the pending answer before clearing", StatusKind::Error);
                } else {
                    self.reset_history();
                    self.set_status("Chat cleared", StatusKind::Info);
                }
                None
            }
            Action::Upload { path } => self.begin_upload(&path),
            Action::OpenEvidence { position } => {
                let opened = self
                    .conversation
                    .latest_with_evidence()
                    .map(|turn| self.open_evidence(turn, position - 1))
                    .unwrap_or(false);
                if !opened {
                    self.set_status(format!("No evidence #{} in the last answer", position), StatusKind::Error);
                }
                None
            }
            Action::CloseEvidence => {
                self.close_evidence();
                None
            }
            Action::Export { dir } => {
                self.export(dir);
                None
            }
            Action::Quit => {
                self.should_quit = true;
                None
            }
        }
    }

    fn export(&mut self, dir: Option<PathBuf>) {
        let Some(analysis) = self.analysis.current() else {
            self.set_status("Nothing to export yet: upload a report first", StatusKind::Error);
            return;
        };
        let dir = dir.unwrap_or_else(|| self.config.export.dir.clone());
        match export::export_session(&dir, analysis, &self.conversation, Utc::now()) {
            Ok(path) => self.set_status(format!("Exported to {}", path.display()), StatusKind::Info),
            Err(e) => {
                tracing::warn!(error = %e, "export failed");
                self.set_status(format!("Export failed: {:#}", e), StatusKind::Error);
            }
        }
    }

    /// Open exactly the chunk at `index` of turn `turn`. Unknown positions are ignored.
    pub fn open_evidence(&mut self, turn: TurnId, index: usize) -> bool {
        let Some(chunk) = self.conversation.evidence(turn, index) else {
            return false;
        };
        let chunk = chunk.clone();
        self.selection.open(OpenedEvidence { turn, index, chunk });
        self.ui.chip_cursor = Some((turn, index));
        true
    }

    pub fn close_evidence(&mut self) {
        self.selection.close();
    }

    pub fn selected_chip(&self) -> Option<(TurnId, usize)> {
        self.ui.chip_cursor
    }

    pub fn select_next_chip(&mut self) {
        self.move_chip_cursor(1);
    }

    pub fn select_prev_chip(&mut self) {
        self.move_chip_cursor(-1);
    }

    /// Without a cursor, either direction starts at the most recent chip.
    fn move_chip_cursor(&mut self, delta: isize) {
        let chips = self.conversation.chips();
        let Some(last) = chips.len().checked_sub(1) else {
            self.ui.chip_cursor = None;
            return;
        };

        let next = match self.ui.chip_cursor.and_then(|c| chips.iter().position(|&chip| chip == c)) {
            None => last,
            Some(pos) => pos.saturating_add_signed(delta).min(last),
        };
        self.ui.chip_cursor = Some(chips[next]);
    }

    pub fn open_selected_chip(&mut self) -> bool {
        match self.ui.chip_cursor {
            Some((turn, index)) => self.open_evidence(turn, index),
            None => false,
        }
    }

    pub fn toggle_focus(&mut self) {
        self.ui.focus = match self.ui.focus {
            Focus::Input => {
                if self.ui.chip_cursor.is_none() {
                    self.select_prev_chip();
                }
                Focus::Evidence
            }
            Focus::Evidence => Focus::Input,
        };
    }

    pub fn insert_text(&mut self, text: &str) {
        // Single-line input: newlines become spaces
        let filtered = text.chars().filter(|c| *c != '\r').map(|c| if c == '\n' { ' ' } else { c });
        self.ui.input.extend(filtered);
        self.reset_command_selection();
    }

    /// Check if command popup should be shown
    pub fn showing_command_popup(&self) -> bool {
        self.ui.input.starts_with('/') && !self.ui.input.contains(' ')
    }

    /// Get filtered commands based on current input
    pub fn get_filtered_commands(&self) -> Vec<(&'static str, &'static str)> {
        if !self.ui.input.starts_with('/') {
            return vec![];
        }
        let filter = &self.ui.input[1..];
        COMMANDS
            .iter()
            .filter(|(cmd, _)| cmd[1..].starts_with(filter))
            .copied()
            .collect()
    }

    pub fn command_select_up(&mut self) {
        let filtered = self.get_filtered_commands();
        if filtered.is_empty() {
            return;
        }

        // Cycle: None -> last command -> ... -> 0 -> None
        self.ui.command_selection = match self.ui.command_selection {
            None => Some(filtered.len() - 1),
            Some(0) => None,
            Some(n) => Some(n - 1),
        };
    }

    pub fn command_select_down(&mut self) {
        let filtered = self.get_filtered_commands();
        if filtered.is_empty() {
            return;
        }

        // Cycle: None -> 0 -> 1 -> ... -> last -> None
        self.ui.command_selection = match self.ui.command_selection {
            None => Some(0),
            Some(n) if n >= filtered.len() - 1 => None,
            Some(n) => Some(n + 1),
        };
    }

    /// Replace the input with the selected command, ready for arguments.
    pub fn apply_command_selection(&mut self) {
        if let Some(idx) = self.ui.command_selection {
            let filtered = self.get_filtered_commands();
            if let Some((cmd, _)) = filtered.get(idx) {
                self.ui.input = format!("{} ", cmd);
            }
        }
        self.ui.command_selection = None;
    }

    pub fn reset_command_selection(&mut self) {
        self.ui.command_selection = None;
    }

    pub fn scroll_up(&mut self) {
        self.ui.scroll_offset = self.ui.scroll_offset.saturating_add(self.config.ui.scroll_step);
    }

    pub fn scroll_down(&mut self) {
        self.ui.scroll_offset = self.ui.scroll_offset.saturating_sub(self.config.ui.scroll_step);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::medical::{EvidenceChunk, FlagKind};
    use crate::session::Turn;
    use std::time::Duration;

    fn cbc_analysis() -> MedicalAnalysis {
        serde_json::from_value(serde_json::json!({
            "patient_info": {"name": "J. Doe"},
            "report_type": "CBC",
            "abnormal": [{"name": "Hemoglobin", "result": 9.1, "unit": "g/dL", "flag": "L", "ref_low": 12, "ref_high": 16}]
        }))
        .unwrap()
    }

    fn chunk(name: &str, content: &str, score: f64) -> EvidenceChunk {
        EvidenceChunk {
            content: content.to_string(),
            source: "doc1".to_string(),
            test_name: Some(name.to_string()),
            score,
        }
    }

    fn upload(app: &mut App, analysis: MedicalAnalysis) {
        let Some(Request::Upload { id, .. }) = app.begin_upload(Path::new("cbc.pdf")) else {
            panic!("expected upload request");
        };
        app.settle(Settlement::Uploaded { id, result: Ok(analysis) }, Instant::now());
    }

    fn loaded_app() -> App {
        let mut app = App::new(Config::default());
        upload(&mut app, cbc_analysis());
        app
    }

    fn ask(app: &mut App, question: &str) -> RequestId {
        app.ui.input = question.to_string();
        match app.submit_input() {
            Some(Request::Ask { id, question: sent }) => {
                assert_eq!(sent, question);
                id
            }
            other => panic!("expected ask request, got {:?}", other),
        }
    }

    fn answer(app: &mut App, id: RequestId, text: &str, chunks: Vec<EvidenceChunk>) {
        app.settle(
            Settlement::Answered {
                id,
                result: Ok(AskResponse { answer: text.to_string(), chunks }),
            },
            Instant::now(),
        );
    }

    #[test]
    fn test_upload_scenario_shows_one_low_finding() {
        let app = loaded_app();

        let analysis = app.analysis().unwrap();
        assert_eq!(analysis.abnormal.len(), 1);
        assert_eq!(analysis.abnormal[0].flag.kind(), FlagKind::Low);
        assert!(matches!(app.upload_status(), UploadStatus::Done { .. }));
    }

    #[test]
    fn test_ask_scenario_appends_user_then_assistant() {
        let mut app = loaded_app();

        let id = ask(&mut app, "What is my hemoglobin?");
        assert!(app.ui.input.is_empty());
        assert_eq!(app.conversation().len(), 1);
        assert!(app.is_submitting());

        answer(
            &mut app,
            id,
            "Your hemoglobin is low at 9.1.",
            vec![chunk("Hemoglobin", "Hemoglobin 9.1 L", 0.87)],
        );

        let turns = app.conversation().turns();
        assert_eq!(turns.len(), 2);
        assert!(matches!(turns[0], Turn::User { .. }));
        assert_eq!(turns[1].evidence().len(), 1);
        assert!(!app.is_submitting());

        assert!(app.open_evidence(TurnId(1), 0));
        let opened = app.selection().visible().unwrap();
        assert_eq!(opened.chunk.score_percent(), "87.0%");
    }

    #[test]
    fn test_network_failure_appends_failure_turn() {
        let mut app = loaded_app();
        let id = ask(&mut app, "What is my hemoglobin?");

        app.settle(
            Settlement::Answered {
                id,
                result: Err(ApiError::Network("connection refused".to_string())),
            },
            Instant::now(),
        );

        let turns = app.conversation().turns();
        assert_eq!(turns.len(), 2);
        match &turns[1] {
            Turn::Assistant { text, evidence, failed, .. } => {
                assert_eq!(text, FAILURE_NOTICE);
                assert!(evidence.is_empty());
                assert!(*failed);
            }
            Turn::User { .. } => panic!("expected assistant turn"),
        }
        assert!(!app.is_submitting());
    }

    #[test]
    fn test_log_length_is_twice_the_submissions() {
        let mut app = loaded_app();
        let outcomes = [true, false, true, true, false];

        for (n, ok) in outcomes.iter().enumerate() {
            let id = ask(&mut app, &format!("question {}", n));
            let result = if *ok {
                Ok(AskResponse { answer: "fine".to_string(), chunks: vec![] })
            } else {
                Err(ApiError::Backend("model crashed".to_string()))
            };
            app.settle(Settlement::Answered { id, result }, Instant::now());
        }

        assert_eq!(app.conversation().len(), 2 * outcomes.len());
    }

    #[test]
    fn test_blank_input_is_ignored() {
        let mut app = loaded_app();

        for input in ["", "   ", "\t \n"] {
            app.ui.input = input.to_string();
            assert!(app.submit_input().is_none());
        }

        assert!(app.conversation().is_empty());
        assert!(!app.is_submitting());
    }

    #[test]
    fn test_submit_while_pending_is_noop() {
        let mut app = loaded_app();
        let first = ask(&mut app, "first");

        app.ui.input = "second".to_string();
        assert!(app.submit_input().is_none());
        assert_eq!(app.conversation().len(), 1);
        assert_eq!(app.ui.input, "second");

        answer(&mut app, first, "one", vec![]);
        assert_eq!(app.conversation().len(), 2);
    }

    #[test]
    fn test_question_requires_analysis() {
        let mut app = App::new(Config::default());
        app.ui.input = "What is my hemoglobin?".to_string();

        assert!(app.submit_input().is_none());
        assert!(app.conversation().is_empty());
        assert_eq!(app.ui.input, "What is my hemoglobin?");
        assert_eq!(app.ui.status.as_ref().unwrap().kind, StatusKind::Error);
    }

    #[test]
    fn test_question_sent_verbatim() {
        let mut app = loaded_app();
        let id = ask(&mut app, "  spaced question  ");
        assert_eq!(app.conversation().turns()[0].text(), "  spaced question  ");
        answer(&mut app, id, "ok", vec![]);
    }

    #[test]
    fn test_stale_answer_is_ignored() {
        let mut app = loaded_app();
        let id = ask(&mut app, "q");

        answer(&mut app, RequestId(id.0 + 100), "wrong", vec![]);
        assert_eq!(app.conversation().len(), 1);
        assert!(app.is_submitting());

        answer(&mut app, id, "right", vec![]);
        answer(&mut app, id, "duplicate", vec![]);
        assert_eq!(app.conversation().len(), 2);
        assert_eq!(app.conversation().turns()[1].text(), "right");
    }

    #[test]
    fn test_upload_completing_while_question_pending() {
        let mut app = loaded_app();
        let ask_id = ask(&mut app, "What is my hemoglobin?");

        let Some(Request::Upload { id: upload_id, .. }) = app.begin_upload(Path::new("lipid.png")) else {
            panic!("expected upload request");
        };
        let mut lipid = MedicalAnalysis::default();
        lipid.report_type = "Lipid Panel".to_string();
        app.settle(Settlement::Uploaded { id: upload_id, result: Ok(lipid) }, Instant::now());

        assert_eq!(app.analysis().unwrap().report_type, "Lipid Panel");
        assert!(app.analysis().unwrap().abnormal.is_empty());
        assert!(app.analysis().unwrap().patient_info.name.is_none());
        assert!(app.is_submitting());

        answer(&mut app, ask_id, "Hemoglobin was low.", vec![]);
        assert_eq!(app.conversation().len(), 2);
    }

    #[test]
    fn test_answer_arriving_while_upload_pending() {
        let mut app = loaded_app();
        let ask_id = ask(&mut app, "q");
        let Some(Request::Upload { id: upload_id, .. }) = app.begin_upload(Path::new("next.pdf")) else {
            panic!("expected upload request");
        };

        answer(&mut app, ask_id, "a", vec![]);
        assert!(app.is_uploading());
        assert_eq!(app.conversation().len(), 2);

        app.settle(
            Settlement::Uploaded {
                id: upload_id,
                result: Err(ApiError::Backend("OCR failed".to_string())),
            },
            Instant::now(),
        );
        assert_eq!(app.analysis().unwrap().report_type, "CBC");
        assert!(matches!(app.upload_status(), UploadStatus::Failed { .. }));
    }

    #[test]
    fn test_second_upload_rejected_while_uploading() {
        let mut app = App::new(Config::default());
        assert!(app.begin_upload(Path::new("a.pdf")).is_some());
        assert!(app.begin_upload(Path::new("b.pdf")).is_none());
    }

    #[test]
    fn test_upload_accepted_while_badge_shows_result() {
        let mut app = App::new(Config::default());
        upload(&mut app, cbc_analysis());
        assert!(matches!(app.upload_status(), UploadStatus::Done { .. }));

        assert!(app.begin_upload(Path::new("b.pdf")).is_some());
        assert!(app.is_uploading());
    }

    #[test]
    fn test_upload_rejects_unsupported_file() {
        let mut app = App::new(Config::default());
        assert!(app.begin_upload(Path::new("notes.docx")).is_none());
        assert_eq!(app.upload_status(), &UploadStatus::Idle);
    }

    #[test]
    fn test_upload_badge_reverts_after_display_delay() {
        let mut app = App::new(Config::default());
        let Some(Request::Upload { id, .. }) = app.begin_upload(Path::new("a.pdf")) else {
            panic!("expected upload request");
        };
        let settled_at = Instant::now();
        app.settle(Settlement::Uploaded { id, result: Ok(cbc_analysis()) }, settled_at);

        app.tick(settled_at + Duration::from_millis(1000));
        assert!(matches!(app.upload_status(), UploadStatus::Done { .. }));

        app.tick(settled_at + Duration::from_millis(2500));
        assert_eq!(app.upload_status(), &UploadStatus::Idle);
        assert!(app.analysis().is_some());
    }

    #[test]
    fn test_failed_badge_uses_error_delay() {
        let mut app = App::new(Config::default());
        let Some(Request::Upload { id, .. }) = app.begin_upload(Path::new("a.pdf")) else {
            panic!("expected upload request");
        };
        let settled_at = Instant::now();
        app.settle(
            Settlement::Uploaded { id, result: Err(ApiError::Network("down".to_string())) },
            settled_at,
        );

        app.tick(settled_at + Duration::from_millis(2600));
        assert!(matches!(app.upload_status(), UploadStatus::Failed { .. }));

        app.tick(settled_at + Duration::from_millis(3000));
        assert_eq!(app.upload_status(), &UploadStatus::Idle);
        assert!(app.analysis().is_none());
    }

    #[test]
    fn test_history_kept_on_upload_by_default() {
        let mut app = loaded_app();
        let id = ask(&mut app, "q");
        answer(&mut app, id, "a", vec![]);

        upload(&mut app, cbc_analysis());

        assert_eq!(app.conversation().len(), 2);
    }

    #[test]
    fn test_history_cleared_on_upload_when_configured() {
        let mut config = Config::default();
        config.session.clear_history_on_upload = true;
        let mut app = App::new(config);
        upload(&mut app, cbc_analysis());

        let id = ask(&mut app, "q");
        answer(&mut app, id, "a", vec![chunk("Hemoglobin", "Hb", 0.9)]);
        app.open_evidence(TurnId(1), 0);

        let pending = ask(&mut app, "pending question");
        upload(&mut app, cbc_analysis());

        assert!(app.conversation().is_empty());
        assert!(app.selection().visible().is_none());

        answer(&mut app, pending, "late answer", vec![]);
        assert!(app.conversation().is_empty());
        assert!(!app.is_submitting());
    }

    #[test]
    fn test_chip_opens_chunk_from_its_own_turn() {
        let mut app = loaded_app();
        let first = ask(&mut app, "q1");
        answer(&mut app, first, "a1", vec![chunk("Hemoglobin", "Hb 9.1 L (Jan)", 0.8)]);
        let second = ask(&mut app, "q2");
        answer(&mut app, second, "a2", vec![chunk("Hemoglobin", "Hb 10.2 L (Mar)", 0.7)]);

        assert!(app.open_evidence(TurnId(1), 0));
        assert_eq!(app.selection().visible().unwrap().chunk.content, "Hb 9.1 L (Jan)");

        assert!(app.open_evidence(TurnId(3), 0));
        let opened = app.selection().visible().unwrap();
        assert_eq!(opened.turn, TurnId(3));
        assert_eq!(opened.chunk.content, "Hb 10.2 L (Mar)");

        assert!(!app.open_evidence(TurnId(0), 0));
        assert!(!app.open_evidence(TurnId(3), 1));
    }

    #[test]
    fn test_close_evidence_hides_drawer() {
        let mut app = loaded_app();
        let id = ask(&mut app, "q");
        answer(&mut app, id, "a", vec![chunk("WBC", "WBC 11 H", 0.6)]);
        app.open_evidence(TurnId(1), 0);

        app.close_evidence();

        assert!(app.selection().visible().is_none());
    }

    #[test]
    fn test_chip_cursor_navigation() {
        let mut app = loaded_app();
        let first = ask(&mut app, "q1");
        answer(&mut app, first, "a1", vec![chunk("A", "1", 0.1), chunk("B", "2", 0.2)]);
        let second = ask(&mut app, "q2");
        answer(&mut app, second, "a2", vec![chunk("C", "3", 0.3)]);

        app.select_prev_chip();
        assert_eq!(app.selected_chip(), Some((TurnId(3), 0)));
        app.select_prev_chip();
        assert_eq!(app.selected_chip(), Some((TurnId(1), 1)));
        app.select_prev_chip();
        app.select_prev_chip();
        assert_eq!(app.selected_chip(), Some((TurnId(1), 0)));
        app.select_next_chip();
        assert_eq!(app.selected_chip(), Some((TurnId(1), 1)));

        assert!(app.open_selected_chip());
        assert_eq!(app.selection().visible().unwrap().chunk.content, "2");
    }

    #[test]
    fn test_evidence_command_uses_latest_answer() {
        let mut app = loaded_app();
        let first = ask(&mut app, "q1");
        answer(&mut app, first, "a1", vec![chunk("A", "first", 0.1)]);
        let second = ask(&mut app, "q2");
        answer(&mut app, second, "a2", vec![chunk("B", "second-1", 0.2), chunk("C", "second-2", 0.3)]);

        app.ui.input = "/evidence 2".to_string();
        assert!(app.submit_input().is_none());

        assert_eq!(app.selection().visible().unwrap().chunk.content, "second-2");
        assert_eq!(app.conversation().len(), 4);
    }

    #[test]
    fn test_upload_command_issues_request() {
        let mut app = App::new(Config::default());
        app.ui.input = "/upload reports/cbc.pdf".to_string();

        let request = app.submit_input();

        assert!(matches!(request, Some(Request::Upload { ref path, .. }) if path == Path::new("reports/cbc.pdf")));
        assert!(app.is_uploading());
        assert!(app.ui.input.is_empty());
    }

    #[test]
    fn test_unknown_command_sets_error_status() {
        let mut app = loaded_app();
        app.ui.input = "/bogus".to_string();

        assert!(app.submit_input().is_none());
        assert!(app.conversation().is_empty());
        assert_eq!(app.ui.status.as_ref().unwrap().kind, StatusKind::Error);
    }

    #[test]
    fn test_clear_refused_while_pending() {
        let mut app = loaded_app();
        let id = ask(&mut app, "q");

        app.perform(Action::ClearHistory);
        assert_eq!(app.conversation().len(), 1);

        answer(&mut app, id, "a", vec![]);
        app.perform(Action::ClearHistory);
        assert!(app.conversation().is_empty());
    }

    #[test]
    fn test_export_command_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = loaded_app();

        app.perform(Action::Export { dir: Some(dir.path().to_path_buf()) });

        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
        assert_eq!(app.ui.status.as_ref().unwrap().kind, StatusKind::Info);
    }

    #[test]
    fn test_command_popup_filtering() {
        let mut app = App::new(Config::default());
        app.insert_text("/e");

        assert!(app.showing_command_popup());
        let filtered: Vec<&str> = app.get_filtered_commands().iter().map(|(c, _)| *c).collect();
        assert_eq!(filtered, vec!["/evidence", "/export"]);

        app.command_select_down();
        app.command_select_down();
        app.apply_command_selection();
        assert_eq!(app.ui.input, "/export ");
        assert!(!app.showing_command_popup());
    }

    #[test]
    fn test_paste_flattens_newlines() {
        let mut app = App::new(Config::default());
        app.insert_text("line one\r\nline two");
        assert_eq!(app.ui.input, "line one line two");
    }
}
