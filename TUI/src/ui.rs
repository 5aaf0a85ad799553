use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Clear, Paragraph, Wrap},
    Frame,
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::app::{App, UploadStatus};
use crate::command::COMMANDS;
use crate::medical::{FlagKind, MedicalAnalysis};
use crate::session::{Turn, TurnId};
use crate::ui_state::{Focus, StatusKind};

// Copper Sapphire Morning color palette
const BG_DARK: Color = Color::Rgb(12, 12, 16);           // Deep background
const BG_PANEL: Color = Color::Rgb(18, 18, 24);          // Slightly lighter for panels

// Sapphire blues
const SAPPHIRE: Color = Color::Rgb(101, 150, 243);       // #6596F3 - Primary accent
const SAPPHIRE_DARK: Color = Color::Rgb(84, 112, 156);   // #54709C - Darker blue
const CYAN_LIGHT: Color = Color::Rgb(178, 220, 226);     // #B2DCE2 - Light cyan

// Copper/warm tones
const COPPER: Color = Color::Rgb(138, 72, 38);           // #8A4826 - Copper
const WARM_BROWN: Color = Color::Rgb(164, 103, 38);      // #A46726 - Warm brown
const PALE_YELLOW: Color = Color::Rgb(234, 208, 148);    // #EAD094 - Pale yellow

// Accent colors
const BURGUNDY: Color = Color::Rgb(204, 92, 68);         // #CC5C44 - High / errors
const OLIVE: Color = Color::Rgb(131, 179, 102);          // #83B366 - Success/green
const LAVENDER: Color = Color::Rgb(211, 164, 234);       // #D3A4EA - Purple accent

// Text colors
const TEXT_PRIMARY: Color = Color::Rgb(240, 240, 245);   // Near white
const TEXT_SECONDARY: Color = Color::Rgb(180, 180, 190); // Light gray
const TEXT_MUTED: Color = Color::Rgb(105, 116, 133);     // #697485 - Medium gray

// Border colors (subtle)
const BORDER_DIM: Color = Color::Rgb(45, 50, 60);        // Dim border
const BORDER_ACCENT: Color = Color::Rgb(70, 85, 110);    // Accent border

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

pub const INPUT_PLACEHOLDER: &str = "Please upload a report first...";

const DISCLAIMER: &str =
    "For information only. Not a diagnosis: discuss results with your doctor.";

pub fn draw(frame: &mut Frame, app: &App) {
    // Fill entire background
    let bg = Block::default().style(Style::default().bg(BG_DARK));
    frame.render_widget(bg, frame.area());

    let area = frame.area();

    // Main layout with padding
    let padded = Rect {
        x: area.x + 1,
        y: area.y + 1,
        width: area.width.saturating_sub(2),
        height: area.height.saturating_sub(2),
    }
    .intersection(area);

    let main_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(app.config.ui.sidebar_width), // Sidebar
            Constraint::Length(1),                           // Gap
            Constraint::Min(40),                             // Chat area
        ])
        .split(padded);

    draw_sidebar(frame, app, main_chunks[0]);
    draw_chat_area(frame, app, main_chunks[2]);

    if app.showing_command_popup() {
        draw_command_popup(frame, app, main_chunks[2]);
    }

    if app.selection().is_visible() {
        draw_evidence_drawer(frame, app, main_chunks[2]);
    }

    if app.ui.show_help {
        draw_help(frame, area);
    }
}

fn spinner(anim_frame: usize) -> &'static str {
    SPINNER_FRAMES[(anim_frame / 6) % SPINNER_FRAMES.len()]
}

fn draw_sidebar(frame: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Brand
            Constraint::Length(4), // Upload badge
            Constraint::Length(6), // Patient card
            Constraint::Min(4),    // Abnormal findings
            Constraint::Length(5), // Disclaimer
            Constraint::Length(4), // Keyboard hints
        ])
        .split(area);

    draw_brand(frame, chunks[0]);
    draw_upload_badge(frame, app, chunks[1]);
    draw_patient_card(frame, app.analysis(), chunks[2]);
    draw_findings(frame, app.analysis(), chunks[3]);
    draw_disclaimer(frame, chunks[4]);
    draw_keyboard_hints(frame, chunks[5]);
}

fn draw_brand(frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(BORDER_ACCENT));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let brand = Paragraph::new(Line::from(vec![
        Span::styled("◆ ", Style::default().fg(COPPER)),
        Span::styled("MedRag", Style::default().fg(SAPPHIRE).add_modifier(Modifier::BOLD)),
        Span::styled(" lab reports", Style::default().fg(TEXT_MUTED)),
    ]))
    .alignment(Alignment::Center);
    frame.render_widget(brand, inner);
}

/// Badge text and colour for the upload lifecycle.
fn upload_badge(status: &UploadStatus, anim_frame: usize) -> (String, Color) {
    match status {
        UploadStatus::Idle => ("○ Idle".to_string(), TEXT_MUTED),
        UploadStatus::Uploading { .. } => (format!("{} Running OCR & RAG…", spinner(anim_frame)), SAPPHIRE),
        UploadStatus::Done { .. } => ("✓ Analysis Ready".to_string(), OLIVE),
        UploadStatus::Failed { .. } => ("✗ Upload Failed".to_string(), BURGUNDY),
    }
}

fn draw_upload_badge(frame: &mut Frame, app: &App, area: Rect) {
    let status = app.upload_status();
    let (badge, color) = upload_badge(status, app.animation_frame);

    let block = Block::default()
        .title(Span::styled(" Upload ", Style::default().fg(COPPER).add_modifier(Modifier::BOLD)))
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(if app.is_uploading() { SAPPHIRE_DARK } else { BORDER_DIM }));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let detail = match status {
        UploadStatus::Uploading { file_name, .. } => {
            Span::styled(format!(" {}", file_name), Style::default().fg(TEXT_SECONDARY))
        }
        UploadStatus::Failed { message, .. } => {
            Span::styled(format!(" {}", message), Style::default().fg(TEXT_MUTED))
        }
        _ => Span::styled(" /upload <path>", Style::default().fg(TEXT_MUTED)),
    };

    let lines = vec![
        Line::from(Span::styled(format!(" {}", badge), Style::default().fg(color).add_modifier(Modifier::BOLD))),
        Line::from(detail),
    ];
    frame.render_widget(Paragraph::new(lines), inner);
}

fn draw_patient_card(frame: &mut Frame, analysis: Option<&MedicalAnalysis>, area: Rect) {
    let block = Block::default()
        .title(Span::styled(" Patient ", Style::default().fg(COPPER).add_modifier(Modifier::BOLD)))
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(BORDER_DIM));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let Some(analysis) = analysis else {
        let empty = Paragraph::new(vec![
            Line::from(""),
            Line::from(Span::styled(" No report loaded", Style::default().fg(TEXT_MUTED))),
        ]);
        frame.render_widget(empty, inner);
        return;
    };

    let info = &analysis.patient_info;
    let lines = vec![
        Line::from(vec![
            Span::styled(" @ ", Style::default().fg(SAPPHIRE)),
            Span::styled(info.display_name(), Style::default().fg(TEXT_PRIMARY).add_modifier(Modifier::BOLD)),
        ]),
        Line::from(vec![
            Span::styled(" ~ ", Style::default().fg(CYAN_LIGHT)),
            Span::styled(info.display_details(), Style::default().fg(TEXT_SECONDARY)),
        ]),
        Line::from(vec![
            Span::styled(" # ", Style::default().fg(COPPER)),
            Span::styled(format!("Registered: {}", info.display_registered()), Style::default().fg(TEXT_MUTED)),
        ]),
        Line::from(vec![
            Span::styled(" > ", Style::default().fg(LAVENDER)),
            Span::styled(report_type_label(analysis), Style::default().fg(TEXT_SECONDARY)),
        ]),
    ];
    frame.render_widget(Paragraph::new(lines), inner);
}

fn report_type_label(analysis: &MedicalAnalysis) -> &str {
    if analysis.report_type.trim().is_empty() {
        "Lab Report"
    } else {
        &analysis.report_type
    }
}

fn flag_color(kind: FlagKind) -> Color {
    match kind {
        FlagKind::High => BURGUNDY,
        FlagKind::Low => SAPPHIRE,
        FlagKind::Other => WARM_BROWN,
    }
}

fn flag_icon(kind: FlagKind) -> &'static str {
    match kind {
        FlagKind::High => "▲",
        FlagKind::Low => "▼",
        FlagKind::Other => "●",
    }
}

fn draw_findings(frame: &mut Frame, analysis: Option<&MedicalAnalysis>, area: Rect) {
    let count = analysis.map(|a| a.abnormal.len()).unwrap_or(0);
    let (title, title_color) = match analysis {
        None => (" Findings ".to_string(), TEXT_MUTED),
        Some(_) if count == 0 => (" Findings ".to_string(), OLIVE),
        Some(_) => (format!(" Findings: {} Detected ", count), BURGUNDY),
    };

    let block = Block::default()
        .title(Span::styled(title, Style::default().fg(title_color).add_modifier(Modifier::BOLD)))
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(BORDER_DIM));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let Some(analysis) = analysis else {
        return;
    };

    if analysis.abnormal.is_empty() {
        let normal = Paragraph::new(Line::from(Span::styled(
            " ✓ All values within range",
            Style::default().fg(OLIVE),
        )));
        frame.render_widget(normal, inner);
        return;
    }

    let mut lines: Vec<Line> = Vec::new();
    for finding in &analysis.abnormal {
        let kind = finding.flag.kind();
        let color = flag_color(kind);
        lines.push(Line::from(vec![
            Span::styled(format!(" {} ", flag_icon(kind)), Style::default().fg(color)),
            Span::styled(finding.name.clone(), Style::default().fg(TEXT_PRIMARY).add_modifier(Modifier::BOLD)),
            Span::styled(format!(" {}", finding.flag), Style::default().fg(color).add_modifier(Modifier::BOLD)),
        ]));
        lines.push(Line::from(vec![
            Span::styled(format!("   {}", finding.display_result()), Style::default().fg(color)),
            Span::styled(format!("  ref {}", finding.display_range()), Style::default().fg(TEXT_MUTED)),
        ]));
    }

    frame.render_widget(Paragraph::new(lines), inner);
}

fn draw_disclaimer(frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(BORDER_DIM));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let disclaimer = Paragraph::new(Span::styled(
        DISCLAIMER,
        Style::default().fg(PALE_YELLOW).add_modifier(Modifier::ITALIC),
    ))
    .wrap(Wrap { trim: true });
    frame.render_widget(disclaimer, inner);
}

fn draw_keyboard_hints(frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(BORDER_DIM));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let hints = Paragraph::new(vec![
        Line::from(vec![
            Span::styled("ESC", Style::default().fg(SAPPHIRE).add_modifier(Modifier::BOLD)),
            Span::styled(" quit  ", Style::default().fg(TEXT_MUTED)),
            Span::styled("/", Style::default().fg(COPPER).add_modifier(Modifier::BOLD)),
            Span::styled(" cmds", Style::default().fg(TEXT_MUTED)),
        ]),
        Line::from(vec![
            Span::styled("TAB", Style::default().fg(LAVENDER).add_modifier(Modifier::BOLD)),
            Span::styled(" evidence", Style::default().fg(TEXT_MUTED)),
        ]),
    ])
    .alignment(Alignment::Center);
    frame.render_widget(hints, inner);
}

fn draw_chat_area(frame: &mut Frame, app: &App, area: Rect) {
    // Calculate input height based on content (min 3, max 8)
    let input_width = area.width.saturating_sub(6) as usize; // Account for borders and prompt
    let input_lines = if input_width > 0 {
        (app.ui.input.width() / input_width) + 1
    } else {
        1
    };
    let input_height = (input_lines as u16 + 2).clamp(3, 8); // +2 for borders

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(5),               // Messages
            Constraint::Length(1),            // Gap
            Constraint::Length(input_height), // Input (dynamic)
        ])
        .split(area);

    draw_messages(frame, app, chunks[0]);
    draw_input(frame, app, chunks[2]);
}

/// Word-wrap by display width. Words wider than the line are split.
pub fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    if max_width == 0 {
        return vec![text.to_string()];
    }
    let mut result = Vec::new();
    let mut current_line = String::new();
    let mut current_width = 0;

    for word in text.split_whitespace() {
        let word_width = word.width();
        if current_width > 0 && current_width + 1 + word_width <= max_width {
            current_line.push(' ');
            current_line.push_str(word);
            current_width += 1 + word_width;
            continue;
        }
        if current_width > 0 {
            result.push(std::mem::take(&mut current_line));
            current_width = 0;
        }
        for c in word.chars() {
            let w = c.width().unwrap_or(0);
            if current_width + w > max_width && current_width > 0 {
                result.push(std::mem::take(&mut current_line));
                current_width = 0;
            }
            current_line.push(c);
            current_width += w;
        }
    }
    if !current_line.is_empty() {
        result.push(current_line);
    }
    if result.is_empty() {
        result.push(String::new());
    }
    result
}

fn draw_messages(frame: &mut Frame, app: &App, area: Rect) {
    let border_color = if app.ui.focus == Focus::Evidence {
        SAPPHIRE // Highlighted while chips have the keyboard
    } else {
        BORDER_DIM
    };

    let mut block = Block::default()
        .title(Span::styled(" Chat ", Style::default().fg(TEXT_PRIMARY).add_modifier(Modifier::BOLD)))
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(border_color));
    if let Some(analysis) = app.analysis() {
        block = block.title(
            Line::from(vec![
                Span::styled(" Active: ", Style::default().fg(TEXT_MUTED)),
                Span::styled(report_type_label(analysis), Style::default().fg(OLIVE).add_modifier(Modifier::BOLD)),
                Span::raw(" "),
            ])
            .right_aligned(),
        );
    }

    let inner = block.inner(area);
    frame.render_widget(block, area);

    // Add padding inside the chat area
    let padded = Rect {
        x: inner.x + 1,
        y: inner.y + 1,
        width: inner.width.saturating_sub(2),
        height: inner.height.saturating_sub(2),
    }
    .intersection(inner);

    if app.conversation().is_empty() && !app.is_submitting() {
        draw_empty_state(frame, app, padded);
        return;
    }

    let lines = conversation_lines(app, padded.width as usize);

    let total_lines = lines.len();
    let visible_height = padded.height as usize;

    // Calculate scroll - scroll from bottom, clamp scroll_offset to valid range
    let max_scroll = total_lines.saturating_sub(visible_height);
    let clamped_offset = app.ui.scroll_offset.min(max_scroll);
    let scroll_pos = max_scroll.saturating_sub(clamped_offset);

    let messages = Paragraph::new(lines).scroll((scroll_pos as u16, 0));
    frame.render_widget(messages, padded);

    // Arrows sit on the border rows, so the block needs room for both
    if total_lines > visible_height && area.width >= 2 && area.height >= 3 {
        if scroll_pos > 0 {
            let up_area = Rect {
                x: area.x + area.width - 2,
                y: area.y + 1,
                width: 1,
                height: 1,
            };
            frame.render_widget(Paragraph::new("▲").style(Style::default().fg(SAPPHIRE)), up_area);
        }
        if clamped_offset > 0 {
            let down_area = Rect {
                x: area.x + area.width - 2,
                y: area.y + area.height - 2,
                width: 1,
                height: 1,
            };
            frame.render_widget(Paragraph::new("▼").style(Style::default().fg(SAPPHIRE)), down_area);
        }
    }
}

fn draw_empty_state(frame: &mut Frame, app: &App, area: Rect) {
    let lines = if app.analysis().is_none() {
        vec![
            Line::from(""),
            Line::from(""),
            Line::from(vec![
                Span::styled("◆ ", Style::default().fg(COPPER)),
                Span::styled("Knowledge Base Empty", Style::default().fg(SAPPHIRE).add_modifier(Modifier::BOLD)),
                Span::styled(" ◆", Style::default().fg(COPPER)),
            ]),
            Line::from(""),
            Line::from(Span::styled(
                "Upload a lab report (PDF, PNG or JPG) to start.",
                Style::default().fg(TEXT_SECONDARY),
            )),
            Line::from(""),
            Line::from(vec![
                Span::styled("Type ", Style::default().fg(TEXT_MUTED)),
                Span::styled("/upload <path>", Style::default().fg(SAPPHIRE)),
                Span::styled(" or ", Style::default().fg(TEXT_MUTED)),
                Span::styled("/help", Style::default().fg(SAPPHIRE)),
            ]),
        ]
    } else {
        vec![
            Line::from(""),
            Line::from(""),
            Line::from(Span::styled("Ask anything about this report:", Style::default().fg(TEXT_SECONDARY))),
            Line::from(""),
            Line::from(vec![
                Span::styled("• ", Style::default().fg(COPPER)),
                Span::styled(
                    "\"Why is my hemoglobin flagged?\"",
                    Style::default().fg(TEXT_MUTED).add_modifier(Modifier::ITALIC),
                ),
            ]),
            Line::from(vec![
                Span::styled("• ", Style::default().fg(COPPER)),
                Span::styled(
                    "\"Which values are outside the range?\"",
                    Style::default().fg(TEXT_MUTED).add_modifier(Modifier::ITALIC),
                ),
            ]),
        ]
    };

    frame.render_widget(Paragraph::new(lines).alignment(Alignment::Center), area);
}

fn conversation_lines(app: &App, width: usize) -> Vec<Line<'static>> {
    // Fixed-width label for alignment
    const LABEL_WIDTH: usize = 12;
    let indent: String = " ".repeat(LABEL_WIDTH);
    let content_width = width.saturating_sub(LABEL_WIDTH);

    let mut lines: Vec<Line<'static>> = Vec::new();

    for (idx, turn) in app.conversation().turns().iter().enumerate() {
        let (label, label_style, content_style) = match turn {
            Turn::User { .. } => (
                "you",
                Style::default().fg(SAPPHIRE).add_modifier(Modifier::BOLD),
                Style::default().fg(TEXT_PRIMARY),
            ),
            Turn::Assistant { failed: true, .. } => (
                "assistant",
                Style::default().fg(BURGUNDY).add_modifier(Modifier::BOLD),
                Style::default().fg(BURGUNDY),
            ),
            Turn::Assistant { .. } => (
                "assistant",
                Style::default().fg(COPPER).add_modifier(Modifier::BOLD),
                Style::default().fg(TEXT_PRIMARY),
            ),
        };

        // Format label with fixed width and separator
        let formatted_label = format!("{:>width$} │ ", label, width = LABEL_WIDTH - 3);
        let mut is_first_line = true;
        for content_line in turn.text().lines() {
            for wrapped_line in wrap_text(content_line, content_width) {
                let lead = if is_first_line {
                    Span::styled(formatted_label.clone(), label_style)
                } else {
                    Span::raw(indent.clone())
                };
                lines.push(Line::from(vec![lead, Span::styled(wrapped_line, content_style)]));
                is_first_line = false;
            }
        }

        if !turn.evidence().is_empty() {
            lines.extend(chip_lines(app, TurnId(idx), &indent, content_width));
        }

        // Add spacing between messages
        lines.push(Line::from(""));
    }

    if app.is_submitting() {
        let dots = match (app.animation_frame / 15) % 4 {
            0 => ".  ",
            1 => ".. ",
            2 => "...",
            _ => " ..",
        };
        let formatted_label = format!("{:>width$} │ ", "assistant", width = LABEL_WIDTH - 3);
        lines.push(Line::from(vec![
            Span::styled(formatted_label, Style::default().fg(COPPER).add_modifier(Modifier::BOLD)),
            Span::styled(format!("thinking{}", dots), Style::default().fg(COPPER).add_modifier(Modifier::ITALIC)),
        ]));
    }

    lines
}

fn chip_text(position: usize, label: &str, score: &str) -> String {
    format!("[{} {} {}]", position, label, score)
}

/// Evidence chips of one turn, flowed onto as many lines as the width needs.
fn chip_lines(app: &App, turn: TurnId, indent: &str, width: usize) -> Vec<Line<'static>> {
    let Some(turn_ref) = app.conversation().get(turn) else {
        return Vec::new();
    };

    let mut lines = Vec::new();
    let mut spans: Vec<Span<'static>> = vec![Span::raw(indent.to_string())];
    let mut used = 0;

    for (index, chunk) in turn_ref.evidence().iter().enumerate() {
        let text = chip_text(index + 1, chunk.label(), &chunk.score_percent());
        let text_width = text.width();
        if used > 0 && used + 1 + text_width > width {
            lines.push(Line::from(std::mem::replace(&mut spans, vec![Span::raw(indent.to_string())])));
            used = 0;
        }
        if used > 0 {
            spans.push(Span::raw(" "));
            used += 1;
        }

        let selected = app.selected_chip() == Some((turn, index));
        let opened = app
            .selection()
            .visible()
            .map(|o| o.turn == turn && o.index == index)
            .unwrap_or(false);
        let style = if selected && app.ui.focus == Focus::Evidence {
            Style::default().fg(BG_DARK).bg(CYAN_LIGHT).add_modifier(Modifier::BOLD)
        } else if opened {
            Style::default().fg(CYAN_LIGHT).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(LAVENDER)
        };

        spans.push(Span::styled(text, style));
        used += text_width;
    }

    lines.push(Line::from(spans));
    lines
}

fn draw_input(frame: &mut Frame, app: &App, area: Rect) {
    // Border color based on focus - pulse when focused, dim when not
    let border_color = if app.ui.focus == Focus::Input {
        let glow = (app.animation_frame as f64 / 90.0).sin() * 0.3 + 0.7;
        let r = (101.0 * glow) as u8;
        let g = (150.0 * glow) as u8;
        let b = (243.0 * glow) as u8;
        Color::Rgb(r, g, b)
    } else {
        BORDER_DIM
    };

    let mut block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(border_color));
    if let Some(status) = &app.ui.status {
        let color = match status.kind {
            StatusKind::Info => OLIVE,
            StatusKind::Error => BURGUNDY,
        };
        block = block.title_bottom(Span::styled(format!(" {} ", status.text), Style::default().fg(color)));
    }

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let cursor = if app.animation_frame % 30 < 15 { "|" } else { " " };
    let input = if app.ui.input.is_empty() && !app.input_enabled() {
        Paragraph::new(Line::from(vec![
            Span::styled(" > ", Style::default().fg(TEXT_PRIMARY)),
            Span::styled(INPUT_PLACEHOLDER, Style::default().fg(TEXT_MUTED).add_modifier(Modifier::ITALIC)),
        ]))
    } else {
        Paragraph::new(format!(" > {}{}", app.ui.input, cursor))
            .style(Style::default().fg(TEXT_PRIMARY))
            .wrap(Wrap { trim: false })
    };
    frame.render_widget(input, inner);
}

fn draw_command_popup(frame: &mut Frame, app: &App, chat_area: Rect) {
    let filtered = app.get_filtered_commands();

    if filtered.is_empty() {
        return;
    }

    // +1 for the "your input" option, +2 for borders
    let popup_height = (filtered.len() + 3) as u16;
    let popup_width = 50.min(chat_area.width.saturating_sub(4));
    let popup_x = chat_area.x + 2;
    let popup_y = chat_area.y + chat_area.height.saturating_sub(popup_height + 4);

    let popup_area = Rect {
        x: popup_x,
        y: popup_y,
        width: popup_width,
        height: popup_height,
    }
    .intersection(chat_area);
    if popup_area.is_empty() {
        return;
    }

    // Clear area behind popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .title(Span::styled(" Commands ", Style::default().fg(COPPER).add_modifier(Modifier::BOLD)))
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(COPPER))
        .style(Style::default().bg(BG_PANEL));

    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let mut lines: Vec<Line> = Vec::new();

    // First option: current typed input (selected when command_selection is None)
    let input_selected = app.ui.command_selection.is_none();
    let input_style = if input_selected {
        Style::default().fg(CYAN_LIGHT).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(TEXT_SECONDARY)
    };
    let indicator = if input_selected { ">" } else { " " };
    lines.push(Line::from(vec![
        Span::styled(format!("{} {} ", indicator, &app.ui.input), input_style),
        Span::styled("(your input)", Style::default().fg(TEXT_MUTED).add_modifier(Modifier::ITALIC)),
    ]));

    for (i, (cmd, desc)) in filtered.iter().enumerate() {
        let is_selected = app.ui.command_selection == Some(i);
        let style = if is_selected {
            Style::default().fg(CYAN_LIGHT).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(TEXT_SECONDARY)
        };
        let indicator = if is_selected { ">" } else { " " };

        lines.push(Line::from(vec![
            Span::styled(format!("{} {} ", indicator, cmd), style),
            Span::styled(format!("- {}", desc), Style::default().fg(TEXT_MUTED)),
        ]));
    }

    frame.render_widget(Paragraph::new(lines), inner);
}

/// Rect of `percent_x` x `percent_y` centred in `area`.
fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let width = (u32::from(area.width) * u32::from(percent_x.min(100)) / 100) as u16;
    let height = (u32::from(area.height) * u32::from(percent_y.min(100)) / 100) as u16;
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn draw_evidence_drawer(frame: &mut Frame, app: &App, chat_area: Rect) {
    let Some(opened) = app.selection().visible() else {
        return;
    };
    let chunk = &opened.chunk;

    let drawer = centered_rect(80, 70, chat_area);
    frame.render_widget(Clear, drawer);

    let block = Block::default()
        .title(Span::styled(
            format!(" Evidence #{}: {} ", opened.index + 1, chunk.label()),
            Style::default().fg(CYAN_LIGHT).add_modifier(Modifier::BOLD),
        ))
        .title_bottom(Span::styled(" ESC close  c copy ", Style::default().fg(TEXT_MUTED)))
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(SAPPHIRE))
        .style(Style::default().bg(BG_PANEL));

    let inner = block.inner(drawer);
    frame.render_widget(block, drawer);

    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4), // Metadata
            Constraint::Min(1),    // Content
        ])
        .split(inner);

    let test_name = chunk
        .test_name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or("N/A");
    let source = if chunk.source.is_empty() { "N/A" } else { chunk.source.as_str() };

    let meta = vec![
        Line::from(vec![
            Span::styled(" Source:  ", Style::default().fg(TEXT_MUTED)),
            Span::styled(source.to_string(), Style::default().fg(TEXT_SECONDARY)),
        ]),
        Line::from(vec![
            Span::styled(" Test:    ", Style::default().fg(TEXT_MUTED)),
            Span::styled(test_name.to_string(), Style::default().fg(TEXT_PRIMARY).add_modifier(Modifier::BOLD)),
        ]),
        Line::from(vec![
            Span::styled(" Score:   ", Style::default().fg(TEXT_MUTED)),
            Span::styled(
                format!("{} Match", chunk.score_percent()),
                Style::default().fg(OLIVE).add_modifier(Modifier::BOLD),
            ),
        ]),
    ];
    frame.render_widget(Paragraph::new(meta), sections[0]);

    let content = Paragraph::new(chunk.content.clone())
        .style(Style::default().fg(TEXT_PRIMARY))
        .wrap(Wrap { trim: false });
    let content_area = Rect {
        x: sections[1].x + 1,
        width: sections[1].width.saturating_sub(2),
        ..sections[1]
    }
    .intersection(sections[1]);
    frame.render_widget(content, content_area);
}

fn draw_help(frame: &mut Frame, area: Rect) {
    let height = (COMMANDS.len() as u16 + 12).min(area.height);
    let width = 60.min(area.width);
    let help_area = Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    };
    frame.render_widget(Clear, help_area);

    let block = Block::default()
        .title(Span::styled(" Help ", Style::default().fg(SAPPHIRE).add_modifier(Modifier::BOLD)))
        .title_bottom(Span::styled(" ESC close ", Style::default().fg(TEXT_MUTED)))
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(SAPPHIRE_DARK))
        .style(Style::default().bg(BG_PANEL));

    let inner = block.inner(help_area);
    frame.render_widget(block, help_area);

    let key_line = |key: &'static str, desc: &'static str| {
        Line::from(vec![
            Span::styled(format!(" {:<10}", key), Style::default().fg(COPPER).add_modifier(Modifier::BOLD)),
            Span::styled(desc, Style::default().fg(TEXT_SECONDARY)),
        ])
    };

    let mut lines = vec![
        key_line("Enter", "Ask / run command / open chip"),
        key_line("Tab", "Switch between input and evidence chips"),
        key_line("Up/Down", "Scroll, or move the chip cursor"),
        key_line("Ctrl+V", "Paste"),
        key_line("c", "Copy evidence (drawer open)"),
        key_line("Esc", "Close drawer, clear input, quit"),
        key_line("Ctrl+C", "Quit"),
        Line::from(""),
    ];
    for (cmd, desc) in COMMANDS {
        lines.push(Line::from(vec![
            Span::styled(format!(" {:<10}", cmd), Style::default().fg(SAPPHIRE)),
            Span::styled(*desc, Style::default().fg(TEXT_MUTED)),
        ]));
    }

    frame.render_widget(Paragraph::new(lines), inner);
}
