// Snapshot export of the current report analysis and chat transcript.

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::medical::{AbnormalFinding, EvidenceChunk, MedicalAnalysis, PatientInfo};
use crate::session::{Conversation, Turn};

#[derive(Serialize)]
struct ExportDocument<'a> {
    exported_at: DateTime<Utc>,
    report_type: &'a str,
    patient_summary: &'a PatientInfo,
    critical_findings: &'a [AbnormalFinding],
    transcript: Vec<TranscriptEntry<'a>>,
}

#[derive(Serialize)]
struct TranscriptEntry<'a> {
    role: &'static str,
    text: &'a str,
    evidence: &'a [EvidenceChunk],
    failed: bool,
    timestamp: DateTime<Utc>,
}

impl<'a> From<&'a Turn> for TranscriptEntry<'a> {
    fn from(turn: &'a Turn) -> Self {
        match turn {
            Turn::User { text, at } => Self {
                role: "user",
                text,
                evidence: &[],
                failed: false,
                timestamp: *at,
            },
            Turn::Assistant { text, evidence, failed, at } => Self {
                role: "assistant",
                text,
                evidence,
                failed: *failed,
                timestamp: *at,
            },
        }
    }
}

/// `Analysis_<patient>_<YYYYmmdd_HHMMSS>.json`
pub fn export_file_name(analysis: &MedicalAnalysis, now: DateTime<Utc>) -> String {
    let patient: String = analysis
        .patient_info
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or("Unknown")
        .chars()
        .map(|c| if c.is_whitespace() || c == '/' || c == '\\' { '_' } else { c })
        .collect();

    format!("Analysis_{}_{}.json", patient, now.format("%Y%m%d_%H%M%S"))
}

/// Write the export document into `dir`, creating it if needed. Returns the
/// path of the written file.
pub fn export_session(
    dir: &Path,
    analysis: &MedicalAnalysis,
    conversation: &Conversation,
    now: DateTime<Utc>,
) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let document = ExportDocument {
        exported_at: now,
        report_type: &analysis.report_type,
        patient_summary: &analysis.patient_info,
        critical_findings: &analysis.abnormal,
        transcript: conversation.turns().iter().map(TranscriptEntry::from).collect(),
    };

    let path = dir.join(export_file_name(analysis, now));
    let json = serde_json::to_string_pretty(&document)?;
    std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;

    tracing::info!(path = %path.display(), turns = conversation.len(), "exported session");
    Ok(path)
}
