// Session state containers: the current analysis, the conversation log and
// the evidence selection. Only the App controller mutates them.

use chrono::{DateTime, Utc};

use crate::medical::{EvidenceChunk, MedicalAnalysis};

/// The analysis from the most recent successful upload.
#[derive(Debug, Default)]
pub struct AnalysisState {
    current: Option<MedicalAnalysis>,
}

impl AnalysisState {
    pub fn current(&self) -> Option<&MedicalAnalysis> {
        self.current.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.current.is_some()
    }

    /// Swap in a new analysis as a whole; nothing is merged with the old one.
    pub fn replace(&mut self, analysis: MedicalAnalysis) {
        self.current = Some(analysis);
    }
}

/// Position of a turn in the conversation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TurnId(pub usize);

#[derive(Debug, Clone, PartialEq)]
pub enum Turn {
    User {
        text: String,
        at: DateTime<Utc>,
    },
    Assistant {
        text: String,
        evidence: Vec<EvidenceChunk>,
        failed: bool,
        at: DateTime<Utc>,
    },
}

impl Turn {
    pub fn text(&self) -> &str {
        match self {
            Turn::User { text, .. } | Turn::Assistant { text, .. } => text,
        }
    }

    pub fn evidence(&self) -> &[EvidenceChunk] {
        match self {
            Turn::User { .. } => &[],
            Turn::Assistant { evidence, .. } => evidence,
        }
    }
}

/// Append-only log of chat turns.
///
/// `reset` drops the whole log and bumps the generation, which lets a pending
/// answer detect that its question is gone.
#[derive(Debug, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
    generation: u64,
}

impl Conversation {
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn get(&self, id: TurnId) -> Option<&Turn> {
        self.turns.get(id.0)
    }

    pub fn evidence(&self, id: TurnId, index: usize) -> Option<&EvidenceChunk> {
        self.get(id)?.evidence().get(index)
    }

    pub fn push_user(&mut self, text: impl Into<String>) -> TurnId {
        self.push(Turn::User {
            text: text.into(),
            at: Utc::now(),
        })
    }

    pub fn push_assistant(&mut self, text: impl Into<String>, evidence: Vec<EvidenceChunk>) -> TurnId {
        self.push(Turn::Assistant {
            text: text.into(),
            evidence,
            failed: false,
            at: Utc::now(),
        })
    }

    /// Assistant turn standing in for an answer that never arrived.
    pub fn push_failure(&mut self, text: impl Into<String>) -> TurnId {
        self.push(Turn::Assistant {
            text: text.into(),
            evidence: Vec::new(),
            failed: true,
            at: Utc::now(),
        })
    }

    pub fn reset(&mut self) {
        self.turns.clear();
        self.generation += 1;
    }

    /// Every evidence chip in log order, as `(turn, index within turn)`.
    pub fn chips(&self) -> Vec<(TurnId, usize)> {
        self.turns
            .iter()
            .enumerate()
            .flat_map(|(i, turn)| (0..turn.evidence().len()).map(move |j| (TurnId(i), j)))
            .collect()
    }

    /// The most recent assistant turn that carries evidence.
    pub fn latest_with_evidence(&self) -> Option<TurnId> {
        self.turns
            .iter()
            .rposition(|turn| !turn.evidence().is_empty())
            .map(TurnId)
    }

    fn push(&mut self, turn: Turn) -> TurnId {
        self.turns.push(turn);
        TurnId(self.turns.len() - 1)
    }
}

/// A chunk opened in the evidence drawer, remembered with the turn it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenedEvidence {
    pub turn: TurnId,
    pub index: usize,
    pub chunk: EvidenceChunk,
}

#[derive(Debug, Default)]
pub struct Selection {
    opened: Option<OpenedEvidence>,
    visible: bool,
}

impl Selection {
    pub fn open(&mut self, evidence: OpenedEvidence) {
        self.opened = Some(evidence);
        self.visible = true;
    }

    /// Hide the drawer. The last chunk is kept but never shown while hidden.
    pub fn close(&mut self) {
        self.visible = false;
    }

    pub fn clear(&mut self) {
        self.opened = None;
        self.visible = false;
    }

    pub fn is_visible(&self) -> bool {
        self.visible && self.opened.is_some()
    }

    pub fn visible(&self) -> Option<&OpenedEvidence> {
        if self.visible {
            self.opened.as_ref()
        } else {
            None
        }
    }
}
