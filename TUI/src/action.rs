use std::path::PathBuf;

/// User actions that can be triggered by commands or UI events.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Toggle the help overlay
    Help,
    /// Clear chat history
    ClearHistory,
    /// Upload a lab report for analysis
    Upload {
        path: PathBuf,
    },
    /// Open the n-th (1-based) evidence chip of the latest answer
    OpenEvidence {
        position: usize,
    },
    /// Close the evidence drawer
    CloseEvidence,
    /// Export analysis and transcript
    Export {
        dir: Option<PathBuf>,
    },
    /// Quit application
    Quit,
}
