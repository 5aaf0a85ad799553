// Report analysis and evidence types as the MedRag backend returns them.
//
// The backend is loose about value types (a lab result may be a number, a
// string like `"<0.5"`, or null), so these types accept what they are given
// and render it as-is instead of rejecting the payload.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Label shown for evidence chunks that carry no test name.
pub const UNNAMED_EVIDENCE: &str = "Report Data";

/// A fragment of the source document retrieved to support an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceChunk {
    pub content: String,
    #[serde(default)]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_name: Option<String>,
    #[serde(default)]
    pub score: f64,
}

impl EvidenceChunk {
    /// Chip label: the lab test this chunk belongs to, if known.
    pub fn label(&self) -> &str {
        self.test_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(UNNAMED_EVIDENCE)
    }

    pub fn score_percent(&self) -> String {
        format_score(self.score)
    }
}

/// Relevance as a percentage with one decimal: `0.87` -> `87.0%`.
///
/// Scores are not clamped; the backend may return distances above 1.
pub fn format_score(score: f64) -> String {
    format!("{:.1}%", score * 100.0)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_gender_raw: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_datetime: Option<String>,
}

impl PatientInfo {
    pub fn display_name(&self) -> &str {
        non_blank(&self.name).unwrap_or("Unknown Patient")
    }

    pub fn display_details(&self) -> &str {
        non_blank(&self.age_gender_raw).unwrap_or("Details not specified")
    }

    pub fn display_registered(&self) -> &str {
        non_blank(&self.registration_date).unwrap_or("N/A")
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// A result or reference bound, typed as loosely as the backend sends it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LabValue {
    #[default]
    Missing,
    Number(f64),
    Text(String),
    Other(serde_json::Value),
}

impl LabValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, LabValue::Missing)
    }
}

impl fmt::Display for LabValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabValue::Missing => write!(f, "N/A"),
            LabValue::Number(n) => write!(f, "{}", n),
            LabValue::Text(s) => write!(f, "{}", s),
            LabValue::Other(v) => write!(f, "{}", v),
        }
    }
}

/// Abnormality flag. `H` and `L` are the documented values; anything else is
/// kept verbatim so unexpected backend output still renders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Flag(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagKind {
    High,
    Low,
    Other,
}

impl Flag {
    pub fn kind(&self) -> FlagKind {
        match self.0.trim() {
            "H" => FlagKind::High,
            "L" => FlagKind::Low,
            _ => FlagKind::Other,
        }
    }
}

impl<'de> Deserialize<'de> for Flag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Flag(Option::<String>::deserialize(deserializer)?.unwrap_or_default()))
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One lab value the backend flagged outside its reference range.
///
/// Presence in [`MedicalAnalysis::abnormal`] is the only abnormality signal;
/// the client never re-checks the value against the range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbnormalFinding {
    pub name: String,
    #[serde(default)]
    pub result: LabValue,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub flag: Flag,
    #[serde(default)]
    pub ref_low: LabValue,
    #[serde(default)]
    pub ref_high: LabValue,
}

impl AbnormalFinding {
    pub fn display_result(&self) -> String {
        if self.unit.is_empty() {
            self.result.to_string()
        } else {
            format!("{} {}", self.result, self.unit)
        }
    }

    pub fn display_range(&self) -> String {
        if self.ref_low.is_missing() && self.ref_high.is_missing() {
            "N/A".to_string()
        } else {
            format!("{}-{}", self.ref_low, self.ref_high)
        }
    }
}

/// Structured summary extracted from one uploaded report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MedicalAnalysis {
    #[serde(default)]
    pub patient_info: PatientInfo,
    #[serde(default)]
    pub report_type: String,
    #[serde(default)]
    pub abnormal: Vec<AbnormalFinding>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_deserialize_cbc() {
        let json = r#"{
            "patient_info": {"name": "J. Doe"},
            "report_type": "CBC",
            "abnormal": [
                {"name": "Hemoglobin", "result": 9.1, "unit": "g/dL", "flag": "L", "ref_low": 12, "ref_high": 16}
            ]
        }"#;

        let analysis: MedicalAnalysis = serde_json::from_str(json).unwrap();

        assert_eq!(analysis.patient_info.display_name(), "J. Doe");
        assert_eq!(analysis.report_type, "CBC");
        assert_eq!(analysis.abnormal.len(), 1);
        let finding = &analysis.abnormal[0];
        assert_eq!(finding.flag.kind(), FlagKind::Low);
        assert!(matches!(finding.result, LabValue::Number(n) if (n - 9.1).abs() < 1e-9));
        assert_eq!(finding.display_result(), "9.1 g/dL");
        assert_eq!(finding.display_range(), "12-16");
    }

    #[test]
    fn test_analysis_deserialize_defaults() {
        let analysis: MedicalAnalysis = serde_json::from_str("{}").unwrap();

        assert!(analysis.abnormal.is_empty());
        assert_eq!(analysis.report_type, "");
        assert_eq!(analysis.patient_info.display_name(), "Unknown Patient");
        assert_eq!(analysis.patient_info.display_details(), "Details not specified");
        assert_eq!(analysis.patient_info.display_registered(), "N/A");
    }

    #[test]
    fn test_unknown_flag_is_kept() {
        let json = r#"{"name": "Glucose", "result": "145", "unit": "mg/dL", "flag": "HH"}"#;

        let finding: AbnormalFinding = serde_json::from_str(json).unwrap();

        assert_eq!(finding.flag.kind(), FlagKind::Other);
        assert_eq!(finding.flag.to_string(), "HH");
        assert_eq!(finding.result, LabValue::Text("145".to_string()));
    }

    #[test]
    fn test_null_flag_and_bounds() {
        let json = r#"{"name": "CRP", "result": "<0.5", "flag": null, "ref_low": null}"#;

        let finding: AbnormalFinding = serde_json::from_str(json).unwrap();

        assert_eq!(finding.flag.to_string(), "");
        assert!(finding.ref_low.is_missing());
        assert!(finding.ref_high.is_missing());
        assert_eq!(finding.display_range(), "N/A");
        assert_eq!(finding.display_result(), "<0.5");
    }

    #[test]
    fn test_lab_value_other_json() {
        let value: LabValue = serde_json::from_str("[1, 2]").unwrap();

        assert!(matches!(value, LabValue::Other(_)));
        assert_eq!(value.to_string(), "[1,2]");
    }

    #[test]
    fn test_format_score() {
        assert_eq!(format_score(0.87), "87.0%");
        assert_eq!(format_score(0.0), "0.0%");
        assert_eq!(format_score(1.234), "123.4%");
    }

    #[test]
    fn test_chunk_label_falls_back() {
        let chunk: EvidenceChunk =
            serde_json::from_str(r#"{"content": "WBC 11.2 H", "source": "doc1", "score": 0.5}"#).unwrap();
        assert_eq!(chunk.label(), UNNAMED_EVIDENCE);

        let named = EvidenceChunk {
            test_name: Some("WBC".to_string()),
            ..chunk
        };
        assert_eq!(named.label(), "WBC");
    }
}
