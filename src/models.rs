//! Data models flowing through the pipeline.
//!
//! - [`AnalysisResult`]: the three fields recovered from the model reply
//! - [`Section`]: the labels the model is asked to prefix each field with
//! - [`SheetRow`]: one spreadsheet row, in column order
//! - [`BackupRecord`]: one line of the local JSON backup log

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// `YYYY-MM-DD HH:MM:SS`, used for the sheet column and the backup record.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One of the three labeled sections in the model reply.
///
/// The order of [`Section::ALL`] is the column order in the sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Topic,
    Summary,
    Conclusion,
}

impl Section {
    pub const ALL: [Section; 3] = [Section::Topic, Section::Summary, Section::Conclusion];

    /// The label the model writes at the start of a line, without the colon.
    pub fn label(self) -> &'static str {
        match self {
            Section::Topic => "Chủ đề",
            Section::Summary => "Tóm tắt",
            Section::Conclusion => "Kết luận",
        }
    }

    /// Field name used in [`AnalysisResult`] and in the backup log.
    pub fn key(self) -> &'static str {
        match self {
            Section::Topic => "topic",
            Section::Summary => "summary",
            Section::Conclusion => "conclusion",
        }
    }
}

/// Structured analysis of one article. Any field may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub topic: String,
    pub summary: String,
    pub conclusion: String,
}

impl AnalysisResult {
    pub fn get(&self, section: Section) -> &str {
        match section {
            Section::Topic => &self.topic,
            Section::Summary => &self.summary,
            Section::Conclusion => &self.conclusion,
        }
    }

    pub(crate) fn get_mut(&mut self, section: Section) -> &mut String {
        match section {
            Section::Topic => &mut self.topic,
            Section::Summary => &mut self.summary,
            Section::Conclusion => &mut self.conclusion,
        }
    }

    /// Sections that came back empty, in column order.
    pub fn empty_sections(&self) -> Vec<Section> {
        Section::ALL
            .into_iter()
            .filter(|s| self.get(*s).is_empty())
            .collect()
    }
}

/// One appended spreadsheet row: `[URL, Topic, Summary, Conclusion, Timestamp]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRow {
    pub url: String,
    pub topic: String,
    pub summary: String,
    pub conclusion: String,
    pub timestamp: String,
}

impl SheetRow {
    pub fn new(url: &str, analysis: &AnalysisResult, at: DateTime<Local>) -> Self {
        Self {
            url: url.to_string(),
            topic: analysis.topic.clone(),
            summary: analysis.summary.clone(),
            conclusion: analysis.conclusion.clone(),
            timestamp: at.format(TIMESTAMP_FORMAT).to_string(),
        }
    }

    /// Header written when the sheet has no first row yet.
    pub fn header() -> Vec<String> {
        let mut header = vec!["URL".to_string()];
        header.extend(Section::ALL.iter().map(|s| s.label().to_string()));
        header.push("Timestamp".to_string());
        header
    }

    pub fn to_values(&self) -> Vec<String> {
        vec![
            self.url.clone(),
            self.topic.clone(),
            self.summary.clone(),
            self.conclusion.clone(),
            self.timestamp.clone(),
        ]
    }
}

/// One line of `backup_<YYYYMMDD>.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub timestamp: String,
    pub url: String,
    pub analysis: AnalysisResult,
}

impl From<&SheetRow> for BackupRecord {
    fn from(row: &SheetRow) -> Self {
        Self {
            timestamp: row.timestamp.clone(),
            url: row.url.clone(),
            analysis: AnalysisResult {
                topic: row.topic.clone(),
                summary: row.summary.clone(),
                conclusion: row.conclusion.clone(),
            },
        }
    }
}
