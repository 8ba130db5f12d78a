//! Log classifier and analysis parser.
//!
//! Every non market-data event becomes one immutable [`LogEntry`]. Multi-line
//! `ai_analysis` messages are additionally split into labelled fields by the
//! ordered prefix table [`ANALYSIS_RULES`].

use crate::envelope::Envelope;
use cockpit_core::EventKind;
use serde::Serialize;
use std::collections::VecDeque;

/// Semantic field of one analysis line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisField {
    Regime,
    Strategy,
    Macro,
    Micro,
    Adaptability,
    Reason,
    /// Unlabelled continuation line.
    Other,
}

/// Prefix rules, tested in order. The engine writes labels in English or Portuguese.
pub const ANALYSIS_RULES: &[(&str, AnalysisField)] = &[
    ("Regime:", AnalysisField::Regime),
    ("Strategy:", AnalysisField::Strategy),
    ("Estratégia:", AnalysisField::Strategy),
    ("Macro:", AnalysisField::Macro),
    ("Micro:", AnalysisField::Micro),
    ("Adaptability:", AnalysisField::Adaptability),
    ("Adaptabilidade:", AnalysisField::Adaptability),
    ("Reason:", AnalysisField::Reason),
    ("Motivo:", AnalysisField::Reason),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisLine {
    pub field: AnalysisField,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedAnalysis {
    pub headline: String,
    pub fields: Vec<AnalysisLine>,
}

/// Classify one line against [`ANALYSIS_RULES`].
pub fn classify_line(line: &str) -> AnalysisLine {
    let line = line.trim();
    ANALYSIS_RULES
        .iter()
        .find_map(|(prefix, field)| {
            line.strip_prefix(prefix).map(|rest| AnalysisLine {
                field: *field,
                value: rest.trim().to_string(),
            })
        })
        .unwrap_or_else(|| AnalysisLine {
            field: AnalysisField::Other,
            value: line.to_string(),
        })
}

/// Split a multi-line analysis message. Single-line messages yield `None`.
///
/// The first line is the headline. Blank lines after it are skipped, so a
/// headline followed only by blank lines is still a single-line message.
pub fn parse_analysis(message: &str) -> Option<ParsedAnalysis> {
    let mut lines = message.lines();
    let headline = lines.next()?.trim().to_string();

    let fields: Vec<AnalysisLine> = lines
        .filter(|line| !line.trim().is_empty())
        .map(classify_line)
        .collect();
    if fields.is_empty() {
        return None;
    }

    Some(ParsedAnalysis { headline, fields })
}

/// Immutable operator log entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub id: String,
    pub timestamp: String,
    pub kind: EventKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<ParsedAnalysis>,
}

/// Build the log entry for an event. Never fails.
pub fn classify(event: &Envelope) -> LogEntry {
    let analysis = match event.kind {
        EventKind::AiAnalysis => parse_analysis(&event.message),
        _ => None,
    };

    LogEntry {
        id: event.id.clone(),
        timestamp: event.timestamp.clone(),
        kind: event.kind,
        message: event.message.clone(),
        analysis,
    }
}

/// Append-only, insertion-ordered log with optional retention.
#[derive(Debug, Clone)]
pub struct EventLog {
    entries: VecDeque<LogEntry>,
    /// 0 = unbounded.
    max_entries: usize,
}

impl EventLog {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_entries,
        }
    }

    /// Append an entry, evicting the oldest one when over capacity.
    pub fn push(&mut self, entry: LogEntry) -> Option<LogEntry> {
        self.entries.push_back(entry);
        if self.max_entries > 0 && self.entries.len() > self.max_entries {
            return self.entries.pop_front();
        }
        None
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_vec(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(0)
    }
}
