//! Extraction of `<TestCaseResult>` elements from CTS output.
//!
//! A raw `TestResults.qpa` log interleaves `#` control lines with one XML fragment per case; those
//! fragments are cut out with a pattern and parsed one by one. An XML export is parsed whole.
//! Only direct children of each case are read: the first `Number`, the first `Result` and the
//! first `Text`.

use crate::error::ReportError;
use regex::Regex;
use std::fmt;
use xml::attribute::OwnedAttribute;
use xml::reader::{ParserConfig, XmlEvent};

const CASE_ELEMENT: &str = "TestCaseResult";
const BLOCK_PATTERN: &str = r"(?s)<TestCaseResult[^>]*>.*?</TestCaseResult>";

pub const UNKNOWN_STATUS: &str = "UNKNOWN";
pub const UNKNOWN_CASE: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Xml,
    RawLog,
}

impl InputKind {
    pub fn detect(content: &str) -> Self {
        if content.contains("<TestCaseResult") && content.trim_start().starts_with("<?xml") {
            InputKind::Xml
        } else {
            InputKind::RawLog
        }
    }
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InputKind::Xml => "pure XML",
            InputKind::RawLog => "raw CTS log",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    pub case_path: String,
    pub duration_us: u64,
    pub status: String,
    pub message: String,
}

pub fn parse_cases(content: &str, kind: InputKind) -> Result<Vec<TestCase>, ReportError> {
    match kind {
        InputKind::Xml => parse_document(content),
        InputKind::RawLog => {
            let mut cases = Vec::new();
            for block in extract_blocks(content)? {
                cases.extend(parse_document(block)?);
            }
            Ok(cases)
        }
    }
}

/// Every complete `<TestCaseResult ...>...</TestCaseResult>` fragment of a raw log, in order.
pub fn extract_blocks(content: &str) -> Result<Vec<&str>, ReportError> {
    let pattern = Regex::new(BLOCK_PATTERN)?;
    Ok(pattern.find_iter(content).map(|m| m.as_str()).collect())
}

/// Every `TestCaseResult` element in `xml`, at any depth. Absent fields fall back to `unknown`,
/// `0`, `UNKNOWN` and the empty string.
pub fn parse_document(xml: &str) -> Result<Vec<TestCase>, ReportError> {
    let reader = ParserConfig::new()
        .cdata_to_characters(true)
        .create_reader(xml.as_bytes());
    let mut cases = Vec::new();
    let mut depth = 0usize;
    let mut current: Option<CaseBuilder> = None;

    for event in reader {
        match event? {
            XmlEvent::StartElement { name, attributes, .. } => {
                depth += 1;
                match current.as_mut() {
                    Some(case) => case.start_child(depth, &name.local_name, &attributes),
                    None if name.local_name == CASE_ELEMENT => {
                        current = Some(CaseBuilder::new(depth, attribute(&attributes, "CasePath")));
                    }
                    None => {}
                }
            }
            XmlEvent::Characters(text) => {
                if let Some(case) = current.as_mut() {
                    case.text(depth, &text);
                }
            }
            XmlEvent::EndElement { .. } => {
                if current.as_ref().is_some_and(|case| case.depth == depth) {
                    if let Some(case) = current.take() {
                        cases.push(case.finish()?);
                    }
                } else if let Some(case) = current.as_mut() {
                    case.end_child(depth);
                }
                depth = depth.saturating_sub(1);
            }
            _ => {}
        }
    }
    Ok(cases)
}

fn attribute(attributes: &[OwnedAttribute], name: &str) -> Option<String> {
    attributes
        .iter()
        .find(|a| a.name.local_name == name)
        .map(|a| a.value.clone())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Duration,
    Message,
}

/// Fields of one case as its child elements stream past.
#[derive(Debug)]
struct CaseBuilder {
    depth: usize,
    case_path: Option<String>,
    duration: Option<String>,
    result_seen: bool,
    status: Option<String>,
    message: Option<String>,
    /// Child whose own text is being collected, and its depth.
    reading: Option<(Field, usize)>,
}

impl CaseBuilder {
    fn new(depth: usize, case_path: Option<String>) -> Self {
        Self {
            depth,
            case_path,
            duration: None,
            result_seen: false,
            status: None,
            message: None,
            reading: None,
        }
    }

    fn start_child(&mut self, depth: usize, name: &str, attributes: &[OwnedAttribute]) {
        // An element's text ends at its first nested element.
        if self.reading.is_some_and(|(_, d)| depth > d) {
            self.reading = None;
        }
        if depth != self.depth + 1 {
            return;
        }
        match name {
            "Number" if self.duration.is_none() => {
                self.duration = Some(String::new());
                self.reading = Some((Field::Duration, depth));
            }
            "Text" if self.message.is_none() => {
                self.message = Some(String::new());
                self.reading = Some((Field::Message, depth));
            }
            "Result" if !self.result_seen => {
                self.result_seen = true;
                self.status = attribute(attributes, "StatusCode");
            }
            _ => {}
        }
    }

    fn text(&mut self, depth: usize, text: &str) {
        let target = match self.reading {
            Some((Field::Duration, d)) if d == depth => self.duration.as_mut(),
            Some((Field::Message, d)) if d == depth => self.message.as_mut(),
            _ => None,
        };
        if let Some(target) = target {
            target.push_str(text);
        }
    }

    fn end_child(&mut self, depth: usize) {
        if self.reading.is_some_and(|(_, d)| d == depth) {
            self.reading = None;
        }
    }

    fn finish(self) -> Result<TestCase, ReportError> {
        let case_path = self.case_path.unwrap_or_else(|| UNKNOWN_CASE.to_string());
        let duration_us = match self.duration.as_deref().map(str::trim) {
            None | Some("") => 0,
            Some(value) => value.parse().map_err(|_| ReportError::InvalidDuration {
                case: case_path.clone(),
                value: value.to_string(),
            })?,
        };
        Ok(TestCase {
            case_path,
            duration_us,
            status: self.status.unwrap_or_else(|| UNKNOWN_STATUS.to_string()),
            message: self.message.unwrap_or_default(),
        })
    }
}
