//! Consolidated parser for streamed assistant messages.
//!
//! `parse` is a pure function of the whole buffer and is re-run on every
//! token. It first pulls tagged spans (`<think>`, `<tool_call>`) out of the
//! buffer, then runs the detected line grammar over the remaining plain text,
//! and finally merges both step lists by their position in the buffer.
//!
//! A tagged span ends any line step open before it, so a prefix of the buffer
//! that stops right after a closing tag yields a prefix of the final steps.

use once_cell::sync::Lazy;
use std::borrow::Cow;
use regex::Regex;
use serde_json::Value;

use crate::grammar::{detect, Grammar, MarkerRole, LINE_GRAMMARS};
use crate::segment::{segment, Segment, TagPair, DEFAULT_TAGS};
use crate::step::{ParsedMessage, Step, StepKind};

static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#+\s").expect("heading pattern"));
static TABLE_ROW: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\|.*\|$").expect("table pattern"));

/// Stop-word truncation leaves this word dangling at the end of output.
const RESULT_ARTIFACT: &str = "Result";

/// Parser over a set of tag pairs and line grammars.
#[derive(Debug, Clone, Copy)]
pub struct Parser {
    pub tags: &'static [TagPair],
    pub grammars: &'static [Grammar],
}

impl Default for Parser {
    fn default() -> Self {
        Self {
            tags: DEFAULT_TAGS,
            grammars: LINE_GRAMMARS,
        }
    }
}

/// Parse `buffer` with the default tags and grammars.
pub fn parse(buffer: &str) -> ParsedMessage {
    Parser::default().parse(buffer)
}

impl Parser {
    pub fn parse(&self, buffer: &str) -> ParsedMessage {
        let segments = segment(buffer, self.tags);

        let mut steps: Vec<(usize, Step)> = Vec::new();
        let mut clean = CleanText::default();
        let mut open_tag = false;

        for seg in &segments {
            match seg {
                Segment::Plain { text, offset } => clean.push(text, *offset),
                Segment::Tagged {
                    tag,
                    text,
                    offset,
                    closed,
                } => {
                    open_tag |= !closed;
                    clean.mark_break();
                    if let Some(step) = tag_step(tag.kind, text) {
                        steps.push((*offset, step));
                    }
                }
            }
        }

        let lines = match detect(&clean.text, self.grammars) {
            Some(grammar) => parse_lines(&clean.text, &clean.breaks, grammar),
            None => LineParse {
                steps: Vec::new(),
                response: clean.text.clone(),
                in_progress: false,
            },
        };

        steps.extend(
            lines
                .steps
                .into_iter()
                .map(|(at, step)| (clean.buffer_offset(at), step)),
        );
        steps.sort_by_key(|(at, _)| *at);

        ParsedMessage {
            steps: steps.into_iter().map(|(_, step)| step).collect(),
            response: strip_result_artifact(&lines.response),
            is_streaming: open_tag || lines.in_progress,
        }
    }
}

/// Plain text with tag spans removed, plus a map back to buffer offsets.
#[derive(Default)]
struct CleanText {
    text: String,
    /// `(offset in text, offset in buffer)` for each plain segment.
    spans: Vec<(usize, usize)>,
    /// Offsets in text where a tagged span was removed.
    breaks: Vec<usize>,
}

impl CleanText {
    fn mark_break(&mut self) {
        let at = self.text.len();
        if self.breaks.last() != Some(&at) {
            self.breaks.push(at);
        }
    }

    fn push(&mut self, text: &str, buffer_offset: usize) {
        self.spans.push((self.text.len(), buffer_offset));
        self.text.push_str(text);
    }

    fn buffer_offset(&self, at: usize) -> usize {
        self.spans
            .iter()
            .rev()
            .find(|(start, _)| *start <= at)
            .map(|(start, buffer)| buffer + (at - start))
            .unwrap_or(at)
    }
}

fn tag_step(kind: StepKind, text: &str) -> Option<Step> {
    let content = strip_result_artifact(text);
    if content.is_empty() {
        return None;
    }
    let mut step = Step::new(kind, content.as_str());
    if kind == StepKind::ToolCall {
        if let Ok(Value::Object(call)) = serde_json::from_str::<Value>(&content) {
            if let Some(name) = call.get("name").and_then(Value::as_str) {
                step.tool = Some(name.to_string());
            }
            if let Some(args) = call.get("arguments").or_else(|| call.get("parameters")) {
                step.input = Some(match args {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                });
            }
        }
    }
    Some(step)
}

struct LineParse {
    steps: Vec<(usize, Step)>,
    response: String,
    /// Grammar markers seen but no terminal marker or drift into markdown.
    in_progress: bool,
}

struct PendingStep<'a> {
    kind: StepKind,
    number: Option<u32>,
    offset: usize,
    content: Vec<&'a str>,
    input: Option<Vec<&'a str>>,
}

impl<'a> PendingStep<'a> {
    fn new(kind: StepKind, number: Option<u32>, offset: usize) -> Self {
        Self {
            kind,
            number,
            offset,
            content: Vec::new(),
            input: None,
        }
    }

    fn push(&mut self, line: &'a str) {
        match self.input.as_mut() {
            Some(input) => input.push(line),
            None => self.content.push(line),
        }
    }

    fn finish(self) -> Option<(usize, Step)> {
        let content = strip_result_artifact(&self.content.join("\n"));
        let input = self
            .input
            .map(|lines| strip_result_artifact(&lines.join("\n")))
            .filter(|s| !s.is_empty());
        if content.is_empty() && input.is_none() {
            return None;
        }

        let tool = match self.kind {
            StepKind::Action | StepKind::ToolCall => content
                .lines()
                .next()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            _ => None,
        };

        Some((
            self.offset,
            Step {
                kind: self.kind,
                content,
                number: self.number,
                tool,
                input,
            },
        ))
    }
}

fn is_markdown_block(line: &str) -> bool {
    HEADING.is_match(line) || TABLE_ROW.is_match(line.trim_end())
}

fn flush(pending: &mut Option<PendingStep<'_>>, steps: &mut Vec<(usize, Step)>) {
    if let Some(step) = pending.take().and_then(PendingStep::finish) {
        steps.push(step);
    }
}

/// One line of clean text, or the part of a line on one side of a tag.
struct Piece<'a> {
    offset: usize,
    text: &'a str,
    /// Starts where a tagged span was removed.
    after_tag: bool,
    /// Continues the previous piece's line.
    mid_line: bool,
}

fn pieces<'a>(text: &'a str, breaks: &[usize]) -> Vec<Piece<'a>> {
    let mut bounds: Vec<usize> = breaks
        .iter()
        .copied()
        .filter(|&at| at > 0 && at < text.len())
        .collect();
    bounds.push(text.len());

    let mut out = Vec::new();
    let mut start = 0;
    for end in bounds {
        let mut offset = start;
        for raw in text[start..end].split_inclusive('\n') {
            let first = offset == start && start > 0;
            out.push(Piece {
                offset,
                text: raw.trim_end_matches(['\n', '\r']),
                after_tag: first,
                mid_line: first && !text[..start].ends_with('\n'),
            });
            offset += raw.len();
        }
        start = end;
    }
    out
}

/// Push `line`, or glue it onto the last line when it continues that line.
fn push_line<'a>(lines: &mut Vec<Cow<'a, str>>, line: &'a str, joins: bool) {
    match lines.last_mut() {
        Some(last) if joins => last.to_mut().push_str(line),
        _ => lines.push(Cow::Borrowed(line)),
    }
}

fn parse_lines(text: &str, breaks: &[usize], grammar: &Grammar) -> LineParse {
    let mut steps = Vec::new();
    let mut preface: Vec<Cow<str>> = Vec::new();
    let mut response: Option<Vec<Cow<str>>> = None;
    let mut pending: Option<PendingStep> = None;
    let mut last_in_preface = false;

    for piece in pieces(text, breaks) {
        let line_offset = piece.offset;
        let line = piece.text;

        if let Some(response) = response.as_mut() {
            push_line(response, line, piece.mid_line);
            continue;
        }
        if piece.after_tag {
            flush(&mut pending, &mut steps);
        }

        let in_preface = last_in_preface;
        last_in_preface = false;
        match grammar.match_line(line) {
            Some(m) => match m.role {
                MarkerRole::Terminal => {
                    flush(&mut pending, &mut steps);
                    response = Some(vec![Cow::Borrowed(m.rest.trim_start())]);
                }
                MarkerRole::Start(kind) => {
                    flush(&mut pending, &mut steps);
                    let mut step = PendingStep::new(kind, m.number, line_offset);
                    step.push(m.rest);
                    pending = Some(step);
                }
                MarkerRole::Continue(parent) => {
                    let continues = pending.as_ref().is_some_and(|p| p.kind == parent);
                    if !continues {
                        flush(&mut pending, &mut steps);
                        pending = Some(PendingStep::new(parent, None, line_offset));
                    }
                    if let Some(step) = pending.as_mut() {
                        step.input.get_or_insert_with(Vec::new).push(m.rest);
                    }
                }
            },
            None => {
                if pending.is_some() && is_markdown_block(line) {
                    flush(&mut pending, &mut steps);
                    response = Some(vec![Cow::Borrowed(line)]);
                } else if let Some(step) = pending.as_mut() {
                    step.push(line);
                } else {
                    push_line(&mut preface, line, piece.mid_line && in_preface);
                    last_in_preface = true;
                }
            }
        }
    }

    let in_progress = response.is_none();
    flush(&mut pending, &mut steps);

    preface.extend(response.unwrap_or_default());
    LineParse {
        steps,
        response: preface.join("\n"),
        in_progress,
    }
}

/// Remove the dangling `Result` word left by stop-word truncation, both as
/// a standalone line and as a trailing token, then trim.
pub fn strip_result_artifact(text: &str) -> String {
    let kept: Vec<&str> = text
        .lines()
        .filter(|line| line.trim() != RESULT_ARTIFACT)
        .collect();
    let joined = kept.join("\n");
    let mut out = joined.trim();

    if let Some(before) = out.strip_suffix(RESULT_ARTIFACT) {
        if before.ends_with(char::is_whitespace) {
            out = before.trim_end();
        }
    }
    out.to_string()
}
