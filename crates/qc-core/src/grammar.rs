//! Line-oriented step grammars as data.
//!
//! Each grammar family is a table of markers. A marker matches at the start
//! of a line (after indentation) as `Word:` or, for numbered markers,
//! `Word <n>:`. Full-width colons are accepted as well.

use crate::step::StepKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerPattern {
    /// `Word:`
    Literal(&'static str),
    /// `Word <n>:`
    Numbered(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerRole {
    /// Opens a new step of this kind.
    Start(StepKind),
    /// Feeds the input of the open step of this kind.
    Continue(StepKind),
    /// Ends step parsing; the rest of the text is the response.
    Terminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    pub pattern: MarkerPattern,
    pub role: MarkerRole,
    /// Whether this marker identifies the family during detection.
    pub leading: bool,
}

impl Marker {
    const fn start(word: &'static str, kind: StepKind, leading: bool) -> Self {
        Self {
            pattern: MarkerPattern::Literal(word),
            role: MarkerRole::Start(kind),
            leading,
        }
    }

    const fn numbered(word: &'static str, kind: StepKind, leading: bool) -> Self {
        Self {
            pattern: MarkerPattern::Numbered(word),
            role: MarkerRole::Start(kind),
            leading,
        }
    }

    const fn input_of(word: &'static str, parent: StepKind) -> Self {
        Self {
            pattern: MarkerPattern::Literal(word),
            role: MarkerRole::Continue(parent),
            leading: false,
        }
    }

    const fn terminal(word: &'static str) -> Self {
        Self {
            pattern: MarkerPattern::Literal(word),
            role: MarkerRole::Terminal,
            leading: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grammar {
    pub name: &'static str,
    pub markers: &'static [Marker],
}

/// A marker recognized on a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerMatch<'a> {
    pub role: MarkerRole,
    /// Text after the marker's colon.
    pub rest: &'a str,
    pub number: Option<u32>,
}

pub const PLANNING: Grammar = Grammar {
    name: "planning",
    markers: &[
        Marker::start("Planning", StepKind::Planning, true),
        Marker::numbered("Step", StepKind::Step, true),
        Marker::input_of("Tool Input", StepKind::ToolCall),
        Marker::start("Tool", StepKind::ToolCall, false),
        Marker::start("Result", StepKind::Observation, false),
        Marker::terminal("Summary"),
    ],
};

pub const REACT: Grammar = Grammar {
    name: "react",
    markers: &[
        Marker::start("Thought", StepKind::Thinking, true),
        Marker::input_of("Action Input", StepKind::Action),
        Marker::start("Action", StepKind::Action, true),
        Marker::start("Observation", StepKind::Observation, false),
        Marker::start("Observ", StepKind::Observation, false),
        Marker::terminal("Final Answer"),
    ],
};

/// Line grammars in detection priority order.
pub const LINE_GRAMMARS: &[Grammar] = &[PLANNING, REACT];

fn strip_colon(s: &str) -> Option<&str> {
    let s = s.trim_start_matches([' ', '\t']);
    s.strip_prefix(':').or_else(|| s.strip_prefix('：'))
}

impl MarkerPattern {
    fn strip<'a>(&self, line: &'a str) -> Option<(&'a str, Option<u32>)> {
        match self {
            MarkerPattern::Literal(word) => {
                let rest = strip_colon(line.strip_prefix(word)?)?;
                Some((rest, None))
            }
            MarkerPattern::Numbered(word) => {
                let after = line.strip_prefix(word)?.trim_start_matches([' ', '\t']);
                let digits = after
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(after.len());
                if digits == 0 {
                    return None;
                }
                let number = after[..digits].parse().ok()?;
                let rest = strip_colon(&after[digits..])?;
                Some((rest, Some(number)))
            }
        }
    }
}

impl Grammar {
    /// Match `line` against this grammar's markers, first hit wins.
    pub fn match_line<'a>(&self, line: &'a str) -> Option<MarkerMatch<'a>> {
        let line = line.trim_start();
        self.markers.iter().find_map(|marker| {
            marker
                .pattern
                .strip(line)
                .map(|(rest, number)| MarkerMatch {
                    role: marker.role,
                    rest,
                    number,
                })
        })
    }

    /// True if `line` starts with one of this family's leading markers.
    pub fn leads(&self, line: &str) -> bool {
        let line = line.trim_start();
        self.markers
            .iter()
            .filter(|m| m.leading)
            .any(|m| m.pattern.strip(line).is_some())
    }
}

/// Pick the grammar family for `text`: the first line starting with a
/// leading marker decides, testing families in priority order.
pub fn detect<'g>(text: &str, grammars: &'g [Grammar]) -> Option<&'g Grammar> {
    text.lines()
        .find_map(|line| grammars.iter().find(|g| g.leads(line)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_marker() {
        let m = REACT.match_line("Thought: check the spread").unwrap();
        assert_eq!(m.role, MarkerRole::Start(StepKind::Thinking));
        assert_eq!(m.rest, " check the spread");
    }

    #[test]
    fn test_input_marker_not_confused_with_parent() {
        let m = REACT.match_line("Action Input: {\"symbol\":\"AAPL\"}").unwrap();
        assert_eq!(m.role, MarkerRole::Continue(StepKind::Action));
        let m = PLANNING.match_line("Tool Input: {}").unwrap();
        assert_eq!(m.role, MarkerRole::Continue(StepKind::ToolCall));
        let m = PLANNING.match_line("Tool: get_quote").unwrap();
        assert_eq!(m.role, MarkerRole::Start(StepKind::ToolCall));
    }

    #[test]
    fn test_numbered_marker() {
        let m = PLANNING.match_line("Step 12: rebalance").unwrap();
        assert_eq!(m.number, Some(12));
        assert_eq!(m.rest, " rebalance");
        assert!(PLANNING.match_line("Step: no number").is_none());
        assert!(PLANNING.match_line("Stepwise: nope").is_none());
        assert!(PLANNING.match_line("Step 99999999999999999999: overflow").is_none());
    }

    #[test]
    fn test_observ_abbreviation() {
        let m = REACT.match_line("Observ: 42").unwrap();
        assert_eq!(m.role, MarkerRole::Start(StepKind::Observation));
        assert_eq!(m.rest, " 42");
        assert!(REACT.match_line("Observations are noisy").is_none());
    }

    #[test]
    fn test_full_width_colon_and_indent() {
        let m = REACT.match_line("  Final Answer： 买入").unwrap();
        assert_eq!(m.role, MarkerRole::Terminal);
        assert_eq!(m.rest, " 买入");
    }

    #[test]
    fn test_case_sensitive() {
        assert!(REACT.match_line("thought: lower").is_none());
    }

    #[test]
    fn test_detect_priority_and_position() {
        assert_eq!(
            detect("Planning: a\nThought: b", LINE_GRAMMARS).map(|g| g.name),
            Some("planning")
        );
        assert_eq!(
            detect("intro\nThought: b\nPlanning: a", LINE_GRAMMARS).map(|g| g.name),
            Some("react")
        );
        assert_eq!(detect("Result: only trailing markers", LINE_GRAMMARS), None);
        assert_eq!(detect("", LINE_GRAMMARS), None);
    }
}
