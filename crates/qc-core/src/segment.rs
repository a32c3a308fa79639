//! Paired-tag extraction over a streaming buffer.
//!
//! Splits a buffer into plain-text and tagged spans, left to right. A tag
//! that is opened but not yet closed (the model is still writing it) becomes
//! a final open segment that swallows the rest of the buffer.

use crate::step::StepKind;

/// An opening/closing marker pair and the step kind its content produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagPair {
    pub kind: StepKind,
    pub open: &'static str,
    pub close: &'static str,
}

pub const THINK_TAG: TagPair = TagPair {
    kind: StepKind::Thinking,
    open: "<think>",
    close: "</think>",
};

pub const TOOL_CALL_TAG: TagPair = TagPair {
    kind: StepKind::ToolCall,
    open: "<tool_call>",
    close: "</tool_call>",
};

/// Tags recognized in assistant output.
pub const DEFAULT_TAGS: &[TagPair] = &[THINK_TAG, TOOL_CALL_TAG];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Plain {
        text: &'a str,
        offset: usize,
    },
    Tagged {
        tag: TagPair,
        text: &'a str,
        /// Byte offset of the opening marker.
        offset: usize,
        closed: bool,
    },
}

impl<'a> Segment<'a> {
    pub fn text(&self) -> &'a str {
        match self {
            Segment::Plain { text, .. } | Segment::Tagged { text, .. } => text,
        }
    }

    pub fn offset(&self) -> usize {
        match self {
            Segment::Plain { offset, .. } | Segment::Tagged { offset, .. } => *offset,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Segment::Tagged { closed: false, .. })
    }
}

/// Split `buffer` into ordered segments.
///
/// Tags do not nest: the first closing marker of the open tag ends the span.
/// A closing marker with no open tag is left in the plain text.
pub fn segment<'a>(buffer: &'a str, pairs: &[TagPair]) -> Vec<Segment<'a>> {
    let mut segments = Vec::new();
    let mut pos = 0;

    while pos < buffer.len() {
        let rest = &buffer[pos..];
        let next_open = pairs
            .iter()
            .filter_map(|pair| rest.find(pair.open).map(|at| (at, *pair)))
            .min_by_key(|(at, _)| *at);

        let Some((rel, tag)) = next_open else {
            segments.push(Segment::Plain {
                text: rest,
                offset: pos,
            });
            break;
        };

        if rel > 0 {
            segments.push(Segment::Plain {
                text: &rest[..rel],
                offset: pos,
            });
        }

        let open_at = pos + rel;
        let body_start = open_at + tag.open.len();
        match buffer[body_start..].find(tag.close) {
            Some(close_rel) => {
                let body_end = body_start + close_rel;
                segments.push(Segment::Tagged {
                    tag,
                    text: &buffer[body_start..body_end],
                    offset: open_at,
                    closed: true,
                });
                pos = body_end + tag.close.len();
            }
            None => {
                segments.push(Segment::Tagged {
                    tag,
                    text: &buffer[body_start..],
                    offset: open_at,
                    closed: false,
                });
                break;
            }
        }
    }

    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reconstruct(segments: &[Segment]) -> String {
        let mut out = String::new();
        for seg in segments {
            match seg {
                Segment::Plain { text, .. } => out.push_str(text),
                Segment::Tagged {
                    tag, text, closed, ..
                } => {
                    out.push_str(tag.open);
                    out.push_str(text);
                    if *closed {
                        out.push_str(tag.close);
                    }
                }
            }
        }
        out
    }

    #[test]
    fn test_empty_buffer() {
        assert!(segment("", DEFAULT_TAGS).is_empty());
    }

    #[test]
    fn test_plain_only() {
        let segs = segment("no tags here", DEFAULT_TAGS);
        assert_eq!(
            segs,
            vec![Segment::Plain {
                text: "no tags here",
                offset: 0
            }]
        );
    }

    #[test]
    fn test_closed_think_then_text() {
        let segs = segment("<think>check drawdown</think>Max DD is 12%", DEFAULT_TAGS);
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0].text(), "check drawdown");
        assert!(!segs[0].is_open());
        assert_eq!(segs[1].text(), "Max DD is 12%");
        assert_eq!(segs[1].offset(), 29);
    }

    #[test]
    fn test_unterminated_swallows_rest() {
        let segs = segment("intro<think>partial reasoning", DEFAULT_TAGS);
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[1].text(), "partial reasoning");
        assert_eq!(segs[1].offset(), 5);
        assert!(segs[1].is_open());
    }

    #[test]
    fn test_mixed_tags_in_document_order() {
        let buf = "<think>a</think>x<tool_call>{}</tool_call>y<think>b</think>";
        let segs = segment(buf, DEFAULT_TAGS);
        let kinds: Vec<_> = segs
            .iter()
            .map(|s| match s {
                Segment::Plain { .. } => None,
                Segment::Tagged { tag, .. } => Some(tag.kind),
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                Some(StepKind::Thinking),
                None,
                Some(StepKind::ToolCall),
                None,
                Some(StepKind::Thinking)
            ]
        );
        assert_eq!(reconstruct(&segs), buf);
    }

    #[test]
    fn test_stray_close_is_plain() {
        let segs = segment("oops</think> then text", DEFAULT_TAGS);
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].text(), "oops</think> then text");
    }

    #[test]
    fn test_double_open_takes_first_close() {
        let segs = segment("<think>a<think>b</think>c", DEFAULT_TAGS);
        assert_eq!(segs[0].text(), "a<think>b");
        assert_eq!(segs[1].text(), "c");
    }

    #[test]
    fn test_closed_segments_stable_under_extension() {
        let full = "<think>one</think>mid<think>two</think>tail<think>thr";
        let mut previous_closed: Vec<Segment> = Vec::new();
        for end in 0..=full.len() {
            let segs = segment(&full[..end], DEFAULT_TAGS);
            let closed: Vec<_> = segs
                .iter()
                .filter(|s| matches!(s, Segment::Tagged { closed: true, .. }))
                .cloned()
                .collect();
            assert!(closed.starts_with(&previous_closed), "prefix {end}");
            previous_closed = closed;
        }
        assert_eq!(previous_closed.len(), 2);
    }

    #[test]
    fn test_reconstruction_covers_buffer() {
        for buf in [
            "",
            "plain",
            "<think>",
            "<think></think>",
            "a<tool_call>{\"name\":\"x\"}</tool_call>b",
            "<think>unfinished <tool_call> inside",
        ] {
            assert_eq!(reconstruct(&segment(buf, DEFAULT_TAGS)), buf);
        }
    }
}
