//! Markdown to HTML for assistant responses.
//!
//! Uses pulldown-cmark to parse and emit HTML. Raw HTML in the input is
//! turned into text so it is escaped, and code blocks are replaced with
//! syntect output.

use pulldown_cmark::{html, CodeBlockKind, CowStr, Event, Options, Parser, Tag, TagEnd};

use crate::highlight::{highlight_block, Highlight};

/// Immutable rendering configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    pub tables: bool,
    pub strikethrough: bool,
    pub tasklists: bool,
    pub highlight: Highlight,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            tables: true,
            strikethrough: true,
            tasklists: true,
            highlight: Highlight::Classed,
        }
    }
}

impl RenderOptions {
    fn cmark_options(&self) -> Options {
        let mut options = Options::empty();
        options.set(Options::ENABLE_TABLES, self.tables);
        options.set(Options::ENABLE_STRIKETHROUGH, self.strikethrough);
        options.set(Options::ENABLE_TASKLISTS, self.tasklists);
        options
    }
}

/// A fenced or indented code block being collected.
struct CodeBlock<'a> {
    lang: Option<String>,
    code: String,
    /// The original events, replayed if highlighting fails.
    events: Vec<Event<'a>>,
}

/// URL schemes that must not reach an `href` or `src`.
const BLOCKED_SCHEMES: &[&str] = &["javascript:", "vbscript:", "data:"];

fn safe_url(url: CowStr<'_>) -> CowStr<'_> {
    let lower = url.trim_start().to_ascii_lowercase();
    if BLOCKED_SCHEMES.iter().any(|scheme| lower.starts_with(scheme)) {
        CowStr::Borrowed("#")
    } else {
        url
    }
}

fn sanitize_tag(tag: Tag<'_>) -> Tag<'_> {
    match tag {
        Tag::Link {
            link_type,
            dest_url,
            title,
            id,
        } => Tag::Link {
            link_type,
            dest_url: safe_url(dest_url),
            title,
            id,
        },
        Tag::Image {
            link_type,
            dest_url,
            title,
            id,
        } => Tag::Image {
            link_type,
            dest_url: safe_url(dest_url),
            title,
            id,
        },
        other => other,
    }
}

/// Renders markdown text to an HTML string.
///
/// Rendering is pure: the same text and options always give the same output.
#[derive(Debug, Clone, Default)]
pub struct Renderer {
    options: RenderOptions,
}

impl Renderer {
    pub fn new(options: RenderOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    pub fn render(&self, text: &str) -> String {
        let parser = Parser::new_ext(text, self.options.cmark_options());
        let mut events: Vec<Event<'_>> = Vec::new();
        let mut block: Option<CodeBlock<'_>> = None;

        for event in parser {
            match event {
                Event::Start(Tag::CodeBlock(kind)) => {
                    let lang = match &kind {
                        CodeBlockKind::Fenced(info) => {
                            info.split_whitespace().next().map(str::to_string)
                        }
                        CodeBlockKind::Indented => None,
                    };
                    block = Some(CodeBlock {
                        lang,
                        code: String::new(),
                        events: vec![Event::Start(Tag::CodeBlock(kind))],
                    });
                }
                Event::End(TagEnd::CodeBlock) => {
                    let Some(mut finished) = block.take() else {
                        continue;
                    };
                    match highlight_block(
                        &finished.code,
                        finished.lang.as_deref(),
                        &self.options.highlight,
                    ) {
                        Some(highlighted) => events.push(Event::Html(highlighted.into())),
                        None => {
                            finished.events.push(Event::End(TagEnd::CodeBlock));
                            events.append(&mut finished.events);
                        }
                    }
                }
                Event::Text(text) => match block.as_mut() {
                    Some(open) => {
                        open.code.push_str(&text);
                        open.events.push(Event::Text(text));
                    }
                    None => events.push(Event::Text(text)),
                },
                Event::Html(raw) | Event::InlineHtml(raw) => events.push(Event::Text(raw)),
                Event::Start(tag) => events.push(Event::Start(sanitize_tag(tag))),
                other => events.push(other),
            }
        }

        // A block still open here means the input ended inside it.
        if let Some(mut open) = block.take() {
            open.events.push(Event::End(TagEnd::CodeBlock));
            events.append(&mut open.events);
        }

        let mut out = String::with_capacity(text.len() + text.len() / 2);
        html::push_html(&mut out, events.into_iter());
        tracing::trace!(input = text.len(), output = out.len(), "Rendered markdown");
        out
    }
}
