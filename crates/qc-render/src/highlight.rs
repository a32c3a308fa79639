//! Syntax highlighting for code blocks.
//!
//! Uses syntect's bundled syntaxes and themes, loaded once.

use once_cell::sync::Lazy;
use syntect::{
    highlighting::{Theme, ThemeSet},
    html::{highlighted_html_for_string, ClassStyle, ClassedHTMLGenerator},
    parsing::{SyntaxReference, SyntaxSet},
    util::LinesWithEndings,
};

/// Lazily loaded syntax set.
static SYNTAX_SET: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);

/// Lazily loaded theme set.
static THEME_SET: Lazy<ThemeSet> = Lazy::new(ThemeSet::load_defaults);

pub const DEFAULT_THEME: &str = "InspiredGitHub";

/// CSS class prefix for classed output.
pub const CLASS_PREFIX: &str = "hl-";

/// How highlighted code is emitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Highlight {
    /// `<span class="hl-…">`, styled by an external stylesheet.
    #[default]
    Classed,
    /// Inline `style` attributes from a bundled theme.
    Inline { theme: String },
}

fn alias(lang: &str) -> &str {
    match lang {
        "js" | "mjs" | "cjs" | "jsx" | "ts" | "tsx" => "JavaScript",
        "py" | "python3" => "Python",
        "rs" => "Rust",
        "rb" => "Ruby",
        "sh" | "bash" | "shell" | "zsh" => "Bourne Again Shell (bash)",
        "yml" => "YAML",
        "md" | "markdown" => "Markdown",
        "cpp" | "cxx" | "cc" | "hpp" => "C++",
        "c#" | "csharp" | "cs" => "C#",
        "sql" | "mysql" | "postgresql" | "sqlite" => "SQL",
        "json5" | "jsonc" => "JSON",
        "kt" | "kts" => "Java",
        "hs" => "Haskell",
        "pl" | "pm" => "Perl",
        _ => lang,
    }
}

/// Resolve the syntax for a code block: fence language first, then a guess
/// from the first line, then plain text.
pub fn find_syntax(lang: Option<&str>, code: &str) -> &'static SyntaxReference {
    let by_lang = lang.and_then(|lang| {
        let lower = lang.to_lowercase();
        SYNTAX_SET
            .find_syntax_by_token(lang)
            .or_else(|| SYNTAX_SET.find_syntax_by_extension(&lower))
            .or_else(|| SYNTAX_SET.find_syntax_by_name(alias(&lower)))
    });
    by_lang
        .or_else(|| {
            code.lines()
                .next()
                .and_then(|first| SYNTAX_SET.find_syntax_by_first_line(first))
        })
        .unwrap_or_else(|| SYNTAX_SET.find_syntax_plain_text())
}

fn theme(name: &str) -> Option<&'static Theme> {
    THEME_SET.themes.get(name).or_else(|| {
        tracing::warn!(theme = name, "Unknown highlight theme, using {}", DEFAULT_THEME);
        THEME_SET.themes.get(DEFAULT_THEME)
    })
}

/// Keep only language names that are safe inside a class attribute.
fn language_class(lang: Option<&str>) -> String {
    match lang {
        Some(lang)
            if lang
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '+' | '#' | '.')) =>
        {
            format!(" class=\"language-{}\"", lang)
        }
        _ => String::new(),
    }
}

/// Highlight one code block to a complete `<pre>` element.
///
/// Returns `None` if syntect fails; the caller falls back to plain output.
pub fn highlight_block(code: &str, lang: Option<&str>, mode: &Highlight) -> Option<String> {
    let syntax = find_syntax(lang, code);
    match mode {
        Highlight::Classed => {
            let mut generator = ClassedHTMLGenerator::new_with_class_style(
                syntax,
                &SYNTAX_SET,
                ClassStyle::SpacedPrefixed {
                    prefix: CLASS_PREFIX,
                },
            );
            for line in LinesWithEndings::from(code) {
                if let Err(e) = generator.parse_html_for_line_which_includes_newline(line) {
                    tracing::debug!(error = %e, syntax = %syntax.name, "Highlighting failed");
                    return None;
                }
            }
            Some(format!(
                "<pre class=\"{}code\"><code{}>{}</code></pre>\n",
                CLASS_PREFIX,
                language_class(lang),
                generator.finalize()
            ))
        }
        Highlight::Inline { theme: name } => {
            let theme = theme(name)?;
            match highlighted_html_for_string(code, &SYNTAX_SET, syntax, theme) {
                Ok(html) => Some(html),
                Err(e) => {
                    tracing::debug!(error = %e, syntax = %syntax.name, "Highlighting failed");
                    None
                }
            }
        }
    }
}
