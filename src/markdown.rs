//! Markdown to plain text conversion for the vectorize pipeline.
//!
//! Chunks are embedded as prose, so markup that carries no semantics for
//! retrieval is stripped: code fences and images are dropped, link text
//! is kept, block structure collapses to paragraph breaks.

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};

/// Render markdown down to plain text, paragraphs separated by blank
/// lines. Non-UTF-8 or non-markdown text passes through mostly unchanged
/// since bare text parses as paragraphs.
pub fn to_plain_text(markdown: &str) -> String {
    let parser = Parser::new_ext(
        markdown,
        Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TABLES,
    );

    let mut out = String::new();
    let mut skip_depth: usize = 0;

    for event in parser {
        match event {
            Event::Start(Tag::CodeBlock(_)) | Event::Start(Tag::Image { .. }) => {
                skip_depth += 1;
            }
            Event::End(TagEnd::CodeBlock) | Event::End(TagEnd::Image) => {
                skip_depth = skip_depth.saturating_sub(1);
            }
            _ if skip_depth > 0 => {}
            Event::Text(text) | Event::Code(text) => out.push_str(&text),
            Event::SoftBreak | Event::HardBreak => out.push('\n'),
            Event::End(TagEnd::Paragraph)
            | Event::End(TagEnd::Heading(_))
            | Event::End(TagEnd::Item)
            | Event::End(TagEnd::BlockQuote(_))
            | Event::End(TagEnd::TableRow)
            | Event::End(TagEnd::TableHead) => {
                if !out.ends_with("\n\n") && !out.is_empty() {
                    out.push_str("\n\n");
                }
            }
            Event::End(TagEnd::TableCell) => out.push(' '),
            _ => {}
        }
    }

    // Collapse runs of 3+ newlines left by nested block ends
    let mut collapsed = String::with_capacity(out.len());
    let mut newlines = 0;
    for ch in out.chars() {
        if ch == '\n' {
            newlines += 1;
            if newlines <= 2 {
                collapsed.push(ch);
            }
        } else {
            newlines = 0;
            collapsed.push(ch);
        }
    }
    collapsed.trim().to_string()
}
