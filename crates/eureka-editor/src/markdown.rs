//! Markdown snapshots and imported documents.
//!
//! A document's `readme` holds a full-document snapshot. The save pipeline
//! renders it as markdown from the blocks. Imported documents may carry
//! either markdown or a complete HTML document; [`snapshot_to_blocks`] picks
//! the parser by looking at the first tokens of the raw text.

use crate::block::{Block, BlockKind};
use crate::html::{self, TAG_RE, parse_attrs};
use pulldown_cmark::{Options, Parser};

/// Whether a raw snapshot is an HTML document rather than markdown.
///
/// Case-insensitive check for a leading `<!doctype html` or `<html`.
pub fn is_html_document(raw: &str) -> bool {
    let head: String = raw.trim_start().chars().take(16).collect();
    let head = head.to_ascii_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}

/// Parse a raw snapshot into blocks, detecting HTML vs. markdown.
pub fn snapshot_to_blocks(raw: &str) -> html::Result<Vec<Block>> {
    if is_html_document(raw) {
        tracing::debug!("Snapshot detected as HTML document");
        html::html_to_blocks(raw)
    } else {
        tracing::debug!("Snapshot detected as markdown");
        markdown_to_blocks(raw)
    }
}

/// Parse markdown into blocks (via pulldown-cmark's HTML renderer).
pub fn markdown_to_blocks(markdown: &str) -> html::Result<Vec<Block>> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let parser = Parser::new_ext(markdown, options);
    let mut rendered = String::new();
    pulldown_cmark::html::push_html(&mut rendered, parser);

    html::html_to_blocks(&rendered)
}

/// Render blocks as a markdown snapshot.
pub fn blocks_to_markdown(blocks: &[Block]) -> String {
    let mut out = String::new();
    let mut previous_was_list = false;

    for block in blocks {
        let is_list = block.kind.is_list_item();
        if !out.is_empty() {
            // Keep consecutive list items in one list
            out.push_str(if is_list && previous_was_list { "\n" } else { "\n\n" });
        }
        render_block(block, block.meta.depth as usize, &mut out);
        previous_was_list = is_list;
    }

    out
}

fn render_block(block: &Block, indent: usize, out: &mut String) {
    match block.kind {
        BlockKind::Paragraph => out.push_str(&inline_to_markdown(&block.content)),
        BlockKind::Heading(level) => {
            out.push_str(&"#".repeat(level as usize));
            out.push(' ');
            out.push_str(&inline_to_markdown(&block.content));
        }
        BlockKind::BulletListItem | BlockKind::NumberedListItem => {
            let marker = if block.kind == BlockKind::BulletListItem {
                "-"
            } else {
                "1."
            };
            out.push_str(&"  ".repeat(indent));
            out.push_str(marker);
            out.push(' ');
            out.push_str(&inline_to_markdown(&block.content));
            for child in &block.children {
                out.push('\n');
                render_block(child, indent + 1, out);
            }
            return;
        }
        BlockKind::CodeBlock => {
            let code = decode_entities(&TAG_RE.replace_all(&block.content, ""));
            out.push_str("```\n");
            out.push_str(code.trim_end_matches('\n'));
            out.push_str("\n```");
        }
        BlockKind::Quote => {
            let text = inline_to_markdown(&block.content);
            let quoted: Vec<String> = text.lines().map(|line| format!("> {}", line)).collect();
            out.push_str(&quoted.join("\n"));
        }
        // Markdown has no lossless table syntax for arbitrary cells; keep HTML
        BlockKind::Table => out.push_str(&html::block_to_html(block)),
        BlockKind::Image => {
            let alt = block.props.get("alt").map(String::as_str).unwrap_or("");
            let src = block.props.get("src").map(String::as_str).unwrap_or("");
            out.push_str(&format!("![{}]({})", alt, src));
        }
        BlockKind::Divider => out.push_str("---"),
    }

    for child in &block.children {
        out.push_str("\n\n");
        render_block(child, indent, out);
    }
}

/// Convert inline HTML to markdown. Unknown tags are dropped.
fn inline_to_markdown(inline: &str) -> String {
    let mut out = String::new();
    let mut links: Vec<Option<String>> = Vec::new();
    let mut last = 0;

    for caps in TAG_RE.captures_iter(inline) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        out.push_str(&decode_entities(&inline[last..whole.start()]));
        last = whole.end();

        let closing = !caps[1].is_empty();
        match caps[2].to_ascii_lowercase().as_str() {
            "strong" | "b" => out.push_str("**"),
            "em" | "i" => out.push('*'),
            "code" => out.push('`'),
            "s" | "del" | "strike" => out.push_str("~~"),
            "br" => out.push_str("  \n"),
            "a" if !closing => {
                let href = parse_attrs(caps.get(3).map_or("", |m| m.as_str()))
                    .into_iter()
                    .find(|(key, _)| key == "href")
                    .map(|(_, value)| value);
                links.push(href);
                out.push('[');
            }
            "a" => match links.pop().flatten() {
                Some(href) => out.push_str(&format!("]({})", href)),
                None => out.push(']'),
            },
            _ => {}
        }
    }
    out.push_str(&decode_entities(&inline[last..]));

    out.trim().to_string()
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}
