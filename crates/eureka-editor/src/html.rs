//! HTML codec for editable blocks.
//!
//! Elements store their content as HTML fragments. This module turns such a
//! fragment (or a whole imported HTML document) into blocks and renders
//! blocks back to HTML.
//!
//! Attributes in the `data-` namespace are editor metadata. They are written
//! by the renderer (`data-content-type`, and the `data-element-id` /
//! `data-depth` annotations), never stored as block props, and ignored when
//! comparing content via [`content_fingerprint`].

use crate::block::{Block, BlockKind};
use crate::model::ElementId;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("Invalid {attr} annotation: {value:?}")]
    InvalidAnnotation { attr: String, value: String },
}

pub type Result<T> = std::result::Result<T, CodecError>;

const EDITOR_ATTR_PREFIX: &str = "data-";
const CONTENT_TYPE_ATTR: &str = "data-content-type";
const ELEMENT_ID_ATTR: &str = "data-element-id";
const DEPTH_ATTR: &str = "data-depth";

/// Opening, closing or self-closing tag. Groups: closing slash, name,
/// attribute source, self-closing slash.
pub(crate) static TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"<(/?)([A-Za-z][A-Za-z0-9-]*)((?:\s+[^\s/>"'=]+(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'=<>`]+))?)*)\s*(/?)>"#,
    )
    .expect("tag pattern is valid")
});

static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([^\s/>"'=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
        .expect("attribute pattern is valid")
});

static COMMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("comment pattern is valid"));

static DOCTYPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<!doctype[^>]*>").expect("doctype pattern is valid"));

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Tags whose content is unwrapped into the surrounding block list.
const CONTAINER_TAGS: &[&str] = &[
    "html", "body", "div", "section", "article", "main", "header", "footer",
];

/// Tags dropped together with their content.
const IGNORED_TAGS: &[&str] = &["head", "title", "script", "style", "meta", "link", "br"];

const BLOCK_TAGS: &[&str] = &[
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol", "pre", "blockquote", "table", "img", "hr",
];

struct Tag {
    closing: bool,
    name: String,
    attrs: Vec<(String, String)>,
    self_closing: bool,
    start: usize,
    end: usize,
}

enum Node<'a> {
    Text(&'a str),
    Element {
        name: String,
        attrs: Vec<(String, String)>,
        inner: &'a str,
        outer: &'a str,
    },
}

fn next_tag(src: &str, from: usize) -> Option<Tag> {
    let caps = TAG_RE.captures_at(src, from)?;
    let whole = caps.get(0)?;
    Some(Tag {
        closing: !caps[1].is_empty(),
        name: caps[2].to_ascii_lowercase(),
        attrs: parse_attrs(caps.get(3).map_or("", |m| m.as_str())),
        self_closing: !caps[4].is_empty(),
        start: whole.start(),
        end: whole.end(),
    })
}

/// Parse an attribute list into lowercase names and raw values.
pub(crate) fn parse_attrs(src: &str) -> Vec<(String, String)> {
    ATTR_RE
        .captures_iter(src)
        .map(|caps| {
            let name = caps[1].to_ascii_lowercase();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map_or("", |m| m.as_str())
                .to_string();
            (name, value)
        })
        .collect()
}

/// Find the close tag matching an element opened at `from`.
///
/// Returns (end of inner content, end of close tag). Unclosed elements run
/// to the end of the input.
fn find_close(src: &str, name: &str, from: usize) -> (usize, usize) {
    let mut depth = 0usize;
    let mut pos = from;
    while let Some(tag) = next_tag(src, pos) {
        pos = tag.end;
        if tag.name != name {
            continue;
        }
        if tag.closing {
            if depth == 0 {
                return (tag.start, tag.end);
            }
            depth -= 1;
        } else if !tag.self_closing {
            depth += 1;
        }
    }
    (src.len(), src.len())
}

/// Split a fragment into its top-level nodes.
fn parse_nodes(src: &str) -> Vec<Node<'_>> {
    let mut nodes = Vec::new();
    let mut pos = 0;

    while pos < src.len() {
        let Some(tag) = next_tag(src, pos) else {
            nodes.push(Node::Text(&src[pos..]));
            break;
        };
        if tag.start > pos {
            nodes.push(Node::Text(&src[pos..tag.start]));
        }
        if tag.closing {
            // Stray close tag
            pos = tag.end;
            continue;
        }
        if tag.self_closing || VOID_TAGS.contains(&tag.name.as_str()) {
            nodes.push(Node::Element {
                outer: &src[tag.start..tag.end],
                name: tag.name,
                attrs: tag.attrs,
                inner: "",
            });
            pos = tag.end;
            continue;
        }

        let (inner_end, close_end) = find_close(src, &tag.name, tag.end);
        nodes.push(Node::Element {
            inner: &src[tag.end..inner_end],
            outer: &src[tag.start..close_end],
            name: tag.name,
            attrs: tag.attrs,
        });
        pos = close_end;
    }

    nodes
}

/// Parse an HTML fragment or full HTML document into blocks.
pub fn html_to_blocks(html: &str) -> Result<Vec<Block>> {
    let without_comments = COMMENT_RE.replace_all(html, "");
    let cleaned = DOCTYPE_RE.replace_all(&without_comments, "");

    let mut blocks = Vec::new();
    collect_blocks(&cleaned, &mut blocks)?;
    Ok(blocks)
}

fn collect_blocks(src: &str, out: &mut Vec<Block>) -> Result<()> {
    // Consecutive text and inline elements form one paragraph
    let mut inline_run = String::new();

    for node in parse_nodes(src) {
        match node {
            Node::Text(text) => inline_run.push_str(text),
            Node::Element {
                name,
                attrs,
                inner,
                outer,
            } => {
                let name = name.as_str();
                if !CONTAINER_TAGS.contains(&name)
                    && !IGNORED_TAGS.contains(&name)
                    && !BLOCK_TAGS.contains(&name)
                {
                    inline_run.push_str(outer);
                    continue;
                }

                flush_inline_run(&mut inline_run, out);
                if CONTAINER_TAGS.contains(&name) {
                    collect_blocks(inner, out)?;
                } else if !IGNORED_TAGS.contains(&name) {
                    collect_block_element(name, &attrs, inner, out)?;
                }
            }
        }
    }

    flush_inline_run(&mut inline_run, out);
    Ok(())
}

fn flush_inline_run(run: &mut String, out: &mut Vec<Block>) {
    let text = run.trim();
    if !text.is_empty() {
        out.push(Block::paragraph(text));
    }
    run.clear();
}

fn collect_block_element(
    name: &str,
    attrs: &[(String, String)],
    inner: &str,
    out: &mut Vec<Block>,
) -> Result<()> {
    let block = match name {
        "p" => block_from(BlockKind::Paragraph, attrs, inner.trim())?,
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level = name[1..].parse().unwrap_or(1);
            block_from(BlockKind::Heading(level), attrs, inner.trim())?
        }
        "ul" => return collect_list_items(BlockKind::BulletListItem, inner, out),
        "ol" => return collect_list_items(BlockKind::NumberedListItem, inner, out),
        "pre" => block_from(BlockKind::CodeBlock, attrs, unwrap_single(inner, "code"))?,
        "blockquote" => block_from(BlockKind::Quote, attrs, unwrap_single(inner, "p").trim())?,
        "table" => block_from(BlockKind::Table, attrs, inner.trim())?,
        "img" => block_from(BlockKind::Image, attrs, "")?,
        "hr" => block_from(BlockKind::Divider, attrs, "")?,
        _ => return Ok(()),
    };
    out.push(block);
    Ok(())
}

fn collect_list_items(kind: BlockKind, src: &str, out: &mut Vec<Block>) -> Result<()> {
    for node in parse_nodes(src) {
        let Node::Element {
            name, attrs, inner, ..
        } = node
        else {
            continue;
        };
        if name != "li" {
            continue;
        }

        let mut content = String::new();
        let mut children = Vec::new();
        for part in parse_nodes(inner) {
            match part {
                Node::Text(text) => content.push_str(text),
                Node::Element {
                    name, inner, outer, ..
                } => match name.as_str() {
                    "ul" => collect_list_items(BlockKind::BulletListItem, inner, &mut children)?,
                    "ol" => collect_list_items(BlockKind::NumberedListItem, inner, &mut children)?,
                    // Loose markdown lists wrap item text in <p>
                    "p" => content.push_str(inner.trim()),
                    _ => content.push_str(outer),
                },
            }
        }

        out.push(block_from(kind, &attrs, content.trim())?.with_children(children));
    }
    Ok(())
}

/// Inner content of `src` when it consists of exactly one `tag` element.
fn unwrap_single<'a>(src: &'a str, tag: &str) -> &'a str {
    let nodes: Vec<Node<'_>> = parse_nodes(src)
        .into_iter()
        .filter(|n| !matches!(n, Node::Text(t) if t.trim().is_empty()))
        .collect();
    match nodes.as_slice() {
        [Node::Element { name, inner, .. }] if name == tag => *inner,
        _ => src,
    }
}

fn block_from(kind: BlockKind, attrs: &[(String, String)], content: &str) -> Result<Block> {
    let mut block = Block::new(kind, content);
    for (key, value) in attrs {
        match key.as_str() {
            ELEMENT_ID_ATTR => {
                if !value.is_empty() {
                    block.meta.element_id = Some(ElementId::new(value.clone()));
                }
            }
            DEPTH_ATTR => {
                block.meta.depth = value.trim().parse().map_err(|_| CodecError::InvalidAnnotation {
                    attr: DEPTH_ATTR.to_string(),
                    value: value.clone(),
                })?;
            }
            k if k.starts_with(EDITOR_ATTR_PREFIX) => {}
            _ => {
                block.props.insert(key.clone(), value.clone());
            }
        }
    }
    Ok(block)
}

/// Render blocks as the HTML stored in elements.
pub fn blocks_to_html(blocks: &[Block]) -> String {
    let mut out = String::new();
    for block in blocks {
        render(block, false, &mut out);
    }
    out
}

/// Render a single block as stored HTML.
pub fn block_to_html(block: &Block) -> String {
    let mut out = String::new();
    render(block, false, &mut out);
    out
}

/// Render blocks with `data-element-id` / `data-depth` annotations so that
/// parsing the output again restores the links to persisted elements.
pub fn blocks_to_annotated_html(blocks: &[Block]) -> String {
    let mut out = String::new();
    for block in blocks {
        render(block, true, &mut out);
        out.push('\n');
    }
    out
}

fn render(block: &Block, annotate: bool, out: &mut String) {
    let attrs = render_attrs(block, annotate);
    match block.kind {
        BlockKind::Paragraph => {
            out.push_str(&format!("<p{}>{}</p>", attrs, block.content));
        }
        BlockKind::Heading(level) => {
            out.push_str(&format!("<h{level}{}>{}</h{level}>", attrs, block.content));
        }
        BlockKind::BulletListItem | BlockKind::NumberedListItem => {
            let list = if block.kind == BlockKind::BulletListItem {
                "ul"
            } else {
                "ol"
            };
            out.push_str(&format!("<{list}><li{}>{}", attrs, block.content));
            for child in &block.children {
                render(child, annotate, out);
            }
            out.push_str(&format!("</li></{list}>"));
            return;
        }
        BlockKind::CodeBlock => {
            out.push_str(&format!("<pre{}><code>{}</code></pre>", attrs, block.content));
        }
        BlockKind::Quote => {
            out.push_str(&format!("<blockquote{}>{}</blockquote>", attrs, block.content));
        }
        BlockKind::Table => {
            out.push_str(&format!("<table{}>{}</table>", attrs, block.content));
        }
        BlockKind::Image => out.push_str(&format!("<img{}>", attrs)),
        BlockKind::Divider => out.push_str(&format!("<hr{}>", attrs)),
    }

    for child in &block.children {
        render(child, annotate, out);
    }
}

fn render_attrs(block: &Block, annotate: bool) -> String {
    let mut attrs = format!(" {}=\"{}\"", CONTENT_TYPE_ATTR, block.kind.as_str());
    if annotate {
        if let Some(id) = block.element_id() {
            attrs.push_str(&format!(" {}=\"{}\"", ELEMENT_ID_ATTR, escape_attr(id.as_str())));
        }
        attrs.push_str(&format!(" {}=\"{}\"", DEPTH_ATTR, block.meta.depth));
    }
    for (key, value) in &block.props {
        attrs.push_str(&format!(" {}=\"{}\"", key, escape_attr(value)));
    }
    attrs
}

fn escape_attr(value: &str) -> String {
    value.replace('"', "&quot;")
}

/// Remove every `data-*` attribute from every tag, leaving text untouched.
pub fn strip_editor_metadata(html: &str) -> String {
    TAG_RE
        .replace_all(html, |caps: &Captures<'_>| {
            let mut tag = format!("<{}{}", &caps[1], caps[2].to_ascii_lowercase());
            let attrs = parse_attrs(caps.get(3).map_or("", |m| m.as_str()));
            for (key, value) in attrs {
                if !key.starts_with(EDITOR_ATTR_PREFIX) {
                    tag.push_str(&format!(" {}=\"{}\"", key, value));
                }
            }
            if !caps[4].is_empty() {
                tag.push_str(" /");
            }
            tag.push('>');
            tag
        })
        .into_owned()
}

/// Comparable form of stored HTML: editor metadata stripped, outer
/// whitespace trimmed. Visible text and styling stay significant.
pub fn content_fingerprint(html: &str) -> String {
    strip_editor_metadata(html).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_paragraphs_and_headings() {
        let blocks = html_to_blocks("<h2>Title</h2>\n<p>Hello <b>world</b></p>").unwrap();

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].kind, BlockKind::Heading(2));
        assert_eq!(blocks[0].content, "Title");
        assert_eq!(blocks[1].kind, BlockKind::Paragraph);
        assert_eq!(blocks[1].content, "Hello <b>world</b>");
    }

    #[test]
    fn test_parse_full_document_skips_head() {
        let html = "<!DOCTYPE html><html><head><title>T</title></head>\
                    <body><!-- note --><p>Body</p></body></html>";
        let blocks = html_to_blocks(html).unwrap();

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].content, "Body");
    }

    #[test]
    fn test_parse_nested_list() {
        let html = "<ul><li>One<ul><li>Nested</li></ul></li><li>Two</li></ul>";
        let blocks = html_to_blocks(html).unwrap();

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].kind, BlockKind::BulletListItem);
        assert_eq!(blocks[0].content, "One");
        assert_eq!(blocks[0].children.len(), 1);
        assert_eq!(blocks[0].children[0].content, "Nested");
        assert_eq!(blocks[1].content, "Two");
    }

    #[test]
    fn test_inline_run_becomes_one_paragraph() {
        let blocks = html_to_blocks("Loose <em>text</em> here<p>Next</p>").unwrap();

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].content, "Loose <em>text</em> here");
        assert_eq!(blocks[1].content, "Next");
    }

    #[test]
    fn test_parse_code_block_and_quote() {
        let html = "<pre><code>let x = 1;</code></pre><blockquote>\n<p>Quoted</p>\n</blockquote>";
        let blocks = html_to_blocks(html).unwrap();

        assert_eq!(blocks[0].kind, BlockKind::CodeBlock);
        assert_eq!(blocks[0].content, "let x = 1;");
        assert_eq!(blocks[1].kind, BlockKind::Quote);
        assert_eq!(blocks[1].content, "Quoted");
    }

    #[test]
    fn test_data_attributes_are_not_props() {
        let blocks =
            html_to_blocks(r#"<p data-id="x" style="text-align: center" class='lead'>Hi</p>"#)
                .unwrap();

        assert_eq!(blocks[0].props.len(), 2);
        assert_eq!(blocks[0].props["style"], "text-align: center");
        assert_eq!(blocks[0].props["class"], "lead");
    }

    #[test]
    fn test_annotations_restore_links() {
        let mut block = Block::paragraph("Linked").with_depth(2);
        block.meta.element_id = Some(ElementId::new("el-7"));

        let html = blocks_to_annotated_html(&[block]);
        let parsed = html_to_blocks(&html).unwrap();

        assert_eq!(parsed[0].element_id().map(|id| id.as_str()), Some("el-7"));
        assert_eq!(parsed[0].meta.depth, 2);
        assert_eq!(parsed[0].content, "Linked");
    }

    #[test]
    fn test_invalid_depth_annotation_is_an_error() {
        let err = html_to_blocks(r#"<p data-depth="deep">x</p>"#).unwrap_err();
        assert!(matches!(err, CodecError::InvalidAnnotation { .. }));
    }

    #[test]
    fn test_rendering_is_stable_across_reparse() {
        let html = r#"<h1>A</h1><ol><li>x<ol><li>y</li></ol></li></ol><p style="color: red">z</p><hr>"#;
        let first = blocks_to_html(&html_to_blocks(html).unwrap());
        let second = blocks_to_html(&html_to_blocks(&first).unwrap());
        assert_eq!(first, second);
    }

    #[test]
    fn test_fingerprint_ignores_editor_metadata() {
        let a = r#"<p data-content-type="paragraph" data-id="1">Hi</p>"#;
        let b = r#"<p data-content-type="paragraph">Hi</p>"#;
        assert_eq!(content_fingerprint(a), content_fingerprint(b));
    }

    #[test]
    fn test_fingerprint_keeps_text_and_styling() {
        let plain = r#"<p data-content-type="paragraph">Hi</p>"#;
        let styled = r#"<p data-content-type="paragraph" style="color: red">Hi</p>"#;
        let bold = r#"<p data-content-type="paragraph"><strong>Hi</strong></p>"#;
        let edited = r#"<p data-content-type="paragraph">Hello</p>"#;

        assert_ne!(content_fingerprint(plain), content_fingerprint(styled));
        assert_ne!(content_fingerprint(plain), content_fingerprint(bold));
        assert_ne!(content_fingerprint(plain), content_fingerprint(edited));
    }

    #[test]
    fn test_strip_leaves_text_mentioning_data_attributes() {
        let html = r#"<p data-x="1">use data-x="1" here</p>"#;
        assert_eq!(strip_editor_metadata(html), r#"<p>use data-x="1" here</p>"#);
    }
}
