use pulldown_cmark::{CodeBlockKind, Event, Parser, Tag, TagEnd};

/// Payloads above this size are shown as plain text to keep rendering predictable.
const MARKDOWN_SAFE_FALLBACK_THRESHOLD_BYTES: usize = 128 * 1024;
const CODE_INDENT: &str = "    ";

/// One fenced or indented code block extracted from rendered Markdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub language: Option<String>,
    pub code: String,
}

/// Display form of a message in rendered (non-source) mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedMarkdown {
    pub lines: Vec<String>,
    pub code_blocks: Vec<CodeBlock>,
}

/// Raw lines for source view. Always at least one line so empty rows keep a height.
pub fn source_lines(text: &str) -> Vec<String> {
    let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
    if text.ends_with('\n') || lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

pub fn render_markdown(text: &str) -> RenderedMarkdown {
    if text.len() > MARKDOWN_SAFE_FALLBACK_THRESHOLD_BYTES {
        return RenderedMarkdown {
            lines: source_lines(text),
            code_blocks: Vec::new(),
        };
    }

    let mut renderer = LineRenderer::default();
    for event in Parser::new(text) {
        renderer.push_event(event);
    }
    renderer.finish()
}

#[derive(Default)]
struct LineRenderer {
    lines: Vec<String>,
    current: String,
    code_blocks: Vec<CodeBlock>,
    code: Option<CodeBlock>,
    // One entry per open list: `Some(n)` for ordered lists, `None` for bullets.
    lists: Vec<Option<u64>>,
}

impl LineRenderer {
    fn push_event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => {
                if let Some(block) = self.code.as_mut() {
                    block.code.push_str(&text);
                } else {
                    self.current.push_str(&text);
                }
            }
            Event::Code(code) => self.current.push_str(&code),
            Event::Html(html) | Event::InlineHtml(html) => self.current.push_str(html.trim_end()),
            Event::SoftBreak => self.current.push(' '),
            Event::HardBreak => self.flush_line(),
            Event::Rule => {
                self.flush_line();
                self.lines.push("---".to_string());
            }
            Event::TaskListMarker(done) => {
                self.current.push_str(if done { "[x] " } else { "[ ] " });
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::CodeBlock(kind) => {
                self.flush_line();
                let language = match kind {
                    CodeBlockKind::Fenced(info) => info
                        .split_whitespace()
                        .next()
                        .map(str::to_string),
                    CodeBlockKind::Indented => None,
                };
                self.code = Some(CodeBlock {
                    language,
                    code: String::new(),
                });
            }
            Tag::List(start) => {
                self.flush_line();
                self.lists.push(start);
            }
            Tag::Item => {
                self.flush_line();
                let depth = self.lists.len().saturating_sub(1);
                let marker = match self.lists.last_mut() {
                    Some(Some(number)) => {
                        let marker = format!("{number}. ");
                        *number += 1;
                        marker
                    }
                    _ => "- ".to_string(),
                };
                self.current.push_str(&"  ".repeat(depth));
                self.current.push_str(&marker);
            }
            Tag::Paragraph | Tag::Heading { .. } => {
                if !self.current.trim().is_empty() && self.lists.is_empty() {
                    self.flush_line();
                }
            }
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::CodeBlock => {
                if let Some(mut block) = self.code.take() {
                    if block.code.ends_with('\n') {
                        block.code.pop();
                    }
                    self.lines.extend(
                        block
                            .code
                            .split('\n')
                            .map(|line| format!("{CODE_INDENT}{line}")),
                    );
                    self.code_blocks.push(block);
                }
            }
            TagEnd::List(_) => {
                self.flush_line();
                self.lists.pop();
            }
            TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::Item => self.flush_line(),
            _ => {}
        }
    }

    fn flush_line(&mut self) {
        if self.current.is_empty() {
            return;
        }
        let line = std::mem::take(&mut self.current);
        self.lines.push(line.trim_end().to_string());
    }

    fn finish(mut self) -> RenderedMarkdown {
        self.flush_line();
        if self.lines.is_empty() {
            self.lines.push(String::new());
        }
        RenderedMarkdown {
            lines: self.lines,
            code_blocks: self.code_blocks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markup_from_rendered_lines() {
        let rendered = render_markdown("# Plan\n\nShip **fast** and `test`.\n\n- one\n- two\n");

        assert_eq!(rendered.lines, ["Plan", "Ship fast and test.", "- one", "- two"]);
        assert!(rendered.code_blocks.is_empty());
    }

    #[test]
    fn extracts_fenced_code_without_trailing_newline() {
        let rendered = render_markdown("Run this:\n\n```rust\nfn main() {}\nlet x = 1;\n```\n");

        assert_eq!(
            rendered.code_blocks,
            [CodeBlock {
                language: Some("rust".to_string()),
                code: "fn main() {}\nlet x = 1;".to_string(),
            }]
        );
        assert_eq!(rendered.lines[0], "Run this:");
        assert_eq!(rendered.lines[1], "    fn main() {}");
    }

    #[test]
    fn ordered_lists_keep_their_numbering() {
        let rendered = render_markdown("3. three\n4. four\n");
        assert_eq!(rendered.lines, ["3. three", "4. four"]);
    }

    #[test]
    fn empty_text_renders_one_blank_line() {
        assert_eq!(render_markdown("").lines, [""]);
        assert_eq!(source_lines(""), [""]);
        assert_eq!(source_lines("a\nb\n"), ["a", "b", ""]);
    }

    #[test]
    fn oversized_payload_falls_back_to_plain_lines() {
        let text = "```\n".to_string() + &"x".repeat(MARKDOWN_SAFE_FALLBACK_THRESHOLD_BYTES);
        let rendered = render_markdown(&text);

        assert_eq!(rendered.lines[0], "```");
        assert!(rendered.code_blocks.is_empty());
    }
}
