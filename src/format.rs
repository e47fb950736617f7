use regex::Regex;

/// A chat message body split into plain text and fenced code regions.
/// The TUI renders segments directly; the HTML export formats them with
/// `format_message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Code { lang: String, code: String },
}

fn fence_regex() -> Regex {
    Regex::new(r"```(\w+)?\n([\s\S]*?)```").unwrap()
}

/// Split a message into text and fenced code segments. A fence is a pair of
/// triple-backtick markers, the opening one optionally tagged with a language
/// identifier. Untagged fences default to `plaintext`.
pub fn split_segments(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut last = 0;

    for caps in fence_regex().captures_iter(text) {
        let whole = caps.get(0).unwrap();
        if whole.start() > last {
            segments.push(Segment::Text(text[last..whole.start()].to_string()));
        }
        let lang = caps
            .get(1)
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| "plaintext".to_string());
        let code = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        segments.push(Segment::Code {
            lang,
            code: code.to_string(),
        });
        last = whole.end();
    }

    if last < text.len() {
        segments.push(Segment::Text(text[last..].to_string()));
    }
    segments
}

/// Format a raw message as HTML: fenced code becomes a labeled, escaped code
/// block with a copy control; bare http(s) URLs in the remaining text become
/// anchors opening in a new tab.
///
/// The function is a fixed point on its own output: the stream path
/// re-formats the entire accumulated buffer on every chunk, so escaping must
/// not double-escape and linkification must not re-wrap existing anchors.
pub fn format_message(text: &str) -> String {
    let mut html = String::new();
    for segment in split_segments(text) {
        match segment {
            Segment::Text(t) => html.push_str(&linkify(&t)),
            Segment::Code { lang, code } => html.push_str(&code_block_html(&lang, &code)),
        }
    }
    html
}

fn code_block_html(lang: &str, code: &str) -> String {
    format!(
        concat!(
            "<div class=\"code-block\">",
            "<div class=\"code-header\">",
            "<span class=\"lang-label\">{lang}</span>",
            "<button class=\"copy-btn\" onclick=\"copyCode(this)\">Copy</button>",
            "</div>",
            "<pre><code class=\"language-{lang}\">{code}</code></pre>",
            "</div>"
        ),
        lang = lang,
        code = escape_code(code),
    )
}

/// HTML-escape `&`, `<`, `>` without touching ampersands that already start
/// one of those entities, so escaping an already-escaped string is a no-op.
pub fn escape_code(code: &str) -> String {
    let mut out = String::with_capacity(code.len());
    let mut rest = code;
    while let Some(c) = rest.chars().next() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => {
                let after = &rest[1..];
                if after.starts_with("amp;") || after.starts_with("lt;") || after.starts_with("gt;")
                {
                    out.push('&');
                } else {
                    out.push_str("&amp;");
                }
            }
            _ => out.push(c),
        }
        rest = &rest[c.len_utf8()..];
    }
    out
}

/// Convert bare http(s) URLs to anchors. URLs immediately preceded by `"`,
/// `=`, or `>` are already part of an anchor from a previous pass and are
/// left alone.
fn linkify(text: &str) -> String {
    let url_regex = Regex::new(r#"https?://[^\s<>"]+"#).unwrap();
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for m in url_regex.find_iter(text) {
        out.push_str(&text[last..m.start()]);
        let preceding = text[..m.start()].chars().last();
        if matches!(preceding, Some('"') | Some('=') | Some('>')) {
            out.push_str(m.as_str());
        } else {
            out.push_str(&format!(
                "<a href=\"{0}\" target=\"_blank\">{0}</a>",
                m.as_str()
            ));
        }
        last = m.end();
    }
    out.push_str(&text[last..]);
    out
}

/// Extract every fenced code block from a sequence of message bodies, in
/// conversation order. Used for the copy-selection keys.
pub fn collect_code_blocks(bodies: &[&str]) -> Vec<(String, String)> {
    let mut blocks = Vec::new();
    for body in bodies {
        for segment in split_segments(body) {
            if let Segment::Code { lang, code } = segment {
                blocks.push((lang, code));
            }
        }
    }
    blocks
}

/// Render the whole conversation as a self-contained HTML page.
pub fn render_transcript(messages: &[crate::chat::ChatMessage]) -> String {
    use crate::chat::ChatRole;

    let mut body = String::new();
    for msg in messages {
        let class = match msg.role {
            ChatRole::User => "user-message",
            ChatRole::Assistant => "assistant-message",
        };
        body.push_str(&format!(
            "    <div class=\"message {}\"><p>{}</p></div>\n",
            class,
            format_message(&msg.content)
        ));
    }

    format!(
        concat!(
            "<!DOCTYPE html>\n",
            "<html>\n",
            "<head>\n",
            "  <meta charset=\"utf-8\">\n",
            "  <title>Chat transcript</title>\n",
            "  <style>\n",
            "    body {{ font-family: sans-serif; max-width: 48rem; margin: 2rem auto; }}\n",
            "    .message {{ margin: 0.75rem 0; padding: 0.5rem 0.75rem; border-radius: 6px; }}\n",
            "    .user-message {{ background: #e8f0fe; }}\n",
            "    .assistant-message {{ background: #f5f5f5; }}\n",
            "    .code-block {{ background: #1e1e1e; color: #eee; border-radius: 6px; }}\n",
            "    .code-header {{ display: flex; justify-content: space-between; padding: 0.25rem 0.5rem; }}\n",
            "    pre {{ margin: 0; padding: 0.5rem; overflow-x: auto; }}\n",
            "  </style>\n",
            "</head>\n",
            "<body>\n",
            "{}",
            "</body>\n",
            "</html>\n"
        ),
        body
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{ChatMessage, ChatRole};

    #[test]
    fn bare_url_becomes_anchor() {
        let html = format_message("Visit https://example.com");
        assert_eq!(
            html,
            "Visit <a href=\"https://example.com\" target=\"_blank\">https://example.com</a>"
        );
    }

    #[test]
    fn code_is_escaped_and_labeled() {
        let html = format_message("```js\nlet x = 1 < 2;\n```");
        assert!(html.contains("&lt;"));
        assert!(!html.contains("1 < 2"));
        assert!(html.contains("<span class=\"lang-label\">js</span>"));
        assert!(html.contains("language-js"));
        assert!(html.contains("copy-btn"));
    }

    #[test]
    fn formatting_is_idempotent() {
        let once = format_message("```js\nlet x = 1 < 2 && y > 0;\n```\nSee https://example.com");
        let twice = format_message(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn escape_does_not_double_escape() {
        assert_eq!(escape_code("a &lt; b"), "a &lt; b");
        assert_eq!(escape_code("a < b && c"), "a &lt; b &amp;&amp; c");
        assert_eq!(escape_code(&escape_code("x < & >")), escape_code("x < & >"));
    }

    #[test]
    fn untagged_fence_defaults_to_plaintext() {
        let segments = split_segments("```\ncode here\n```");
        assert_eq!(
            segments,
            vec![Segment::Code {
                lang: "plaintext".to_string(),
                code: "code here\n".to_string()
            }]
        );
    }

    #[test]
    fn text_around_fences_is_preserved() {
        let segments = split_segments("before\n```py\nx = 1\n```\nafter");
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0], Segment::Text("before\n".to_string()));
        assert_eq!(segments[2], Segment::Text("\nafter".to_string()));
    }

    #[test]
    fn collects_blocks_in_order() {
        let a = "```js\none\n```";
        let b = "text\n```py\ntwo\n```";
        let blocks = collect_code_blocks(&[a, b]);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0], ("js".to_string(), "one\n".to_string()));
        assert_eq!(blocks[1], ("py".to_string(), "two\n".to_string()));
    }

    #[test]
    fn transcript_wraps_messages_with_role_classes() {
        let messages = vec![
            ChatMessage {
                role: ChatRole::Assistant,
                content: "Hello!".to_string(),
            },
            ChatMessage {
                role: ChatRole::User,
                content: "hi".to_string(),
            },
        ];
        let page = render_transcript(&messages);
        assert!(page.starts_with("<!DOCTYPE html>"));
        assert!(page.contains("assistant-message"));
        assert!(page.contains("user-message"));
        assert!(page.contains("<p>hi</p>"));
    }
}
