//! Server-side HTML for the chat page.
//!
//! Rendering is a pure function of the session: every turn is drawn from
//! its [`TurnContent`], text parts as Markdown and image parts as `<img>`
//! pointing at the stored data URI or URL.

use finchat_core::config::MissingSetting;
use finchat_core::types::{ContentPart, Turn, TurnContent};
use pulldown_cmark::{escape, html, Event, Options, Parser, Tag};

use crate::session::Notice;

const PAGE_TITLE: &str = "My Assistant";
const DESCRIPTION: &str =
    "The Chatbot assistant that helps you analyze the financial data of a company";
const ACCEPTED_IMAGES: &str = ".jpg,.jpeg,.png,.webp,image/jpeg,image/png,image/webp";

const STYLE: &str = r#"
body { font-family: system-ui, sans-serif; margin: 0; display: flex; min-height: 100vh; }
aside { width: 16rem; padding: 1rem; background: #f4f4f6; border-right: 1px solid #ddd; }
main { flex: 1; padding: 1rem 2rem; max-width: 60rem; }
.turn { display: flex; gap: 0.75rem; margin: 1rem 0; }
.turn .role { font-weight: 600; min-width: 5.5rem; text-transform: capitalize; }
.turn-user .body { background: #eef4ff; }
.turn .body { padding: 0.25rem 0.75rem; border-radius: 0.5rem; flex: 1; }
.turn img { max-width: 24rem; display: block; margin: 0.5rem 0; }
.notice { padding: 0.5rem 0.75rem; border-radius: 0.5rem; margin: 0.5rem 0; }
.warning { background: #fff6d6; }
.error { background: #ffe1e1; }
.success { background: #e0f6e4; }
form.chat textarea { width: 100%; min-height: 4rem; }
"#;

/// Everything the page needs from a session, borrowed for one render
#[derive(Debug, Clone, Copy)]
pub struct PageView<'a> {
    pub session_id: &'a str,
    pub history: &'a [Turn],
    pub notice: Option<&'a Notice>,
    pub warnings: &'a [MissingSetting],
    pub model: &'a str,
}

/// Escape text for use in HTML element content and double-quoted attributes
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    // Writing into a String cannot fail
    let _ = escape::escape_html(&mut out, text);
    out
}

/// Link and image targets a rendered answer may point at
fn is_safe_destination(dest: &str) -> bool {
    let dest: String = dest
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();

    match dest.split_once(':') {
        None => true,
        // A colon after a path, query or fragment marker is not a scheme
        Some((scheme, _)) if scheme.contains(['/', '?', '#']) => true,
        Some((scheme, _)) => {
            matches!(scheme, "http" | "https" | "mailto") || dest.starts_with("data:image/")
        }
    }
}

fn sanitize_tag(tag: Tag<'_>) -> Tag<'_> {
    match tag {
        Tag::Link(kind, dest, title) if !is_safe_destination(&dest) => {
            Tag::Link(kind, "#".into(), title)
        }
        Tag::Image(kind, dest, title) if !is_safe_destination(&dest) => {
            Tag::Image(kind, "#".into(), title)
        }
        other => other,
    }
}

/// Render Markdown to HTML. Raw HTML in the source is shown as text and
/// links with scripting schemes are neutralised.
pub fn render_markdown(text: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let parser = Parser::new_ext(text, options).map(|event| match event {
        Event::Html(raw) => Event::Text(raw),
        Event::Start(tag) => Event::Start(sanitize_tag(tag)),
        Event::End(tag) => Event::End(sanitize_tag(tag)),
        other => other,
    });

    let mut out = String::new();
    html::push_html(&mut out, parser);
    out
}

pub fn render_part(part: &ContentPart) -> String {
    match part {
        ContentPart::Text { text } => render_markdown(text),
        ContentPart::Image { image_url } => format!(
            "<img src=\"{}\" alt=\"uploaded image\">",
            escape_html(image_url)
        ),
    }
}

pub fn render_turn(turn: &Turn) -> String {
    let body: String = match &turn.content {
        TurnContent::Text(text) => render_markdown(text),
        TurnContent::Parts(parts) => parts.iter().map(render_part).collect(),
    };

    format!(
        "<div class=\"turn turn-{role}\"><div class=\"role\">{role}</div><div class=\"body\">{body}</div></div>\n",
        role = turn.role.as_str(),
        body = body
    )
}

fn render_notice(notice: &Notice) -> String {
    match notice {
        Notice::Error(message) => format!(
            "<div class=\"notice error\" role=\"alert\">Error generating response: {}</div>\n",
            escape_html(message)
        ),
        Notice::Cleared => "<div class=\"notice success\">Conversation cleared</div>\n".to_string(),
    }
}

/// Render the full chat page for one session
pub fn render_page(view: &PageView<'_>) -> String {
    let id = escape_html(view.session_id);

    let warnings: String = view
        .warnings
        .iter()
        .map(|w| format!("<div class=\"notice warning\">{}</div>\n", escape_html(&w.to_string())))
        .collect();

    let history: String = view.history.iter().map(render_turn).collect();
    let notice = view.notice.map(render_notice).unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>{style}</style>
</head>
<body>
<aside>
<h2>User Controls</h2>
<hr>
<form method="post" action="/sessions/{id}/clear">
<button type="submit">Clear Conversation</button>
</form>
</aside>
<main>
<h1>{title}</h1>
<p>{description}</p>
<hr>
<details>
<summary>About me</summary>
<p><strong>Model</strong>: {model}<br>
<strong>RAG</strong>: File search tool using your pre-built vector store<br>
<strong>Features</strong>: multi-turn chat, image input, clear conversation<br>
<strong>Secrets</strong>: reads OPENAI_API_KEY and VECTOR_STORE_ID from the environment or a .env file</p>
</details>
{warnings}<section id="history">
{history}</section>
{notice}<form class="chat" method="post" action="/sessions/{id}/turns" enctype="multipart/form-data" onsubmit="this.querySelector('button').disabled = true; document.getElementById('status').hidden = false;">
<label>Upload images <input type="file" name="images" multiple accept="{accept}"></label>
<textarea name="prompt" placeholder="Type your message here..." autofocus></textarea>
<button type="submit">Send</button>
<span id="status" hidden>Thinking...</span>
</form>
</main>
</body>
</html>
"#,
        title = PAGE_TITLE,
        style = STYLE,
        description = DESCRIPTION,
        model = escape_html(view.model),
        accept = ACCEPTED_IMAGES,
        id = id,
        warnings = warnings,
        history = history,
        notice = notice,
    )
}

/// Placeholder shown while a turn is in flight; reloads until it finishes
pub fn render_busy_page(session_id: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta http-equiv="refresh" content="2;url=/sessions/{id}">
<title>{title}</title>
<style>{style}</style>
</head>
<body>
<main>
<h1>{title}</h1>
<p>Thinking...</p>
</main>
</body>
</html>
"#,
        id = escape_html(session_id),
        title = PAGE_TITLE,
        style = STYLE,
    )
}
