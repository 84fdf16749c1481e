//! Markdown to HTML for chat bubbles.
//!
//! Raw HTML in the source is emitted as text, so it reaches the page escaped.
//! Link and image targets are limited to web, mail and relative URLs.

use pulldown_cmark::{html, CowStr, Event, Options, Parser, Tag};

const ALLOWED_SCHEMES: [&str; 3] = ["http:", "https:", "mailto:"];

fn safe_url(url: CowStr<'_>) -> CowStr<'_> {
    let lowered = url.trim().to_ascii_lowercase();
    let relative = !lowered.contains(':')
        || lowered.starts_with('/')
        || lowered.starts_with('#')
        || lowered.starts_with('?');
    if relative || ALLOWED_SCHEMES.iter().any(|s| lowered.starts_with(s)) {
        url
    } else {
        CowStr::Borrowed("#")
    }
}

pub fn render(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
    let events = Parser::new_ext(markdown, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        Event::Start(Tag::Link {
            link_type,
            dest_url,
            title,
            id,
        }) => Event::Start(Tag::Link {
            link_type,
            dest_url: safe_url(dest_url),
            title,
            id,
        }),
        Event::Start(Tag::Image {
            link_type,
            dest_url,
            title,
            id,
        }) => Event::Start(Tag::Image {
            link_type,
            dest_url: safe_url(dest_url),
            title,
            id,
        }),
        other => other,
    });

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, events);
    out
}
