//! Markdown to HTML, GitHub flavoured, with soft breaks rendered as `<br />`.

use pulldown_cmark::{html, Event, Options, Parser};

pub fn markdown_to_html(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS;

    let events = Parser::new_ext(markdown, options).map(|event| match event {
        Event::SoftBreak => Event::HardBreak,
        other => other,
    });

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, events);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_render() {
        let html = markdown_to_html("| Plan | Price |\n| --- | --- |\n| Pro | $10 |\n");
        assert!(html.contains("<table>"));
        assert!(html.contains("<td>Pro</td>"));
    }

    #[test]
    fn test_soft_break_becomes_line_break() {
        let html = markdown_to_html("first line\nsecond line");
        assert_eq!(html, "<p>first line<br />\nsecond line</p>\n");
    }

    #[test]
    fn test_links_and_images_counted_by_analyzer_shape() {
        let html = markdown_to_html("![hero](https://img.test/a.png)\n\nSource: [Docs](https://docs.test)");
        assert!(html.contains("<img src=\"https://img.test/a.png\""));
        assert!(html.contains("<a href=\"https://docs.test\">"));
    }
}
