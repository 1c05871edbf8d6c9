// Conversion snapshots
// Markup, Markdown and layout dumps of small documents

use std::rc::Rc;

use richdoc::draw_context::FixedMetrics;
use richdoc::richtext::{Document, TextFormat};

fn document() -> Document {
    Document::new(Rc::new(FixedMetrics::default()))
}

/// One row per visual line: paragraph, line, y, height and the line's text
fn layout_dump(doc: &mut Document, width: i32) -> String {
    doc.set_width(width);
    doc.format_all();
    let mut rows = Vec::new();
    for (_, parag) in doc.iter() {
        for line in 0..parag.lines() {
            let Some((start, ls)) = parag.line_start_of_line(line) else {
                continue;
            };
            let end = parag.line_end_of_line(line).unwrap_or(start);
            let text: String = parag.string().chars()[start..end].iter().map(|c| c.c).collect();
            rows.push(format!(
                "{} {} {} {} |{}|",
                parag.number(),
                line,
                parag.rect().y + ls.y,
                ls.h,
                text
            ));
        }
    }
    rows.join("\n")
}

#[test]
fn test_markdown_to_markup() {
    let mut doc = document();
    doc.set_markdown("# Title\n\nSome **bold** text\n\n- one\n- two");
    insta::assert_snapshot!(doc.rich_text(), @r"
    <h1>Title</h1>
    <p>Some <b>bold</b> text</p>
    <ul><li>one</li>
    <li>two</li></ul>
    ");
}

#[test]
fn test_markup_to_markdown() {
    let mut doc = document();
    doc.set_rich_text("<h2>Sub</h2><ol><li>x</li><li>y</li></ol><pre>code\nmore</pre><blockquote>quoted</blockquote>");
    insta::assert_snapshot!(doc.to_markdown(), @r"
    ## Sub

    1. x
    2. y

    ```
    code
    more
    ```

    > quoted
    ");
}

#[test]
fn test_plain_text_of_markup() {
    let mut doc = document();
    doc.set_text("<p>a<br>b</p><p>c &amp; d</p>", TextFormat::AutoText);
    assert_eq!(doc.plain_text(), "a\nb \nc & d \n");
    assert_eq!(doc.rich_text(), "<p>a<br>b</p>\n<p>c &amp; d</p>");
}

#[test]
fn test_layout_of_wrapped_text() {
    let mut doc = document();
    doc.set_plain_text("aaaa bbbb\ncc");
    insta::assert_snapshot!(layout_dump(&mut doc, 48), @r"
    0 0 0 15 |aaaa |
    0 1 15 15 |bbbb |
    1 0 30 15 |cc |
    ");
}

#[test]
fn test_layout_of_line_breaks() {
    let mut doc = document();
    doc.set_rich_text("<p>one<br>two</p>");
    doc.set_width(200);
    doc.format_all();
    let first = doc.first_parag();
    let parag = doc.parag(first).unwrap();
    assert_eq!(parag.lines(), 2);
    assert_eq!(parag.line_start_of_line(1).map(|(start, _)| start), Some(4));
}
