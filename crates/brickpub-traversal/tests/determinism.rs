//! Property-based checks over generated documents: page counts follow
//! the document shape, and repeated counts and draws agree with
//! themselves.

use proptest::prelude::*;

use brickpub_core::message::MessageDispatcher;
use brickpub_document::Document;
use brickpub_traversal::Navigator;

const PARTS: [&str; 4] = ["3001.dat", "3002.dat", "3004.dat", "3023.dat"];

fn document(text: &str) -> Document {
    Document::from_text("main.ldr", text, &MessageDispatcher::new())
}

/// One step's worth of document text: optional page inserts, then a
/// single part line closed by a step boundary.
#[derive(Debug, Clone)]
struct Segment {
    inserts: usize,
    color: u32,
    part: &'static str,
    offset: i32,
}

fn segment() -> impl Strategy<Value = Segment> {
    (0usize..=2, 0u32..16, 0usize..PARTS.len(), -50i32..=50).prop_map(
        |(inserts, color, part, offset)| Segment {
            inserts,
            color,
            part: PARTS[part],
            offset,
        },
    )
}

fn render(segments: &[Segment]) -> String {
    let mut text = String::new();
    for segment in segments {
        for _ in 0..segment.inserts {
            text.push_str("0 !PUB INSERT PAGE\n");
        }
        text.push_str(&format!(
            "1 {} {} 0 0 1 0 0 0 1 0 0 0 1 {}\n0 STEP\n",
            segment.color, segment.offset, segment.part
        ));
    }
    text
}

proptest! {
    #[test]
    fn count_matches_document_shape(segments in prop::collection::vec(segment(), 1..12)) {
        let text = render(&segments);
        let mut navigator = Navigator::new(document(&text));
        let pages = navigator.count_pages().expect("count succeeds");

        // Every step makes a page, every INSERT PAGE makes another.
        let inserts: usize = segments.iter().map(|s| s.inserts).sum();
        prop_assert_eq!(pages, segments.len() + inserts);

        // Counting again lands on the same total and boundary list.
        prop_assert_eq!(navigator.count_pages().expect("recount succeeds"), pages);
        prop_assert_eq!(navigator.state().top_of_pages.len(), pages + 1);
    }

    #[test]
    fn drawing_any_page_twice_yields_the_same_page(
        segments in prop::collection::vec(segment(), 1..6),
    ) {
        let text = render(&segments);
        let mut navigator = Navigator::new(document(&text));
        let pages = navigator.count_pages().expect("count succeeds");
        for number in 1..=pages {
            let first = navigator.draw_page(number).expect("first draw").clone();
            let again = navigator.draw_page(number).expect("second draw").clone();
            prop_assert_eq!(first.number, number);
            prop_assert_eq!(first, again);
        }
    }

    #[test]
    fn step_numbers_run_consecutively_across_pages(
        segments in prop::collection::vec(segment(), 1..6),
    ) {
        let text = render(&segments);
        let mut navigator = Navigator::new(document(&text));
        let pages = navigator.count_pages().expect("count succeeds");

        let mut numbers = Vec::new();
        for number in 1..=pages {
            let page = navigator.draw_page(number).expect("page drawn");
            numbers.extend(page.steps().map(|s| s.number));
        }
        let expected: Vec<usize> = (1..=segments.len()).collect();
        prop_assert_eq!(numbers, expected);
    }
}
