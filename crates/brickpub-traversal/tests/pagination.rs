//! End-to-end pagination through the navigator: counting, drawing,
//! step groups, submodels, callouts, and navigation clamping.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use brickpub_core::error::RenderError;
use brickpub_core::message::{MessageBucket, MessageDispatcher};
use brickpub_document::Document;
use brickpub_traversal::{Navigator, NavigatorError, StepImager, StepRequest};

fn document(text: &str) -> Document {
    Document::from_text("main.ldr", text, &MessageDispatcher::new())
}

/// Imager that logs every request and hands back a synthetic path.
#[derive(Default)]
struct RecordingImager {
    requests: Mutex<Vec<(String, usize, usize)>>,
}

impl StepImager for RecordingImager {
    fn image_step(&self, request: &StepRequest<'_>) -> Result<Option<PathBuf>, RenderError> {
        self.requests.lock().push((
            request.model_name.to_string(),
            request.step_number,
            request.lines.len(),
        ));
        Ok(Some(PathBuf::from(format!(
            "steps/{}-{}.png",
            request.model_name, request.step_number
        ))))
    }
}

#[test]
fn test_two_step_document_counts_two_pages() {
    let text = "0 FILE main.ldr\n\
                1 16 0 0 0 1 0 0 0 1 0 0 0 1 brick.dat\n\
                0 STEP\n\
                1 16 10 0 0 1 0 0 0 1 0 0 0 1 brick.dat\n\
                0 STEP\n";
    let mut navigator = Navigator::new(document(text));
    let pages = navigator.count_pages().expect("count succeeds");
    assert_eq!(pages, 2);
    // One entry per page plus the end-of-document marker.
    let tops = &navigator.state().top_of_pages;
    assert_eq!(tops.len(), 3);
    assert_eq!(tops[0].line_number, 0);
    assert_eq!(tops[1].line_number, 2);
    assert_eq!(tops[2].line_number, 4);
}

#[test]
fn test_each_page_holds_one_step_with_growing_assembly() {
    let text = "0 FILE main.ldr\n\
                1 16 0 0 0 1 0 0 0 1 0 0 0 1 brick.dat\n\
                0 STEP\n\
                1 16 10 0 0 1 0 0 0 1 0 0 0 1 brick.dat\n\
                0 STEP\n";
    let mut navigator = Navigator::new(document(text));

    let first = navigator.draw_page(1).expect("page 1 drawn");
    assert_eq!(first.step_count(), 1);
    let step = first.steps().next().expect("one step");
    assert_eq!(step.number, 1);
    assert_eq!(step.parts_added, 1);
    assert_eq!(step.content.len(), 1);

    let second = navigator.draw_page(2).expect("page 2 drawn");
    assert_eq!(second.step_count(), 1);
    let step = second.steps().next().expect("one step");
    assert_eq!(step.number, 2);
    assert_eq!(step.parts_added, 1);
    // The assembly carries the first page's part forward.
    assert_eq!(step.content.len(), 2);
    assert_eq!(navigator.state().display_page, 2);
}

#[test]
fn test_cover_page_counts_without_steps() {
    let text = "0 !PUB INSERT COVER_PAGE FRONT\n\
                0 STEP\n\
                1 4 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat\n\
                0 STEP\n";
    let mut navigator = Navigator::new(document(text));
    let pages = navigator.count_pages().expect("count succeeds");
    assert_eq!(pages, 2);

    let cover = navigator.draw_page(1).expect("cover drawn");
    assert!(cover.is_cover());
    assert_eq!(cover.step_count(), 0);
    assert_eq!(cover.inserts.len(), 1);

    let body = navigator.draw_page(2).expect("body drawn");
    assert!(!body.is_cover());
    assert_eq!(body.step_count(), 1);
}

#[test]
fn test_insert_page_makes_a_page_of_its_own() {
    let text = "1 4 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat\n\
                0 STEP\n\
                0 !PUB INSERT PAGE\n\
                1 4 0 0 0 1 0 0 0 1 0 0 0 1 3002.dat\n\
                0 STEP\n";
    let mut navigator = Navigator::new(document(text));
    assert_eq!(navigator.count_pages().expect("count succeeds"), 3);

    let inserted = navigator.draw_page(2).expect("insert page drawn");
    assert_eq!(inserted.step_count(), 0);
    assert_eq!(inserted.inserts.len(), 1);
}

#[test]
fn test_step_group_renders_on_one_page() {
    let text = "1 4 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat\n\
                0 STEP\n\
                0 !PUB MULTI_STEP BEGIN\n\
                1 4 0 0 0 1 0 0 0 1 0 0 0 1 3002.dat\n\
                0 STEP\n\
                1 4 0 0 0 1 0 0 0 1 0 0 0 1 3003.dat\n\
                0 STEP\n\
                0 !PUB MULTI_STEP END\n";
    let mut navigator = Navigator::new(document(text));
    assert_eq!(navigator.count_pages().expect("count succeeds"), 2);

    let grouped = navigator.draw_page(2).expect("group page drawn");
    assert_eq!(grouped.step_count(), 2);
    let numbers: Vec<usize> = grouped.steps().map(|s| s.number).collect();
    assert_eq!(numbers, vec![2, 3]);
}

#[test]
fn test_submodel_pages_precede_the_referencing_page() {
    let text = "0 FILE main.ldr\n\
                0 Name: main.ldr\n\
                1 4 0 0 0 1 0 0 0 1 0 0 0 1 sub.ldr\n\
                0 STEP\n\
                0 NOFILE\n\
                0 FILE sub.ldr\n\
                0 Name: sub.ldr\n\
                1 4 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat\n\
                0 STEP\n\
                0 NOFILE\n";
    let mut navigator = Navigator::new(document(text));
    assert_eq!(navigator.count_pages().expect("count succeeds"), 2);
    let tops = &navigator.state().top_of_pages;
    assert_eq!(tops[0].model_name, "sub.ldr");
    assert_eq!(tops[1].model_name, "main.ldr");

    let first = navigator.draw_page(1).expect("submodel page drawn");
    assert_eq!(first.top.model_name, "sub.ldr");
    let second = navigator.draw_page(2).expect("parent page drawn");
    assert_eq!(second.top.model_name, "main.ldr");
}

#[test]
fn test_callout_attaches_to_parent_without_own_pages() {
    let text = "0 FILE main.ldr\n\
                0 Name: main.ldr\n\
                1 4 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat\n\
                0 !PUB CALLOUT BEGIN\n\
                1 4 0 0 0 1 0 0 0 1 0 0 0 1 arm.ldr\n\
                0 !PUB CALLOUT END\n\
                0 STEP\n\
                0 NOFILE\n\
                0 FILE arm.ldr\n\
                0 Name: arm.ldr\n\
                1 4 0 0 0 1 0 0 0 1 0 0 0 1 3002.dat\n\
                0 STEP\n\
                1 4 0 0 0 1 0 0 0 1 0 0 0 1 3003.dat\n\
                0 STEP\n\
                0 NOFILE\n";
    let mut navigator = Navigator::new(document(text));
    // The called-out submodel earns no pages of its own.
    assert_eq!(navigator.count_pages().expect("count succeeds"), 1);

    let page = navigator.draw_page(1).expect("page drawn");
    assert_eq!(page.step_count(), 1);
    let step = page.steps().next().expect("one step");
    assert_eq!(step.callouts.len(), 1);
    let callout = &step.callouts[0];
    assert_eq!(callout.step_count(), 2);
    assert_eq!(callout.instances, 1);

    // The placement counts as one unit; its internals stay out of the
    // inventory.
    let bom = navigator.bom();
    assert!(bom.entries().iter().any(|e| e.part == "arm.ldr"));
    assert!(!bom.entries().iter().any(|e| e.part == "3002.dat"));
}

#[test]
fn test_buffer_retrieve_synthesizes_special_step() {
    let text = "1 4 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat\n\
                0 BUFEXCHG A STORE\n\
                0 STEP\n\
                1 4 0 0 0 1 0 0 0 1 0 0 0 1 3002.dat\n\
                0 BUFEXCHG A RETRIEVE\n\
                0 STEP\n";
    let mut navigator = Navigator::new(document(text));
    assert_eq!(navigator.count_pages().expect("count succeeds"), 2);

    let page = navigator.draw_page(2).expect("page drawn");
    let step = page.steps().next().expect("one step");
    assert!(step.special_case);
    // The retrieve rolled the assembly back to the stored snapshot.
    assert_eq!(step.content.len(), 1);
}

#[test]
fn test_draw_page_is_deterministic() {
    let text = "0 FILE main.ldr\n\
                0 Name: main.ldr\n\
                1 4 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat\n\
                0 STEP\n\
                0 !PUB MULTI_STEP BEGIN\n\
                1 4 0 0 0 1 0 0 0 1 0 0 0 1 sub.ldr\n\
                0 STEP\n\
                1 4 0 0 0 1 0 0 0 1 0 0 0 1 3002.dat\n\
                0 STEP\n\
                0 !PUB MULTI_STEP END\n\
                0 NOFILE\n\
                0 FILE sub.ldr\n\
                0 Name: sub.ldr\n\
                1 4 0 0 0 1 0 0 0 1 0 0 0 1 3003.dat\n\
                0 STEP\n\
                0 NOFILE\n";
    let imager = Arc::new(RecordingImager::default());
    let mut navigator = Navigator::new(document(text)).with_imager(imager.clone());

    let first = navigator.draw_page(3).expect("first draw").clone();
    let split = imager.requests.lock().len();
    assert!(split > 0, "the draw invoked the renderer");

    let second = navigator.draw_page(3).expect("second draw").clone();
    assert_eq!(first, second);

    let log = imager.requests.lock();
    let (a, b) = log.split_at(split);
    assert_eq!(a, b, "renderer invocations repeat identically");
}

#[test]
fn test_navigation_clamps_to_counted_range() {
    let text = "1 4 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat\n\
                0 STEP\n\
                1 4 0 0 0 1 0 0 0 1 0 0 0 1 3002.dat\n\
                0 STEP\n\
                1 4 0 0 0 1 0 0 0 1 0 0 0 1 3003.dat\n\
                0 STEP\n";
    let mut navigator = Navigator::new(document(text));
    navigator.count_pages().expect("count succeeds");

    assert_eq!(navigator.goto_page(99).expect("clamped").number, 3);
    assert_eq!(navigator.next_page().expect("stays put").number, 3);
    assert_eq!(navigator.previous_page().expect("back one").number, 2);
    assert_eq!(navigator.goto_page(0).expect("clamped up").number, 1);
}

#[test]
fn test_unknown_page_before_count_is_range_error() {
    let text = "1 4 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat\n\
                0 STEP\n";
    let mut navigator = Navigator::new(document(text));
    let err = navigator.draw_page(4).expect_err("only one page exists");
    assert!(matches!(
        err,
        NavigatorError::PageOutOfRange { page: 4, pages: 1 }
    ));
    // The failed draw still counted the document.
    assert_eq!(navigator.state().max_pages, 1);
}

/// Imager that remembers the camera FOV of the last request.
#[derive(Default)]
struct FovProbe {
    fov: Mutex<Option<f32>>,
}

impl StepImager for FovProbe {
    fn image_step(&self, request: &StepRequest<'_>) -> Result<Option<PathBuf>, RenderError> {
        *self.fov.lock() = request.camera.fov;
        Ok(None)
    }
}

#[test]
fn test_out_of_range_camera_fov_is_reported_not_applied() {
    let probe = Arc::new(FovProbe::default());
    let text = "0 !PUB CAMERA_FOV 9999\n\
                1 4 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat\n\
                0 STEP\n";
    let mut navigator = Navigator::new(document(text)).with_imager(probe.clone());
    navigator.draw_page(1).expect("page drawn");
    assert_eq!(*probe.fov.lock(), None);
    assert_eq!(
        navigator.messages().count(MessageBucket::Configuration),
        1
    );

    let text = "0 !PUB CAMERA_FOV 25\n\
                1 4 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat\n\
                0 STEP\n";
    let mut navigator = Navigator::new(document(text)).with_imager(probe.clone());
    navigator.draw_page(1).expect("page drawn");
    assert_eq!(*probe.fov.lock(), Some(25.0));
    assert_eq!(
        navigator.messages().count(MessageBucket::Configuration),
        0
    );
}
