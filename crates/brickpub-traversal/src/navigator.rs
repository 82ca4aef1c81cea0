//! Document navigator
//!
//! Owns the document and everything a traversal needs around it: the
//! build-modification registry, the annotation cache, the process
//! tracker, and the last materialized page. Callers ask for a page or
//! a count; the navigator runs the sweep, absorbs interrupts by
//! rewinding history or refreshing annotations and re-running, and
//! publishes navigation events as state settles.
//!
//! Only one traversal runs at a time. A second request while one is in
//! flight fails fast with the busy state rather than queueing.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info};

use brickpub_core::constants::MAX_DRAW_RESTARTS;
use brickpub_core::data::Where;
use brickpub_core::emit;
use brickpub_core::message::MessageDispatcher;
use brickpub_core::process::{ProcessError, ProcessState, ProcessTracker};
use brickpub_core::service::{
    ColorTable, MemoryPartCatalog, NoSubstitution, PartCatalog, PartSubstitution,
    StaticColorTable,
};
use brickpub_core::{AppEvent, NavigationEvent};
use brickpub_document::Document;

use crate::annotations::AnnotationCache;
use crate::buildmod::{BuildModAction, BuildModRegistry};
use crate::context::{
    LayoutConsumer, NavigatorState, NullImager, NullLayout, StepImager, TraversalContext,
};
use crate::find::{sweep, SweepResult};
use crate::page::Page;
use crate::pli::PliAccumulator;
use crate::signal::TraverseRc;

/// Why a navigation request failed
#[derive(Debug, Error)]
pub enum NavigatorError {
    /// Another traversal holds the tracker.
    #[error(transparent)]
    Busy(#[from] ProcessError),

    /// Abort was requested while the traversal ran.
    #[error("traversal aborted")]
    Aborted,

    /// The requested page does not exist.
    #[error("page {page} is out of range, the document has {pages} pages")]
    PageOutOfRange { page: usize, pages: usize },

    /// A malformed line stopped the traversal.
    #[error("traversal could not proceed past {loc}")]
    InvalidLine { loc: Where },

    /// Restarts kept invalidating each other.
    #[error("traversal did not settle after {restarts} restarts")]
    Unsettled { restarts: u32 },
}

/// Stateful front door to page counting and display
pub struct Navigator {
    document: Document,
    colors: Arc<dyn ColorTable>,
    catalog: Arc<dyn PartCatalog>,
    substitutions: Arc<dyn PartSubstitution>,
    imager: Arc<dyn StepImager>,
    messages: Arc<MessageDispatcher>,
    tracker: Arc<ProcessTracker>,
    registry: BuildModRegistry,
    annotations: AnnotationCache,
    state: NavigatorState,
    current: Option<Page>,
    bom: PliAccumulator,
}

impl Navigator {
    /// Navigator over a document with no renderer and built-in services
    pub fn new(document: Document) -> Self {
        Self {
            document,
            colors: Arc::new(StaticColorTable::new()),
            catalog: Arc::new(MemoryPartCatalog::new()),
            substitutions: Arc::new(NoSubstitution),
            imager: Arc::new(NullImager),
            messages: Arc::new(MessageDispatcher::new()),
            tracker: Arc::new(ProcessTracker::new()),
            registry: BuildModRegistry::new(),
            annotations: AnnotationCache::new(),
            state: NavigatorState::default(),
            current: None,
            bom: PliAccumulator::default(),
        }
    }

    pub fn with_colors(mut self, colors: Arc<dyn ColorTable>) -> Self {
        self.colors = colors;
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn PartCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_substitutions(mut self, substitutions: Arc<dyn PartSubstitution>) -> Self {
        self.substitutions = substitutions;
        self
    }

    pub fn with_imager(mut self, imager: Arc<dyn StepImager>) -> Self {
        self.imager = imager;
        self
    }

    pub fn with_messages(mut self, messages: Arc<MessageDispatcher>) -> Self {
        self.messages = messages;
        self
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    /// Swap in a different document, dropping all derived state
    ///
    /// The annotation cache survives; its entries are keyed by part, not
    /// by document.
    pub fn replace_document(&mut self, document: Document) {
        self.document = document;
        self.registry.clear();
        self.state = NavigatorState::default();
        self.current = None;
        self.bom = PliAccumulator::default();
    }

    pub fn state(&self) -> &NavigatorState {
        &self.state
    }

    pub fn current_page(&self) -> Option<&Page> {
        self.current.as_ref()
    }

    pub fn bom(&self) -> &PliAccumulator {
        &self.bom
    }

    pub fn registry(&self) -> &BuildModRegistry {
        &self.registry
    }

    pub fn messages(&self) -> &Arc<MessageDispatcher> {
        &self.messages
    }

    pub fn tracker(&self) -> &Arc<ProcessTracker> {
        &self.tracker
    }

    /// Ask the running traversal, if any, to stop
    pub fn request_abort(&self) {
        self.tracker.request_abort();
    }

    /// Count every page of the document
    pub fn count_pages(&mut self) -> Result<usize, NavigatorError> {
        let tracker = Arc::clone(&self.tracker);
        let _guard = tracker.try_begin(ProcessState::CountPages)?;
        let _ = emit!(AppEvent::Navigation(NavigationEvent::TraversalStarted {
            process: ProcessState::CountPages.to_string(),
        }));
        self.messages.begin_session();

        let result = self.run_sweep(None, &mut NullLayout)?;
        let (_, pages, _) = self.absorb(result);
        let _ = emit!(AppEvent::Navigation(NavigationEvent::PageCountChanged {
            pages,
        }));
        info!(pages, "page count complete");
        Ok(pages)
    }

    /// Materialize one page, recounting the document on the way
    pub fn draw_page(&mut self, target: usize) -> Result<&Page, NavigatorError> {
        self.draw_page_into(target, &mut NullLayout)
    }

    /// Materialize one page and hand it to a layout consumer
    pub fn draw_page_into(
        &mut self,
        target: usize,
        layout: &mut dyn LayoutConsumer,
    ) -> Result<&Page, NavigatorError> {
        let tracker = Arc::clone(&self.tracker);
        let guard = tracker.try_begin(ProcessState::FindPage)?;
        let _ = emit!(AppEvent::Navigation(NavigationEvent::TraversalStarted {
            process: ProcessState::FindPage.to_string(),
        }));
        self.messages.begin_session();
        guard.transition(ProcessState::DrawPage);

        let result = self.run_sweep(Some(target), layout)?;
        drop(guard);
        let (rc, pages, page) = self.absorb(result);
        let _ = emit!(AppEvent::Navigation(NavigationEvent::PageCountChanged {
            pages,
        }));
        if let TraverseRc::RangeError { page } = rc {
            return Err(NavigatorError::PageOutOfRange { page, pages });
        }
        let Some(page) = page else {
            return Err(NavigatorError::PageOutOfRange {
                page: target,
                pages,
            });
        };

        self.state.display_page = target;
        self.state.build_mod_jump_forward = false;
        let _ = emit!(AppEvent::Navigation(NavigationEvent::PageDisplayed {
            page: target,
            of: pages,
        }));
        info!(page = target, of = pages, "page displayed");
        Ok(self.current.insert(page))
    }

    /// Display a page by number, clamped to the known range
    pub fn goto_page(&mut self, page: usize) -> Result<&Page, NavigatorError> {
        let target = if self.state.max_pages > 0 {
            page.clamp(1, self.state.max_pages)
        } else {
            page.max(1)
        };
        self.draw_page(target)
    }

    pub fn next_page(&mut self) -> Result<&Page, NavigatorError> {
        self.goto_page(self.state.display_page.saturating_add(1))
    }

    pub fn previous_page(&mut self) -> Result<&Page, NavigatorError> {
        self.goto_page(self.state.display_page.saturating_sub(1).max(1))
    }

    /// Record a user action on a build modification at a step
    ///
    /// Returns the action previously recorded at that step, if any. The
    /// change takes effect on the next draw; a document directive at the
    /// same step wins over this override when they disagree.
    pub fn set_modification_action(
        &mut self,
        key: &str,
        step: usize,
        action: BuildModAction,
    ) -> Option<BuildModAction> {
        let previous = self.registry.set_action(key, step, action);
        if previous != Some(action) {
            self.state.build_mod_jump_forward = true;
            self.state.revision = self.state.revision.wrapping_add(1);
            let _ = emit!(AppEvent::Navigation(
                NavigationEvent::ModificationActionChanged {
                    key: key.to_string(),
                    step,
                }
            ));
        }
        previous
    }

    /// Run the sweep, absorbing restartable interrupts
    ///
    /// Divergent modification history is rewound from the divergent step
    /// and the sweep re-run; stale annotations are refreshed likewise.
    /// Either way the restart count is capped so mutually invalidating
    /// state cannot loop forever.
    fn run_sweep(
        &mut self,
        target: Option<usize>,
        layout: &mut dyn LayoutConsumer,
    ) -> Result<SweepResult, NavigatorError> {
        let abort = self.tracker.abort_flag();
        let mut restarts: u32 = 0;
        loop {
            let ctx = TraversalContext {
                document: &self.document,
                colors: self.colors.as_ref(),
                catalog: self.catalog.as_ref(),
                substitutions: self.substitutions.as_ref(),
                messages: self.messages.as_ref(),
                abort: abort.clone(),
            };
            let result = sweep(
                &ctx,
                &mut self.registry,
                &mut self.annotations,
                self.imager.as_ref(),
                layout,
                target,
            );
            match &result.rc {
                TraverseRc::Continue | TraverseRc::EndOfPage | TraverseRc::RangeError { .. } => {
                    return Ok(result);
                }
                TraverseRc::BuildModAction { key, step } => {
                    let (key, step) = (key.clone(), *step);
                    restarts += 1;
                    if restarts > MAX_DRAW_RESTARTS {
                        return Err(NavigatorError::Unsettled { restarts });
                    }
                    let dropped = self.registry.delete_from(step);
                    debug!(
                        key = %key,
                        step,
                        dropped,
                        restarts,
                        "modification history rewound"
                    );
                    let _ = emit!(AppEvent::Navigation(
                        NavigationEvent::ModificationActionChanged { key, step }
                    ));
                }
                TraverseRc::CsiAnnotation => {
                    restarts += 1;
                    if restarts > MAX_DRAW_RESTARTS {
                        return Err(NavigatorError::Unsettled { restarts });
                    }
                    debug!(restarts, "annotation cache refreshed");
                    self.annotations.refresh();
                }
                TraverseRc::AbortProcess => {
                    let _ = emit!(AppEvent::Navigation(NavigationEvent::TraversalAborted));
                    return Err(NavigatorError::Aborted);
                }
                TraverseRc::InvalidLine { loc } => {
                    return Err(NavigatorError::InvalidLine { loc: loc.clone() });
                }
            }
        }
    }

    /// Fold a sweep's output into navigator state
    fn absorb(&mut self, result: SweepResult) -> (TraverseRc, usize, Option<Page>) {
        self.state.max_pages = result.pages;
        self.state.top_of_pages = result.top_of_pages;
        self.state.revision = self.state.revision.wrapping_add(1);
        self.bom = result.bom;
        (result.rc, result.pages, result.page)
    }
}

/// Count pages off the caller's thread
pub fn count_pages_background(
    navigator: Arc<Mutex<Navigator>>,
) -> tokio::task::JoinHandle<Result<usize, NavigatorError>> {
    tokio::task::spawn_blocking(move || navigator.lock().count_pages())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(text: &str) -> Document {
        Document::from_text("main.ldr", text, &MessageDispatcher::new())
    }

    const TWO_STEPS: &str = "1 4 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat\n\
                             0 STEP\n\
                             1 4 0 0 0 1 0 0 0 1 0 0 0 1 3002.dat\n\
                             0 STEP\n";

    #[test]
    fn test_count_pages_updates_state() {
        let mut navigator = Navigator::new(document(TWO_STEPS));
        let pages = navigator.count_pages().expect("count succeeds");
        assert_eq!(pages, 2);
        assert_eq!(navigator.state().max_pages, 2);
        assert_eq!(navigator.state().top_of_pages.len(), 3);
        assert_eq!(navigator.state().display_page, 0);
    }

    #[test]
    fn test_draw_page_sets_display_state() {
        let mut navigator = Navigator::new(document(TWO_STEPS));
        let page = navigator.draw_page(2).expect("page drawn");
        assert_eq!(page.number, 2);
        assert_eq!(navigator.state().display_page, 2);
        assert_eq!(navigator.state().max_pages, 2);
        let current = navigator.current_page().expect("page retained");
        assert_eq!(current.number, 2);
    }

    #[test]
    fn test_out_of_range_page_reports_count() {
        let mut navigator = Navigator::new(document(TWO_STEPS));
        let err = navigator.draw_page(9).expect_err("page 9 does not exist");
        match err {
            NavigatorError::PageOutOfRange { page, pages } => {
                assert_eq!(page, 9);
                assert_eq!(pages, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
        // The count from the failed request still lands.
        assert_eq!(navigator.state().max_pages, 2);
        assert_eq!(navigator.state().display_page, 0);
    }

    #[test]
    fn test_goto_clamps_to_known_range() {
        let mut navigator = Navigator::new(document(TWO_STEPS));
        navigator.count_pages().expect("count succeeds");
        let page = navigator.goto_page(99).expect("clamped to last page");
        assert_eq!(page.number, 2);
        let page = navigator.previous_page().expect("back one page");
        assert_eq!(page.number, 1);
        let page = navigator.previous_page().expect("stays on first page");
        assert_eq!(page.number, 1);
    }

    #[test]
    fn test_busy_tracker_rejects_request() {
        let mut navigator = Navigator::new(document(TWO_STEPS));
        let tracker = Arc::clone(navigator.tracker());
        let _guard = tracker
            .try_begin(ProcessState::WriteWorkFiles)
            .expect("tracker idle");
        let err = navigator.count_pages().expect_err("tracker is busy");
        assert!(matches!(err, NavigatorError::Busy(_)));
    }

    #[test]
    fn test_divergent_action_settles_by_rewind() {
        let text = "1 4 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat\n\
                    0 !PUB BUILD_MOD BEGIN \"m\"\n\
                    1 4 0 0 0 1 0 0 0 1 0 0 0 1 3002.dat\n\
                    0 !PUB BUILD_MOD END_MOD\n\
                    0 !PUB BUILD_MOD END\n\
                    0 STEP\n\
                    0 !PUB BUILD_MOD REMOVE \"m\"\n\
                    1 4 0 0 0 1 0 0 0 1 0 0 0 1 3003.dat\n\
                    0 STEP\n";
        let mut navigator = Navigator::new(document(text));
        navigator.count_pages().expect("count succeeds");
        // Conflicts with the document's REMOVE directive at step 2.
        let previous = navigator.set_modification_action("m", 2, BuildModAction::Apply);
        assert_eq!(previous, Some(BuildModAction::Remove));
        assert!(navigator.state().build_mod_jump_forward);

        let page = navigator.draw_page(2).expect("settles after rewind");
        assert_eq!(page.number, 2);
        // The directive wins at its own step.
        assert_eq!(
            navigator.registry().action_at("m", 2),
            Some(BuildModAction::Remove)
        );
        assert!(!navigator.state().build_mod_jump_forward);
    }

    #[test]
    fn test_replace_document_resets_derived_state() {
        let mut navigator = Navigator::new(document(TWO_STEPS));
        navigator.draw_page(1).expect("page drawn");
        assert!(navigator.current_page().is_some());

        navigator.replace_document(document("1 4 0 0 0 1 0 0 0 1 0 0 0 1 3005.dat\n0 STEP\n"));
        assert!(navigator.current_page().is_none());
        assert_eq!(navigator.state().max_pages, 0);
        let pages = navigator.count_pages().expect("count succeeds");
        assert_eq!(pages, 1);
    }
}
