//! Decoupled notification of application progress.
//!
//! Long-running work (counting pages, drawing, rendering, flushing
//! files) reports what happened by publishing typed events; anything
//! with an interest, from a front end to a test, listens without the
//! worker knowing about it. Publishing through [`emit!`](crate::emit)
//! is fire-and-forget:
//!
//! ```rust,ignore
//! use brickpub_core::event_bus::{event_bus, AppEvent, EventCategory, EventFilter, NavigationEvent};
//!
//! let subscription = event_bus().subscribe(
//!     EventFilter::Categories(vec![EventCategory::Navigation]),
//!     |event| {
//!         if let AppEvent::Navigation(nav) = event {
//!             println!("{nav:?}");
//!         }
//!     },
//! );
//!
//! let _ = brickpub_core::emit!(AppEvent::Navigation(NavigationEvent::PageDisplayed {
//!     page: 3,
//!     of: 12,
//! }));
//!
//! event_bus().unsubscribe(subscription);
//! ```

mod bus;
mod events;

pub use bus::*;
pub use events::*;
