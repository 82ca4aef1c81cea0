//! # BrickPub Core
//!
//! Core types, traits, and utilities for BrickPub.
//! Provides the fundamental abstractions for document coordinates,
//! error handling, event distribution, user-visible message routing,
//! and the external collaborator services (part catalog, colour table).

pub mod constants;
pub mod data;
pub mod error;
pub mod event_bus;
pub mod message;
pub mod process;
pub mod service;

pub use data::{RotStep, RotStepKind, Where};

pub use error::{
    BuildModError, DocumentError, Error, ParseError, RenderError, Result, SettingsError,
};

// Re-export event bus for convenience
pub use event_bus::{
    event_bus, AppEvent, BusOptions, DocumentEvent, ErrorEvent, EventBus, EventCategory,
    EventFilter, HistoryPolicy, NavigationEvent, RenderEvent, SettingsEvent, SubscriptionId,
};

pub use message::{MessageBucket, MessageDispatcher, MessageLevel, MessageRouting, UserMessage};

pub use process::{AbortFlag, ProcessError, ProcessGuard, ProcessState, ProcessTracker};

pub use service::{
    ArchivePartCatalog, ColorEntry, ColorTable, MemoryPartCatalog, NoSubstitution, PartCatalog,
    PartSubstitution, StaticColorTable,
};
