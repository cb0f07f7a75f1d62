//! # Event Bus Module
//!
//! Publish/subscribe channel for coordinator progress. Every calibration,
//! registration, alignment and sequencer transition is published as an
//! [`AlignmentEvent`] in addition to being traced.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use alignkit_core::event_bus::{AlignmentEvent, EventBus, EventCategory, EventFilter};
//!
//! let bus = EventBus::shared();
//! let id = bus.subscribe(
//!     EventFilter::Categories(vec![EventCategory::Calibration]),
//!     |event| println!("{}", event.description()),
//! );
//! bus.unsubscribe(id);
//! ```

mod bus;
mod events;

pub use bus::*;
pub use events::*;
