//! Change notification for the scene data model.
//!
//! Mutations of the data model are batched in a `scene_model::ChangeRecorder`. Once per unit of
//! work, the batch is handed to a `ChangeDispatcher`, which notifies every listener registered on
//! a matching channel, in a fixed order. Registering a listener returns a `Subscription`; the
//! listener stays registered for as long as the subscription is alive.
//!
//! ```
//! use scene_notify::ChangeDispatcher;
//! use scene_notify::scene_model::{ChangeRecorder, PropertyPath, RecordChanges};
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let dispatcher = ChangeDispatcher::new();
//! let path: PropertyPath = "sphere.radius".parse().unwrap();
//!
//! let count = Rc::new(Cell::new(0));
//! let _sub = dispatcher.register_on(path.clone(), {
//!     let count = count.clone();
//!     move || count.set(count.get() + 1)
//! });
//!
//! let mut recorder = ChangeRecorder::new();
//! recorder.record_value_changed(&path);
//! dispatcher.dispatch(&recorder.release());
//! assert_eq!(count.get(), 1);
//! ```
mod channel;
mod config;
mod diagnostics;
mod dispatcher;
mod error;
mod listener;
mod subscription;

pub use config::{DispatcherConfig, LeakCheck};
pub use diagnostics::{ChannelKind, LeakReport, LeakedListener};
pub use dispatcher::{BulkChangeCallback, ChangeDispatcher};
pub use error::Error;
pub use subscription::Subscription;

pub use scene_model;
