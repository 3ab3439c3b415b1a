//! Stock plugins.
//!
//! Each function returns an ordinary [`StorePlugin`](crate::StorePlugin) with
//! a fixed name. Rename with
//! [`StorePlugin::with_name`](crate::StorePlugin::with_name) when installing
//! more than one of the same kind.

mod lifecycle;
mod logging;
pub mod time_travel;
mod undo_redo;
mod while_subscribed;

pub use lifecycle::{deinit_plugin, init_plugin, recover_plugin, undelivered_handling_plugin};
pub use logging::logging_plugin;
pub use time_travel::TimeTravel;
pub use undo_redo::UndoRedo;
pub use while_subscribed::while_subscribed_plugin;
