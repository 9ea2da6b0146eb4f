//! Embassy async tasks
//!
//! Each task runs independently and communicates via channels/signals.

pub mod button;
pub mod link;
pub mod tick;

pub use button::button_task;
pub use link::link_task;
pub use tick::tick_task;
