//! Bring-up and polling state machine
//!
//! The link is explicit, finite, and deterministic: every state change is
//! a function of the current state and one queued event. Side effects
//! (requests, registry updates) live in the engine's entry/loop/exit
//! handlers, never in the transition table.

pub mod events;
pub mod machine;

pub use events::Event;
pub use machine::State;
