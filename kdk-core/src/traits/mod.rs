//! Collaborator traits
//!
//! These traits define the interface between the link engine and the
//! domain code built on top of it.

pub mod observer;

pub use observer::ParameterObserver;
