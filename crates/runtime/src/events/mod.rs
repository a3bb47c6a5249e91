//! Event plumbing between the worker and runtime consumers.

mod bus;

pub use bus::EventBus;
