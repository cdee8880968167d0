//! Concrete [`ClientWrapper`](crate::client_wrapper::ClientWrapper)
//! implementations for hosted model providers.

pub mod common;
pub mod gemini;
