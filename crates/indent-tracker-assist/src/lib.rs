//! Assist client for the indent tracker.
//!
//! Drafts ready notifications and workload summaries through a generative
//! text API, retrying failed requests with exponential backoff and falling
//! back to fixed text when every attempt fails.

pub mod client;
pub mod prompts;
pub mod retry;
pub mod transport;

pub use client::*;
pub use prompts::*;
pub use retry::{Exhausted, RetryPolicy};
pub use transport::{GeminiTransport, TextGeneration, TransportError};
