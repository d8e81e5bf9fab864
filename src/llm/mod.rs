//! Model backends behind the `TextGenerator` capability.

pub mod client;
pub mod types;

pub use client::{ChatClient, FOLLOW_UP_MODEL, TextGenerator, TextStream};
pub use types::{ChatMessage, GenerationRequest};
