//! Search orchestration: domain filtering, citation context, prompts, and the streaming pipeline.

pub(crate) mod context;
pub(crate) mod domain;
pub(crate) mod engine;
pub(crate) mod prompt;
pub(crate) mod select;
pub(crate) mod sources;
pub(crate) mod ticker;
