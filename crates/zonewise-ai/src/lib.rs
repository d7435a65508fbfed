//! LLM boundary: prompt rendering, the chat-completions client, parsing of raw
//! model text into zone objects, and scored prompt test runs.

mod client;
mod error;
pub mod prompt;
pub mod response;
mod runner;

#[cfg(feature = "http")]
pub use client::ChatClient;
pub use client::{Completion, CompletionRequest, Llm};
pub use error::{LlmError, ParseError, RunError};
pub use prompt::{DEFAULT_MAX_CHARS, DEFAULT_PROMPT, render};
pub use response::{ParsedResponse, parse_response};
pub use runner::{TestRun, run_prompt_test};
