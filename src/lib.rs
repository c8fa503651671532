// ABOUTME: Public library API for wikiport page migration
// ABOUTME: Re-exports the service clients, shared capability and error types

pub mod cli;
pub mod config;
pub mod error;
pub mod growi;
pub mod knowledge;
pub mod markdown;
pub mod model;
pub mod service;
pub mod storage;
pub mod transport;

pub use config::Connection;
pub use error::{Error, Outcome, Refusal, Result};
pub use growi::GrowiClient;
pub use knowledge::KnowledgeClient;
pub use service::MarkdownService;
