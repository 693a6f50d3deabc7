// Public modules
pub mod cleaner;
pub mod collector;
pub mod config;
pub mod digest;
pub mod error;
pub mod error_tracker;
pub mod fallback;
pub mod io;
pub mod merger;
pub mod models;
pub mod planner;
pub mod requester;
pub mod sender;
pub mod summarizer;

// Re-export commonly used types
pub use collector::NewsletterCollector;
pub use config::Config;
pub use digest::{DigestEmail, DigestRenderer};
pub use error::{AiRequestError, DocumentError, EmailError, EmptyInputError};
pub use error_tracker::{ErrorStats, ErrorTracker};
pub use io::{list_digests, load_digest, save_digest, write_renderings};
pub use models::{Category, CategorySummary, DigestRecord, NewsletterDocument, Priority, StructuredSummary};
pub use planner::BatchTuning;
pub use requester::{AiTransport, OpenAiTransport, SummaryRequester};
pub use sender::DigestSender;
pub use summarizer::Summarizer;
