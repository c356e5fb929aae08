//! `SealChat` Core Library
//!
//! Client-side messaging on top of `sealchat-crypto`:
//! - Directory and relay service boundaries, with in-memory implementations
//! - The [`Messenger`] send/open pipeline and key pinning policy
//! - Conversation display ordering and de-duplication
//! - Configuration and tracing setup shared by the binary

pub mod config;
pub mod conversation;
pub mod directory;
pub mod error;
pub mod messenger;
pub mod pinning;
pub mod relay;
pub mod tracing_init;

pub use conversation::{ConversationView, DisplayMessage, MessageBody};
pub use directory::{Directory, MemoryDirectory, PublishedKeys};
pub use error::{Error, RelayError, Result};
pub use messenger::{DEFAULT_SENT_CACHE_CAPACITY, Messenger, MessengerOptions};
pub use pinning::KeyPins;
pub use relay::{MemoryRelay, Relay};
