//! # Relay Core
//!
//! The update model consumed by the relay handler registry.
//!
//! An [`Update`] is one inbound event. It carries at most one payload shape:
//! a plain [`Message`] or a [`CallbackQuery`]. Text-bearing fields may be
//! annotated by [`MessageEntity`] spans (bot commands, mentions, links, ...).
//!
//! This crate only describes the shape. Receiving updates is the job of
//! whatever transport the host application uses, and deciding which handlers
//! apply is the job of `relay-framework`.
//!
//! ```rust,ignore
//! use relay_core::Update;
//!
//! let update = Update::from_json(r#"{
//!     "update_id": 7,
//!     "message": {
//!         "message_id": 1,
//!         "text": "/start now",
//!         "entities": [{ "type": "bot_command", "offset": 0, "length": 6 }]
//!     }
//! }"#)?;
//!
//! assert_eq!(update.message.unwrap().command_entities().count(), 1);
//! ```

pub mod error;
pub mod update;

pub use error::{UpdateError, UpdateResult};
pub use update::{CallbackQuery, EntityKind, Message, MessageEntity, Update};
