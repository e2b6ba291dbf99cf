//! The inbound update shape.
//!
//! # Hierarchy
//!
//! ```text
//! Update { update_id }
//! ├── Message       { message_id, text, caption, entities, caption_entities }
//! └── CallbackQuery { id, data, game_short_name }
//! ```
//!
//! Text-like fields default to the empty string when the payload omits them,
//! so "no text" and "empty text" look the same to anything reading an update.

use serde::{Deserialize, Serialize};

use crate::error::UpdateResult;

// ============================================================================
// Update
// ============================================================================

/// One discrete inbound event.
///
/// At most one of [`message`](Self::message) and
/// [`callback_query`](Self::callback_query) is expected to be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    /// Sequential update identifier assigned by the sender.
    pub update_id: i64,
    /// A plain message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    /// A callback query from an inline keyboard button.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_query: Option<CallbackQuery>,
}

impl Update {
    /// Decodes an update from a JSON string.
    pub fn from_json(json: &str) -> UpdateResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Decodes an update from JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> UpdateResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Creates an update carrying a message.
    pub fn message(update_id: i64, message: Message) -> Self {
        Self {
            update_id,
            message: Some(message),
            callback_query: None,
        }
    }

    /// Creates an update carrying a callback query.
    pub fn callback_query(update_id: i64, query: CallbackQuery) -> Self {
        Self {
            update_id,
            message: None,
            callback_query: Some(query),
        }
    }

    /// Creates an update carrying a callback query with the given data.
    pub fn callback_data(update_id: i64, data: impl Into<String>) -> Self {
        Self::callback_query(update_id, CallbackQuery::with_data(data))
    }

    /// Returns a short name of the payload kind, for logging.
    pub fn kind(&self) -> &'static str {
        match (&self.message, &self.callback_query) {
            (Some(_), _) => "message",
            (None, Some(_)) => "callback_query",
            (None, None) => "empty",
        }
    }
}

// ============================================================================
// Message
// ============================================================================

/// A plain message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message identifier.
    #[serde(default)]
    pub message_id: i64,
    /// Message text.
    #[serde(default)]
    pub text: String,
    /// Caption of an attached photo or other media.
    #[serde(default)]
    pub caption: String,
    /// Entities annotating [`text`](Self::text).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<MessageEntity>,
    /// Entities annotating [`caption`](Self::caption).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub caption_entities: Vec<MessageEntity>,
}

impl Message {
    /// Creates a message with the given text and no entities.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Creates a media message with the given caption and no entities.
    pub fn caption(caption: impl Into<String>) -> Self {
        Self {
            caption: caption.into(),
            ..Default::default()
        }
    }

    /// Creates a message whose text starts with `/command`, annotated by a
    /// bot-command entity covering the command token.
    pub fn command(text: impl Into<String>) -> Self {
        let text = text.into();
        let length = text.split_whitespace().next().map_or(0, str::len);
        Self::text(text).with_entity(MessageEntity::bot_command(0, length))
    }

    /// Adds an entity over the message text.
    pub fn with_entity(mut self, entity: MessageEntity) -> Self {
        self.entities.push(entity);
        self
    }

    /// Adds an entity over the caption.
    pub fn with_caption_entity(mut self, entity: MessageEntity) -> Self {
        self.caption_entities.push(entity);
        self
    }

    /// Iterates the bot-command entities over the message text.
    pub fn command_entities(&self) -> impl Iterator<Item = &MessageEntity> {
        self.entities
            .iter()
            .filter(|e| e.kind == EntityKind::BotCommand)
    }
}

// ============================================================================
// CallbackQuery
// ============================================================================

/// A callback query sent when a user presses an inline keyboard button.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackQuery {
    /// Query identifier.
    #[serde(default)]
    pub id: String,
    /// Data attached to the pressed button.
    #[serde(default)]
    pub data: String,
    /// Short name of the game to launch, for game buttons.
    #[serde(default)]
    pub game_short_name: String,
}

impl CallbackQuery {
    /// Creates a query with the given button data.
    pub fn with_data(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            ..Default::default()
        }
    }

    /// Creates a query for the given game.
    pub fn with_game(short_name: impl Into<String>) -> Self {
        Self {
            game_short_name: short_name.into(),
            ..Default::default()
        }
    }
}

// ============================================================================
// MessageEntity
// ============================================================================

/// Kind of a [`MessageEntity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// `/command` or `/command@botname`.
    BotCommand,
    /// `@username`.
    Mention,
    /// `#hashtag`.
    Hashtag,
    /// `$USD`.
    Cashtag,
    /// `https://example.org`.
    Url,
    /// `user@example.org`.
    Email,
    /// `+1-212-555-0123`.
    PhoneNumber,
    /// Bold text.
    Bold,
    /// Italic text.
    Italic,
    /// Monowidth string.
    Code,
    /// Monowidth block.
    Pre,
    /// Clickable text link.
    TextLink,
    /// Any kind this crate does not know about.
    #[serde(other)]
    Other,
}

/// A span of text with a semantic meaning.
///
/// `offset` and `length` are byte offsets into the annotated UTF-8 string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEntity {
    /// Kind of the entity.
    #[serde(rename = "type")]
    pub kind: EntityKind,
    /// Start of the span.
    pub offset: usize,
    /// Length of the span.
    pub length: usize,
}

impl MessageEntity {
    /// Creates an entity.
    pub fn new(kind: EntityKind, offset: usize, length: usize) -> Self {
        Self {
            kind,
            offset,
            length,
        }
    }

    /// Creates a bot-command entity.
    pub fn bot_command(offset: usize, length: usize) -> Self {
        Self::new(EntityKind::BotCommand, offset, length)
    }

    /// Returns the end of the span, or `None` on overflow.
    pub fn end(&self) -> Option<usize> {
        self.offset.checked_add(self.length)
    }

    /// Returns the annotated slice of `text`.
    ///
    /// Spans that run past the end of `text` or do not fall on character
    /// boundaries yield `None`.
    pub fn span<'a>(&self, text: &'a str) -> Option<&'a str> {
        text.get(self.offset..self.end()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_message_update() {
        let json = r#"{
            "update_id": 42,
            "message": {
                "message_id": 7,
                "text": "/foo arg",
                "entities": [{ "type": "bot_command", "offset": 0, "length": 4 }]
            }
        }"#;

        let update = Update::from_json(json).unwrap();
        assert_eq!(update.update_id, 42);
        assert_eq!(update.kind(), "message");

        let message = update.message.unwrap();
        assert_eq!(message.text, "/foo arg");
        assert_eq!(message.caption, "");
        assert_eq!(message.entities, vec![MessageEntity::bot_command(0, 4)]);
    }

    #[test]
    fn test_deserialize_callback_query_update() {
        let json = r#"{
            "update_id": 1,
            "callback_query": { "id": "1000", "data": "page:2" }
        }"#;

        let update = Update::from_slice(json.as_bytes()).unwrap();
        assert!(update.message.is_none());

        let query = update.callback_query.unwrap();
        assert_eq!(query.id, "1000");
        assert_eq!(query.data, "page:2");
        assert_eq!(query.game_short_name, "");
    }

    #[test]
    fn test_unknown_entity_kind() {
        let json = r#"{ "type": "spoiler", "offset": 3, "length": 2 }"#;
        let entity: MessageEntity = serde_json::from_str(json).unwrap();
        assert_eq!(entity.kind, EntityKind::Other);
    }

    #[test]
    fn test_decode_error() {
        assert!(Update::from_json("{ not json").is_err());
        assert!(Update::from_json(r#"{ "message": {} }"#).is_err());
    }

    #[test]
    fn test_entity_span() {
        let entity = MessageEntity::bot_command(2, 4);
        assert_eq!(entity.span("a /foo bar"), Some("/foo"));
        assert_eq!(entity.span("a /f"), None);

        // Not on a char boundary.
        let entity = MessageEntity::bot_command(0, 2);
        assert_eq!(entity.span("ü"), Some("ü"));
        let entity = MessageEntity::bot_command(0, 1);
        assert_eq!(entity.span("ü"), None);

        let entity = MessageEntity::bot_command(usize::MAX, 2);
        assert_eq!(entity.span("text"), None);
    }

    #[test]
    fn test_builders_fill_the_right_fields() {
        let message = Message::caption("#cat").with_caption_entity(MessageEntity::new(
            EntityKind::Hashtag,
            0,
            4,
        ));
        assert!(message.entities.is_empty());
        assert_eq!(message.caption_entities[0].span(&message.caption), Some("#cat"));
        assert_eq!(message.command_entities().count(), 0);

        let query = CallbackQuery::with_game("snake");
        assert_eq!(query.game_short_name, "snake");
        assert_eq!(query.data, "");

        let json = serde_json::to_string(&Update::callback_query(5, query)).unwrap();
        let decoded = Update::from_json(&json).unwrap();
        assert_eq!(decoded.kind(), "callback_query");
        assert_eq!(decoded.callback_query.unwrap().game_short_name, "snake");
    }

    #[test]
    fn test_command_constructor() {
        let message = Message::command("/start now please");
        let commands: Vec<_> = message.command_entities().collect();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].span(&message.text), Some("/start"));
    }
}
