//! Matching rules for registered handlers.
//!
//! A [`Rule`] decides whether a handler applies to an update. It is either
//! structured, a [`Category`] selecting which field of the update to read
//! plus a [`Pattern`] evaluated against it, or a custom predicate that
//! replaces both.
//!
//! # Field selection
//!
//! | Category                     | Source                     | Entities                  |
//! |------------------------------|----------------------------|---------------------------|
//! | `MessageText`, `Command`     | `message.text`             | `message.entities`        |
//! | `CallbackQueryData`          | `callback_query.data`      | none                      |
//! | `CallbackQueryGameShortName` | `callback_query.game_short_name` | none                |
//! | `PhotoCaption`               | `message.caption`          | `message.caption_entities`|
//! | `Unknown`                    | never matches              |                           |
//!
//! # Pattern evaluation
//!
//! - [`Pattern::Regex`] matches anywhere in the text unless the expression
//!   anchors itself.
//! - [`Pattern::Text`] under [`Category::Command`] matches only a bot-command
//!   entity starting at offset 0 whose name (without the leading `/`) equals
//!   the pattern. Commands later in the text never match.
//! - [`Pattern::Text`] under any other category matches when its source,
//!   read as a regular expression, matches the text, or when the text
//!   contains the source verbatim.
//! - [`Pattern::None`] never matches.
//!
//! Text patterns are compiled once, when the pattern is built. A source that
//! is not a valid regular expression keeps only the substring check, on every
//! evaluation. Matching never fails and never panics.

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::registry::RegisteredHandler;
use relay_core::{EntityKind, MessageEntity, Update};

// ============================================================================
// Category
// ============================================================================

const NO_ENTITIES: &[MessageEntity] = &[];

/// Which field of an update a structured rule inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Free text of a message.
    MessageText,
    /// A bot command at the start of a message.
    Command,
    /// Callback query payload data.
    CallbackQueryData,
    /// Callback query game short name.
    CallbackQueryGameShortName,
    /// Caption of a photo message.
    PhotoCaption,
    /// A category this crate does not recognize. Never matches.
    Unknown,
}

impl Category {
    /// Parses a category name. Unrecognized names map to [`Category::Unknown`].
    pub fn from_name(name: &str) -> Self {
        match name {
            "message_text" | "text" => Self::MessageText,
            "command" => Self::Command,
            "callback_query_data" | "callback_data" => Self::CallbackQueryData,
            "callback_query_game_short_name" | "game_short_name" => {
                Self::CallbackQueryGameShortName
            }
            "photo_caption" | "caption" => Self::PhotoCaption,
            _ => Self::Unknown,
        }
    }

    /// Returns the canonical name of this category.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MessageText => "message_text",
            Self::Command => "command",
            Self::CallbackQueryData => "callback_query_data",
            Self::CallbackQueryGameShortName => "callback_query_game_short_name",
            Self::PhotoCaption => "photo_caption",
            Self::Unknown => "unknown",
        }
    }

    /// Selects the text and entity list this category reads from `update`.
    ///
    /// Returns `None` when the update does not carry the required payload.
    fn select<'a>(&self, update: &'a Update) -> Option<(&'a str, &'a [MessageEntity])> {
        match self {
            Self::MessageText | Self::Command => update
                .message
                .as_ref()
                .map(|m| (m.text.as_str(), m.entities.as_slice())),
            Self::CallbackQueryData => update
                .callback_query
                .as_ref()
                .map(|q| (q.data.as_str(), NO_ENTITIES)),
            Self::CallbackQueryGameShortName => update
                .callback_query
                .as_ref()
                .map(|q| (q.game_short_name.as_str(), NO_ENTITIES)),
            Self::PhotoCaption => update
                .message
                .as_ref()
                .map(|m| (m.caption.as_str(), m.caption_entities.as_slice())),
            Self::Unknown => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Pattern
// ============================================================================

/// A string pattern, read both as a regular expression and as a literal.
#[derive(Debug, Clone)]
pub struct TextPattern {
    source: String,
    regex: Option<Regex>,
}

impl TextPattern {
    /// Creates a pattern, compiling `source` as a regular expression if it is one.
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let regex = Regex::new(&source).ok();
        Self { source, regex }
    }

    /// Returns the pattern source.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the compiled expression, if the source compiled.
    pub fn regex(&self) -> Option<&Regex> {
        self.regex.as_ref()
    }

    /// Returns whether the source is a valid regular expression.
    pub fn is_valid_regex(&self) -> bool {
        self.regex.is_some()
    }

    /// Regex match anywhere in `text`, or verbatim containment.
    pub fn is_match(&self, text: &str) -> bool {
        let by_regex = self.regex.as_ref().is_some_and(|re| re.is_match(text));
        let by_substring = text.contains(self.source.as_str());
        by_regex || by_substring
    }
}

/// The pattern of a structured rule.
#[derive(Debug, Clone, Default)]
pub enum Pattern {
    /// A literal or regex-source string.
    Text(TextPattern),
    /// A precompiled regular expression.
    Regex(Regex),
    /// No pattern. Never matches.
    #[default]
    None,
}

impl From<&str> for Pattern {
    fn from(source: &str) -> Self {
        Self::Text(TextPattern::new(source))
    }
}

impl From<String> for Pattern {
    fn from(source: String) -> Self {
        Self::Text(TextPattern::new(source))
    }
}

impl From<TextPattern> for Pattern {
    fn from(pattern: TextPattern) -> Self {
        Self::Text(pattern)
    }
}

impl From<Regex> for Pattern {
    fn from(regex: Regex) -> Self {
        Self::Regex(regex)
    }
}

impl<T: Into<Pattern>> From<Option<T>> for Pattern {
    fn from(pattern: Option<T>) -> Self {
        pattern.map_or(Self::None, Into::into)
    }
}

// ============================================================================
// Rule
// ============================================================================

/// A type-erased custom predicate.
pub type MatchFn = Arc<dyn Fn(&Update) -> bool + Send + Sync>;

/// Decides whether a handler applies to an update.
#[derive(Clone)]
pub enum Rule {
    /// Category-selected field evaluated against a pattern.
    Structured {
        /// Which field to read.
        category: Category,
        /// What to look for in it.
        pattern: Pattern,
    },
    /// A custom predicate, fully replacing category and pattern evaluation.
    Predicate(MatchFn),
}

impl Rule {
    /// Creates a structured rule.
    pub fn structured(category: Category, pattern: impl Into<Pattern>) -> Self {
        Self::Structured {
            category,
            pattern: pattern.into(),
        }
    }

    /// Creates a rule from a custom predicate.
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Update) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(f))
    }

    /// Returns the category of a structured rule.
    pub fn category(&self) -> Option<Category> {
        match self {
            Self::Structured { category, .. } => Some(*category),
            Self::Predicate(_) => None,
        }
    }

    /// Checks whether this rule applies to `update`.
    ///
    /// A custom predicate is called exactly once and its answer returned
    /// unchanged. A panic inside it propagates to the caller.
    pub fn matches(&self, update: &Update) -> bool {
        match self {
            Self::Predicate(f) => f(update),
            Self::Structured { category, pattern } => {
                let Some((text, entities)) = category.select(update) else {
                    return false;
                };

                match pattern {
                    Pattern::Regex(re) => re.is_match(text),
                    Pattern::Text(p) if *category == Category::Command => {
                        is_leading_command(text, entities, p.source())
                    }
                    Pattern::Text(p) => p.is_match(text),
                    Pattern::None => false,
                }
            }
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structured { category, pattern } => f
                .debug_struct("Structured")
                .field("category", category)
                .field("pattern", pattern)
                .finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Whether `text` starts with the bot command `/name`.
fn is_leading_command(text: &str, entities: &[MessageEntity], name: &str) -> bool {
    entities
        .iter()
        .filter(|e| e.kind == EntityKind::BotCommand && e.offset == 0)
        .any(|e| e.span(text).and_then(|span| span.get(1..)) == Some(name))
}

/// Checks whether `handler` applies to `update`.
pub fn matches(handler: &RegisteredHandler, update: &Update) -> bool {
    handler.rule().matches(update)
}
