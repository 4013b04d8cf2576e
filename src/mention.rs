//! `@mention` handling for hub chat
//!
//! Two separate jobs live here:
//!
//! - While typing: find the live `@query` token left of the caret, filter the
//!   hub roster by it, and replace the token with the chosen persona's name
//!   ([`active_token`], [`filter`], [`commit`], [`MentionMenu`]).
//! - On send: work out which personas a finished message addresses
//!   ([`resolve_targets`]).
//!
//! # Mention Syntax
//!
//! A token starts with `@` at the beginning of the buffer or right after a
//! space, so `mail@example.com` never opens the menu. Committed mentions have
//! whitespace removed from the name: `@AdaLovelace`.
//!
//! # Examples
//!
//! ```
//! use emrys::mention::{active_token, commit};
//!
//! let buffer = "hey @ad";
//! let token = active_token(buffer, buffer.len()).unwrap();
//! assert_eq!(token.query, "ad");
//!
//! let (text, caret) = commit(buffer, &token, "Ada Lovelace");
//! assert_eq!(text, "hey @AdaLovelace ");
//! assert_eq!(caret, text.len());
//! ```

use crate::models::Persona;

/// The `@query` token being typed
///
/// Offsets are byte offsets into the buffer the token was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionToken {
    /// Offset of the `@`
    pub start: usize,
    /// Caret offset when the token was read; the token ends here
    pub caret: usize,
    /// Text between the `@` and the caret
    pub query: String,
}

/// A persona as offered in the mention menu
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub persona_id: String,
    pub name: String,
    pub subtitle: Option<String>,
}

impl From<&Persona> for RosterEntry {
    fn from(persona: &Persona) -> Self {
        Self {
            persona_id: persona.id.clone(),
            name: persona.name().to_string(),
            subtitle: persona.profile.occupation.clone(),
        }
    }
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    let mut index = index.min(s.len());
    while !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Finds the mention token ending at `caret`
///
/// Only the nearest `@` left of the caret is considered. If it is not at the
/// start of the buffer or right after a space there is no token.
pub fn active_token(buffer: &str, caret: usize) -> Option<MentionToken> {
    let caret = floor_char_boundary(buffer, caret);
    let before = &buffer[..caret];
    let start = before.rfind('@')?;

    if start != 0 && !before[..start].ends_with(' ') {
        return None;
    }

    Some(MentionToken {
        start,
        caret,
        query: before[start + 1..].to_string(),
    })
}

/// Roster entries whose name contains `query`, case-insensitively, in roster order
pub fn filter<'a>(roster: &'a [RosterEntry], query: &str) -> Vec<&'a RosterEntry> {
    let needle = query.to_lowercase();
    roster
        .iter()
        .filter(|entry| entry.name.to_lowercase().contains(&needle))
        .collect()
}

/// `@Name` with whitespace removed, followed by one space
pub fn mention_text(name: &str) -> String {
    let compact: String = name.split_whitespace().collect();
    format!("@{} ", compact)
}

/// Replaces the token's span with a mention of `name`
///
/// Text outside `[token.start, token.caret)` is preserved, including anything
/// after the caret and any earlier `@` tokens. Returns the new buffer and the
/// caret placed right after the inserted mention.
pub fn commit(buffer: &str, token: &MentionToken, name: &str) -> (String, usize) {
    let end = floor_char_boundary(buffer, token.caret);
    let start = floor_char_boundary(buffer, token.start.min(end));
    let insert = mention_text(name);

    let mut text = String::with_capacity(buffer.len() + insert.len());
    text.push_str(&buffer[..start]);
    text.push_str(&insert);
    let caret = text.len();
    text.push_str(&buffer[end..]);
    (text, caret)
}

/// Keys the mention menu reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuKey {
    Down,
    Up,
    Enter,
    Tab,
    Escape,
}

/// Result of feeding a key to the menu
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    /// The menu is closed, or has nothing to commit; handle the key normally
    Ignored,
    /// Selection moved to this index
    Moved(usize),
    /// A mention was inserted; the menu is now closed
    Committed {
        buffer: String,
        caret: usize,
        persona_id: String,
    },
    /// The menu was closed without inserting anything
    Dismissed,
}

/// Suggestion menu state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MentionMenu {
    #[default]
    Closed,
    Open {
        index: usize,
        token: MentionToken,
    },
}

impl MentionMenu {
    /// Re-reads the token after any edit; opens at index 0 or closes
    ///
    /// Returns whether the menu is open afterwards.
    pub fn on_buffer_change(&mut self, buffer: &str, caret: usize) -> bool {
        *self = match active_token(buffer, caret) {
            Some(token) => Self::Open { index: 0, token },
            None => Self::Closed,
        };
        self.is_open()
    }

    /// Whether a mention token is being completed
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// Current matches for the open token; empty when closed
    pub fn matches<'a>(&self, roster: &'a [RosterEntry]) -> Vec<&'a RosterEntry> {
        match self {
            Self::Closed => Vec::new(),
            Self::Open { token, .. } => filter(roster, &token.query),
        }
    }

    /// Highlighted entry, if any
    pub fn selected<'a>(&self, roster: &'a [RosterEntry]) -> Option<&'a RosterEntry> {
        match self {
            Self::Closed => None,
            Self::Open { index, .. } => self.matches(roster).get(*index).copied(),
        }
    }

    /// Applies a navigation key
    ///
    /// Up/Down wrap around the current matches. With no matches the menu stays
    /// open (showing an empty state) until Escape or an edit closes it.
    pub fn on_key(&mut self, key: MenuKey, buffer: &str, roster: &[RosterEntry]) -> KeyOutcome {
        let Self::Open { index, token } = self else {
            return KeyOutcome::Ignored;
        };
        let matches = filter(roster, &token.query);
        let count = matches.len();

        match key {
            MenuKey::Escape => {
                *self = Self::Closed;
                KeyOutcome::Dismissed
            }
            MenuKey::Down | MenuKey::Up if count == 0 => KeyOutcome::Moved(0),
            MenuKey::Down => {
                *index = (*index + 1) % count;
                KeyOutcome::Moved(*index)
            }
            MenuKey::Up => {
                *index = (*index + count - 1) % count;
                KeyOutcome::Moved(*index)
            }
            MenuKey::Enter | MenuKey::Tab => {
                let Some(entry) = matches.get(*index).copied() else {
                    return KeyOutcome::Ignored;
                };
                let (buffer, caret) = commit(buffer, token, &entry.name);
                let persona_id = entry.persona_id.clone();
                *self = Self::Closed;
                KeyOutcome::Committed {
                    buffer,
                    caret,
                    persona_id,
                }
            }
        }
    }
}

/// Personas a finished message addresses, in roster order
///
/// A persona is addressed when the message, lowercased with all whitespace
/// removed, contains `@` followed by the persona's full name without spaces,
/// or by its first name when that is longer than two characters. An empty
/// result addresses the whole hub.
pub fn resolve_targets(message: &str, roster: &[RosterEntry]) -> Vec<String> {
    let compact: String = message
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .concat();

    let mut targets: Vec<String> = Vec::new();
    for entry in roster {
        let lowered = entry.name.to_lowercase();
        let full: String = lowered.split_whitespace().collect();
        let first = lowered.split_whitespace().next().unwrap_or_default();

        let by_full = !full.is_empty() && compact.contains(&format!("@{}", full));
        let by_first = first.chars().count() > 2 && compact.contains(&format!("@{}", first));

        if (by_full || by_first) && !targets.contains(&entry.persona_id) {
            targets.push(entry.persona_id.clone());
        }
    }
    targets
}
