use serde::{Deserialize, Serialize};

pub type Err = anyhow::Error;
pub type Res<T> = Result<T, Err>;
pub type Void = Res<()>;

/// A plain message delivered to the bot (channel message, thread reply, or DM).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEvent {
    /// The author of the message, if any (system messages have none).
    pub user: Option<String>,
    /// The message text.
    pub text: String,
    /// The channel the message was posted in.
    pub channel: String,
    /// The channel type (`im`, `channel`, `group`, `mpim`).
    pub channel_type: Option<String>,
    /// The message timestamp.
    pub ts: String,
    /// The root timestamp of the thread, when the message was posted in a thread.
    pub thread_ts: Option<String>,
    /// The message subtype (edits, deletions, bot messages, ...).
    pub subtype: Option<String>,
}

/// An explicit @-mention of the bot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionEvent {
    pub user: String,
    pub text: String,
    pub channel: String,
    pub ts: String,
    pub thread_ts: Option<String>,
}

/// A slash command invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEvent {
    /// The command, including the leading slash (e.g. `/weather`).
    pub command: String,
    /// The free-text argument (may be empty).
    pub text: String,
    pub user_id: String,
    pub channel_id: String,
    /// Where the private reply to the invoking user is delivered.
    pub response_url: String,
}

/// Platform-neutral inbound chat event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    Message(MessageEvent),
    AppMention(MentionEvent),
    Command(CommandEvent),
}
