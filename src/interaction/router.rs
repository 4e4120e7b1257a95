//! Routes chat events to the pipeline and posts the replies.
//!
//! Plain messages are classified before anything else happens:
//! - edits, deletions, and other subtyped messages are dropped,
//! - messages from the bot itself (or with no author) are dropped,
//! - direct messages are always answered,
//! - thread replies are answered only in threads the bot was mentioned in,
//! - channel messages mentioning the bot are left to the app-mention event.

use tracing::{Instrument, error, info, instrument, warn};

use crate::{
    base::{
        config::Config,
        prompts,
        types::{ChatEvent, CommandEvent, MentionEvent, MessageEvent, Void},
    },
    service::chat::ChatClient,
};

use super::{pipeline::Pipeline, threads::ThreadTracker};

/// Why a plain message is not answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    Subtype,
    OwnMessage,
    UnownedThread,
    Mention,
    NotAddressed,
}

/// What to do with a plain message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageRoute {
    Ignore(IgnoreReason),
    /// Reply in the direct-message channel.
    DirectMessage,
    /// Reply in a thread the bot participates in.
    OwnedThread(String),
}

/// Classify a plain message event.
pub fn classify_message(event: &MessageEvent, bot_user_id: &str, threads: &ThreadTracker) -> MessageRoute {
    if event.subtype.as_deref().is_some_and(|s| !s.is_empty()) {
        return MessageRoute::Ignore(IgnoreReason::Subtype);
    }

    match event.user.as_deref() {
        None | Some("") => return MessageRoute::Ignore(IgnoreReason::OwnMessage),
        Some(user) if user == bot_user_id => return MessageRoute::Ignore(IgnoreReason::OwnMessage),
        _ => {}
    }

    if event.channel_type.as_deref() == Some("im") {
        return MessageRoute::DirectMessage;
    }

    if let Some(thread_ts) = &event.thread_ts {
        if threads.owns(thread_ts) {
            return MessageRoute::OwnedThread(thread_ts.clone());
        }

        return MessageRoute::Ignore(IgnoreReason::UnownedThread);
    }

    if event.text.contains(&format!("<@{bot_user_id}>")) {
        return MessageRoute::Ignore(IgnoreReason::Mention);
    }

    MessageRoute::Ignore(IgnoreReason::NotAddressed)
}

/// The supported slash commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlashCommand {
    Weather,
    Time,
}

impl SlashCommand {
    pub fn parse(command: &str) -> Option<Self> {
        match command.trim() {
            "/weather" => Some(Self::Weather),
            "/time" => Some(Self::Time),
            _ => None,
        }
    }

    /// The agent query for this command; an empty argument means `default_location`.
    pub fn query(&self, text: &str, default_location: &str) -> String {
        let location = match text.trim() {
            "" => default_location,
            location => location,
        };

        match self {
            Self::Weather => prompts::weather_query(location),
            Self::Time => prompts::time_query(location),
        }
    }
}

/// Dispatches chat events.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct Router {
    pipeline: Pipeline,
    chat: ChatClient,
    threads: ThreadTracker,
    default_location: String,
}

impl Router {
    pub fn new(config: &Config, pipeline: Pipeline, chat: ChatClient, threads: ThreadTracker) -> Self {
        Self {
            pipeline,
            chat,
            threads,
            default_location: config.default_location.clone(),
        }
    }

    pub fn threads(&self) -> &ThreadTracker {
        &self.threads
    }

    /// Handle `event` in the background, logging any error.
    #[instrument(skip_all)]
    pub fn dispatch(&self, event: ChatEvent) {
        let router = self.clone();

        tokio::spawn(
            async move {
                // Process the event.
                let result = router.handle(event).await;

                // Log any errors.
                if let Err(err) = &result {
                    error!("Error while handling: {err:#}");
                }
            }
            .in_current_span(),
        );
    }

    /// Handle `event` to completion.
    pub async fn handle(&self, event: ChatEvent) -> Void {
        match event {
            ChatEvent::Message(event) => self.handle_message(event).await,
            ChatEvent::AppMention(event) => self.handle_app_mention(event).await,
            ChatEvent::Command(event) => self.handle_command(event).await,
        }
    }

    #[instrument(skip_all, fields(channel = %event.channel, ts = %event.ts))]
    async fn handle_message(&self, event: MessageEvent) -> Void {
        let route = classify_message(&event, self.chat.bot_user_id(), &self.threads);
        let user = event.user.as_deref().unwrap_or_default();

        match route {
            MessageRoute::Ignore(reason) => {
                info!("Ignoring message: {reason:?}.");
            }
            MessageRoute::DirectMessage => {
                info!("Answering direct message ...");

                let reply = self.pipeline.process_message(user, &event.text).await;
                self.chat.send_message(&event.channel, &reply).await?;
            }
            MessageRoute::OwnedThread(thread_ts) => {
                info!("Answering in thread `{thread_ts}` ...");

                let reply = self.pipeline.process_message(user, &event.text).await;
                self.chat.send_thread_reply(&event.channel, &thread_ts, &reply).await?;
            }
        }

        Ok(())
    }

    #[instrument(skip_all, fields(channel = %event.channel, ts = %event.ts))]
    async fn handle_app_mention(&self, event: MentionEvent) -> Void {
        if event.user.is_empty() || event.user == self.chat.bot_user_id() {
            warn!("Ignoring mention without a human author.");
            return Ok(());
        }

        let thread_ts = event.thread_ts.as_deref().unwrap_or(&event.ts);
        info!("Answering mention in thread `{thread_ts}` ...");

        let reply = self.pipeline.process_message(&event.user, &event.text).await;
        self.chat.send_thread_reply(&event.channel, thread_ts, &reply).await?;

        self.threads.mark(thread_ts);

        Ok(())
    }

    #[instrument(skip_all, fields(command = %event.command))]
    async fn handle_command(&self, event: CommandEvent) -> Void {
        let Some(command) = SlashCommand::parse(&event.command) else {
            warn!("Unsupported command: {}", event.command);
            let text = format!("The `{}` command is not supported.", event.command);
            return self.chat.respond_ephemeral(&event.response_url, &text).await;
        };

        let query = command.query(&event.text, &self.default_location);
        info!("Running command {command:?} ...");

        let reply = self.pipeline.process_message(&event.user_id, &query).await;
        self.chat.respond_ephemeral(&event.response_url, &reply).await
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> MessageEvent {
        MessageEvent {
            user: Some("U123".to_string()),
            text: "hello".to_string(),
            channel: "C1".to_string(),
            channel_type: Some("channel".to_string()),
            ts: "1700000001.000200".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_subtype_is_dropped_first() {
        let threads = ThreadTracker::new(10);
        threads.mark("1700000000.000100");

        let event = MessageEvent {
            subtype: Some("message_changed".to_string()),
            channel_type: Some("im".to_string()),
            thread_ts: Some("1700000000.000100".to_string()),
            ..message()
        };

        assert_eq!(classify_message(&event, "UBOT", &threads), MessageRoute::Ignore(IgnoreReason::Subtype));
    }

    #[test]
    fn test_own_messages_are_dropped() {
        let threads = ThreadTracker::new(10);

        let from_bot = MessageEvent {
            user: Some("UBOT".to_string()),
            channel_type: Some("im".to_string()),
            ..message()
        };
        let anonymous = MessageEvent { user: None, ..message() };

        assert_eq!(classify_message(&from_bot, "UBOT", &threads), MessageRoute::Ignore(IgnoreReason::OwnMessage));
        assert_eq!(classify_message(&anonymous, "UBOT", &threads), MessageRoute::Ignore(IgnoreReason::OwnMessage));
    }

    #[test]
    fn test_direct_messages_ignore_thread_state() {
        let threads = ThreadTracker::new(10);

        let event = MessageEvent {
            channel_type: Some("im".to_string()),
            thread_ts: Some("1700000000.000100".to_string()),
            ..message()
        };

        assert_eq!(classify_message(&event, "UBOT", &threads), MessageRoute::DirectMessage);
    }

    #[test]
    fn test_threads() {
        let threads = ThreadTracker::new(10);
        let event = MessageEvent {
            thread_ts: Some("1700000000.000100".to_string()),
            ..message()
        };

        assert_eq!(classify_message(&event, "UBOT", &threads), MessageRoute::Ignore(IgnoreReason::UnownedThread));

        threads.mark("1700000000.000100");

        assert_eq!(
            classify_message(&event, "UBOT", &threads),
            MessageRoute::OwnedThread("1700000000.000100".to_string())
        );
    }

    #[test]
    fn test_channel_messages() {
        let threads = ThreadTracker::new(10);
        let mention = MessageEvent {
            text: "<@UBOT> what's the weather?".to_string(),
            ..message()
        };

        assert_eq!(classify_message(&mention, "UBOT", &threads), MessageRoute::Ignore(IgnoreReason::Mention));
        assert_eq!(classify_message(&message(), "UBOT", &threads), MessageRoute::Ignore(IgnoreReason::NotAddressed));
    }

    #[test]
    fn test_slash_commands() {
        assert_eq!(SlashCommand::parse("/weather"), Some(SlashCommand::Weather));
        assert_eq!(SlashCommand::parse("/time"), Some(SlashCommand::Time));
        assert_eq!(SlashCommand::parse("/deploy"), None);

        assert_eq!(SlashCommand::Weather.query("", "サンフランシスコ"), "サンフランシスコの天気を教えて");
        assert_eq!(SlashCommand::Time.query(" Tokyo ", "サンフランシスコ"), "Tokyoの現在時刻を教えて");
    }
}
