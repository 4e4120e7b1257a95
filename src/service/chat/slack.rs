//! Slack integration over Socket Mode.
//!
//! Inbound events are converted into platform-neutral [`ChatEvent`]s and handed
//! to the [`Router`]; outbound messages go through the Web API with the bot token.
//! Slash commands are acknowledged immediately and answered later through their
//! `response_url`.

use crate::{
    base::{
        config::Config,
        types::{ChatEvent, CommandEvent, MentionEvent, MessageEvent, Res, Void},
    },
    interaction::{pipeline::Pipeline, router::Router, threads::ThreadTracker},
};
use async_trait::async_trait;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use slack_morphism::prelude::*;
use tracing::{info, instrument, warn};

use std::sync::Arc;

use super::{ChatClient, GenericChatClient};

// Type aliases.

type FullClient = slack_morphism::SlackClient<SlackClientHyperConnector<HttpsConnector<HttpConnector>>>;

// Extra methods on `ChatClient` applied by the slack implementation.

impl ChatClient {
    /// Creates a new Slack chat client.
    pub async fn slack(config: &Config, pipeline: Pipeline) -> Res<Self> {
        let client = SlackChatClient::new(config, pipeline).await?;
        Ok(Self { inner: Arc::new(client) })
    }
}

impl From<SlackChatClient> for ChatClient {
    fn from(client: SlackChatClient) -> Self {
        Self { inner: Arc::new(client) }
    }
}

// Structs.

/// User state for the slack socket client.
struct SlackUserState {
    router: Router,
}

/// Slack client implementation.
#[derive(Clone)]
struct SlackChatClient {
    config: Config,
    app_token: SlackApiToken,
    bot_token: SlackApiToken,
    bot_user_id: String,
    client: Arc<FullClient>,
    pipeline: Pipeline,
    threads: ThreadTracker,
}

impl SlackChatClient {
    /// Create a new Slack chat client.
    #[instrument(name = "SlackChatClient::new", skip_all)]
    pub async fn new(config: &Config, pipeline: Pipeline) -> Res<Self> {
        // Initialize tokens.

        let app_token = SlackApiToken::new(SlackApiTokenValue(config.slack_app_token.clone()));
        let bot_token = SlackApiToken::new(SlackApiTokenValue(config.slack_bot_token.clone()));

        // Initialize the Slack client.

        let https_connector = HttpsConnector::<HttpConnector>::builder().with_native_roots()?.https_only().enable_all_versions().build();
        let connector = SlackClientHyperConnector::with_connector(https_connector);
        let client = Arc::new(slack_morphism::SlackClient::new(connector));

        // Get the bot's user ID.

        let session = client.open_session(&bot_token);
        let bot_user = session.auth_test().await?;
        let bot_user_id = bot_user.user_id.0;

        info!("Slack bot user ID: {}", bot_user_id);

        Ok(Self {
            config: config.clone(),
            app_token,
            bot_token,
            bot_user_id,
            client,
            pipeline,
            threads: ThreadTracker::new(config.max_tracked_threads),
        })
    }

    async fn post_message(&self, request: SlackApiChatPostMessageRequest) -> Void {
        let session = self.client.open_session(&self.bot_token);

        session.chat_post_message(&request).await.map_err(|e| anyhow::anyhow!("Failed to send message: {}", e))?;

        Ok(())
    }
}

#[async_trait]
impl GenericChatClient for SlackChatClient {
    fn bot_user_id(&self) -> &str {
        &self.bot_user_id
    }

    async fn start(&self) -> Void {
        // Initialize the socket mode listener.

        let socket_mode_callbacks = SlackSocketModeListenerCallbacks::new()
            .with_command_events(handle_command_event)
            .with_push_events(handle_push_event);

        // Initialize the socket mode listener environment.

        let router = Router::new(&self.config, self.pipeline.clone(), ChatClient::from(self.clone()), self.threads.clone());
        let listener_environment = Arc::new(SlackClientEventsListenerEnvironment::new(self.client.clone()).with_user_state(SlackUserState { router }));

        let socket_mode_listener = Arc::new(SlackClientSocketModeListener::new(
            &SlackClientSocketModeConfig::new(),
            listener_environment.clone(),
            socket_mode_callbacks,
        ));

        // Register the app token, then serve until Ctrl-C.

        socket_mode_listener.listen_for(&self.app_token).await?;

        info!("Slack socket mode listener started.");
        socket_mode_listener.serve().await;

        Ok(())
    }

    #[instrument(skip(self, text))]
    async fn send_message(&self, channel_id: &str, text: &str) -> Void {
        let message = SlackMessageContent::new().with_text(text.to_string());
        let request = SlackApiChatPostMessageRequest::new(SlackChannelId(channel_id.to_string()), message).with_link_names(true);

        self.post_message(request).await
    }

    #[instrument(skip(self, text))]
    async fn send_thread_reply(&self, channel_id: &str, thread_ts: &str, text: &str) -> Void {
        let message = SlackMessageContent::new().with_text(text.to_string());
        let request = SlackApiChatPostMessageRequest::new(SlackChannelId(channel_id.to_string()), message)
            .with_thread_ts(SlackTs(thread_ts.to_string()))
            .with_link_names(true);

        self.post_message(request).await
    }

    #[instrument(skip_all)]
    async fn respond_ephemeral(&self, response_url: &str, text: &str) -> Void {
        let response_url = SlackResponseUrl(response_url.parse()?);
        let request = ephemeral_request(text);

        self.client
            .respond_to_event(&response_url, &request)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to respond to command: {}", e))?;

        Ok(())
    }
}

/// A reply posted to a command's `response_url`; Slack shows it only to the invoking user.
fn ephemeral_request(text: &str) -> SlackApiPostWebhookMessageRequest {
    SlackApiPostWebhookMessageRequest::new(SlackMessageContent::new().with_text(text.to_string()))
}

// Event conversion.

fn message_event(event: SlackMessageEvent) -> MessageEvent {
    // Use the wire name of the subtype (`message_changed`, not `MessageChanged`).
    let subtype = event.subtype.as_ref().map(|s| match serde_json::to_value(s) {
        Ok(serde_json::Value::String(name)) => name,
        _ => format!("{s:?}"),
    });

    MessageEvent {
        user: event.sender.user.map(|u| u.0),
        text: event.content.and_then(|c| c.text).unwrap_or_default(),
        channel: event.origin.channel.map(|c| c.0).unwrap_or_default(),
        channel_type: event.origin.channel_type.map(|t| t.0),
        ts: event.origin.ts.0,
        thread_ts: event.origin.thread_ts.map(|t| t.0),
        subtype,
    }
}

fn mention_event(event: SlackAppMentionEvent) -> MentionEvent {
    MentionEvent {
        user: event.user.0,
        text: event.content.text.unwrap_or_default(),
        channel: event.channel.0,
        ts: event.origin.ts.0,
        thread_ts: event.origin.thread_ts.map(|t| t.0),
    }
}

fn command_event(event: SlackCommandEvent) -> CommandEvent {
    CommandEvent {
        command: event.command.0,
        text: event.text.unwrap_or_default(),
        user_id: event.user_id.0,
        channel_id: event.channel_id.0,
        response_url: event.response_url.0.to_string(),
    }
}

// Socket mode listener callbacks for Slack.

/// Handles command events from Slack.
///
/// Slack requires an acknowledgement within three seconds, so the command is
/// answered later through its `response_url`.
#[instrument(skip_all)]
async fn handle_command_event(
    event: SlackCommandEvent,
    _client: Arc<SlackHyperClient>,
    states: SlackClientEventsUserState,
) -> Result<SlackCommandEventResponse, Box<dyn std::error::Error + Send + Sync>> {
    info!("Received command `{}` ...", event.command.0);

    let states = states.read().await;
    let user_state = states.get_user_state::<SlackUserState>().ok_or(anyhow::anyhow!("Failed to get user state"))?;

    user_state.router.dispatch(ChatEvent::Command(command_event(event)));

    Ok(SlackCommandEventResponse::new(SlackMessageContent::new()).with_response_type(SlackMessageResponseType::Ephemeral))
}

/// Handles push events from Slack.
#[instrument(skip_all)]
async fn handle_push_event(event_callback: SlackPushEventCallback, _client: Arc<SlackHyperClient>, states: SlackClientEventsUserState) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let states = states.read().await;
    let user_state = states.get_user_state::<SlackUserState>().ok_or(anyhow::anyhow!("Failed to get user state"))?;

    match event_callback.event {
        SlackEventCallbackBody::Message(slack_message_event) => {
            info!("Received message event ...");
            user_state.router.dispatch(ChatEvent::Message(message_event(slack_message_event)));
        }
        SlackEventCallbackBody::AppMention(slack_app_mention_event) => {
            info!("Received app mention event ...");
            user_state.router.dispatch(ChatEvent::AppMention(mention_event(slack_app_mention_event)));
        }
        _ => {
            warn!("Received unhandled push event.")
        }
    }

    Ok(())
}

// Tests.
