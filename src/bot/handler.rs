//! Telegram command routing and the long-polling loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::agent::{ConversationRegistry, DreamDiaryAgent};

use super::telegram::{split_message, Message, TelegramClient, Update, MAX_MESSAGE_LEN};

pub const WELCOME_TEXT: &str = "Welcome to DreamDiary AI! Send me your dream text, and I'll \
analyze it with psychological insights. Use /help for more info.";

pub const HELP_TEXT: &str = "DreamDiary AI - Your personal dream analyst.\n\n\
Commands:\n\
/start - Start the bot\n\
/help - Show this help\n\
/clear - Forget our conversation so far\n\n\
Just send a dream description, and I'll provide analysis, emotions, and meditation suggestions.";

pub const CLEARED_TEXT: &str = "Conversation history cleared.";

pub const UNKNOWN_COMMAND_TEXT: &str = "Unknown command. Use /help to see what I can do.";

/// Reply sent when a dream turn fails.
pub const APOLOGY_TEXT: &str = "Sorry, an error occurred. Please try again.";

/// Server-side long-poll timeout, in seconds.
pub const POLL_TIMEOUT_SECS: u64 = 30;

const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    Help,
    Clear,
    Unknown(String),
    Dream(String),
}

impl BotCommand {
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        let Some(rest) = trimmed.strip_prefix('/') else {
            return BotCommand::Dream(text.to_string());
        };
        let word = rest.split_whitespace().next().unwrap_or("");
        let name = word.split('@').next().unwrap_or("");
        match name {
            "start" => BotCommand::Start,
            "help" => BotCommand::Help,
            "clear" => BotCommand::Clear,
            other => BotCommand::Unknown(other.to_string()),
        }
    }
}

/// Routes incoming messages to the agent and keeps one log per user.
#[derive(Debug, Clone)]
pub struct BotHandler {
    agent: Arc<DreamDiaryAgent>,
    conversations: ConversationRegistry,
}

impl BotHandler {
    pub fn new(agent: Arc<DreamDiaryAgent>, conversations: ConversationRegistry) -> Self {
        Self {
            agent,
            conversations,
        }
    }

    pub fn conversations(&self) -> &ConversationRegistry {
        &self.conversations
    }

    /// Compute the replies for one text message from `user_id`.
    ///
    /// Each returned string fits in one Telegram message.
    pub async fn handle_text(&self, user_id: i64, text: &str) -> Vec<String> {
        match BotCommand::parse(text) {
            BotCommand::Start => vec![WELCOME_TEXT.to_string()],
            BotCommand::Help => vec![HELP_TEXT.to_string()],
            BotCommand::Clear => {
                self.conversations.clear(user_id).await;
                vec![CLEARED_TEXT.to_string()]
            }
            BotCommand::Unknown(name) => {
                log::debug!("Unknown command /{} from user {}", name, user_id);
                vec![UNKNOWN_COMMAND_TEXT.to_string()]
            }
            BotCommand::Dream(dream_text) => {
                let conversation = self.conversations.log_for(user_id);
                let mut conversation = conversation.lock().await;
                match self
                    .agent
                    .process_dream(&mut conversation, &dream_text, Some(user_id))
                    .await
                {
                    Ok(reply) => split_message(&reply.analysis, MAX_MESSAGE_LEN),
                    Err(e) => {
                        log::error!("Error processing dream: {}", e);
                        vec![APOLOGY_TEXT.to_string()]
                    }
                }
            }
        }
    }

    /// Handle one update end to end, sending replies through `client`.
    pub async fn handle_update(&self, client: &TelegramClient, update: Update) {
        let Some(message) = update.message else {
            return;
        };
        let chat_id = message.chat.id;
        let user_id = sender_id(&message);
        let Some(text) = message.text else {
            return;
        };

        for reply in self.handle_text(user_id, &text).await {
            if let Err(e) = client.send_message(chat_id, &reply).await {
                log::error!("Failed to send reply to chat {}: {}", chat_id, e);
                break;
            }
        }
    }

    /// Poll forever. Updates from one user are handled in arrival order;
    /// different users proceed concurrently.
    pub async fn run(self, client: TelegramClient) {
        let mut offset = 0;
        let mut queues = UpdateQueues::default();
        log::info!("Starting Telegram bot...");
        loop {
            let updates = match client.get_updates(offset, POLL_TIMEOUT_SECS).await {
                Ok(updates) => updates,
                Err(e) => {
                    log::warn!("getUpdates failed: {}", e);
                    tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                    continue;
                }
            };
            for update in updates {
                offset = offset.max(update.update_id + 1);
                queues.dispatch(&self, &client, update);
            }
        }
    }
}

/// The user an update is attributed to: the sender, or the chat.
fn sender_id(message: &Message) -> i64 {
    message.from.as_ref().map(|u| u.id).unwrap_or(message.chat.id)
}

type Worker = (mpsc::UnboundedSender<Update>, JoinHandle<()>);

/// One FIFO worker task per user.
#[derive(Debug, Default)]
pub struct UpdateQueues {
    workers: HashMap<i64, Worker>,
}

impl UpdateQueues {
    /// Queue `update` behind earlier updates from the same user.
    pub fn dispatch(&mut self, handler: &BotHandler, client: &TelegramClient, update: Update) {
        let Some(key) = update.message.as_ref().map(sender_id) else {
            return;
        };
        let sender = &self
            .workers
            .entry(key)
            .or_insert_with(|| spawn_worker(handler, client))
            .0;
        if let Err(mpsc::error::SendError(update)) = sender.send(update) {
            log::warn!("Update worker for user {} stopped; restarting", key);
            let worker = spawn_worker(handler, client);
            let _ = worker.0.send(update);
            self.workers.insert(key, worker);
        }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Close every queue and wait for queued updates to finish.
    pub async fn drain(self) {
        for (key, (sender, handle)) in self.workers {
            drop(sender);
            if let Err(e) = handle.await {
                log::error!("Update worker for user {} failed: {}", key, e);
            }
        }
    }
}

fn spawn_worker(handler: &BotHandler, client: &TelegramClient) -> Worker {
    let (sender, mut receiver) = mpsc::unbounded_channel::<Update>();
    let handler = handler.clone();
    let client = client.clone();
    let handle = tokio::spawn(async move {
        while let Some(update) = receiver.recv().await {
            handler.handle_update(&client, update).await;
        }
    });
    (sender, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{temp_store, ScriptedLlm};

    #[test]
    fn test_parse_commands() {
        assert_eq!(BotCommand::parse("/start"), BotCommand::Start);
        assert_eq!(BotCommand::parse("/help"), BotCommand::Help);
        assert_eq!(BotCommand::parse(" /clear "), BotCommand::Clear);
        assert_eq!(BotCommand::parse("/start@DreamDiaryBot"), BotCommand::Start);
        assert_eq!(BotCommand::parse("/help extra words"), BotCommand::Help);
        assert_eq!(
            BotCommand::parse("/dance"),
            BotCommand::Unknown("dance".to_string())
        );
        assert_eq!(
            BotCommand::parse("I was lost in a maze"),
            BotCommand::Dream("I was lost in a maze".to_string())
        );
    }

    async fn handler_with(replies: &[&str]) -> (tempfile::TempDir, BotHandler) {
        let (dir, store) = temp_store().await;
        let llm = Arc::new(ScriptedLlm::new(replies.iter().copied()));
        let agent = Arc::new(DreamDiaryAgent::new(llm, store));
        (dir, BotHandler::new(agent, ConversationRegistry::default()))
    }

    #[tokio::test]
    async fn test_static_replies() {
        let (_dir, handler) = handler_with(&[]).await;
        assert_eq!(handler.handle_text(1, "/start").await, vec![WELCOME_TEXT]);
        assert_eq!(handler.handle_text(1, "/help").await, vec![HELP_TEXT]);
        assert_eq!(
            handler.handle_text(1, "/nope").await,
            vec![UNKNOWN_COMMAND_TEXT]
        );
    }

    #[tokio::test]
    async fn test_dream_turn_and_clear() {
        let (_dir, handler) = handler_with(&["Key Elements: a maze.", "[confusion:1 (high)]"]).await;

        let replies = handler.handle_text(8, "I was lost in a maze").await;
        assert_eq!(replies, vec!["Key Elements: a maze."]);
        assert_eq!(handler.conversations().log_for(8).lock().await.len(), 2);

        assert_eq!(handler.handle_text(8, "/clear").await, vec![CLEARED_TEXT]);
        assert!(handler.conversations().log_for(8).lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_long_analysis_is_split() {
        let long = "x".repeat(MAX_MESSAGE_LEN * 2 + 10);
        let (_dir, handler) = handler_with(&[long.as_str(), "[]"]).await;

        let replies = handler.handle_text(8, "a very long dream").await;
        assert_eq!(replies.len(), 3);
        assert_eq!(replies[2].len(), 10);
    }

    fn dream_update(update_id: i64, user_id: i64, text: &str) -> Update {
        serde_json::from_value(serde_json::json!({
            "update_id": update_id,
            "message": {
                "message_id": update_id,
                "chat": {"id": user_id},
                "from": {"id": user_id},
                "text": text,
            }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_queued_updates_keep_arrival_order() {
        let (_dir, handler) =
            handler_with(&["first reply", "[]", "second reply", "[]", "third reply", "[]"]).await;
        // Nothing listens here, so sending replies fails fast and is logged.
        let client = TelegramClient::with_api_url("0:test", "http://127.0.0.1:9");
        let mut queues = UpdateQueues::default();

        queues.dispatch(&handler, &client, dream_update(1, 5, "first dream"));
        queues.dispatch(&handler, &client, dream_update(2, 5, "second dream"));
        queues.dispatch(&handler, &client, dream_update(3, 5, "third dream"));
        assert_eq!(queues.len(), 1);
        queues.drain().await;

        let log = handler.conversations().log_for(5);
        let log = log.lock().await;
        let contents: Vec<&str> = log.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            contents,
            vec![
                "first dream",
                "first reply",
                "second dream",
                "second reply",
                "third dream",
                "third reply",
            ]
        );
    }

    #[tokio::test]
    async fn test_updates_without_message_are_skipped() {
        let (_dir, handler) = handler_with(&[]).await;
        let client = TelegramClient::with_api_url("0:test", "http://127.0.0.1:9");
        let mut queues = UpdateQueues::default();

        let update: Update = serde_json::from_value(serde_json::json!({"update_id": 4})).unwrap();
        queues.dispatch(&handler, &client, update);
        assert!(queues.is_empty());
    }

    #[tokio::test]
    async fn test_failure_apologises() {
        let (_dir, handler) = handler_with(&[]).await;
        assert_eq!(handler.handle_text(8, "a dream").await, vec![APOLOGY_TEXT]);
        assert!(handler.conversations().log_for(8).lock().await.is_empty());
    }
}
