use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use supernova_core::{
    CancellationToken, ChatProvider, Config, ForecastProvider, ForecastQuery, ProviderId,
    provider::{chat_provider_from_config, forecast_provider_from_config},
};

use crate::{
    command::{self, Command, CommandKind},
    store::AuthorizationStore,
};

const HELP_TEXT: &str = "Available commands: \
    \n/help - get a list of available commands\
    \n/getid - get your user ID\
    \n/weather <city> <N> days|hours - get weather forecast for the city for N days or hours (PROMOTED USER)\
    \n/chat <prompt> - get a chatgpt response to the prompt (PROMOTED USER)\
    \n/allow <user_id> - promote a user (ADMIN)";

const DEFAULT_REPLY: &str = "Type /help to get a list of available commands";
const NOT_AUTHORIZED: &str = "You are not authorized to use this command.";

/// Who is talking to the bot. Ordered from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum UserRole {
    Regular,
    Promoted,
    Admin,
}

impl CommandKind {
    pub fn required_role(&self) -> UserRole {
        match self {
            CommandKind::Help | CommandKind::GetId | CommandKind::Unknown => UserRole::Regular,
            CommandKind::Weather | CommandKind::Chat => UserRole::Promoted,
            CommandKind::Allow => UserRole::Admin,
        }
    }

    fn logs_activity(&self) -> bool {
        matches!(self, CommandKind::Weather | CommandKind::Chat | CommandKind::Allow)
    }
}

/// A chat message addressed to the bot.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub chat_id: i64,
    pub user_id: i64,
    pub text: String,
}

/// Where replies go.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, chat_id: i64, text: &str) -> Result<()>;
}

/// Prints replies to stdout.
#[derive(Debug, Default)]
pub struct StdoutSink;

#[async_trait]
impl MessageSink for StdoutSink {
    async fn send(&self, chat_id: i64, text: &str) -> Result<()> {
        println!("[chat {chat_id}]\n{}", text.trim_end());
        Ok(())
    }
}

pub struct Bot {
    admin_id: Option<i64>,
    store: Arc<dyn AuthorizationStore>,
    forecast: Option<Box<dyn ForecastProvider>>,
    chat: Option<Box<dyn ChatProvider>>,
}

impl Bot {
    pub fn new(admin_id: Option<i64>, store: Arc<dyn AuthorizationStore>) -> Self {
        Self { admin_id, store, forecast: None, chat: None }
    }

    /// Build a bot with every provider that has credentials in `config`.
    pub fn from_config(config: &Config, store: Arc<dyn AuthorizationStore>) -> Self {
        let mut bot = Self::new(config.admin_id, store);

        if !config.is_provider_configured(ProviderId::AccuWeather) {
            tracing::warn!(
                "weather command disabled: run `supernova configure accuweather` or set {}",
                ProviderId::AccuWeather.api_key_env()
            );
        } else {
            match forecast_provider_from_config(config) {
                Ok(provider) => bot.forecast = Some(provider),
                Err(e) => tracing::error!("failed to build forecast provider: {e:#}"),
            }
        }

        if !config.is_provider_configured(ProviderId::OpenAi) {
            tracing::warn!(
                "chat command disabled: run `supernova configure openai` or set {}",
                ProviderId::OpenAi.api_key_env()
            );
        } else {
            match chat_provider_from_config(config) {
                Ok(provider) => bot.chat = Some(provider),
                Err(e) => tracing::error!("failed to build chat provider: {e:#}"),
            }
        }

        bot
    }

    pub fn with_forecast(mut self, provider: Box<dyn ForecastProvider>) -> Self {
        self.forecast = Some(provider);
        self
    }

    pub fn with_chat(mut self, provider: Box<dyn ChatProvider>) -> Self {
        self.chat = Some(provider);
        self
    }

    pub fn role_of(&self, user_id: i64) -> UserRole {
        if self.admin_id == Some(user_id) {
            UserRole::Admin
        } else if self.store.is_allowed(user_id) {
            UserRole::Promoted
        } else {
            UserRole::Regular
        }
    }

    /// Handle `message` and deliver the reply through `sink`.
    pub async fn handle(
        &self,
        message: &IncomingMessage,
        sink: &dyn MessageSink,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let reply = self.reply(message, cancel).await;
        sink.send(message.chat_id, &reply).await
    }

    /// Compute the reply text for `message`.
    pub async fn reply(&self, message: &IncomingMessage, cancel: &CancellationToken) -> String {
        let kind = CommandKind::of(&message.text);
        let role = self.role_of(message.user_id);

        if role < kind.required_role() {
            tracing::info!(user_id = message.user_id, ?kind, ?role, "command denied");
            return NOT_AUTHORIZED.to_string();
        }

        // Best effort: a failed write is logged and the command still runs.
        let logged = match kind.logs_activity() {
            true => self.store.log_activity(message.user_id, &message.text),
            false => Ok(()),
        };
        if let Err(e) = logged {
            tracing::error!(user_id = message.user_id, "failed to log user activity: {e:#}");
        }

        let command = match command::parse(&message.text) {
            Ok(command) => command,
            Err(e) => return e.to_string(),
        };

        match command {
            Command::Help => HELP_TEXT.to_string(),
            Command::GetId => format!("Your ID is: {}", message.user_id),
            Command::Unknown => DEFAULT_REPLY.to_string(),
            Command::Weather(query) => self.weather(&query, cancel).await,
            Command::Chat(prompt) => self.chat(&prompt, cancel).await,
            Command::Allow(user_id) => self.allow(user_id),
        }
    }

    async fn weather(&self, query: &ForecastQuery, cancel: &CancellationToken) -> String {
        let Some(provider) = self.forecast.as_deref() else {
            return "Weather fetcher is not available".to_string();
        };

        match provider.forecast(query, cancel).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(city = query.city(), "weather request failed: {e}");
                format!("Failed to fetch weather: {}", e.user_message())
            }
        }
    }

    async fn chat(&self, prompt: &str, cancel: &CancellationToken) -> String {
        let Some(provider) = self.chat.as_deref() else {
            return "Chat is not available".to_string();
        };

        match provider.complete(prompt, cancel).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!("chat request failed: {e}");
                format!("Error: {}", e.user_message())
            }
        }
    }

    fn allow(&self, user_id: i64) -> String {
        match self.store.allow(user_id) {
            Ok(()) => {
                tracing::info!(user_id, "user promoted");
                format!("User with ID {user_id} has been allowed to use promoted commands")
            }
            Err(e) => {
                tracing::error!(user_id, "failed to allow user: {e:#}");
                "Failed to allow user. Please try again later".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use parking_lot::Mutex;
    use supernova_core::FetchError;

    const ADMIN: i64 = 1;
    const FRIEND: i64 = 2;
    const STRANGER: i64 = 3;

    #[derive(Debug, Default)]
    struct StubForecast {
        calls: Mutex<Vec<ForecastQuery>>,
    }

    #[async_trait]
    impl ForecastProvider for StubForecast {
        async fn forecast(
            &self,
            query: &ForecastQuery,
            _cancel: &CancellationToken,
        ) -> Result<String, FetchError> {
            self.calls.lock().push(query.clone());
            if query.city() == "Atlantis" {
                return Err(FetchError::NotFound(query.city().to_string()));
            }
            Ok(format!("Date: 2024-05-01 07:00:00\nMax Temp: 15.00 C\n({})\n", query.city()))
        }
    }

    #[derive(Debug)]
    struct EchoChat;

    #[async_trait]
    impl ChatProvider for EchoChat {
        async fn complete(
            &self,
            prompt: &str,
            _cancel: &CancellationToken,
        ) -> Result<String, FetchError> {
            Ok(format!("echo: {prompt}"))
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<(i64, String)>>,
    }

    #[async_trait]
    impl MessageSink for RecordingSink {
        async fn send(&self, chat_id: i64, text: &str) -> Result<()> {
            self.sent.lock().push((chat_id, text.to_string()));
            Ok(())
        }
    }

    fn store() -> Arc<SqliteStore> {
        let store = SqliteStore::open_in_memory().unwrap();
        store.migrate_up().unwrap();
        store.allow(FRIEND).unwrap();
        Arc::new(store)
    }

    fn msg(user_id: i64, text: &str) -> IncomingMessage {
        IncomingMessage { chat_id: 100 + user_id, user_id, text: text.to_string() }
    }

    fn bot(store: Arc<SqliteStore>) -> Bot {
        Bot::new(Some(ADMIN), store)
            .with_forecast(Box::new(StubForecast::default()))
            .with_chat(Box::new(EchoChat))
    }

    #[test]
    fn from_config_enables_configured_providers_only() {
        let mut config = Config { admin_id: Some(ADMIN), ..Config::default() };
        config.upsert_provider_api_key(ProviderId::AccuWeather, "ACCU".to_string());

        let bot = Bot::from_config(&config, store());
        assert!(bot.forecast.is_some());
        assert!(bot.chat.is_none());
        assert_eq!(bot.role_of(ADMIN), UserRole::Admin);

        let bot = Bot::from_config(&Config::default(), store());
        assert!(bot.forecast.is_none());
        assert!(bot.chat.is_none());
    }

    #[test]
    fn roles_are_ordered() {
        assert!(UserRole::Regular < UserRole::Promoted);
        assert!(UserRole::Promoted < UserRole::Admin);
    }

    #[test]
    fn role_resolution() {
        let bot = bot(store());
        assert_eq!(bot.role_of(ADMIN), UserRole::Admin);
        assert_eq!(bot.role_of(FRIEND), UserRole::Promoted);
        assert_eq!(bot.role_of(STRANGER), UserRole::Regular);
    }

    #[tokio::test]
    async fn regular_users_get_help_and_id() {
        let bot = bot(store());
        let cancel = CancellationToken::new();

        assert!(bot.reply(&msg(STRANGER, "/help"), &cancel).await.contains("/weather"));
        assert_eq!(bot.reply(&msg(STRANGER, "/getid"), &cancel).await, "Your ID is: 3");
        assert_eq!(bot.reply(&msg(STRANGER, "hi there"), &cancel).await, DEFAULT_REPLY);
    }

    #[tokio::test]
    async fn regular_users_cannot_fetch_weather() {
        let store = store();
        let bot = bot(store.clone());

        let reply = bot.reply(&msg(STRANGER, "/weather london 1 day"), &CancellationToken::new()).await;

        assert_eq!(reply, NOT_AUTHORIZED);
        assert_eq!(store.activity_count(STRANGER).unwrap(), 0);
    }

    #[tokio::test]
    async fn promoted_users_fetch_weather_and_are_logged() {
        let store = store();
        let bot = bot(store.clone());

        let reply =
            bot.reply(&msg(FRIEND, "/weather London 3 days"), &CancellationToken::new()).await;

        assert!(reply.contains("Max Temp: 15.00 C"));
        assert!(reply.contains("(London)"));
        assert_eq!(store.activity_count(FRIEND).unwrap(), 1);
    }

    #[tokio::test]
    async fn malformed_weather_never_reaches_provider() {
        let stub = Arc::new(StubForecast::default());

        #[derive(Debug)]
        struct Shared(Arc<StubForecast>);

        #[async_trait]
        impl ForecastProvider for Shared {
            async fn forecast(
                &self,
                query: &ForecastQuery,
                cancel: &CancellationToken,
            ) -> Result<String, FetchError> {
                self.0.forecast(query, cancel).await
            }
        }

        let bot = Bot::new(Some(ADMIN), store()).with_forecast(Box::new(Shared(stub.clone())));
        let reply =
            bot.reply(&msg(FRIEND, "/weather london many days"), &CancellationToken::new()).await;

        assert!(reply.starts_with("Invalid number of days"));
        assert!(stub.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn provider_errors_become_user_messages() {
        let bot = bot(store());
        let reply =
            bot.reply(&msg(FRIEND, "/weather Atlantis 1 day"), &CancellationToken::new()).await;
        assert_eq!(reply, "Failed to fetch weather: City 'Atlantis' was not found");
    }

    #[tokio::test]
    async fn missing_provider_is_reported() {
        let bot = Bot::new(Some(ADMIN), store());
        let cancel = CancellationToken::new();

        assert_eq!(
            bot.reply(&msg(ADMIN, "/weather london 1 day"), &cancel).await,
            "Weather fetcher is not available"
        );
        assert_eq!(bot.reply(&msg(ADMIN, "/chat hi"), &cancel).await, "Chat is not available");
    }

    #[tokio::test]
    async fn chat_for_promoted_users() {
        let bot = bot(store());
        let reply = bot.reply(&msg(FRIEND, "/chat how are you"), &CancellationToken::new()).await;
        assert_eq!(reply, "echo: how are you");
    }

    #[tokio::test]
    async fn only_admin_can_allow() {
        let store = store();
        let bot = bot(store.clone());
        let cancel = CancellationToken::new();

        assert_eq!(bot.reply(&msg(FRIEND, "/allow 3"), &cancel).await, NOT_AUTHORIZED);
        assert!(!store.is_allowed(STRANGER));

        let reply = bot.reply(&msg(ADMIN, "/allow 3"), &cancel).await;
        assert!(reply.starts_with("User with ID 3 has been allowed"));
        assert!(store.is_allowed(STRANGER));
        assert_eq!(bot.role_of(STRANGER), UserRole::Promoted);
    }

    #[tokio::test]
    async fn activity_log_failure_does_not_block_reply() {
        // No migrations: every store write fails.
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let bot = Bot::new(Some(ADMIN), store).with_chat(Box::new(EchoChat));

        let reply = bot.reply(&msg(ADMIN, "/chat still here?"), &CancellationToken::new()).await;
        assert_eq!(reply, "echo: still here?");
    }

    #[tokio::test]
    async fn handle_sends_to_the_message_chat() {
        let bot = bot(store());
        let sink = RecordingSink::default();

        bot.handle(&msg(STRANGER, "/getid"), &sink, &CancellationToken::new()).await.unwrap();

        let sent = sink.sent.lock();
        assert_eq!(sent.as_slice(), &[(103, "Your ID is: 3".to_string())]);
    }
}
