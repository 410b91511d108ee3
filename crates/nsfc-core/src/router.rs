//! Command routing port plus a name-based router implementation.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;

use crate::{
    messaging::types::{Draft, InlineAnswer},
    update::{CallbackQuery, CommandMessage, InlineQuery, PrivateReply},
};

/// Why a command failed.
#[derive(Debug, thiserror::Error)]
pub enum CommandFailure {
    /// Expected absence (unknown command, no record): never shown to users.
    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Router-level failure with optional user-visible text.
#[derive(Debug, thiserror::Error)]
#[error("{cause}")]
pub struct CommandError {
    pub reply_text: Option<String>,
    #[source]
    pub cause: CommandFailure,
}

impl CommandError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self {
            reply_text: None,
            cause: CommandFailure::NotFound(what.into()),
        }
    }

    pub fn other(cause: impl Into<anyhow::Error>) -> Self {
        Self {
            reply_text: None,
            cause: CommandFailure::Other(cause.into()),
        }
    }

    pub fn with_reply(mut self, text: impl Into<String>) -> Self {
        self.reply_text = Some(text.into()).filter(|t: &String| !t.is_empty());
        self
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.cause, CommandFailure::NotFound(_))
    }
}

pub type CommandResult = std::result::Result<Vec<Draft>, CommandError>;

/// What the pipeline calls for every classified update that needs business logic.
///
/// Only `run` is required; the narrow hooks default to "nothing to say".
#[async_trait]
pub trait CommandRouter: Send + Sync {
    async fn run(&self, cmd: &CommandMessage) -> CommandResult;

    async fn inline_query(
        &self,
        _query: &InlineQuery,
    ) -> std::result::Result<Vec<InlineAnswer>, CommandError> {
        Ok(Vec::new())
    }

    /// Returns the optional toast text for the callback answer.
    async fn callback_query(
        &self,
        _query: &CallbackQuery,
    ) -> std::result::Result<Option<String>, CommandError> {
        Ok(None)
    }

    async fn password_reply(&self, _reply: &PrivateReply) -> CommandResult {
        Ok(Vec::new())
    }
}

#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, cmd: &CommandMessage) -> CommandResult;
}

#[async_trait]
impl<F> CommandHandler for F
where
    F: Fn(&CommandMessage) -> CommandResult + Send + Sync,
{
    async fn handle(&self, cmd: &CommandMessage) -> CommandResult {
        self(cmd)
    }
}

/// Entry for the platform's command menu.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BotCommandSpec {
    pub command: String,
    pub description: String,
}

struct Route {
    description: String,
    handler: Arc<dyn CommandHandler>,
    hidden: bool,
}

/// Maps command names to handlers. `help` and `start` are built in.
#[derive(Default)]
pub struct Router {
    routes: HashMap<String, Route>,
    order: Vec<String>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a public command (listed in `/help` and the command menu).
    pub fn handle(
        &mut self,
        name: &str,
        description: &str,
        handler: impl CommandHandler + 'static,
    ) -> &mut Self {
        self.insert(name, description, Arc::new(handler), false)
    }

    /// Register a command that works but is not advertised (admin tools).
    pub fn handle_hidden(&mut self, name: &str, handler: impl CommandHandler + 'static) -> &mut Self {
        self.insert(name, "", Arc::new(handler), true)
    }

    fn insert(
        &mut self,
        name: &str,
        description: &str,
        handler: Arc<dyn CommandHandler>,
        hidden: bool,
    ) -> &mut Self {
        if !self.routes.contains_key(name) {
            self.order.push(name.to_string());
        }
        self.routes.insert(
            name.to_string(),
            Route {
                description: description.to_string(),
                handler,
                hidden,
            },
        );
        self
    }

    pub fn bot_commands(&self) -> Vec<BotCommandSpec> {
        let mut out: Vec<BotCommandSpec> = self
            .order
            .iter()
            .filter_map(|name| {
                let route = self.routes.get(name)?;
                (!route.hidden).then(|| BotCommandSpec {
                    command: name.clone(),
                    description: route.description.clone(),
                })
            })
            .collect();
        out.push(BotCommandSpec {
            command: "help".to_string(),
            description: "show this help".to_string(),
        });
        out
    }

    pub fn help_text(&self) -> String {
        self.bot_commands()
            .iter()
            .map(|c| format!("/{} {}", c.command, c.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl CommandRouter for Router {
    async fn run(&self, cmd: &CommandMessage) -> CommandResult {
        if let Some(route) = self.routes.get(&cmd.name) {
            return route.handler.handle(cmd).await;
        }
        match cmd.name.as_str() {
            "help" => Ok(vec![Draft::text(cmd.chat.id, self.help_text())
                .reply_to(cmd.message_id)
                .silent()]),
            // Placeholder so deep links (`/start payload`) get a friendly answer.
            "start" => Ok(vec![Draft::text(
                cmd.chat.id,
                "Hi! Send /help to see what I can do.",
            )
            .reply_to(cmd.message_id)]),
            other => Err(CommandError::not_found(format!("command /{other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChatId;
    use crate::testing::{command, ts};

    fn echo(cmd: &CommandMessage) -> CommandResult {
        Ok(vec![Draft::text(cmd.chat.id, cmd.args.clone())])
    }

    #[tokio::test]
    async fn dispatches_by_name() {
        let mut router = Router::new();
        router.handle("echo", "repeat the arguments", echo);

        let mut cmd = command(-1, 1, "echo", ts(0));
        cmd.args = "hi there".to_string();

        let drafts = router.run(&cmd).await.unwrap();
        assert_eq!(drafts, vec![Draft::text(ChatId(-1), "hi there")]);
    }

    #[tokio::test]
    async fn unknown_command_is_not_found_without_reply() {
        let router = Router::new();
        let err = router.run(&command(-1, 1, "nope", ts(0))).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(err.reply_text.is_none());
    }

    #[tokio::test]
    async fn help_lists_public_commands_only() {
        let mut router = Router::new();
        router
            .handle("echo", "repeat the arguments", echo)
            .handle_hidden("clear", echo);

        let drafts = router.run(&command(-1, 1, "help", ts(0))).await.unwrap();
        assert_eq!(drafts.len(), 1);
        assert!(drafts[0].text.contains("/echo repeat the arguments"));
        assert!(!drafts[0].text.contains("/clear"));
        assert!(drafts[0].disable_notification);

        let names: Vec<_> = router.bot_commands().into_iter().map(|c| c.command).collect();
        assert_eq!(names, vec!["echo", "help"]);
    }

    #[test]
    fn empty_reply_text_is_dropped() {
        let err = CommandError::other(anyhow::anyhow!("boom")).with_reply("");
        assert!(err.reply_text.is_none());
        assert_eq!(err.to_string(), "boom");
    }
}
