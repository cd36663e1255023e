//! Routing of client requests to the command dispatcher

use super::connection::SessionHandle;
use lithium_dispatch::{
    CommandDispatcher, CommandResult, CommandStatus, DispatchError, DispatchOptions,
    SubscriptionToken,
};
use lithium_shared::now_ms;
use lithium_shared::protocol::{ClientMessage, ServerMessage};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Handles the requests of one client session
///
/// Owns the client's subscriptions so they can be removed when the client
/// disconnects.
pub struct RequestHandler {
    dispatcher: CommandDispatcher,
    session: SessionHandle,
    subscriptions: Vec<(String, SubscriptionToken)>,
}

impl RequestHandler {
    pub fn new(dispatcher: CommandDispatcher, session: SessionHandle) -> Self {
        Self {
            dispatcher,
            session,
            subscriptions: Vec::new(),
        }
    }

    pub fn handle(&mut self, message: ClientMessage) {
        match message {
            ClientMessage::Dispatch {
                request_id,
                command,
                payload,
                priority,
                delay_ms,
            } => self.dispatch(request_id, command, payload, priority, delay_ms),

            ClientMessage::Cancel { command } => {
                let cancelled = self.dispatcher.cancel_command(&command);
                self.reply(ServerMessage::Cancelled { command, cancelled });
            }

            ClientMessage::Status { command } => {
                let status = self.dispatcher.get_command_status(&command);
                self.reply(ServerMessage::Status { command, status });
            }

            ClientMessage::History { command } => {
                match self.dispatcher.get_command_history::<Value>(&command) {
                    Ok(entries) => self.reply(ServerMessage::History { command, entries }),
                    Err(e) => self.reply(ServerMessage::Error {
                        request_id: None,
                        message: e.to_string(),
                    }),
                }
            }

            ClientMessage::Active => {
                let commands = self.dispatcher.get_active_commands();
                self.reply(ServerMessage::Active { commands });
            }

            ClientMessage::Subscribe { command } => self.subscribe(command),

            ClientMessage::Unsubscribe { command, token } => {
                let token = SubscriptionToken::from(token);
                // Clients may only remove their own subscriptions
                let removed = match self
                    .subscriptions
                    .iter()
                    .position(|(c, t)| *c == command && *t == token)
                {
                    Some(index) => {
                        self.subscriptions.swap_remove(index);
                        self.dispatcher.unsubscribe(&command, token)
                    }
                    None => false,
                };
                self.reply(ServerMessage::Unsubscribed {
                    command,
                    token: token.get(),
                    removed,
                });
            }
        }
    }

    fn dispatch(
        &self,
        request_id: u64,
        command: String,
        payload: Value,
        priority: i32,
        delay_ms: u64,
    ) {
        let mut options = DispatchOptions::new().priority(priority);
        if delay_ms > 0 {
            options = options.delay(Duration::from_millis(delay_ms));
        }

        let handle = match self.dispatcher.dispatch_with(&command, payload, options) {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Client {} request {} rejected: {}", self.session.id, request_id, e);
                self.reply(ServerMessage::Error {
                    request_id: Some(request_id),
                    message: e.to_string(),
                });
                return;
            }
        };

        let session = self.session.clone();
        tokio::spawn(async move {
            let execution_id = handle.execution_id().get();
            let outcome = handle.await;

            let delivered = session.send(ServerMessage::Result {
                request_id,
                command,
                execution_id,
                result: to_command_result(outcome),
            });
            if !delivered {
                debug!("Client {} left before request {} finished", session.id, request_id);
            }
        });
    }

    fn subscribe(&mut self, command: String) {
        let session = self.session.clone();
        let name = command.clone();

        let token = self.dispatcher.subscribe(&command, move |payload: &Value| {
            session.send(ServerMessage::Event {
                command: name.clone(),
                payload: payload.clone(),
            });
        });

        self.subscriptions.push((command.clone(), token));
        self.reply(ServerMessage::Subscribed {
            command,
            token: token.get(),
        });
    }

    /// Remove every subscription this client made, returning how many
    pub fn close(&mut self) -> usize {
        let count = self.subscriptions.len();
        for (command, token) in self.subscriptions.drain(..) {
            self.dispatcher.unsubscribe(&command, token);
        }
        count
    }

    fn reply(&self, message: ServerMessage) {
        self.session.send(message);
    }
}

fn to_command_result(outcome: Result<Value, DispatchError>) -> CommandResult {
    let (status, result, error) = match outcome {
        Ok(value) => (CommandStatus::Completed, Some(value), None),
        Err(e) => {
            let status = match e {
                DispatchError::Cancelled(_) => CommandStatus::Cancelled,
                _ => CommandStatus::Failed,
            };
            (status, None, Some(e.to_string()))
        }
    };

    CommandResult {
        status,
        result,
        error,
        timestamp: now_ms(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lithium_dispatch::{CommandContext, DispatcherConfig, TokioEventLoop};
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn setup() -> (
        CommandDispatcher,
        RequestHandler,
        mpsc::UnboundedReceiver<ServerMessage>,
    ) {
        let event_loop = Arc::new(TokioEventLoop::current().unwrap());
        let dispatcher = CommandDispatcher::new(event_loop, DispatcherConfig::default()).unwrap();
        dispatcher
            .register("echo", |payload: Value, _ctx: CommandContext| async move {
                anyhow::Ok(json!({ "echo": payload }))
            })
            .unwrap();
        dispatcher
            .register("broken", |_: Value, _ctx: CommandContext| async move {
                Err::<Value, _>(anyhow::anyhow!("sensor offline"))
            })
            .unwrap();

        let (tx, rx) = mpsc::unbounded_channel();
        let session = SessionHandle::new(1, "127.0.0.1:4000".parse().unwrap(), tx);
        let handler = RequestHandler::new(dispatcher.clone(), session);
        (dispatcher, handler, rx)
    }

    fn dispatch(request_id: u64, command: &str, payload: Value) -> ClientMessage {
        ClientMessage::Dispatch {
            request_id,
            command: command.into(),
            payload,
            priority: 0,
            delay_ms: 0,
        }
    }

    #[tokio::test]
    async fn test_dispatch_replies_with_result() {
        let (_dispatcher, mut handler, mut rx) = setup();
        handler.handle(dispatch(7, "echo", json!(1)));

        match rx.recv().await.unwrap() {
            ServerMessage::Result {
                request_id,
                command,
                result,
                ..
            } => {
                assert_eq!(request_id, 7);
                assert_eq!(command, "echo");
                assert_eq!(result.status, CommandStatus::Completed);
                assert_eq!(result.result, Some(json!({ "echo": 1 })));
            }
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failure_and_rejection() {
        let (_dispatcher, mut handler, mut rx) = setup();

        handler.handle(dispatch(1, "missing", Value::Null));
        assert!(matches!(
            rx.recv().await.unwrap(),
            ServerMessage::Error { request_id: Some(1), .. }
        ));

        handler.handle(dispatch(2, "broken", Value::Null));
        match rx.recv().await.unwrap() {
            ServerMessage::Result { result, .. } => {
                assert_eq!(result.status, CommandStatus::Failed);
                assert!(result.error.unwrap().contains("sensor offline"));
            }
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_subscription_forwards_events() {
        let (dispatcher, mut handler, mut rx) = setup();

        handler.handle(ClientMessage::Subscribe {
            command: "echo".into(),
        });
        let token = match rx.recv().await.unwrap() {
            ServerMessage::Subscribed { token, .. } => token,
            other => panic!("unexpected reply: {:?}", other),
        };

        handler.handle(dispatch(3, "echo", json!("hi")));
        // The event is published before the result handle resolves
        assert_eq!(
            rx.recv().await.unwrap(),
            ServerMessage::Event {
                command: "echo".into(),
                payload: json!({ "echo": "hi" }),
            }
        );
        assert!(matches!(rx.recv().await.unwrap(), ServerMessage::Result { .. }));

        handler.handle(ClientMessage::Unsubscribe {
            command: "echo".into(),
            token,
        });
        assert!(matches!(
            rx.recv().await.unwrap(),
            ServerMessage::Unsubscribed { removed: true, .. }
        ));
        assert_eq!(dispatcher.subscriber_count("echo"), 0);
    }

    #[tokio::test]
    async fn test_close_removes_subscriptions() {
        let (dispatcher, mut handler, mut rx) = setup();
        let foreign = dispatcher.subscribe("echo", |_: &Value| {});

        for command in ["echo", "broken"] {
            handler.handle(ClientMessage::Subscribe {
                command: command.into(),
            });
            rx.recv().await.unwrap();
        }

        // Another client's token is not ours to remove
        handler.handle(ClientMessage::Unsubscribe {
            command: "echo".into(),
            token: foreign.get(),
        });
        assert!(matches!(
            rx.recv().await.unwrap(),
            ServerMessage::Unsubscribed { removed: false, .. }
        ));

        assert_eq!(handler.close(), 2);
        assert_eq!(dispatcher.subscriber_count("echo"), 1);
        assert_eq!(dispatcher.subscriber_count("broken"), 0);
    }

    #[tokio::test]
    async fn test_status_history_and_active() {
        let (_dispatcher, mut handler, mut rx) = setup();

        handler.handle(dispatch(1, "echo", json!(5)));
        rx.recv().await.unwrap();

        handler.handle(ClientMessage::Status {
            command: "echo".into(),
        });
        assert_eq!(
            rx.recv().await.unwrap(),
            ServerMessage::Status {
                command: "echo".into(),
                status: CommandStatus::Completed,
            }
        );

        handler.handle(ClientMessage::History {
            command: "echo".into(),
        });
        assert_eq!(
            rx.recv().await.unwrap(),
            ServerMessage::History {
                command: "echo".into(),
                entries: vec![json!(5)],
            }
        );

        handler.handle(ClientMessage::Active);
        assert_eq!(
            rx.recv().await.unwrap(),
            ServerMessage::Active { commands: vec![] }
        );

        handler.handle(ClientMessage::Cancel {
            command: "echo".into(),
        });
        assert_eq!(
            rx.recv().await.unwrap(),
            ServerMessage::Cancelled {
                command: "echo".into(),
                cancelled: false,
            }
        );
    }
}
