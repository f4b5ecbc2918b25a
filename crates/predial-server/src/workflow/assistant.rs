use predial_common::mcp_api::ConversationResponse;
use predial_common::text_service::{ChatTurn, TextService, TurnRole};
use tokio::sync::Mutex;
use tracing::debug;

use super::{require, run_exclusive, Context, Request, RequestSlot, Slotted, WorkflowError};
use crate::prompt;

fn turn(role: TurnRole, content: &str) -> ChatTurn {
    ChatTurn {
        role,
        content: content.to_string(),
    }
}

#[derive(Debug)]
pub struct AssistantState {
    slot: RequestSlot,
    messages: Vec<ChatTurn>,
}

impl Default for AssistantState {
    fn default() -> Self {
        Self {
            slot: RequestSlot::default(),
            messages: vec![turn(TurnRole::Assistant, prompt::ASSISTANT_GREETING)],
        }
    }
}

impl Slotted for AssistantState {
    fn slot(&mut self) -> &mut RequestSlot {
        &mut self.slot
    }
}

/// Free-form maintenance conversation. The whole history goes with every message.
pub struct AssistantWorkflow<S> {
    ctx: Context<S>,
    state: Mutex<AssistantState>,
}

impl<S: TextService> AssistantWorkflow<S> {
    pub fn new(ctx: Context<S>) -> Self {
        Self {
            ctx,
            state: Mutex::new(AssistantState::default()),
        }
    }

    pub async fn messages(&self) -> Vec<ChatTurn> {
        self.state.lock().await.messages.clone()
    }

    /// Send `message`. On failure the conversation records an apology and the error
    /// is returned.
    pub async fn send(&self, message: &str) -> Result<ConversationResponse, WorkflowError> {
        run_exclusive(
            self.ctx.ai.as_ref(),
            &self.state,
            |state: &mut AssistantState| {
                if !require(message) {
                    return Err(WorkflowError::Invalid("Digite uma mensagem.".to_string()));
                }
                state.messages.push(turn(TurnRole::User, message.trim()));
                let request = Request::Conversation(
                    prompt::ASSISTANT_INSTRUCTION.to_string(),
                    state.messages.clone(),
                );
                Ok((request, ()))
            },
            |state, outcome, ()| match outcome {
                Ok(reply) => {
                    let reply = reply.trim().to_string();
                    debug!(turns = state.messages.len() + 1, "assistant replied");
                    state.messages.push(turn(TurnRole::Assistant, &reply));
                    Ok(ConversationResponse {
                        reply,
                        messages: state.messages.clone(),
                    })
                }
                Err(e) => {
                    state
                        .messages
                        .push(turn(TurnRole::Assistant, prompt::ASSISTANT_APOLOGY));
                    Err(e.into())
                }
            },
        )
        .await
    }

    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.slot.reset();
        state.messages = vec![turn(TurnRole::Assistant, prompt::ASSISTANT_GREETING)];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, failure, ScriptedText};

    #[tokio::test]
    async fn test_conversation_starts_with_greeting() {
        let (ctx, _ai) = context(ScriptedText::default());
        let workflow = AssistantWorkflow::new(ctx);
        let messages = workflow.messages().await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, TurnRole::Assistant);
        assert_eq!(messages[0].content, prompt::ASSISTANT_GREETING);
    }

    #[tokio::test]
    async fn test_history_is_sent_with_each_message() {
        let (ctx, ai) = context(ScriptedText::replying(vec![
            Ok("Verifique os ralos.".to_string()),
            Ok(" Semestralmente. ".to_string()),
        ]));
        let workflow = AssistantWorkflow::new(ctx);
        workflow.send("Como evitar infiltração?").await.expect("first");
        let out = workflow.send("Com que frequência?").await.expect("second");
        assert_eq!(out.reply, "Semestralmente.");
        assert_eq!(out.messages.len(), 5);

        let calls = ai.calls();
        assert_eq!(calls[0].prompt, prompt::ASSISTANT_INSTRUCTION);
        assert_eq!(calls[1].turns.len(), 4);
        assert_eq!(calls[1].turns[3].content, "Com que frequência?");
        assert_eq!(calls[1].turns[2].content, "Verifique os ralos.");
    }

    #[tokio::test]
    async fn test_failure_appends_apology() {
        let (ctx, _ai) = context(ScriptedText::replying(vec![Err(failure())]));
        let workflow = AssistantWorkflow::new(ctx);
        assert!(workflow.send("Olá").await.is_err());
        let messages = workflow.messages().await;
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2].content, prompt::ASSISTANT_APOLOGY);
    }

    #[tokio::test]
    async fn test_empty_message_and_reset() {
        let (ctx, ai) = context(ScriptedText::replying(vec![Ok("Oi".to_string())]));
        let workflow = AssistantWorkflow::new(ctx);
        assert!(matches!(workflow.send("  ").await, Err(WorkflowError::Invalid(_))));
        assert!(ai.calls().is_empty());

        workflow.send("Oi").await.expect("sent");
        workflow.reset().await;
        assert_eq!(workflow.messages().await.len(), 1);
    }
}
