use serde::{Deserialize, Serialize};

use crate::agent::AgentRunRequest;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsIncomingMessage {
    Run(AgentRunRequest),
    Cancel,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsOutgoingMessage<'a> {
    Session { session_token: &'a str },
    Message { content: &'a str },
    Done { stop_reason: Option<&'a str> },
    Error { kind: &'a str, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn run_message_carries_the_request() {
        let incoming: WsIncomingMessage = serde_json::from_value(json!({
            "type": "run",
            "group_chat_name": "default_group_chat",
            "task": "summarize",
            "termination": {"max_messages": 4}
        }))
        .unwrap();
        let WsIncomingMessage::Run(request) = incoming else {
            panic!("expected run");
        };
        assert_eq!(request.group_chat_name.as_deref(), Some("default_group_chat"));
        assert_eq!(request.termination.max_messages, Some(4));

        let cancel: WsIncomingMessage = serde_json::from_value(json!({"type": "cancel"})).unwrap();
        assert!(matches!(cancel, WsIncomingMessage::Cancel));
    }

    #[test]
    fn outgoing_shapes() {
        let value = serde_json::to_value(WsOutgoingMessage::Message {
            content: "planner: ok",
        })
        .unwrap();
        assert_eq!(value, json!({"type": "message", "content": "planner: ok"}));
    }
}
