//! Conversions between Telegram types and core types.

use teloxide::{
    types::{Update, UpdateKind},
    ApiError, RequestError,
};

use vdb_core::{
    domain::{ChatId, UserId},
    errors::DisconnectReason,
    messaging::types::InboundMessage,
};

/// Classify a polling failure with the numeric codes the reconnect policy
/// understands.
pub fn disconnect_reason(e: &RequestError) -> DisconnectReason {
    let code = match e {
        RequestError::Api(ApiError::NotFound) => 401,
        RequestError::Api(ApiError::TerminatedByOtherGetUpdates) => 409,
        RequestError::Api(_) => 400,
        RequestError::Network(_) => 408,
        RequestError::Io(_) => 503,
        RequestError::InvalidJson { .. } => 500,
        _ => 400,
    };
    DisconnectReason::new(Some(code), e.to_string())
}

/// Text messages from humans; everything else is ignored.
pub fn inbound_from_update(update: &Update) -> Option<InboundMessage> {
    let UpdateKind::Message(msg) = &update.kind else {
        return None;
    };
    let text = msg.text()?;
    let from = msg.from();
    if from.map(|u| u.is_bot).unwrap_or(false) {
        return None;
    }

    Some(InboundMessage {
        chat_id: ChatId(msg.chat.id.0),
        user_id: from.and_then(|u| i64::try_from(u.id.0).ok()).map(UserId),
        username: from.and_then(|u| u.username.clone()),
        text: text.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn update(message: serde_json::Value) -> Update {
        serde_json::from_value(json!({ "update_id": 10, "message": message })).unwrap()
    }

    fn private_chat() -> serde_json::Value {
        json!({ "id": 42, "type": "private", "first_name": "Alice" })
    }

    #[test]
    fn maps_text_messages() {
        let u = update(json!({
            "message_id": 1,
            "date": 0,
            "chat": private_chat(),
            "from": { "id": 7, "is_bot": false, "first_name": "Alice", "username": "alice" },
            "text": "/yt https://youtu.be/x",
        }));

        assert_eq!(
            inbound_from_update(&u),
            Some(InboundMessage {
                chat_id: ChatId(42),
                user_id: Some(UserId(7)),
                username: Some("alice".to_string()),
                text: "/yt https://youtu.be/x".to_string(),
            })
        );
    }

    #[test]
    fn ignores_bots_and_non_text() {
        let from_bot = update(json!({
            "message_id": 1,
            "date": 0,
            "chat": private_chat(),
            "from": { "id": 8, "is_bot": true, "first_name": "Bot" },
            "text": "/start",
        }));
        assert_eq!(inbound_from_update(&from_bot), None);

        let sticker_like = update(json!({
            "message_id": 2,
            "date": 0,
            "chat": private_chat(),
            "from": { "id": 7, "is_bot": false, "first_name": "Alice" },
            "dice": { "emoji": "🎲", "value": 3 },
        }));
        assert_eq!(inbound_from_update(&sticker_like), None);
    }

    #[test]
    fn maps_request_errors_to_codes() {
        let code = |e: RequestError| disconnect_reason(&e).status_code;

        assert_eq!(code(RequestError::Api(ApiError::NotFound)), Some(401));
        assert_eq!(
            code(RequestError::Api(ApiError::TerminatedByOtherGetUpdates)),
            Some(409)
        );
        assert_eq!(code(RequestError::Api(ApiError::BotBlocked)), Some(400));
        assert_eq!(
            code(RequestError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset"
            ))),
            Some(503)
        );
    }
}
