use tungstenite::Utf8Bytes;
use tungstenite::protocol::Message as WsMessage;
use tungstenite::protocol::frame::CloseFrame;
use tungstenite::protocol::frame::coding::CloseCode;

use crate::hub::Message;

/// Frames a relayed message for the wire.
///
/// UTF-8 payloads go out as text frames, anything else as binary. The
/// payload buffer is shared, not copied.
pub fn frame_message(message: &Message) -> WsMessage {
    match Utf8Bytes::try_from(message.payload.clone()) {
        Ok(text) => WsMessage::Text(text),
        Err(_) => WsMessage::Binary(message.payload.clone()),
    }
}

/// Close frame sent to a subscriber dropped for falling behind.
pub fn overflow_close() -> WsMessage {
    WsMessage::Close(Some(CloseFrame {
        code: CloseCode::Again,
        reason: "subscriber too slow".into(),
    }))
}

/// Close frame sent when the relay shuts down.
pub fn shutdown_close() -> WsMessage {
    WsMessage::Close(Some(CloseFrame {
        code: CloseCode::Away,
        reason: "relay shutting down".into(),
    }))
}
