//! Fixtures shared by the unit tests.

use std::io;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use teloxide::types::Update;
use tracing::subscriber::DefaultGuard;

pub const CHAT_ID: i64 = 218485655;

fn message_json(text: &str) -> Value {
    let mut message = json!({
        "message_id": 6557,
        "from": {
            "id": CHAT_ID,
            "is_bot": false,
            "first_name": "Waffle",
            "username": "WaffleLapkin",
            "language_code": "en"
        },
        "chat": {
            "id": CHAT_ID,
            "first_name": "Waffle",
            "username": "WaffleLapkin",
            "type": "private"
        },
        "date": 1569518342,
        "text": text
    });

    if text.starts_with('/') {
        let length = text.split_whitespace().next().map_or(0, |c| c.encode_utf16().count());
        message["entities"] = json!([{ "offset": 0, "length": length, "type": "bot_command" }]);
    }
    message
}

/// teloxide only recognises update kinds when deserializing from text; a
/// `Value` always lands in `UpdateKind::Error`.
pub fn parse_update(value: Value) -> Update {
    serde_json::from_str(&value.to_string()).expect("fixture must deserialize as an update")
}

pub fn text_message_update(update_id: u32, text: &str) -> Update {
    parse_update(json!({ "update_id": update_id, "message": message_json(text) }))
}

pub fn edited_message_update(update_id: u32, text: &str) -> Update {
    let mut message = message_json(text);
    message["edit_date"] = json!(1569518400);
    parse_update(json!({ "update_id": update_id, "edited_message": message }))
}

pub fn callback_query_update(update_id: u32) -> Update {
    parse_update(json!({
        "update_id": update_id,
        "callback_query": {
            "id": "4382bfdwdsb323b2d9",
            "from": {
                "id": CHAT_ID,
                "is_bot": false,
                "first_name": "Waffle"
            },
            "chat_instance": "-8420584213546394",
            "data": "data"
        }
    }))
}

/// Collects formatted log lines from the thread-local subscriber.
#[derive(Clone, Default)]
pub struct CaptureLog {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl CaptureLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_default(&self) -> DefaultGuard {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn lines(&self) -> Vec<String> {
        let buffer = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buffer)
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl io::Write for CaptureLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teloxide::types::UpdateKind;

    #[test]
    fn test_fixtures_parse_into_typed_kinds() {
        assert!(matches!(
            text_message_update(1, "/start").kind,
            UpdateKind::Message(_)
        ));
        assert!(matches!(
            edited_message_update(2, "hi").kind,
            UpdateKind::EditedMessage(_)
        ));
        assert!(matches!(
            callback_query_update(3).kind,
            UpdateKind::CallbackQuery(_)
        ));
    }
}
