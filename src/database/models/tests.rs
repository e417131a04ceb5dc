use super::*;
use chrono::NaiveDate;

fn sample_timestamp() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 6, 1)
        .expect("valid date")
        .and_hms_opt(12, 0, 0)
        .expect("valid time")
}

#[test]
fn document_serializes_round_trip() {
    let document = Document {
        id: 1,
        title: "Shipping FAQ".to_string(),
        content: "We ship worldwide.".to_string(),
        filename: None,
        is_active: true,
        uploaded_at: sample_timestamp(),
        updated_at: sample_timestamp(),
    };

    let encoded = serde_json::to_string(&document).expect("can serialize");
    let decoded: Document = serde_json::from_str(&encoded).expect("can deserialize");

    assert_eq!(decoded, document);
}

#[test]
fn new_document_defaults_to_no_filename() {
    let new_document = NewDocument {
        title: "Title".to_string(),
        content: "Content".to_string(),
        filename: None,
    };

    assert!(new_document.filename.is_none());
}

#[test]
fn chat_message_preserves_style_attribution() {
    let message = ChatMessage {
        id: 5,
        line_user_id: "U1234".to_string(),
        is_user_message: false,
        message_text: "reply".to_string(),
        bot_style: Some("cheerful".to_string()),
        timestamp: sample_timestamp(),
    };

    assert_eq!(message.bot_style.as_deref(), Some("cheerful"));
    assert!(!message.is_user_message);
}
