use tasklane::models::conversation::{ConversationStatus, ConversationUpdate, NewConversation};
use tasklane::models::task::{NewTask, TaskStatus, TaskUpdate};

#[test]
fn status_serializes_snake_case() {
    let json = serde_json::to_string(&TaskStatus::Processing).expect("serialize");
    assert_eq!(json, "\"processing\"");
    let json = serde_json::to_string(&ConversationStatus::Archived).expect("serialize");
    assert_eq!(json, "\"archived\"");
}

#[test]
fn new_task_defaults_conversations_and_status() {
    let input: NewTask = serde_json::from_str(
        r#"{"title": "ingest", "conversations": [{"content": "hello"}]}"#,
    )
    .expect("deserialize");

    assert_eq!(input.title, "ingest");
    assert!(input.description.is_none());
    assert_eq!(input.conversations, vec![NewConversation::new("hello")]);
    assert_eq!(input.conversations[0].status, ConversationStatus::Active);
}

#[test]
fn task_update_distinguishes_absent_from_null() {
    let absent: TaskUpdate = serde_json::from_str(r#"{"title": "x"}"#).expect("deserialize");
    assert_eq!(absent.title.as_deref(), Some("x"));
    assert_eq!(absent.description, None);

    let cleared: TaskUpdate =
        serde_json::from_str(r#"{"description": null}"#).expect("deserialize");
    assert_eq!(cleared.description, Some(None));

    let set: TaskUpdate =
        serde_json::from_str(r#"{"description": "more"}"#).expect("deserialize");
    assert_eq!(set.description, Some(Some("more".to_owned())));
}

#[test]
fn empty_conversation_update_deserializes() {
    let update: ConversationUpdate = serde_json::from_str("{}").expect("deserialize");
    assert!(update.content.is_none() && update.status.is_none());
}

#[test]
fn unknown_status_is_rejected() {
    let result = serde_json::from_str::<TaskUpdate>(r#"{"status": "paused"}"#);
    assert!(result.is_err());
}
