//! Unit tests for `ConversationRepo`.

use std::sync::Arc;

use tasklane::models::conversation::{ConversationStatus, ConversationUpdate, NewConversation};
use tasklane::models::task::NewTask;
use tasklane::persistence::conversation_repo::ConversationRepo;
use tasklane::persistence::{db, task_repo::TaskRepo};
use tasklane::AppError;

async fn repos() -> (TaskRepo, ConversationRepo) {
    let database = Arc::new(db::connect_memory().await.expect("db"));
    (
        TaskRepo::new(Arc::clone(&database)),
        ConversationRepo::new(database),
    )
}

#[tokio::test]
async fn create_under_existing_task() {
    let (tasks, conversations) = repos().await;
    let task_id = tasks.create(&NewTask::new("t")).await.expect("task").task.id;

    let created = conversations
        .create(task_id, &NewConversation::new("hello"))
        .await
        .expect("create");

    assert_eq!(created.task_id, task_id);
    assert_eq!(created.content, "hello");
    assert_eq!(created.status, ConversationStatus::Active);
}

#[tokio::test]
async fn create_under_missing_task_is_not_found() {
    let (_, conversations) = repos().await;
    let result = conversations.create(7, &NewConversation::new("x")).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn create_rejects_empty_content() {
    let (tasks, conversations) = repos().await;
    let task_id = tasks.create(&NewTask::new("t")).await.expect("task").task.id;

    let result = conversations
        .create(task_id, &NewConversation::new(" "))
        .await;
    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn list_for_task_is_scoped_and_ordered() {
    let (tasks, conversations) = repos().await;
    let a = tasks.create(&NewTask::new("a")).await.expect("a").task.id;
    let b = tasks.create(&NewTask::new("b")).await.expect("b").task.id;

    conversations.create(a, &NewConversation::new("a1")).await.expect("a1");
    conversations.create(b, &NewConversation::new("b1")).await.expect("b1");
    conversations.create(a, &NewConversation::new("a2")).await.expect("a2");

    let listed = conversations.list_for_task(a).await.expect("list");
    let contents: Vec<&str> = listed.iter().map(|c| c.content.as_str()).collect();
    assert_eq!(contents, ["a1", "a2"]);
}

#[tokio::test]
async fn update_applies_only_present_fields() {
    let (tasks, conversations) = repos().await;
    let task_id = tasks.create(&NewTask::new("t")).await.expect("task").task.id;
    let created = conversations
        .create(task_id, &NewConversation::new("keep"))
        .await
        .expect("create");

    let update = ConversationUpdate {
        content: None,
        status: Some(ConversationStatus::Archived),
    };
    let updated = conversations
        .update(created.id, &update)
        .await
        .expect("update")
        .expect("exists");

    assert_eq!(updated.content, "keep");
    assert_eq!(updated.status, ConversationStatus::Archived);
}

#[tokio::test]
async fn update_missing_conversation_returns_none() {
    let (_, conversations) = repos().await;
    let update = ConversationUpdate {
        content: Some("x".into()),
        status: None,
    };
    assert!(conversations.update(1, &update).await.expect("update").is_none());
}

#[tokio::test]
async fn bulk_status_update_is_unconditional_and_repeatable() {
    let (tasks, conversations) = repos().await;
    let created = tasks
        .create(
            &NewTask::new("t")
                .with_conversation(NewConversation::new("one"))
                .with_conversation(NewConversation {
                    content: "two".into(),
                    status: ConversationStatus::Archived,
                }),
        )
        .await
        .expect("task");
    let other = tasks
        .create(&NewTask::new("other").with_conversation(NewConversation::new("x")))
        .await
        .expect("other");

    for _ in 0..2 {
        let count = conversations
            .update_status_for_task(created.task.id, ConversationStatus::Processed)
            .await
            .expect("bulk update");
        assert_eq!(count, 2);

        let listed = conversations
            .list_for_task(created.task.id)
            .await
            .expect("list");
        assert!(listed
            .iter()
            .all(|c| c.status == ConversationStatus::Processed));
    }

    let untouched = conversations
        .list_for_task(other.task.id)
        .await
        .expect("list other");
    assert_eq!(untouched[0].status, ConversationStatus::Active);
}

#[tokio::test]
async fn bulk_status_update_without_conversations_returns_zero() {
    let (tasks, conversations) = repos().await;
    let task_id = tasks.create(&NewTask::new("t")).await.expect("task").task.id;

    let count = conversations
        .update_status_for_task(task_id, ConversationStatus::Processed)
        .await
        .expect("bulk update");
    assert_eq!(count, 0);
}
