//! Persistence: JSON-per-task round trips and startup resume.

use std::sync::Arc;

use taskgate::domain::models::NoteType;
use taskgate::{
    CompletionGates, CreateTaskParams, EventBus, FsTaskStore, TaskPatch, TaskPriority, TaskStatus,
    TaskStore, WorkflowConfig, WorkflowService,
};

fn service_on(store: Arc<FsTaskStore>) -> WorkflowService {
    WorkflowService::new(
        store,
        Arc::new(CompletionGates::default()),
        Arc::new(EventBus::default()),
        WorkflowConfig {
            auto_cleanup_enabled: false,
            ..Default::default()
        },
    )
}

#[tokio::test]
async fn tasks_survive_a_service_restart() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsTaskStore::new(dir.path()));

    let task_id = {
        let service = service_on(Arc::clone(&store));
        let task = service
            .create_task(CreateTaskParams {
                name: "long running".into(),
                description: Some("touches the frontend".into()),
                priority: TaskPriority::High,
                tags: vec!["frontend".into()],
                ..Default::default()
            })
            .await;
        service.start_task(task.id).await.unwrap();
        service.add_note(task.id, "halfway there", NoteType::Comment).await;
        service.add_affected_file(task.id, "src/app.tsx").await;
        service.add_checkpoint(task.id, "ckpt-1").await;
        service
            .update_task(
                task.id,
                TaskPatch {
                    progress: Some(40),
                    ..Default::default()
                },
            )
            .await;
        task.id
    };

    let restarted = service_on(Arc::clone(&store));
    restarted.initialize().await;

    let task = restarted.get_task(task_id).await.expect("task reloaded");
    assert_eq!(task.name, "long running");
    assert_eq!(task.priority, TaskPriority::High);
    assert_eq!(task.progress, 40);
    assert_eq!(task.status, TaskStatus::InProgress);
    assert_eq!(task.notes.len(), 1);
    assert_eq!(task.files_affected, vec!["src/app.tsx"]);
    assert_eq!(task.checkpoints, vec!["ckpt-1"]);
    assert!(task.started_at.is_some());

    // The reloaded in-progress task is elected as current.
    assert_eq!(restarted.current_task().await.unwrap().id, task_id);
}

#[tokio::test]
async fn save_then_load_is_structurally_equal() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsTaskStore::new(dir.path());

    let service = service_on(Arc::new(FsTaskStore::new(dir.path())));
    let parent = service.create_task(CreateTaskParams::named("parent")).await;
    let child = service
        .create_task(CreateTaskParams {
            name: "child".into(),
            parent_id: Some(parent.id),
            ..Default::default()
        })
        .await;

    let loaded = store.load_all().await.unwrap();
    assert_eq!(loaded.len(), 2);

    let loaded_parent = loaded.iter().find(|t| t.id == parent.id).unwrap();
    let loaded_child = loaded.iter().find(|t| t.id == child.id).unwrap();
    assert!(loaded_parent.subtasks.contains(&child.id));
    assert_eq!(loaded_child.parent_id, Some(parent.id));
    assert_eq!(loaded_child, &child);
}

#[tokio::test]
async fn resume_elects_most_recent_in_progress_and_demotes_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsTaskStore::new(dir.path()));

    // Simulate a crash that left two tasks in progress.
    let (stale_id, fresh_id) = {
        let service = service_on(Arc::clone(&store));
        let stale = service.create_task(CreateTaskParams::named("stale")).await;
        let fresh = service.create_task(CreateTaskParams::named("fresh")).await;
        service.start_task(stale.id).await.unwrap();
        service.start_task(fresh.id).await.unwrap();

        // Rewrite the first document back to in_progress with an older
        // updated_at, as a crash would leave it.
        let mut abandoned = service.get_task(stale.id).await.unwrap();
        abandoned.status = TaskStatus::InProgress;
        abandoned.updated_at -= chrono::Duration::minutes(5);
        store.save(&abandoned).await.unwrap();
        (stale.id, fresh.id)
    };

    let restarted = service_on(Arc::clone(&store));
    restarted.initialize().await;

    assert_eq!(restarted.current_task().await.unwrap().id, fresh_id);
    let demoted = restarted.get_task(stale_id).await.unwrap();
    assert_eq!(demoted.status, TaskStatus::Paused);
}

#[tokio::test]
async fn deleted_tasks_disappear_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsTaskStore::new(dir.path()));

    let service = service_on(Arc::clone(&store));
    let task = service.create_task(CreateTaskParams::named("ephemeral")).await;
    assert_eq!(store.load_all().await.unwrap().len(), 1);

    assert!(service.delete_task(task.id).await);
    assert!(store.load_all().await.unwrap().is_empty());
}
