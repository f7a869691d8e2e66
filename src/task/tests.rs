//! Task Module Tests
//!
//! ## Test Scopes
//! - **State machine**: Verifies that transitions follow the lifecycle order
//!   and that terminal states absorb further events.
//! - **Progress**: Bounds, monotonicity, and the cancellation reset.
//! - **Serialization**: Round-trip of tasks and error cause chains.

#[cfg(test)]
mod tests {
    use crate::task::event::{Applied, TaskEvent};
    use crate::task::types::{Task, TaskError, TaskState};
    use std::collections::HashMap;

    fn task() -> Task {
        Task::new("index_document", "test-user", HashMap::new())
    }

    fn queued_task() -> Task {
        let mut t = task();
        t.apply(&TaskEvent::Queued {
            task_id: t.id.clone(),
        });
        t
    }

    // ============================================================
    // TEST 1: State machine ordering
    // ============================================================

    #[test]
    fn test_new_task_starts_created() {
        let t = task();
        assert_eq!(t.state, TaskState::Created);
        assert_eq!(t.progress, 0.0);
        assert!(t.result.is_none());
        assert!(t.error.is_none());
    }

    #[test]
    fn test_queued_then_progress_then_done() {
        let mut t = task();
        let id = t.id.clone();

        assert_eq!(
            t.apply(&TaskEvent::Queued { task_id: id.clone() }),
            Applied::Applied
        );
        assert_eq!(t.state, TaskState::Queued);

        // First progress event acts as the start signal
        assert_eq!(
            t.apply(&TaskEvent::Progress {
                task_id: id.clone(),
                progress: 0.3
            }),
            Applied::Applied
        );
        assert_eq!(t.state, TaskState::Running);
        assert_eq!(t.progress, 0.3);

        assert_eq!(
            t.apply(&TaskEvent::Result {
                task_id: id,
                result: serde_json::json!("ok")
            }),
            Applied::Applied
        );
        assert_eq!(t.state, TaskState::Done);
        assert_eq!(t.result, Some(serde_json::json!("ok")));
        assert_eq!(t.progress, 1.0);
        assert!(t.error.is_none());
    }

    #[test]
    fn test_queued_event_is_rejected_after_start() {
        let mut t = queued_task();
        let id = t.id.clone();
        t.apply(&TaskEvent::Progress {
            task_id: id.clone(),
            progress: 0.1,
        });

        let outcome = t.apply(&TaskEvent::Queued { task_id: id });
        assert!(matches!(outcome, Applied::Dropped(_)));
        assert_eq!(t.state, TaskState::Running);
    }

    #[test]
    fn test_error_event_sets_error_and_clears_result() {
        let mut t = queued_task();
        let id = t.id.clone();

        t.apply(&TaskEvent::Error {
            task_id: id,
            error: TaskError::new("boom"),
        });

        assert_eq!(t.state, TaskState::Error);
        assert!(t.result.is_none());
        assert_eq!(t.error.as_ref().unwrap().message, "boom");
    }

    // ============================================================
    // TEST 2: Terminal states absorb events
    // ============================================================

    #[test]
    fn test_terminal_task_drops_all_events() {
        let mut t = queued_task();
        let id = t.id.clone();
        t.apply(&TaskEvent::Result {
            task_id: id.clone(),
            result: serde_json::json!(42),
        });

        let before = t.clone();

        // A late cancellation must not override the first terminal event
        let outcome = t.apply(&TaskEvent::Cancelled {
            task_id: id.clone(),
            requeue: false,
        });
        assert_eq!(outcome, Applied::Dropped("task is terminal"));

        // Re-applying the same terminal event is an idempotent no-op
        let outcome = t.apply(&TaskEvent::Result {
            task_id: id,
            result: serde_json::json!(42),
        });
        assert_eq!(outcome, Applied::Dropped("task is terminal"));

        assert_eq!(t.state, before.state);
        assert_eq!(t.result, before.result);
        assert_eq!(t.modified_at, before.modified_at);
    }

    // ============================================================
    // TEST 3: Progress bounds and monotonicity
    // ============================================================

    #[test]
    fn test_progress_is_clamped_and_monotonic() {
        let mut t = queued_task();
        let id = t.id.clone();

        t.apply(&TaskEvent::Progress {
            task_id: id.clone(),
            progress: 1.7,
        });
        assert_eq!(t.progress, 1.0);

        // A lower progress value never moves the task backwards
        t.apply(&TaskEvent::Progress {
            task_id: id.clone(),
            progress: 0.2,
        });
        assert_eq!(t.progress, 1.0);

        t.apply(&TaskEvent::Progress {
            task_id: id,
            progress: -3.0,
        });
        assert_eq!(t.progress, 1.0);
    }

    #[test]
    fn test_cancelled_resets_progress() {
        let mut t = queued_task();
        let id = t.id.clone();
        t.apply(&TaskEvent::Progress {
            task_id: id.clone(),
            progress: 0.8,
        });

        t.apply(&TaskEvent::Cancelled {
            task_id: id,
            requeue: false,
        });

        assert_eq!(t.state, TaskState::Cancelled);
        assert_eq!(t.progress, 0.0);
    }

    #[test]
    fn test_cancelled_with_requeue_resurrects_as_queued() {
        let mut t = queued_task();
        let id = t.id.clone();
        t.apply(&TaskEvent::Progress {
            task_id: id.clone(),
            progress: 0.8,
        });

        t.apply(&TaskEvent::Cancelled {
            task_id: id,
            requeue: true,
        });

        assert_eq!(t.state, TaskState::Queued);
        assert_eq!(t.progress, 0.0);
        assert!(t.result.is_none());
        assert!(t.error.is_none());
    }

    // ============================================================
    // TEST 4: Serialization round-trip
    // ============================================================

    #[test]
    fn test_task_serde_round_trip() {
        let mut t = Task::new(
            "index_document",
            "userA",
            HashMap::from([("path".to_string(), serde_json::json!("/a"))]),
        );
        let id = t.id.clone();
        t.apply(&TaskEvent::Queued { task_id: id.clone() });
        t.apply(&TaskEvent::Progress {
            task_id: id.clone(),
            progress: 0.5,
        });
        t.apply(&TaskEvent::Result {
            task_id: id,
            result: serde_json::json!({"indexed": 12}),
        });

        let json = serde_json::to_string(&t).expect("serialization failed");
        let restored: Task = serde_json::from_str(&json).expect("deserialization failed");

        assert_eq!(restored.id, t.id);
        assert_eq!(restored.state, TaskState::Done);
        assert_eq!(restored.progress, 1.0);
        assert_eq!(restored.result, t.result);
        assert!(restored.error.is_none());
        assert_eq!(restored.args["path"], serde_json::json!("/a"));
    }

    #[test]
    fn test_task_error_keeps_cause_chain() {
        let source = anyhow::anyhow!("io failure")
            .context("cannot read document")
            .context("extraction failed");
        let err = TaskError::from_anyhow(&source);

        assert_eq!(err.message, "extraction failed");
        let cause = err.cause.as_ref().expect("missing first cause");
        assert_eq!(cause.message, "cannot read document");
        let root = cause.cause.as_ref().expect("missing root cause");
        assert_eq!(root.message, "io failure");

        let json = serde_json::to_string(&err).unwrap();
        let restored: TaskError = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, err);
        assert_eq!(
            restored.to_string(),
            "extraction failed: cannot read document: io failure"
        );
    }

    #[test]
    fn test_event_serde_round_trip() {
        let event = TaskEvent::Error {
            task_id: crate::task::types::TaskId::new(),
            error: TaskError::with_cause("outer", TaskError::new("inner")),
        };
        let json = serde_json::to_string(&event).unwrap();
        let restored: TaskEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, event);
    }
}
