//! Bus Module Tests
//!
//! ## Test Scopes
//! - **Topology**: Registry shape, dead-letter pairing, idempotent declaration.
//! - **Delivery**: Competing consumers on direct queues, broadcast on fanout
//!   queues, per-queue ordering.
//! - **Dead-lettering**: Rejected messages observed on the paired dead-letter
//!   queue and never redelivered to the origin.

#[cfg(test)]
mod tests {
    use crate::bus::broker::{Broker, MemoryBroker};
    use crate::bus::protocol::{decode, encode, WorkerCommand};
    use crate::bus::topology::{BusQueue, ExchangeKind};
    use crate::task::types::TaskId;
    use std::collections::HashSet;
    use std::time::Duration;

    // ============================================================
    // TEST 1: Topology registry
    // ============================================================

    #[test]
    fn test_registry_dead_letter_wiring() {
        assert_eq!(BusQueue::Task.dead_letter(), Some(BusQueue::TaskDlq));
        assert_eq!(
            BusQueue::ManagerEvent.dead_letter(),
            Some(BusQueue::ManagerEventDlq)
        );
        assert_eq!(BusQueue::Event.dead_letter(), None);
        assert_eq!(BusQueue::WorkerEvent.dead_letter(), None);

        // One level of redirection only: a dead-letter queue has no dead-letter
        for queue in BusQueue::ALL {
            if let Some(dlq) = queue.dead_letter() {
                assert_eq!(dlq.dead_letter(), None);
            }
        }
    }

    #[test]
    fn test_registry_kinds_and_names_are_distinct() {
        assert_eq!(BusQueue::Event.kind(), ExchangeKind::Fanout);
        assert_eq!(BusQueue::WorkerEvent.kind(), ExchangeKind::Fanout);
        assert_eq!(BusQueue::Task.kind(), ExchangeKind::Direct);
        assert_eq!(BusQueue::ManagerEvent.kind(), ExchangeKind::Direct);

        let names: HashSet<&str> = BusQueue::ALL.iter().map(|q| q.queue_name()).collect();
        assert_eq!(names.len(), BusQueue::ALL.len());
    }

    #[tokio::test]
    async fn test_declare_all_is_idempotent() {
        let broker = MemoryBroker::new();
        broker.declare_all().await.unwrap();

        let mut consumer = broker.consume(BusQueue::Task).await.unwrap();
        broker
            .publish(BusQueue::Task, b"before".to_vec())
            .await
            .unwrap();

        // A second declaration must not reset queues or lose messages
        broker.declare_all().await.unwrap();

        let payload = consumer.recv().await.unwrap();
        assert_eq!(payload, b"before".to_vec());
    }

    // ============================================================
    // TEST 2: Competing consumers on a direct queue
    // ============================================================

    #[tokio::test]
    async fn test_direct_queue_never_duplicates_deliveries() {
        let broker = MemoryBroker::new();
        broker.declare_all().await.unwrap();

        let worker_a = broker.consume(BusQueue::Task).await.unwrap();
        let worker_b = broker.consume(BusQueue::Task).await.unwrap();

        for i in 0..10u8 {
            broker.publish(BusQueue::Task, vec![i]).await.unwrap();
        }

        // Both workers drain the queue concurrently; together they must see
        // each message exactly once.
        let drain = |mut c: crate::bus::broker::BusConsumer| async move {
            let mut seen = Vec::new();
            while let Ok(Some(payload)) =
                tokio::time::timeout(Duration::from_millis(100), c.recv()).await
            {
                seen.push(payload[0]);
            }
            seen
        };
        let (seen_a, seen_b) = tokio::join!(drain(worker_a), drain(worker_b));

        let mut all: Vec<u8> = seen_a.iter().chain(seen_b.iter()).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<u8>>());
    }

    #[tokio::test]
    async fn test_direct_queue_preserves_publish_order() {
        let broker = MemoryBroker::new();
        broker.declare_all().await.unwrap();

        let mut consumer = broker.consume(BusQueue::ManagerEvent).await.unwrap();
        for i in 0..5u8 {
            broker.publish(BusQueue::ManagerEvent, vec![i]).await.unwrap();
        }

        for i in 0..5u8 {
            assert_eq!(consumer.recv().await.unwrap(), vec![i]);
        }
    }

    // ============================================================
    // TEST 3: Fanout broadcast
    // ============================================================

    #[tokio::test]
    async fn test_fanout_delivers_to_every_consumer() {
        let broker = MemoryBroker::new();
        broker.declare_all().await.unwrap();

        let mut worker_a = broker.consume(BusQueue::WorkerEvent).await.unwrap();
        let mut worker_b = broker.consume(BusQueue::WorkerEvent).await.unwrap();

        let command = WorkerCommand::Cancel {
            task_id: TaskId::new(),
            requeue: false,
        };
        broker
            .publish(BusQueue::WorkerEvent, encode(&command).unwrap())
            .await
            .unwrap();

        let a: WorkerCommand = decode(&worker_a.recv().await.unwrap()).unwrap();
        let b: WorkerCommand = decode(&worker_b.recv().await.unwrap()).unwrap();
        assert_eq!(a, command);
        assert_eq!(b, command);
    }

    // ============================================================
    // TEST 4: Dead-letter redirection
    // ============================================================

    #[tokio::test]
    async fn test_rejected_message_lands_on_dead_letter_queue() {
        let broker = MemoryBroker::new();
        broker.declare_all().await.unwrap();

        let mut origin = broker.consume(BusQueue::Task).await.unwrap();
        let mut dlq = broker.consume(BusQueue::TaskDlq).await.unwrap();

        broker
            .publish(BusQueue::Task, b"unparseable".to_vec())
            .await
            .unwrap();

        // Consumer pulls the message and rejects it
        let payload = origin.recv().await.unwrap();
        broker.reject(BusQueue::Task, payload).await.unwrap();

        // The payload is observed on the paired dead-letter queue...
        let dead = dlq.recv().await.unwrap();
        assert_eq!(dead, b"unparseable".to_vec());

        // ...and never redelivered to the origin queue
        let redelivered =
            tokio::time::timeout(Duration::from_millis(100), origin.recv()).await;
        assert!(redelivered.is_err(), "rejected message must not requeue");
    }

    #[tokio::test]
    async fn test_worker_command_round_trip() {
        let command = WorkerCommand::Shutdown;
        let restored: WorkerCommand = decode(&encode(&command).unwrap()).unwrap();
        assert_eq!(restored, command);
    }
}
