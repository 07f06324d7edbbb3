use std::time::Duration;

use quill_queue::{
	Channel, Disposition, Error, IndexingRequest, MemoryChannel, PgChannel, Publisher, RetryPolicy,
};

fn fast_policy(max_attempts: u32) -> RetryPolicy {
	RetryPolicy { max_attempts, base_backoff_ms: 1, max_backoff_ms: 4 }
}

#[tokio::test]
async fn dropped_delivery_is_redelivered() {
	let channel = MemoryChannel::new(fast_policy(3));

	channel.publish(b"hello").await.expect("publish");

	let mut subscription = channel.subscribe().await.expect("subscribe");
	let first = subscription.next().await.expect("next").expect("delivery");
	let message_id = first.message_id();

	assert_eq!(first.attempts(), 1);

	drop(first);

	let second = subscription.next().await.expect("next").expect("redelivery");

	assert_eq!(second.message_id(), message_id);
	assert_eq!(second.attempts(), 2);
	assert_eq!(second.payload(), b"hello");

	second.ack().await.expect("ack");

	assert_eq!(channel.acked(), 1);
}

#[tokio::test]
async fn retries_until_budget_then_dead_letters() {
	let channel = MemoryChannel::new(fast_policy(3));

	channel.publish(b"payload").await.expect("publish");

	let mut subscription = channel.subscribe().await.expect("subscribe");

	for expected in 1..=3 {
		let delivery = subscription.next().await.expect("next").expect("delivery");

		assert_eq!(delivery.attempts(), expected);

		delivery.reject(Disposition::Retry, "model down".to_string()).await.expect("reject");
	}

	tokio::time::timeout(Duration::from_secs(5), channel.wait_for_settled(1))
		.await
		.expect("Message never settled.");

	let dead = channel.dead_letters();

	assert_eq!(dead.len(), 1);
	assert_eq!(dead[0].attempts, 3);
	assert_eq!(dead[0].reason, "model down");
	assert_eq!(channel.acked(), 0);
}

#[tokio::test]
async fn dead_letter_disposition_skips_retries() {
	let channel = MemoryChannel::new(fast_policy(5));

	channel.publish(b"garbage").await.expect("publish");

	let mut subscription = channel.subscribe().await.expect("subscribe");
	let delivery = subscription.next().await.expect("next").expect("delivery");

	delivery
		.reject(Disposition::DeadLetter, "token=abc malformed".to_string())
		.await
		.expect("reject");

	let dead = channel.dead_letters();

	assert_eq!(dead.len(), 1);
	assert_eq!(dead[0].attempts, 1);
	assert_eq!(dead[0].payload, b"garbage");
	assert_eq!(dead[0].reason, "token=[REDACTED] malformed");
}

#[tokio::test]
async fn close_drains_then_ends_stream() {
	let channel = MemoryChannel::new(fast_policy(3));

	channel.publish(b"one").await.expect("publish");
	channel.close();

	assert!(matches!(channel.publish(b"two").await, Err(Error::Closed)));

	let mut subscription = channel.subscribe().await.expect("subscribe");
	let delivery = subscription.next().await.expect("next").expect("queued message");

	delivery.ack().await.expect("ack");

	let end = tokio::time::timeout(Duration::from_secs(5), subscription.next())
		.await
		.expect("Stream did not end.")
		.expect("next");

	assert!(end.is_none());
}

#[tokio::test]
async fn competing_consumers_split_the_stream() {
	let channel = MemoryChannel::new(fast_policy(3));

	for idx in 0..4_u8 {
		channel.publish(&[idx]).await.expect("publish");
	}

	let mut left = channel.subscribe().await.expect("subscribe");
	let mut right = channel.subscribe().await.expect("subscribe");
	let mut seen = Vec::new();

	for _ in 0..2 {
		let a = left.next().await.expect("next").expect("delivery");
		let b = right.next().await.expect("next").expect("delivery");

		seen.push(a.payload()[0]);
		seen.push(b.payload()[0]);

		a.ack().await.expect("ack");
		b.ack().await.expect("ack");
	}

	seen.sort_unstable();

	assert_eq!(seen, vec![0, 1, 2, 3]);
	assert_eq!(channel.acked(), 4);
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set QUILL_PG_DSN to run."]
async fn pg_channel_retries_and_dead_letters() {
	let Some(base_dsn) = quill_testkit::env_dsn() else {
		eprintln!("Skipping pg_channel_retries_and_dead_letters; set QUILL_PG_DSN to run this test.");

		return;
	};
	let test_db =
		quill_testkit::TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let cfg = quill_config::Postgres { dsn: test_db.dsn().to_string(), pool_max_conns: 2 };
	let db = quill_storage::db::Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema(3).await.expect("Failed to ensure schema.");

	let queue_cfg = quill_config::Queue {
		topic: "embed-note-content".to_string(),
		poll_interval_ms: 10,
		lease_seconds: 30,
		max_attempts: 2,
		base_backoff_ms: 0,
		max_backoff_ms: 0,
	};
	let channel = PgChannel::new(db.clone(), &queue_cfg);
	let request = IndexingRequest { note_id: uuid::Uuid::new_v4(), delete_old_embedding: true };

	channel.publish(&request.encode().expect("encode")).await.expect("publish");

	let mut subscription = channel.subscribe().await.expect("subscribe");
	let first = subscription.next().await.expect("next").expect("delivery");
	let message_id = first.message_id();

	assert_eq!(IndexingRequest::decode(first.payload()).expect("decode"), request);

	first.reject(Disposition::Retry, "Bearer sk-123 failed".to_string()).await.expect("reject");

	let second = subscription.next().await.expect("next").expect("redelivery");

	assert_eq!(second.message_id(), message_id);
	assert_eq!(second.attempts(), 2);

	second.reject(Disposition::Retry, "still failing".to_string()).await.expect("reject");

	let row = quill_storage::queue::get_message(&db, message_id).await.expect("get").expect("row");

	assert_eq!(row.status, "DEAD");
	assert_eq!(row.last_error.as_deref(), Some("still failing"));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
