mod common;

use chrono::{NaiveDate, Utc};
use common::{spawn_app, MAX_DELIVERIES, SAMPLE_STATEMENT, VIEW_TTL};
use ingestion_service::cache::{CacheKeys, CacheStore};
use ingestion_service::models::{BalanceSnapshot, IngestionTask, JobStatus, StatementFormat};
use ingestion_service::queue::{Disposition, QueueTransport};
use ingestion_service::services::TransactionQuery;
use ingestion_service::workers::WorkerPool;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[tokio::test]
async fn three_row_statement_completes_end_to_end() {
    let app = spawn_app();
    let job_id = app.enqueue("u1", SAMPLE_STATEMENT).await;

    assert_eq!(app.drain().await, vec![Disposition::Acked]);

    let job = app.job(&job_id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100);
    assert_eq!(job.total_transactions, Some(3));
    assert_eq!(job.added_transactions, Some(3));
    assert_eq!(job.modified_transactions, Some(0));
    assert_eq!(job.balance, Some(dec("2034.80")));
    assert_eq!(job.balance_updated, Some(date(2024, 1, 4)));
    assert_eq!(job.error, None);

    let balance = app.owners().balance("u1").await.unwrap().unwrap();
    assert_eq!(
        balance,
        BalanceSnapshot {
            balance: dec("2034.80"),
            as_of: date(2024, 1, 4),
        }
    );

    let records = app
        .transactions()
        .list("u1", &TransactionQuery::default())
        .await
        .unwrap();
    assert_eq!(records.len(), 3);

    let grocery = records
        .iter()
        .find(|r| r.description == "GROCERY STORE")
        .unwrap();
    assert_eq!(grocery.category, vec!["Food and Drink", "Groceries"]);
    assert_eq!(grocery.personal_finance_category.primary, "FOOD_AND_DRINK");
    assert_eq!(grocery.amount, dec("-65.20"));
    assert!(grocery.is_expense);

    let paycheck = records.iter().find(|r| r.description == "PAYCHECK").unwrap();
    assert!(!paycheck.is_expense);
    assert_eq!(paycheck.amount, dec("2000.00"));
}

#[tokio::test]
async fn reingesting_the_same_file_adds_nothing() {
    let app = spawn_app();

    let first = app.enqueue("u1", SAMPLE_STATEMENT).await;
    app.drain().await;
    let second = app.enqueue("u1", SAMPLE_STATEMENT).await;
    app.drain().await;

    let first = app.job(&first).await;
    assert_eq!((first.added_transactions, first.modified_transactions), (Some(3), Some(0)));

    let second = app.job(&second).await;
    assert_eq!(second.status, JobStatus::Completed);
    assert_eq!((second.added_transactions, second.modified_transactions), (Some(0), Some(3)));

    let records = app
        .transactions()
        .list("u1", &TransactionQuery::default())
        .await
        .unwrap();
    assert_eq!(records.len(), 3);
}

#[tokio::test]
async fn same_file_for_another_owner_is_independent() {
    let app = spawn_app();
    app.enqueue("u1", SAMPLE_STATEMENT).await;
    let other = app.enqueue("u2", SAMPLE_STATEMENT).await;
    app.drain().await;

    assert_eq!(app.job(&other).await.added_transactions, Some(3));
}

#[tokio::test]
async fn same_day_lines_keep_statement_order_on_the_dashboard() {
    let app = spawn_app();
    let statement = "\
03/15/2024,RENT,1200.00,,3800.00
03/15/2024,ZOO PASS,40.00,,3760.00
03/15/2024,ATM WITHDRAWAL,100.00,,3660.00
03/15/2024,BAKERY,6.25,,3653.75
";
    app.enqueue("u1", statement).await;
    app.drain().await;

    let view = app.state.views.dashboard("u1", true).await.unwrap();
    assert_eq!(view.balance, Some(dec("3653.75")));
    assert_eq!(view.balance_updated, Some(date(2024, 3, 15)));
    let descriptions: Vec<&str> = view.transactions.iter().map(|r| r.description.as_str()).collect();
    assert_eq!(descriptions, vec!["BAKERY", "ATM WITHDRAWAL", "ZOO PASS", "RENT"]);
}

#[tokio::test]
async fn stale_statement_leaves_balance_alone() {
    let app = spawn_app();

    app.enqueue("u1", "05/01/2024,PAYCHECK,,500.00,500.00\n").await;
    app.drain().await;

    let stale = app.enqueue("u1", "04/15/2024,COFFEE,3.00,,100.00\n").await;
    app.drain().await;

    assert_eq!(app.job(&stale).await.status, JobStatus::Completed);
    let balance = app.owners().balance("u1").await.unwrap().unwrap();
    assert_eq!(balance.balance, dec("500.00"));
    assert_eq!(balance.as_of, date(2024, 5, 1));

    let records = app
        .transactions()
        .list("u1", &TransactionQuery::default())
        .await
        .unwrap();
    assert_eq!(records.len(), 2, "stale files still contribute transactions");

    app.enqueue("u1", "06/01/2024,GROCERY,20.00,,480.00\n").await;
    app.drain().await;

    let balance = app.owners().balance("u1").await.unwrap().unwrap();
    assert_eq!(balance.balance, dec("480.00"));
    assert_eq!(balance.as_of, date(2024, 6, 1));
}

#[tokio::test]
async fn unreadable_file_fails_the_job_without_retry() {
    let app = spawn_app();
    let job_id = app.enqueue("u1", "not a statement\n\n,,\n").await;

    assert_eq!(app.drain().await, vec![Disposition::Acked]);

    let job = app.job(&job_id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some("No valid transactions found in statement"));
    assert!(app.transport.dead_letters().is_empty());
    assert_eq!(app.transport.ready_len(), 0);
}

#[tokio::test]
async fn transient_failures_retry_then_fail_on_last_attempt() {
    let app = spawn_app();
    app.store.set_commits_fail(true);
    let job_id = app.enqueue("u1", SAMPLE_STATEMENT).await;

    let outcomes = app.drain().await;
    let mut expected = vec![Disposition::Requeued; (MAX_DELIVERIES - 1) as usize];
    expected.push(Disposition::Acked);
    assert_eq!(outcomes, expected);

    let job = app.job(&job_id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.unwrap().contains("Batch aborted"));
    assert!(app.transport.dead_letters().is_empty());
}

#[tokio::test]
async fn redelivery_after_transient_failure_completes() {
    let app = spawn_app();
    app.store.set_commits_fail(true);
    let job_id = app.enqueue("u1", SAMPLE_STATEMENT).await;

    let first = app.queue.process_next(&app.worker).await.unwrap();
    assert_eq!(first, Some(Disposition::Requeued));
    assert_eq!(app.job(&job_id).await.status, JobStatus::Processing);

    app.store.set_commits_fail(false);
    assert_eq!(app.drain().await, vec![Disposition::Acked]);

    let job = app.job(&job_id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.added_transactions, Some(3));
}

#[tokio::test]
async fn ledger_failure_after_commit_keeps_first_counts_and_clears_views() {
    let app = spawn_app();
    let dashboard = CacheKeys::dashboard("u1");
    app.cache.set(&dashboard, r#"{"stale":true}"#, VIEW_TTL).await.unwrap();
    app.store.fail_guarded_updates_after_commit(1);
    let job_id = app.enqueue("u1", SAMPLE_STATEMENT).await;

    let first = app.queue.process_next(&app.worker).await.unwrap();
    assert_eq!(first, Some(Disposition::Requeued));
    assert_eq!(app.cache.get(&dashboard).await.unwrap(), None);

    let pending = app.job(&job_id).await;
    assert_eq!(pending.status, JobStatus::Processing);
    assert_eq!(pending.added_transactions, Some(3));

    assert_eq!(app.drain().await, vec![Disposition::Acked]);

    let job = app.job(&job_id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!((job.added_transactions, job.modified_transactions), (Some(3), Some(0)));
    assert_eq!(job.total_transactions, Some(3));

    let records = app
        .transactions()
        .list("u1", &TransactionQuery::default())
        .await
        .unwrap();
    assert_eq!(records.len(), 3);
}

#[tokio::test]
async fn failure_to_record_failure_is_dead_lettered() {
    let app = spawn_app();
    let job_id = app.enqueue("u1", SAMPLE_STATEMENT).await;
    app.store.set_available(false);

    let outcomes = app.drain().await;
    assert_eq!(outcomes.last(), Some(&Disposition::DeadLettered));
    assert_eq!(outcomes.len(), MAX_DELIVERIES as usize);
    assert_eq!(app.transport.dead_letters().len(), 1);

    app.store.set_available(true);
    assert_eq!(app.job(&job_id).await.status, JobStatus::Pending);
}

#[tokio::test]
async fn redelivered_terminal_job_is_not_reprocessed() {
    let app = spawn_app();
    let job_id = app.enqueue("u1", SAMPLE_STATEMENT).await;
    app.drain().await;
    let before = app.job(&job_id).await;

    let replay = IngestionTask {
        job_id: job_id.clone(),
        owner_id: "u1".to_string(),
        raw_content: SAMPLE_STATEMENT.to_string(),
        file_name: "statement.csv".to_string(),
        format: StatementFormat::DebitCredit,
        enqueued_at: Utc::now(),
    };
    app.queue.publish(&replay).await.unwrap();

    assert_eq!(app.drain().await, vec![Disposition::Acked]);
    assert_eq!(app.job(&job_id).await, before);
}

#[tokio::test]
async fn task_for_unknown_job_is_acknowledged() {
    let app = spawn_app();
    let orphan = IngestionTask {
        job_id: "missing".to_string(),
        owner_id: "u1".to_string(),
        raw_content: SAMPLE_STATEMENT.to_string(),
        file_name: "statement.csv".to_string(),
        format: StatementFormat::DebitCredit,
        enqueued_at: Utc::now(),
    };
    app.queue.publish(&orphan).await.unwrap();

    assert_eq!(app.drain().await, vec![Disposition::Acked]);
    let records = app
        .transactions()
        .list("u1", &TransactionQuery::default())
        .await
        .unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn signed_amount_statements_skip_their_header() {
    let app = spawn_app();
    let job_id = app
        .state
        .producer
        .enqueue_ingestion(
            "u1",
            "generic.csv",
            "Date,Description,Amount\n2024-02-01,NETFLIX,-15.99\n2024-02-02,REFUND,20.00\n"
                .to_string(),
            StatementFormat::SignedAmount,
        )
        .await
        .unwrap();
    app.drain().await;

    let job = app.job(&job_id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.total_transactions, Some(2));
    assert_eq!(job.balance, None);
    assert!(app.owners().balance("u1").await.unwrap().is_none());
}

#[tokio::test]
async fn worker_pool_drains_queue_and_stops_on_shutdown() {
    let app = spawn_app();
    let shutdown = CancellationToken::new();
    let mut pool = WorkerPool::new(app.worker.clone(), shutdown.clone());
    pool.spawn_consumer(app.queue.clone()).await.unwrap();
    assert_eq!(pool.len(), 1);

    let job_id = app.enqueue("u1", SAMPLE_STATEMENT).await;

    let completed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if app.job(&job_id).await.status == JobStatus::Completed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(completed.is_ok(), "job should complete while the pool runs");

    pool.shutdown();
    tokio::time::timeout(Duration::from_secs(5), pool.join())
        .await
        .expect("pool should stop after shutdown");
    assert_eq!(app.transport.in_flight_len(), 0);
}

#[tokio::test]
async fn pool_start_requeues_stranded_deliveries() {
    let app = spawn_app();
    let job_id = app.enqueue("u1", SAMPLE_STATEMENT).await;

    // A consumer that died after receiving leaves the task in flight.
    let stranded = app
        .transport
        .receive(Duration::from_millis(10))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stranded.attempt, 1);
    assert_eq!(app.transport.in_flight_len(), 1);

    let shutdown = CancellationToken::new();
    let mut pool = WorkerPool::new(app.worker.clone(), shutdown.clone());
    pool.spawn_consumer(app.queue.clone()).await.unwrap();

    let completed = tokio::time::timeout(Duration::from_secs(5), async {
        while app.job(&job_id).await.status != JobStatus::Completed {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(completed.is_ok());

    pool.shutdown();
    pool.join().await;
}
