use super::support::{create_annotated_task, create_task, page, record, setup, ScriptedSource, CHAIN};
use crate::crawler::client::FetchError;
use crate::crawler::engine::{
    CrawlError, CrawlSettings, Crawler, DoneReason, PageOutcome, PassSummary, TaskOutcome,
};
use crate::db::{task, transaction};
use crate::registry::AddressRegistry;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const QUERY: &str = "http://x/?start={start}";

fn crawler(source: ScriptedSource, registry: AddressRegistry, workers: usize) -> Crawler<ScriptedSource> {
    Crawler::new(
        source,
        registry,
        CrawlSettings {
            fetch_delay: Duration::ZERO,
            workers,
        },
    )
}

#[tokio::test]
async fn crawls_until_pagination_stops_moving() {
    let registry = setup().await;
    let tracked = create_task(&registry, &[0xaa], QUERY).await;

    let body = page(vec![record("0xAA", "0xBB", "0x01", "100", "5")]);
    let source = ScriptedSource::new(vec![body.clone(), body]);
    let crawler = crawler(source.clone(), registry.clone(), 1);

    let outcome = crawler
        .crawl_task(tracked.clone(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, TaskOutcome::Done { last_block: 5, pages: 1 });
    assert_eq!(source.urls(), vec!["http://x/?start=0", "http://x/?start=5"]);

    let stored = task::get_task(registry.pool(), tracked.id).await.unwrap();
    assert!(!stored.enabled);
    assert_eq!(stored.last_block, 5);

    let aa = registry.resolve_address_ids(CHAIN, &[0xaa]).await.unwrap();
    let bb = registry.resolve_address_ids(CHAIN, &[0xbb]).await.unwrap();
    assert_eq!(aa.len(), 1);
    assert_eq!(bb.len(), 1);
    assert_eq!(registry.count_addresses().await.unwrap(), 2);

    let recorded = transaction::get_transaction(registry.pool(), CHAIN, &[0x01])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(recorded.amount, 100);
    assert_eq!(recorded.block_number, 5);
    assert_eq!(recorded.from, aa);
    assert_eq!(recorded.to, bb);
    assert_eq!(transaction::count_transactions(registry.pool()).await.unwrap(), 1);
}

#[tokio::test]
async fn null_or_empty_result_finishes_the_task() {
    for result in [Value::Null, json!([])] {
        let registry = setup().await;
        let mut tracked = create_task(&registry, &[0xaa], QUERY).await;
        let source = ScriptedSource::new(vec![json!({ "status": "0", "result": result })]);
        let crawler = crawler(source, registry.clone(), 1);

        let outcome = crawler.process_page(&mut tracked).await.unwrap();

        assert_eq!(
            outcome,
            PageOutcome::Done {
                last_block: 0,
                reason: DoneReason::EmptyPage
            }
        );
        assert!(!tracked.enabled);
        assert!(!task::get_task(registry.pool(), tracked.id).await.unwrap().enabled);
        assert_eq!(transaction::count_transactions(registry.pool()).await.unwrap(), 0);
    }
}

#[tokio::test]
async fn stalled_pagination_never_moves_the_watermark_back() {
    let registry = setup().await;
    let tracked = create_task(&registry, &[0xaa], QUERY).await;

    let source = ScriptedSource::new(vec![
        page(vec![
            record("0xAA", "0xBB", "0x01", "1", "5"),
            record("0xBB", "0xCC", "0x02", "2", "7"),
        ]),
        // The explorer ignores the cursor and serves older rows
        page(vec![record("0xAA", "0xDD", "0x03", "3", "3")]),
    ]);
    let crawler = crawler(source.clone(), registry.clone(), 1);

    let outcome = crawler
        .crawl_task(tracked.clone(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, TaskOutcome::Done { last_block: 7, pages: 1 });
    let stored = task::get_task(registry.pool(), tracked.id).await.unwrap();
    assert_eq!(stored.last_block, 7);
    assert!(!stored.enabled);
    // The terminal page is not recorded
    assert!(transaction::get_transaction(registry.pool(), CHAIN, &[0x03])
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn reprocessing_a_page_changes_nothing() {
    let registry = setup().await;
    let body = page(vec![
        record("0xAA", "0xBB", "0x01", "10", "5"),
        record("0xBB", "0xCC", "0x02", "20", "6"),
    ]);

    let mut first = create_task(&registry, &[0xaa], QUERY).await;
    let mut second = create_task(&registry, &[0xaa], QUERY).await;
    let source = ScriptedSource::new(vec![body.clone(), body]);
    let crawler = crawler(source, registry.clone(), 1);

    let PageOutcome::Continue(initial) = crawler.process_page(&mut first).await.unwrap() else {
        panic!("expected the first page to continue");
    };
    assert_eq!(initial.inserted, 2);
    assert_eq!(initial.new_addresses, 3);

    let addresses = registry.count_addresses().await.unwrap();
    let transactions = transaction::count_transactions(registry.pool()).await.unwrap();

    let PageOutcome::Continue(replayed) = crawler.process_page(&mut second).await.unwrap() else {
        panic!("expected the replayed page to continue");
    };
    assert_eq!(replayed.inserted, 0);
    assert_eq!(replayed.duplicates, 2);
    assert_eq!(replayed.new_addresses, 0);
    assert_eq!(replayed.last_block, 6);

    assert_eq!(registry.count_addresses().await.unwrap(), addresses);
    assert_eq!(
        transaction::count_transactions(registry.pool()).await.unwrap(),
        transactions
    );
}

#[tokio::test]
async fn malformed_records_are_skipped() {
    let registry = setup().await;
    let mut tracked = create_task(&registry, &[0xaa], QUERY).await;
    let source = ScriptedSource::new(vec![page(vec![
        record("0xAA", "0xBB", "0x01", "1", "4"),
        json!({ "from": "not-hex", "to": "0xBB", "hash": "0x02", "value": "1", "blockNumber": "9" }),
        json!({ "to": "0xBB", "hash": "0x03", "value": "1", "blockNumber": "9" }),
    ])]);
    let crawler = crawler(source, registry.clone(), 1);

    let PageOutcome::Continue(stats) = crawler.process_page(&mut tracked).await.unwrap() else {
        panic!("expected the page to continue");
    };

    assert_eq!(stats.inserted, 1);
    assert_eq!(stats.skipped, 2);
    // Skipped rows still carry readable block numbers
    assert_eq!(stats.last_block, 9);
    assert_eq!(tracked.last_block, 9);
    assert_eq!(transaction::count_transactions(registry.pool()).await.unwrap(), 1);
}

#[tokio::test]
async fn malformed_record_past_the_cursor_keeps_the_crawl_going() {
    let registry = setup().await;
    let created = create_task(&registry, &[0xaa], QUERY).await;
    task::advance(registry.pool(), created.id, 4).await.unwrap();
    let tracked = task::get_task(registry.pool(), created.id).await.unwrap();

    let source = ScriptedSource::new(vec![
        page(vec![
            record("0xAA", "0xBB", "0x01", "1", "4"),
            json!({ "from": "not-hex", "to": "0xBB", "hash": "0x09", "value": "1", "blockNumber": "9" }),
            record("0xBB", "0xAA", "0x02", "1", "4"),
        ]),
        page(vec![
            record("0xAA", "0xCC", "0x03", "1", "12"),
            record("0xCC", "0xAA", "0x04", "1", "13"),
        ]),
    ]);
    let crawler = crawler(source.clone(), registry.clone(), 1);

    let outcome = crawler
        .crawl_task(tracked.clone(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, TaskOutcome::Done { last_block: 13, pages: 2 });
    assert_eq!(
        source.urls(),
        vec!["http://x/?start=4", "http://x/?start=9", "http://x/?start=13"]
    );
    assert!(transaction::get_transaction(registry.pool(), CHAIN, &[0x04])
        .await
        .unwrap()
        .is_some());
    assert_eq!(transaction::count_transactions(registry.pool()).await.unwrap(), 4);
}

#[tokio::test]
async fn rows_sharing_the_cursor_block_are_recorded_before_finishing() {
    let registry = setup().await;
    let tracked = create_task(&registry, &[0xaa], QUERY).await;

    let source = ScriptedSource::new(vec![
        page(vec![
            record("0xAA", "0xBB", "0x01", "1", "3"),
            record("0xAA", "0xCC", "0x02", "1", "4"),
        ]),
        // Block 4 continues past the end of the first page
        page(vec![
            record("0xAA", "0xCC", "0x02", "1", "4"),
            record("0xAA", "0xDD", "0x03", "1", "4"),
            record("0xDD", "0xEE", "0x04", "1", "4"),
        ]),
    ]);
    let crawler = crawler(source.clone(), registry.clone(), 1);

    let outcome = crawler
        .crawl_task(tracked.clone(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, TaskOutcome::Done { last_block: 4, pages: 2 });
    assert_eq!(source.urls(), vec!["http://x/?start=0", "http://x/?start=4"]);
    assert_eq!(transaction::count_transactions(registry.pool()).await.unwrap(), 4);
    assert_eq!(registry.count_addresses().await.unwrap(), 5);

    let stored = task::get_task(registry.pool(), tracked.id).await.unwrap();
    assert!(!stored.enabled);
    assert_eq!(stored.last_block, 4);
}

#[tokio::test]
async fn single_echoed_row_finishes_without_recording() {
    let registry = setup().await;
    let created = create_task(&registry, &[0xaa], QUERY).await;
    task::advance(registry.pool(), created.id, 5).await.unwrap();
    let mut tracked = task::get_task(registry.pool(), created.id).await.unwrap();

    let source = ScriptedSource::new(vec![page(vec![record("0xAA", "0xBB", "0x01", "1", "5")])]);
    let crawler = crawler(source, registry.clone(), 1);

    let outcome = crawler.process_page(&mut tracked).await.unwrap();

    assert_eq!(
        outcome,
        PageOutcome::Done {
            last_block: 5,
            reason: DoneReason::EchoedCursor
        }
    );
    assert_eq!(transaction::count_transactions(registry.pool()).await.unwrap(), 0);
    assert!(!task::get_task(registry.pool(), tracked.id).await.unwrap().enabled);
}

#[tokio::test]
async fn repeated_hash_within_a_page_is_recorded_once() {
    let registry = setup().await;
    let mut tracked = create_task(&registry, &[0xaa], QUERY).await;
    let source = ScriptedSource::new(vec![page(vec![
        record("0xAA", "0xBB", "0x01", "1", "4"),
        record("0xAA", "0xCC", "0x01", "1", "4"),
    ])]);
    let crawler = crawler(source, registry.clone(), 1);

    let PageOutcome::Continue(stats) = crawler.process_page(&mut tracked).await.unwrap() else {
        panic!("expected the page to continue");
    };

    assert_eq!(stats.inserted, 1);
    assert_eq!(stats.duplicates, 1);
    assert_eq!(transaction::count_transactions(registry.pool()).await.unwrap(), 1);
}

#[tokio::test]
async fn contract_creation_has_no_recipient() {
    let registry = setup().await;
    let mut tracked = create_task(&registry, &[0xaa], QUERY).await;
    let source = ScriptedSource::new(vec![page(vec![record("0xAA", "", "0x0c", "0", "2")])]);
    let crawler = crawler(source, registry.clone(), 1);

    crawler.process_page(&mut tracked).await.unwrap();

    let recorded = transaction::get_transaction(registry.pool(), CHAIN, &[0x0c])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(recorded.from.len(), 1);
    assert!(recorded.to.is_empty());
}

#[tokio::test]
async fn fetch_failure_leaves_the_task_running() {
    let registry = setup().await;
    let tracked = create_task(&registry, &[0xaa], QUERY).await;
    task::advance(registry.pool(), tracked.id, 12).await.unwrap();
    let tracked = task::get_task(registry.pool(), tracked.id).await.unwrap();

    let source = ScriptedSource::default();
    source.push_error(FetchError::Status(503));
    let crawler = crawler(source, registry.clone(), 1);

    let err = crawler
        .crawl_task(tracked.clone(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CrawlError::Fetch {
            source: FetchError::Status(503),
            ..
        }
    ));
    let stored = task::get_task(registry.pool(), tracked.id).await.unwrap();
    assert!(stored.enabled);
    assert_eq!(stored.last_block, 12);
}

#[tokio::test]
async fn task_annotations_reach_the_tracked_address() {
    let registry = setup().await;
    let tag = registry.resolve_tag("exchange").await.unwrap();
    let service = registry.resolve_service("Binance").await.unwrap();
    let tracked = create_annotated_task(
        &registry,
        &[0xaa],
        QUERY,
        BTreeSet::from([tag]),
        BTreeSet::from([service]),
    )
    .await;

    let crawler = crawler(ScriptedSource::default(), registry.clone(), 1);
    crawler
        .crawl_task(tracked, &CancellationToken::new())
        .await
        .unwrap();

    let address = registry.find_address(CHAIN, &[0xaa]).await.unwrap().unwrap();
    assert_eq!(address.tags, BTreeSet::from([tag]));
    assert_eq!(address.services, BTreeSet::from([service]));
}

#[tokio::test]
async fn pass_runs_tasks_in_id_order_and_counts_failures() {
    let registry = setup().await;
    let first = create_task(&registry, &[0x01], "http://a/?start={start}").await;
    let second = create_task(&registry, &[0x02], "http://b/?start={start}").await;

    let source = ScriptedSource::default();
    source.push_body(page(vec![]));
    source.push_error(FetchError::Status(500));
    let crawler = crawler(source.clone(), registry.clone(), 1);

    let summary = crawler.run_pass(&CancellationToken::new()).await.unwrap();

    assert_eq!(
        summary,
        PassSummary {
            tasks: 2,
            completed: 1,
            interrupted: 0,
            failed: 1,
        }
    );
    assert_eq!(source.urls(), vec!["http://a/?start=0", "http://b/?start=0"]);
    assert!(!task::get_task(registry.pool(), first.id).await.unwrap().enabled);
    assert!(task::get_task(registry.pool(), second.id).await.unwrap().enabled);

    // Only the failed task is picked up again
    let retry = crawler.run_pass(&CancellationToken::new()).await.unwrap();
    assert_eq!(retry.tasks, 1);
    assert_eq!(retry.completed, 1);
}

#[tokio::test]
async fn pass_without_tasks_is_empty() {
    let registry = setup().await;
    let crawler = crawler(ScriptedSource::default(), registry, 1);

    let summary = crawler.run_pass(&CancellationToken::new()).await.unwrap();
    assert_eq!(summary, PassSummary::default());
}

#[tokio::test]
async fn worker_pool_drains_every_task() {
    let registry = setup().await;
    let mut ids = Vec::new();
    for byte in 0..6u8 {
        ids.push(create_task(&registry, &[byte], QUERY).await.id);
    }

    let crawler = crawler(ScriptedSource::default(), registry.clone(), 3);
    let summary = crawler.run_pass(&CancellationToken::new()).await.unwrap();

    assert_eq!(summary.tasks, 6);
    assert_eq!(summary.completed, 6);
    assert!(task::list_enabled(registry.pool()).await.unwrap().is_empty());
    for id in ids {
        assert!(!task::get_task(registry.pool(), id).await.unwrap().enabled);
    }
}

#[tokio::test]
async fn cancellation_stops_between_pages() {
    let registry = setup().await;
    let tracked = create_task(&registry, &[0xaa], QUERY).await;
    let source = ScriptedSource::new(vec![page(vec![record("0xAA", "0xBB", "0x01", "1", "5")])]);
    let crawler = crawler(source.clone(), registry.clone(), 1);

    let shutdown = CancellationToken::new();
    shutdown.cancel();

    let outcome = crawler.crawl_task(tracked.clone(), &shutdown).await.unwrap();
    assert_eq!(outcome, TaskOutcome::Interrupted { last_block: 0, pages: 0 });
    assert!(source.urls().is_empty());
    assert!(task::get_task(registry.pool(), tracked.id).await.unwrap().enabled);

    let summary = crawler.run_pass(&shutdown).await.unwrap();
    assert_eq!(summary.tasks, 0);
}
