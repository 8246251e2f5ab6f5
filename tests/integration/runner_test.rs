//! End-to-end query runner tests.
//!
//! Drives `QueryRunner` against `MockQueryService` through the submit, poll
//! and pagination paths.

use std::sync::Arc;
use std::time::Duration;

use bq_stats::bigquery::{
    JobReference, MockQueryService, QueryService, ServiceCall, TableRow, TableSchema,
};
use bq_stats::runner::{Parameter, QueryRunner, Record, RetryPolicy};
use bq_stats::StatsError;
use serde_json::{json, Value};
use tokio::time::Instant;

fn job() -> JobReference {
    JobReference::new("listenbrainz", "job_stats_1")
}

fn artist_schema() -> TableSchema {
    TableSchema::from_names(["artist", "count"])
}

fn artist_row(artist: &str, count: i64) -> TableRow {
    TableRow::new([json!(artist), json!(count)])
}

fn fast_runner(mock: &Arc<MockQueryService>) -> QueryRunner {
    QueryRunner::new(mock.clone(), "listenbrainz", "listenbrainz_stats")
        .with_retry_policy(RetryPolicy::fixed(Duration::ZERO))
}

fn as_json(records: &[Record]) -> Value {
    serde_json::to_value(records).unwrap()
}

#[tokio::test]
async fn test_complete_on_submit_returns_records() {
    let mock = Arc::new(MockQueryService::new().with_submit_response(Ok(
        MockQueryService::page(
            &job(),
            &artist_schema(),
            vec![artist_row("A", 1), artist_row("B", 2)],
            None,
        ),
    )));

    let records = fast_runner(&mock)
        .run_query("SELECT artist, count FROM top_artists", None)
        .await
        .unwrap();

    assert_eq!(
        as_json(&records),
        json!([{"artist": "A", "count": 1}, {"artist": "B", "count": 2}])
    );
    assert_eq!(mock.submit_count(), 1);
    assert_eq!(mock.poll_count(), 0);
    assert!(mock.results_fetches().is_empty());
}

#[tokio::test]
async fn test_incomplete_submit_polls_until_done() {
    let mock = Arc::new(
        MockQueryService::new()
            .with_submit_response(Ok(MockQueryService::incomplete(&job())))
            .with_job_response(Ok(MockQueryService::job_state("RUNNING")))
            .with_job_response(Ok(MockQueryService::job_state("DONE")))
            .with_results_response(Ok(MockQueryService::page(
                &job(),
                &artist_schema(),
                vec![artist_row("A", 1)],
                None,
            ))),
    );

    let records = fast_runner(&mock)
        .run_query("SELECT artist, count FROM top_artists", None)
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(mock.poll_count(), 2);
    assert_eq!(mock.results_fetches(), vec![None]);

    // Submit, two polls, one results fetch, nothing else.
    let calls = mock.calls();
    assert_eq!(calls.len(), 4);
    assert!(matches!(calls[0], ServiceCall::SubmitQuery { .. }));
    assert_eq!(calls[1], ServiceCall::GetJob(job()));
    assert_eq!(calls[2], ServiceCall::GetJob(job()));
    assert_eq!(
        calls[3],
        ServiceCall::GetQueryResults {
            job: job(),
            page_token: None
        }
    );
}

#[tokio::test]
async fn test_two_pages_are_concatenated_in_order() {
    let mock = Arc::new(
        MockQueryService::new()
            .with_submit_response(Ok(MockQueryService::page(
                &job(),
                &artist_schema(),
                vec![artist_row("A", 1), artist_row("B", 2)],
                Some("T1"),
            )))
            .with_results_response(Ok(MockQueryService::page(
                &job(),
                &artist_schema(),
                vec![artist_row("C", 3)],
                None,
            ))),
    );

    let records = fast_runner(&mock)
        .run_query("SELECT artist, count FROM top_artists", None)
        .await
        .unwrap();

    assert_eq!(mock.results_fetches(), vec![Some("T1".to_string())]);
    assert_eq!(
        as_json(&records),
        json!([
            {"artist": "A", "count": 1},
            {"artist": "B", "count": 2},
            {"artist": "C", "count": 3}
        ])
    );
}

#[tokio::test(start_paused = true)]
async fn test_transient_poll_error_retries_same_job() {
    let mock = Arc::new(
        MockQueryService::new()
            .with_submit_response(Ok(MockQueryService::incomplete(&job())))
            .with_job_response(Err(StatsError::transport("503 Service Unavailable")))
            .with_job_response(Ok(MockQueryService::job_state("DONE")))
            .with_results_response(Ok(MockQueryService::page(
                &job(),
                &artist_schema(),
                vec![artist_row("A", 1)],
                None,
            ))),
    );
    let runner = QueryRunner::new(mock.clone(), "listenbrainz", "listenbrainz_stats");

    let start = Instant::now();
    let records = runner
        .run_query("SELECT artist, count FROM top_artists", None)
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(mock.submit_count(), 1);
    assert_eq!(mock.poll_count(), 2);
    let polled: Vec<ServiceCall> = mock
        .calls()
        .into_iter()
        .filter(|c| matches!(c, ServiceCall::GetJob(_)))
        .collect();
    assert_eq!(
        polled,
        vec![ServiceCall::GetJob(job()), ServiceCall::GetJob(job())]
    );

    // The default policy waits the fixed 5 second interval before retrying.
    let waited = start.elapsed();
    assert!(waited >= Duration::from_secs(5) && waited < Duration::from_secs(6));
}

#[tokio::test(start_paused = true)]
async fn test_running_job_is_polled_at_fixed_interval() {
    let mock = Arc::new(
        MockQueryService::new()
            .with_submit_response(Ok(MockQueryService::incomplete(&job())))
            .with_job_response(Ok(MockQueryService::job_state("PENDING")))
            .with_job_response(Ok(MockQueryService::job_state("RUNNING")))
            .with_job_response(Ok(MockQueryService::job_state("DONE")))
            .with_results_response(Ok(MockQueryService::page(
                &job(),
                &artist_schema(),
                vec![],
                None,
            ))),
    );
    let runner = QueryRunner::new(mock.clone(), "listenbrainz", "listenbrainz_stats");

    let start = Instant::now();
    let records = runner.run_query("SELECT 1", None).await.unwrap();

    assert!(records.is_empty());
    assert_eq!(mock.poll_count(), 3);
    let waited = start.elapsed();
    assert!(waited >= Duration::from_secs(10) && waited < Duration::from_secs(11));
}

#[tokio::test]
async fn test_transient_page_error_retries_same_token() {
    let mock = Arc::new(
        MockQueryService::new()
            .with_submit_response(Ok(MockQueryService::page(
                &job(),
                &artist_schema(),
                vec![artist_row("A", 1)],
                Some("T1"),
            )))
            .with_results_response(Err(StatsError::transport("connection reset")))
            .with_results_response(Err(StatsError::transport("connection reset")))
            .with_results_response(Ok(MockQueryService::page(
                &job(),
                &artist_schema(),
                vec![artist_row("B", 2)],
                Some("T2"),
            )))
            .with_results_response(Ok(MockQueryService::page(
                &job(),
                &artist_schema(),
                vec![artist_row("C", 3)],
                None,
            ))),
    );

    let records = fast_runner(&mock).run_query("SELECT 1", None).await.unwrap();

    let artists: Vec<&str> = records.iter().filter_map(|r| r.get_str("artist")).collect();
    assert_eq!(artists, vec!["A", "B", "C"]);
    assert_eq!(
        mock.results_fetches(),
        vec![
            Some("T1".to_string()),
            Some("T1".to_string()),
            Some("T1".to_string()),
            Some("T2".to_string()),
        ]
    );
    assert_eq!(mock.submit_count(), 1);
}

#[tokio::test]
async fn test_transient_first_page_error_is_retried() {
    let mock = Arc::new(
        MockQueryService::new()
            .with_submit_response(Ok(MockQueryService::incomplete(&job())))
            .with_job_response(Ok(MockQueryService::job_state("DONE")))
            .with_results_response(Err(StatsError::transport("502 Bad Gateway")))
            .with_results_response(Ok(MockQueryService::page(
                &job(),
                &artist_schema(),
                vec![artist_row("A", 1)],
                None,
            ))),
    );

    let records = fast_runner(&mock).run_query("SELECT 1", None).await.unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(mock.results_fetches(), vec![None, None]);
    assert_eq!(mock.poll_count(), 1);
}

#[tokio::test]
async fn test_bounded_page_retries_report_unreachable() {
    let mock = Arc::new(
        MockQueryService::new()
            .with_submit_response(Ok(MockQueryService::page(
                &job(),
                &artist_schema(),
                vec![artist_row("A", 1)],
                Some("T1"),
            )))
            .with_results_response(Err(StatsError::transport("timed out")))
            .with_results_response(Err(StatsError::transport("timed out"))),
    );
    let runner = QueryRunner::new(mock.clone(), "listenbrainz", "listenbrainz_stats")
        .with_retry_policy(RetryPolicy::fixed(Duration::ZERO).with_max_attempts(2));

    let err = runner.run_query("SELECT 1", None).await.unwrap_err();

    assert_eq!(err.category(), "Service Unreachable");
    assert!(err
        .to_string()
        .contains("fetching results page 2 of job job_stats_1"));
    assert_eq!(mock.results_fetches().len(), 2);
}

/// Runs the same rows split into differently sized pages.
async fn rows_for_chunking(chunks: &[&[(&str, i64)]]) -> Value {
    let mut mock = MockQueryService::new();
    for (i, chunk) in chunks.iter().enumerate() {
        let token = (i + 1 < chunks.len()).then(|| format!("T{}", i + 1));
        let rows = chunk.iter().map(|(a, c)| artist_row(a, *c)).collect();
        let page = MockQueryService::page(&job(), &artist_schema(), rows, token.as_deref());
        mock = if i == 0 {
            mock.with_submit_response(Ok(page))
        } else {
            mock.with_results_response(Ok(page))
        };
    }
    let mock = Arc::new(mock);

    let records = fast_runner(&mock).run_query("SELECT 1", None).await.unwrap();
    assert_eq!(mock.results_fetches().len(), chunks.len() - 1);
    as_json(&records)
}

#[tokio::test]
async fn test_page_chunking_does_not_change_order() {
    let a: &[(&str, i64)] = &[("A", 1)];
    let b: &[(&str, i64)] = &[("B", 2)];
    let c: &[(&str, i64)] = &[("C", 3)];
    let ab: &[(&str, i64)] = &[("A", 1), ("B", 2)];
    let abc: &[(&str, i64)] = &[("A", 1), ("B", 2), ("C", 3)];

    let split_three = rows_for_chunking(&[a, b, c]).await;
    let split_two = rows_for_chunking(&[ab, c]).await;
    let single = rows_for_chunking(&[abc]).await;

    assert_eq!(split_three, split_two);
    assert_eq!(split_two, single);
}

#[tokio::test]
async fn test_parameters_reach_the_service() {
    let mock = Arc::new(MockQueryService::new().with_submit_response(Ok(
        MockQueryService::page(&job(), &artist_schema(), vec![], None),
    )));
    let params = vec![
        Parameter::string("user_name", "rob"),
        Parameter::new("from_ts", "TIMESTAMP", "2017-01-01 00:00:00"),
    ];

    fast_runner(&mock)
        .run_query(
            "SELECT artist, count FROM listens WHERE user_name = @user_name",
            Some(&params[..]),
        )
        .await
        .unwrap();

    let calls = mock.calls();
    let ServiceCall::SubmitQuery { request, .. } = &calls[0] else {
        panic!("Expected SubmitQuery first");
    };
    let body = serde_json::to_value(request).unwrap();
    assert_eq!(
        body["queryParameters"],
        json!([
            {
                "name": "user_name",
                "parameterType": {"type": "STRING"},
                "parameterValue": {"value": "rob"}
            },
            {
                "name": "from_ts",
                "parameterType": {"type": "TIMESTAMP"},
                "parameterValue": {"value": "2017-01-01 00:00:00"}
            }
        ])
    );
    assert_eq!(body["useLegacySql"], json!(false));
    assert_eq!(
        body["defaultDataset"],
        json!({"projectId": "listenbrainz", "datasetId": "listenbrainz_stats"})
    );
}

#[tokio::test]
async fn test_runner_accepts_any_service_impl() {
    let service: Arc<dyn QueryService> = Arc::new(
        MockQueryService::new().with_submit_response(Ok(MockQueryService::page(
            &job(),
            &artist_schema(),
            vec![artist_row("A", 1)],
            None,
        ))),
    );
    let runner = QueryRunner::new(service, "listenbrainz", "listenbrainz_stats");

    let records = runner.run_query("SELECT 1", None).await.unwrap();
    assert_eq!(records[0].get("count"), Some(&json!(1)));
}
