//! Live BigQuery tests.
//!
//! These run real queries and skip themselves unless BIGQUERY_PROJECT_ID and
//! BIGQUERY_DATASET_ID are set.

use bq_stats::config::Config;
use bq_stats::runner::{self, Parameter, QueryRunner};
use serde_json::json;

/// Helper to build a runner from environment configuration.
async fn get_test_runner() -> Option<QueryRunner> {
    std::env::var("BIGQUERY_PROJECT_ID").ok()?;
    std::env::var("BIGQUERY_DATASET_ID").ok()?;

    let mut config = Config::default();
    config.bigquery.apply_env_defaults();
    runner::init(&config).await.ok()
}

#[tokio::test]
async fn test_live_select_literals() {
    let Some(runner) = get_test_runner().await else {
        eprintln!("Skipping test: BIGQUERY_PROJECT_ID not set");
        return;
    };

    let records = runner
        .run_query("SELECT 'Portishead' AS artist, 42 AS count", None)
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].get("artist"), Some(&json!("Portishead")));
    // BigQuery encodes INT64 cells as strings
    assert_eq!(records[0].get("count"), Some(&json!("42")));
}

#[tokio::test]
async fn test_live_named_parameters() {
    let Some(runner) = get_test_runner().await else {
        eprintln!("Skipping test: BIGQUERY_PROJECT_ID not set");
        return;
    };

    let params = [
        Parameter::string("user_name", "rob"),
        Parameter::int64("limit", 3),
    ];
    let records = runner
        .run_query(
            "SELECT @user_name AS user_name, n FROM UNNEST(GENERATE_ARRAY(1, @limit)) AS n ORDER BY n",
            Some(&params[..]),
        )
        .await
        .unwrap();

    assert_eq!(records.len(), 3);
    assert_eq!(records[0].get_str("user_name"), Some("rob"));
    let ns: Vec<&str> = records.iter().filter_map(|r| r.get_str("n")).collect();
    assert_eq!(ns, vec!["1", "2", "3"]);
}
