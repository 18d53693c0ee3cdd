#[cfg(test)]
mod tests {
    use crate::{
        pg_store, reset_postgres_tables,
        utils::{
            POSTED_AFTER, SKU, TempStore, fast_settings, harvester, mock_first_page, mock_pages,
            mock_token, refund_page,
        },
    };
    use chrono::{DateTime, TimeZone, Utc};
    use connectors::{
        source::http::DEFAULT_EVENTS_PATH,
        store::{CheckpointStore, PeriodTotalStore},
    };
    use engine_core::error::HarvestError;
    use model::{
        checkpoint::{CheckpointKey, CheckpointStatus},
        core::window::Period,
        harvest::HarvestRequest,
        pagination::cursor::Cursor,
    };
    use mockito::{Matcher, Server};
    use rust_decimal::Decimal;
    use std::time::{Duration, Instant};
    use tracing_test::traced_test;

    fn window_end() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 30, 23, 59, 59).unwrap()
    }

    fn request() -> HarvestRequest {
        HarvestRequest::new(Utc.with_ymd_and_hms(2025, 11, 1, 0, 0, 0).unwrap(), window_end())
            .with_scope(SKU)
    }

    fn key() -> CheckpointKey {
        CheckpointKey::from(&request().window().unwrap())
    }

    fn november() -> Period {
        Period {
            year: 2025,
            month: 11,
        }
    }

    // Scenario: three pages, one Principal refund of -10.00 each, no cursor on page 3.
    // Expected Outcome: total 30.00, checkpoint COMPLETED after 3 pages, total propagated.
    #[traced_test]
    #[tokio::test]
    async fn three_refund_pages_complete_the_window() {
        let mut server = Server::new_async().await;
        let token = mock_token(&mut server).await;
        let pages = mock_pages(&mut server, 3).await;
        let first = mock_first_page(&mut server, 3).await;
        let temp = TempStore::new();

        let report = harvester(&server.url(), temp.store.clone(), fast_settings())
            .harvest_range(&request())
            .await
            .unwrap();

        assert_eq!(report.total_amount, Decimal::new(3000, 2));
        assert_eq!(report.pages_processed, 3);
        assert!(report.completed);

        let stored = temp.store.load(&key()).await.unwrap().unwrap();
        assert_eq!(stored.status, CheckpointStatus::Completed);
        assert_eq!(stored.cursor, None);
        assert_eq!(stored.pages_processed, 3);
        assert_eq!(
            temp.store.load_total(SKU, november()).await.unwrap(),
            Some(Decimal::new(3000, 2))
        );

        token.assert_async().await;
        first.assert_async().await;
        for page in pages {
            page.assert_async().await;
        }
    }

    // Scenario: the first attempt of page 1 is answered 429 with Retry-After: 5.
    // Expected Outcome: at least 5 s pass before the retry and page 1 still counts.
    #[tokio::test]
    async fn retry_after_is_honored_and_page_still_counts() {
        let mut server = Server::new_async().await;
        mock_token(&mut server).await;
        mock_pages(&mut server, 3).await;
        let throttled = server
            .mock("GET", DEFAULT_EVENTS_PATH)
            .match_query(Matcher::UrlEncoded("PostedAfter".into(), POSTED_AFTER.into()))
            .with_status(429)
            .with_header("Retry-After", "5")
            .expect(1)
            .create_async()
            .await;
        let first = mock_first_page(&mut server, 3).await;
        let temp = TempStore::new();

        let started = Instant::now();
        let report = harvester(&server.url(), temp.store.clone(), fast_settings())
            .harvest_range(&request())
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_secs(5));
        assert_eq!(report.total_amount, Decimal::new(3000, 2));
        assert_eq!(report.pages_processed, 3);
        assert!(report.completed);
        throttled.assert_async().await;
        first.assert_async().await;
    }

    // Scenario: the token endpoint rejects the refresh credential.
    // Expected Outcome: authentication error, no events request, no checkpoint row.
    #[tokio::test]
    async fn rejected_token_touches_no_checkpoint() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/auth/o2/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;
        let events = server
            .mock("GET", DEFAULT_EVENTS_PATH)
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;
        let temp = TempStore::new();

        let result = harvester(&server.url(), temp.store.clone(), fast_settings())
            .harvest(&request())
            .await;

        assert!(matches!(result, Err(HarvestError::Auth(_))));
        assert!(temp.store.load(&key()).await.unwrap().is_none());
        events.assert_async().await;
    }

    // Scenario: page 2 fails with HTTP 500 once; the window is harvested again.
    // Expected Outcome: first run stops IN_PROGRESS with the error recorded, the
    // second resumes at page 2, clears the error and completes without recounting.
    #[tokio::test]
    async fn server_error_stops_run_and_next_run_resumes() {
        let mut server = Server::new_async().await;
        mock_token(&mut server).await;
        let failing = server
            .mock("GET", DEFAULT_EVENTS_PATH)
            .match_query(Matcher::UrlEncoded("NextToken".into(), "page-1".into()))
            .with_status(500)
            .with_body("upstream unavailable")
            .expect(1)
            .create_async()
            .await;
        mock_pages(&mut server, 3).await;
        mock_first_page(&mut server, 3).await;
        let temp = TempStore::new();

        let first = harvester(&server.url(), temp.store.clone(), fast_settings())
            .harvest_range(&request())
            .await
            .unwrap();

        assert!(!first.completed);
        assert_eq!(first.total_amount, Decimal::new(1000, 2));
        let stored = temp.store.load(&key()).await.unwrap().unwrap();
        assert_eq!(stored.status, CheckpointStatus::InProgress);
        assert_eq!(stored.cursor, Some(Cursor::from("page-1")));
        assert!(stored.last_error.as_deref().unwrap().contains("500"));
        failing.assert_async().await;

        let second = harvester(&server.url(), temp.store.clone(), fast_settings())
            .harvest_range(&request())
            .await
            .unwrap();

        assert!(second.completed);
        assert_eq!(second.total_amount, Decimal::new(3000, 2));
        assert_eq!(second.pages_processed, 3);
        let stored = temp.store.load(&key()).await.unwrap().unwrap();
        assert_eq!(stored.last_error, None);
    }

    // Scenario: every page request is throttled without a hint.
    // Expected Outcome: the run gives up after the retry ceiling instead of hanging.
    #[tokio::test]
    async fn persistent_throttling_ends_softly() {
        let mut server = Server::new_async().await;
        mock_token(&mut server).await;
        let throttled = server
            .mock("GET", DEFAULT_EVENTS_PATH)
            .match_query(Matcher::Any)
            .with_status(429)
            .expect(4)
            .create_async()
            .await;
        let temp = TempStore::new();

        let report = harvester(&server.url(), temp.store.clone(), fast_settings())
            .harvest_range(&request())
            .await
            .unwrap();

        assert!(!report.completed);
        assert_eq!(report.pages_processed, 0);
        let stored = temp.store.load(&key()).await.unwrap().unwrap();
        assert_eq!(stored.status, CheckpointStatus::InProgress);
        assert!(stored.last_error.is_some());
        throttled.assert_async().await;
    }

    // Scenario: a completed window is requested again.
    // Expected Outcome: the stored total is reported without any events request.
    #[tokio::test]
    async fn completed_window_is_not_fetched_again() {
        let mut server = Server::new_async().await;
        mock_token(&mut server).await;
        mock_pages(&mut server, 2).await;
        let first = mock_first_page(&mut server, 2).await;
        let temp = TempStore::new();

        let harvester = harvester(&server.url(), temp.store.clone(), fast_settings());
        let initial = harvester.harvest(&request()).await.unwrap();
        let repeat = harvester.harvest(&request()).await.unwrap();

        assert_eq!(initial, repeat);
        assert_eq!(repeat.total_amount, Decimal::new(2000, 2));
        first.assert_async().await;
    }

    // Scenario: the window only contains refunds for another SKU.
    // Expected Outcome: completed with a zero total and no downstream row.
    #[tokio::test]
    async fn zero_total_is_not_propagated() {
        let mut server = Server::new_async().await;
        mock_token(&mut server).await;
        server
            .mock("GET", DEFAULT_EVENTS_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(refund_page("SKU-OTHER", "-25.00", None))
            .create_async()
            .await;
        let temp = TempStore::new();

        let report = harvester(&server.url(), temp.store.clone(), fast_settings())
            .harvest_range(&request())
            .await
            .unwrap();

        assert!(report.completed);
        assert_eq!(report.total_amount, Decimal::ZERO);
        assert_eq!(temp.store.load_total(SKU, november()).await.unwrap(), None);
    }

    // Scenario: same as the three-page harvest, persisted in PostgreSQL.
    // Expected Outcome: one COMPLETED row and one period total row.
    #[tokio::test]
    #[ignore = "requires a local PostgreSQL database"]
    async fn three_refund_pages_complete_the_window_in_postgres() {
        reset_postgres_tables().await;
        let mut server = Server::new_async().await;
        mock_token(&mut server).await;
        mock_pages(&mut server, 3).await;
        mock_first_page(&mut server, 3).await;
        let store = pg_store().await;

        let report = harvester(&server.url(), store.clone(), fast_settings())
            .harvest_range(&request())
            .await
            .unwrap();

        assert_eq!(report.total_amount, Decimal::new(3000, 2));
        let stored = store.load(&key()).await.unwrap().unwrap();
        assert_eq!(stored.status, CheckpointStatus::Completed);
        assert_eq!(
            store.load_total(SKU, november()).await.unwrap(),
            Some(Decimal::new(3000, 2))
        );
    }
}
