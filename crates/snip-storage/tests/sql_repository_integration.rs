use std::time::Duration;

use jiff::Timestamp;
use snip_core::{Deadline, ShortCode, UrlRecord};
use snip_storage::{Repository, SqlRepository, StorageError};
use sqlx::any::AnyPoolOptions;

struct Fixture {
    repo: SqlRepository,
}

impl Fixture {
    async fn start() -> Self {
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .expect("open sqlite");

        Self {
            repo: SqlRepository::new(pool).await.expect("create schema"),
        }
    }
}

fn code(value: &str) -> ShortCode {
    ShortCode::new_unchecked(value)
}

fn deadline() -> Deadline {
    Deadline::after(Duration::from_secs(10))
}

fn record(url: &str, owner: Option<&str>) -> UrlRecord {
    UrlRecord::new(url, owner)
}

#[tokio::test]
async fn save_and_get_record() {
    let fixture = Fixture::start().await;
    let short_code = code("abc123");
    let saved = record("https://example.com", Some("alice"));

    fixture
        .repo
        .save(&deadline(), &short_code, saved.clone())
        .await
        .unwrap();

    let got = fixture.repo.get(&deadline(), &short_code).await.unwrap().unwrap();
    assert_eq!(got.long_url, "https://example.com");
    assert_eq!(got.owner.as_deref(), Some("alice"));
    assert_eq!(
        got.created_at.as_millisecond(),
        saved.created_at.as_millisecond()
    );
}

#[tokio::test]
async fn get_returns_none_for_unknown_code() {
    let fixture = Fixture::start().await;

    let got = fixture.repo.get(&deadline(), &code("zzzzzzzz")).await.unwrap();
    assert!(got.is_none());
}

#[tokio::test]
async fn migration_is_idempotent() {
    let fixture = Fixture::start().await;
    fixture
        .repo
        .save(&deadline(), &code("abc"), record("https://example.com", None))
        .await
        .unwrap();

    fixture.repo.migrate().await.unwrap();

    assert!(fixture.repo.get(&deadline(), &code("abc")).await.unwrap().is_some());
}

#[tokio::test]
async fn identical_resave_is_a_silent_no_op() {
    let fixture = Fixture::start().await;
    let short_code = code("abc123");

    fixture
        .repo
        .save(&deadline(), &short_code, record("https://example.com", None))
        .await
        .unwrap();
    fixture
        .repo
        .save(&deadline(), &short_code, record("https://example.com", Some("")))
        .await
        .unwrap();

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM short_urls")
        .fetch_one(fixture.repo.pool())
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn save_conflicts_when_code_holds_another_url() {
    let fixture = Fixture::start().await;
    let short_code = code("abc123");

    fixture
        .repo
        .save(&deadline(), &short_code, record("https://one.example", None))
        .await
        .unwrap();

    let err = fixture
        .repo
        .save(&deadline(), &short_code, record("https://two.example", None))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict(_)));

    let got = fixture.repo.get(&deadline(), &short_code).await.unwrap().unwrap();
    assert_eq!(got.long_url, "https://one.example");
}

#[tokio::test]
async fn second_code_for_same_owner_and_url_conflicts() {
    let fixture = Fixture::start().await;

    fixture
        .repo
        .save(&deadline(), &code("first"), record("https://example.com", Some("alice")))
        .await
        .unwrap();

    let err = fixture
        .repo
        .save(&deadline(), &code("second"), record("https://example.com", Some("alice")))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict(_)));
    assert!(fixture.repo.get(&deadline(), &code("second")).await.unwrap().is_none());
}

#[tokio::test]
async fn find_by_long_url_is_keyed_by_owner() {
    let fixture = Fixture::start().await;

    fixture
        .repo
        .save(&deadline(), &code("anon"), record("https://example.com", None))
        .await
        .unwrap();
    fixture
        .repo
        .save(&deadline(), &code("bobs"), record("https://example.com", Some("bob")))
        .await
        .unwrap();

    let anonymous = fixture
        .repo
        .find_by_long_url(&deadline(), "https://example.com", None)
        .await
        .unwrap();
    assert_eq!(anonymous, Some(code("anon")));

    let bob = fixture
        .repo
        .find_by_long_url(&deadline(), "https://example.com", Some("bob"))
        .await
        .unwrap();
    assert_eq!(bob, Some(code("bobs")));

    let carol = fixture
        .repo
        .find_by_long_url(&deadline(), "https://example.com", Some("carol"))
        .await
        .unwrap();
    assert_eq!(carol, None);
}

#[tokio::test]
async fn legacy_rows_keep_their_timestamp() {
    let fixture = Fixture::start().await;
    let created_at = Timestamp::from_second(1_700_000_000).unwrap();

    fixture
        .repo
        .save(
            &deadline(),
            &code("legacy"),
            UrlRecord {
                long_url: "https://example.com".to_string(),
                owner: None,
                created_at,
            },
        )
        .await
        .unwrap();

    let got = fixture.repo.get(&deadline(), &code("legacy")).await.unwrap().unwrap();
    assert_eq!(got.created_at, created_at);
}

#[tokio::test]
async fn expired_deadline_is_canceled() {
    let fixture = Fixture::start().await;
    let expired = Deadline::after(Duration::ZERO);

    let err = fixture
        .repo
        .save(&expired, &code("abc"), record("https://example.com", None))
        .await
        .unwrap_err();
    assert_eq!(err, StorageError::Canceled);

    assert!(fixture.repo.get(&deadline(), &code("abc")).await.unwrap().is_none());
}

#[tokio::test]
async fn operations_fail_after_close() {
    let fixture = Fixture::start().await;

    fixture.repo.close().await.unwrap();
    fixture.repo.close().await.unwrap();

    assert_eq!(
        fixture.repo.get(&deadline(), &code("abc")).await.unwrap_err(),
        StorageError::Closed
    );
    assert_eq!(
        fixture
            .repo
            .save(&deadline(), &code("abc"), record("https://example.com", None))
            .await
            .unwrap_err(),
        StorageError::Closed
    );
}

#[tokio::test]
async fn list_by_owner_is_oldest_first() {
    let fixture = Fixture::start().await;
    let at = |second| Timestamp::from_second(second).unwrap();
    let owned = |url: &str, owner: &str, created_at| UrlRecord {
        long_url: url.to_string(),
        owner: Some(owner.to_string()),
        created_at,
    };

    fixture
        .repo
        .save(&deadline(), &code("newer"), owned("https://b.example", "alice", at(2_000)))
        .await
        .unwrap();
    fixture
        .repo
        .save(&deadline(), &code("older"), owned("https://a.example", "alice", at(1_000)))
        .await
        .unwrap();
    fixture
        .repo
        .save(&deadline(), &code("bobs"), owned("https://a.example", "bob", at(1_500)))
        .await
        .unwrap();

    let listed = fixture.repo.list_by_owner(&deadline(), "alice").await.unwrap();
    let codes: Vec<&str> = listed.iter().map(|m| m.code.as_str()).collect();
    assert_eq!(codes, ["older", "newer"]);
    assert_eq!(listed[0].record.owner.as_deref(), Some("alice"));
    assert_eq!(listed[0].record.created_at, at(1_000));

    let err = fixture.repo.list_by_owner(&deadline(), "").await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidInput(_)));
}

#[tokio::test]
async fn ping_checks_the_connection() {
    let fixture = Fixture::start().await;

    fixture.repo.ping(&deadline()).await.unwrap();
    fixture.repo.close().await.unwrap();
    assert_eq!(
        fixture.repo.ping(&deadline()).await.unwrap_err(),
        StorageError::Closed
    );
}
