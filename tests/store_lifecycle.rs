//! Integration tests for the persistence layer on a real database file:
//! durability across reopen, concurrent dedup, and entity joins.

use amlwatch::extract::CandidateEntity;
use amlwatch::storage::{ArticleQuery, EntityQuery, InsertOutcome, NewArticle, Store};

fn article(url: &str, date: &str) -> NewArticle {
    NewArticle {
        source: "FINTRAC".to_string(),
        title: format!("Notice {url}"),
        url: url.to_string(),
        published_at: Some(date.to_string()),
        content: "Penalty imposed on Northern Exchange".to_string(),
    }
}

#[tokio::test]
async fn test_articles_survive_reopen_and_stay_deduplicated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("amlwatch.db");
    let path = path.to_str().unwrap();

    let store = Store::open(path).await.unwrap();
    let id = match store
        .try_insert_article(&article("https://fintrac/1", "2025-02-01"))
        .await
        .unwrap()
    {
        InsertOutcome::Inserted(id) => id,
        InsertOutcome::AlreadyExists => panic!("fresh database reported duplicate"),
    };
    store
        .insert_entities(id, &[CandidateEntity::new("Northern Exchange", "Person/Org")])
        .await
        .unwrap();
    store.close().await;

    let store = Store::open(path).await.unwrap();
    assert_eq!(
        store
            .try_insert_article(&article("https://fintrac/1", "2025-02-01"))
            .await
            .unwrap(),
        InsertOutcome::AlreadyExists
    );
    assert_eq!(store.count_articles().await.unwrap(), 1);

    let entities = store.list_entities(&EntityQuery::default()).await.unwrap();
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0].article_url, "https://fintrac/1");
    store.close().await;
}

#[tokio::test]
async fn test_concurrent_distinct_and_duplicate_urls() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path().join("race.db").to_str().unwrap())
        .await
        .unwrap();

    // 4 distinct URLs, each submitted by 5 concurrent tasks
    let mut handles = Vec::new();
    for copy in 0..5 {
        for n in 0..4 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let outcome = store
                    .try_insert_article(&article(&format!("https://fintrac/{n}"), "2025-02-01"))
                    .await
                    .unwrap();
                (n, copy, outcome)
            }));
        }
    }

    let mut winners = [0usize; 4];
    for handle in handles {
        let (n, _copy, outcome) = handle.await.unwrap();
        if matches!(outcome, InsertOutcome::Inserted(_)) {
            winners[n] += 1;
        }
    }
    assert_eq!(winners, [1, 1, 1, 1]);
    assert_eq!(store.count_articles().await.unwrap(), 4);

    let listed = store
        .list_articles(&ArticleQuery {
            limit: 500,
            ..ArticleQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(listed.len(), 4);
    store.close().await;
}
