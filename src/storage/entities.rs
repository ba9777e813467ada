use sqlx::QueryBuilder;

use super::articles::MAX_LIST_LIMIT;
use super::schema::Store;
use super::types::{CandidateEntity, EntityQuery, EntityRecord, StoreError};

const ENTITY_SELECT: &str = "SELECT e.id, e.name, e.type, e.article_id, \
     a.title AS article_title, a.url AS article_url, a.date AS article_date \
     FROM entities e JOIN articles a ON a.id = e.article_id";

impl Store {
    /// Attach `entities` to an existing article, all or nothing.
    ///
    /// Returns the number of rows written. Fails (writing nothing) if
    /// `article_id` does not reference a stored article.
    pub async fn insert_entities(
        &self,
        article_id: i64,
        entities: &[CandidateEntity],
    ) -> Result<usize, StoreError> {
        if entities.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(StoreError::from_sqlx)?;

        // 3 binds per row keeps each batch far below SQLite's parameter limit
        const BATCH_SIZE: usize = 100;
        let mut written = 0;

        for chunk in entities.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> =
                QueryBuilder::new("INSERT INTO entities (name, type, article_id) ");
            builder.push_values(chunk, |mut b, entity| {
                b.push_bind(&entity.name)
                    .push_bind(&entity.entity_type)
                    .push_bind(article_id);
            });
            let result = builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(StoreError::from_sqlx)?;
            written += result.rows_affected() as usize;
        }

        tx.commit().await.map_err(StoreError::from_sqlx)?;
        Ok(written)
    }

    /// Entities joined with their article's title, URL and date, newest
    /// article first (undated articles last).
    pub async fn list_entities(&self, query: &EntityQuery) -> Result<Vec<EntityRecord>, StoreError> {
        let limit = query.limit.clamp(1, MAX_LIST_LIMIT);

        let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(ENTITY_SELECT);
        if let Some(entity_type) = &query.entity_type {
            builder.push(" WHERE e.type = ");
            builder.push_bind(entity_type);
        }
        builder.push(" ORDER BY a.date IS NULL, a.date DESC, e.id DESC LIMIT ");
        builder.push_bind(limit);

        builder
            .build_query_as::<EntityRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)
    }

    pub async fn entities_for_article(&self, article_id: i64) -> Result<Vec<EntityRecord>, StoreError> {
        let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(ENTITY_SELECT);
        builder.push(" WHERE e.article_id = ");
        builder.push_bind(article_id);
        builder.push(" ORDER BY e.id");

        builder
            .build_query_as::<EntityRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)
    }

    pub async fn count_entities(&self) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM entities")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InsertOutcome, NewArticle};

    async fn store_with_article() -> (Store, i64) {
        let store = Store::open(":memory:").await.unwrap();
        let outcome = store
            .try_insert_article(&NewArticle {
                source: "DOJ".to_string(),
                title: "Two Charged".to_string(),
                url: "https://www.justice.gov/opa/pr/two-charged".to_string(),
                published_at: Some("2025-01-14".to_string()),
                content: "Maria Lopez and Peter Vance were charged.".to_string(),
            })
            .await
            .unwrap();
        match outcome {
            InsertOutcome::Inserted(id) => (store, id),
            InsertOutcome::AlreadyExists => panic!("fresh store reported duplicate"),
        }
    }

    #[tokio::test]
    async fn test_insert_entities_and_join() {
        let (store, id) = store_with_article().await;
        let written = store
            .insert_entities(
                id,
                &[
                    CandidateEntity::new("Maria Lopez", "Person/Org"),
                    CandidateEntity::new("Peter Vance", "Person/Org"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(written, 2);

        let records = store.entities_for_article(id).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "Maria Lopez");
        assert_eq!(records[0].article_title, "Two Charged");
        assert_eq!(records[0].article_url, "https://www.justice.gov/opa/pr/two-charged");
        assert_eq!(records[0].article_date.as_deref(), Some("2025-01-14"));
    }

    #[tokio::test]
    async fn test_insert_empty_is_noop() {
        let (store, id) = store_with_article().await;
        assert_eq!(store.insert_entities(id, &[]).await.unwrap(), 0);
        assert_eq!(store.count_entities().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_insert_for_unknown_article_writes_nothing() {
        let (store, _) = store_with_article().await;
        let result = store
            .insert_entities(9999, &[CandidateEntity::new("Ghost Name", "Person/Org")])
            .await;
        assert!(result.is_err());
        assert_eq!(store.count_entities().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_entities_filters_by_type_newest_first() {
        let (store, id) = store_with_article().await;
        store
            .insert_entities(
                id,
                &[
                    CandidateEntity::new("Maria Lopez", "PERSON"),
                    CandidateEntity::new("Acme Corp", "ORG"),
                    CandidateEntity::new("Peter Vance", "PERSON"),
                ],
            )
            .await
            .unwrap();

        let people = store
            .list_entities(&EntityQuery {
                entity_type: Some("PERSON".to_string()),
                limit: 50,
            })
            .await
            .unwrap();
        let names: Vec<_> = people.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["Peter Vance", "Maria Lopez"]);

        let limited = store
            .list_entities(&EntityQuery {
                entity_type: None,
                limit: 1,
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }
}
