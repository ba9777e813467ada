mod articles;
mod entities;
mod schema;
mod types;

pub use articles::MAX_LIST_LIMIT;
pub use schema::Store;
pub use types::{
    Article, ArticleQuery, CandidateEntity, EntityQuery, EntityRecord, InsertOutcome, NewArticle,
    StoreError,
};
