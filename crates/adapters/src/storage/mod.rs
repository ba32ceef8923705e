mod redb_score_store;

pub use redb_score_store::RedbScoreStore;
