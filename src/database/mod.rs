// Database module
// LanceDB holds one table of embeddings per collection

pub mod lancedb;

pub use self::lancedb::{
    Collection, EmbeddingRecord, EmbeddingStore, SearchHit, SearchParams, SimilarityIndex,
    StoreClient,
};
