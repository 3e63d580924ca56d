pub mod build_engine;
pub mod corpus_store;
pub mod embedding_cache;
pub mod fetcher;
pub mod nn_index;
pub mod search_engine;
pub mod types;
