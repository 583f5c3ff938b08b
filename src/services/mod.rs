pub mod engine;
pub mod job_store;
pub mod launcher;
pub mod publisher;
pub mod recommender;
pub mod storage;
pub mod worker;
