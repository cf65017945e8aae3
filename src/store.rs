pub mod dao;
pub mod memory;
pub mod models;
pub mod persist;
pub mod postgres;

pub use dao::{SongDao, VocabularyDao};
pub use memory::InMemoryStore;
pub use models::{LyricLine, SaveReport, SongRecord, SongScope};
pub use persist::LexiconPersistence;
pub use postgres::PgStore;
