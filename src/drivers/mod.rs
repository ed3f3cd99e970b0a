#[cfg(feature = "sqlite")]
mod rusqlite;
#[cfg(feature = "postgres")]
mod tokio_postgres;

pub use self::in_memory_test::{
    InMemoryTestDriver, InMemoryTestResponseBuilder, RecordedCommand, TestResponse, TestTable,
};
#[cfg(feature = "sqlite")]
pub use self::rusqlite::RusqliteDriver;
#[cfg(feature = "postgres")]
pub use self::tokio_postgres::TokioPostgresDriver;
