mod connection;
mod driver;

pub use connection::{Connection, DataAdapter, FillAdapter, RowCursor};
pub use driver::DriverFactory;

pub(crate) use connection::OpenConnection;
