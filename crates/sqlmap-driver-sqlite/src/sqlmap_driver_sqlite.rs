//! SQLite database driver implementation

mod connection;
mod driver;

pub use connection::SqliteConnection;
pub use driver::{SQLITE_URL_PREFIX, SqliteDriver};
