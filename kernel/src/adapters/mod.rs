// Concrete store drivers.

#[cfg(feature = "sqlite")]
pub mod sqlite;
