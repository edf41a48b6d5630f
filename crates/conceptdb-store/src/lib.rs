//! Record store backends.
//!
//! [`LanceStore`] persists the four tables in a local LanceDB directory;
//! [`InMemoryStore`] keeps rows in process and is what most tests run on.
//! Both speak [`conceptdb_core::Row`](conceptdb_core::row::Row) at the edge,
//! so record decoding is shared.

pub mod codec;
pub mod memory;
pub mod schema;
pub mod table;

pub use memory::InMemoryStore;
pub use table::{ensure_table, open_db, LanceStore, LanceTable};
