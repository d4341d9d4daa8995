//! Shared fixtures for unit tests.


pub use engine::MockEngine;
pub use factories::table_factory;
