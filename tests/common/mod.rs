//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestWarehouse, SONG_X_RECORD};
//!
//! #[test]
//! fn test_load() {
//!     let warehouse = TestWarehouse::new();
//!     warehouse.write_song("A/A/song.json", SONG_X_RECORD);
//! }
//! ```

mod constants;
mod fixtures;

pub use constants::*;
pub use fixtures::*;
