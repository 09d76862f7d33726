// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Storage layer for Keysmith server.
//!
//! [`KeyStore`] is the storage contract. [`SqliteKeyStore`] persists to a
//! single `keys` table; [`MemoryKeyStore`] keeps everything in process.

pub mod error;
pub mod key;
pub mod memory;
pub mod pool;

pub use error::{DbError, Result};
pub use key::{KeyStore, SqliteKeyStore};
pub use memory::MemoryKeyStore;
pub use pool::{create_pool, run_migrations};
pub use sqlx::SqlitePool;
