//! Repository traits and their SQLite implementations.
//!
//! Repositories run single statements against the pool. Anything that must
//! be all-or-nothing goes through [`CacheTransaction`](crate::CacheTransaction).

mod media;
mod media_set;
mod search_request;
mod suggestion;

pub use media::{MediaRepository, SqliteMediaRepository};
pub use media_set::{MediaSetRepository, SqliteMediaSetRepository};
pub use search_request::{SearchRequestRepository, SqliteSearchRequestRepository};
pub use suggestion::{SqliteSuggestionRepository, SuggestionRepository};

use sqlx::{QueryBuilder, Sqlite};

/// Append `(?, ?, …)` binding every id.
pub(crate) fn push_id_list(builder: &mut QueryBuilder<'_, Sqlite>, ids: &[i64]) {
    builder.push("(");
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
}
