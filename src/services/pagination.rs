use sqlx::{postgres::PgRow, FromRow, PgExecutor, Postgres, QueryBuilder};

use crate::error::AppResult;
use crate::models::{Identified, ListResult, PageWindow};

/// Completes a filtered `SELECT` with cursor/offset, ordering and the
/// look-ahead limit, then runs it.
///
/// `query` must end inside a `WHERE` clause so the cursor can be appended
/// with `AND`; `id_column` names the key used for ordering and the cursor.
pub async fn fetch_page<'c, T>(
    executor: impl PgExecutor<'c>,
    mut query: QueryBuilder<'_, Postgres>,
    id_column: &str,
    window: &PageWindow,
) -> AppResult<ListResult<T>>
where
    T: for<'r> FromRow<'r, PgRow> + Identified + Send + Unpin,
{
    if let Some(cursor) = window.cursor {
        query
            .push(format!(" AND {id_column} {} ", window.order.cursor_operator()))
            .push_bind(cursor);
    }

    query
        .push(format!(" ORDER BY {id_column} {}", window.order.keyword()))
        .push(" LIMIT ")
        .push_bind(window.fetch_limit());

    if window.offset > 0 {
        query.push(" OFFSET ").push_bind(window.offset);
    }

    let rows: Vec<T> = query.build_query_as::<T>().fetch_all(executor).await?;
    Ok(window.finish(rows))
}
