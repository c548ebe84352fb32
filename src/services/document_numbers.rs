use std::sync::Arc;

use chrono::{Datelike, Utc};
use sea_orm::{
    sea_query::OnConflict, ActiveModelTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, QuerySelect, Set, TransactionTrait,
};
use tracing::{debug, instrument};

use crate::{entities::document_sequence, errors::ServiceError};

/// `{PREFIX}-{YEAR}-{NNNN}`; the sequence is zero padded to four digits and
/// grows beyond that when needed.
pub fn format_document_number(prefix: &str, year: i32, sequence: i64) -> String {
    format!("{}-{}-{:04}", prefix, year, sequence)
}

pub fn validate_prefix(prefix: &str) -> Result<(), ServiceError> {
    let valid = !prefix.is_empty()
        && prefix.len() <= 10
        && prefix
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(ServiceError::ValidationError(format!(
            "invalid document prefix '{}': expected 1-10 uppercase letters or digits",
            prefix
        )))
    }
}

/// Allocates the next number for `prefix` in `year` inside the caller's
/// transaction. The counter row stays locked until that transaction ends, so
/// a rollback hands the number back.
pub async fn allocate<C: ConnectionTrait>(
    conn: &C,
    prefix: &str,
    year: i32,
) -> Result<String, ServiceError> {
    validate_prefix(prefix)?;

    document_sequence::Entity::insert(document_sequence::ActiveModel {
        prefix: Set(prefix.to_string()),
        year: Set(year),
        last_value: Set(0),
        updated_at: Set(Utc::now()),
    })
    .on_conflict(
        OnConflict::columns([
            document_sequence::Column::Prefix,
            document_sequence::Column::Year,
        ])
        .do_nothing()
        .to_owned(),
    )
    .exec_without_returning(conn)
    .await?;

    let row = document_sequence::Entity::find_by_id((prefix.to_string(), year))
        .lock_exclusive()
        .one(conn)
        .await?
        .ok_or_else(|| {
            ServiceError::InternalError(format!("sequence {}/{} missing after upsert", prefix, year))
        })?;

    let next = row.last_value + 1;
    let mut active = row.into_active_model();
    active.last_value = Set(next);
    active.updated_at = Set(Utc::now());
    active.update(conn).await?;

    let number = format_document_number(prefix, year, next);
    debug!(%number, "document number allocated");
    Ok(number)
}

pub fn current_year() -> i32 {
    Utc::now().year()
}

/// Standalone number allocation for documents created outside a posting.
#[derive(Clone)]
pub struct DocumentNumberService {
    db: Arc<DatabaseConnection>,
}

impl DocumentNumberService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn next(&self, prefix: &str) -> Result<String, ServiceError> {
        self.next_in_year(prefix, current_year()).await
    }

    #[instrument(skip(self))]
    pub async fn next_in_year(&self, prefix: &str, year: i32) -> Result<String, ServiceError> {
        let txn = self.db.begin().await?;
        let number = allocate(&txn, prefix, year).await?;
        txn.commit().await?;
        Ok(number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn pads_to_four_digits() {
        assert_eq!(format_document_number("GRN", 2024, 1), "GRN-2024-0001");
        assert_eq!(format_document_number("PO", 2024, 20), "PO-2024-0020");
    }

    #[test]
    fn wide_sequences_are_not_truncated() {
        assert_eq!(format_document_number("MIN", 2025, 12345), "MIN-2025-12345");
    }

    #[rstest]
    #[case("GRN", true)]
    #[case("PO2", true)]
    #[case("", false)]
    #[case("grn", false)]
    #[case("GRN-X", false)]
    #[case("ABCDEFGHIJK", false)]
    fn prefix_rules(#[case] prefix: &str, #[case] accepted: bool) {
        assert_eq!(validate_prefix(prefix).is_ok(), accepted);
    }
}
