//! User row type for database queries.

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use tracing::warn;

use crate::crypto::FieldCipher;
use crate::error::{Result, VaultError};
use crate::storage::types::{Column, FieldValue, UserProfile};

/// Raw row data from the users table, before decryption.
#[derive(Debug)]
pub struct UserRow {
    pub id: i64,
    pub name: String,
    pub created_at: String,
    pub updated_at: Option<String>,
    pub values: Vec<(Column, Value)>,
}

impl UserRow {
    /// Select list matching [`UserRow::from_row`].
    pub fn select_sql() -> String {
        format!(
            "SELECT id, name, created_at, updated_at, {} FROM users",
            Column::sql_list()
        )
    }

    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let mut values = Vec::with_capacity(Column::ALL.len());
        for (offset, column) in Column::ALL.into_iter().enumerate() {
            values.push((column, row.get::<_, Value>(4 + offset)?));
        }
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            created_at: row.get(2)?,
            updated_at: row.get(3)?,
            values,
        })
    }

    /// Decrypt into a profile.
    ///
    /// A confidential column that fails to decrypt comes back as `None` and
    /// is listed in `unreadable`; the rest of the row is still returned.
    pub fn into_profile(self, cipher: &FieldCipher) -> Result<UserProfile> {
        let mut profile = UserProfile::new(self.name);
        profile.id = Some(self.id);
        profile.created_at = Some(parse_timestamp(&self.created_at)?);
        profile.updated_at = self.updated_at.as_deref().map(parse_timestamp).transpose()?;

        for (column, raw) in self.values {
            let decoded = decode_value(cipher, column, raw)
                .and_then(|value| value.check(column).map(|_| value));
            match decoded {
                Ok(value) => profile.set(column, value)?,
                Err(VaultError::AuthenticationFailure(reason))
                | Err(VaultError::MalformedInput(reason)) => {
                    warn!(user_id = self.id, column = %column, "unreadable field: {}", reason);
                    profile.unreadable.push(column);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(profile)
    }
}

/// Turn a stored SQL value into a caller value, decrypting confidential columns.
pub fn decode_value(cipher: &FieldCipher, column: Column, raw: Value) -> Result<FieldValue> {
    match raw {
        Value::Null => Ok(FieldValue::Null),
        Value::Text(blob) if column.is_confidential() => {
            Ok(cipher.decrypt_field(Some(&blob))?.into())
        }
        Value::Integer(_) if column.is_confidential() => Err(VaultError::MalformedInput(
            format!("{} holds a plaintext value instead of a field blob", column),
        )),
        Value::Text(text) => Ok(FieldValue::Text(text)),
        Value::Integer(i) => Ok(FieldValue::Integer(i)),
        Value::Real(_) | Value::Blob(_) => Err(VaultError::Storage(format!(
            "Unexpected storage type in column {}",
            column
        ))),
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .map_err(|e| VaultError::Storage(format!("Invalid timestamp: {}", e)))?
        .with_timezone(&Utc))
}
