//! Profile repository over an open session's connection.
//!
//! Confidential columns are encrypted on the way in and decrypted on the way
//! out; the database only ever sees field blobs for them. Column names in SQL
//! come exclusively from [`Column::as_str`], values always go through bound
//! parameters.

use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::auth;
use crate::crypto::FieldCipher;
use crate::error::{Result, VaultError};
use crate::storage::row::{decode_value, UserRow};
use crate::storage::schema;
use crate::storage::types::{Column, FieldValue, UserProfile, UserUpdate};

/// Maximum length of the identity key, in characters.
pub const MAX_NAME_CHARS: usize = 256;

/// Reads and writes user profiles.
pub struct Repository<'a> {
    conn: &'a Connection,
    cipher: &'a FieldCipher,
}

impl<'a> Repository<'a> {
    pub fn new(conn: &'a Connection, cipher: &'a FieldCipher) -> Self {
        Self { conn, cipher }
    }

    /// Create or upgrade the schema. Safe to call on every open.
    pub fn ensure_schema(&self) -> Result<()> {
        schema::migrate(self.conn)
    }

    /// Insert a new profile and return its row id.
    ///
    /// Duplicate names are allowed; lookups by name return the oldest row.
    ///
    /// # Errors
    ///
    /// - `VaultError::InvalidInput` for an empty or overlong name
    /// - `VaultError::MalformedInput` if a value does not fit its column
    pub fn save(&self, profile: &UserProfile) -> Result<i64> {
        let name = validate_name(&profile.name)?;

        let mut columns = vec!["name", "created_at"];
        let mut values = vec![
            Value::Text(name.to_string()),
            Value::Text(Utc::now().to_rfc3339()),
        ];
        for column in Column::ALL {
            columns.push(column.as_str());
            values.push(self.encode(column, &profile.value(column))?);
        }

        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO users ({}) VALUES ({})",
            columns.join(", "),
            placeholders
        );
        self.conn.execute(&sql, params_from_iter(values))?;

        let id = self.conn.last_insert_rowid();
        info!(user_id = id, "saved profile");
        Ok(id)
    }

    /// Apply `update` to every row named `name`. Returns the number of rows changed.
    ///
    /// Each row gets its own encryption of confidential values, so no nonce
    /// is ever shared between rows.
    ///
    /// # Errors
    ///
    /// `VaultError::NotFound` if no row has that name.
    pub fn update(&self, name: &str, update: &UserUpdate) -> Result<usize> {
        let ids = self.ids_for(name)?;
        if ids.is_empty() {
            return Err(not_found(name));
        }
        if update.is_empty() {
            debug!("empty update, nothing to write");
            return Ok(0);
        }

        let mut assignments: Vec<String> = update
            .iter()
            .map(|(column, _)| format!("{} = ?", column.as_str()))
            .collect();
        assignments.push("updated_at = ?".to_string());
        let sql = format!("UPDATE users SET {} WHERE id = ?", assignments.join(", "));

        let updated_at = Utc::now().to_rfc3339();
        let tx = self.conn.unchecked_transaction()?;
        let mut changed = 0;
        for id in &ids {
            let mut values = Vec::with_capacity(update.len() + 2);
            for (column, value) in update.iter() {
                values.push(self.encode(column, value)?);
            }
            values.push(Value::Text(updated_at.clone()));
            values.push(Value::Integer(*id));
            changed += tx.execute(&sql, params_from_iter(values))?;
        }
        tx.commit()?;

        info!(rows = changed, columns = update.len(), "updated profile");
        Ok(changed)
    }

    /// Fetch the profile named `name` (the oldest row if there are several).
    ///
    /// Confidential fields that fail to decrypt are returned as `None` and
    /// listed in [`UserProfile::unreadable`].
    pub fn get(&self, name: &str) -> Result<Option<UserProfile>> {
        let sql = format!("{} WHERE name = ? ORDER BY id LIMIT 1", UserRow::select_sql());
        let row = self
            .conn
            .query_row(&sql, [name], UserRow::from_row)
            .optional()?;
        row.map(|row| row.into_profile(self.cipher)).transpose()
    }

    /// Fetch a single column of the profile named `name`.
    ///
    /// Returns `Ok(None)` when there is no such user.
    ///
    /// # Errors
    ///
    /// `VaultError::AuthenticationFailure` if a confidential value fails to
    /// decrypt. Unlike [`Repository::get`], the failure is not masked.
    pub fn get_field(&self, name: &str, column: Column) -> Result<Option<FieldValue>> {
        let sql = format!(
            "SELECT {} FROM users WHERE name = ? ORDER BY id LIMIT 1",
            column.as_str()
        );
        let raw = self
            .conn
            .query_row(&sql, [name], |row| row.get::<_, Value>(0))
            .optional()?;
        raw.map(|raw| decode_value(self.cipher, column, raw)).transpose()
    }

    /// All distinct names, sorted.
    pub fn list_names(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT name FROM users ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Delete every row named `name`. Returns the number of rows removed.
    pub fn delete(&self, name: &str) -> Result<usize> {
        let removed = self
            .conn
            .execute("DELETE FROM users WHERE name = ?", [name])?;
        if removed == 0 {
            return Err(not_found(name));
        }
        info!(rows = removed, "deleted profile");
        Ok(removed)
    }

    /// Set the login password of every row named `name`.
    pub fn set_password(&self, name: &str, password: &str) -> Result<()> {
        let hash = auth::hash_password(password)?;
        let changed = self.conn.execute(
            "UPDATE users SET password_hash = ?, updated_at = ? WHERE name = ?",
            [hash.as_str(), Utc::now().to_rfc3339().as_str(), name],
        )?;
        if changed == 0 {
            return Err(not_found(name));
        }
        info!(rows = changed, "set login password");
        Ok(())
    }

    /// Check a login password against the stored hash.
    ///
    /// Returns `Ok(false)` for a wrong password or a user without one.
    ///
    /// # Errors
    ///
    /// `VaultError::NotFound` if no row has that name.
    pub fn verify_password(&self, name: &str, password: &str) -> Result<bool> {
        let stored = self
            .conn
            .query_row(
                "SELECT password_hash FROM users WHERE name = ? ORDER BY id LIMIT 1",
                [name],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        match stored {
            None => Err(not_found(name)),
            Some(None) => Ok(false),
            Some(Some(hash)) => auth::verify_password(password, &hash),
        }
    }

    fn ids_for(&self, name: &str) -> Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM users WHERE name = ? ORDER BY id")?;
        let ids = stmt
            .query_map([name], |row| row.get::<_, i64>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// SQL value for `column`, encrypting confidential text.
    fn encode(&self, column: Column, value: &FieldValue) -> Result<Value> {
        value.check(column)?;
        let encoded = match value {
            FieldValue::Null => Value::Null,
            FieldValue::Integer(i) => Value::Integer(*i),
            FieldValue::Text(text) if column.is_confidential() => {
                match self.cipher.encrypt_field(Some(text))? {
                    Some(blob) => Value::Text(blob),
                    None => Value::Null,
                }
            }
            FieldValue::Text(text) => Value::Text(text.clone()),
        };
        Ok(encoded)
    }
}

fn validate_name(name: &str) -> Result<&str> {
    if name.trim().is_empty() {
        return Err(VaultError::InvalidInput("Name cannot be empty".to_string()));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(VaultError::InvalidInput(format!(
            "Name is longer than {} characters",
            MAX_NAME_CHARS
        )));
    }
    Ok(name)
}

fn not_found(name: &str) -> VaultError {
    VaultError::NotFound(format!("No user named {:?}", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::DerivedKey;

    fn setup() -> (Connection, FieldCipher) {
        let conn = Connection::open_in_memory().unwrap();
        let cipher = FieldCipher::new(DerivedKey::from_bytes([9u8; 32]));
        (conn, cipher)
    }

    fn sample() -> UserProfile {
        UserProfile {
            name: "alice".to_string(),
            age: Some(21),
            employment_status: Some("Student".to_string()),
            email: Some("alice@example.com".to_string()),
            monthly_income: Some("42000".to_string()),
            financial_goal: Some("Pay off loans".to_string()),
            ..UserProfile::default()
        }
    }

    fn raw_text(conn: &Connection, column: &str) -> Option<String> {
        conn.query_row(
            &format!("SELECT {} FROM users ORDER BY id LIMIT 1", column),
            [],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_save_and_get() {
        let (conn, cipher) = setup();
        let repo = Repository::new(&conn, &cipher);
        repo.ensure_schema().unwrap();

        let id = repo.save(&sample()).unwrap();
        let profile = repo.get("alice").unwrap().unwrap();

        assert_eq!(profile.id, Some(id));
        assert_eq!(profile.age, Some(21));
        assert_eq!(profile.monthly_income.as_deref(), Some("42000"));
        assert_eq!(profile.email.as_deref(), Some("alice@example.com"));
        assert_eq!(profile.location, None);
        assert!(profile.created_at.is_some());
        assert!(profile.updated_at.is_none());
        assert!(profile.unreadable.is_empty());
    }

    #[test]
    fn test_confidential_columns_stored_encrypted() {
        let (conn, cipher) = setup();
        let repo = Repository::new(&conn, &cipher);
        repo.ensure_schema().unwrap();
        repo.save(&sample()).unwrap();

        let income = raw_text(&conn, "monthly_income").unwrap();
        assert_ne!(income, "42000");
        assert!(!income.contains("42000"));
        assert_eq!(raw_text(&conn, "employment_status").as_deref(), Some("Student"));
        assert_eq!(raw_text(&conn, "location"), None);
    }

    #[test]
    fn test_save_rejects_empty_name() {
        let (conn, cipher) = setup();
        let repo = Repository::new(&conn, &cipher);
        repo.ensure_schema().unwrap();

        assert!(matches!(
            repo.save(&UserProfile::new("  ")),
            Err(VaultError::InvalidInput(_))
        ));
        assert!(matches!(
            repo.save(&UserProfile::new("x".repeat(MAX_NAME_CHARS + 1))),
            Err(VaultError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_get_unknown_user() {
        let (conn, cipher) = setup();
        let repo = Repository::new(&conn, &cipher);
        repo.ensure_schema().unwrap();

        assert!(repo.get("nobody").unwrap().is_none());
        assert!(repo.get_field("nobody", Column::Email).unwrap().is_none());
    }

    #[test]
    fn test_update_reencrypts_and_stamps() {
        let (conn, cipher) = setup();
        let repo = Repository::new(&conn, &cipher);
        repo.ensure_schema().unwrap();
        repo.save(&sample()).unwrap();
        let before = raw_text(&conn, "monthly_income").unwrap();

        let update = UserUpdate::new().set(Column::MonthlyIncome, "50000").unwrap();
        assert_eq!(repo.update("alice", &update).unwrap(), 1);

        let after = raw_text(&conn, "monthly_income").unwrap();
        assert_ne!(before, after);
        assert!(!after.contains("50000"));

        let profile = repo.get("alice").unwrap().unwrap();
        assert_eq!(profile.monthly_income.as_deref(), Some("50000"));
        assert_eq!(profile.email.as_deref(), Some("alice@example.com"));
        assert!(profile.updated_at.is_some());
    }

    #[test]
    fn test_update_unknown_user() {
        let (conn, cipher) = setup();
        let repo = Repository::new(&conn, &cipher);
        repo.ensure_schema().unwrap();

        let update = UserUpdate::new().set(Column::Age, 30i64).unwrap();
        assert!(matches!(
            repo.update("nobody", &update),
            Err(VaultError::NotFound(_))
        ));
        assert!(matches!(
            repo.update("nobody", &UserUpdate::new()),
            Err(VaultError::NotFound(_))
        ));
    }

    #[test]
    fn test_update_touches_every_duplicate_with_distinct_blobs() {
        let (conn, cipher) = setup();
        let repo = Repository::new(&conn, &cipher);
        repo.ensure_schema().unwrap();
        repo.save(&sample()).unwrap();
        repo.save(&sample()).unwrap();

        let update = UserUpdate::new().set(Column::Location, "Berlin").unwrap();
        assert_eq!(repo.update("alice", &update).unwrap(), 2);

        let mut stmt = conn.prepare("SELECT location FROM users").unwrap();
        let blobs: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        assert_eq!(blobs.len(), 2);
        assert_ne!(blobs[0], blobs[1]);
    }

    #[test]
    fn test_update_can_clear_a_field() {
        let (conn, cipher) = setup();
        let repo = Repository::new(&conn, &cipher);
        repo.ensure_schema().unwrap();
        repo.save(&sample()).unwrap();

        let update = UserUpdate::new().set(Column::Email, None::<String>).unwrap();
        repo.update("alice", &update).unwrap();

        assert_eq!(raw_text(&conn, "email"), None);
        assert_eq!(
            repo.get_field("alice", Column::Email).unwrap(),
            Some(FieldValue::Null)
        );
    }

    #[test]
    fn test_get_returns_oldest_duplicate() {
        let (conn, cipher) = setup();
        let repo = Repository::new(&conn, &cipher);
        repo.ensure_schema().unwrap();

        let first = repo.save(&sample()).unwrap();
        let mut second = sample();
        second.age = Some(99);
        repo.save(&second).unwrap();

        let profile = repo.get("alice").unwrap().unwrap();
        assert_eq!(profile.id, Some(first));
        assert_eq!(profile.age, Some(21));
    }

    #[test]
    fn test_get_field_plain_and_confidential() {
        let (conn, cipher) = setup();
        let repo = Repository::new(&conn, &cipher);
        repo.ensure_schema().unwrap();
        repo.save(&sample()).unwrap();

        assert_eq!(
            repo.get_field("alice", Column::Age).unwrap(),
            Some(FieldValue::Integer(21))
        );
        assert_eq!(
            repo.get_field("alice", Column::FinancialGoal).unwrap(),
            Some(FieldValue::Text("Pay off loans".to_string()))
        );
    }

    #[test]
    fn test_tampered_field_fails_closed() {
        let (conn, cipher) = setup();
        let repo = Repository::new(&conn, &cipher);
        repo.ensure_schema().unwrap();
        repo.save(&sample()).unwrap();

        let other = FieldCipher::new(DerivedKey::from_bytes([1u8; 32]));
        let foreign = other.encrypt_field(Some("999999")).unwrap().unwrap();
        conn.execute("UPDATE users SET monthly_income = ?", [foreign])
            .unwrap();

        assert!(matches!(
            repo.get_field("alice", Column::MonthlyIncome),
            Err(VaultError::AuthenticationFailure(_))
        ));

        let profile = repo.get("alice").unwrap().unwrap();
        assert_eq!(profile.monthly_income, None);
        assert_eq!(profile.unreadable, vec![Column::MonthlyIncome]);
        assert_eq!(profile.email.as_deref(), Some("alice@example.com"));
    }

    #[test]
    fn test_list_and_delete() {
        let (conn, cipher) = setup();
        let repo = Repository::new(&conn, &cipher);
        repo.ensure_schema().unwrap();
        repo.save(&UserProfile::new("carol")).unwrap();
        repo.save(&UserProfile::new("alice")).unwrap();
        repo.save(&UserProfile::new("alice")).unwrap();

        assert_eq!(repo.list_names().unwrap(), vec!["alice", "carol"]);
        assert_eq!(repo.delete("alice").unwrap(), 2);
        assert_eq!(repo.list_names().unwrap(), vec!["carol"]);
        assert!(matches!(
            repo.delete("alice"),
            Err(VaultError::NotFound(_))
        ));
    }

    #[test]
    fn test_login_password() {
        let (conn, cipher) = setup();
        let repo = Repository::new(&conn, &cipher);
        repo.ensure_schema().unwrap();
        repo.save(&sample()).unwrap();

        assert!(!repo.verify_password("alice", "correct horse").unwrap());
        repo.set_password("alice", "correct horse").unwrap();
        assert!(repo.verify_password("alice", "correct horse").unwrap());
        assert!(!repo.verify_password("alice", "wrong horse").unwrap());

        assert!(matches!(
            repo.verify_password("nobody", "correct horse"),
            Err(VaultError::NotFound(_))
        ));
        assert!(matches!(
            repo.set_password("nobody", "correct horse"),
            Err(VaultError::NotFound(_))
        ));

        let hash = raw_text(&conn, "password_hash").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(repo.get("alice").unwrap().is_some());
    }
}
