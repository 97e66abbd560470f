//! Core data types for user profile records.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, VaultError};

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
}

/// The allow-list of profile columns that callers may read and write.
///
/// The identity key (`name`) is not part of the list: it is never encrypted
/// and never changed through an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Age,
    EmploymentStatus,
    HousingSituation,
    FinancialConfidenceScore,
    Email,
    Location,
    MonthlyIncome,
    MonthlyExpenses,
    TotalDebt,
    CreditScore,
    BankAccountBalance,
    FinancialGoal,
}

impl Column {
    pub const ALL: [Column; 12] = [
        Column::Age,
        Column::EmploymentStatus,
        Column::HousingSituation,
        Column::FinancialConfidenceScore,
        Column::Email,
        Column::Location,
        Column::MonthlyIncome,
        Column::MonthlyExpenses,
        Column::TotalDebt,
        Column::CreditScore,
        Column::BankAccountBalance,
        Column::FinancialGoal,
    ];

    /// SQL column name.
    pub fn as_str(self) -> &'static str {
        match self {
            Column::Age => "age",
            Column::EmploymentStatus => "employment_status",
            Column::HousingSituation => "housing_situation",
            Column::FinancialConfidenceScore => "financial_confidence_score",
            Column::Email => "email",
            Column::Location => "location",
            Column::MonthlyIncome => "monthly_income",
            Column::MonthlyExpenses => "monthly_expenses",
            Column::TotalDebt => "total_debt",
            Column::CreditScore => "credit_score",
            Column::BankAccountBalance => "bank_account_balance",
            Column::FinancialGoal => "financial_goal",
        }
    }

    pub fn kind(self) -> ColumnKind {
        match self {
            Column::Age | Column::FinancialConfidenceScore => ColumnKind::Integer,
            _ => ColumnKind::Text,
        }
    }

    /// Confidential columns only ever reach the database as field blobs.
    pub fn is_confidential(self) -> bool {
        matches!(
            self,
            Column::Email
                | Column::Location
                | Column::MonthlyIncome
                | Column::MonthlyExpenses
                | Column::TotalDebt
                | Column::CreditScore
                | Column::BankAccountBalance
                | Column::FinancialGoal
        )
    }

    /// Look up an allow-listed column by its SQL name.
    pub fn parse(name: &str) -> Option<Column> {
        Column::ALL
            .into_iter()
            .find(|column| column.as_str() == name)
    }

    /// Comma-separated SQL names of every column, in `ALL` order.
    pub(crate) fn sql_list() -> String {
        Column::ALL
            .iter()
            .map(|column| column.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl FromStr for Column {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        Column::parse(s.trim())
            .ok_or_else(|| VaultError::InvalidInput(format!("Unknown column: {}", s)))
    }
}

impl std::fmt::Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single column value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Text(String),
    Null,
}

impl FieldValue {
    /// Check that this value fits `column`.
    pub fn check(&self, column: Column) -> Result<()> {
        match (self, column.kind()) {
            (FieldValue::Null, _)
            | (FieldValue::Integer(_), ColumnKind::Integer)
            | (FieldValue::Text(_), ColumnKind::Text) => Ok(()),
            (_, ColumnKind::Integer) => Err(VaultError::MalformedInput(format!(
                "{} must be an integer",
                column
            ))),
            (_, ColumnKind::Text) => Err(VaultError::MalformedInput(format!(
                "{} must be a string",
                column
            ))),
        }
    }

    /// Convert a JSON value for `column`.
    ///
    /// Text columns also take numbers (form clients send amounts as numbers);
    /// integer columns take integers only.
    pub fn from_json(column: Column, value: &serde_json::Value) -> Result<Self> {
        use serde_json::Value;

        let converted = match (column.kind(), value) {
            (_, Value::Null) => FieldValue::Null,
            (ColumnKind::Text, Value::String(s)) => FieldValue::Text(s.clone()),
            (ColumnKind::Text, Value::Number(n)) => FieldValue::Text(n.to_string()),
            (ColumnKind::Integer, Value::Number(n)) => match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => {
                    return Err(VaultError::MalformedInput(format!(
                        "{} must be an integer",
                        column
                    )))
                }
            },
            (ColumnKind::Integer, _) => {
                return Err(VaultError::MalformedInput(format!(
                    "{} must be an integer",
                    column
                )))
            }
            (ColumnKind::Text, _) => {
                return Err(VaultError::MalformedInput(format!(
                    "{} must be a string",
                    column
                )))
            }
        };
        Ok(converted)
    }

    /// Parse command-line text for `column`.
    pub fn parse(column: Column, raw: &str) -> Result<Self> {
        match column.kind() {
            ColumnKind::Text => Ok(FieldValue::Text(raw.to_string())),
            ColumnKind::Integer => raw.trim().parse::<i64>().map(FieldValue::Integer).map_err(|_| {
                VaultError::MalformedInput(format!("{} must be an integer (got {:?})", column, raw))
            }),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Integer(i) => write!(f, "{}", i),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Null => f.write_str("null"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<Option<String>> for FieldValue {
    fn from(value: Option<String>) -> Self {
        value.map(FieldValue::Text).unwrap_or(FieldValue::Null)
    }
}

impl From<Option<i64>> for FieldValue {
    fn from(value: Option<i64>) -> Self {
        value.map(FieldValue::Integer).unwrap_or(FieldValue::Null)
    }
}

/// A user's financial profile as seen by callers (confidential fields decrypted).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,

    pub age: Option<i64>,
    pub employment_status: Option<String>,
    pub housing_situation: Option<String>,
    pub financial_confidence_score: Option<i64>,

    pub email: Option<String>,
    pub location: Option<String>,
    pub monthly_income: Option<String>,
    pub monthly_expenses: Option<String>,
    pub total_debt: Option<String>,
    pub credit_score: Option<String>,
    pub bank_account_balance: Option<String>,
    pub financial_goal: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// Confidential columns that failed to decrypt and were returned as `None`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unreadable: Vec<Column>,
}

impl UserProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Build a profile from a JSON object (e.g. a request body).
    ///
    /// `name` is required. Other keys go through [`UserUpdate::from_json`],
    /// so unknown keys are ignored.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let name = value
            .get("name")
            .and_then(|name| name.as_str())
            .ok_or_else(|| VaultError::MalformedInput("name is required".to_string()))?;
        let mut profile = UserProfile::new(name);
        profile.apply(&UserUpdate::from_json(value)?)?;
        Ok(profile)
    }

    pub fn value(&self, column: Column) -> FieldValue {
        match column {
            Column::Age => self.age.into(),
            Column::EmploymentStatus => self.employment_status.clone().into(),
            Column::HousingSituation => self.housing_situation.clone().into(),
            Column::FinancialConfidenceScore => self.financial_confidence_score.into(),
            Column::Email => self.email.clone().into(),
            Column::Location => self.location.clone().into(),
            Column::MonthlyIncome => self.monthly_income.clone().into(),
            Column::MonthlyExpenses => self.monthly_expenses.clone().into(),
            Column::TotalDebt => self.total_debt.clone().into(),
            Column::CreditScore => self.credit_score.clone().into(),
            Column::BankAccountBalance => self.bank_account_balance.clone().into(),
            Column::FinancialGoal => self.financial_goal.clone().into(),
        }
    }

    pub fn set(&mut self, column: Column, value: FieldValue) -> Result<()> {
        value.check(column)?;
        let (number, text) = match value {
            FieldValue::Integer(i) => (Some(i), None),
            FieldValue::Text(s) => (None, Some(s)),
            FieldValue::Null => (None, None),
        };
        match column {
            Column::Age => self.age = number,
            Column::FinancialConfidenceScore => self.financial_confidence_score = number,
            Column::EmploymentStatus => self.employment_status = text,
            Column::HousingSituation => self.housing_situation = text,
            Column::Email => self.email = text,
            Column::Location => self.location = text,
            Column::MonthlyIncome => self.monthly_income = text,
            Column::MonthlyExpenses => self.monthly_expenses = text,
            Column::TotalDebt => self.total_debt = text,
            Column::CreditScore => self.credit_score = text,
            Column::BankAccountBalance => self.bank_account_balance = text,
            Column::FinancialGoal => self.financial_goal = text,
        }
        Ok(())
    }

    pub fn apply(&mut self, update: &UserUpdate) -> Result<()> {
        for (column, value) in update.iter() {
            self.set(column, value.clone())?;
        }
        Ok(())
    }
}

/// A sparse, type-checked set of column changes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserUpdate {
    changes: BTreeMap<Column, FieldValue>,
}

impl UserUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a change. Setting the same column twice keeps the last value.
    ///
    /// # Examples
    ///
    /// ```
    /// use vaultdb_core::{Column, UserUpdate};
    ///
    /// let update = UserUpdate::new()
    ///     .set(Column::MonthlyIncome, "50000").unwrap()
    ///     .set(Column::Age, 22i64).unwrap();
    /// assert_eq!(update.len(), 2);
    /// assert!(UserUpdate::new().set(Column::Age, "old").is_err());
    /// ```
    pub fn set(mut self, column: Column, value: impl Into<FieldValue>) -> Result<Self> {
        let value = value.into();
        value.check(column)?;
        self.changes.insert(column, value);
        Ok(self)
    }

    /// Build from a JSON object. Keys outside the allow-list are ignored.
    ///
    /// # Errors
    ///
    /// `VaultError::MalformedInput` if `value` is not an object or an
    /// allow-listed key has the wrong type.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            VaultError::MalformedInput("Update must be a JSON object".to_string())
        })?;

        let mut update = UserUpdate::new();
        for (key, raw) in object {
            match Column::parse(key) {
                Some(column) => {
                    let value = FieldValue::from_json(column, raw)?;
                    update.changes.insert(column, value);
                }
                None => debug!(key = %key, "ignoring key outside the column allow-list"),
            }
        }
        Ok(update)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Column, &FieldValue)> {
        self.changes.iter().map(|(column, value)| (*column, value))
    }

    pub fn get(&self, column: Column) -> Option<&FieldValue> {
        self.changes.get(&column)
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}
