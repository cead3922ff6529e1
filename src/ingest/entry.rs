use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CronscanError, Result};
use super::tokenizer::FIELD_COUNT;

/// What to do with a line whose command field is empty (e.g. `0 5 * * * `).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyCommandPolicy {
    /// Treat the line as malformed and skip it
    #[default]
    Reject,
    /// Store the entry with an empty command
    Accept,
}

/// A crontab entry snapshot as stored in `task_entries`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskEntry {
    /// Assigned by the store on insert; `None` until persisted
    pub id: Option<i64>,
    pub host_name: String,
    pub user_name: String,
    pub ingested_on: NaiveDate,
    pub minute: String,
    pub hour: String,
    pub day_of_month: String,
    pub month: String,
    pub day_of_week: String,
    pub command: String,
}

impl TaskEntry {
    /// Build an entry stamped with today's local date.
    pub fn build(
        host_name: &str,
        user_name: &str,
        fields: &[String],
        empty_command: EmptyCommandPolicy,
    ) -> Result<Self> {
        Self::build_on(host_name, user_name, fields, empty_command, Local::now().date_naive())
    }

    /// Build an entry from tokenized fields with an explicit ingestion date.
    ///
    /// Needs at least six fields; the sixth is the command. Anything shorter is a
    /// [`CronscanError::MalformedEntry`] and no entry is produced.
    pub fn build_on(
        host_name: &str,
        user_name: &str,
        fields: &[String],
        empty_command: EmptyCommandPolicy,
        ingested_on: NaiveDate,
    ) -> Result<Self> {
        let [minute, hour, day_of_month, month, day_of_week, command, ..] = fields else {
            return Err(CronscanError::MalformedEntry {
                fields: fields.to_vec(),
                reason: format!("expected {} fields, found {}", FIELD_COUNT, fields.len()),
            });
        };

        if empty_command == EmptyCommandPolicy::Reject && command.trim().is_empty() {
            return Err(CronscanError::MalformedEntry {
                fields: fields.to_vec(),
                reason: "command is empty".to_string(),
            });
        }

        Ok(Self {
            id: None,
            host_name: host_name.to_string(),
            user_name: user_name.to_string(),
            ingested_on,
            minute: minute.clone(),
            hour: hour.clone(),
            day_of_month: day_of_month.clone(),
            month: month.clone(),
            day_of_week: day_of_week.clone(),
            command: command.clone(),
        })
    }
}

impl fmt::Display for TaskEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self.id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string());
        write!(
            f,
            "TaskEntry{{id={}, host={}, user={}, date={}, minute={:?}, hour={:?}, day_of_month={:?}, month={:?}, day_of_week={:?}, command={:?}}}",
            id,
            self.host_name,
            self.user_name,
            self.ingested_on,
            self.minute,
            self.hour,
            self.day_of_month,
            self.month,
            self.day_of_week,
            self.command,
        )
    }
}
