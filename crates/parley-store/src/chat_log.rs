use parley_core::{DurableLog, HistoryEntry, LastSeen, LogError, PresenceStatus, SessionId};
use tracing::instrument;

use crate::database::Database;
use crate::error::StoreError;

/// SQLite-backed message and presence log.
pub struct ChatLog {
    db: Database,
}

impl ChatLog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self, session, content), fields(session_id = %session))]
    pub fn insert_message(
        &self,
        session: &SessionId,
        nickname: &str,
        content: &str,
        timestamp: &str,
    ) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO message_history (join_key, nick_name, message, time_stamp)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![session.as_str(), nickname, content, timestamp],
            )?;
            Ok(())
        })
    }

    #[instrument(skip(self, session), fields(session_id = %session))]
    pub fn insert_presence(
        &self,
        status: PresenceStatus,
        session: &SessionId,
        nickname: &str,
        timestamp: &str,
    ) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users_status (join_key, nick_name, status, time_stamp)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![session.as_str(), nickname, status.as_str(), timestamp],
            )?;
            Ok(())
        })
    }

    /// Most recent messages first, by arrival order.
    #[instrument(skip(self))]
    pub fn recent(&self, limit: usize) -> Result<Vec<HistoryEntry>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT nick_name, message, time_stamp FROM message_history
                 ORDER BY id DESC LIMIT ?1",
            )?;
            let limit = i64::try_from(limit).unwrap_or(i64::MAX);
            let mut rows = stmt.query([limit])?;
            let mut entries = Vec::new();
            while let Some(row) = rows.next()? {
                entries.push(HistoryEntry {
                    nickname: column(row, 0, "nick_name")?,
                    content: column(row, 1, "message")?,
                    timestamp: column(row, 2, "time_stamp")?,
                });
            }
            Ok(entries)
        })
    }

    #[instrument(skip(self))]
    pub fn latest_logouts(&self) -> Result<Vec<LastSeen>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT nick_name, MAX(time_stamp) FROM users_status
                 WHERE status = 'logout'
                 GROUP BY nick_name
                 ORDER BY nick_name",
            )?;
            let mut rows = stmt.query([])?;
            let mut seen = Vec::new();
            while let Some(row) = rows.next()? {
                seen.push(LastSeen {
                    nick_name: column(row, 0, "nick_name")?,
                    last_logout_time: column(row, 1, "time_stamp")?,
                });
            }
            Ok(seen)
        })
    }
}

fn column(row: &rusqlite::Row<'_>, idx: usize, name: &'static str) -> Result<String, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table: "chat",
        column: name,
        detail: e.to_string(),
    })
}

impl DurableLog for ChatLog {
    fn append_message(
        &self,
        session: &SessionId,
        nickname: &str,
        content: &str,
        timestamp: &str,
    ) -> Result<(), LogError> {
        Ok(self.insert_message(session, nickname, content, timestamp)?)
    }

    fn append_presence(
        &self,
        status: PresenceStatus,
        session: &SessionId,
        nickname: &str,
        timestamp: &str,
    ) -> Result<(), LogError> {
        Ok(self.insert_presence(status, session, nickname, timestamp)?)
    }

    fn recent_messages(&self, limit: usize) -> Result<Vec<HistoryEntry>, LogError> {
        Ok(self.recent(limit)?)
    }

    fn last_logouts(&self) -> Result<Vec<LastSeen>, LogError> {
        Ok(self.latest_logouts()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> ChatLog {
        ChatLog::new(Database::in_memory().unwrap())
    }

    #[test]
    fn recent_is_newest_first_and_limited() {
        let log = setup();
        let sid = SessionId::new();
        for i in 0..60 {
            log.append_message(&sid, "tom", &format!("m{i}"), &format!("2024-01-01 10:00:{i:02}.000"))
                .unwrap();
        }

        let recent = log.recent_messages(50).unwrap();
        assert_eq!(recent.len(), 50);
        assert_eq!(recent[0].content, "m59");
        assert_eq!(recent[49].content, "m10");
    }

    #[test]
    fn presence_never_appears_in_history() {
        let log = setup();
        let sid = SessionId::new();
        log.append_presence(PresenceStatus::Login, &sid, "tom", "2024-01-01 10:00:00.000")
            .unwrap();
        log.append_message(&sid, "tom", "hello", "2024-01-01 10:00:01.000")
            .unwrap();
        log.append_presence(PresenceStatus::Logout, &sid, "tom", "2024-01-01 10:00:02.000")
            .unwrap();

        let recent = log.recent_messages(50).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].content, "hello");
    }

    #[test]
    fn latest_logout_per_nickname() {
        let log = setup();
        let a = SessionId::new();
        let b = SessionId::new();
        log.append_presence(PresenceStatus::Logout, &a, "tom", "2024-01-01 09:00:00.000").unwrap();
        log.append_presence(PresenceStatus::Logout, &b, "tom", "2024-01-02 09:00:00.000").unwrap();
        log.append_presence(PresenceStatus::Login, &b, "amy", "2024-01-03 09:00:00.000").unwrap();
        log.append_presence(PresenceStatus::Logout, &b, "amy", "2024-01-01 12:00:00.000").unwrap();

        let seen = log.last_logouts().unwrap();
        assert_eq!(
            seen,
            vec![
                LastSeen {
                    nick_name: "amy".into(),
                    last_logout_time: "2024-01-01 12:00:00.000".into(),
                },
                LastSeen {
                    nick_name: "tom".into(),
                    last_logout_time: "2024-01-02 09:00:00.000".into(),
                },
            ]
        );
    }

    #[test]
    fn empty_history() {
        assert!(setup().recent_messages(50).unwrap().is_empty());
    }
}
