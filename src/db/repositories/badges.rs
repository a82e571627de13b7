use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::Serialize;

use crate::{
    badges::Badge,
    db::{helpers::parse_datetime, Database},
};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EarnedBadge {
    pub badge: Badge,
    pub earned_at: DateTime<Utc>,
}

impl Database {
    /// Earned badges, most recent first. Unknown ids are skipped.
    pub async fn list_badges(&self) -> Result<Vec<EarnedBadge>> {
        self.execute(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, earned_at FROM badges ORDER BY earned_at DESC, id ASC")?;
            let mut rows = stmt.query([])?;
            let mut earned = Vec::new();
            while let Some(row) = rows.next()? {
                let id: String = row.get(0)?;
                let earned_at: String = row.get(1)?;
                let Some(badge) = Badge::from_id(&id) else {
                    log::warn!("Skipping unknown badge id '{id}'");
                    continue;
                };
                earned.push(EarnedBadge {
                    badge,
                    earned_at: parse_datetime(&earned_at, "earned_at")?,
                });
            }
            Ok(earned)
        })
        .await
    }

    /// Records the badges not yet earned and returns exactly those.
    pub async fn insert_badges(
        &self,
        badges: &[Badge],
        earned_at: DateTime<Utc>,
    ) -> Result<Vec<Badge>> {
        let badges = badges.to_vec();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let mut inserted = Vec::new();
            for badge in badges {
                let rows = tx
                    .execute(
                        "INSERT OR IGNORE INTO badges (id, earned_at) VALUES (?1, ?2)",
                        params![badge.id(), earned_at.to_rfc3339()],
                    )
                    .map_err(|err| anyhow!("failed to award {}: {err}", badge.id()))?;
                if rows > 0 {
                    inserted.push(badge);
                }
            }
            tx.commit()?;
            Ok(inserted)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn badges_are_awarded_once() {
        let db = Database::in_memory().unwrap();
        let now = Utc::now();

        let first = db
            .insert_badges(&[Badge::Focus1h, Badge::Streak3], now)
            .await
            .unwrap();
        let second = db
            .insert_badges(&[Badge::Streak3, Badge::PerfectFocus], now)
            .await
            .unwrap();

        assert_eq!(first, vec![Badge::Focus1h, Badge::Streak3]);
        assert_eq!(second, vec![Badge::PerfectFocus]);
        assert_eq!(db.list_badges().await.unwrap().len(), 3);
    }
}
