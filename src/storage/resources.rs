//! Identity and egress records

use rusqlite::{params, params_from_iter, OptionalExtension, Row};

use super::error::{StoreError, StoreResult};
use super::sqlite::{map_duplicate, placeholders, SqliteStore};
use super::ResourceStore;
use crate::models::{Egress, EgressStats, Identity, IdentityStats, StatusEntry};

const IDENTITY_COLUMNS: &str = "name, secret, provider, used, banned";

fn identity_from_row(row: &Row<'_>) -> rusqlite::Result<Identity> {
    Ok(Identity {
        name: row.get(0)?,
        secret: row.get(1)?,
        provider: row.get(2)?,
        used: row.get(3)?,
        banned: row.get(4)?,
    })
}

fn egress_from_row(row: &Row<'_>) -> rusqlite::Result<Egress> {
    Ok(Egress {
        id: row.get(0)?,
        in_use: row.get(1)?,
        dead: row.get(2)?,
    })
}

impl ResourceStore for SqliteStore {
    fn claim_identity(&self) -> StoreResult<Identity> {
        let conn = self.conn()?;
        let claimed = conn
            .query_row(
                &format!(
                    "UPDATE identities SET used = 1
                     WHERE name = (
                         SELECT name FROM identities WHERE used = 0 AND banned = 0 LIMIT 1
                     ) AND used = 0 AND banned = 0
                     RETURNING {IDENTITY_COLUMNS}"
                ),
                [],
                identity_from_row,
            )
            .optional()?;

        claimed.ok_or(StoreError::NotAvailable {
            resource: "identity",
        })
    }

    fn claim_egress(&self) -> StoreResult<Egress> {
        let conn = self.conn()?;
        let claimed = conn
            .query_row(
                "UPDATE egress SET in_use = 1
                 WHERE id = (
                     SELECT id FROM egress WHERE in_use = 0 AND dead = 0 LIMIT 1
                 ) AND in_use = 0 AND dead = 0
                 RETURNING id, in_use, dead",
                [],
                egress_from_row,
            )
            .optional()?;

        claimed.ok_or(StoreError::NotAvailable { resource: "egress" })
    }

    fn release_identity(&self, name: &str) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE identities SET used = 0 WHERE name = ?1",
            params![name],
        )?;
        Ok(())
    }

    fn release_egress(&self, id: i64) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute("UPDATE egress SET in_use = 0 WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn ban_identity(&self, name: &str) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE identities SET banned = 1 WHERE name = ?1",
            params![name],
        )?;
        Ok(())
    }

    fn kill_egress(&self, id: i64) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute("UPDATE egress SET dead = 1 WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn reconcile(&self, assignments: &[StatusEntry]) -> StoreResult<usize> {
        let names: Vec<&str> = assignments
            .iter()
            .map(|a| a.account_name.as_str())
            .collect();
        let ids: Vec<i64> = assignments.iter().map(|a| a.proxy_id).collect();

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut changed = 0;

        if names.is_empty() {
            changed += tx.execute("UPDATE identities SET used = 0 WHERE used = 1", [])?;
            changed += tx.execute("UPDATE egress SET in_use = 0 WHERE in_use = 1", [])?;
        } else {
            let names_in = placeholders(names.len());
            let ids_in = placeholders(ids.len());

            changed += tx.execute(
                &format!("UPDATE identities SET used = 1 WHERE used = 0 AND name IN ({names_in})"),
                params_from_iter(names.iter()),
            )?;
            changed += tx.execute(
                &format!(
                    "UPDATE identities SET used = 0 WHERE used = 1 AND name NOT IN ({names_in})"
                ),
                params_from_iter(names.iter()),
            )?;
            changed += tx.execute(
                &format!("UPDATE egress SET in_use = 1 WHERE in_use = 0 AND id IN ({ids_in})"),
                params_from_iter(ids.iter()),
            )?;
            changed += tx.execute(
                &format!("UPDATE egress SET in_use = 0 WHERE in_use = 1 AND id NOT IN ({ids_in})"),
                params_from_iter(ids.iter()),
            )?;
        }

        tx.commit()?;
        tracing::info!(
            assignments = assignments.len(),
            changed,
            "Reconciled resource usage flags"
        );
        Ok(changed)
    }

    fn identity_stats(&self) -> StoreResult<IdentityStats> {
        let conn = self.conn()?;
        let (total, used, banned): (i64, i64, i64) = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(used = 1 AND banned = 0), 0),
                    COALESCE(SUM(banned = 1), 0)
             FROM identities",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        Ok(IdentityStats {
            total: total as usize,
            used: used as usize,
            banned: banned as usize,
        })
    }

    fn egress_stats(&self) -> StoreResult<EgressStats> {
        let conn = self.conn()?;
        let (alive, alive_used): (i64, i64) = conn.query_row(
            "SELECT COALESCE(SUM(dead = 0), 0), COALESCE(SUM(dead = 0 AND in_use = 1), 0)
             FROM egress",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(EgressStats {
            alive: alive as usize,
            alive_used: alive_used as usize,
        })
    }

    fn get_identity(&self, name: &str) -> StoreResult<Option<Identity>> {
        let conn = self.conn()?;
        let identity = conn
            .query_row(
                &format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE name = ?1"),
                params![name],
                identity_from_row,
            )
            .optional()?;
        Ok(identity)
    }

    fn get_egress(&self, id: i64) -> StoreResult<Option<Egress>> {
        let conn = self.conn()?;
        let egress = conn
            .query_row(
                "SELECT id, in_use, dead FROM egress WHERE id = ?1",
                params![id],
                egress_from_row,
            )
            .optional()?;
        Ok(egress)
    }

    fn banned_identities(&self) -> StoreResult<Vec<Identity>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM identities WHERE banned = 1 ORDER BY name"
        ))?;
        let identities = stmt
            .query_map([], identity_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(identities)
    }

    fn add_identity(&self, identity: &Identity) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO identities (name, secret, provider, used, banned)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                identity.name,
                identity.secret,
                identity.provider,
                identity.used,
                identity.banned
            ],
        )
        .map_err(|e| map_duplicate(e, "identity", &identity.name))?;
        Ok(())
    }

    fn add_egress(&self, id: i64) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute("INSERT INTO egress (id) VALUES (?1)", params![id])
            .map_err(|e| map_duplicate(e, "egress", &id.to_string()))?;
        Ok(())
    }

    fn drop_all_egress(&self) -> StoreResult<usize> {
        let conn = self.conn()?;
        Ok(conn.execute("DELETE FROM egress", [])?)
    }

    fn remove_dead_egress(&self) -> StoreResult<usize> {
        let conn = self.conn()?;
        Ok(conn.execute("DELETE FROM egress WHERE dead = 1", [])?)
    }
}
