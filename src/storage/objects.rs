//! Geolocated object records

use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, OptionalExtension, Row};

use super::error::StoreResult;
use super::sqlite::{map_duplicate, placeholders, SqliteStore};
use super::ObjectStore;
use crate::models::{Coordinate, ObjectKind, ScanObject};

const OBJECT_COLUMNS: &str = "id, kind, lat, lng, expiry, species, team, lured";

fn object_from_row(row: &Row<'_>) -> rusqlite::Result<ScanObject> {
    let code: i64 = row.get(1)?;
    let kind = ObjectKind::from_code(code).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            Type::Integer,
            format!("unknown object kind {code}").into(),
        )
    })?;

    Ok(ScanObject {
        kind,
        id: row.get(0)?,
        lat: row.get(2)?,
        lng: row.get(3)?,
        expiry: row.get(4)?,
        species: row.get(5)?,
        team: row.get(6)?,
        lured: row.get(7)?,
    })
}

impl ObjectStore for SqliteStore {
    fn query_at(
        &self,
        center: Coordinate,
        radius_m: f64,
        kinds: &[ObjectKind],
        now: i64,
    ) -> StoreResult<Vec<ScanObject>> {
        if kinds.is_empty() || radius_m < 0.0 {
            return Ok(Vec::new());
        }

        let (dlat, dlng) = center.bounding_deltas(radius_m);

        let mut sql = format!(
            "SELECT {OBJECT_COLUMNS} FROM objects
             WHERE kind IN ({})
               AND (expiry = 0 OR expiry > ?)
               AND lat BETWEEN ? AND ?",
            placeholders(kinds.len())
        );
        let mut values: Vec<Value> = kinds.iter().map(|k| Value::Integer(k.code())).collect();
        values.push(Value::Integer(now));
        values.push(Value::Real(center.lat - dlat));
        values.push(Value::Real(center.lat + dlat));

        // Boxes crossing the antimeridian fall back to the exact filter only
        if center.lng - dlng >= -180.0 && center.lng + dlng <= 180.0 {
            sql.push_str(" AND lng BETWEEN ? AND ?");
            values.push(Value::Real(center.lng - dlng));
            values.push(Value::Real(center.lng + dlng));
        }

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), object_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut found = Vec::with_capacity(rows.len());
        for object in rows {
            let distance = center.distance_m(&object.coordinate());
            if distance <= radius_m {
                found.push((distance, object));
            }
        }

        found.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(found.into_iter().map(|(_, object)| object).collect())
    }

    fn write(&self, object: &ScanObject) -> StoreResult<()> {
        let insert = format!(
            "INSERT INTO objects ({OBJECT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
        );
        let sql = if object.kind.is_ephemeral() {
            insert
        } else {
            format!(
                "{insert}
                 ON CONFLICT(id) DO UPDATE SET
                     kind = excluded.kind,
                     lat = excluded.lat,
                     lng = excluded.lng,
                     expiry = excluded.expiry,
                     species = excluded.species,
                     team = excluded.team,
                     lured = excluded.lured"
            )
        };

        let conn = self.conn()?;
        conn.execute(
            &sql,
            params![
                object.id,
                object.kind.code(),
                object.lat,
                object.lng,
                object.expiry,
                object.species,
                object.team,
                object.lured
            ],
        )
        .map_err(|e| map_duplicate(e, "object", &object.id))?;

        Ok(())
    }

    fn purge_expired(&self, threshold: i64) -> StoreResult<usize> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM objects WHERE kind = ?1 AND expiry != 0 AND expiry < ?2",
            params![ObjectKind::Creature.code(), threshold],
        )?;
        Ok(removed)
    }

    fn get(&self, id: &str) -> StoreResult<Option<ScanObject>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {OBJECT_COLUMNS} FROM objects WHERE id = ?1"),
                params![id],
                object_from_row,
            )
            .optional()?;

        Ok(row)
    }

    fn count(&self) -> StoreResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM objects", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
