//! Conversion of raw map responses into [`ScanObject`]s

use super::{FortKind, MapObjectsResponse};
use crate::models::{Coordinate, ScanObject};

/// Render an encounter id the way object ids are stored
pub fn encounter_key(encounter_id: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    if encounter_id == 0 {
        return String::from("0");
    }

    let mut n = encounter_id;
    let mut buf = Vec::with_capacity(13);
    while n > 0 {
        buf.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    buf.reverse();
    buf.into_iter().map(char::from).collect()
}

/// Normalize a response observed at unix time `now_ms` (milliseconds)
///
/// - Wild creatures expire `time_till_hidden_ms` after `now_ms`
/// - A lured checkpoint additionally yields the lured creature at the
///   checkpoint's location, expiring with the lure
/// - Checkpoints carry the lure flag, strongholds their owning team
pub fn normalize(response: &MapObjectsResponse, now_ms: i64) -> Vec<ScanObject> {
    let mut objects = Vec::new();

    for cell in &response.cells {
        for creature in &cell.wild_creatures {
            // Remote-supplied; a negative value means already hidden
            let hidden_in = creature.time_till_hidden_ms.max(0);
            let expiry = now_ms.saturating_add(hidden_in).div_euclid(1000);
            objects.push(ScanObject::creature(
                encounter_key(creature.encounter_id),
                creature.species,
                Coordinate::new(creature.lat, creature.lng),
                expiry,
            ));
        }

        for fort in &cell.forts {
            let at = Coordinate::new(fort.lat, fort.lng);
            match fort.kind {
                FortKind::Checkpoint => {
                    if let Some(lure) = &fort.lure {
                        objects.push(ScanObject::creature(
                            encounter_key(lure.encounter_id),
                            lure.active_species,
                            at,
                            lure.expires_at_ms.div_euclid(1000),
                        ));
                    }
                    objects.push(ScanObject::checkpoint(
                        fort.id.clone(),
                        at,
                        fort.active_modifier,
                    ));
                }
                FortKind::Stronghold => {
                    objects.push(ScanObject::stronghold(
                        fort.id.clone(),
                        at,
                        fort.owned_by_team,
                    ));
                }
            }
        }
    }

    objects
}
