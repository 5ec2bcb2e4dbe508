//! Persistence of the direction list under `health_meds_list`.

use super::error::{MedError, MedResult};
use super::shorthand;
use super::types::{key_name_of, Direction};
use crate::db::{get_json, set_json, KvStore, KvTxn};

pub const DIRECTIONS_KEY: &str = "health_meds_list";

/// Read the list inside `txn`, creating an empty one if the key is missing.
pub fn read_list(txn: &mut dyn KvTxn) -> MedResult<Vec<Direction>> {
    Ok(get_json(txn, DIRECTIONS_KEY)?.unwrap_or_default())
}

/// Persist the list, refreshing each cached shorthand.
pub fn write_list(txn: &mut dyn KvTxn, directions: &mut [Direction]) -> MedResult<()> {
    for direction in directions.iter_mut() {
        direction.direction_shorthand = shorthand::full_shorthand(direction);
    }
    set_json(txn, DIRECTIONS_KEY, &*directions)?;
    Ok(())
}

/// All directions. Writes an empty list on first use.
pub fn list(store: &dyn KvStore) -> MedResult<Vec<Direction>> {
    {
        let mut txn = store.begin(false)?;
        if txn.get(DIRECTIONS_KEY)?.is_some() {
            return read_list(txn.as_mut());
        }
    }

    let mut txn = store.begin(true)?;
    let mut directions = read_list(txn.as_mut())?;
    write_list(txn.as_mut(), &mut directions)?;
    txn.commit()?;
    tracing::debug!("created empty direction list");
    Ok(directions)
}

/// Find a direction by key name or by its full name, case-insensitively.
pub fn resolve<'a>(directions: &'a [Direction], name: &str) -> Option<&'a Direction> {
    let wanted = name.trim().to_lowercase();
    directions
        .iter()
        .find(|d| d.key_name() == wanted)
        .or_else(|| directions.iter().find(|d| d.name.to_lowercase() == wanted))
}

/// Validate and insert `direction`, replacing any with the same key name.
pub fn upsert(store: &dyn KvStore, mut direction: Direction) -> MedResult<Direction> {
    direction.validate()?;
    direction.direction_shorthand = shorthand::full_shorthand(&direction);
    let key = direction.key_name();

    let mut txn = store.begin(true)?;
    let mut directions = read_list(txn.as_mut())?;
    match directions.iter_mut().find(|d| d.key_name() == key) {
        Some(existing) => *existing = direction.clone(),
        None => directions.push(direction.clone()),
    }
    write_list(txn.as_mut(), &mut directions)?;
    txn.commit()?;

    tracing::info!(med = %key, shorthand = %direction.direction_shorthand, "direction saved");
    Ok(direction)
}

/// Remove the direction whose key name matches `name` case-insensitively.
pub fn delete(store: &dyn KvStore, name: &str) -> MedResult<Direction> {
    let key = key_name_of(name);

    let mut txn = store.begin(true)?;
    let mut directions = read_list(txn.as_mut())?;
    let pos = directions
        .iter()
        .position(|d| d.key_name() == key)
        .ok_or_else(|| MedError::not_found(format!("direction '{name}'")))?;
    let removed = directions.remove(pos);
    write_list(txn.as_mut(), &mut directions)?;
    txn.commit()?;

    tracing::info!(med = %key, "direction deleted");
    Ok(removed)
}
