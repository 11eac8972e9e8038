//! Bookkeeping columns of mirror tables and the freshness rules built on them.

use chrono::NaiveDateTime;
use georm_proto::{PhaseState, Record, Value};

use crate::query::ExtraSelect;
use crate::sql::ColumnType;

pub const SOURCE_COLUMN: &str = "Source";
pub const DATE_CREATED_COLUMN: &str = "DateCreated";
pub const COMPLETE_COLUMN: &str = "Complete";
pub const METADATA_COMPLETE_COLUMN: &str = "MetadataComplete";
pub const METADATA_DATE_CREATED_COLUMN: &str = "MetadataDateCreated";
pub const PAYLOAD_COMPLETE_COLUMN: &str = "PayloadComplete";
pub const PAYLOAD_DATE_CREATED_COLUMN: &str = "PayloadDateCreated";

/// Bookkeeping columns of a mirror table, in column order.
pub fn columns(two_phase: bool) -> Vec<(&'static str, ColumnType)> {
    let mut columns = vec![
        (SOURCE_COLUMN, ColumnType::String),
        (DATE_CREATED_COLUMN, ColumnType::DateTime),
        (COMPLETE_COLUMN, ColumnType::Bool),
    ];
    if two_phase {
        columns.extend([
            (METADATA_COMPLETE_COLUMN, ColumnType::Bool),
            (METADATA_DATE_CREATED_COLUMN, ColumnType::DateTime),
            (PAYLOAD_COMPLETE_COLUMN, ColumnType::Bool),
            (PAYLOAD_DATE_CREATED_COLUMN, ColumnType::DateTime),
        ]);
    }
    columns
}

/// Extra selects reading the bookkeeping columns back.
pub fn extras(two_phase: bool) -> Vec<ExtraSelect> {
    columns(two_phase)
        .into_iter()
        .map(|(name, ty)| ExtraSelect::column(name, ty))
        .collect()
}

/// Value written to a bookkeeping column for a record cached at `now`.
pub fn value(column: &str, record: &Record, now: NaiveDateTime) -> Value {
    let phase_complete = |phase: &Option<PhaseState>| {
        Value::Bool(phase.as_ref().map(|p| p.complete).unwrap_or(false))
    };
    let phase_created = |phase: &Option<PhaseState>| {
        Value::DateTime(phase.as_ref().and_then(|p| p.date_created).unwrap_or(now))
    };
    let extended = &record.extended;
    match column {
        SOURCE_COLUMN => Value::String(extended.source.clone().unwrap_or_default()),
        DATE_CREATED_COLUMN => Value::DateTime(now),
        COMPLETE_COLUMN => Value::Bool(record.is_complete()),
        METADATA_COMPLETE_COLUMN => phase_complete(&extended.metadata),
        METADATA_DATE_CREATED_COLUMN => phase_created(&extended.metadata),
        PAYLOAD_COMPLETE_COLUMN => phase_complete(&extended.payload),
        PAYLOAD_DATE_CREATED_COLUMN => phase_created(&extended.payload),
        _ => Value::Null,
    }
}

/// Move bookkeeping values from the record's extra map into its typed
/// extended-data fields.
pub fn apply(record: &mut Record) {
    let extra = &mut record.extended.extra;
    let mut take = |column: &str| extra.remove(column).filter(|v| !v.is_null());

    let source = take(SOURCE_COLUMN);
    let created = take(DATE_CREATED_COLUMN);
    let complete = take(COMPLETE_COLUMN);
    let metadata = phase(take(METADATA_COMPLETE_COLUMN), take(METADATA_DATE_CREATED_COLUMN));
    let payload = phase(take(PAYLOAD_COMPLETE_COLUMN), take(PAYLOAD_DATE_CREATED_COLUMN));

    let extended = &mut record.extended;
    if let Some(source) = source.and_then(|v| v.as_str().map(str::to_string)) {
        extended.source = Some(source);
    }
    extended.date_created = created.and_then(|v| v.as_datetime());
    extended.complete = complete.and_then(|v| v.as_bool());
    extended.metadata = metadata;
    extended.payload = payload;
}

fn phase(complete: Option<Value>, created: Option<Value>) -> Option<PhaseState> {
    if complete.is_none() && created.is_none() {
        return None;
    }
    Some(PhaseState::new(
        complete.and_then(|v| v.as_bool()).unwrap_or(false),
        created.and_then(|v| v.as_datetime()),
    ))
}

/// Apply the TTL to a cached record.
///
/// Returns `false` when the record must be treated as absent: its creation
/// time is unknown or older than `ttl`. For two-phase records each phase
/// older than `ttl` is marked incomplete, which also marks the record
/// incomplete.
pub fn retain_fresh(
    record: &mut Record,
    two_phase: bool,
    now: NaiveDateTime,
    ttl: chrono::Duration,
) -> bool {
    let expired = |created: Option<NaiveDateTime>| match created {
        Some(created) => now - created > ttl,
        None => true,
    };

    if expired(record.extended.date_created) {
        return false;
    }

    if two_phase {
        let extended = &mut record.extended;
        for phase in [&mut extended.metadata, &mut extended.payload] {
            if let Some(state) = phase {
                if state.complete && expired(state.date_created) {
                    state.complete = false;
                    extended.complete = Some(false);
                }
            }
        }
    }
    true
}
