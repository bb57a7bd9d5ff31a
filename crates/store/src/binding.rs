//! Wiring between an aggregate type and its event table.

use daybook_core::{Aggregate, EventError, EventResult};
use daybook_events::registry::base_kind;

/// Names the event table for one aggregate type plus the single foreign-key
/// column referencing the aggregate's own table.
///
/// Both names end up interpolated into SQL as identifiers, so they are
/// validated at construction: lowercase snake_case with a leading letter.
/// An instance of this type is always well-formed wiring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTableBinding {
    table: String,
    aggregate_fk: String,
}

impl EventTableBinding {
    /// Wire an event table to exactly one aggregate reference.
    ///
    /// Zero references leave events unattributable and several make the
    /// owner ambiguous; both fail here, before any event exists.
    pub fn new(table: &str, aggregate_refs: &[&str]) -> EventResult<Self> {
        let fk = match aggregate_refs {
            [single] => *single,
            [] => {
                return Err(EventError::relationship(format!(
                    "event table '{table}' references no aggregate"
                )));
            }
            several => {
                return Err(EventError::relationship(format!(
                    "event table '{table}' references {} aggregates: {}",
                    several.len(),
                    several.join(", ")
                )));
            }
        };
        validate_identifier(table)?;
        validate_identifier(fk)?;
        Ok(Self {
            table: table.to_owned(),
            aggregate_fk: fk.to_owned(),
        })
    }

    /// Derive the conventional wiring for `A`: the last segment of
    /// [`Aggregate::KIND`] (qualifier stripped), snake-cased, names both the
    /// table and the foreign-key column. `"User"` wires to table
    /// `user_event_store` with column `user_id`.
    pub fn for_aggregate<A: Aggregate>() -> EventResult<Self> {
        let base = snake_case(last_segment(base_kind(A::KIND)));
        Self::new(&format!("{base}_event_store"), &[&format!("{base}_id")])
    }

    /// Event table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Foreign-key column holding the aggregate identity.
    pub fn aggregate_fk(&self) -> &str {
        &self.aggregate_fk
    }
}

fn last_segment(kind: &str) -> &str {
    kind.rsplit('.').next().unwrap_or(kind)
}

fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for ch in name.chars() {
        if ch.is_ascii_uppercase() {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Identifiers are interpolated into SQL, never bound, so anything outside
/// lowercase snake_case with a leading letter is rejected.
fn validate_identifier(name: &str) -> EventResult<()> {
    let mut chars = name.chars();
    let leading_ok = chars.next().is_some_and(|c| c.is_ascii_lowercase());
    if leading_ok && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
        Ok(())
    } else {
        Err(EventError::relationship(format!(
            "'{name}' is not a valid sql identifier"
        )))
    }
}
