use chrono::{DateTime, Utc};

/// A fact recorded on an aggregate stream.
///
/// Implementors are plain data: once committed they are never edited, and a
/// change of shape ships under a new `schema_version`.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Dotted name stored next to the payload, e.g. `lending.return.inspected`.
    fn event_type(&self) -> &'static str;

    fn schema_version(&self) -> u32;

    /// Business time carried by the command, not the append time.
    fn occurred_at(&self) -> DateTime<Utc>;
}
