use std::fmt;

/// Stable surrogate key of one managed instance
///
/// Assigned by the owning session when the instance is first seen and never
/// reused within that session. All identity lookups in the queue (insert
/// dependency analysis, unresolved tracking, orphan routing) go through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct InstanceId(pub u64);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Secondary sort classifier of an action (identifier or collection key)
///
/// Example: `SortKey::Int(42)` for the row with primary key 42
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum SortKey {
    /// Key not yet known (e.g. store-generated identifier)
    Unassigned,
    Int(i64),
    Text(String),
    Composite(Vec<SortKey>),
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortKey::Unassigned => write!(f, "<unassigned>"),
            SortKey::Int(value) => write!(f, "{value}"),
            SortKey::Text(value) => write!(f, "{value}"),
            SortKey::Composite(parts) => {
                write!(f, "(")?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{part}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl From<i64> for SortKey {
    fn from(value: i64) -> Self {
        SortKey::Int(value)
    }
}

impl From<&str> for SortKey {
    fn from(value: &str) -> Self {
        SortKey::Text(value.to_string())
    }
}
