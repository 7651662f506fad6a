//! Abstract queries and their translation to store queries.
//!
//! A query is a JSON object. Keys ending in [`RESERVED_MARKER`] are control
//! keys; all other keys are field filters:
//!
//! | key       | meaning                                              |
//! |-----------|------------------------------------------------------|
//! | `sort$`   | `{field: n}`, descending when `n < 0`; first field only |
//! | `limit$`  | maximum number of results                            |
//! | `skip$`   | number of results to skip                            |
//! | `fields$` | projection, object or array of field names           |
//! | `load$`   | `remove` returns the removed entity (default true)   |
//! | `all$`    | `remove` deletes every match                         |
//! | `native$` | `filter` or `[filter, meta]` passed through verbatim |

mod meta;
mod model;
mod translate;

pub use meta::{MetaDoc, SortDirection, SortSpec};
pub use model::Query;
pub use translate::{to_filter, to_meta};

/// Suffix that marks a query key as a control key.
pub const RESERVED_MARKER: char = '$';

/// Identity field name on the entity side.
pub const ID_FIELD: &str = "id";

/// Primary key field name on the store side.
pub const STORE_ID_FIELD: &str = "_id";

/// Truthiness of a control value: `null`, `false`, `0` and `""` are off.
pub(crate) fn truthy(value: &serde_json::Value) -> bool {
    use serde_json::Value;
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
