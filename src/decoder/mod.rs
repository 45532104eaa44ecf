//! Decoders for the flat textual records returned by upstream feeds.
//!
//! Upstream text is semi-trusted, so neither decoder ever fails: malformed
//! input degrades to an empty record or an empty sequence. Only the shapes
//! the feeds actually produce are understood:
//! - `flat`: one `{"key":"value",...}` record, list literals kept verbatim
//! - `list`: a `[{...},{...}]` list of flat records, possibly embedded in
//!   surrounding text

pub mod flat;
pub mod list;

pub use flat::FlatRecordDecoder;
pub use list::RecordListDecoder;
