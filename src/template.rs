//! Statement templating: span edits against the original text, and the
//! interpolation of a concrete extent back into a template.

use tracing::debug;

use crate::eval::epoch_in;
use crate::model::{Extent, TimeFormat};
use crate::token::Span;

/// Stands for `<field> BETWEEN <start> AND <end>`.
pub const RANGE: &str = "<$RANGE$>";
/// Stands for the range start in the backend's time unit.
pub const TS1: &str = "<$TS1$>";
/// Stands for the range end in the backend's time unit.
pub const TS2: &str = "<$TS2$>";
/// Stands for the output format literal.
pub const FORMAT: &str = "<$FORMAT$>";

/// Format always requested upstream; responses are re-serialized for the client.
pub const UPSTREAM_FORMAT: &str = "TSVWithNamesAndTypes";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edit {
    pub span: Span,
    pub replacement: &'static str,
}

/// Non-overlapping replacements over an immutable statement.
#[derive(Debug, Clone, Default)]
pub struct Template {
    edits: Vec<Edit>,
}

impl Template {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a replacement. Empty spans and spans overlapping an earlier
    /// edit are refused and `false` is returned.
    pub fn replace(&mut self, span: Span, replacement: &'static str) -> bool {
        if span.is_empty() {
            return false;
        }
        if let Some(existing) = self.edits.iter().find(|e| e.span.overlaps(&span)) {
            debug!(
                start = span.start,
                end = span.end,
                kept = existing.replacement,
                refused = replacement,
                "overlapping template edit"
            );
            return false;
        }
        self.edits.push(Edit { span, replacement });
        true
    }

    /// Whether an existing edit already touches `span`.
    pub fn covers(&self, span: &Span) -> bool {
        self.edits.iter().any(|e| e.span.overlaps(span))
    }

    pub fn edits(&self) -> &[Edit] {
        &self.edits
    }

    /// Applies every edit to `original` in one pass.
    pub fn render(&self, original: &str) -> String {
        let mut edits = self.edits.clone();
        edits.sort_by_key(|e| e.span.start);

        let mut out = String::with_capacity(original.len());
        let mut cursor = 0;
        for edit in edits {
            out.push_str(&original[cursor..edit.span.start]);
            out.push_str(edit.replacement);
            cursor = edit.span.end;
        }
        out.push_str(&original[cursor..]);
        out
    }
}

/// Fills a templated statement with `extent`.
///
/// Bounds are written in `backend_format`. When the client reads a finer unit
/// than the backend stores, the BETWEEN end bound is rounded up so the last
/// client bucket is still selected.
pub fn interpolate_time_query(
    template: &str,
    field_name: &str,
    client_format: TimeFormat,
    backend_format: TimeFormat,
    extent: &Extent,
) -> String {
    let start = epoch_in(&extent.start, backend_format, false);
    let end = epoch_in(&extent.end, backend_format, false);
    let range_end = epoch_in(&extent.end, backend_format, client_format.is_finer_than(backend_format));

    template
        .replace(RANGE, &format!("{field_name} BETWEEN {start} AND {range_end}"))
        .replace(TS1, &start.to_string())
        .replace(TS2, &end.to_string())
        .replace(FORMAT, UPSTREAM_FORMAT)
}
