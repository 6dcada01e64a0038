//! # MPEG-DASH manifests
//!
//! The MPD is read with [`roxmltree`], which keeps the byte position of every node and
//! attribute, so the rewriter can replace `BaseURL` texts and `SegmentTemplate`
//! attributes in place and leave the rest of the document untouched.
//!
//! ## Addressing
//!
//! Segment urls are found from, in order of precedence:
//!
//! *   `SegmentTemplate` with a `SegmentTimeline` (explicit addressing);
//! *   `SegmentTemplate` with `@duration` or `@endNumber` (simple addressing);
//! *   `SegmentList`;
//! *   `SegmentBase`, where the representation `BaseURL` is the whole media file.
//!
//! `SegmentTemplate` attributes are inherited from Period to AdaptationSet to
//! Representation, the nearest one wins. `BaseURL`s are chained along the same path,
//! starting at the MPD.
//!
//! Live (`MPD@type="dynamic"`) manifests are handled like static ones: every segment
//! the MPD currently lists is mirrored once.

mod parser;
pub mod template;
pub mod timeline;
mod url;

pub use parser::parse;
pub(crate) use url::merge_baseurls;
