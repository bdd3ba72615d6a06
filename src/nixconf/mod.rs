//! Targeted edits of the declarative skills config.
//!
//! The config is a Nix attribute set whose direct children are source
//! blocks:
//!
//! ```nix
//! {
//!   anthropic-skills = {
//!     url = "github:anthropics/skills";
//!     flake = false;
//!     baseDir = "skills";
//!     catalogs = {
//!       anthropic-skills = "skills";
//!     };
//!     selection.enable = [
//!       "pdf"
//!     ];
//!   };
//! }
//! ```
//!
//! Nothing here is a Nix parser. A line-oriented brace-depth scanner finds
//! blocks and lists, and edits splice only the lines they own so comments
//! and formatting elsewhere survive byte for byte.

pub mod blocks;
pub mod builder;
pub mod selection;

pub use blocks::{SourceBlock, extract_source_blocks, join_lines, line_ending, split_lines};
pub use builder::{CatalogLayout, NewSource, build_source_block, derive_catalogs, insert_source_block};
pub use selection::{MergeOutcome, update_selection_in_lines};
