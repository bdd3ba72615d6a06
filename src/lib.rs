//! skills-add: add agent skill sources to a declarative Nix skills config.
//!
//! The library classifies source specifiers, discovers skills in fetched
//! repositories, and edits the config and its companion `flake.nix` in
//! place. The binary crate adds the CLI (clap) on top.

pub mod add;
pub mod commit;
pub mod config;
pub mod discover;
pub mod error;
pub mod git;
pub mod nixconf;
pub mod source;
pub mod sync;
pub mod text;
