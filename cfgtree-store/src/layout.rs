//! On-disk layout names shared with external consumers of the store.
//!
//! Every non-value node is a directory named with its escaped component.
//! Everything else hangs off the node directory as the files below.

/// Leaf values, one per line, newline terminated.
pub const VAL_FILE: &str = "node.val";
/// Template definition file (under the template root).
pub const DEF_FILE: &str = "node.def";
/// Generic tag-child template directory (under the template root).
pub const TAG_DIR: &str = "node.tag";

/// Node is deactivated.
pub const MARKER_DEACTIVATED: &str = ".disable";
/// Leaf value equals the schema default.
pub const MARKER_DEFAULT: &str = "def";
/// Node changed in this session (working layer only).
pub const MARKER_CHANGED: &str = ".modified";
/// Session has uncommitted-to-disk configuration.
pub const MARKER_UNSAVED: &str = ".unsaved";
/// Node comment text.
pub const COMMENT_FILE: &str = ".comment";

/// Prefix of whiteout entries in the change layer.
pub const WHITEOUT_PREFIX: &str = ".wh.";
/// Whiteout hiding the entire shadowed level.
pub const OPAQUE_WHITEOUT: &str = ".wh.__dir_opaque";

/// Commit marker file, one committed path per line, leading `-` for delete.
pub const COMMITTED_FILE: &str = ".changes";
/// Advisory lock taken for the duration of a commit.
pub const LOCK_FILE: &str = ".commit-lock";

/// Whiteout entry name for a child component (already escaped).
pub fn whiteout_name(escaped: &str) -> String {
    format!("{WHITEOUT_PREFIX}{escaped}")
}

/// Whether a directory entry is internal bookkeeping rather than a child
/// node. Child nodes never start with `.`.
pub fn is_internal_entry(name: &str) -> bool {
    name.starts_with('.')
}
