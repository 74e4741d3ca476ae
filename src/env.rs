//! The environment contract shared with shells and action scripts.

use anyhow::{Context as _, Result};
use camino::Utf8PathBuf;

use cfgtree_store::{unescape, CfgPath};

pub const ACTIVE_ROOT: &str = "ACTIVE_ROOT";
pub const CHANGES_ROOT: &str = "CHANGES_ROOT";
pub const WORKING_ROOT: &str = "WORKING_ROOT";
pub const TMP_ROOT: &str = "TMP_ROOT";
pub const TEMPLATE_ROOT: &str = "TEMPLATE_ROOT";
pub const EDIT_LEVEL: &str = "EDIT_LEVEL";
pub const TEMPLATE_LEVEL: &str = "TEMPLATE_LEVEL";

/// Set when error-location prefixes should be forwarded to the caller
/// instead of stripped.
pub const OUTPUT_ERROR_LOCATION: &str = "OUTPUT_ERROR_LOCATION";

pub const DEFAULT_ACTIVE_ROOT: &str = "/var/lib/cfgtree/active";
pub const DEFAULT_TEMPLATE_ROOT: &str = "/usr/share/cfgtree/templates";
pub const DEFAULT_SESSION_PREFIX: &str = "/var/run/cfgtree";

pub const PRE_COMMIT_HOOK_DIR: &str = "/etc/cfgtree/pre-hooks.d";
pub const POST_COMMIT_HOOK_DIR: &str = "/etc/cfgtree/post-hooks.d";

/// The five storage roots, from the environment with per-session
/// defaults keyed by the invoking shell's process group.
pub struct Roots {
    pub active: Utf8PathBuf,
    pub changes: Utf8PathBuf,
    pub working: Utf8PathBuf,
    pub tmp: Utf8PathBuf,
    pub templates: Utf8PathBuf,
}

impl Roots {
    pub fn from_env() -> Result<Roots> {
        let session = session_id();
        Ok(Roots {
            active: var_or(ACTIVE_ROOT, DEFAULT_ACTIVE_ROOT.to_owned())?,
            changes: var_or(
                CHANGES_ROOT,
                format!("{DEFAULT_SESSION_PREFIX}/changes/{session}"),
            )?,
            working: var_or(
                WORKING_ROOT,
                format!("{DEFAULT_SESSION_PREFIX}/work/{session}"),
            )?,
            tmp: var_or(TMP_ROOT, format!("{DEFAULT_SESSION_PREFIX}/tmp/{session}"))?,
            templates: var_or(TEMPLATE_ROOT, DEFAULT_TEMPLATE_ROOT.to_owned())?,
        })
    }

    /// The environment exported to action scripts and hooks.
    pub fn to_env(&self) -> Vec<(String, String)> {
        vec![
            (ACTIVE_ROOT.to_owned(), self.active.to_string()),
            (CHANGES_ROOT.to_owned(), self.changes.to_string()),
            (WORKING_ROOT.to_owned(), self.working.to_string()),
            (TMP_ROOT.to_owned(), self.tmp.to_string()),
            (TEMPLATE_ROOT.to_owned(), self.templates.to_string()),
        ]
    }
}

fn var_or(name: &str, default: String) -> Result<Utf8PathBuf> {
    match std::env::var(name) {
        Ok(v) if !v.is_empty() => Ok(Utf8PathBuf::from(v)),
        Ok(_) => Ok(Utf8PathBuf::from(default)),
        Err(std::env::VarError::NotPresent) => Ok(Utf8PathBuf::from(default)),
        Err(e) => Err(e).with_context(|| format!("environment variable {name}")),
    }
}

fn session_id() -> String {
    // the shell exports the roots in normal operation; the fallback
    // keys a private session to the invoking process group
    nix::unistd::getpgrp().to_string()
}

/// Parses an edit-level environment value: a slash-joined sequence of
/// escaped path components.
pub fn parse_edit_level() -> CfgPath {
    match std::env::var(EDIT_LEVEL) {
        Ok(level) => level
            .split('/')
            .filter(|c| !c.is_empty())
            .map(unescape)
            .collect(),
        Err(_) => CfgPath::root(),
    }
}

/// Formats a logical path as an edit-level environment value.
pub fn format_edit_level(path: &CfgPath) -> String {
    let mut s = String::from("/");
    for comp in path.components() {
        if s.len() > 1 {
            s.push('/');
        }
        s.push_str(&cfgtree_store::escape(comp));
    }
    s
}
