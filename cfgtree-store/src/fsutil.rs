//! Small filesystem helpers shared by the store internals.

use std::fs;

use anyhow::{Context, Result};
use camino::Utf8Path;

/// Reads a whole file, returning `None` if it does not exist.
pub fn read_file_opt(path: &Utf8Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("failed to read {path}")),
    }
}

/// Writes a whole file, creating parent directories as needed.
pub fn write_file(path: &Utf8Path, data: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("failed to create {parent}"))?;
    }
    fs::write(path, data).with_context(|| format!("failed to write {path}"))
}

/// Appends a line to a file, creating it (and parents) as needed.
pub fn append_line(path: &Utf8Path, line: &str) -> Result<()> {
    use std::io::Write as _;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("failed to create {parent}"))?;
    }
    let mut f = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {path}"))?;
    writeln!(f, "{line}").with_context(|| format!("failed to write {path}"))
}

/// Removes a file if present; missing files are not an error.
pub fn remove_file_if_exists(path: &Utf8Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("failed to remove {path}")),
    }
}

/// Removes a directory tree if present.
pub fn remove_tree_if_exists(path: &Utf8Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("failed to remove {path}")),
    }
}

/// Removes everything inside `dir`, keeping the directory itself.
pub fn remove_dir_contents(dir: &Utf8Path) -> Result<()> {
    for entry in dir
        .read_dir_utf8()
        .with_context(|| format!("failed to read {dir}"))?
    {
        let entry = entry.with_context(|| format!("failed to read entry of {dir}"))?;
        let p = entry.path();
        if entry
            .file_type()
            .with_context(|| format!("failed to stat {p}"))?
            .is_dir()
        {
            fs::remove_dir_all(p).with_context(|| format!("failed to remove {p}"))?;
        } else {
            fs::remove_file(p).with_context(|| format!("failed to remove {p}"))?;
        }
    }
    Ok(())
}

/// Counts all entries (files and directories) under `dir`, recursively.
pub fn count_entries(dir: &Utf8Path) -> Result<u64> {
    let mut count = 0;
    for entry in dir
        .read_dir_utf8()
        .with_context(|| format!("failed to read {dir}"))?
    {
        let entry = entry.with_context(|| format!("failed to read entry of {dir}"))?;
        count += 1;
        if entry
            .file_type()
            .with_context(|| format!("failed to stat {}", entry.path()))?
            .is_dir()
        {
            count += count_entries(entry.path())?;
        }
    }
    Ok(count)
}

/// Recursively copies `src` onto `dst`. Directories are always created;
/// files are copied only when `keep_file(name)` allows them.
pub fn copy_tree(src: &Utf8Path, dst: &Utf8Path, keep_file: &dyn Fn(&str) -> bool) -> Result<()> {
    fs::create_dir_all(dst).with_context(|| format!("failed to create {dst}"))?;
    for entry in src
        .read_dir_utf8()
        .with_context(|| format!("failed to read {src}"))?
    {
        let entry = entry.with_context(|| format!("failed to read entry of {src}"))?;
        let name = entry.file_name();
        let from = entry.path();
        let to = dst.join(name);
        if entry
            .file_type()
            .with_context(|| format!("failed to stat {from}"))?
            .is_dir()
        {
            copy_tree(from, &to, keep_file)?;
        } else if keep_file(name) {
            fs::copy(from, &to).with_context(|| format!("failed to copy {from} to {to}"))?;
        }
    }
    Ok(())
}

/// Lists the names of all entries in `dir`; missing directory yields empty.
pub fn dir_entry_names(dir: &Utf8Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let rd = match dir.read_dir_utf8() {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
        Err(e) => return Err(e).with_context(|| format!("failed to read {dir}")),
    };
    for entry in rd {
        let entry = entry.with_context(|| format!("failed to read entry of {dir}"))?;
        names.push(entry.file_name().to_owned());
    }
    Ok(names)
}
