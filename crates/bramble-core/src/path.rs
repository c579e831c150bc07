use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

/// Lexically normalizes a local filesystem path.
///
/// `.` segments are dropped and `..` segments pop the previous segment when possible. Leading `..`
/// segments of relative paths are preserved. This does not hit the filesystem and does not
/// resolve symlinks.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut prefix: Option<OsString> = None;
    let mut has_root = false;
    let mut stack: Vec<OsString> = Vec::new();

    for component in path.components() {
        match component {
            Component::Prefix(prefix_component) => {
                prefix = Some(prefix_component.as_os_str().to_owned());
            }
            Component::RootDir => has_root = true,
            Component::CurDir => {}
            Component::ParentDir => {
                if let Some(last) = stack.last() {
                    if last != ".." {
                        stack.pop();
                        continue;
                    }
                }

                if !has_root {
                    stack.push(OsString::from(".."));
                }
            }
            Component::Normal(segment) => stack.push(segment.to_owned()),
        }
    }

    let mut out = PathBuf::new();
    match (prefix, has_root) {
        (Some(mut prefix), true) => {
            prefix.push(std::path::MAIN_SEPARATOR.to_string());
            out.push(prefix);
        }
        (Some(prefix), false) => out.push(prefix),
        (None, true) => out.push(std::path::MAIN_SEPARATOR.to_string()),
        (None, false) => {}
    }
    out.extend(stack);
    out
}

/// Converts a cell-relative filesystem path into the forward-slash form used by package paths.
///
/// Returns `None` if the path contains anything other than normal segments.
pub fn to_package_path(relative: &Path) -> Option<String> {
    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(segment) => segments.push(segment.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(segments.join("/"))
}

/// Converts a forward-slash package path into a relative filesystem path.
pub fn package_path_to_relative(package: &str) -> PathBuf {
    package
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect()
}

/// Checks that `path` is a well-formed package path: empty, or `/`-separated non-empty segments
/// without `.`/`..` and without leading or trailing slashes.
pub(crate) fn validate_package_path(path: &str) -> Result<(), &'static str> {
    if path.is_empty() {
        return Ok(());
    }
    if path.starts_with('/') {
        return Err("package path must not start with `/`");
    }
    if path.ends_with('/') {
        return Err("package path must not end with `/`");
    }
    for segment in path.split('/') {
        match segment {
            "" => return Err("package path contains an empty segment"),
            "." | ".." => return Err("package path must not contain `.` or `..`"),
            _ if segment.contains("...") => return Err("`...` is only valid as a suffix"),
            _ if segment.contains(':') => return Err("package path must not contain `:`"),
            _ => {}
        }
    }
    Ok(())
}
