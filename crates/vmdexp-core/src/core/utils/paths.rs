/// Whether `name` can be used as a single directory name.
///
/// Rejects empty names, `.` and `..`, and anything containing a path
/// separator or a NUL byte.
pub fn is_plain_component(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\', '\0'])
}
