use std::fmt;

use corral_model::JobId;

use crate::StoreError;

/// Store-relative path made of validated segments, e.g. `job_17_0001/script.py`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemotePath(Vec<String>);

impl RemotePath {
    /// Path of `logical_name` inside the namespace of `scope`.
    pub fn scoped(scope: &JobId, logical_name: &str) -> Result<Self, StoreError> {
        Self::from_segments([scope.as_str(), logical_name])
    }

    pub fn from_segments<I, S>(segments: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = Vec::new();
        for seg in segments {
            let seg = seg.as_ref();
            if !is_valid_segment(seg) {
                return Err(StoreError::InvalidPath(seg.to_string()));
            }
            out.push(seg.to_string());
        }
        if out.is_empty() {
            return Err(StoreError::InvalidPath(String::new()));
        }
        Ok(Self(out))
    }

    /// Parse a `/`-separated relative path.
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        Self::from_segments(s.split('/'))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Final segment.
    pub fn file_name(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or_default()
    }
}

/// A segment is a plain file name: non-empty, no separators, no dot-only names.
pub(crate) fn is_valid_segment(seg: &str) -> bool {
    !seg.is_empty()
        && seg != "."
        && seg != ".."
        && !seg.contains('/')
        && !seg.contains('\\')
        && !seg.contains('\0')
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoped_path_joins_scope_and_name() {
        let p = RemotePath::scoped(&JobId::from("job_1"), "input.txt").unwrap();
        assert_eq!(p.to_string(), "job_1/input.txt");
        assert_eq!(p.file_name(), "input.txt");
    }

    #[test]
    fn traversal_is_rejected() {
        assert!(RemotePath::scoped(&JobId::from("job_1"), "..").is_err());
        assert!(RemotePath::scoped(&JobId::from("job_1"), "a/b").is_err());
        assert!(RemotePath::parse("job_1//x").is_err());
        assert!(RemotePath::parse("").is_err());
    }

    #[test]
    fn names_with_spaces_are_fine() {
        let p = RemotePath::parse("job_1/my input.txt").unwrap();
        assert_eq!(p.file_name(), "my input.txt");
    }
}
