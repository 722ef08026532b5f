/// Maps caller-relative paths to backend keys under a working directory.
///
/// This is plain string prefixing: no `..`, duplicate slash or case
/// normalization is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    prefix: String,
}

impl PathResolver {
    /// `work_dir` is the configured working directory, e.g. `/` or `/data/`
    pub fn new(work_dir: &str) -> Self {
        let prefix = work_dir.strip_prefix('/').unwrap_or(work_dir);
        Self {
            prefix: prefix.to_string(),
        }
    }

    /// Key prefix every absolute key starts with
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn to_absolute(&self, path: &str) -> String {
        format!("{}{}", self.prefix, path)
    }

    /// Strip the working directory; keys outside it come back unchanged
    pub fn to_relative(&self, key: &str) -> String {
        key.strip_prefix(self.prefix.as_str())
            .unwrap_or(key)
            .to_string()
    }
}
