use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
}

impl Paths {
    pub fn new() -> Self {
        let base = dirs::home_dir()
            .map(|h| h.join(".outreach"))
            .unwrap_or_else(|| PathBuf::from(".outreach"));
        Self { base }
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.json")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.base.join("state")
    }

    /// File backing one persisted namespace (e.g. `engagement`, `stats`).
    pub fn namespace_file(&self, namespace: &str) -> PathBuf {
        let safe = namespace.replace([':', '/', '\\', '.'], "_");
        self.state_dir().join(format!("{}.json", safe))
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.base.join("logs")
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.base)?;
        std::fs::create_dir_all(self.state_dir())?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_file_is_sanitized() {
        let paths = Paths::with_base(PathBuf::from("/tmp/outreach"));
        assert_eq!(
            paths.namespace_file("engagement"),
            PathBuf::from("/tmp/outreach/state/engagement.json")
        );
        assert_eq!(
            paths.namespace_file("a/b.c"),
            PathBuf::from("/tmp/outreach/state/a_b_c.json")
        );
    }
}
