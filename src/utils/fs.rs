use anyhow::Result;
use std::path::PathBuf;

/// Expand tilde (~) in file paths to home directory
pub fn expand_tilde(path: &str) -> Result<PathBuf> {
    if path.starts_with('~') {
        let home = dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?;
        Ok(home.join(&path[2..]))
    } else {
        Ok(PathBuf::from(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_tilde_leaves_absolute_paths_alone() {
        assert_eq!(
            expand_tilde("/var/lib/podsync").unwrap(),
            PathBuf::from("/var/lib/podsync")
        );
    }
}
