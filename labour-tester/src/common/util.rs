use chrono::Utc;
use std::path::{Path, PathBuf};

/// Timestamped scratch directory for one scenario run. Per-seed folders go
/// beneath it.
pub fn run_dir(base: &Path, scenario: &str) -> PathBuf {
    let ts = Utc::now().format("%Y%m%dT%H%M%S");
    base.join(scenario).join(ts.to_string())
}

pub fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(|x| x.trim().to_string())
        .filter(|x| !x.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_csv_trims_and_filters() {
        let parts = split_csv(" alpha, ,beta,  gamma ");
        assert_eq!(parts, vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn run_dir_includes_key_segments() {
        let dir = run_dir(Path::new("target/out"), "smoke");
        let rendered = dir.to_string_lossy().replace('\\', "/");
        assert!(rendered.starts_with("target/out/smoke/"));
        assert_eq!(dir.components().count(), 4);
    }
}
