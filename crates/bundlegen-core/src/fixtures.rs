//! Sample fixture store and the in-memory fixture set.
//!
//! The baseline content of every fixture ships inside the library; a
//! generation run starts from [`FixtureSet::sample`] and patches or extends
//! individual files.

use std::collections::BTreeMap;

pub const CONFIG_JSON: &str = "config.json";
pub const EVENTS_TABLE: &str = "events_table.csv";
pub const UNIFIED_JOBS_TABLE: &str = "unified_jobs_table.csv";

/// Every file contained in a bundle, in archive order.
pub const FIXTURE_FILES: [&str; 14] = [
    CONFIG_JSON,
    "counts.json",
    "cred_type_counts.json",
    EVENTS_TABLE,
    "instance_info.json",
    "inventory_counts.json",
    "job_counts.json",
    "job_instance_counts.json",
    "manifest.json",
    "org_counts.json",
    "projects_by_scm_type.json",
    "query_info.json",
    "unified_job_template_table.csv",
    UNIFIED_JOBS_TABLE,
];

macro_rules! sample {
    ($name:literal) => {
        (
            $name,
            include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/sample_data/", $name)) as &[u8],
        )
    };
}

const SAMPLE_DATA: [(&str, &[u8]); 14] = [
    sample!("config.json"),
    sample!("counts.json"),
    sample!("cred_type_counts.json"),
    sample!("events_table.csv"),
    sample!("instance_info.json"),
    sample!("inventory_counts.json"),
    sample!("job_counts.json"),
    sample!("job_instance_counts.json"),
    sample!("manifest.json"),
    sample!("org_counts.json"),
    sample!("projects_by_scm_type.json"),
    sample!("query_info.json"),
    sample!("unified_job_template_table.csv"),
    sample!("unified_jobs_table.csv"),
];

/// Baseline content of a fixture, or `None` for an unknown name.
pub fn sample_bytes(name: &str) -> Option<&'static [u8]> {
    SAMPLE_DATA
        .iter()
        .find(|(file, _)| *file == name)
        .map(|(_, bytes)| *bytes)
}

/// Content of all bundle files, keyed by file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureSet {
    files: BTreeMap<&'static str, Vec<u8>>,
}

impl FixtureSet {
    /// Fixture set holding the shipped sample content of every file.
    pub fn sample() -> Self {
        let files = SAMPLE_DATA
            .iter()
            .map(|(name, bytes)| (*name, bytes.to_vec()))
            .collect();
        Self { files }
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(Vec::as_slice)
    }

    pub(crate) fn table_mut(&mut self, name: &'static str) -> &mut Vec<u8> {
        self.files.entry(name).or_default()
    }

    /// Replace the content of a known fixture. Unknown names are ignored.
    pub fn set(&mut self, name: &str, content: Vec<u8>) {
        if let Some(slot) = self.files.get_mut(name) {
            *slot = content;
        }
    }

    /// Iterate over `(name, content)` in [`FIXTURE_FILES`] order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &[u8])> + '_ {
        FIXTURE_FILES
            .iter()
            .filter_map(move |name| self.files.get(name).map(|c| (*name, c.as_slice())))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_covers_every_file() {
        let set = FixtureSet::sample();
        assert_eq!(set.len(), FIXTURE_FILES.len());
        for name in FIXTURE_FILES {
            assert!(set.get(name).is_some(), "missing {name}");
        }
        let names: Vec<_> = set.iter().map(|(n, _)| n).collect();
        assert_eq!(names, FIXTURE_FILES.to_vec());
    }

    #[test]
    fn test_json_samples_parse() {
        for name in FIXTURE_FILES.iter().filter(|n| n.ends_with(".json")) {
            let bytes = sample_bytes(name).unwrap();
            serde_json::from_slice::<serde_json::Value>(bytes)
                .unwrap_or_else(|e| panic!("{name}: {e}"));
        }
    }

    #[test]
    fn test_set_ignores_unknown_names() {
        let mut set = FixtureSet::sample();
        set.set("unknown.csv", b"x".to_vec());
        assert_eq!(set.len(), 14);
        assert!(set.get("unknown.csv").is_none());
    }
}
