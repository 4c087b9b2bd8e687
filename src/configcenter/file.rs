/// Namespaces loaded from a directory of YAML files
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{parse_namespace_entries, ConfigCenter};
use crate::config::Namespace;
use crate::error::{TidegateError, TidegateResult};

/// Static snapshot of every `*.yaml`/`*.yml` file under one directory.
///
/// The snapshot is taken at construction; any malformed or duplicate
/// namespace fails construction.
#[derive(Debug)]
pub struct FileConfigCenter {
    path: PathBuf,
    namespaces: BTreeMap<String, Namespace>,
}

impl FileConfigCenter {
    pub fn new<P: AsRef<Path>>(path: P) -> TidegateResult<Self> {
        let path = path.as_ref().to_path_buf();
        let dir = fs::read_dir(&path).map_err(|e| {
            TidegateError::config_center(format!("read namespace dir {:?}: {}", path, e))
        })?;

        let mut files = Vec::new();
        for entry in dir {
            let entry = entry.map_err(|e| {
                TidegateError::config_center(format!("read namespace dir {:?}: {}", path, e))
            })?;
            let file = entry.path();
            let is_yaml = matches!(
                file.extension().and_then(|ext| ext.to_str()),
                Some("yaml") | Some("yml")
            );
            if file.is_file() && is_yaml {
                files.push(file);
            }
        }
        files.sort();

        let mut entries = Vec::with_capacity(files.len());
        for file in files {
            let data = fs::read(&file).map_err(|e| {
                TidegateError::config_center(format!("read namespace file {:?}: {}", file, e))
            })?;
            entries.push((file.display().to_string(), data));
        }

        let namespaces = parse_namespace_entries(entries, true)?
            .into_iter()
            .map(|ns| (ns.namespace.clone(), ns))
            .collect::<BTreeMap<_, _>>();
        debug!(path = ?path, count = namespaces.len(), "loaded namespaces from files");

        Ok(Self { path, namespaces })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConfigCenter for FileConfigCenter {
    async fn get_namespace(&self, name: &str) -> TidegateResult<Namespace> {
        self.namespaces
            .get(name)
            .cloned()
            .ok_or_else(|| TidegateError::config_center(format!("namespace {} not found", name)))
    }

    async fn list_all_namespaces(&self) -> TidegateResult<Vec<Namespace>> {
        Ok(self.namespaces.values().cloned().collect())
    }
}
