use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::definitions::file::{self, DefinitionFile};
use crate::definitions::{
    ControlUnitDefinition, Definition, DefinitionStore, OperationDefinition, ResultDefinition, StringTable,
};
use crate::Result;

/// Definitions held in memory, indexed by id. Control units keep their load order so lookups by
/// address are deterministic.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    units: Vec<Arc<ControlUnitDefinition>>,
    tables: Vec<Arc<StringTable>>,
    index: HashMap<String, Definition>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `*.json` file below `dir`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let mut store = Self::new();
        store.load_dir(dir)?;
        Ok(store)
    }

    /// Load every `*.json` file below `dir`, visiting files in sorted path order. Files that fail to
    /// parse are skipped. Returns the number of files loaded.
    pub fn load_dir(&mut self, dir: impl AsRef<Path>) -> Result<usize> {
        let mut paths = vec![];
        collect_json_files(dir.as_ref(), &mut paths)?;
        paths.sort();

        let mut loaded = 0;
        for path in paths {
            let json = match std::fs::read_to_string(&path) {
                Ok(json) => json,
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            };
            match self.load_str(&json) {
                Ok(()) => loaded += 1,
                Err(e) => warn!("Skipping {}: {}", path.display(), e),
            }
        }

        info!(
            "Loaded {} definition files from {} ({} units, {} string tables)",
            loaded,
            dir.as_ref().display(),
            self.units.len(),
            self.tables.len()
        );
        Ok(loaded)
    }

    /// Load a single definition file.
    pub fn load_str(&mut self, json: &str) -> Result<()> {
        match file::parse(json)? {
            DefinitionFile::Ecu(unit) => self.insert_unit(unit.into_definition()?),
            DefinitionFile::StringTable(table) => self.insert_table(table.into_definition()?),
        }
        Ok(())
    }

    /// Add a control unit, replacing any earlier one with the same id.
    pub fn insert_unit(&mut self, unit: ControlUnitDefinition) {
        if let Some(pos) = self.units.iter().position(|u| u.id == unit.id) {
            debug!("Unit {} exists, overwriting", unit.id);
            let old = self.units.remove(pos);
            self.unindex(&old);
        }

        let unit = Arc::new(unit);
        for operation in unit.operations.values() {
            self.index_operation(operation);
        }
        self.index
            .insert(unit.id.clone(), Definition::ControlUnit(unit.clone()));
        self.units.push(unit);
    }

    /// Add a string table, replacing any earlier one with the same id.
    pub fn insert_table(&mut self, table: StringTable) {
        self.tables.retain(|t| t.id != table.id);
        self.tables.push(Arc::new(table));
    }

    pub fn units(&self) -> &[Arc<ControlUnitDefinition>] {
        &self.units
    }

    pub fn tables(&self) -> &[Arc<StringTable>] {
        &self.tables
    }

    /// Families present in the loaded definitions.
    pub fn families(&self) -> BTreeSet<String> {
        self.units
            .iter()
            .filter_map(|unit| unit.family.clone())
            .collect()
    }

    fn index_operation(&mut self, operation: &Arc<OperationDefinition>) {
        for result in operation.results.values() {
            self.index_result(result);
        }
        self.index
            .insert(operation.id.clone(), Definition::Operation(operation.clone()));
    }

    fn index_result(&mut self, result: &Arc<ResultDefinition>) {
        self.index
            .insert(result.id.clone(), Definition::Result(result.clone()));
    }

    /// Drop the index entries of `unit`, leaving ids that another unit has since claimed.
    fn unindex(&mut self, unit: &Arc<ControlUnitDefinition>) {
        for operation in unit.operations.values() {
            for result in operation.results.values() {
                self.unindex_entry(&result.id, |d| matches!(d, Definition::Result(r) if Arc::ptr_eq(r, result)));
            }
            self.unindex_entry(&operation.id, |d| {
                matches!(d, Definition::Operation(o) if Arc::ptr_eq(o, operation))
            });
        }
        self.unindex_entry(&unit.id, |d| matches!(d, Definition::ControlUnit(u) if Arc::ptr_eq(u, unit)));
    }

    fn unindex_entry(&mut self, id: &str, owned: impl FnOnce(&Definition) -> bool) {
        if self.index.get(id).is_some_and(owned) {
            self.index.remove(id);
        }
    }

    fn find_table(&self, table: &str) -> Option<&Arc<StringTable>> {
        // Later tables win, same as replacing on load
        self.tables
            .iter()
            .rev()
            .find(|t| t.name == table || t.id == table)
    }
}

fn collect_json_files(dir: &Path, paths: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_json_files(&path, paths)?;
        } else if path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    Ok(())
}

impl DefinitionStore for MemoryStore {
    fn find_by_address(&self, address: u8) -> Vec<Arc<ControlUnitDefinition>> {
        self.units
            .iter()
            .filter(|unit| unit.address == Some(address))
            .cloned()
            .collect()
    }

    fn find_by_family(&self, family: &str) -> Vec<Arc<ControlUnitDefinition>> {
        self.units
            .iter()
            .filter(|unit| {
                unit.family
                    .as_deref()
                    .is_some_and(|f| f.eq_ignore_ascii_case(family))
            })
            .cloned()
            .collect()
    }

    fn find_by_id(&self, id: &str) -> Option<Definition> {
        self.index.get(id).cloned()
    }

    fn find_string(&self, table: &str, number: u64) -> Option<String> {
        let number = u8::try_from(number).ok()?;
        self.find_table(table)?.entries.get(&number).cloned()
    }

    fn has_string_table(&self, table: &str) -> bool {
        self.find_table(table).is_some()
    }

    fn reload(&mut self, dir: &Path) -> Result<()> {
        *self = MemoryStore::from_dir(dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::Error;

    fn unit(id: &str, address: u8, parent: Option<&str>) -> ControlUnitDefinition {
        ControlUnitDefinition {
            address: Some(address),
            parent: parent.map(String::from),
            ..ControlUnitDefinition::new(id, id)
        }
    }

    #[test]
    fn test_find_by_address_keeps_load_order() {
        let mut store = MemoryStore::new();
        store.insert_unit(unit("b", 0x12, None));
        store.insert_unit(unit("a", 0x12, None));
        store.insert_unit(unit("c", 0x32, None));

        let ids: Vec<_> = store.find_by_address(0x12).iter().map(|u| u.id.clone()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert!(store.find_by_address(0x80).is_empty());
    }

    #[test]
    fn test_replace_same_id() {
        let mut store = MemoryStore::new();
        store.insert_unit(unit("a", 0x12, None));
        store.insert_unit(unit("a", 0x32, None));

        assert_eq!(store.units().len(), 1);
        assert!(store.find_by_address(0x12).is_empty());
        assert_eq!(store.find_by_address(0x32).len(), 1);
    }

    #[test]
    fn test_replace_keeps_ids_claimed_by_other_units() {
        let shared = Arc::new(OperationDefinition::new("shared-op", "status"));
        let mut first = unit("a", 0x12, None);
        first.operations.insert("status".into(), shared);
        let mut second = unit("b", 0x12, None);
        let reused = Arc::new(OperationDefinition::new("shared-op", "status"));
        second.operations.insert("status".into(), reused.clone());

        let mut store = MemoryStore::new();
        store.insert_unit(first);
        store.insert_unit(second);
        // The new version of "a" no longer has the operation "b" took over
        store.insert_unit(unit("a", 0x12, None));

        match store.find_by_id("shared-op") {
            Some(Definition::Operation(operation)) => assert!(Arc::ptr_eq(&operation, &reused)),
            other => panic!("expected b's operation, got {:?}", other),
        }
        assert!(store.find_by_id("a").is_some());
        assert!(store.find_by_id("b").is_some());
    }

    #[test]
    fn test_parent_chain() {
        let mut store = MemoryStore::new();
        store.insert_unit(unit("base", 0x12, None));
        store.insert_unit(unit("mid", 0x12, Some("base")));
        store.insert_unit(unit("leaf", 0x12, Some("mid")));

        let leaf = store.find_by_id("leaf").unwrap();
        let chain: Vec<_> = store
            .resolve_parent_chain(&leaf)
            .unwrap()
            .iter()
            .map(|d| d.id().to_string())
            .collect();
        assert_eq!(chain, vec!["leaf", "mid", "base"]);
    }

    #[test]
    fn test_parent_chain_errors() {
        let mut store = MemoryStore::new();
        store.insert_unit(unit("a", 0x12, Some("b")));
        store.insert_unit(unit("b", 0x12, Some("a")));
        store.insert_unit(unit("orphan", 0x12, Some("missing")));

        let a = store.find_by_id("a").unwrap();
        assert_eq!(store.resolve_parent_chain(&a), Err(Error::Cycle("a".into())));

        let orphan = store.find_by_id("orphan").unwrap();
        assert_eq!(
            store.resolve_parent_chain(&orphan),
            Err(Error::MissingParent {
                id: "orphan".into(),
                parent: "missing".into()
            })
        );
    }

    #[test]
    fn test_find_string() {
        let mut store = MemoryStore::new();
        store.insert_table(StringTable {
            id: "t-1".into(),
            name: "gears".into(),
            entries: [(1, "first".to_string())].into(),
        });

        assert_eq!(store.find_string("gears", 1).as_deref(), Some("first"));
        assert_eq!(store.find_string("t-1", 1).as_deref(), Some("first"));
        assert_eq!(store.find_string("gears", 2), None);
        assert_eq!(store.find_string("gears", 0x101), None);
        assert!(!store.has_string_table("other"));
    }
}
