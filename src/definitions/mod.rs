//! Declarative control unit definitions and the store they live in.
//!
//! Control units, operations and results may each name a `parent` of the same kind. Inheritance is
//! resolved on demand by walking parent links nearest-first through the store, definitions
//! themselves are immutable once loaded.

pub mod error;
mod family;
mod file;
mod store;

pub use error::Error;
pub use family::{address_for_family, Family};
pub use store::MemoryStore;

pub(crate) use file::parse_number;

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;

use strum_macros::{Display, EnumString};

use crate::packet::{ByteOrder, Protocol};
use crate::serial::{Timing, TimingProfile};

/// How the bytes of a result are turned into a value.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Display, EnumString)]
#[strum(ascii_case_insensitive, serialize_all = "lowercase")]
pub enum ResultKind {
    /// `raw * factor_a + factor_b`
    #[strum(to_string = "numeric", serialize = "number", serialize = "int", serialize = "integer")]
    Numeric,
    #[strum(to_string = "boolean", serialize = "bool")]
    Boolean,
    /// Index into a string table or the inline levels
    #[strum(to_string = "enumerated", serialize = "enum", serialize = "string_table")]
    Enumerated,
    /// Computed from an expression over other results
    #[strum(to_string = "rpn", serialize = "composite")]
    Rpn,
    /// ASCII bytes
    #[strum(to_string = "text", serialize = "string", serialize = "ascii")]
    Text,
    /// Bytes rendered as a hex string, used for BCD encoded numbers
    #[strum(to_string = "hex", serialize = "bcd")]
    Hex,
}

/// How a numeric value is presented.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Display, EnumString)]
#[strum(ascii_case_insensitive, serialize_all = "lowercase")]
pub enum DisplayRule {
    #[strum(to_string = "integer", serialize = "int")]
    Integer,
    Float,
    Hex,
}

/// One ECU variant: how it identifies itself and what it can be asked.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlUnitDefinition {
    pub id: String,
    pub name: String,
    pub family: Option<String>,
    pub address: Option<u8>,
    pub parent: Option<String>,
    pub protocol: Protocol,
    pub timing: Option<TimingProfile>,
    pub part_numbers: BTreeSet<u64>,
    pub diag_indexes: BTreeSet<u64>,
    pub hardware_number: u64,
    pub software_number: u64,
    pub coding_index: u64,
    pub operations: BTreeMap<String, Arc<OperationDefinition>>,
}

impl ControlUnitDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Whether there is anything to tell this unit apart from its siblings.
    pub fn has_match_data(&self) -> bool {
        !(self.part_numbers.is_empty() && self.diag_indexes.is_empty())
    }
}

/// A request and the results its reply carries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationDefinition {
    pub id: String,
    pub name: String,
    pub command_bytes: Option<Vec<u8>>,
    pub parent: Option<String>,
    pub results: BTreeMap<String, Arc<ResultDefinition>>,
}

impl OperationDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }
}

/// A named value inside a reply. Unset fields are inherited from `parent`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultDefinition {
    pub id: String,
    pub name: String,
    pub parent: Option<String>,
    pub kind: Option<ResultKind>,
    pub start_pos: Option<u32>,
    pub length: Option<u32>,
    pub mask: Option<u64>,
    pub factor_a: Option<f64>,
    pub factor_b: Option<f64>,
    pub yes_value: Option<String>,
    pub no_value: Option<String>,
    /// Inline enumeration, consulted before `string_table`
    pub levels: BTreeMap<u64, String>,
    /// String table name or id
    pub string_table: Option<String>,
    pub rpn: Option<String>,
    pub units: Option<String>,
    pub byte_order: Option<ByteOrder>,
    pub display: Option<DisplayRule>,
}

impl ResultDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Fill every field still unset from `parent`.
    pub fn inherit(&mut self, parent: &ResultDefinition) {
        fn fill<T: Clone>(field: &mut Option<T>, parent: &Option<T>) {
            if field.is_none() {
                field.clone_from(parent);
            }
        }

        fill(&mut self.kind, &parent.kind);
        fill(&mut self.start_pos, &parent.start_pos);
        fill(&mut self.length, &parent.length);
        fill(&mut self.mask, &parent.mask);
        fill(&mut self.factor_a, &parent.factor_a);
        fill(&mut self.factor_b, &parent.factor_b);
        fill(&mut self.yes_value, &parent.yes_value);
        fill(&mut self.no_value, &parent.no_value);
        fill(&mut self.string_table, &parent.string_table);
        fill(&mut self.rpn, &parent.rpn);
        fill(&mut self.units, &parent.units);
        fill(&mut self.byte_order, &parent.byte_order);
        fill(&mut self.display, &parent.display);
        if self.levels.is_empty() {
            self.levels.clone_from(&parent.levels);
        }
    }
}

/// Maps a decoded index to a human readable string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringTable {
    pub id: String,
    pub name: String,
    pub entries: BTreeMap<u8, String>,
}

/// Any definition addressable by id.
#[derive(Debug, Clone, PartialEq)]
pub enum Definition {
    ControlUnit(Arc<ControlUnitDefinition>),
    Operation(Arc<OperationDefinition>),
    Result(Arc<ResultDefinition>),
}

impl Definition {
    pub fn id(&self) -> &str {
        match self {
            Definition::ControlUnit(unit) => &unit.id,
            Definition::Operation(operation) => &operation.id,
            Definition::Result(result) => &result.id,
        }
    }

    pub fn parent(&self) -> Option<&str> {
        match self {
            Definition::ControlUnit(unit) => unit.parent.as_deref(),
            Definition::Operation(operation) => operation.parent.as_deref(),
            Definition::Result(result) => result.parent.as_deref(),
        }
    }

    fn same_kind(&self, other: &Definition) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// Read access to loaded definitions, plus exclusive reload.
pub trait DefinitionStore {
    /// Control units at `address`, in load order.
    fn find_by_address(&self, address: u8) -> Vec<Arc<ControlUnitDefinition>>;

    /// Control units of `family` (case insensitive), in load order.
    fn find_by_family(&self, family: &str) -> Vec<Arc<ControlUnitDefinition>>;

    fn find_by_id(&self, id: &str) -> Option<Definition>;

    /// Look up `number` in the string table with the given name or id.
    fn find_string(&self, table: &str, number: u64) -> Option<String>;

    /// Whether a string table with the given name or id exists.
    fn has_string_table(&self, table: &str) -> bool;

    /// Replace the store contents with the definitions found under `dir`.
    fn reload(&mut self, dir: &Path) -> crate::Result<()>;

    /// `definition` followed by its ancestors, nearest first.
    fn resolve_parent_chain(&self, definition: &Definition) -> Result<Vec<Definition>, Error> {
        let mut chain = vec![definition.clone()];
        let mut seen = HashSet::from([definition.id().to_string()]);

        loop {
            let current = &chain[chain.len() - 1];
            let Some(parent_id) = current.parent() else {
                break;
            };

            let parent = self.find_by_id(parent_id).ok_or_else(|| Error::MissingParent {
                id: current.id().to_string(),
                parent: parent_id.to_string(),
            })?;
            if !parent.same_kind(definition) {
                return Err(Error::WrongParentKind {
                    id: current.id().to_string(),
                    parent: parent_id.to_string(),
                });
            }
            if !seen.insert(parent.id().to_string()) {
                return Err(Error::Cycle(definition.id().to_string()));
            }

            chain.push(parent);
        }

        Ok(chain)
    }

    fn unit_chain(&self, unit: &Arc<ControlUnitDefinition>) -> Result<Vec<Arc<ControlUnitDefinition>>, Error> {
        let chain = self.resolve_parent_chain(&Definition::ControlUnit(unit.clone()))?;
        Ok(chain
            .into_iter()
            .filter_map(|d| match d {
                Definition::ControlUnit(unit) => Some(unit),
                _ => None,
            })
            .collect())
    }

    fn operation_chain(&self, operation: &Arc<OperationDefinition>) -> Result<Vec<Arc<OperationDefinition>>, Error> {
        let chain = self.resolve_parent_chain(&Definition::Operation(operation.clone()))?;
        Ok(chain
            .into_iter()
            .filter_map(|d| match d {
                Definition::Operation(operation) => Some(operation),
                _ => None,
            })
            .collect())
    }

    fn result_chain(&self, result: &Arc<ResultDefinition>) -> Result<Vec<Arc<ResultDefinition>>, Error> {
        let chain = self.resolve_parent_chain(&Definition::Result(result.clone()))?;
        Ok(chain
            .into_iter()
            .filter_map(|d| match d {
                Definition::Result(result) => Some(result),
                _ => None,
            })
            .collect())
    }

    /// The operation called `name` on `unit` or, failing that, on its nearest ancestor.
    fn find_operation(&self, unit: &Arc<ControlUnitDefinition>, name: &str) -> Result<Arc<OperationDefinition>, Error> {
        self.unit_chain(unit)?
            .iter()
            .find_map(|u| u.operations.get(name).cloned())
            .ok_or_else(|| Error::UnknownOperation {
                unit: unit.id.clone(),
                operation: name.to_string(),
            })
    }

    /// Nearest concrete command along the operation's parent chain.
    fn operation_command(&self, operation: &Arc<OperationDefinition>) -> Result<Vec<u8>, Error> {
        self.operation_chain(operation)?
            .iter()
            .find_map(|o| o.command_bytes.clone())
            .ok_or_else(|| Error::Incomplete {
                id: operation.id.clone(),
                field: "command",
            })
    }

    /// Results of the whole operation chain, nearer definitions replacing farther ones by name.
    fn operation_results(
        &self,
        operation: &Arc<OperationDefinition>,
    ) -> Result<BTreeMap<String, Arc<ResultDefinition>>, Error> {
        let mut results = BTreeMap::new();
        for operation in self.operation_chain(operation)?.iter().rev() {
            for (name, result) in &operation.results {
                results.insert(name.clone(), result.clone());
            }
        }
        Ok(results)
    }

    /// `result` with every unset field filled in from its ancestors.
    fn resolve_result(&self, result: &Arc<ResultDefinition>) -> Result<ResultDefinition, Error> {
        let chain = self.result_chain(result)?;
        let mut resolved = result.as_ref().clone();
        for parent in chain.iter().skip(1) {
            resolved.inherit(parent);
        }
        Ok(resolved)
    }

    /// Timing for probing `address`: the slowest of the profiles registered there applied to `base`.
    fn timing_for_address(&self, address: u8, base: &Timing) -> Timing {
        self.find_by_address(address)
            .iter()
            .filter_map(|unit| unit.timing.as_ref())
            .map(|profile| base.with_profile(profile))
            .reduce(|a, b| a.slowest(&b))
            .unwrap_or(*base)
    }
}
