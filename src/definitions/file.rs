//! On-disk JSON format: one control unit (`"file_type": "ecu"`) or one string table
//! (`"file_type": "string_table"`) per file.
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use tracing::warn;

use crate::definitions::{
    ControlUnitDefinition, DisplayRule, Error, OperationDefinition, ResultDefinition, ResultKind, StringTable,
};
use crate::packet::{ByteOrder, Protocol};
use crate::serial::TimingProfile;

/// Numbers may be written as JSON numbers or as strings, `"0x.."` for hex.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub(crate) enum Number {
    Int(u64),
    Float(f64),
    Text(String),
}

impl Number {
    fn to_u64(&self) -> Result<u64, Error> {
        match self {
            Number::Int(n) => Ok(*n),
            Number::Float(f) if f.fract() == 0.0 && *f >= 0.0 => Ok(*f as u64),
            Number::Float(f) => Err(Error::InvalidNumber(f.to_string())),
            Number::Text(s) => parse_number(s),
        }
    }

    /// Like `to_u64`, but bare strings are read as hex.
    fn to_hex_u64(&self) -> Result<u64, Error> {
        match self {
            Number::Text(s) => parse_hex(s),
            other => other.to_u64(),
        }
    }

    fn to_f64(&self) -> Result<f64, Error> {
        match self {
            Number::Int(n) => Ok(*n as f64),
            Number::Float(f) => Ok(*f),
            Number::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| Error::InvalidNumber(s.clone())),
        }
    }

    fn into_string(self) -> String {
        match self {
            Number::Int(n) => n.to_string(),
            Number::Float(f) => f.to_string(),
            Number::Text(s) => s,
        }
    }
}

/// Parse `0x` prefixed hex or plain decimal.
pub(crate) fn parse_number(s: &str) -> Result<u64, Error> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|_| Error::InvalidNumber(s.to_string()))
}

/// Parse hex with or without a `0x` prefix.
pub(crate) fn parse_hex(s: &str) -> Result<u64, Error> {
    let s = s.trim();
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    u64::from_str_radix(digits, 16).map_err(|_| Error::InvalidNumber(s.to_string()))
}

fn to_u8(n: u64) -> Result<u8, Error> {
    u8::try_from(n).map_err(|_| Error::InvalidNumber(format!("0x{:x}", n)))
}

fn to_u32(n: u64) -> Result<u32, Error> {
    u32::try_from(n).map_err(|_| Error::InvalidNumber(n.to_string()))
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.trim().is_empty())
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum MatchValue {
    One(Number),
    Many(Vec<Number>),
}

impl MatchValue {
    fn values(&self) -> Result<Vec<u64>, Error> {
        match self {
            MatchValue::One(n) => Ok(vec![n.to_u64()?]),
            MatchValue::Many(ns) => ns.iter().map(Number::to_u64).collect(),
        }
    }

    fn single(&self, key: &str) -> Result<u64, Error> {
        match self.values()?.as_slice() {
            [n] => Ok(*n),
            _ => Err(Error::InvalidFile(format!("{} takes a single value", key))),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "file_type", rename_all = "snake_case")]
pub(crate) enum DefinitionFile {
    Ecu(EcuFile),
    StringTable(StringTableFile),
}

#[derive(Debug, Deserialize)]
pub(crate) struct StringTableFile {
    uuid: String,
    table_name: String,
    #[serde(default)]
    strings: BTreeMap<String, String>,
}

impl StringTableFile {
    pub(crate) fn into_definition(self) -> Result<StringTable, Error> {
        let entries = self
            .strings
            .into_iter()
            .map(|(key, value)| Ok((to_u8(parse_hex(&key)?)?, value)))
            .collect::<Result<_, Error>>()?;

        Ok(StringTable {
            id: self.uuid,
            name: self.table_name,
            entries,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct EcuFile {
    uuid: String,
    name: String,
    family: Option<String>,
    address: Option<Number>,
    parent_id: Option<String>,
    #[serde(default)]
    protocol: Protocol,
    timing: Option<TimingProfile>,
    #[serde(default)]
    matches: BTreeMap<String, MatchValue>,
    #[serde(default)]
    operations: BTreeMap<String, OperationFile>,
}

impl EcuFile {
    pub(crate) fn into_definition(self) -> Result<ControlUnitDefinition, Error> {
        let address = match &self.address {
            Some(Number::Text(s)) if s.trim().is_empty() => None,
            Some(n) => Some(to_u8(n.to_hex_u64()?)?),
            None => None,
        };

        let mut unit = ControlUnitDefinition {
            id: self.uuid,
            name: self.name,
            family: non_empty(self.family),
            address,
            parent: non_empty(self.parent_id),
            protocol: self.protocol,
            timing: self.timing,
            ..Default::default()
        };

        for (key, value) in &self.matches {
            match key.as_str() {
                "part_number" | "part_numbers" => unit.part_numbers.extend(value.values()?),
                "diag_index" | "diag_indexes" => unit.diag_indexes.extend(value.values()?),
                "hardware_number" => unit.hardware_number = value.single(key)?,
                "software_number" => unit.software_number = value.single(key)?,
                "coding_index" => unit.coding_index = value.single(key)?,
                _ => warn!("{}: ignoring unknown match key {}", unit.id, key),
            }
        }

        for (name, operation) in self.operations {
            let operation = operation.into_definition(&unit.id, &name)?;
            unit.operations.insert(name, Arc::new(operation));
        }

        Ok(unit)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct OperationFile {
    uuid: Option<String>,
    command: Option<Vec<Number>>,
    parent_id: Option<String>,
    #[serde(default)]
    results: BTreeMap<String, ResultFile>,
}

impl OperationFile {
    fn into_definition(self, unit_id: &str, name: &str) -> Result<OperationDefinition, Error> {
        let id = non_empty(self.uuid).unwrap_or_else(|| format!("{}/{}", unit_id, name));

        let command_bytes = match self.command {
            Some(bytes) if !bytes.is_empty() => Some(
                bytes
                    .iter()
                    .map(|b| to_u8(b.to_hex_u64()?))
                    .collect::<Result<Vec<u8>, Error>>()?,
            ),
            _ => None,
        };

        let mut operation = OperationDefinition {
            id,
            name: name.to_string(),
            command_bytes,
            parent: non_empty(self.parent_id),
            results: BTreeMap::new(),
        };

        for (result_name, result) in self.results {
            let result = result.into_definition(&operation.id, &result_name)?;
            operation.results.insert(result_name, Arc::new(result));
        }

        Ok(operation)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResultFile {
    uuid: Option<String>,
    parent_id: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    display: Option<String>,
    start_pos: Option<Number>,
    length: Option<Number>,
    mask: Option<Number>,
    factor_a: Option<Number>,
    factor_b: Option<Number>,
    yes_value: Option<Number>,
    no_value: Option<Number>,
    #[serde(default)]
    levels: BTreeMap<String, String>,
    #[serde(alias = "table")]
    string_table: Option<String>,
    rpn: Option<String>,
    units: Option<String>,
    byte_order: Option<ByteOrder>,
}

impl ResultFile {
    fn into_definition(self, operation_id: &str, name: &str) -> Result<ResultDefinition, Error> {
        let id = non_empty(self.uuid).unwrap_or_else(|| format!("{}/{}", operation_id, name));

        let kind = non_empty(self.kind).and_then(|kind| match kind.parse::<ResultKind>() {
            Ok(kind) => Some(kind),
            Err(_) => {
                warn!("{}: unknown result type {:?}", id, kind);
                None
            }
        });
        // Free-form display strings (printf formats and the like) just mean "no rule"
        let display = non_empty(self.display).and_then(|display| display.parse::<DisplayRule>().ok());

        let levels = self
            .levels
            .into_iter()
            .map(|(key, value)| Ok((parse_hex(&key)?, value)))
            .collect::<Result<_, Error>>()?;

        Ok(ResultDefinition {
            name: name.to_string(),
            parent: non_empty(self.parent_id),
            kind,
            start_pos: self.start_pos.map(|n| n.to_u64().and_then(to_u32)).transpose()?,
            length: self.length.map(|n| n.to_u64().and_then(to_u32)).transpose()?,
            mask: self.mask.map(|n| n.to_u64()).transpose()?,
            factor_a: self.factor_a.map(|n| n.to_f64()).transpose()?,
            factor_b: self.factor_b.map(|n| n.to_f64()).transpose()?,
            yes_value: self.yes_value.map(Number::into_string),
            no_value: self.no_value.map(Number::into_string),
            levels,
            string_table: non_empty(self.string_table),
            rpn: non_empty(self.rpn),
            units: non_empty(self.units),
            byte_order: self.byte_order,
            display,
            id,
        })
    }
}

/// Parse one definition file.
pub(crate) fn parse(json: &str) -> crate::Result<DefinitionFile> {
    Ok(serde_json::from_str(json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    const DME: &str = r#"{
        "file_type": "ecu",
        "uuid": "dme-ms41",
        "name": "MS41",
        "family": "DME",
        "address": "0x12",
        "parent_id": "",
        "matches": { "part_number": "1429861", "diag_index": [ "0x11", 18 ], "coding_index": 5 },
        "operations": {
            "identify": {
                "uuid": "dme-ms41-identify",
                "command": [ "0x00" ],
                "results": {
                    "part_number": { "type": "hex", "display": "%s", "start_pos": 0, "length": 4 },
                    "mil": { "type": "bool", "start_pos": 5, "length": 1, "mask": "0x80", "yes_value": "0x80", "no_value": 0 }
                }
            },
            "status": { "parent_id": "dme-base-status" }
        }
    }"#;

    #[test]
    fn test_parse_ecu() {
        let DefinitionFile::Ecu(file) = parse(DME).unwrap() else {
            panic!("expected an ecu file");
        };
        let unit = file.into_definition().unwrap();

        assert_eq!(unit.id, "dme-ms41");
        assert_eq!(unit.address, Some(0x12));
        assert_eq!(unit.parent, None);
        assert_eq!(unit.protocol, Protocol::DS2);
        assert_eq!(unit.part_numbers, BTreeSet::from([1429861]));
        assert_eq!(unit.diag_indexes, BTreeSet::from([0x11, 18]));
        assert_eq!(unit.coding_index, 5);

        let identify = &unit.operations["identify"];
        assert_eq!(identify.command_bytes, Some(vec![0x00]));

        let mil = &identify.results["mil"];
        assert_eq!(mil.id, "dme-ms41-identify/mil");
        assert_eq!(mil.kind, Some(ResultKind::Boolean));
        assert_eq!(mil.mask, Some(0x80));
        assert_eq!(mil.yes_value.as_deref(), Some("0x80"));
        assert_eq!(mil.no_value.as_deref(), Some("0"));

        assert_eq!(identify.results["part_number"].display, None);

        let status = &unit.operations["status"];
        assert_eq!(status.id, "dme-ms41/status");
        assert_eq!(status.command_bytes, None);
        assert_eq!(status.parent.as_deref(), Some("dme-base-status"));
    }

    #[test]
    fn test_parse_string_table() {
        let json = r#"{ "file_type": "string_table", "uuid": "t1", "table_name": "gears",
                        "strings": { "0x01": "first", "0A": "tenth" } }"#;
        let DefinitionFile::StringTable(file) = parse(json).unwrap() else {
            panic!("expected a string table");
        };
        let table = file.into_definition().unwrap();
        assert_eq!(table.name, "gears");
        assert_eq!(table.entries[&1], "first");
        assert_eq!(table.entries[&10], "tenth");
    }

    #[test]
    fn test_invalid_address() {
        let json = r#"{ "file_type": "ecu", "uuid": "x", "name": "x", "address": "0x1ff" }"#;
        let DefinitionFile::Ecu(file) = parse(json).unwrap() else {
            panic!("expected an ecu file");
        };
        assert!(matches!(file.into_definition(), Err(Error::InvalidNumber(_))));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(parse_number("0x1A").unwrap(), 26);
        assert_eq!(parse_number(" 42 ").unwrap(), 42);
        assert_eq!(parse_hex("1a").unwrap(), 26);
        assert!(parse_number("zz").is_err());
    }
}
