//! Turns reply payloads into named, typed values using result definitions.
//!
//! Decoding is pure: it reads the [`DefinitionStore`] and the [`Packet`] and never mutates either.
//! Problems with the definitions themselves (broken inheritance, reference cycles) fail the whole
//! operation, problems with a single field land in [`Response::field_errors`].
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use ds2::decode::{Decoder, Value};
//! use ds2::definitions::{MemoryStore, OperationDefinition, ResultDefinition, ResultKind};
//! use ds2::packet::Packet;
//!
//! let rpm = ResultDefinition {
//!     kind: Some(ResultKind::Numeric),
//!     start_pos: Some(0),
//!     length: Some(2),
//!     ..ResultDefinition::new("rpm", "rpm_raw")
//! };
//! let mut operation = OperationDefinition::new("status", "status");
//! operation.results.insert("rpm_raw".into(), Arc::new(rpm));
//!
//! let store = MemoryStore::new();
//! let packet = Packet::ds2(0x12, &[0xaa, 0xbb]).unwrap();
//! let response = Decoder::new(&store).decode(&Arc::new(operation), &packet).unwrap();
//! assert_eq!(response.get("rpm_raw"), Some(&Value::Integer(0xaabb)));
//! ```

pub mod error;
pub mod rpn;

pub use error::Error;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use bstr::ByteSlice;
use serde::Serialize;
use tracing::trace;

use crate::definitions::{self, DefinitionStore, DisplayRule, OperationDefinition, ResultDefinition, ResultKind};
use crate::packet::{ByteOrder, Packet};
use rpn::Number;

/// Text value used when a raw value has no defined meaning.
pub const UNKNOWN: &str = "unknown";

/// Largest byte range interpreted as an integer.
const MAX_INTEGER_BYTES: usize = 8;

/// A decoded result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
}

impl Value {
    pub fn unknown() -> Value {
        Value::Text(UNKNOWN.to_string())
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Value::Text(t) if t == UNKNOWN)
    }

    /// Numeric view of the value. Text is read as `0x` hex or decimal.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Integer(i) => u64::try_from(*i).ok(),
            Value::Float(f) if f.fract() == 0.0 && *f >= 0.0 => Some(*f as u64),
            Value::Float(_) => None,
            Value::Boolean(b) => Some(*b as u64),
            Value::Text(t) => definitions::parse_number(t).ok(),
        }
    }

    fn as_number(&self, name: &str) -> Result<Number, Error> {
        match self {
            Value::Integer(i) => Ok(Number::Int(*i)),
            Value::Float(f) => Ok(Number::Float(*f)),
            Value::Boolean(b) => Ok(Number::Int(*b as i64)),
            Value::Text(t) => definitions::parse_number(t)
                .ok()
                .and_then(|n| i64::try_from(n).ok())
                .map(Number::Int)
                .ok_or_else(|| Error::NotNumeric(name.to_string())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(t) => f.write_str(t),
            Value::Boolean(b) => write!(f, "{}", b),
        }
    }
}

/// Decoded results of one operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    pub values: BTreeMap<String, Value>,
    pub field_errors: BTreeMap<String, Error>,
}

impl Response {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn as_u64(&self, name: &str) -> Option<u64> {
        self.get(name).and_then(Value::as_u64)
    }

    pub fn is_complete(&self) -> bool {
        self.field_errors.is_empty()
    }
}

/// Decodes packets against the definitions in a store.
pub struct Decoder<'a, S: DefinitionStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: DefinitionStore + ?Sized> Decoder<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Decode every result of `operation` (inherited ones included) out of `packet`.
    pub fn decode(&self, operation: &Arc<OperationDefinition>, packet: &Packet) -> crate::Result<Response> {
        let mut resolved = BTreeMap::new();
        for (name, result) in self.store.operation_results(operation)? {
            let result = self.store.resolve_result(&result)?;
            check_complete(&result)?;
            resolved.insert(name, result);
        }

        let mut response = Response::default();

        for (name, result) in resolved.iter().filter(|(_, r)| r.kind != Some(ResultKind::Rpn)) {
            let decoded = self.decode_field(result, packet);
            record(&mut response, name, decoded);
        }

        for name in rpn_order(&resolved)? {
            let result = &resolved[&name];
            let decoded = self.evaluate_rpn(result, packet, &resolved, &response);
            record(&mut response, &name, decoded);
        }

        Ok(response)
    }

    fn decode_field(&self, result: &ResultDefinition, packet: &Packet) -> Result<Value, Error> {
        let bytes = field_bytes(packet.payload(), result)?;

        match result.kind {
            Some(ResultKind::Text) => Ok(Value::Text(
                bytes
                    .to_str_lossy()
                    .trim_matches(|c: char| c == '\0' || c.is_whitespace())
                    .to_string(),
            )),
            Some(ResultKind::Hex) => Ok(Value::Text(hex::encode_upper(bytes))),
            _ => {
                let raw = raw_value(bytes, result, packet)?;
                match result.kind {
                    Some(ResultKind::Boolean) => boolean(raw, result),
                    Some(ResultKind::Enumerated) => self.enumerated(raw, result),
                    _ => Ok(numeric(raw, result)),
                }
            }
        }
    }

    fn enumerated(&self, raw: u64, result: &ResultDefinition) -> Result<Value, Error> {
        if let Some(level) = result.levels.get(&raw) {
            return Ok(Value::Text(level.clone()));
        }

        match &result.string_table {
            Some(table) if self.store.has_string_table(table) => Ok(self
                .store
                .find_string(table, raw)
                .map(Value::Text)
                .unwrap_or_else(Value::unknown)),
            Some(table) => Err(Error::MissingStringTable(table.clone())),
            None if !result.levels.is_empty() => Ok(Value::unknown()),
            None => Err(Error::MissingStringTable(result.name.clone())),
        }
    }

    fn evaluate_rpn(
        &self,
        result: &ResultDefinition,
        packet: &Packet,
        resolved: &BTreeMap<String, ResultDefinition>,
        response: &Response,
    ) -> Result<Value, Error> {
        let expr = result.rpn.as_deref().unwrap_or_default();

        let raw = if rpn::uses_raw(expr) && result.start_pos.is_some() && result.length.is_some() {
            let bytes = field_bytes(packet.payload(), result)?;
            Some(raw_value(bytes, result, packet)?)
        } else {
            None
        };

        let number = rpn::evaluate(expr, raw, |name| {
            if let Some(value) = response.values.get(name) {
                return value.as_number(name);
            }
            if resolved.contains_key(name) {
                return Err(Error::FailedReference(name.to_string()));
            }
            Err(Error::UnknownReference(name.to_string()))
        })?;

        Ok(match (number, result.display) {
            (Number::Int(i), Some(DisplayRule::Hex)) => Value::Text(format!("0x{:X}", i)),
            (Number::Int(i), Some(DisplayRule::Float)) => Value::Float(i as f64),
            (Number::Int(i), _) => Value::Integer(i),
            (Number::Float(f), Some(DisplayRule::Integer)) => Value::Integer(f.round() as i64),
            (Number::Float(f), _) => Value::Float(f),
        })
    }
}

fn record(response: &mut Response, name: &str, decoded: Result<Value, Error>) {
    match decoded {
        Ok(value) => {
            trace!("{} = {}", name, value);
            response.values.insert(name.to_string(), value);
        }
        Err(e) => {
            trace!("{} failed: {}", name, e);
            response.field_errors.insert(name.to_string(), e);
        }
    }
}

fn check_complete(result: &ResultDefinition) -> Result<(), definitions::Error> {
    let incomplete = |field| definitions::Error::Incomplete {
        id: result.id.clone(),
        field,
    };

    match result.kind {
        None => Err(incomplete("type")),
        Some(ResultKind::Rpn) if result.rpn.is_none() => Err(incomplete("rpn")),
        Some(ResultKind::Rpn) => Ok(()),
        Some(_) if result.start_pos.is_none() => Err(incomplete("start_pos")),
        Some(_) if result.length.is_none() => Err(incomplete("length")),
        Some(_) => Ok(()),
    }
}

/// Order in which RPN results must be evaluated so every referenced RPN result comes first.
fn rpn_order(resolved: &BTreeMap<String, ResultDefinition>) -> Result<Vec<String>, definitions::Error> {
    #[derive(Copy, Clone, PartialEq)]
    enum State {
        Visiting,
        Done,
    }

    fn visit(
        name: &str,
        deps: &BTreeMap<&str, Vec<&str>>,
        state: &mut HashMap<String, State>,
        order: &mut Vec<String>,
    ) -> Result<(), definitions::Error> {
        match state.get(name) {
            Some(State::Done) => return Ok(()),
            Some(State::Visiting) => return Err(definitions::Error::ReferenceCycle(name.to_string())),
            None => {}
        }

        state.insert(name.to_string(), State::Visiting);
        for dep in deps.get(name).into_iter().flatten() {
            if deps.contains_key(dep) {
                visit(dep, deps, state, order)?;
            }
        }
        state.insert(name.to_string(), State::Done);
        order.push(name.to_string());
        Ok(())
    }

    let deps: BTreeMap<&str, Vec<&str>> = resolved
        .iter()
        .filter(|(_, r)| r.kind == Some(ResultKind::Rpn))
        .map(|(name, r)| (name.as_str(), rpn::references(r.rpn.as_deref().unwrap_or_default())))
        .collect();

    let mut state = HashMap::new();
    let mut order = vec![];
    for name in deps.keys() {
        visit(name, &deps, &mut state, &mut order)?;
    }
    Ok(order)
}

fn field_bytes<'p>(payload: &'p [u8], result: &ResultDefinition) -> Result<&'p [u8], Error> {
    let start = result.start_pos.unwrap_or(0) as usize;
    let length = result.length.unwrap_or(0) as usize;
    if length == 0 {
        return Err(Error::InvalidLength(0));
    }

    start
        .checked_add(length)
        .and_then(|end| payload.get(start..end))
        .ok_or(Error::OutOfRange {
            start,
            length,
            payload: payload.len(),
        })
}

/// Bytes as an unsigned integer with the mask applied.
fn raw_value(bytes: &[u8], result: &ResultDefinition, packet: &Packet) -> Result<u64, Error> {
    if bytes.len() > MAX_INTEGER_BYTES {
        return Err(Error::InvalidLength(bytes.len()));
    }

    let byte_order = result
        .byte_order
        .unwrap_or_else(|| packet.protocol().byte_order());
    let raw = match byte_order {
        ByteOrder::Big => bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64),
        ByteOrder::Little => bytes.iter().rev().fold(0u64, |acc, b| (acc << 8) | *b as u64),
    };

    Ok(match result.mask {
        Some(mask) => raw & mask,
        None => raw,
    })
}

fn numeric(raw: u64, result: &ResultDefinition) -> Value {
    let factor_a = result.factor_a.unwrap_or(1.0);
    let factor_b = result.factor_b.unwrap_or(0.0);

    if result.display != Some(DisplayRule::Float) && factor_a.fract() == 0.0 && factor_b.fract() == 0.0 {
        let value = (raw as i128)
            .checked_mul(factor_a as i128)
            .and_then(|v| v.checked_add(factor_b as i128))
            .and_then(|v| i64::try_from(v).ok());
        if let Some(value) = value {
            return match result.display {
                Some(DisplayRule::Hex) => Value::Text(format!("0x{:X}", value)),
                _ => Value::Integer(value),
            };
        }
    }

    Value::Float(raw as f64 * factor_a + factor_b)
}

fn boolean(raw: u64, result: &ResultDefinition) -> Result<Value, Error> {
    let parse = |value: &Option<String>| {
        value
            .as_deref()
            .map(|v| definitions::parse_number(v).map_err(|_| Error::NotNumeric(v.to_string())))
            .transpose()
    };

    Ok(match (parse(&result.yes_value)?, parse(&result.no_value)?) {
        (None, None) => Value::Boolean(raw != 0),
        (Some(yes), _) if raw == yes => Value::Boolean(true),
        (_, Some(no)) if raw == no => Value::Boolean(false),
        _ => Value::unknown(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(kind: ResultKind, start_pos: u32, length: u32) -> ResultDefinition {
        ResultDefinition {
            kind: Some(kind),
            start_pos: Some(start_pos),
            length: Some(length),
            ..ResultDefinition::new("r", "r")
        }
    }

    fn packet(payload: &[u8]) -> Packet {
        Packet::ds2(0x12, payload).unwrap()
    }

    #[test]
    fn test_raw_value_byte_order() {
        let p = packet(&[0x12, 0x34]);
        let mut r = field(ResultKind::Numeric, 0, 2);
        assert_eq!(raw_value(&[0x12, 0x34], &r, &p).unwrap(), 0x1234);
        r.byte_order = Some(ByteOrder::Little);
        assert_eq!(raw_value(&[0x12, 0x34], &r, &p).unwrap(), 0x3412);
        r.mask = Some(0x0ff0);
        assert_eq!(raw_value(&[0x12, 0x34], &r, &p).unwrap(), 0x0410);
        assert_eq!(raw_value(&[0; 9], &r, &p), Err(Error::InvalidLength(9)));
    }

    #[test]
    fn test_field_bytes_range() {
        let r = field(ResultKind::Numeric, 1, 2);
        assert_eq!(field_bytes(&[1, 2, 3], &r).unwrap(), &[2, 3]);
        assert_eq!(
            field_bytes(&[1, 2], &r),
            Err(Error::OutOfRange {
                start: 1,
                length: 2,
                payload: 2
            })
        );
        assert_eq!(field_bytes(&[1, 2], &field(ResultKind::Numeric, 0, 0)), Err(Error::InvalidLength(0)));
    }

    #[test]
    fn test_numeric_scaling() {
        let mut r = field(ResultKind::Numeric, 0, 1);
        assert_eq!(numeric(200, &r), Value::Integer(200));

        r.factor_a = Some(0.5);
        r.factor_b = Some(-40.0);
        assert_eq!(numeric(200, &r), Value::Float(60.0));

        r.factor_a = Some(2.0);
        r.factor_b = Some(-40.0);
        assert_eq!(numeric(200, &r), Value::Integer(360));

        r.display = Some(DisplayRule::Float);
        assert_eq!(numeric(200, &r), Value::Float(360.0));

        r.display = Some(DisplayRule::Hex);
        r.factor_a = None;
        r.factor_b = None;
        assert_eq!(numeric(0xab, &r), Value::Text("0xAB".into()));
    }

    #[test]
    fn test_numeric_overflow_falls_back_to_float() {
        let mut r = field(ResultKind::Numeric, 0, 1);
        r.factor_a = Some(1e300);
        assert_eq!(numeric(2, &r), Value::Float(2e300));

        r.factor_a = Some(1.0);
        r.factor_b = Some(f64::MAX);
        assert_eq!(numeric(u64::MAX, &r), Value::Float(u64::MAX as f64 + f64::MAX));

        r.factor_a = Some(-1e30);
        r.factor_b = None;
        assert_eq!(numeric(u64::MAX, &r), Value::Float(u64::MAX as f64 * -1e30));
    }

    #[test]
    fn test_boolean_values() {
        let mut r = field(ResultKind::Boolean, 0, 1);
        assert_eq!(boolean(0, &r).unwrap(), Value::Boolean(false));
        assert_eq!(boolean(4, &r).unwrap(), Value::Boolean(true));

        r.yes_value = Some("1".into());
        r.no_value = Some("0".into());
        assert_eq!(boolean(1, &r).unwrap(), Value::Boolean(true));
        assert_eq!(boolean(0, &r).unwrap(), Value::Boolean(false));
        assert_eq!(boolean(2, &r).unwrap(), Value::unknown());

        r.yes_value = Some("0x80".into());
        r.no_value = None;
        assert_eq!(boolean(0x80, &r).unwrap(), Value::Boolean(true));
        assert_eq!(boolean(0x00, &r).unwrap(), Value::unknown());

        r.yes_value = None;
        r.no_value = Some("0".into());
        assert_eq!(boolean(0, &r).unwrap(), Value::Boolean(false));
        assert_eq!(boolean(7, &r).unwrap(), Value::unknown());

        r.no_value = None;

        r.yes_value = Some("yes".into());
        assert_eq!(boolean(1, &r), Err(Error::NotNumeric("yes".into())));
    }

    #[test]
    fn test_value_as_u64() {
        assert_eq!(Value::Integer(5).as_u64(), Some(5));
        assert_eq!(Value::Integer(-5).as_u64(), None);
        assert_eq!(Value::Float(7.0).as_u64(), Some(7));
        assert_eq!(Value::Text("0x1f".into()).as_u64(), Some(0x1f));
        assert_eq!(Value::Text("1429861".into()).as_u64(), Some(1429861));
        assert_eq!(Value::unknown().as_u64(), None);
        assert_eq!(Value::Boolean(true).as_u64(), Some(1));
    }

    #[test]
    fn test_rpn_order() {
        let mut resolved = BTreeMap::new();
        let rpn = |expr: &str| ResultDefinition {
            kind: Some(ResultKind::Rpn),
            rpn: Some(expr.into()),
            ..ResultDefinition::new("x", "x")
        };
        resolved.insert("a".to_string(), rpn("b 1 +"));
        resolved.insert("b".to_string(), rpn("c 2 *"));
        resolved.insert("c".to_string(), field(ResultKind::Numeric, 0, 1));
        assert_eq!(rpn_order(&resolved).unwrap(), vec!["b", "a"]);

        resolved.insert("c".to_string(), rpn("a"));
        assert!(matches!(rpn_order(&resolved), Err(definitions::Error::ReferenceCycle(_))));
    }
}
