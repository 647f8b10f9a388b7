//! Works out which control unit variant answers at a bus address.
//!
//! The unit is probed with an identify request and the reply is decoded with the identify
//! operation of every candidate registered at the replying address. Candidates are scanned in
//! store order: the first one where every identity field agrees wins outright, otherwise the last
//! candidate whose part number or diag index matched is returned.

mod constants;
mod types;

pub use constants::*;
pub use types::*;

use std::collections::HashMap;

use tracing::{debug, info, trace, warn};

use crate::decode::{Decoder, Response};
use crate::definitions::{ControlUnitDefinition, DefinitionStore};
use crate::packet::{Packet, Protocol};
use crate::serial::SerialAdapter;
use crate::transport::Transport;
use crate::{Error, Result};

/// Whether any unit registered at `address` talks KWP.
fn answers_kwp<S: DefinitionStore + ?Sized>(store: &S, address: u8) -> bool {
    store
        .find_by_address(address)
        .iter()
        .any(|unit| unit.protocol == Protocol::KWP)
}

/// Probe `address` and match the reply against the store. Falls back to KWP when the unit doesn't
/// answer DS2 and a KWP unit is known at that address.
///
/// An absent unit or an unusable reply is `Ok(None)`, a dead line is an error.
pub fn identify<A, S>(transport: &mut Transport<A>, store: &S, address: u8) -> Result<Option<Identification>>
where
    A: SerialAdapter,
    S: DefinitionStore + ?Sized,
{
    let timing = store.timing_for_address(address, &transport.config().timing);

    let reply = match transport.query_with(&Packet::identify(Protocol::DS2, address), timing) {
        Ok(reply) => reply,
        Err(Error::Timeout) if answers_kwp(store, address) => {
            debug!("No DS2 reply from 0x{:02x}, retrying with KWP", address);
            match transport.query_with(&Packet::identify(Protocol::KWP, address), timing) {
                Ok(reply) => reply,
                Err(e) => return no_response(address, e),
            }
        }
        Err(e) => return no_response(address, e),
    };

    Ok(match_reply(store, &reply.packet))
}

fn no_response(address: u8, error: Error) -> Result<Option<Identification>> {
    match error {
        Error::Timeout => {
            info!("Nothing answered at 0x{:02x}", address);
            Ok(None)
        }
        Error::FramingError(e) => {
            warn!("Unusable reply from 0x{:02x}: {}", address, e);
            Ok(None)
        }
        e => Err(e),
    }
}

/// Match an identify reply against the candidates at the replying unit's address.
pub fn match_reply<S: DefinitionStore + ?Sized>(store: &S, packet: &Packet) -> Option<Identification> {
    let address = packet.ecu_address();
    let decoder = Decoder::new(store);
    let mut decoded: HashMap<String, Option<Response>> = HashMap::new();
    let mut best: Option<Identification> = None;

    for candidate in store.find_by_address(address) {
        if !candidate.has_match_data() {
            trace!("Skipping {}: nothing to match on", candidate.name);
            continue;
        }

        let operation = match store.find_operation(&candidate, IDENTIFY_OPERATION) {
            Ok(operation) => operation,
            Err(e) => {
                warn!("Skipping {}: {}", candidate.name, e);
                continue;
            }
        };

        let response = decoded
            .entry(operation.id.clone())
            .or_insert_with(|| match decoder.decode(&operation, packet) {
                Ok(response) => Some(response),
                Err(e) => {
                    warn!("Skipping {}: {}", candidate.name, e);
                    None
                }
            });
        let Some(response) = response else {
            continue;
        };

        let Some(flags) = score(&candidate, response) else {
            continue;
        };

        let full_match = flags.is_all();
        best = Some(Identification {
            definition: candidate.clone(),
            flags,
            response: response.clone(),
        });
        if full_match {
            break;
        }
    }

    if let Some(identification) = &best {
        info!(
            "Identified 0x{:02x} as {} {:?}",
            address, identification.definition.name, identification.flags
        );
    }

    best
}

/// Flags for `candidate` if its part number or diag index matched, `None` otherwise.
fn score(candidate: &ControlUnitDefinition, response: &Response) -> Option<MatchFlags> {
    let part_number = response.as_u64(PART_NUMBER);
    let pn_match = part_number.is_some_and(|pn| candidate.part_numbers.contains(&pn));

    let diag_index = response.as_u64(DIAG_INDEX);
    let di_match = match diag_index {
        Some(di) if !candidate.diag_indexes.is_empty() => candidate.diag_indexes.contains(&di),
        _ => pn_match && candidate.diag_indexes.is_empty(),
    };

    trace!(
        "{}: part number {:?} (match {}), diag index {:?} (match {})",
        candidate.name,
        part_number,
        pn_match,
        diag_index,
        di_match
    );

    if !di_match {
        return None;
    }

    let mut flags = MatchFlags::ALL;
    if !pn_match {
        flags.remove(MatchField::PartNumber);
    }
    if response.as_u64(SOFTWARE_NUMBER) != Some(candidate.software_number) {
        flags.remove(MatchField::SoftwareVersion);
    }
    if response.as_u64(HARDWARE_NUMBER) != Some(candidate.hardware_number) {
        flags.remove(MatchField::HardwareVersion);
    }
    if response.as_u64(CODING_INDEX) != Some(candidate.coding_index) {
        flags.remove(MatchField::CodingIndex);
    }

    trace!("{}: {:?}", candidate.name, flags);
    Some(flags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::Value;

    fn response(fields: &[(&str, i64)]) -> Response {
        Response {
            values: fields
                .iter()
                .map(|(name, value)| (name.to_string(), Value::Integer(*value)))
                .collect(),
            ..Default::default()
        }
    }

    fn candidate(part_numbers: &[u64], diag_indexes: &[u64]) -> ControlUnitDefinition {
        ControlUnitDefinition {
            part_numbers: part_numbers.iter().copied().collect(),
            diag_indexes: diag_indexes.iter().copied().collect(),
            hardware_number: 3,
            software_number: 4,
            coding_index: 5,
            ..ControlUnitDefinition::new("c", "c")
        }
    }

    #[test]
    fn test_full_match() {
        let r = response(&[
            (PART_NUMBER, 100),
            (HARDWARE_NUMBER, 3),
            (SOFTWARE_NUMBER, 4),
            (CODING_INDEX, 5),
        ]);
        assert_eq!(score(&candidate(&[100], &[]), &r), Some(MatchFlags::ALL));
    }

    #[test]
    fn test_partial_flags() {
        let r = response(&[(PART_NUMBER, 100), (SOFTWARE_NUMBER, 9), (CODING_INDEX, 5)]);
        let flags = score(&candidate(&[100], &[]), &r).unwrap();
        assert!(flags.contains(MatchField::PartNumber));
        assert!(!flags.contains(MatchField::SoftwareVersion));
        assert!(!flags.contains(MatchField::HardwareVersion));
        assert!(flags.contains(MatchField::CodingIndex));
    }

    #[test]
    fn test_diag_index_rules() {
        // A diag index match selects the candidate even without a part number match
        let r = response(&[(PART_NUMBER, 999), (DIAG_INDEX, 7)]);
        let flags = score(&candidate(&[100], &[7]), &r).unwrap();
        assert!(!flags.contains(MatchField::PartNumber));

        // A part number match is not enough once the candidate lists diag indexes
        let r = response(&[(PART_NUMBER, 100), (DIAG_INDEX, 8)]);
        assert_eq!(score(&candidate(&[100], &[7]), &r), None);

        // Nor when the reply lacks a diag index
        let r = response(&[(PART_NUMBER, 100)]);
        assert_eq!(score(&candidate(&[100], &[7]), &r), None);

        let r = response(&[(PART_NUMBER, 101)]);
        assert_eq!(score(&candidate(&[100], &[]), &r), None);
    }

    #[test]
    fn test_flags() {
        let mut flags = MatchFlags::NONE;
        flags.insert(MatchField::CodingIndex);
        flags.insert(MatchField::PartNumber);
        assert_eq!(
            flags.fields().collect::<Vec<_>>(),
            vec![MatchField::PartNumber, MatchField::CodingIndex]
        );
        assert_eq!(flags.bits(), 0x09);
        flags.remove(MatchField::PartNumber);
        assert_eq!(flags.bits(), 0x08);
        assert!(MatchFlags::ALL.is_all());
        assert_eq!(format!("{:?}", MatchFlags::NONE), "MatchFlags(None)");
    }
}
