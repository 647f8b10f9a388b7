//! High level client tying a [`Transport`] to a [`DefinitionStore`].
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::decode::{Decoder, Response};
use crate::definitions::{self, ControlUnitDefinition, DefinitionStore, OperationDefinition};
use crate::ident::{self, Identification};
use crate::packet::{Packet, Protocol, Reply, TESTER_ADDRESS};
use crate::serial::SerialAdapter;
use crate::transport::Transport;
use crate::Result;

/// DS2/KWP Client. Owns the line and the definitions, every call has exclusive access to both.
pub struct DS2Client<A: SerialAdapter, S: DefinitionStore> {
    transport: Transport<A>,
    store: S,
}

impl<A: SerialAdapter, S: DefinitionStore> DS2Client<A, S> {
    pub fn new(transport: Transport<A>, store: S) -> Self {
        Self { transport, store }
    }

    pub fn transport(&self) -> &Transport<A> {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut Transport<A> {
        &mut self.transport
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Which unit answers at `address`, if any.
    pub fn identify(&mut self, address: u8) -> Result<Option<Identification>> {
        ident::identify(&mut self.transport, &self.store, address)
    }

    /// Decode operation `name` of `definition`. Without a `packet` the operation's command is sent to
    /// the unit first and its reply decoded.
    pub fn run_operation(
        &mut self,
        definition: &Arc<ControlUnitDefinition>,
        name: &str,
        packet: Option<&Packet>,
    ) -> Result<Response> {
        let operation = self.store.find_operation(definition, name)?;

        let reply;
        let packet = match packet {
            Some(packet) => packet,
            None => {
                reply = self.query_operation(definition, &operation)?;
                &reply.packet
            }
        };

        Decoder::new(&self.store).decode(&operation, packet)
    }

    /// Send `payload` to `address` without consulting any definition.
    pub fn query_raw(&mut self, protocol: Protocol, address: u8, payload: &[u8]) -> Result<Reply> {
        let request = match protocol {
            Protocol::DS2 => Packet::ds2(address, payload)?,
            Protocol::KWP => Packet::kwp(address, TESTER_ADDRESS, payload)?,
        };
        self.transport.query(&request)
    }

    /// Replace the store contents with the definitions under `dir`.
    pub fn reload(&mut self, dir: &Path) -> Result<()> {
        self.store.reload(dir)
    }

    fn query_operation(
        &mut self,
        definition: &Arc<ControlUnitDefinition>,
        operation: &Arc<OperationDefinition>,
    ) -> Result<Reply> {
        let address = self
            .store
            .unit_chain(definition)?
            .iter()
            .find_map(|unit| unit.address)
            .ok_or_else(|| definitions::Error::NoAddress(definition.id.clone()))?;
        let command = self.store.operation_command(operation)?;

        let request = match definition.protocol {
            Protocol::DS2 => Packet::ds2(address, &command)?,
            Protocol::KWP => Packet::kwp(address, TESTER_ADDRESS, &command)?,
        };

        let mut timing = self.transport.config().timing;
        if let Some(profile) = &definition.timing {
            timing = timing.with_profile(profile);
        }

        debug!("Running {} on {}", operation.name, definition.name);
        self.transport.query_with(&request, timing)
    }
}
