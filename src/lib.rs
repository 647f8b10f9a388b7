//! # The DS2 Crate
//! Talk to BMW style control units over a serial K-line. The crate frames DS2 and KWP2000 packets,
//! runs the half-duplex request/response exchange, works out which control unit variant sits at a
//! bus address and decodes replies into named values using declarative JSON definitions.
//!
//! ## Identification Example
//!
//! Open the serial adapter, load the definitions and ask who answers at the DME address.
//!
//! ```rust,no_run
//! fn identify_example() -> ds2::Result<()> {
//!     let config = ds2::config::Config::from_env();
//!     let adapter = ds2::serial::port::SerialPortAdapter::open(&config.port_path(), ds2::packet::Protocol::DS2)?;
//!     let store = ds2::definitions::MemoryStore::from_dir(config.find_definitions_dir()?)?;
//!
//!     let mut client = ds2::client::DS2Client::new(ds2::transport::Transport::new(adapter), store);
//!     if let Some(identification) = client.identify(0x12)? {
//!         println!("{} {:?}", identification.definition.name, identification.flags);
//!         let status = client.run_operation(&identification.definition, "status", None)?;
//!         for (name, value) in &status.values {
//!             println!("{}: {}", name, value);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Supported adapters
//!  - Any serial port supported by [serialport-rs](https://github.com/serialport/serialport-rs) (all platforms)
//!  - A raw, externally configured file descriptor (unix only)
//!

pub mod client;
pub mod config;
pub mod decode;
pub mod definitions;
mod error;
pub mod ident;
pub mod packet;
pub mod serial;
pub mod transport;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
