use ds2::client::DS2Client;
use ds2::config::Config;
use ds2::definitions::{address_for_family, DefinitionStore, Family, MemoryStore};
use ds2::packet::Protocol;
use ds2::serial::port::SerialPortAdapter;
use ds2::transport::Transport;
use strum::IntoEnumIterator;

fn parse_target(target: &str) -> Option<u8> {
    address_for_family(target).or_else(|| u8::from_str_radix(target.trim_start_matches("0x"), 16).ok())
}

fn usage() {
    eprintln!("usage: probe families | scan | probe <family|address> | run <family|address> <operation>");
}

fn main() -> ds2::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = Config::from_env();
    let store = MemoryStore::from_dir(config.find_definitions_dir()?)?;

    if args.first().map(String::as_str) == Some("families") {
        for family in store.families() {
            println!("{:<8} {}", family, store.find_by_family(&family).len());
        }
        return Ok(());
    }

    let adapter = SerialPortAdapter::open(&config.port_path(), Protocol::DS2)?;
    let mut client = DS2Client::new(Transport::with_config(adapter, config.transport_config()), store);

    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["scan"] => {
            for family in Family::iter() {
                match client.identify(family.address())? {
                    Some(identification) => println!(
                        "{:<8} 0x{:02x} {} {:?}",
                        family,
                        family.address(),
                        identification.definition.name,
                        identification.flags
                    ),
                    None => println!("{:<8} 0x{:02x} -", family, family.address()),
                }
            }
        }
        ["probe", target] | ["run", target, _] => {
            let Some(address) = parse_target(target) else {
                usage();
                return Ok(());
            };

            let Some(identification) = client.identify(address)? else {
                let reply = client.query_raw(Protocol::DS2, address, &[0x00])?;
                println!("No match at 0x{:02x}, got {}", address, reply.packet);
                return Ok(());
            };
            println!("{} {:?}", identification.definition.name, identification.flags);

            let response = match args.get(2) {
                Some(operation) => client.run_operation(&identification.definition, operation, None)?,
                None => identification.response,
            };
            for (name, value) in &response.values {
                println!("  {:<24} {}", name, value);
            }
            for (name, error) in &response.field_errors {
                println!("  {:<24} error: {}", name, error);
            }
        }
        _ => usage(),
    }

    Ok(())
}
