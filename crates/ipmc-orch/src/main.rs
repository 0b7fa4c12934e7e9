//! ipmc-sim - drives ReplGroupOrch against the simulated switch.
//!
//! Builds replication groups and IPMC routes on one or more simulated
//! devices, verifies every route against the simulated hardware and prints
//! the resulting cache as JSON.

use clap::Parser;
use ipmc_orch::repl_group::{ReplGroupOrch, ReplGroupOrchConfig, Result};
use ipmc_orch::{load_config, CachedRouteEntry, MemberSpec, RouteKey};
use ipmc_sai::sim::SimSai;
use ipmc_sai::ReplGroupOwner;
use ipmc_types::{DeviceId, IpAddress, PhysicalPort, RifId, VrfId};
use log::{error, info, warn};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

const RPF_RIF: u32 = 100;
const FIRST_IPMC_RIF: u32 = 200;

/// IPMC replication group simulator
#[derive(Parser, Debug)]
#[command(name = "ipmc-sim")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// JSON orchestrator config; defaults apply when omitted
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Number of simulated devices
    #[arg(short = 'd', long, default_value = "1")]
    devices: u32,

    /// Replication groups per device (at most 255)
    #[arg(short = 'g', long, default_value = "2")]
    groups: u8,

    /// IPMC members per group
    #[arg(short = 'm', long, default_value = "2")]
    members: u32,

    /// (*,G) routes per group (at most 255)
    #[arg(short = 'r', long, default_value = "4")]
    routes: u8,

    /// Use IPv6 group addresses
    #[arg(long)]
    ipv6: bool,

    /// Remove everything again before exiting
    #[arg(long)]
    teardown: bool,
}

fn group_address(ipv6: bool, group: u8, route: u8) -> IpAddress {
    if ipv6 {
        IpAddress::V6(Ipv6Addr::new(0xff0e, 0, 0, 0, 0, 0, group.into(), route.into()))
    } else {
        IpAddress::V4(Ipv4Addr::new(230, 1, group, route))
    }
}

fn setup_device(sai: &SimSai, device: DeviceId, args: &Args) {
    sai.add_virtual_router(device, VrfId(0));
    sai.add_router_interface(device, RifId(RPF_RIF));
    sai.add_bridge_port(device, PhysicalPort::port(0, 1));
    for i in 0..args.members {
        sai.add_router_interface(device, RifId(FIRST_IPMC_RIF + i));
        sai.add_bridge_port(device, PhysicalPort::port(0, 2 + i));
    }
}

fn populate(orch: &ReplGroupOrch, device: DeviceId, args: &Args) -> Result<Vec<RouteKey>> {
    orch.attach_device(device)?;

    let rpf = MemberSpec::new(RifId(RPF_RIF), [PhysicalPort::port(0, 1)]);
    let ipmc: Vec<_> = (0..args.members)
        .map(|i| MemberSpec::new(RifId(FIRST_IPMC_RIF + i), [PhysicalPort::port(0, 2 + i)]))
        .collect();

    let mut keys = Vec::new();
    for g in 0..args.groups {
        let id = orch.create_replication_group(device, ReplGroupOwner::Ipmc, &rpf, &ipmc)?;
        for r in 0..args.routes {
            let key = RouteKey::star_g(VrfId(0), group_address(args.ipv6, g, r + 1));
            orch.add_route(device, CachedRouteEntry::new(key, RifId(RPF_RIF), id))?;
            keys.push(key);
        }
    }

    let mut mismatched = 0;
    for key in &keys {
        if !orch.verify_route(device, key)? {
            mismatched += 1;
        }
    }
    if mismatched > 0 {
        warn!("Device {}: {} routes differ from hardware", device, mismatched);
    }
    orch.check_consistency(device)?;
    Ok(keys)
}

fn teardown(orch: &ReplGroupOrch, device: DeviceId, keys: &[RouteKey]) -> Result<()> {
    for key in keys {
        orch.delete_route(device, key)?;
    }
    for group in orch.group_ids(device)? {
        orch.delete_replication_group(device, group)?;
    }
    orch.detach_device(device)
}

fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    let config = match &args.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                error!("{}", e);
                return ExitCode::FAILURE;
            }
        },
        None => ReplGroupOrchConfig::default(),
    };
    info!(
        "Starting ipmc-sim: {} devices, {} groups/device, {} members/group, {} routes/group",
        args.devices, args.groups, args.members, args.routes
    );

    let sai = Arc::new(SimSai::new());
    let orch = ReplGroupOrch::new(config, sai.clone(), sai.clone());

    for index in 0..args.devices {
        let device = DeviceId::new(index);
        setup_device(&sai, device, &args);

        let keys = match populate(&orch, device, &args) {
            Ok(keys) => keys,
            Err(e) => {
                error!("Device {}: {}", device, e);
                return ExitCode::FAILURE;
            }
        };

        match orch.dump(device) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Device {}: {}", device, e);
                return ExitCode::FAILURE;
            }
        }

        if args.teardown {
            if let Err(e) = teardown(&orch, device, &keys) {
                error!("Device {}: teardown failed: {}", device, e);
                return ExitCode::FAILURE;
            }
            info!("Device {}: torn down, {} objects left", device, sai.device_object_count(device));
        }
    }

    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_past_one_octet_are_rejected() {
        assert!(Args::try_parse_from(["ipmc-sim", "--groups", "256"]).is_err());
        assert!(Args::try_parse_from(["ipmc-sim", "--routes", "256"]).is_err());

        let args = Args::try_parse_from(["ipmc-sim", "--groups", "255", "--routes", "255"]).unwrap();
        assert_eq!((args.groups, args.routes), (255, 255));
    }

    #[test]
    fn test_group_address_uses_full_octets() {
        assert_eq!(group_address(false, 255, 255), IpAddress::V4(Ipv4Addr::new(230, 1, 255, 255)));
        assert_eq!(
            group_address(true, 255, 1),
            IpAddress::V6(Ipv6Addr::new(0xff0e, 0, 0, 0, 0, 0, 0xff, 1))
        );
        assert_ne!(group_address(false, 0, 1), group_address(false, 1, 1));
    }
}
