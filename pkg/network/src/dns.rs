use hickory_proto::rr::rdata;
use hickory_proto::rr::{Name, RData, Record, RecordType};
use std::net::IpAddr;
use std::str::FromStr;
use tracing::{debug, warn};

use pkg_cache::ClusterCache;
use pkg_cache::object::{EndpointAddress, ServiceRecord};
use pkg_constants::dns::{DEFAULT_NS_NAME, SVC};

/// One synthesized address record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRecord {
    pub name: String,
    pub address: IpAddr,
    /// `A` or `AAAA`.
    pub record_type: RecordType,
}

impl AddressRecord {
    /// IPv4-mapped IPv6 addresses are stored in 4-byte form and become `A` records.
    pub fn new(name: impl Into<String>, address: IpAddr) -> Self {
        let address = match address {
            IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(address, IpAddr::V4),
            v4 => v4,
        };
        let record_type = match address {
            IpAddr::V4(_) => RecordType::A,
            IpAddr::V6(_) => RecordType::AAAA,
        };
        Self {
            name: name.into(),
            address,
            record_type,
        }
    }

    pub fn to_record(&self, ttl: u32) -> anyhow::Result<Record> {
        let name = Name::from_str(&self.name)?;
        let rdata = match self.address {
            IpAddr::V4(ip) => RData::A(rdata::A(ip)),
            IpAddr::V6(ip) => RData::AAAA(rdata::AAAA(ip)),
        };
        Ok(Record::from_rdata(name, ttl, rdata))
    }
}

/// Leftmost label for an endpoint address under its service name.
///
/// The address hostname wins, then (in endpoint-name mode) the backing pod name,
/// then the IP with `.` or `:` replaced by `-`.
pub fn endpoint_hostname(addr: &EndpointAddress, endpoint_name_mode: bool) -> String {
    if !addr.hostname.is_empty() {
        return addr.hostname.clone();
    }
    if endpoint_name_mode && !addr.target_ref_name.is_empty() {
        return addr.target_ref_name.clone();
    }
    if addr.ip.contains('.') {
        return addr.ip.replace('.', "-");
    }
    if addr.ip.contains(':') {
        return addr.ip.replace(':', "-");
    }
    String::new()
}

/// Whether `name` is the self-announce owner name (`ns.dns.<zone>`).
pub fn is_default_ns(name: &str, zone: &str) -> bool {
    name.starts_with(DEFAULT_NS_NAME) && name.find(zone) == Some(DEFAULT_NS_NAME.len())
}

/// Builds the address records that name this DNS instance.
pub struct AddressSynthesizer {
    local_ips: Vec<IpAddr>,
    endpoint_name_mode: bool,
}

impl AddressSynthesizer {
    pub fn new(local_ips: Vec<IpAddr>, endpoint_name_mode: bool) -> Self {
        Self {
            local_ips,
            endpoint_name_mode,
        }
    }

    /// Records for every service whose endpoints include one of our local addresses.
    ///
    /// With `external`, services are named `<svc>.<ns>.<zone>` and answer with their
    /// external addresses. Otherwise they are named `<svc>.<ns>.svc.<zone>`; headless
    /// services answer with each member (prefixed by its hostname), others with their
    /// cluster addresses, and each answer is repeated under the service's external
    /// name when it has one. If nothing matched, every local address is announced as
    /// `ns.dns.<zone>`.
    pub fn ns_addrs(&self, cache: &dyn ClusterCache, zone: &str, external: bool) -> Vec<AddressRecord> {
        let mut records = Vec::new();
        let mut service_records = 0;

        for local_ip in &self.local_ips {
            for endpoints in cache.endpoints_by_address(&local_ip.to_string()) {
                for svc in cache.services_by_name_namespace(&endpoints.index) {
                    if external {
                        let name = format!("{}.{}.{}", svc.name, svc.namespace, zone);
                        for ip in &svc.external_ips {
                            service_records += push_record(&mut records, &name, ip);
                        }
                        continue;
                    }

                    let name = format!("{}.{}.{}.{}", svc.name, svc.namespace, SVC, zone);
                    if svc.headless {
                        for addr in endpoints.subsets.iter().flat_map(|s| &s.addresses) {
                            let host = endpoint_hostname(addr, self.endpoint_name_mode);
                            service_records +=
                                push_record(&mut records, &format!("{}.{}", host, name), &addr.ip);
                            push_alias(&mut records, &svc, &addr.ip);
                        }
                    } else {
                        for ip in &svc.cluster_ips {
                            service_records += push_record(&mut records, &name, ip);
                            push_alias(&mut records, &svc, ip);
                        }
                    }
                }
            }
        }

        if service_records == 0 {
            debug!("No local endpoints found, announcing local addresses");
            let name = format!("{}{}", DEFAULT_NS_NAME, zone);
            records.extend(
                self.local_ips
                    .iter()
                    .map(|ip| AddressRecord::new(name.clone(), *ip)),
            );
        }
        records
    }
}

/// Append a record if `ip` parses. Returns how many records were added.
fn push_record(records: &mut Vec<AddressRecord>, name: &str, ip: &str) -> usize {
    match ip.parse::<IpAddr>() {
        Ok(address) => {
            records.push(AddressRecord::new(name, address));
            1
        }
        Err(_) => {
            warn!("Skipping record {}: invalid address '{}'", name, ip);
            0
        }
    }
}

fn push_alias(records: &mut Vec<AddressRecord>, svc: &ServiceRecord, ip: &str) {
    if !svc.external_name.is_empty() {
        push_record(records, &svc.external_name, ip);
    }
}
