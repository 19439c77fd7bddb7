//! Turns a device record into DNS resource records, built on
//! `hickory_proto`'s typed `Record`/`RData` constructors.

use base64::Engine;
use hickory_proto::rr::rdata;
use hickory_proto::rr::{Name, RData, Record, RecordType};
use std::net::IpAddr;
use tracing::warn;

use crate::device::Device;

/// Positive TTL for A/AAAA/SRV records.
const RR_TTL: u32 = 30;
/// Default TTL for TXT records.
const TXT_DEFAULT_TTL: u32 = 3600;

/// Encodes at most one record for `device` under `domain` for the given
/// `qtype`. `domain` must already be fully qualified (trailing dot).
pub fn encode_record(domain: &Name, device: &Device, qtype: RecordType) -> Option<Record> {
    match qtype {
        RecordType::A => {
            let IpAddr::V4(ip) = device.ip_addr()? else {
                return None;
            };
            Some(build_record(domain, RR_TTL, RData::A(rdata::A(ip))))
        }
        RecordType::AAAA => {
            let IpAddr::V6(ip) = device.ip_addr()? else {
                return None;
            };
            Some(build_record(domain, RR_TTL, RData::AAAA(rdata::AAAA(ip))))
        }
        RecordType::SRV => {
            if device.dns.is_empty() {
                return None;
            }
            let target = Name::from_ascii(format!("{}.", device.dns)).ok()?;
            Some(build_record(
                domain,
                RR_TTL,
                RData::SRV(rdata::SRV::new(1, 1, 22, target)),
            ))
        }
        RecordType::TXT => {
            let payload = serde_json::to_vec(device).unwrap_or_default();
            let encoded = base64::engine::general_purpose::STANDARD.encode(payload);
            Some(build_record(
                domain,
                TXT_DEFAULT_TTL,
                RData::TXT(rdata::TXT::new(vec![encoded])),
            ))
        }
        other => {
            warn!(?other, "unsupported query type requested, skipping");
            None
        }
    }
}

fn build_record(domain: &Name, ttl: u32, rdata: RData) -> Record {
    let mut record = Record::new();
    record.set_name(domain.clone());
    record.set_ttl(ttl);
    record.set_record_type(rdata.record_type());
    record.set_data(Some(rdata));
    record
}

/// Encodes records for every device for a single `qtype`, one call per
/// question.
pub fn encode_records(domain: &Name, devices: &[Device], qtype: RecordType) -> Vec<Record> {
    devices
        .iter()
        .filter_map(|d| encode_record(domain, d, qtype))
        .collect()
}

/// Whether `qtype` is one this encoder understands; unsupported types get
/// `NOTIMP` from the DNS handler rather than a silently empty answer
/// section.
pub fn is_supported(qtype: RecordType) -> bool {
    matches!(
        qtype,
        RecordType::A | RecordType::AAAA | RecordType::SRV | RecordType::TXT
    )
}
