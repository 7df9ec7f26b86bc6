//! Flow-event records and the line parser that produces them.
//!
//! Two textual schemas are accepted, both as emitted by the upstream
//! capture-to-text conversion:
//!
//! ```text
//! 1500000000.123456 IP 10.0.0.1.5000 > 10.0.0.2.80: tcp 512
//! 1500000000.123456 IP 10.0.0.1.5000 > 10.0.0.2.80: UDP, length 512
//! 1500000000.123456 IP 10.0.0.1.5000 > 10.0.0.2.80: Flags [S], seq 1, length 0
//! ```

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::IdsResult;

const LINE_PATTERN: &str = concat!(
    r"^(?P<ts>\d+\.\d+) IP ",
    r"(?P<src>(?:\d{1,3}\.){3}\d{1,3})(?:\.(?P<sport>\d+))? > ",
    r"(?P<dst>(?:\d{1,3}\.){3}\d{1,3})(?:\.(?P<dport>\d+))?: ",
    r"(?:(?P<proto>tcp|TCP|udp|UDP|icmp|ICMP)(?: |, length )(?P<size>\d+)?",
    r"|Flags \[(?P<flag>\w*\.?)\](?:.*?length (?P<flen>\d+))?)",
);

/// Transport protocol of a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
}

impl Protocol {
    fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "tcp" => Some(Protocol::Tcp),
            "udp" => Some(Protocol::Udp),
            "icmp" => Some(Protocol::Icmp),
            _ => None,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
            Protocol::Icmp => write!(f, "icmp"),
        }
    }
}

/// Directional flow identity `(src, sport, dst, dport)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlowKey {
    pub src: IpAddr,
    pub src_port: Option<u16>,
    pub dst: IpAddr,
    pub dst_port: Option<u16>,
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_endpoint(f, self.src, self.src_port)?;
        write!(f, " > ")?;
        fmt_endpoint(f, self.dst, self.dst_port)
    }
}

/// A [`FlowKey`] qualified by protocol; the unit the whitelist learns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionKey {
    pub flow: FlowKey,
    pub protocol: Protocol,
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.protocol, self.flow)
    }
}

fn fmt_endpoint(f: &mut fmt::Formatter<'_>, ip: IpAddr, port: Option<u16>) -> fmt::Result {
    match port {
        Some(p) => write!(f, "{}:{}", ip, p),
        None => write!(f, "{}", ip),
    }
}

/// One traffic event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlowRecord {
    pub timestamp: DateTime<Utc>,
    pub src: IpAddr,
    pub src_port: Option<u16>,
    pub dst: IpAddr,
    pub dst_port: Option<u16>,
    pub protocol: Protocol,
    pub size: u32,
    pub flag: Option<String>,
}

impl FlowRecord {
    /// Record without TCP flags, mostly for tests and synthetic streams.
    pub fn new(
        timestamp: DateTime<Utc>,
        src: IpAddr,
        dst: IpAddr,
        protocol: Protocol,
        size: u32,
    ) -> Self {
        Self {
            timestamp,
            src,
            src_port: None,
            dst,
            dst_port: None,
            protocol,
            size,
            flag: None,
        }
    }

    pub fn with_ports(mut self, src_port: u16, dst_port: u16) -> Self {
        self.src_port = Some(src_port);
        self.dst_port = Some(dst_port);
        self
    }

    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        self.flag = Some(flag.into());
        self
    }

    pub fn flow_key(&self) -> FlowKey {
        FlowKey {
            src: self.src,
            src_port: self.src_port,
            dst: self.dst,
            dst_port: self.dst_port,
        }
    }

    pub fn connection_key(&self) -> ConnectionKey {
        ConnectionKey {
            flow: self.flow_key(),
            protocol: self.protocol,
        }
    }

    /// True for a bare SYN (connection attempt), not SYN-ACK.
    pub fn is_syn(&self) -> bool {
        self.flag.as_deref() == Some("S")
    }
}

/// Why a line was not turned into a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("line does not match the flow-event schema")]
    NoMatch,

    #[error("invalid {field}: {value}")]
    InvalidField { field: &'static str, value: String },
}

/// Compiled line parser. Build once and reuse.
#[derive(Clone, Debug)]
pub struct RecordParser {
    regex: Regex,
}

impl RecordParser {
    pub fn new() -> IdsResult<Self> {
        Ok(Self {
            regex: Regex::new(LINE_PATTERN)?,
        })
    }

    pub fn parse(&self, line: &str) -> Result<FlowRecord, ParseError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let caps = self.regex.captures(line).ok_or(ParseError::NoMatch)?;

        let ts_raw = &caps["ts"];
        let timestamp = parse_timestamp(ts_raw).ok_or_else(|| ParseError::InvalidField {
            field: "timestamp",
            value: ts_raw.to_string(),
        })?;

        let src = parse_ip(&caps["src"], "source address")?;
        let dst = parse_ip(&caps["dst"], "destination address")?;
        let src_port = parse_opt::<u16>(caps.name("sport").map(|m| m.as_str()), "source port")?;
        let dst_port =
            parse_opt::<u16>(caps.name("dport").map(|m| m.as_str()), "destination port")?;

        let (protocol, size, flag) = match caps.name("flag") {
            Some(flag) => {
                let size = parse_opt::<u32>(caps.name("flen").map(|m| m.as_str()), "length")?;
                (Protocol::Tcp, size.unwrap_or(0), Some(flag.as_str().to_string()))
            }
            None => {
                let raw = caps.name("proto").map(|m| m.as_str()).unwrap_or_default();
                let protocol = Protocol::parse(raw).ok_or_else(|| ParseError::InvalidField {
                    field: "protocol",
                    value: raw.to_string(),
                })?;
                let size = parse_opt::<u32>(caps.name("size").map(|m| m.as_str()), "size")?;
                (protocol, size.unwrap_or(0), None)
            }
        };

        Ok(FlowRecord {
            timestamp,
            src,
            src_port,
            dst,
            dst_port,
            protocol,
            size,
            flag,
        })
    }
}

fn parse_ip(raw: &str, field: &'static str) -> Result<IpAddr, ParseError> {
    raw.parse::<Ipv4Addr>()
        .map(IpAddr::V4)
        .map_err(|_| ParseError::InvalidField {
            field,
            value: raw.to_string(),
        })
}

fn parse_opt<T: std::str::FromStr>(
    raw: Option<&str>,
    field: &'static str,
) -> Result<Option<T>, ParseError> {
    raw.map(|v| {
        v.parse::<T>().map_err(|_| ParseError::InvalidField {
            field,
            value: v.to_string(),
        })
    })
    .transpose()
}

/// Fractional Unix seconds, truncated to nanoseconds.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let (secs, frac) = raw.split_once('.')?;
    let secs: i64 = secs.parse().ok()?;
    let mut digits: String = frac.chars().take(9).collect();
    while digits.len() < 9 {
        digits.push('0');
    }
    let nanos: u32 = digits.parse().ok()?;
    Utc.timestamp_opt(secs, nanos).single()
}
