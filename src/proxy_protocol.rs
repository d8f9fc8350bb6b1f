//! PROXY protocol v1/v2 parsing (C12, spec §6).
//!
//! Runs once per accepted connection before the HTTP parser sees any bytes,
//! when the listening server is configured to expect it. Unsupported v2
//! transport/command combinations are tolerated: the header is consumed but
//! no endpoint metadata is populated, matching real-world proxies that speak
//! a superset of what this crate understands.

use std::net::IpAddr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEndpoints {
    pub src_addr: IpAddr,
    pub dst_addr: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyHeader {
    /// `PROXY UNKNOWN\r\n` or an unparseable v1 line, or a v2 header whose
    /// command/transport this crate doesn't track metadata for.
    Unknown,
    Endpoints(ProxyEndpoints),
}

#[derive(Debug, PartialEq, Eq)]
pub enum ProxyParseError {
    /// Not enough bytes buffered yet to know whether this is v1, v2, or
    /// absent; caller should wait for more data.
    Incomplete,
    /// Neither signature matched — the connection carries no PROXY header.
    NotProxy,
    Malformed,
}

const V2_SIG: [u8; 12] = *b"\r\n\r\n\0\r\nQUIT\n";

/// Attempts to parse a PROXY protocol header from the front of `buf`.
/// Returns the parsed header and the number of bytes it consumed, or an
/// error. Caller is expected to drain the consumed bytes on success.
pub fn parse(buf: &[u8]) -> Result<(ProxyHeader, usize), ProxyParseError> {
    if buf.len() >= V2_SIG.len() && buf[..12] == V2_SIG {
        return parse_v2(buf);
    }
    if buf.len() >= 5 && &buf[..5] == b"PROXY" {
        return parse_v1(buf);
    }
    if buf.len() < V2_SIG.len().max(5) {
        return Err(ProxyParseError::Incomplete);
    }
    Err(ProxyParseError::NotProxy)
}

fn parse_v1(buf: &[u8]) -> Result<(ProxyHeader, usize), ProxyParseError> {
    let Some(eol) = find_crlf(buf) else {
        if buf.len() > 107 {
            return Err(ProxyParseError::Malformed);
        }
        return Err(ProxyParseError::Incomplete);
    };

    let line = std::str::from_utf8(&buf[..eol]).map_err(|_| ProxyParseError::Malformed)?;
    let mut parts = line.split(' ');

    if parts.next() != Some("PROXY") {
        return Err(ProxyParseError::Malformed);
    }

    let transport = parts.next().ok_or(ProxyParseError::Malformed)?;
    if transport == "UNKNOWN" {
        return Ok((ProxyHeader::Unknown, eol + 2));
    }
    if transport != "TCP4" && transport != "TCP6" {
        return Ok((ProxyHeader::Unknown, eol + 2));
    }

    let src: IpAddr = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or(ProxyParseError::Malformed)?;
    let dst: IpAddr = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or(ProxyParseError::Malformed)?;
    let src_port: u16 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or(ProxyParseError::Malformed)?;
    let dst_port: u16 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or(ProxyParseError::Malformed)?;

    Ok((
        ProxyHeader::Endpoints(ProxyEndpoints {
            src_addr: src,
            dst_addr: dst,
            src_port,
            dst_port,
        }),
        eol + 2,
    ))
}

fn parse_v2(buf: &[u8]) -> Result<(ProxyHeader, usize), ProxyParseError> {
    if buf.len() < 16 {
        return Err(ProxyParseError::Incomplete);
    }

    let version_command = buf[12];
    let family_transport = buf[13];
    let len = u16::from_be_bytes([buf[14], buf[15]]) as usize;
    let total = 16 + len;

    if buf.len() < total {
        return Err(ProxyParseError::Incomplete);
    }

    let version = version_command >> 4;
    let command = version_command & 0x0F;
    let family = family_transport >> 4;
    let transport = family_transport & 0x0F;

    if version != 2 || command != 1 || transport != 1 {
        // LOCAL command, or a transport/version this crate doesn't speak:
        // tolerate it, consume the header, surface no endpoint metadata.
        return Ok((ProxyHeader::Unknown, total));
    }

    let addr_block = &buf[16..total];
    let endpoints = match family {
        1 if addr_block.len() >= 12 => {
            let src = IpAddr::from([addr_block[0], addr_block[1], addr_block[2], addr_block[3]]);
            let dst = IpAddr::from([addr_block[4], addr_block[5], addr_block[6], addr_block[7]]);
            let src_port = u16::from_be_bytes([addr_block[8], addr_block[9]]);
            let dst_port = u16::from_be_bytes([addr_block[10], addr_block[11]]);
            Some(ProxyEndpoints { src_addr: src, dst_addr: dst, src_port, dst_port })
        }
        2 if addr_block.len() >= 36 => {
            let mut src_octets = [0u8; 16];
            let mut dst_octets = [0u8; 16];
            src_octets.copy_from_slice(&addr_block[0..16]);
            dst_octets.copy_from_slice(&addr_block[16..32]);
            let src_port = u16::from_be_bytes([addr_block[32], addr_block[33]]);
            let dst_port = u16::from_be_bytes([addr_block[34], addr_block[35]]);
            Some(ProxyEndpoints {
                src_addr: IpAddr::from(src_octets),
                dst_addr: IpAddr::from(dst_octets),
                src_port,
                dst_port,
            })
        }
        _ => None,
    };

    match endpoints {
        Some(e) => Ok((ProxyHeader::Endpoints(e), total)),
        None => Ok((ProxyHeader::Unknown, total)),
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v1_tcp4_roundtrip() {
        let line = b"PROXY TCP4 192.168.0.1 192.168.0.11 56324 443\r\nGET / HTTP/1.1\r\n";
        let (header, consumed) = parse(line).unwrap();
        assert_eq!(
            header,
            ProxyHeader::Endpoints(ProxyEndpoints {
                src_addr: "192.168.0.1".parse().unwrap(),
                dst_addr: "192.168.0.11".parse().unwrap(),
                src_port: 56324,
                dst_port: 443,
            })
        );
        assert_eq!(&line[consumed..], b"GET / HTTP/1.1\r\n");
    }

    #[test]
    fn v1_unknown_transport_is_tolerated() {
        let line = b"PROXY UNKNOWN\r\n";
        let (header, consumed) = parse(line).unwrap();
        assert_eq!(header, ProxyHeader::Unknown);
        assert_eq!(consumed, line.len());
    }

    #[test]
    fn v2_unsupported_command_is_tolerated() {
        let mut buf = V2_SIG.to_vec();
        buf.push(0x20); // version=2, command=0 (LOCAL)
        buf.push(0x11); // family=1 (AF_INET), transport=1 (STREAM)
        buf.extend_from_slice(&12u16.to_be_bytes());
        buf.extend_from_slice(&[0u8; 12]);
        let (header, consumed) = parse(&buf).unwrap();
        assert_eq!(header, ProxyHeader::Unknown);
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn v2_tcp4_roundtrip() {
        let mut buf = V2_SIG.to_vec();
        buf.push(0x21); // version=2, command=1 (PROXY)
        buf.push(0x11); // family=1, transport=1 (STREAM)
        buf.extend_from_slice(&12u16.to_be_bytes());
        buf.extend_from_slice(&[10, 0, 0, 1]);
        buf.extend_from_slice(&[10, 0, 0, 2]);
        buf.extend_from_slice(&1234u16.to_be_bytes());
        buf.extend_from_slice(&80u16.to_be_bytes());

        let (header, consumed) = parse(&buf).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(
            header,
            ProxyHeader::Endpoints(ProxyEndpoints {
                src_addr: "10.0.0.1".parse().unwrap(),
                dst_addr: "10.0.0.2".parse().unwrap(),
                src_port: 1234,
                dst_port: 80,
            })
        );
    }

    #[test]
    fn incomplete_v1_waits_for_more_data() {
        assert_eq!(parse(b"PROXY TCP4 1.2.3"), Err(ProxyParseError::Incomplete));
    }

    #[test]
    fn non_proxy_traffic_is_rejected() {
        assert_eq!(
            parse(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n"),
            Err(ProxyParseError::NotProxy)
        );
    }
}
