//! Client IP extraction with proxy support
//!
//! `X-Forwarded-For` and `X-Real-IP` are honored only when the connection
//! peer is a trusted proxy, and the forwarded chain is walked right-to-left
//! so a client cannot spoof its address by prepending fake entries.
//!
//! Trusted proxies are configured via the `TRUSTED_PROXIES` environment
//! variable (comma-separated IPs or CIDR ranges); the default trusts
//! localhost and private network ranges.

use actix_web::HttpRequest;
use std::env;
use std::net::IpAddr;
use std::str::FromStr;
use tracing::{debug, warn};

/// Extract the client's IP address from the request
///
/// Returns "unknown" when no peer address is available (unit tests without
/// a socket).
pub fn extract_ip(req: &HttpRequest) -> String {
    let peer_ip = req
        .connection_info()
        .peer_addr()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    if !is_trusted_proxy(&peer_ip) {
        return peer_ip;
    }

    // Peer is a trusted proxy; walk X-Forwarded-For right-to-left and
    // return the first untrusted hop
    if let Some(forwarded_for) = req.headers().get("X-Forwarded-For") {
        if let Ok(value) = forwarded_for.to_str() {
            for ip in value.split(',').map(str::trim).rev() {
                if !is_valid_ip(ip) {
                    warn!(ip = %ip, "Invalid IP in X-Forwarded-For chain, skipping");
                    continue;
                }
                if !is_trusted_proxy(ip) {
                    return ip.to_string();
                }
            }
            debug!(chain = %value, "All IPs in X-Forwarded-For are trusted proxies");
        }
    }

    if let Some(real_ip) = req.headers().get("X-Real-IP") {
        if let Ok(value) = real_ip.to_str() {
            let value = value.trim();
            if is_valid_ip(value) {
                return value.to_string();
            }
        }
    }

    peer_ip
}

fn is_trusted_proxy(ip: &str) -> bool {
    let trusted_proxies = env::var("TRUSTED_PROXIES").unwrap_or_else(|_| {
        "127.0.0.1,::1,10.0.0.0/8,172.16.0.0/12,192.168.0.0/16,fc00::/7".to_string()
    });

    let ip_addr = match IpAddr::from_str(ip) {
        Ok(addr) => addr,
        Err(_) => return false,
    };

    trusted_proxies.split(',').map(str::trim).any(|trusted| {
        if trusted.contains('/') {
            ip_in_cidr(&ip_addr, trusted)
        } else {
            IpAddr::from_str(trusted).map(|t| t == ip_addr).unwrap_or(false)
        }
    })
}

fn ip_in_cidr(ip: &IpAddr, cidr: &str) -> bool {
    let Some((network, prefix)) = cidr.split_once('/') else {
        return false;
    };
    let network_addr = match IpAddr::from_str(network) {
        Ok(addr) => addr,
        Err(_) => return false,
    };
    let prefix_len: u8 = match prefix.parse() {
        Ok(len) => len,
        Err(_) => return false,
    };

    match (ip, network_addr) {
        (IpAddr::V4(ip_v4), IpAddr::V4(net_v4)) => {
            if prefix_len > 32 {
                return false;
            }
            let mask = if prefix_len == 0 {
                0
            } else {
                !0u32 << (32 - prefix_len)
            };
            (u32::from(*ip_v4) & mask) == (u32::from(net_v4) & mask)
        }
        (IpAddr::V6(ip_v6), IpAddr::V6(net_v6)) => {
            if prefix_len > 128 {
                return false;
            }
            let mask = if prefix_len == 0 {
                0
            } else {
                !0u128 << (128 - prefix_len)
            };
            (u128::from(*ip_v6) & mask) == (u128::from(net_v6) & mask)
        }
        _ => false,
    }
}

fn is_valid_ip(ip: &str) -> bool {
    IpAddr::from_str(ip).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_extract_ip_from_peer() {
        let req = TestRequest::default()
            .peer_addr("203.0.113.45:8080".parse().unwrap())
            .to_http_request();

        assert!(extract_ip(&req).starts_with("203.0.113.45"));
    }

    #[test]
    fn test_forwarded_for_parsed_right_to_left() {
        // "spoofed, real-client, trusted-proxy" must resolve to real-client
        let req = TestRequest::default()
            .peer_addr("127.0.0.1:8080".parse().unwrap())
            .insert_header(("X-Forwarded-For", "198.51.100.99, 203.0.113.45, 10.0.0.1"))
            .to_http_request();

        assert_eq!(extract_ip(&req), "203.0.113.45");
    }

    #[test]
    fn test_forwarded_for_ignored_from_untrusted_peer() {
        let req = TestRequest::default()
            .peer_addr("203.0.113.45:8080".parse().unwrap())
            .insert_header(("X-Forwarded-For", "198.51.100.1"))
            .to_http_request();

        assert!(extract_ip(&req).starts_with("203.0.113.45"));
    }

    #[test]
    fn test_real_ip_fallback() {
        let req = TestRequest::default()
            .peer_addr("127.0.0.1:8080".parse().unwrap())
            .insert_header(("X-Real-IP", "203.0.113.45"))
            .to_http_request();

        assert_eq!(extract_ip(&req), "203.0.113.45");
    }

    #[test]
    fn test_trusted_proxy_defaults() {
        assert!(is_trusted_proxy("127.0.0.1"));
        assert!(is_trusted_proxy("10.1.2.3"));
        assert!(is_trusted_proxy("192.168.1.1"));
        assert!(!is_trusted_proxy("8.8.8.8"));
        assert!(!is_trusted_proxy("not-an-ip"));
    }

    #[test]
    fn test_ip_in_cidr() {
        let ip = IpAddr::from_str("10.1.2.3").unwrap();
        assert!(ip_in_cidr(&ip, "10.0.0.0/8"));
        assert!(!ip_in_cidr(&ip, "192.168.0.0/16"));
        assert!(!ip_in_cidr(&ip, "10.0.0.0/33"));
        assert!(ip_in_cidr(&ip, "0.0.0.0/0"));

        let ip6 = IpAddr::from_str("2001:db8::1").unwrap();
        assert!(ip_in_cidr(&ip6, "2001:db8::/32"));
        assert!(!ip_in_cidr(&ip6, "2001:db9::/32"));
    }
}
