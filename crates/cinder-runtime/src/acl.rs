//! `host:port` allow-list matching for the sockets and HTTP extensions.

use std::net::IpAddr;

/// A compiled allow-list of `host:port` patterns.
///
/// An empty list denies everything, matching the capability model: access
/// exists only where configuration grants it.
#[derive(Debug, Clone, Default)]
pub struct HostPortAcl {
    rules: Vec<AclRule>,
}

#[derive(Debug, Clone)]
struct AclRule {
    host: HostPattern,
    port: PortPattern,
}

#[derive(Debug, Clone)]
enum HostPattern {
    Any,
    Exact(String),
    /// Stored with a leading dot: `*.internal` becomes `.internal`.
    Suffix(String),
}

#[derive(Debug, Clone, Copy)]
enum PortPattern {
    Any,
    Exact(u16),
}

impl HostPortAcl {
    /// Compile patterns like `db.internal:5432`, `*.svc:*`, `10.0.0.1`,
    /// `[::1]:53`. Unparseable patterns are dropped with a warning rather
    /// than silently widening or narrowing the list.
    #[must_use]
    pub fn from_patterns(patterns: &[String]) -> Self {
        let mut rules = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            match parse_pattern(pattern) {
                Some(rule) => rules.push(rule),
                None => tracing::warn!(pattern, "ignoring unparseable allow-list pattern"),
            }
        }
        Self { rules }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Whether `host:port` is allowed. Empty lists deny.
    #[must_use]
    pub fn allows(&self, host: &str, port: u16) -> bool {
        let host = normalize_host(host);
        if host.is_empty() {
            return false;
        }
        self.rules.iter().any(|rule| {
            let host_ok = match &rule.host {
                HostPattern::Any => true,
                HostPattern::Exact(h) => *h == host,
                HostPattern::Suffix(suffix) => host.ends_with(suffix.as_str()),
            };
            let port_ok = match rule.port {
                PortPattern::Any => true,
                PortPattern::Exact(p) => p == port,
            };
            host_ok && port_ok
        })
    }
}

fn parse_pattern(pattern: &str) -> Option<AclRule> {
    let trimmed = pattern.trim();
    if trimmed.is_empty() {
        return None;
    }

    // Bracketed IPv6 literal, optionally with a port.
    let (host_part, port_part) = if let Some(stripped) = trimmed.strip_prefix('[') {
        let (inside, rest) = stripped.split_once(']')?;
        let port = rest.strip_prefix(':');
        (inside, port)
    } else if let Some((left, right)) = trimmed.rsplit_once(':') {
        // Only a port separator when the right side looks like one;
        // multi-colon forms are bare IPv6 literals.
        if left.contains(':') {
            (trimmed, None)
        } else {
            (left, Some(right))
        }
    } else {
        (trimmed, None)
    };

    let port = match port_part {
        None | Some("*") => PortPattern::Any,
        Some(p) => PortPattern::Exact(p.parse().ok()?),
    };

    let host = normalize_host(host_part);
    let host = if host == "*" {
        HostPattern::Any
    } else if let Some(suffix) = host.strip_prefix("*.") {
        HostPattern::Suffix(format!(".{suffix}"))
    } else if host.is_empty() {
        return None;
    } else {
        HostPattern::Exact(host)
    };

    Some(AclRule { host, port })
}

/// Lowercase the host and canonicalize IP literals; bracket syntax is
/// stripped.
fn normalize_host(host: &str) -> String {
    let trimmed = host.trim();
    if let Some(stripped) = trimmed.strip_prefix('[') {
        if let Some((inside, _)) = stripped.split_once(']') {
            return inside.trim().to_ascii_lowercase();
        }
    }
    if let Ok(ip) = trimmed.parse::<IpAddr>() {
        return ip.to_string().to_ascii_lowercase();
    }
    trimmed.to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acl(patterns: &[&str]) -> HostPortAcl {
        let owned: Vec<String> = patterns.iter().map(|s| (*s).to_string()).collect();
        HostPortAcl::from_patterns(&owned)
    }

    #[test]
    fn empty_list_denies() {
        assert!(!acl(&[]).allows("db.internal", 5432));
    }

    #[test]
    fn exact_host_and_port() {
        let acl = acl(&["db.internal:5432"]);
        assert!(acl.allows("db.internal", 5432));
        assert!(!acl.allows("db.internal", 5433));
        assert!(!acl.allows("other.internal", 5432));
    }

    #[test]
    fn omitted_port_matches_any() {
        let acl = acl(&["api.example.com"]);
        assert!(acl.allows("api.example.com", 80));
        assert!(acl.allows("api.example.com", 443));
    }

    #[test]
    fn suffix_wildcard() {
        let acl = acl(&["*.svc:*"]);
        assert!(acl.allows("db.svc", 5432));
        assert!(acl.allows("a.b.svc", 1));
        assert!(!acl.allows("svc", 5432));
        assert!(!acl.allows("evil.com", 5432));
    }

    #[test]
    fn star_host_with_fixed_port() {
        let acl = acl(&["*:443"]);
        assert!(acl.allows("anything.example.com", 443));
        assert!(!acl.allows("anything.example.com", 80));
    }

    #[test]
    fn case_insensitive_hosts() {
        let acl = acl(&["DB.Internal:5432"]);
        assert!(acl.allows("db.internal", 5432));
    }

    #[test]
    fn ipv6_patterns() {
        let bracketed = acl(&["[::1]:53"]);
        assert!(bracketed.allows("::1", 53));
        assert!(bracketed.allows("[::1]", 53));
        assert!(!bracketed.allows("::1", 54));

        let bare = acl(&["2001:db8::1"]);
        assert!(bare.allows("2001:db8::1", 9000));
    }

    #[test]
    fn unparseable_patterns_are_dropped() {
        let acl = acl(&["db.internal:notaport", ""]);
        assert!(acl.is_empty());
    }
}
