//! Sign-In with Ethereum (EIP-4361) messages.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};

use hyperspace_core::AccountId;

use crate::error::ServerError;

const PREAMBLE: &str = " wants you to sign in with your Ethereum account:";

/// A parsed sign-in message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiweMessage {
    pub domain: String,
    pub address: AccountId,
    pub statement: Option<String>,
    pub uri: String,
    pub version: String,
    pub chain_id: u64,
    pub nonce: String,
    pub issued_at: DateTime<Utc>,
    pub expiration_time: Option<DateTime<Utc>>,
    pub not_before: Option<DateTime<Utc>>,
    pub request_id: Option<String>,
    pub resources: Vec<String>,
}

impl SiweMessage {
    /// A minimal message for `address`, issued now.
    pub fn new(domain: &str, address: &AccountId, uri: &str, nonce: &str) -> Self {
        Self {
            domain: domain.to_string(),
            address: address.clone(),
            statement: None,
            uri: uri.to_string(),
            version: "1".to_string(),
            chain_id: 1,
            nonce: nonce.to_string(),
            issued_at: Utc::now(),
            expiration_time: None,
            not_before: None,
            request_id: None,
            resources: Vec::new(),
        }
    }

    /// Check the time bounds against `now`.
    pub fn check_time(&self, now: DateTime<Utc>) -> Result<(), ServerError> {
        if self.expiration_time.is_some_and(|exp| exp <= now) {
            return Err(ServerError::Unauthorized("sign-in message expired".into()));
        }
        if self.not_before.is_some_and(|nbf| nbf > now) {
            return Err(ServerError::Unauthorized("sign-in message not yet valid".into()));
        }
        Ok(())
    }
}

fn invalid(what: &str) -> ServerError {
    ServerError::Validation(format!("invalid sign-in message: {what}"))
}

fn parse_time(field: &str, value: &str) -> Result<DateTime<Utc>, ServerError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| invalid(field))
}

fn is_nonce(s: &str) -> bool {
    s.len() >= 8 && s.chars().all(|c| c.is_ascii_alphanumeric())
}

fn is_address(s: &str) -> bool {
    s.len() == 42 && s.starts_with("0x") && s[2..].chars().all(|c| c.is_ascii_hexdigit())
}

impl FromStr for SiweMessage {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut lines = s.lines().peekable();

        let header = lines.next().ok_or_else(|| invalid("empty"))?;
        let domain = header
            .strip_suffix(PREAMBLE)
            .filter(|d| !d.is_empty())
            .ok_or_else(|| invalid("header"))?;
        // Optional scheme
        let domain = domain.split_once("://").map_or(domain, |(_, d)| d);

        let address = lines.next().ok_or_else(|| invalid("address"))?;
        if !is_address(address) {
            return Err(invalid("address"));
        }

        // Blank line, optional statement, blank line
        let mut statement = None;
        while lines.peek().is_some_and(|l| l.is_empty()) {
            lines.next();
        }
        if lines.peek().is_some_and(|l| !l.starts_with("URI: ")) {
            statement = lines.next().map(str::to_string);
            while lines.peek().is_some_and(|l| l.is_empty()) {
                lines.next();
            }
        }

        let mut uri = None;
        let mut version = None;
        let mut chain_id = None;
        let mut nonce = None;
        let mut issued_at = None;
        let mut expiration_time = None;
        let mut not_before = None;
        let mut request_id = None;
        let mut resources = Vec::new();

        while let Some(line) = lines.next() {
            if line == "Resources:" {
                for resource in lines.by_ref() {
                    let resource = resource.strip_prefix("- ").ok_or_else(|| invalid("resources"))?;
                    resources.push(resource.to_string());
                }
                break;
            }
            let (key, value) = line.split_once(": ").ok_or_else(|| invalid(line))?;
            match key {
                "URI" => uri = Some(value.to_string()),
                "Version" => version = Some(value.to_string()),
                "Chain ID" => chain_id = Some(value.parse().map_err(|_| invalid("Chain ID"))?),
                "Nonce" => nonce = Some(value.to_string()),
                "Issued At" => issued_at = Some(parse_time(key, value)?),
                "Expiration Time" => expiration_time = Some(parse_time(key, value)?),
                "Not Before" => not_before = Some(parse_time(key, value)?),
                "Request ID" => request_id = Some(value.to_string()),
                _ => return Err(invalid(key)),
            }
        }

        let version = version.ok_or_else(|| invalid("missing Version"))?;
        if version != "1" {
            return Err(invalid("Version"));
        }
        let nonce = nonce.ok_or_else(|| invalid("missing Nonce"))?;
        if !is_nonce(&nonce) {
            return Err(invalid("Nonce"));
        }

        Ok(Self {
            domain: domain.to_string(),
            address: AccountId::new(address),
            statement,
            uri: uri.ok_or_else(|| invalid("missing URI"))?,
            version,
            chain_id: chain_id.ok_or_else(|| invalid("missing Chain ID"))?,
            nonce,
            issued_at: issued_at.ok_or_else(|| invalid("missing Issued At"))?,
            expiration_time,
            not_before,
            request_id,
            resources,
        })
    }
}

fn rfc3339(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl fmt::Display for SiweMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}{}", self.domain, PREAMBLE)?;
        writeln!(f, "{}", self.address)?;
        writeln!(f)?;
        if let Some(statement) = &self.statement {
            writeln!(f, "{statement}")?;
        }
        writeln!(f)?;
        writeln!(f, "URI: {}", self.uri)?;
        writeln!(f, "Version: {}", self.version)?;
        writeln!(f, "Chain ID: {}", self.chain_id)?;
        writeln!(f, "Nonce: {}", self.nonce)?;
        write!(f, "Issued At: {}", rfc3339(&self.issued_at))?;
        if let Some(exp) = &self.expiration_time {
            write!(f, "\nExpiration Time: {}", rfc3339(exp))?;
        }
        if let Some(nbf) = &self.not_before {
            write!(f, "\nNot Before: {}", rfc3339(nbf))?;
        }
        if let Some(request_id) = &self.request_id {
            write!(f, "\nRequest ID: {request_id}")?;
        }
        if !self.resources.is_empty() {
            write!(f, "\nResources:")?;
            for resource in &self.resources {
                write!(f, "\n- {resource}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const SAMPLE: &str = "example.com wants you to sign in with your Ethereum account:
0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2

Sign in to Hyperspace

URI: https://example.com/login
Version: 1
Chain ID: 1
Nonce: 32891756abcd
Issued At: 2024-01-02T03:04:05.000Z
Expiration Time: 2024-01-03T03:04:05.000Z
Resources:
- https://example.com/a
- https://example.com/b";

    #[test]
    fn test_parse_full_message() {
        let msg: SiweMessage = SAMPLE.parse().unwrap();
        assert_eq!(msg.domain, "example.com");
        assert_eq!(msg.address.as_str(), "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2");
        assert_eq!(msg.statement.as_deref(), Some("Sign in to Hyperspace"));
        assert_eq!(msg.uri, "https://example.com/login");
        assert_eq!(msg.chain_id, 1);
        assert_eq!(msg.nonce, "32891756abcd");
        assert!(msg.expiration_time.is_some());
        assert_eq!(msg.resources.len(), 2);
    }

    #[test]
    fn test_display_roundtrips() {
        let parsed: SiweMessage = SAMPLE.parse().unwrap();
        let again: SiweMessage = parsed.to_string().parse().unwrap();
        assert_eq!(again.statement, parsed.statement);
        assert_eq!(again.expiration_time, parsed.expiration_time);
        assert_eq!(again.resources, parsed.resources);
        assert_eq!(again.nonce, parsed.nonce);
    }

    #[test]
    fn test_without_statement() {
        let address = AccountId::new("0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2");
        let msg = SiweMessage::new("localhost:3030", &address, "http://localhost", "abcdefgh1");
        let text = msg.to_string();
        assert!(text.contains("\n\n\nURI: "));
        let parsed: SiweMessage = text.parse().unwrap();
        assert_eq!(parsed.statement, None);
        assert_eq!(parsed.address, address);
    }

    #[test]
    fn test_rejects_malformed() {
        assert!("".parse::<SiweMessage>().is_err());
        assert!(SAMPLE.replace("Version: 1", "Version: 2").parse::<SiweMessage>().is_err());
        assert!(SAMPLE.replace("Nonce: 32891756abcd", "Nonce: x").parse::<SiweMessage>().is_err());
        assert!(SAMPLE.replace("0xC02aaA", "0xZZZaaA").parse::<SiweMessage>().is_err());
        assert!(SAMPLE.replace("Issued At: ", "Issued: ").parse::<SiweMessage>().is_err());
    }

    #[test]
    fn test_time_bounds() {
        let mut msg: SiweMessage = SAMPLE.parse().unwrap();
        let exp = msg.expiration_time.unwrap();
        assert!(msg.check_time(exp - Duration::seconds(1)).is_ok());
        assert!(msg.check_time(exp).is_err());

        msg.not_before = Some(exp - Duration::hours(1));
        assert!(msg.check_time(exp - Duration::hours(2)).is_err());
    }

    proptest::proptest! {
        #[test]
        fn test_parse_never_panics(text in "\\PC*(\n\\PC*){0,12}") {
            let _ = text.parse::<SiweMessage>();
        }

        #[test]
        fn test_nonce_and_domain_survive_formatting(
            nonce in "[a-zA-Z0-9]{8,32}",
            domain in "[a-z]{1,12}\\.[a-z]{2,4}",
        ) {
            let address = AccountId::new("0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2");
            let msg = SiweMessage::new(&domain, &address, "https://example.com", &nonce);
            let parsed: SiweMessage = msg.to_string().parse().unwrap();
            proptest::prop_assert_eq!(parsed.nonce, nonce);
            proptest::prop_assert_eq!(parsed.domain, domain);
        }
    }
}
