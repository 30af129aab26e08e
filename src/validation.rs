use std::net::{Ipv4Addr, Ipv6Addr};

use regex::Regex;

use crate::record_type::RecordType;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is empty")]
    Empty(&'static str),
    #[error("name too long (max 253 characters)")]
    NameTooLong,
    #[error("label '{0}' too long (max 63 characters)")]
    LabelTooLong(String),
    #[error("label '{0}' contains invalid characters")]
    InvalidCharacters(String),
    #[error("label '{0}' must not start or end with '-'")]
    LeadingOrTrailingHyphen(String),
    #[error("'{name}' is not inside zone '{origin}'")]
    OutsideZone { name: String, origin: String },
    #[error("SOA records are managed by the server")]
    ReservedType,
    #[error("'{0}' is not a valid IPv4 address")]
    InvalidIpv4(String),
    #[error("'{0}' is not a valid IPv6 address")]
    InvalidIpv6(String),
}

lazy_static::lazy_static! {
    /// Host labels: lowercase letters, digits and '-'
    static ref ZONE_LABEL_RE: Regex = Regex::new(r"^[a-z0-9-]+$").unwrap();
    /// Owner-name labels may also carry '_' (SRV, DKIM, ACME)
    static ref OWNER_LABEL_RE: Regex = Regex::new(r"^[a-z0-9_-]+$").unwrap();
}

/// Lowercase, trim and strip the trailing dot, the form PowerDNS stores.
pub fn canonical_name(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

fn check_label(label: &str, pattern: &Regex) -> Result<(), ValidationError> {
    if label.is_empty() {
        return Err(ValidationError::Empty("label"));
    }
    if label.len() > 63 {
        return Err(ValidationError::LabelTooLong(label.to_string()));
    }
    if !pattern.is_match(label) {
        return Err(ValidationError::InvalidCharacters(label.to_string()));
    }
    if label.starts_with('-') || label.ends_with('-') {
        return Err(ValidationError::LeadingOrTrailingHyphen(label.to_string()));
    }
    Ok(())
}

/// Validate and canonicalise a zone (origin) name.
pub fn zone_name(input: &str) -> Result<String, ValidationError> {
    let name = canonical_name(input);
    if name.is_empty() {
        return Err(ValidationError::Empty("zone name"));
    }
    if name.len() > 253 {
        return Err(ValidationError::NameTooLong);
    }
    for label in name.split('.') {
        check_label(label, &ZONE_LABEL_RE)?;
    }
    Ok(name)
}

/// Validate and canonicalise a record owner name that must live inside `origin`.
///
/// `origin` is expected in canonical form. A leading `*` label is accepted.
pub fn owner_name(input: &str, origin: &str) -> Result<String, ValidationError> {
    let name = canonical_name(input);
    if name.is_empty() {
        return Err(ValidationError::Empty("record name"));
    }
    if name.len() > 253 {
        return Err(ValidationError::NameTooLong);
    }
    for (i, label) in name.split('.').enumerate() {
        if i == 0 && label == "*" {
            continue;
        }
        check_label(label, &OWNER_LABEL_RE)?;
    }

    let inside = name == origin
        || name
            .strip_suffix(origin)
            .is_some_and(|head| head.ends_with('.'));
    if !inside {
        return Err(ValidationError::OutsideZone {
            name,
            origin: origin.to_string(),
        });
    }
    Ok(name)
}

/// Check record content against its type. Returns the trimmed content.
pub fn record_content(rtype: RecordType, content: &str) -> Result<String, ValidationError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(ValidationError::Empty("record content"));
    }
    match rtype {
        RecordType::Soa => return Err(ValidationError::ReservedType),
        RecordType::A => {
            content
                .parse::<Ipv4Addr>()
                .map_err(|_| ValidationError::InvalidIpv4(content.to_string()))?;
        }
        RecordType::Aaaa => {
            content
                .parse::<Ipv6Addr>()
                .map_err(|_| ValidationError::InvalidIpv6(content.to_string()))?;
        }
        _ => {}
    }
    Ok(content.to_string())
}

/// Reject types that clients may not touch directly.
pub fn writable_type(rtype: RecordType) -> Result<RecordType, ValidationError> {
    if rtype == RecordType::Soa {
        return Err(ValidationError::ReservedType);
    }
    Ok(rtype)
}

/// Account credentials only need to be present.
pub fn credentials<'a>(
    email: &'a str,
    password: &'a str,
) -> Result<(&'a str, &'a str), ValidationError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ValidationError::Empty("email"));
    }
    if password.is_empty() {
        return Err(ValidationError::Empty("password"));
    }
    Ok((email, password))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_names_are_canonicalised() {
        assert_eq!(zone_name("Example.COM.").unwrap(), "example.com");
        assert_eq!(zone_name("xn--bcher-kva.example").unwrap(), "xn--bcher-kva.example");
        assert_eq!(zone_name("  ").unwrap_err(), ValidationError::Empty("zone name"));
        assert!(matches!(
            zone_name("-bad.example"),
            Err(ValidationError::LeadingOrTrailingHyphen(_))
        ));
        assert!(matches!(
            zone_name("under_score.example"),
            Err(ValidationError::InvalidCharacters(_))
        ));
        assert!(matches!(zone_name("a..b"), Err(ValidationError::Empty("label"))));
    }

    #[test]
    fn owner_names_must_sit_inside_the_zone() {
        assert_eq!(owner_name("x.com", "x.com").unwrap(), "x.com");
        assert_eq!(owner_name("WWW.x.com.", "x.com").unwrap(), "www.x.com");
        assert_eq!(owner_name("*.x.com", "x.com").unwrap(), "*.x.com");
        assert_eq!(owner_name("_dmarc.x.com", "x.com").unwrap(), "_dmarc.x.com");
        assert!(matches!(
            owner_name("ax.com", "x.com"),
            Err(ValidationError::OutsideZone { .. })
        ));
        assert!(matches!(
            owner_name("y.com", "x.com"),
            Err(ValidationError::OutsideZone { .. })
        ));
        assert!(owner_name("a.*.x.com", "x.com").is_err());
    }

    #[test]
    fn content_checked_per_type() {
        assert_eq!(record_content(RecordType::A, " 21.21.21.21 ").unwrap(), "21.21.21.21");
        assert!(record_content(RecordType::A, "::1").is_err());
        assert!(record_content(RecordType::Aaaa, "2001:db8::1").is_ok());
        assert!(record_content(RecordType::Txt, "").is_err());
        assert_eq!(
            record_content(RecordType::Soa, "a b 1 60 60 60 60").unwrap_err(),
            ValidationError::ReservedType
        );
    }

    #[test]
    fn credentials_must_be_present() {
        assert_eq!(credentials(" a@x.com ", "pw").unwrap(), ("a@x.com", "pw"));
        assert_eq!(credentials("", "pw").unwrap_err(), ValidationError::Empty("email"));
        assert_eq!(credentials("a@x.com", "").unwrap_err(), ValidationError::Empty("password"));
    }
}
