use serde::Serialize;
use utoipa::ToSchema;

/// Labels that can never be handed out as a tenant subdomain.
pub const RESERVED_SUBDOMAINS: &[&str] = &[
    "www", "api", "admin", "app", "mail", "smtp", "ftp", "localhost", "staging", "dev", "test",
    "demo", "support", "help", "blog", "docs", "status", "superadmin", "super-admin",
];

const MAX_DOMAIN_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Validation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Validation {
    fn ok() -> Self {
        Self { valid: true, error: None }
    }

    fn rejected(error: impl Into<String>) -> Self {
        Self { valid: false, error: Some(error.into()) }
    }
}

fn is_label_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'
}

/// Accepts a lowercase DNS label of 3 to 63 characters. Uppercase input is
/// rejected rather than folded.
pub fn validate_subdomain(subdomain: &str) -> Validation {
    if subdomain.is_empty() {
        return Validation::rejected("Subdomain is required");
    }
    if subdomain.len() < 3 || subdomain.len() > MAX_LABEL_LEN {
        return Validation::rejected("Subdomain must be between 3 and 63 characters");
    }
    if !subdomain.chars().all(is_label_char) {
        return Validation::rejected("Subdomain can only contain lowercase letters, numbers, and hyphens");
    }
    if subdomain.starts_with('-') || subdomain.ends_with('-') {
        return Validation::rejected("Subdomain cannot start or end with a hyphen");
    }
    if RESERVED_SUBDOMAINS.iter().any(|reserved| *reserved == subdomain) {
        return Validation::rejected("This subdomain is reserved");
    }
    Validation::ok()
}

/// Lowercases and trims a custom domain before it is validated or compared.
pub fn normalize_custom_domain(domain: &str) -> String {
    domain.trim().to_ascii_lowercase()
}

fn valid_hostname(domain: &str) -> bool {
    if domain.len() > MAX_DOMAIN_LEN {
        return false;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }

    let label_ok = |label: &str| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && label.chars().all(is_label_char)
            && !label.starts_with('-')
            && !label.ends_with('-')
    };

    // The top-level label needs at least two characters.
    labels.iter().all(|label| label_ok(label)) && labels.last().map(|tld| tld.len() >= 2).unwrap_or(false)
}

/// Checks a custom domain against DNS hostname syntax and keeps it clear of
/// the platform apex, which is only reachable through subdomain assignment.
pub fn validate_custom_domain(domain: &str, apex_domain: &str) -> Validation {
    let domain = normalize_custom_domain(domain);
    if domain.is_empty() {
        return Validation::rejected("Domain is required");
    }
    if !valid_hostname(&domain) {
        return Validation::rejected("Invalid domain format");
    }
    if domain == apex_domain || domain.ends_with(&format!(".{apex_domain}")) {
        return Validation::rejected("Cannot use platform domain as custom domain. Use subdomain instead.");
    }
    Validation::ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_reserved_word_is_rejected() {
        for word in RESERVED_SUBDOMAINS {
            let outcome = validate_subdomain(word);
            assert!(!outcome.valid, "{word} accepted");
        }
    }

    #[test]
    fn subdomain_length_bounds() {
        assert!(!validate_subdomain("ab").valid);
        assert!(validate_subdomain("abc").valid);
        assert!(validate_subdomain(&"a".repeat(63)).valid);
        assert!(!validate_subdomain(&"a".repeat(64)).valid);
        assert!(!validate_subdomain("").valid);
    }

    #[test]
    fn subdomain_charset_and_hyphens() {
        assert!(validate_subdomain("acme-hoa-2").valid);
        assert!(!validate_subdomain("Acme").valid);
        assert!(!validate_subdomain("acme_hoa").valid);
        assert!(!validate_subdomain("acme.hoa").valid);
        assert!(!validate_subdomain("-acme").valid);
        assert!(!validate_subdomain("acme-").valid);
    }

    #[test]
    fn custom_domain_syntax() {
        let apex = "example.com";
        assert!(validate_custom_domain("portal.acme-hoa.org", apex).valid);
        assert!(validate_custom_domain("Portal.Acme-HOA.org", apex).valid);
        assert!(!validate_custom_domain("", apex).valid);
        assert!(!validate_custom_domain("localhost", apex).valid);
        assert!(!validate_custom_domain("acme..org", apex).valid);
        assert!(!validate_custom_domain("-acme.org", apex).valid);
        assert!(!validate_custom_domain("acme.o", apex).valid);
        assert!(!validate_custom_domain("acme hoa.org", apex).valid);
    }

    #[test]
    fn custom_domain_cannot_shadow_platform() {
        let apex = "example.com";
        assert!(!validate_custom_domain("example.com", apex).valid);
        assert!(!validate_custom_domain("acme.example.com", apex).valid);
        assert!(!validate_custom_domain("WWW.EXAMPLE.COM", apex).valid);
        assert!(validate_custom_domain("notexample.com", apex).valid);
    }
}
