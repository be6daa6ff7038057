/// Supplies the authenticated username for a connection.
///
/// The session core treats usernames as opaque strings; credential issuance
/// and verification live outside this crate. The provider sees the name the
/// client claims and returns the name the session will use, or rejects it.
pub trait IdentityProvider: Send + Sync {
    fn resolve(&self, claimed: &str) -> Option<String>;
}

/// Default provider: trusts the claimed name after shape validation.
#[derive(Debug, Default)]
pub struct TrustedIdentity;

impl IdentityProvider for TrustedIdentity {
    fn resolve(&self, claimed: &str) -> Option<String> {
        let name = claimed.trim().to_string();
        if name.is_empty() || name.len() > 32 || name.chars().any(|c| c.is_control()) {
            return None;
        }
        Some(name)
    }
}
