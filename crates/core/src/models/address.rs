/// Shared address value types
use serde::{Deserialize, Serialize};

/// A single `{name?, address}` pair, the unit every address-bearing field
/// (From/To/Cc/Bcc/Reply-To) is expressed in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmailAddress {
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl EmailAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
        }
    }

    pub fn domain(&self) -> Option<&str> {
        self.address.split('@').nth(1)
    }
}

/// An address-bearing header as both its literal text and the parsed tuples,
/// matching what `MimeParser` must return per address field.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AddressGroup {
    pub text: Option<String>,
    #[serde(default)]
    pub addresses: Vec<EmailAddress>,
}

impl AddressGroup {
    pub fn single(addr: EmailAddress) -> Self {
        Self {
            text: Some(match &addr.name {
                Some(name) => format!("{name} <{}>", addr.address),
                None => addr.address.clone(),
            }),
            addresses: vec![addr],
        }
    }

    pub fn first(&self) -> Option<&EmailAddress> {
        self.addresses.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_address_domain() {
        let addr = EmailAddress::new("sales@acme.com");
        assert_eq!(addr.domain(), Some("acme.com"));
    }

    #[test]
    fn test_address_group_single() {
        let group = AddressGroup::single(EmailAddress {
            address: "a@b.com".to_string(),
            name: Some("A".to_string()),
        });
        assert_eq!(group.text.as_deref(), Some("A <a@b.com>"));
    }
}
