//! Store keys for published cluster configuration
//!
//! Every cluster publishes `genesis`, `wallet` and one `server_<i>` entry per
//! validator ordinal (1-based).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const SERVER_PREFIX: &str = "server_";

/// Name of a published configuration entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ConfigKey {
    Genesis,
    Wallet,
    /// Descriptor of the validator with the given ordinal.
    Server(u32),
}

impl ConfigKey {
    /// All keys a cluster of `validators` validators publishes.
    pub fn expected(validators: u32) -> Vec<ConfigKey> {
        let mut keys = vec![ConfigKey::Genesis, ConfigKey::Wallet];
        keys.extend((1..=validators).map(ConfigKey::Server));
        keys
    }

    pub fn as_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigKey::Genesis => write!(f, "genesis"),
            ConfigKey::Wallet => write!(f, "wallet"),
            ConfigKey::Server(id) => write!(f, "{}{}", SERVER_PREFIX, id),
        }
    }
}

impl FromStr for ConfigKey {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "genesis" => Ok(ConfigKey::Genesis),
            "wallet" => Ok(ConfigKey::Wallet),
            _ => {
                let id = s
                    .strip_prefix(SERVER_PREFIX)
                    .and_then(|n| n.parse::<u32>().ok())
                    .filter(|id| *id >= 1)
                    .ok_or_else(|| crate::Error::InvalidKey(s.to_string()))?;
                Ok(ConfigKey::Server(id))
            }
        }
    }
}

impl TryFrom<String> for ConfigKey {
    type Error = crate::Error;

    fn try_from(s: String) -> crate::Result<Self> {
        s.parse()
    }
}

impl From<ConfigKey> for String {
    fn from(key: ConfigKey) -> Self {
        key.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(ConfigKey::Genesis.to_string(), "genesis");
        assert_eq!(ConfigKey::Wallet.to_string(), "wallet");
        assert_eq!(ConfigKey::Server(7).to_string(), "server_7");
    }

    #[test]
    fn test_parse() {
        assert_eq!("server_12".parse::<ConfigKey>().unwrap(), ConfigKey::Server(12));
        assert_eq!("wallet".parse::<ConfigKey>().unwrap(), ConfigKey::Wallet);
        assert!("server_0".parse::<ConfigKey>().is_err());
        assert!("server_".parse::<ConfigKey>().is_err());
        assert!("servers_1".parse::<ConfigKey>().is_err());
        assert!("Genesis".parse::<ConfigKey>().is_err());
    }

    #[test]
    fn test_expected_keys() {
        let keys = ConfigKey::expected(2);
        assert_eq!(keys.len(), 4);
        assert!(keys.contains(&ConfigKey::Server(1)));
        assert!(keys.contains(&ConfigKey::Server(2)));
        assert!(!keys.contains(&ConfigKey::Server(3)));
    }
}
