//! Enumerated configuration domains
//!
//! Each domain accepts its canonical name, a handful of legacy spellings and,
//! where the cloud API allows it, a numeric code. The accepted spellings live
//! in one alias table per domain; [`Enumerated::normalize`] is the only
//! place that interprets them.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Raw enumerated input: either text or a number.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Token {
    Text(String),
    Number(i64),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Text(s) => f.write_str(s),
            Token::Number(n) => write!(f, "{}", n),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("unrecognized {domain} value '{value}'")]
pub struct UnknownToken {
    pub domain: &'static str,
    pub value: String,
}

/// A closed set of values backed by an alias table.
pub trait Enumerated: Sized + Copy + PartialEq + 'static {
    /// Human name of the domain, used in error messages.
    const DOMAIN: &'static str;

    /// `(spelling, value)` pairs. The first spelling listed for a value is
    /// its canonical form.
    const ALIASES: &'static [(&'static str, Self)];

    fn normalize(token: &Token) -> Result<Self, UnknownToken> {
        let text = token.to_string();
        let text = text.trim();
        Self::ALIASES
            .iter()
            .find(|(alias, _)| alias.eq_ignore_ascii_case(text))
            .map(|(_, value)| *value)
            .ok_or_else(|| UnknownToken {
                domain: Self::DOMAIN,
                value: text.to_string(),
            })
    }

    fn canonical(self) -> &'static str {
        Self::ALIASES
            .iter()
            .find(|(_, value)| *value == self)
            .map(|(alias, _)| *alias)
            .unwrap_or_default()
    }
}

macro_rules! enumerated {
    (
        $(#[$meta:meta])*
        $name:ident: $domain:literal {
            $($(#[$vmeta:meta])* $variant:ident),+ $(,)?
        }
        aliases {
            $($alias:literal => $target:ident),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub enum $name {
            $($(#[$vmeta])* $variant,)+
        }

        impl Enumerated for $name {
            const DOMAIN: &'static str = $domain;
            const ALIASES: &'static [(&'static str, Self)] = &[$(($alias, $name::$target)),+];
        }

        impl FromStr for $name {
            type Err = UnknownToken;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::normalize(&Token::Text(s.to_string()))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.canonical())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.canonical())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let token = Token::deserialize(deserializer)?;
                Self::normalize(&token).map_err(serde::de::Error::custom)
            }
        }
    };
}

enumerated! {
    /// IP protocol of a security group rule. `Any` maps to the API's null protocol.
    Protocol: "protocol" {
        #[default]
        Any,
        Icmp,
        Tcp,
        Udp,
    }
    aliases {
        "null" => Any,
        "any" => Any,
        "none" => Any,
        "icmp" => Icmp,
        "1" => Icmp,
        "tcp" => Tcp,
        "6" => Tcp,
        "udp" => Udp,
        "17" => Udp,
    }
}

enumerated! {
    /// Traffic direction of a security group rule.
    Direction: "direction" {
        #[default]
        Ingress,
        Egress,
    }
    aliases {
        "ingress" => Ingress,
        "egress" => Egress,
    }
}

enumerated! {
    /// Address family of a security group rule.
    Ethertype: "ethertype" {
        #[default]
        IPv4,
        IPv6,
    }
    aliases {
        "IPv4" => IPv4,
        "4" => IPv4,
        "IPv6" => IPv6,
        "6" => IPv6,
    }
}

enumerated! {
    /// IPv6 router advertisement / address mode of a subnet.
    Ipv6Mode: "IPv6 mode" {
        #[default]
        Slaac,
        Stateful,
        Stateless,
    }
    aliases {
        "slaac" => Slaac,
        "dhcpv6-stateful" => Stateful,
        "stateful" => Stateful,
        "dhcpv6-stateless" => Stateless,
        "stateless" => Stateless,
    }
}

enumerated! {
    /// Where a QoS spec is enforced.
    Consumer: "QoS consumer" {
        #[default]
        FrontEnd,
        BackEnd,
        Both,
    }
    aliases {
        "front-end" => FrontEnd,
        "front_end" => FrontEnd,
        "back-end" => BackEnd,
        "back_end" => BackEnd,
        "both" => Both,
    }
}

enumerated! {
    /// Where volume encryption is performed.
    ControlLocation: "control location" {
        #[default]
        FrontEnd,
        BackEnd,
    }
    aliases {
        "front-end" => FrontEnd,
        "front_end" => FrontEnd,
        "back-end" => BackEnd,
        "back_end" => BackEnd,
    }
}

enumerated! {
    /// Disk format of an image.
    ImageFormat: "image format" {
        #[default]
        Qcow2,
        Raw,
        Vmdk,
        Vdi,
        Iso,
        Ami,
        Ari,
        Aki,
        Vhd,
    }
    aliases {
        "qcow2" => Qcow2,
        "raw" => Raw,
        "vmdk" => Vmdk,
        "vdi" => Vdi,
        "iso" => Iso,
        "ami" => Ami,
        "ari" => Ari,
        "aki" => Aki,
        "vhd" => Vhd,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_aliases() {
        assert_eq!("tcp".parse::<Protocol>().unwrap(), Protocol::Tcp);
        assert_eq!("TCP".parse::<Protocol>().unwrap(), Protocol::Tcp);
        assert_eq!(Protocol::normalize(&Token::Number(1)).unwrap(), Protocol::Icmp);
        assert_eq!(Protocol::normalize(&Token::Number(17)).unwrap(), Protocol::Udp);
        assert_eq!("null".parse::<Protocol>().unwrap(), Protocol::Any);
    }

    #[test]
    fn test_unknown_token_is_rejected() {
        let err = "gre".parse::<Protocol>().unwrap_err();
        assert_eq!(err.domain, "protocol");
        assert_eq!(err.value, "gre");
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn test_canonical_spelling() {
        assert_eq!(Protocol::Any.to_string(), "null");
        assert_eq!(Ethertype::IPv6.to_string(), "IPv6");
        assert_eq!(Ipv6Mode::Stateful.to_string(), "dhcpv6-stateful");
        assert_eq!(Consumer::BackEnd.to_string(), "back-end");
    }

    #[test]
    fn test_deserialize_from_string_or_number() {
        let ethertype: Ethertype = serde_json::from_value(serde_json::json!(6)).unwrap();
        assert_eq!(ethertype, Ethertype::IPv6);

        let consumer: Consumer = serde_json::from_value(serde_json::json!("front_end")).unwrap();
        assert_eq!(consumer, Consumer::FrontEnd);

        let err = serde_json::from_value::<ControlLocation>(serde_json::json!("middle"))
            .unwrap_err()
            .to_string();
        assert!(err.contains("unrecognized control location value 'middle'"));
    }
}
