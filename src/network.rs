use rust_decimal::Decimal;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    Polkadot,
    Kusama,
    Westend,
}

impl Network {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Polkadot => "POLKADOT",
            Self::Kusama => "KUSAMA",
            Self::Westend => "WESTEND",
        }
    }

    pub const fn ss58_prefix(self) -> u16 {
        match self {
            Self::Polkadot => 0,
            Self::Kusama => 2,
            Self::Westend => 42,
        }
    }

    pub const fn currency(self) -> Currency {
        match self {
            Self::Polkadot => Currency::Dot,
            Self::Kusama => Currency::Ksm,
            Self::Westend => Currency::Wnd,
        }
    }
}

impl Display for Network {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Network {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "POLKADOT" => Ok(Self::Polkadot),
            "KUSAMA" => Ok(Self::Kusama),
            "WESTEND" => Ok(Self::Westend),
            _ => Err(ValidationError::UnknownNetwork(s.to_string())),
        }
    }
}

/// Native currency of a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Currency {
    Dot,
    Ksm,
    Wnd,
}

impl Currency {
    pub const fn ticker(self) -> &'static str {
        match self {
            Self::Dot => "DOT",
            Self::Ksm => "KSM",
            Self::Wnd => "WND",
        }
    }

    pub const fn decimals(self) -> u32 {
        match self {
            Self::Dot => 10,
            Self::Ksm | Self::Wnd => 12,
        }
    }

    pub const fn network(self) -> Network {
        match self {
            Self::Dot => Network::Polkadot,
            Self::Ksm => Network::Kusama,
            Self::Wnd => Network::Westend,
        }
    }

    /// Converts an amount in planck into the display unit, trailing zeros trimmed.
    pub fn from_planck(self, planck: u128) -> Result<Decimal, ValidationError> {
        let mantissa = i128::try_from(planck).map_err(|_| ValidationError::AmountOverflow(planck))?;

        Decimal::try_from_i128_with_scale(mantissa, self.decimals())
            .map(|amount| amount.normalize())
            .map_err(|_| ValidationError::AmountOverflow(planck))
    }
}

impl Display for Currency {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.ticker())
    }
}

impl FromStr for Currency {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DOT" => Ok(Self::Dot),
            "KSM" => Ok(Self::Ksm),
            "WND" => Ok(Self::Wnd),
            _ => Err(ValidationError::UnknownCurrency(s.to_string())),
        }
    }
}

pub fn parse_planck(value: &str) -> Result<u128, ValidationError> {
    value
        .parse::<u128>()
        .map_err(|_| ValidationError::InvalidAmount(value.to_string()))
}
