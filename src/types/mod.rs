mod chain;
mod operation;
mod token;

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

pub use chain::*;
pub use operation::*;
pub use token::*;

/// Absolute slot number on the ledger.
pub type SlotNo = u64;

/// Hex encoded transaction hash.
pub type TxHash = String;

/// Supported exchange protocols and protocol versions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Dex {
    Minswap,
    MinswapV2,
    SundaeSwap,
    SundaeSwapV3,
    WingRiders,
    WingRidersV2,
    Spectrum,
    TeddySwap,
    Splash,
    VyFinance,
    MuesliSwap,
    GeniusYield,
}

impl Dex {
    pub const ALL: [Dex; 12] = [
        Dex::Minswap,
        Dex::MinswapV2,
        Dex::SundaeSwap,
        Dex::SundaeSwapV3,
        Dex::WingRiders,
        Dex::WingRidersV2,
        Dex::Spectrum,
        Dex::TeddySwap,
        Dex::Splash,
        Dex::VyFinance,
        Dex::MuesliSwap,
        Dex::GeniusYield,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Dex::Minswap => "Minswap",
            Dex::MinswapV2 => "MinswapV2",
            Dex::SundaeSwap => "SundaeSwap",
            Dex::SundaeSwapV3 => "SundaeSwapV3",
            Dex::WingRiders => "WingRiders",
            Dex::WingRidersV2 => "WingRidersV2",
            Dex::Spectrum => "Spectrum",
            Dex::TeddySwap => "TeddySwap",
            Dex::Splash => "Splash",
            Dex::VyFinance => "VyFinance",
            Dex::MuesliSwap => "MuesliSwap",
            Dex::GeniusYield => "GeniusYield",
        }
    }
}

impl fmt::Display for Dex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dex {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dex::ALL
            .into_iter()
            .find(|dex| dex.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown exchange: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dex_from_str() {
        assert_eq!("minswapv2".parse::<Dex>(), Ok(Dex::MinswapV2));
        assert_eq!("GeniusYield".parse::<Dex>(), Ok(Dex::GeniusYield));
        assert!("uniswap".parse::<Dex>().is_err());
        for dex in Dex::ALL {
            assert_eq!(dex.to_string().parse::<Dex>(), Ok(dex));
        }
    }
}
