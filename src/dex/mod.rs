//! Analyzers of the supported exchanges.
//!
//! Each module holds the exchange's deployment constants, its datum
//! templates and the analyzer built from them.

mod geniusyield;
pub mod minswap;
mod minswap_v2;
mod muesliswap;
mod spectrum;
mod splash;
pub mod sundaeswap;
mod sundaeswap_v3;
mod vyfinance;
mod wingriders;
mod wingriders_v2;

pub use geniusyield::GeniusYield;
pub use minswap::Minswap;
pub use minswap_v2::{MinswapV2, lp_asset_name};
pub use muesliswap::{MuesliPools, MuesliSwap};
pub use spectrum::SpectrumAnalyzer;
pub use splash::Splash;
pub use sundaeswap::SundaeSwap;
pub use sundaeswap_v3::SundaeSwapV3;
pub use vyfinance::VyFinance;
pub use wingriders::WingRiders;
pub use wingriders_v2::WingRidersV2;

use crate::{analyzer::ExchangeAnalyzer, types::Dex};

/// Analyzer of `dex`.
pub fn analyzer(dex: Dex) -> ExchangeAnalyzer {
    match dex {
        Dex::Minswap => ExchangeAnalyzer::Amm(Box::new(Minswap::new())),
        Dex::MinswapV2 => ExchangeAnalyzer::Amm(Box::new(MinswapV2::new())),
        Dex::SundaeSwap => ExchangeAnalyzer::Amm(Box::new(SundaeSwap::new())),
        Dex::SundaeSwapV3 => ExchangeAnalyzer::Amm(Box::new(SundaeSwapV3::new())),
        Dex::WingRiders => ExchangeAnalyzer::Amm(Box::new(WingRiders::new())),
        Dex::WingRidersV2 => ExchangeAnalyzer::Amm(Box::new(WingRidersV2::new())),
        Dex::Spectrum => ExchangeAnalyzer::Amm(Box::new(SpectrumAnalyzer::spectrum())),
        Dex::TeddySwap => ExchangeAnalyzer::Amm(Box::new(SpectrumAnalyzer::teddyswap())),
        Dex::Splash => ExchangeAnalyzer::Amm(Box::new(Splash::new())),
        Dex::VyFinance => ExchangeAnalyzer::Amm(Box::new(VyFinance::new())),
        Dex::MuesliSwap => ExchangeAnalyzer::Hybrid(Box::new(MuesliSwap::new())),
        Dex::GeniusYield => ExchangeAnalyzer::Hybrid(Box::new(GeniusYield::new())),
    }
}

/// Analyzers of every supported exchange.
pub fn all() -> Vec<ExchangeAnalyzer> {
    Dex::ALL.into_iter().map(analyzer).collect()
}
