//! Derived max amounts and amount formatting

mod max_amounts;
pub mod units;

pub use max_amounts::{
    derive_max_amounts, quote_mints, wrappable_native, DerivedMaxAmounts, MaxAmount, MaxInputs,
    SidePair, VaultOp, GAS_RESERVE,
};
