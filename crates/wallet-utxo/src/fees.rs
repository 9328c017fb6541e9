//! Transaction size and fee estimation.
//!
//! All arithmetic is integer-only: a systematic rounding drift here would
//! either strand funds (overestimation) or produce transactions the network
//! rejects (underestimation). The per-scheme byte costs form a closed table
//! alongside the derivation table in `derivation.rs`; the coin selector,
//! the transaction builder, and the max-spendable estimator all go through
//! these two functions so their fee views cannot diverge.

use crate::derivation::AddressScheme;

impl AddressScheme {
    /// Estimated virtual size of one input spending an output of this
    /// scheme. Segwit schemes carry their witness at a quarter weight.
    pub fn input_vbytes(self) -> u64 {
        match self {
            AddressScheme::Legacy => 148,
            AddressScheme::Segwit => 91,
            AddressScheme::NativeSegwit => 68,
            AddressScheme::Taproot => 58,
        }
    }

    /// Estimated virtual size of one output locked to this scheme.
    pub fn output_vbytes(self) -> u64 {
        match self {
            AddressScheme::Legacy => 34,
            AddressScheme::Segwit => 32,
            AddressScheme::NativeSegwit => 31,
            AddressScheme::Taproot => 43,
        }
    }

    /// Fixed transaction overhead: version, locktime, in/out counts, and
    /// the segwit marker/flag bytes where applicable.
    pub fn overhead_vbytes(self) -> u64 {
        match self {
            AddressScheme::Legacy => 10,
            AddressScheme::Segwit | AddressScheme::NativeSegwit | AddressScheme::Taproot => 11,
        }
    }
}

/// Estimate the virtual size in bytes of a transaction with the given
/// input and output counts, all using `scheme`.
pub fn estimate_tx_size(inputs: usize, outputs: usize, scheme: AddressScheme) -> u64 {
    scheme.overhead_vbytes()
        + inputs as u64 * scheme.input_vbytes()
        + outputs as u64 * scheme.output_vbytes()
}

/// Convert an estimated size to a fee at `fee_per_byte` satoshis.
pub fn estimate_fee(size: u64, fee_per_byte: u64) -> u64 {
    size.saturating_mul(fee_per_byte)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_segwit_one_input_two_outputs() {
        // 11 + 68 + 62 = 141 vbytes.
        assert_eq!(estimate_tx_size(1, 2, AddressScheme::NativeSegwit), 141);
    }

    #[test]
    fn legacy_two_inputs_one_output() {
        // 10 + 296 + 34 = 340 vbytes, the max-spendable shape.
        assert_eq!(estimate_tx_size(2, 1, AddressScheme::Legacy), 340);
    }

    #[test]
    fn size_scales_linearly_with_inputs() {
        let scheme = AddressScheme::Taproot;
        let one = estimate_tx_size(1, 2, scheme);
        let two = estimate_tx_size(2, 2, scheme);
        assert_eq!(two - one, scheme.input_vbytes());
    }

    #[test]
    fn fee_is_size_times_rate() {
        assert_eq!(estimate_fee(141, 5), 705);
        assert_eq!(estimate_fee(340, 100), 34_000);
    }

    #[test]
    fn zero_rate_means_zero_fee() {
        assert_eq!(estimate_fee(estimate_tx_size(5, 5, AddressScheme::Legacy), 0), 0);
    }

    #[test]
    fn fee_saturates_instead_of_overflowing() {
        assert_eq!(estimate_fee(u64::MAX, 2), u64::MAX);
    }

    #[test]
    fn every_scheme_has_size_entries() {
        for scheme in [
            AddressScheme::Legacy,
            AddressScheme::Segwit,
            AddressScheme::NativeSegwit,
            AddressScheme::Taproot,
        ] {
            assert!(scheme.input_vbytes() > 0);
            assert!(scheme.output_vbytes() > 0);
            assert!(scheme.overhead_vbytes() > 0);
        }
    }
}
