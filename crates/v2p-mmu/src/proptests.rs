use crate::bits::mask;
use crate::{translate, PageSize, PagingMode, ReadFn, TranslationConfig, Translator};
use proptest::prelude::*;

/// Hands out `entries` in walk order regardless of the address asked for.
fn scripted(entries: Vec<u64>) -> ReadFn<impl FnMut(u64, &mut [u8]) -> usize> {
    let mut next = 0usize;
    ReadFn(move |_paddr: u64, dst: &mut [u8]| {
        let value = entries.get(next).copied().unwrap_or(0);
        next += 1;
        dst.copy_from_slice(&value.to_le_bytes()[..dst.len()]);
        dst.len()
    })
}

fn mask_bounds_strategy() -> impl Strategy<Value = (u8, u8)> {
    (0u8..64).prop_flat_map(|high| (Just(high), 0u8..=high))
}

fn config_strategy() -> impl Strategy<Value = TranslationConfig> {
    (
        prop_oneof![Just(PagingMode::Legacy), Just(PagingMode::Pae)],
        any::<u32>(),
        any::<[bool; 5]>(),
        32u8..=52,
    )
        .prop_map(|(mode, root, [pse, pse36, pat, nxe, pdpt_uses_root], bits)| {
            TranslationConfig::new(mode, root)
                .with_pse(pse)
                .with_pse36(pse36)
                .with_pat(pat)
                .with_nxe(nxe)
                .with_pdpt_uses_root(pdpt_uses_root)
                .with_max_phys_bits(bits)
        })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_mask_covers_exactly_the_range((high, low) in mask_bounds_strategy()) {
        let m = mask(high, low);
        prop_assert_eq!(m.count_ones(), u32::from(high - low) + 1);
        prop_assert_eq!(m.trailing_zeros(), u32::from(low));
        prop_assert_eq!(m.leading_zeros(), 63 - u32::from(high));
    }

    #[test]
    fn prop_translation_is_repeatable(
        cfg in config_strategy(),
        vaddr in any::<u32>(),
        entries in prop::collection::vec(any::<u64>(), 3),
    ) {
        let first = translate(vaddr, &cfg, &mut scripted(entries.clone()));
        let second = translate(vaddr, &cfg, &mut scripted(entries));
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_page_offset_survives_translation(
        cfg in config_strategy(),
        vaddr in any::<u32>(),
        entries in prop::collection::vec(any::<u64>(), 3),
    ) {
        let translator = Translator::new(cfg);
        if let Ok(t) = translator.translate_detailed(&mut scripted(entries), vaddr) {
            let offset_mask = t.page_size.bytes() - 1;
            prop_assert_eq!(t.paddr & offset_mask, u64::from(vaddr) & offset_mask);
            prop_assert!(t.paddr < 1u64 << cfg.max_phys_bits().max(40));
        }
    }

    #[test]
    fn prop_failures_report_zero_address(
        cfg in config_strategy(),
        vaddr in any::<u32>(),
        entries in prop::collection::vec(any::<u64>(), 3),
    ) {
        let outcome = translate(vaddr, &cfg, &mut scripted(entries));
        if !outcome.is_success() {
            prop_assert_eq!(outcome.physical_address, 0);
            prop_assert!(outcome.status() < 0);
        }
    }

    #[test]
    fn prop_pae_bits_above_maxphyaddr_fault(bits in 36u8..52, extra in 0u8..16) {
        let high_bit = bits + extra % (52 - bits);
        let cfg = TranslationConfig::new(PagingMode::Pae, 0)
            .with_pat(true)
            .with_max_phys_bits(bits);
        let pte = 1 | 0x5000 | (1u64 << high_bit);
        let outcome = translate(0, &cfg, &mut scripted(vec![1, 1, pte]));
        prop_assert!(outcome.fault_detail.is_reserved_bit_violation());
    }

    #[test]
    fn prop_legacy_large_page_maps_directly(frame in 0u64..1024, offset in 0u32..(1 << 22)) {
        // PDE selects a 4MB frame; bits 21:0 pass through untouched.
        let vaddr = (3 << 22) | offset;
        let pde = (frame << 22) | 0x81;
        let cfg = TranslationConfig::new(PagingMode::Legacy, 0).with_pse(true).with_pat(true);
        let t = Translator::new(cfg)
            .translate_detailed(&mut scripted(vec![pde]), vaddr)
            .unwrap();
        prop_assert_eq!(t.page_size, PageSize::Size4M);
        prop_assert_eq!(t.paddr, (frame << 22) | u64::from(offset));
    }
}
