use devdash_core::models::tags::{decode_json, encode_json};
use devdash_core::models::{Paginated, Pagination, Tags};
use proptest::prelude::*;

proptest! {
    /// Property: total_pages is exactly ceil(total / limit)
    #[test]
    fn prop_total_pages_is_ceiling(total in 0i64..1_000_000, limit in 1u32..=100) {
        let page: Paginated<()> = Paginated::new(vec![], total, Pagination::new(1, limit));
        let expected = ((total as f64) / (limit as f64)).ceil() as u32;
        prop_assert_eq!(page.total_pages(), expected);
    }

    /// Property: consecutive pages tile the result set without gaps
    #[test]
    fn prop_offsets_tile(page in 1u32..10_000, limit in 1u32..=100) {
        let current = Pagination::new(page, limit);
        let next = Pagination::new(page + 1, limit);
        prop_assert_eq!(next.offset() - current.offset(), limit as u64);
    }

    /// Property: clamped pagination never produces a zero limit or page
    #[test]
    fn prop_clamping(page in any::<u32>(), limit in any::<u32>()) {
        let p = Pagination::new(page, limit);
        prop_assert!(p.page >= 1);
        prop_assert!((1..=100).contains(&p.limit));
    }

    /// Property: JSON text encoding of tags reads back identically
    #[test]
    fn prop_tag_json_round_trip(raw in prop::collection::vec("[a-zA-Z0-9 _\"'\\\\-]{1,50}", 0..20)) {
        let raw: Vec<String> = raw.into_iter().filter(|t| !t.trim().is_empty()).collect();
        let tags = Tags::new(raw).unwrap();
        let decoded = decode_json(Some(&encode_json(tags.as_slice())));
        prop_assert_eq!(decoded, tags.into_vec());
    }
}
