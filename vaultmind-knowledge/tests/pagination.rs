use proptest::prelude::*;

use vaultmind_knowledge::graph::{hubs, orphans, unresolved_links};
use vaultmind_knowledge::{Note, Paging, VaultIndex};

fn vault(size: usize) -> VaultIndex {
    VaultIndex::build((0..size).map(|idx| {
        let mut note = Note::new(format!("n{idx:03}.md"), format!("Note {idx}"));
        if idx % 3 == 0 {
            note = note.with_link(format!("Note {}", (idx + 1) % size.max(1)), 1);
        }
        if idx % 4 == 0 {
            note = note.with_link(format!("Missing {idx}"), 2);
        }
        note
    }))
}

proptest! {
    #[test]
    fn returned_count_matches_window(size in 0usize..40, limit in 0usize..20, offset in 0usize..50) {
        let index = vault(size);
        let paging = Paging::new(limit, offset);

        let pages = [
            {
                let page = orphans(&index, None, paging);
                (page.total_count, page.returned_count, page.items.len())
            },
            {
                let page = hubs(&index, 0, paging);
                (page.total_count, page.returned_count, page.items.len())
            },
            {
                let page = unresolved_links(&index, paging);
                (page.total_count, page.returned_count, page.items.len())
            },
        ];

        for (total, returned, len) in pages {
            prop_assert_eq!(returned, limit.min(total.saturating_sub(offset)));
            prop_assert_eq!(returned, len);
        }
        prop_assert_eq!(hubs(&index, 0, Paging::new(usize::MAX, 0)).total_count, size);
    }
}
