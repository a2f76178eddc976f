use proptest::prelude::*;
use sqlbatch::{compute_chunk_size, BatchConfig, BatchEngine, Dialect, KeySpec, Record, SqlValue};
use tests_common::MemoryExecutor;

fn records(n: usize, widths: &[usize]) -> Vec<Record> {
    (0..n)
        .map(|i| {
            let w = widths[i % widths.len()];
            (0..w)
                .map(|c| (format!("c{}", c), SqlValue::I64(i as i64)))
                .collect()
        })
        .collect()
}

proptest! {
    // Chunk size is floor(limit / widest) and never overflows the limit.
    #[test]
    fn chunk_size_respects_limit(
        widths in prop::collection::vec(1usize..40, 1..6),
        limit in 1usize..5000,
    ) {
        let recs = records(widths.len(), &widths);
        let widest = *widths.iter().max().unwrap();
        let size = compute_chunk_size(&recs, limit).unwrap();
        if widest <= limit {
            prop_assert_eq!(size, limit / widest);
            prop_assert!(size * widest <= limit);
        } else {
            prop_assert_eq!(size, 1);
        }
    }

    // batch_count == ceil(n / s) and every statement stays under the limit.
    #[test]
    fn batch_count_is_ceiling(n in 1usize..300, width in 1usize..6, limit in 6usize..200) {
        let exec = MemoryExecutor::new(Dialect::Generic);
        let recs = records(n, &[width]);
        let engine = BatchEngine::new(BatchConfig::default().with_parameter_limit(limit));
        let result = futures::executor::block_on(engine.insert(&exec, "t", &recs)).unwrap();

        let size = limit / width;
        prop_assert_eq!(result.batch_count, (n + size - 1) / size);
        prop_assert_eq!(result.total_records, n);
        for st in exec.statements() {
            prop_assert!(st.params.len() <= limit);
        }
    }

    // Key columns are never assigned in the matched-update branch.
    #[test]
    fn upsert_never_assigns_keys(width in 2usize..8, nkeys in 1usize..4) {
        let nkeys = nkeys.min(width - 1);
        let exec = MemoryExecutor::new(Dialect::Postgres);
        let recs = records(3, &[width]);
        let keys = KeySpec::composite((0..nkeys).map(|k| format!("c{}", k))).unwrap();
        futures::executor::block_on(sqlbatch::batch_upsert(&exec, "t", &recs, &keys)).unwrap();

        let sql = &exec.statements()[0].sql;
        let set = sql
            .split(" UPDATE SET ")
            .nth(1)
            .and_then(|s| s.split(" WHEN NOT MATCHED").next())
            .unwrap();
        for k in keys.columns() {
            let lhs = format!("\"{}\" =", k);
            prop_assert!(!set.contains(&lhs));
        }
    }
}
