/// Order model: relocation within one sequence and dense renumbering.
///
/// Column order is a stored integer; task order is the array index. Both
/// are recomputed from scratch after every move (`order[k] = k`), so gaps
/// or duplicates left behind by earlier writers heal on the next reorder.
use super::MoveError;
use crate::storage::OrderEntry;
use crate::types::{Column, ColumnId};

/// Result of asking for a relocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Relocation<T> {
    /// Source and destination are the same slot. Nothing to write.
    Unchanged,
    Moved(Vec<T>),
}

/// Move the element at `from` to `to` within one sequence.
///
/// Elements strictly between the two positions shift by one slot; every
/// other element keeps its index. The input is never modified.
pub fn relocate<T: Clone>(items: &[T], from: usize, to: usize) -> Result<Relocation<T>, MoveError> {
    let len = items.len();
    if from >= len {
        return Err(MoveError::InvalidIndex { index: from, len });
    }
    if to >= len {
        return Err(MoveError::InvalidIndex { index: to, len });
    }
    if from == to {
        return Ok(Relocation::Unchanged);
    }

    let mut moved = items.to_vec();
    let item = moved.remove(from);
    moved.insert(to, item);
    Ok(Relocation::Moved(moved))
}

/// Insert into a sequence at `index`, appending when the index is past the
/// end. Returns the index actually used.
pub fn insert_clamped<T>(items: &mut Vec<T>, index: usize, item: T) -> usize {
    let at = index.min(items.len());
    items.insert(at, item);
    at
}

/// Order to give a newly created column: one past the current maximum,
/// or 0 for an empty board. `None` when the maximum is already `i64::MAX`;
/// the caller has to renumber densely before appending.
pub fn next_order<I: IntoIterator<Item = i64>>(orders: I) -> Option<i64> {
    match orders.into_iter().max() {
        None => Some(0),
        Some(max) => max.max(-1).checked_add(1),
    }
}

/// True when the order values are exactly `{0, 1, ..., n-1}`.
pub fn is_dense<I: IntoIterator<Item = i64>>(orders: I) -> bool {
    let mut sorted: Vec<i64> = orders.into_iter().collect();
    sorted.sort_unstable();
    sorted.iter().enumerate().all(|(k, order)| *order == k as i64)
}

/// Full rewrite entries for a sequence already in its final display order.
pub fn dense_entries<'a, I>(ids: I) -> Vec<OrderEntry>
where
    I: IntoIterator<Item = &'a ColumnId>,
{
    ids.into_iter()
        .enumerate()
        .map(|(k, id)| OrderEntry {
            column_id: id.clone(),
            order: k as i64,
        })
        .collect()
}

/// Renumber the remaining columns after `removed` leaves the board.
/// Returns `None` when the survivors are already dense.
pub fn compact(columns: &[Column], removed: &ColumnId) -> Option<Vec<OrderEntry>> {
    let mut survivors: Vec<&Column> = columns.iter().filter(|c| &c.id != removed).collect();
    survivors.sort_by_key(|c| c.order);
    if is_dense(survivors.iter().map(|c| c.order)) {
        return None;
    }
    Some(dense_entries(survivors.iter().map(|c| &c.id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_relocate_forward() {
        let out = relocate(&["A", "B", "C"], 0, 2).unwrap();
        assert_eq!(out, Relocation::Moved(vec!["B", "C", "A"]));
    }

    #[test]
    fn test_relocate_backward_shifts_only_between() {
        let out = relocate(&["A", "B", "C", "D", "E"], 3, 1).unwrap();
        assert_eq!(out, Relocation::Moved(vec!["A", "D", "B", "C", "E"]));
    }

    #[test]
    fn test_relocate_same_slot_is_noop() {
        assert_eq!(relocate(&["A", "B"], 1, 1).unwrap(), Relocation::Unchanged);
    }

    #[test]
    fn test_relocate_out_of_bounds() {
        assert!(matches!(
            relocate(&["A", "B"], 2, 0),
            Err(MoveError::InvalidIndex { index: 2, len: 2 })
        ));
        assert!(matches!(
            relocate(&["A", "B"], 0, 5),
            Err(MoveError::InvalidIndex { index: 5, len: 2 })
        ));
    }

    #[test]
    fn test_relocate_empty_sequence() {
        let empty: [&str; 0] = [];
        assert!(matches!(
            relocate(&empty, 0, 0),
            Err(MoveError::InvalidIndex { index: 0, len: 0 })
        ));
    }

    #[test]
    fn test_insert_clamped() {
        let mut items = vec![1, 2];
        assert_eq!(insert_clamped(&mut items, 9, 3), 2);
        assert_eq!(insert_clamped(&mut items, 0, 0), 0);
        assert_eq!(items, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_next_order() {
        assert_eq!(next_order(Vec::<i64>::new()), Some(0));
        assert_eq!(next_order(vec![0, 1, 2]), Some(3));
        assert_eq!(next_order(vec![4, 0]), Some(5));
        assert_eq!(next_order(vec![-7, -3]), Some(0));
    }

    #[test]
    fn test_next_order_at_max_needs_renumbering() {
        assert_eq!(next_order(vec![0, i64::MAX]), None);
        assert_eq!(next_order(vec![i64::MAX - 1]), Some(i64::MAX));
    }

    #[test]
    fn test_is_dense() {
        assert!(is_dense(vec![2, 0, 1]));
        assert!(is_dense(Vec::<i64>::new()));
        assert!(!is_dense(vec![0, 2]));
        assert!(!is_dense(vec![0, 0, 1]));
    }

    #[test]
    fn test_compact_after_delete() {
        let columns = vec![
            Column::new("a", "A", 0),
            Column::new("b", "B", 1),
            Column::new("c", "C", 2),
        ];
        let entries = compact(&columns, &ColumnId::from("b")).unwrap();
        assert_eq!(
            entries,
            vec![
                OrderEntry { column_id: ColumnId::from("a"), order: 0 },
                OrderEntry { column_id: ColumnId::from("c"), order: 1 },
            ]
        );
        assert!(compact(&columns, &ColumnId::from("c")).is_none());
    }

    proptest! {
        #[test]
        fn prop_relocation_yields_dense_orders(
            orders in proptest::collection::vec(-5i64..20, 1..12),
            from_seed in any::<usize>(),
            to_seed in any::<usize>(),
        ) {
            let columns: Vec<Column> = orders
                .iter()
                .enumerate()
                .map(|(i, o)| Column::new(format!("c{i}"), format!("C{i}"), *o))
                .collect();
            let mut derived: Vec<&Column> = columns.iter().collect();
            derived.sort_by_key(|c| c.order);
            let from = from_seed % derived.len();
            let to = to_seed % derived.len();

            let sequence = match relocate(&derived, from, to).unwrap() {
                Relocation::Unchanged => derived.clone(),
                Relocation::Moved(seq) => seq,
            };
            let entries = dense_entries(sequence.iter().map(|c| &c.id));

            prop_assert!(is_dense(entries.iter().map(|e| e.order)));
            prop_assert_eq!(entries.len(), columns.len());
            prop_assert_eq!(&entries[to].column_id, &derived[from].id);
        }
    }
}
