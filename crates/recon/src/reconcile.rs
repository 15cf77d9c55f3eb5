use std::collections::HashMap;

use crate::model::{ComparisonReport, Conflict, ConflictReason, Record, Unmatched};

/// Default amount tolerance, in monetary units.
pub const AMOUNT_TOLERANCE: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconOptions {
    /// Largest absolute amount difference still counted as equal.
    pub tolerance: f64,
    /// Report `name_mismatch` when everything but the customer agrees.
    pub compare_customer: bool,
    /// Treat memo differences as `data_mismatch`.
    pub compare_memo: bool,
}

impl Default for ReconOptions {
    fn default() -> Self {
        Self {
            tolerance: AMOUNT_TOLERANCE,
            compare_customer: false,
            compare_memo: false,
        }
    }
}

/// Key → record lookup that remembers first-insertion order.
/// A repeated key keeps its original slot and takes the later record.
struct KeyIndex<'a> {
    order: Vec<String>,
    by_key: HashMap<String, &'a Record>,
}

impl<'a> KeyIndex<'a> {
    fn build(records: &'a [Record], key: &dyn Fn(&Record) -> String) -> Self {
        let mut order = Vec::with_capacity(records.len());
        let mut by_key: HashMap<String, &'a Record> = HashMap::with_capacity(records.len());

        for record in records {
            let k = key(record);
            if by_key.insert(k.clone(), record).is_some() {
                log::debug!("duplicate key '{}' on {} side, later record wins", k, record.origin);
            } else {
                order.push(k);
            }
        }

        Self { order, by_key }
    }

    fn iter(&self) -> impl Iterator<Item = (&String, &'a Record)> + '_ {
        self.order.iter().map(move |k| (k, self.by_key[k]))
    }

    fn get(&self, key: &str) -> Option<&'a Record> {
        self.by_key.get(key).copied()
    }

    fn contains(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }
}

/// Classify two record collections with the default options.
pub fn reconcile<K>(left: &[Record], right: &[Record], key: K) -> ComparisonReport
where
    K: Fn(&Record) -> String,
{
    reconcile_with(left, right, key, &ReconOptions::default())
}

/// Classify `left` against `right` into left-only, right-only, conflicting
/// and matched keys. Pure: inputs are only borrowed, nothing is logged above
/// debug level, and output order follows the inputs' iteration order.
pub fn reconcile_with<K>(
    left: &[Record],
    right: &[Record],
    key: K,
    options: &ReconOptions,
) -> ComparisonReport
where
    K: Fn(&Record) -> String,
{
    let left_index = KeyIndex::build(left, &key);
    let right_index = KeyIndex::build(right, &key);

    let mut report = ComparisonReport::default();

    for (k, left_record) in left_index.iter() {
        match right_index.get(k) {
            None => report.left_only.push(Unmatched {
                key: k.clone(),
                record: left_record.clone(),
            }),
            Some(right_record) => match compare(left_record, right_record, options) {
                None => report.match_count += 1,
                Some(reason) => report.conflicts.push(Conflict::mismatch(
                    k.clone(),
                    left_record,
                    right_record,
                    reason,
                )),
            },
        }
    }

    for (k, right_record) in right_index.iter() {
        if !left_index.contains(k) {
            report.right_only.push(Unmatched {
                key: k.clone(),
                record: right_record.clone(),
            });
        }
    }

    report
}

/// `None` when the pair matches, otherwise the conflict reason.
fn compare(left: &Record, right: &Record, options: &ReconOptions) -> Option<ConflictReason> {
    let amount_ok = amounts_equal(left.amount, right.amount, options.tolerance);
    let category_ok = left.category == right.category;
    let memo_ok = !options.compare_memo || left.memo == right.memo;

    if !(amount_ok && category_ok && memo_ok) {
        return Some(ConflictReason::DataMismatch);
    }
    if options.compare_customer && left.customer != right.customer {
        return Some(ConflictReason::NameMismatch);
    }
    None
}

/// NaN or infinite amounts never compare equal.
pub fn amounts_equal(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= tolerance
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Category, MatchKey, Origin};

    fn rec(origin: Origin, key: &str, amount: f64, category: &str) -> Record {
        Record::new(key, Category::new(category).unwrap(), amount, origin)
    }

    fn left(key: &str, amount: f64, category: &str) -> Record {
        rec(Origin::Left, key, amount, category)
    }

    fn right(key: &str, amount: f64, category: &str) -> Record {
        rec(Origin::Right, key, amount, category)
    }

    fn by_ref(r: &Record) -> String {
        MatchKey::Reference.key_of(r)
    }

    #[test]
    fn left_only_when_right_empty() {
        let report = reconcile(&[left("NET30", 100.0, "Rent")], &[], by_ref);
        assert_eq!(report.left_only.len(), 1);
        assert_eq!(report.left_only[0].key, "NET30");
        assert_eq!(report.left_only[0].record.amount, 100.0);
        assert!(report.right_only.is_empty());
        assert!(report.conflicts.is_empty());
        assert_eq!(report.match_count, 0);
    }

    #[test]
    fn within_tolerance_matches() {
        let report = reconcile(
            &[left("A", 50.0, "Sales")],
            &[right("A", 50.0005, "Sales")],
            by_ref,
        );
        assert_eq!(report.match_count, 1);
        assert!(report.conflicts.is_empty());
    }

    #[test]
    fn outside_tolerance_conflicts() {
        let report = reconcile(
            &[left("A", 50.0, "Sales")],
            &[right("A", 50.002, "Sales")],
            by_ref,
        );
        assert_eq!(report.match_count, 0);
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].reason, ConflictReason::DataMismatch);
    }

    #[test]
    fn amount_mismatch_captures_both_sides() {
        let report = reconcile(
            &[left("A", 50.0, "Sales")],
            &[right("A", 75.0, "Sales")],
            by_ref,
        );
        let c = &report.conflicts[0];
        assert_eq!(c.key, "A");
        assert_eq!(c.left.as_ref().unwrap().amount, 50.0);
        assert_eq!(c.right.as_ref().unwrap().amount, 75.0);
        assert_eq!(c.left.as_ref().unwrap().category.as_str(), "Sales");
    }

    #[test]
    fn category_compare_is_exact() {
        let report = reconcile(
            &[left("A", 1.0, "Sales")],
            &[right("A", 1.0, "sales")],
            by_ref,
        );
        assert_eq!(report.conflicts[0].reason, ConflictReason::DataMismatch);
    }

    #[test]
    fn keys_are_case_sensitive() {
        let report = reconcile(&[left("a", 1.0, "X")], &[right("A", 1.0, "X")], by_ref);
        assert_eq!(report.left_only.len(), 1);
        assert_eq!(report.right_only.len(), 1);
        assert_eq!(report.match_count, 0);
    }

    #[test]
    fn duplicate_key_later_record_wins() {
        let l = vec![left("A", 1.0, "X"), left("B", 2.0, "X"), left("A", 9.0, "X")];
        let r = vec![right("A", 9.0, "X")];
        let report = reconcile(&l, &r, by_ref);
        assert_eq!(report.match_count, 1);
        assert!(report.conflicts.is_empty());
        assert_eq!(report.left_only.len(), 1);
        assert_eq!(report.left_only[0].key, "B");
    }

    #[test]
    fn output_follows_input_order() {
        let l = vec![left("c", 1.0, "X"), left("a", 1.0, "X"), left("b", 1.0, "X")];
        let r = vec![right("z", 1.0, "X"), right("y", 1.0, "X")];
        let report = reconcile(&l, &r, by_ref);
        let lo: Vec<_> = report.left_only.iter().map(|u| u.key.as_str()).collect();
        let ro: Vec<_> = report.right_only.iter().map(|u| u.key.as_str()).collect();
        assert_eq!(lo, ["c", "a", "b"]);
        assert_eq!(ro, ["z", "y"]);
    }

    #[test]
    fn memo_ignored_by_default() {
        let l = vec![left("A", 1.0, "X").with_memo("one")];
        let r = vec![right("A", 1.0, "X").with_memo("two")];
        assert_eq!(reconcile(&l, &r, by_ref).match_count, 1);

        let opts = ReconOptions { compare_memo: true, ..ReconOptions::default() };
        let report = reconcile_with(&l, &r, by_ref, &opts);
        assert_eq!(report.conflicts[0].reason, ConflictReason::DataMismatch);
    }

    #[test]
    fn customer_difference_is_name_mismatch() {
        let l = vec![left("A", 1.0, "X").with_customer("Acme")];
        let r = vec![right("A", 1.0, "X").with_customer("ACME Corp")];
        assert_eq!(reconcile(&l, &r, by_ref).match_count, 1);

        let opts = ReconOptions { compare_customer: true, ..ReconOptions::default() };
        let report = reconcile_with(&l, &r, by_ref, &opts);
        assert_eq!(report.conflicts[0].reason, ConflictReason::NameMismatch);
    }

    #[test]
    fn data_mismatch_takes_precedence_over_name() {
        let l = vec![left("A", 1.0, "X").with_customer("Acme")];
        let r = vec![right("A", 2.0, "X").with_customer("Other")];
        let opts = ReconOptions { compare_customer: true, ..ReconOptions::default() };
        let report = reconcile_with(&l, &r, by_ref, &opts);
        assert_eq!(report.conflicts[0].reason, ConflictReason::DataMismatch);
    }

    #[test]
    fn nan_amount_never_matches() {
        let report = reconcile(&[left("A", f64::NAN, "X")], &[right("A", f64::NAN, "X")], by_ref);
        assert_eq!(report.conflicts.len(), 1);
    }

    #[test]
    fn custom_key_function() {
        let l = vec![left("1", 5.0, "Rent"), left("2", 6.0, "Sales")];
        let r = vec![right("99", 5.0, "Rent")];
        let report = reconcile(&l, &r, |rec: &Record| rec.category.as_str().to_string());
        assert_eq!(report.match_count, 1);
        assert_eq!(report.left_only[0].key, "Sales");
    }

    #[test]
    fn inputs_are_untouched() {
        let l = vec![left("A", 1.0, "X")];
        let r = vec![right("A", 2.0, "X")];
        let before = (l.clone(), r.clone());
        let _ = reconcile(&l, &r, by_ref);
        assert_eq!((l, r), before);
    }
}
