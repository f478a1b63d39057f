//! The narrow boolean algebra a [`crate::subset_dedup::SubsetDeduper`]
//! reasons about (spec §4.9).
//!
//! This is deliberately a closed, smaller algebra than `rq_ir::Expr` — the
//! deduper has to answer "does `a` imply `b`" and "what rows does `a` cover
//! that `b` doesn't", and that's only decidable for a fixed, known operator
//! set. A collection's `where` filter can still be an arbitrary `Expr` at
//! the query layer; `Predicate` is the shape a sync adapter advertises to
//! the deduper, not the shape a query is compiled from.

use rq_core::{pattern_match, Value};

#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    Eq(String, Value),
    Ne(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    In(String, Vec<Value>),
    IsNull(String),
    IsUndefined(String),
    Like(String, String),
    ILike(String, String),
    /// Matches every row. The identity for `unlimitedWhere` / an absent filter.
    True,
}

impl Predicate {
    pub fn field(&self) -> Option<&str> {
        match self {
            Predicate::Eq(f, _)
            | Predicate::Ne(f, _)
            | Predicate::Gt(f, _)
            | Predicate::Gte(f, _)
            | Predicate::Lt(f, _)
            | Predicate::Lte(f, _)
            | Predicate::In(f, _)
            | Predicate::IsNull(f)
            | Predicate::IsUndefined(f)
            | Predicate::Like(f, _)
            | Predicate::ILike(f, _) => Some(f),
            Predicate::And(_) | Predicate::Or(_) | Predicate::Not(_) | Predicate::True => None,
        }
    }

    pub fn matches(&self, get: &impl Fn(&str) -> Option<Value>) -> bool {
        match self {
            Predicate::True => true,
            Predicate::And(ps) => ps.iter().all(|p| p.matches(get)),
            Predicate::Or(ps) => ps.iter().any(|p| p.matches(get)),
            Predicate::Not(p) => !p.matches(get),
            Predicate::Eq(f, v) => get(f).as_ref() == Some(v),
            Predicate::Ne(f, v) => get(f).as_ref() != Some(v),
            Predicate::Gt(f, v) => get(f).as_ref().is_some_and(|x| x > v),
            Predicate::Gte(f, v) => get(f).as_ref().is_some_and(|x| x >= v),
            Predicate::Lt(f, v) => get(f).as_ref().is_some_and(|x| x < v),
            Predicate::Lte(f, v) => get(f).as_ref().is_some_and(|x| x <= v),
            Predicate::In(f, vs) => get(f).is_some_and(|x| vs.contains(&x)),
            Predicate::IsNull(f) => get(f).map(|v| v.is_null()).unwrap_or(true),
            Predicate::IsUndefined(f) => get(f).is_none(),
            Predicate::Like(f, p) => get(f)
                .and_then(|v| v.as_str().map(|s| pattern_match::like(s, p)))
                .unwrap_or(false),
            Predicate::ILike(f, p) => get(f)
                .and_then(|v| v.as_str().map(|s| pattern_match::ilike(s, p)))
                .unwrap_or(false),
        }
    }
}

/// Does every row matching `a` also match `b`? Conservative: returns
/// `false` whenever the relationship can't be proven, never a false
/// positive — a wrong "yes" would let the deduper skip a load the adapter
/// actually needs to perform.
pub fn is_subset(a: &Predicate, b: &Predicate) -> bool {
    if a == b || matches!(b, Predicate::True) {
        return true;
    }
    match a {
        Predicate::And(ps) => ps.iter().any(|p| is_subset(p, b)),
        Predicate::Or(ps) => ps.iter().all(|p| is_subset(p, b)),
        _ => match b {
            Predicate::And(ps) => ps.iter().all(|p| is_subset(a, p)),
            Predicate::Or(ps) => ps.iter().any(|p| is_subset(a, p)),
            _ => range_subset(a, b).unwrap_or(false),
        },
    }
}

/// Same-field range reasoning: `a` and `b` are both one of
/// `eq/ne/gt/gte/lt/lte/in/isNull/isUndefined`, so their coverage can be
/// compared as intervals over `Value`'s total order.
fn range_subset(a: &Predicate, b: &Predicate) -> Option<bool> {
    if a.field()? != b.field()? {
        return None;
    }
    use Predicate::*;
    Some(match (a, b) {
        (Eq(_, av), Eq(_, bv)) => av == bv,
        (Eq(_, av), Ne(_, bv)) => av != bv,
        (Eq(_, av), Gt(_, bv)) => av > bv,
        (Eq(_, av), Gte(_, bv)) => av >= bv,
        (Eq(_, av), Lt(_, bv)) => av < bv,
        (Eq(_, av), Lte(_, bv)) => av <= bv,
        (Eq(_, av), In(_, bvs)) => bvs.contains(av),
        (Gt(_, av), Gt(_, bv)) | (Gt(_, av), Gte(_, bv)) => av >= bv,
        (Gte(_, av), Gte(_, bv)) => av >= bv,
        (Gte(_, av), Gt(_, bv)) => av > bv,
        (Lt(_, av), Lt(_, bv)) | (Lt(_, av), Lte(_, bv)) => av <= bv,
        (Lte(_, av), Lte(_, bv)) => av <= bv,
        (Lte(_, av), Lt(_, bv)) => av < bv,
        (In(_, avs), In(_, bvs)) => avs.iter().all(|v| bvs.contains(v)),
        (IsNull(_), IsNull(_)) | (IsUndefined(_), IsUndefined(_)) => true,
        (IsUndefined(_), IsNull(_)) => true,
        _ => return None,
    })
}

/// `a AND NOT b`, simplified when `a`/`b` are comparisons on the same
/// field so the deduper can request a narrow range instead of falling
/// back to the full `a` predicate. Always correct: the fallback
/// `And([a, Not(b)])` never changes what rows match, it just may fail to
/// shrink the request the way a tighter range would.
pub fn minus(a: &Predicate, b: &Predicate) -> Predicate {
    use Predicate::*;
    if let (Some(fa), Some(fb)) = (a.field(), b.field()) {
        if fa == fb {
            if let Some(simplified) = simplify_minus(a, b) {
                return simplified;
            }
        }
    }
    And(vec![a.clone(), Not(Box::new(b.clone()))])
}

fn simplify_minus(a: &Predicate, b: &Predicate) -> Option<Predicate> {
    use Predicate::*;
    match (a, b) {
        (Gte(f, av), Gt(_, bv)) if av <= bv => Some(And(vec![
            Gte(f.clone(), av.clone()),
            Lte(f.clone(), bv.clone()),
        ])),
        (Gt(f, av), Gte(_, bv)) if av < bv => Some(And(vec![
            Gt(f.clone(), av.clone()),
            Lt(f.clone(), bv.clone()),
        ])),
        (Gte(f, av), Gte(_, bv)) if av < bv => Some(And(vec![
            Gte(f.clone(), av.clone()),
            Lt(f.clone(), bv.clone()),
        ])),
        (Gt(f, av), Gt(_, bv)) if av < bv => Some(And(vec![
            Gt(f.clone(), av.clone()),
            Lte(f.clone(), bv.clone()),
        ])),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn and_branch_is_a_subset_of_the_whole() {
        let a = Predicate::And(vec![
            Predicate::Gt("age".into(), Value::Int(18)),
            Predicate::Eq("active".into(), Value::Bool(true)),
        ]);
        assert!(is_subset(&a, &Predicate::Gt("age".into(), Value::Int(18))));
    }

    #[test]
    fn tighter_range_is_a_subset_of_a_looser_one() {
        assert!(is_subset(
            &Predicate::Gt("age".into(), Value::Int(30)),
            &Predicate::Gte("age".into(), Value::Int(18)),
        ));
        assert!(!is_subset(
            &Predicate::Gte("age".into(), Value::Int(10)),
            &Predicate::Gt("age".into(), Value::Int(18)),
        ));
    }

    #[test]
    fn minus_simplifies_overlapping_ranges_on_the_same_field() {
        let a = Predicate::Gte("age".into(), Value::Int(18));
        let b = Predicate::Gt("age".into(), Value::Int(30));
        let m = minus(&a, &b);
        assert_eq!(
            m,
            Predicate::And(vec![
                Predicate::Gte("age".into(), Value::Int(18)),
                Predicate::Lte("age".into(), Value::Int(30)),
            ])
        );
    }

    #[test]
    fn minus_falls_back_to_and_not_across_different_fields() {
        let a = Predicate::Eq("active".into(), Value::Bool(true));
        let b = Predicate::Gt("age".into(), Value::Int(30));
        let m = minus(&a, &b);
        assert_eq!(m, Predicate::And(vec![a, Predicate::Not(Box::new(b))]));
    }
}
