//! Plan selection (§4.3, §9): a linear cascade of pure matchers over the
//! clause sequence, tried in priority order. The first match wins; nothing
//! here touches storage or the translator, so each matcher is testable in
//! isolation against a bare `&[Clause]`.

use crate::cypher::ast::*;

#[derive(Debug)]
pub enum PlannedExecution<'a> {
    /// Strategy 1: one or more `UNWIND`s feeding `CREATE`, no `MATCH`.
    UnwindCreate {
        unwinds: Vec<&'a UnwindClause>,
        creates: Vec<&'a CreateClause>,
        return_: Option<&'a ReturnClause>,
    },
    /// Strategy 2: `MATCH` → `WITH collect(expr) AS alias` → `UNWIND alias AS x` → `RETURN`.
    CollectUnwindReturn {
        match_: &'a MatchClause,
        collect_expr: &'a Expression,
        collect_alias: String,
        unwind_alias: &'a str,
        return_: &'a ReturnClause,
    },
    /// Strategy 3: one or more `CREATE`s, no `MATCH`.
    CreateReturn {
        creates: Vec<&'a CreateClause>,
        return_: Option<&'a ReturnClause>,
    },
    /// Strategy 4: a lone `MERGE`, optionally returned.
    Merge {
        merge: &'a MergeClause,
        return_: Option<&'a ReturnClause>,
    },
    /// Strategy 5: `MATCH` combined with a mutating clause.
    MultiPhase {
        matches: Vec<&'a MatchClause>,
        creates: Vec<&'a CreateClause>,
        sets: Vec<&'a SetClause>,
        deletes: Vec<&'a DeleteClause>,
        return_: Option<&'a ReturnClause>,
    },
    /// Strategy 6: translated and executed in one pass.
    Fallback,
}

pub fn select(clauses: &[Clause]) -> PlannedExecution<'_> {
    match_unwind_create(clauses)
        .or_else(|| match_collect_unwind_return(clauses))
        .or_else(|| match_create_return(clauses))
        .or_else(|| match_merge(clauses))
        .or_else(|| match_multi_phase(clauses))
        .unwrap_or(PlannedExecution::Fallback)
}

fn trailing_return(clauses: &[Clause]) -> Option<&ReturnClause> {
    match clauses.last() {
        Some(Clause::Return(r)) => Some(r),
        _ => None,
    }
}

fn match_unwind_create(clauses: &[Clause]) -> Option<PlannedExecution<'_>> {
    let has_match = clauses.iter().any(|c| matches!(c, Clause::Match(_)));
    let has_merge_set_delete = clauses
        .iter()
        .any(|c| matches!(c, Clause::Merge(_) | Clause::Set(_) | Clause::Delete(_) | Clause::With(_) | Clause::Call(_)));
    if has_match || has_merge_set_delete {
        return None;
    }
    let unwinds: Vec<&UnwindClause> = clauses
        .iter()
        .filter_map(|c| match c {
            Clause::Unwind(u) => Some(u),
            _ => None,
        })
        .collect();
    let creates: Vec<&CreateClause> = clauses
        .iter()
        .filter_map(|c| match c {
            Clause::Create(c) => Some(c),
            _ => None,
        })
        .collect();
    if unwinds.is_empty() || creates.is_empty() {
        return None;
    }
    Some(PlannedExecution::UnwindCreate {
        unwinds,
        creates,
        return_: trailing_return(clauses),
    })
}

fn match_collect_unwind_return(clauses: &[Clause]) -> Option<PlannedExecution<'_>> {
    if clauses.len() != 4 {
        return None;
    }
    let (match_, with, unwind, return_) = match clauses {
        [Clause::Match(m), Clause::With(w), Clause::Unwind(u), Clause::Return(r)] => (m, w, u, r),
        _ => return None,
    };
    if with.items.len() != 1 {
        return None;
    }
    let item = &with.items[0];
    let collect_expr = match &item.expression {
        Expression::FunctionCall { name, args, .. } if name.eq_ignore_ascii_case("collect") && args.len() == 1 => {
            &args[0]
        }
        _ => return None,
    };
    let collect_alias = item
        .alias
        .clone()
        .unwrap_or_else(|| "collect".to_string());
    if unwind.expression != Expression::Variable(collect_alias.clone()) {
        return None;
    }
    Some(PlannedExecution::CollectUnwindReturn {
        match_,
        collect_expr,
        collect_alias,
        unwind_alias: &unwind.alias,
        return_,
    })
}

fn match_create_return(clauses: &[Clause]) -> Option<PlannedExecution<'_>> {
    let has_other = clauses.iter().enumerate().any(|(i, c)| {
        let is_trailing_return = i == clauses.len() - 1 && matches!(c, Clause::Return(_));
        !matches!(c, Clause::Create(_)) && !is_trailing_return
    });
    if has_other {
        return None;
    }
    let creates: Vec<&CreateClause> = clauses
        .iter()
        .filter_map(|c| match c {
            Clause::Create(c) => Some(c),
            _ => None,
        })
        .collect();
    if creates.is_empty() {
        return None;
    }
    Some(PlannedExecution::CreateReturn {
        creates,
        return_: trailing_return(clauses),
    })
}

fn match_merge(clauses: &[Clause]) -> Option<PlannedExecution<'_>> {
    match clauses {
        [Clause::Merge(m)] => Some(PlannedExecution::Merge { merge: m, return_: None }),
        [Clause::Merge(m), Clause::Return(r)] => Some(PlannedExecution::Merge {
            merge: m,
            return_: Some(r),
        }),
        _ => None,
    }
}

fn match_multi_phase(clauses: &[Clause]) -> Option<PlannedExecution<'_>> {
    let has_match = clauses.iter().any(|c| matches!(c, Clause::Match(_)));
    let has_mutation = clauses
        .iter()
        .any(|c| matches!(c, Clause::Create(_) | Clause::Set(_) | Clause::Delete(_)));
    if !has_match || !has_mutation {
        return None;
    }
    let matches: Vec<&MatchClause> = clauses
        .iter()
        .filter_map(|c| match c {
            Clause::Match(m) => Some(m),
            _ => None,
        })
        .collect();
    let creates: Vec<&CreateClause> = clauses
        .iter()
        .filter_map(|c| match c {
            Clause::Create(c) => Some(c),
            _ => None,
        })
        .collect();
    let sets: Vec<&SetClause> = clauses
        .iter()
        .filter_map(|c| match c {
            Clause::Set(s) => Some(s),
            _ => None,
        })
        .collect();
    let deletes: Vec<&DeleteClause> = clauses
        .iter()
        .filter_map(|c| match c {
            Clause::Delete(d) => Some(d),
            _ => None,
        })
        .collect();
    Some(PlannedExecution::MultiPhase {
        matches,
        creates,
        sets,
        deletes,
        return_: trailing_return(clauses),
    })
}
