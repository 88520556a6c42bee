use crate::classify::{QueryPlan, SeriesKey};
use crate::directory::VariableDirectory;
use crate::models::{Comparator, LogicalOp, WhereFilter};
use crate::template::{resolve_value, substitute, TemplateVariable};

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledClause {
    /// Series whose values feed the clause; `None` when the left operand did not map.
    pub key: Option<SeriesKey>,
    pub comparator: Comparator,
    /// Right operand after placeholder substitution.
    pub operand: String,
    /// Operator joining this clause onto the clauses before it.
    pub operator: LogicalOp,
    pub active: bool,
    /// The series is fetched as a one-shot aggregate and holds a single value.
    pub single_aggregate: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledFilter {
    pub clauses: Vec<CompiledClause>,
    /// Filtering runs only when every declared clause is active.
    pub active: bool,
}

/// Resolve and validate the where clause against the current plan.
pub fn compile_filter(
    filter: &WhereFilter,
    plan: &QueryPlan,
    variables: &[TemplateVariable],
    directory: &VariableDirectory,
) -> CompiledFilter {
    let requested = plan.requested_ids();
    let clauses: Vec<CompiledClause> = filter
        .clauses
        .iter()
        .enumerate()
        .map(|(index, clause)| {
            let operand = substitute(&clause.right, variables);
            let key = if clause.left.is_empty() {
                None
            } else {
                resolve_value(&clause.left, variables)
                    .and_then(|name| directory.id_for(&name).map(str::to_string))
                    .filter(|id| requested.contains(id.as_str()))
                    .and_then(|id| plan.entry_for_id(&id).map(|entry| entry.key.clone()))
            };
            if key.is_none() {
                tracing::debug!(clause = index, left = %clause.left, "where clause left operand not requested; clause inactive");
            }
            let single_aggregate = key.as_ref().is_some_and(|k| plan.is_single_aggregate(k));
            CompiledClause {
                active: key.is_some() && !operand.is_empty(),
                key,
                comparator: clause.comparator,
                operand,
                operator: filter.operators.get(index).copied().unwrap_or_default(),
                single_aggregate,
            }
        })
        .collect();

    let active = !clauses.is_empty() && clauses.iter().all(|c| c.active);
    CompiledFilter { clauses, active }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::directory::DeclaredType;
    use crate::models::{AggregateMode, QueryRequest, VariableSpec, WhereClause};
    use crate::template::VariableKind;

    fn directory() -> VariableDirectory {
        let mut dir = VariableDirectory::new();
        dir.insert("Line1.Temp", "v1", DeclaredType::Numeric);
        dir.insert("Line1.Speed", "v2", DeclaredType::Numeric);
        dir.insert("Line1.Other", "v9", DeclaredType::Numeric);
        dir
    }

    fn plan() -> QueryPlan {
        let query = QueryRequest {
            variables: vec![
                VariableSpec::new("Line1.Temp", AggregateMode::Average),
                VariableSpec::new("Line1.Speed", AggregateMode::None),
            ],
            ..QueryRequest::default()
        };
        classify(&query, &[], &directory())
    }

    fn filter(clauses: Vec<WhereClause>, operators: Vec<LogicalOp>) -> WhereFilter {
        WhereFilter { clauses, operators }
    }

    #[test]
    fn test_requested_clause_is_active() {
        let f = filter(
            vec![WhereClause::new("Line1.Temp", Comparator::Gt, "3")],
            vec![LogicalOp::Unset],
        );
        let compiled = compile_filter(&f, &plan(), &[], &directory());
        assert!(compiled.active);
        let clause = &compiled.clauses[0];
        assert_eq!(clause.key, Some(SeriesKey::new("v1", AggregateMode::Average)));
        assert!(clause.single_aggregate);
    }

    #[test]
    fn test_unfetched_variable_deactivates_whole_filter() {
        let f = filter(
            vec![
                WhereClause::new("Line1.Speed", Comparator::Gt, "3"),
                WhereClause::new("Line1.Other", Comparator::Eq, "1"),
            ],
            vec![LogicalOp::Unset, LogicalOp::And],
        );
        let compiled = compile_filter(&f, &plan(), &[], &directory());
        assert!(compiled.clauses[0].active);
        assert!(!compiled.clauses[1].active);
        assert!(!compiled.active);
    }

    #[test]
    fn test_empty_operands_are_inactive() {
        let f = filter(
            vec![
                WhereClause::new("", Comparator::Eq, "1"),
                WhereClause::new("Line1.Speed", Comparator::Eq, ""),
            ],
            vec![],
        );
        let compiled = compile_filter(&f, &plan(), &[], &directory());
        assert!(!compiled.clauses[0].active);
        assert!(!compiled.clauses[1].active);
        assert!(compiled.clauses[1].key.is_some());
        assert!(!compiled.active);
    }

    #[test]
    fn test_placeholders_in_operands() {
        let vars = vec![
            TemplateVariable::single("sig", VariableKind::Constant, "Line1.Speed"),
            TemplateVariable::single("limit", VariableKind::Textbox, "50"),
        ];
        let f = filter(
            vec![WhereClause::new("${sig}", Comparator::Lt, "${limit}0")],
            vec![LogicalOp::Unset],
        );
        let compiled = compile_filter(&f, &plan(), &vars, &directory());
        assert!(compiled.active);
        assert_eq!(compiled.clauses[0].operand, "500");
        assert_eq!(compiled.clauses[0].key, Some(SeriesKey::raw("v2")));
        assert!(!compiled.clauses[0].single_aggregate);
    }

    #[test]
    fn test_unresolved_left_placeholder() {
        let f = filter(
            vec![WhereClause::new("${missing}", Comparator::Eq, "1")],
            vec![LogicalOp::Unset],
        );
        let compiled = compile_filter(&f, &plan(), &[], &directory());
        assert!(!compiled.active);
    }

    #[test]
    fn test_no_clauses_is_inactive() {
        let compiled = compile_filter(&WhereFilter::default(), &plan(), &[], &directory());
        assert!(!compiled.active);
    }
}
