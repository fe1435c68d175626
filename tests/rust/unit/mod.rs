//! Unit tests over parser, translator, and value-evaluator internals —
//! constructing AST fragments directly rather than going through
//! `GraphEngine::execute` (that's what `tests/rust/integration` and
//! `tests/rust/e2e` exercise).

use std::collections::HashMap;

use serde_json::{json, Map, Value as Json};

use cyphergraph::cypher::{self, ast::*};
use cyphergraph::executor::eval::{self, BoundValue, Env};
use cyphergraph::storage::Node;
use cyphergraph::translator::{self, context::TranslationContext};

mod parser {
    use super::*;

    #[test]
    fn parses_a_trivial_return() {
        let query = cypher::parse("RETURN 1 AS one").expect("parses");
        assert_eq!(query.first.clauses.len(), 1);
        assert!(matches!(query.first.clauses[0], Clause::Return(_)));
    }

    #[test]
    fn parses_a_match_with_where_and_return() {
        let query = cypher::parse("MATCH (u:User) WHERE u.name = 'Bob' RETURN u.name AS name").expect("parses");
        assert_eq!(query.first.clauses.len(), 2);
        match &query.first.clauses[0] {
            Clause::Match(m) => {
                assert!(!m.optional);
                assert!(m.where_condition.is_some());
                assert_eq!(m.patterns.len(), 1);
            }
            other => panic!("expected Match, got {other:?}"),
        }
    }

    #[test]
    fn parses_optional_match() {
        let query = cypher::parse("OPTIONAL MATCH (u:User) RETURN u").expect("parses");
        match &query.first.clauses[0] {
            Clause::Match(m) => assert!(m.optional),
            other => panic!("expected Match, got {other:?}"),
        }
    }

    #[test]
    fn parses_variable_length_relationship() {
        let query = cypher::parse("MATCH (a)-[:E*1..3]->(b) RETURN b").expect("parses");
        match &query.first.clauses[0] {
            Clause::Match(m) => match &m.patterns[0] {
                Pattern::Relationship(rel) => {
                    let vl = rel.edge.variable_length.expect("variable length present");
                    assert_eq!(vl.min_hops, 1);
                    assert_eq!(vl.max_hops, Some(3));
                }
                other => panic!("expected a relationship pattern, got {other:?}"),
            },
            other => panic!("expected Match, got {other:?}"),
        }
    }

    #[test]
    fn parses_merge_with_on_create_and_on_match() {
        let query = cypher::parse(
            "MERGE (n:Counter {k:'x'}) ON CREATE SET n.c = 1 ON MATCH SET n.c = n.c + 1 RETURN n.c",
        )
        .expect("parses");
        match &query.first.clauses[0] {
            Clause::Merge(merge) => {
                assert!(merge.on_create_set.is_some());
                assert!(merge.on_match_set.is_some());
            }
            other => panic!("expected Merge, got {other:?}"),
        }
    }

    #[test]
    fn parses_union_all() {
        let query = cypher::parse("RETURN 1 AS x UNION ALL RETURN 2 AS x").expect("parses");
        assert_eq!(query.rest.len(), 1);
        assert!(query.rest[0].0, "UNION ALL must carry the `all` bit");
    }

    #[test]
    fn rejects_malformed_input_with_a_located_error() {
        let err = cypher::parse("MATCH (u:User RETURN u").expect_err("must fail to parse");
        assert!(err.line >= 1);
        assert!(err.column >= 1);
        assert!(!err.message.is_empty());
    }
}

mod translate {
    use super::*;

    #[test]
    fn translates_a_single_label_match_into_a_primary_label_predicate() {
        let query = cypher::parse("MATCH (u:User) RETURN u.name AS name").expect("parses");
        let mut ctx = TranslationContext::new();
        let translation =
            translator::translate_read(&query.first.clauses, &mut ctx, &Map::new(), 100).expect("translates");
        let sql = translation.statement.sql.to_lowercase();
        assert!(sql.contains("from nodes"));
        assert!(sql.contains("json_extract"));
    }

    #[test]
    fn translates_undirected_relationship_as_a_direction_disjunction() {
        let query = cypher::parse("MATCH (a)-[:K]-(b) RETURN a").expect("parses");
        let mut ctx = TranslationContext::new();
        let translation =
            translator::translate_read(&query.first.clauses, &mut ctx, &Map::new(), 100).expect("translates");
        let sql = translation.statement.sql.to_lowercase();
        assert!(sql.contains(" or "), "undirected match must disjoin both orientations: {sql}");
    }

    #[test]
    fn variable_length_path_compiles_to_a_recursive_cte() {
        let query = cypher::parse("MATCH (a)-[:E*1..3]->(b) RETURN b").expect("parses");
        let mut ctx = TranslationContext::new();
        let translation =
            translator::translate_read(&query.first.clauses, &mut ctx, &Map::new(), 100).expect("translates");
        let sql = translation.statement.sql.to_lowercase();
        assert!(sql.contains("with recursive"));
    }

    #[test]
    fn binds_a_positional_parameter_for_a_where_equality() {
        let query = cypher::parse("MATCH (u:User) WHERE u.name = $n RETURN u.name AS name").expect("parses");
        let mut ctx = TranslationContext::new();
        let mut params = Map::new();
        params.insert("n".to_string(), json!("Bob"));
        let translation = translator::translate_read(&query.first.clauses, &mut ctx, &params, 100).expect("translates");
        assert!(translation.statement.params.contains(&json!("Bob")));
    }
}

mod evaluator {
    use super::*;

    fn env_with_node(name: &str, properties: Json) -> Env {
        let mut env: Env = HashMap::new();
        env.insert(
            name.to_string(),
            BoundValue::Node(Node { id: "n1".to_string(), label: json!(["User"]), properties }),
        );
        env
    }

    #[test]
    fn evaluates_arithmetic() {
        let env: Env = HashMap::new();
        let expr = Expression::Binary {
            op: ArithOp::Add,
            left: Box::new(Expression::Literal(Literal::Integer(2))),
            right: Box::new(Expression::Literal(Literal::Integer(3))),
        };
        let value = eval::eval(&expr, &env, &Map::new()).expect("evaluates");
        assert_eq!(value, json!(5));
    }

    #[test]
    fn evaluates_property_access_against_a_bound_node() {
        let env = env_with_node("u", json!({"name": "Ada"}));
        let expr = Expression::PropertyAccess { base: "u".to_string(), key: "name".to_string() };
        let value = eval::eval(&expr, &env, &Map::new()).expect("evaluates");
        assert_eq!(value, json!("Ada"));
    }

    #[test]
    fn eval_as_array_rejects_a_non_array_result() {
        let env: Env = HashMap::new();
        let expr = Expression::Literal(Literal::Integer(42));
        let err = eval::eval_as_array(&expr, &env, &Map::new()).expect_err("42 is not an array");
        assert!(matches!(err, cyphergraph::errors::EngineError::TypeError(_)));
    }

    #[test]
    fn eval_as_array_accepts_a_literal_array() {
        let env: Env = HashMap::new();
        let expr =
            Expression::Array(vec![Expression::Literal(Literal::Integer(1)), Expression::Literal(Literal::Integer(2))]);
        let values = eval::eval_as_array(&expr, &env, &Map::new()).expect("evaluates");
        assert_eq!(values, vec![json!(1), json!(2)]);
    }

    #[test]
    fn eval_condition_evaluates_a_comparison() {
        let env = env_with_node("u", json!({"age": 30}));
        let cond = WhereCondition::Compare {
            op: CompareOp::Gt,
            left: Expression::PropertyAccess { base: "u".to_string(), key: "age".to_string() },
            right: Expression::Literal(Literal::Integer(18)),
        };
        assert!(eval::eval_condition(&cond, &env, &Map::new()).expect("evaluates"));
    }
}
