//! Randomized checks of membership expansion and positional shifting.

use rand::Rng;
use sqldao::db::{PreparedStatement, binder, statement};
use sqldao::models::{MembershipValues, ParamSpec, QueryParam, QuerySpec, SqlType, Value};

/// Build a query with `n` scalar slots and one member list at `at`.
fn case(rng: &mut impl Rng) -> (QuerySpec, Vec<QueryParam>, Vec<Value>) {
    let n = rng.gen_range(1..=6);
    let at = rng.gen_range(0..n);
    let k = rng.gen_range(0..=5);

    let mut template = String::from("SELECT * FROM t WHERE 1 = 1");
    let mut specs = Vec::new();
    let mut params = Vec::new();
    let mut expected = Vec::new();
    let mut next = 0i64;

    for i in 0..n {
        specs.push(ParamSpec::new(i + 1, SqlType::BigInt));
        if i == at {
            template.push_str(" AND m IN (?..?)");
            let members: Vec<i64> = (0..k).map(|_| { next += 1; next }).collect();
            if members.is_empty() {
                expected.push(Value::Null);
            } else {
                expected.extend(members.iter().map(|m| Value::Int(*m)));
            }
            params.push(QueryParam::Members(MembershipValues::new(members)));
        } else {
            template.push_str(&format!(" AND c{} = ?", i));
            next += 1;
            expected.push(Value::Int(next));
            params.push(QueryParam::Value(Value::Int(next)));
        }
    }

    let query = QuerySpec::new(template)
        .with_membership_clause()
        .with_param_specs(specs);
    (query, params, expected)
}

#[test]
fn test_random_membership_positions() {
    let mut rng = rand::thread_rng();
    for _ in 0..200 {
        let (query, params, expected) = case(&mut rng);
        binder::validate(&params, &query.param_specs, true).unwrap();

        let sql = statement::build(&query, &params).unwrap();
        assert!(!sql.contains("?..?"));
        assert_eq!(sql.matches('?').count(), expected.len(), "sql: {sql}");

        let mut stmt = PreparedStatement::new(sql);
        binder::bind(&mut stmt, &params, &query.param_specs).unwrap();
        let (_, values) = stmt.into_parts().unwrap();
        assert_eq!(values, expected);
    }
}

#[test]
fn test_documented_shift_example() {
    let query = QuerySpec::new("SELECT * FROM t WHERE a = ? AND b IN (?..?) AND c = ?")
        .with_membership_clause()
        .param(SqlType::Integer)
        .param(SqlType::Integer)
        .param(SqlType::Varchar);
    let params = sqldao::params![37, MembershipValues::new([5, 6, 7]), "x"];

    let mut stmt = PreparedStatement::new(statement::build(&query, &params).unwrap());
    binder::bind(&mut stmt, &params, &query.param_specs).unwrap();

    assert_eq!(stmt.sql(), "SELECT * FROM t WHERE a = ? AND b IN (?, ?, ?) AND c = ?");
    assert_eq!(stmt.get(1), Some(&Value::Int(37)));
    for (pos, v) in [(2, 5), (3, 6), (4, 7)] {
        assert_eq!(stmt.get(pos), Some(&Value::Int(v)));
    }
    assert_eq!(stmt.get(5), Some(&Value::Text("x".into())));
}
