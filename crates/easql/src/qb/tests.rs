//! Rendering tests for the statement builders.

use crate::error::BuildError;
use crate::qb::{CompileSql, Expr, Param, delete, insert, select, update};

fn sql_of(qb: &impl CompileSql) -> String {
    qb.compile().expect("compile").sql
}

fn args_of(qb: &impl CompileSql) -> Vec<String> {
    qb.compile()
        .expect("compile")
        .params
        .iter()
        .map(|p| format!("{:?}", p))
        .collect()
}

#[test]
fn test_select_basic() {
    assert_eq!(sql_of(&select("users")), "SELECT * FROM users");
}

#[test]
fn test_select_id_by_id() {
    let qb = select("users").select("id").eq("id", 1i32);
    assert_eq!(sql_of(&qb), "SELECT id FROM users WHERE id = $1");
    assert_eq!(args_of(&qb), vec!["1"]);
}

#[test]
fn test_select_with_join_group_having_order() {
    let qb = select("users u")
        .select("u.id, COUNT(o.id) AS order_count")
        .left_join("orders o", "u.id = o.user_id")
        .eq("u.status", "active")
        .group_by("u.id")
        .having_gt("COUNT(o.id)", 5i64)
        .order_by_desc("order_count")
        .limit(10)
        .offset(20);

    assert_eq!(
        sql_of(&qb),
        "SELECT u.id, COUNT(o.id) AS order_count FROM users u \
         LEFT JOIN orders o ON u.id = o.user_id \
         WHERE u.status = $1 GROUP BY u.id HAVING COUNT(o.id) > $2 \
         ORDER BY order_count DESC LIMIT 10 OFFSET 20"
    );
}

#[test]
fn test_select_distinct_paginate_and_lock() {
    let qb = select("jobs")
        .select("id")
        .distinct()
        .eq_opt("queue", Some("default"))
        .eq_opt::<i32>("priority", None)
        .paginate(3, 25)
        .for_update();
    assert_eq!(
        sql_of(&qb),
        "SELECT DISTINCT id FROM jobs WHERE queue = $1 LIMIT 25 OFFSET 50 FOR UPDATE"
    );
}

#[test]
fn test_paginate_overflow_is_a_compile_error() {
    let qb = select("users").paginate(i64::MAX, 100);
    assert_eq!(
        qb.compile().unwrap_err(),
        BuildError::Invalid(format!(
            "page {} with 100 rows per page overflows OFFSET",
            i64::MAX
        ))
    );

    // a later paginate or offset replaces the overflowed one
    let qb = qb.paginate(2, 100);
    assert_eq!(sql_of(&qb), "SELECT * FROM users LIMIT 100 OFFSET 100");
    let qb = select("users").paginate(i64::MAX, 100).offset(0);
    assert!(qb.compile().is_ok());
}

#[test]
fn test_select_compile_errors() {
    assert_eq!(
        select("").compile().unwrap_err(),
        BuildError::MissingTable("select")
    );
    assert_eq!(
        select("users").select_cols(&[]).compile().unwrap_err(),
        BuildError::NoColumns
    );
    assert!(matches!(
        select("users").limit(-1).compile(),
        Err(BuildError::Invalid(msg)) if msg.contains("LIMIT")
    ));
    assert!(matches!(
        select("users").where_template("a = ? AND b = ?", vec![1i32]).compile(),
        Err(BuildError::PlaceholderMismatch { placeholders: 2, args: 1, .. })
    ));
}

#[test]
fn test_insert_set() {
    let qb = insert("users")
        .set("username", "alice")
        .set_raw("created_at", "NOW()")
        .returning("id");
    assert_eq!(
        sql_of(&qb),
        "INSERT INTO users (username, created_at) VALUES ($1, NOW()) RETURNING id"
    );
}

#[test]
fn test_insert_columns_values() {
    let qb = insert("users").columns(&["id"]).values(vec![Param::new(1i32)]);
    assert_eq!(sql_of(&qb), "INSERT INTO users (id) VALUES ($1)");
    assert_eq!(args_of(&qb), vec!["1"]);

    let qb = insert("users")
        .columns(&["id", "name"])
        .values(vec![Param::new(1i32), Param::new("a")])
        .values(vec![Param::new(2i32), Param::new("b")]);
    assert_eq!(
        sql_of(&qb),
        "INSERT INTO users (id, name) VALUES ($1, $2), ($3, $4)"
    );
}

#[test]
fn test_insert_on_conflict() {
    let qb = insert("users")
        .set("email", "a@example.com")
        .set("name", "a")
        .on_conflict_update_excluded("(email)", &["name"]);
    assert_eq!(
        sql_of(&qb),
        "INSERT INTO users (email, name) VALUES ($1, $2) \
         ON CONFLICT (email) DO UPDATE SET name = EXCLUDED.name"
    );

    let qb = insert("tags").set("name", "rust").on_conflict_do_nothing("(name)");
    assert!(sql_of(&qb).ends_with("ON CONFLICT (name) DO NOTHING"));
}

#[test]
fn test_insert_compile_errors() {
    assert_eq!(insert("users").compile().unwrap_err(), BuildError::NoValues);
    assert!(matches!(
        insert("users").columns(&["id", "name"]).values(vec![Param::new(1i32)]).compile(),
        Err(BuildError::Invalid(_))
    ));
    assert_eq!(
        sql_of(&insert("audit_log").default_values()),
        "INSERT INTO audit_log DEFAULT VALUES"
    );
}

#[test]
fn test_update_set_and_where_share_numbering() {
    let qb = update("users").set("name", "leo").eq("id", 1i32);
    assert_eq!(sql_of(&qb), "UPDATE users SET name = $1 WHERE id = $2");
    assert_eq!(args_of(&qb), vec!["\"leo\"", "1"]);

    let qb = update("accounts")
        .set_raw("version", "version + 1")
        .set_opt::<i64>("balance", None)
        .and_expr(Expr::or(vec![Expr::eq("id", 1i64), Expr::eq("id", 2i64)]));
    assert_eq!(
        sql_of(&qb),
        "UPDATE accounts SET version = version + 1 WHERE (id = $1 OR id = $2)"
    );
}

#[test]
fn test_update_without_set_fails() {
    assert_eq!(
        update("users").eq("id", 1i32).compile().unwrap_err(),
        BuildError::NoSetClauses
    );
}

#[test]
fn test_delete() {
    let qb = delete("users").eq("id", 1i32);
    assert_eq!(sql_of(&qb), "DELETE FROM users WHERE id = $1");
    assert_eq!(sql_of(&delete("users")), "DELETE FROM users WHERE 1=0");
    assert_eq!(
        sql_of(&delete("users").allow_delete_all(true)),
        "DELETE FROM users"
    );
    assert_eq!(
        delete(" ").compile().unwrap_err(),
        BuildError::MissingTable("delete")
    );
}

#[test]
fn test_compile_is_repeatable() {
    let qb = select("users").in_list("id", vec![1i64, 2, 3]);
    assert_eq!(sql_of(&qb), sql_of(&qb));
    assert_eq!(qb.compile().unwrap().params.len(), 3);
}
