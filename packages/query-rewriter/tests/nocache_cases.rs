mod support;

use query_rewriter::{
    BackendError, BindVars, CacheOutcome, ErrorCode, PlanKind, QueryError, QueryResult,
    RewriterConfig, Value,
};
use support::{Harness, Mode};

fn ints(values: &[i64]) -> Vec<Value> {
    values.iter().copied().map(Value::Integer).collect()
}

fn rewrite_code(error: QueryError) -> ErrorCode {
    match error {
        QueryError::Rewrite(error) => error.code,
        QueryError::Backend(error) => panic!("expected rewrite error, got backend error {error}"),
    }
}

rewrite_test!(select_gets_row_cap_and_field_query, |harness| async move {
    let execution = harness
        .run_ok("select /* order */ * from vtocc_a order by id desc")
        .await;
    assert_eq!(execution.plan.kind, PlanKind::PassSelect);
    assert_eq!(
        execution.plan.statements,
        vec!["SELECT /* order */ * FROM vtocc_a ORDER BY id DESC LIMIT 10001"]
    );
    assert_eq!(
        execution.plan.field_query.as_deref(),
        Some("SELECT * FROM vtocc_a WHERE 1 != 1")
    );
});

rewrite_test!(select_lock_is_reattached_after_limit, |harness| async move {
    let execution = harness
        .run_ok("select /* for update */ eid from vtocc_a where eid = 1 and id = 1 for update")
        .await;
    assert_eq!(
        execution.plan.statements,
        vec![
            "SELECT /* for update */ eid FROM vtocc_a WHERE eid = 1 AND id = 1 LIMIT 10001 FOR UPDATE"
        ]
    );

    let execution = harness
        .run_ok("select eid from vtocc_a where eid = 1 lock in share mode")
        .await;
    assert_eq!(
        execution.plan.statements,
        vec!["SELECT eid FROM vtocc_a WHERE eid = 1 LIMIT 10001 LOCK IN SHARE MODE"]
    );
});

rewrite_test!(select_binds_named_and_positional_values, |harness| async move {
    let execution = harness
        .run(
            "select * from vtocc_a where eid = :eid and name = :name",
            &BindVars::new().with("eid", 2i64).with("name", "abcd"),
        )
        .await
        .expect("named binds");
    assert_eq!(
        execution.plan.statements,
        vec!["SELECT * FROM vtocc_a WHERE eid = 2 AND name = 'abcd' LIMIT 10001"]
    );

    let execution = harness
        .run(
            "select * from vtocc_a where eid = ? and id = ?",
            &BindVars::positional(ints(&[2, 1])),
        )
        .await
        .expect("positional binds");
    assert_eq!(
        execution.plan.statements.last().map(String::as_str),
        Some("SELECT * FROM vtocc_a WHERE eid = 2 AND id = 1 LIMIT 10001")
    );
});

rewrite_test!(select_over_row_cap_fails, |harness| async move {
    let harness = Harness::with_config(
        harness.mode,
        RewriterConfig {
            row_cap: 2,
            ..RewriterConfig::default()
        },
    );
    harness
        .executor
        .respond_rows(vec![ints(&[1, 1]), ints(&[1, 2]), ints(&[1, 3])]);
    let error = harness
        .run("select eid, id from vtocc_a", &BindVars::new())
        .await
        .expect_err("three rows exceed a cap of two");
    assert_eq!(rewrite_code(error), ErrorCode::RowCapExceeded);
    assert_eq!(
        harness.statements(),
        vec!["SELECT eid, id FROM vtocc_a LIMIT 3"]
    );
});

rewrite_test!(missing_bind_var_is_reported, |harness| async move {
    let error = harness
        .run("select * from vtocc_a where eid = :eid", &BindVars::new())
        .await
        .expect_err("eid is unbound");
    assert_eq!(rewrite_code(error), ErrorCode::MissingBindVar);
    assert!(harness.statements().is_empty());
});

rewrite_test!(simple_insert_is_annotated, |harness| async move {
    let execution = harness
        .run_ok("insert /* simple */ into vtocc_a values (2, 1, 'aaaa', 'bbbb')")
        .await;
    assert_eq!(execution.plan.kind, PlanKind::InsertPk);
    assert_eq!(
        execution.plan.statements,
        vec!["INSERT /* simple */ INTO vtocc_a VALUES (2, 1, 'aaaa', 'bbbb') /* _stream vtocc_a (eid id ) (2 1 ); */"]
    );
    assert_eq!(execution.result.rows_affected, 1);
});

rewrite_test!(insert_ignore_is_kept, |harness| async move {
    let execution = harness
        .run_ok("insert ignore into vtocc_a(eid, id, name) values (2, 1, 'x')")
        .await;
    assert_eq!(
        execution.plan.statements,
        vec!["INSERT IGNORE INTO vtocc_a (eid, id, name) VALUES (2, 1, 'x') /* _stream vtocc_a (eid id ) (2 1 ); */"]
    );
});

rewrite_test!(insert_with_out_of_sequence_columns, |harness| async move {
    let execution = harness
        .run_ok("insert into vtocc_a(id, eid, foo, name) values (-1, 5, 'aaa', 'bbb')")
        .await;
    assert_eq!(
        execution.plan.statements,
        vec!["INSERT INTO vtocc_a (id, eid, foo, name) VALUES (-1, 5, 'aaa', 'bbb') /* _stream vtocc_a (eid id ) (5 -1 ); */"]
    );
});

rewrite_test!(insert_fills_key_from_number_default, |harness| async move {
    let execution = harness
        .run_ok("insert into vtocc_a(eid, name) values (3, 'x')")
        .await;
    assert_eq!(
        execution.plan.statements,
        vec!["INSERT INTO vtocc_a (eid, name) VALUES (3, 'x') /* _stream vtocc_a (eid id ) (3 1 ); */"]
    );
});

rewrite_test!(insert_fills_key_from_string_default, |harness| async move {
    let execution = harness
        .run_ok("insert /* string default */ into vtocc_f(id) values (1)")
        .await;
    assert_eq!(
        execution.plan.statements,
        vec!["INSERT /* string default */ INTO vtocc_f (id) VALUES (1) /* _stream vtocc_f (vb ) ('YWI=' ); */"]
    );
});

rewrite_test!(insert_reserves_auto_increment_ids, |harness| async move {
    harness.executor.set_next_auto_increment(7);
    let execution = harness
        .run_ok("insert /* auto_increment */ into vtocc_e(name, foo) values ('aaaa', 'cccc')")
        .await;
    assert_eq!(
        execution.plan.statements,
        vec!["INSERT /* auto_increment */ INTO vtocc_e (name, foo, eid) VALUES ('aaaa', 'cccc', 7) /* _stream vtocc_e (eid id name ) (7 1 'YWFhYQ==' ); */"]
    );
    assert_eq!(
        harness.executor.reservations(),
        vec![("vtocc_e".to_string(), 1)]
    );
});

rewrite_test!(insert_with_explicit_key_reserves_nothing, |harness| async move {
    harness
        .run_ok("insert into vtocc_e(eid, id, name, foo) values (9, 2, 'n', 'f')")
        .await;
    assert!(harness.executor.reservations().is_empty());
});

rewrite_test!(insert_binds_positional_values, |harness| async move {
    let execution = harness
        .run(
            "insert /* positional */ into vtocc_a(eid, id, name, foo) values (?, ?, ?, ?)",
            &BindVars::positional([
                Value::Integer(4),
                Value::Integer(1),
                Value::Text("aaaa".to_string()),
                Value::Text("cccc".to_string()),
            ]),
        )
        .await
        .expect("insert");
    assert_eq!(
        execution.plan.statements,
        vec!["INSERT /* positional */ INTO vtocc_a (eid, id, name, foo) VALUES (4, 1, 'aaaa', 'cccc') /* _stream vtocc_a (eid id ) (4 1 ); */"]
    );
});

rewrite_test!(multi_value_insert_annotates_every_row, |harness| async move {
    let execution = harness
        .run_ok("insert into vtocc_a(eid, id, name) values (5, 1, 'a'), (5, 2, 'b')")
        .await;
    assert_eq!(execution.plan.kind, PlanKind::InsertMulti);
    assert_eq!(
        execution.plan.statements,
        vec!["INSERT INTO vtocc_a (eid, id, name) VALUES (5, 1, 'a'), (5, 2, 'b') /* _stream vtocc_a (eid id ) (5 1 ) (5 2 ); */"]
    );
});

rewrite_test!(subquery_insert_is_materialized, |harness| async move {
    harness.executor.set_next_auto_increment(20);
    harness.executor.respond_rows(vec![
        vec![
            Value::Integer(10),
            Value::Text("abcd".to_string()),
            Value::Text("20".to_string()),
        ],
        vec![
            Value::Integer(11),
            Value::Text("bcde".to_string()),
            Value::Text("30".to_string()),
        ],
    ]);
    let execution = harness
        .run_ok("insert into vtocc_e(id, name, foo) select eid, name, foo from vtocc_c")
        .await;
    assert_eq!(execution.plan.kind, PlanKind::InsertSubquery);
    assert_eq!(
        execution.plan.statements,
        vec![
            "SELECT eid, name, foo FROM vtocc_c LIMIT 10001",
            "INSERT INTO vtocc_e (id, name, foo, eid) VALUES (10, 'abcd', '20', 20), (11, 'bcde', '30', 21) /* _stream vtocc_e (eid id name ) (20 10 'YWJjZA==' ) (21 11 'YmNkZQ==' ); */",
        ]
    );
    assert_eq!(
        harness.executor.reservations(),
        vec![("vtocc_e".to_string(), 2)]
    );
});

rewrite_test!(subquery_insert_with_no_rows_stops, |harness| async move {
    harness.executor.respond_rows(Vec::new());
    let execution = harness
        .run_ok("insert into vtocc_a(eid, id, name, foo) select eid, 1, name, foo from vtocc_c")
        .await;
    assert_eq!(execution.plan.statements.len(), 1);
    assert_eq!(execution.plan.rows_affected, Some(0));
    assert_eq!(execution.result.rows_affected, 0);
});

rewrite_test!(upsert_without_conflict_runs_insert_only, |harness| async move {
    let execution = harness
        .run_ok("insert into upsert_test(id1, id2) values (1, 1) on duplicate key update id2 = 1")
        .await;
    assert_eq!(execution.plan.kind, PlanKind::UpsertPk);
    assert_eq!(
        execution.plan.statements,
        vec!["INSERT INTO upsert_test (id1, id2) VALUES (1, 1) /* _stream upsert_test (id1 ) (1 ); */"]
    );
    assert_eq!(execution.result.rows_affected, 1);
});

rewrite_test!(upsert_conflict_applies_update, |harness| async move {
    harness
        .executor
        .respond(Err(BackendError::duplicate_key("Duplicate entry '1' for key 'PRIMARY'")));
    let execution = harness
        .run_ok("insert ignore into upsert_test(id1, id2) values (1, 2) on duplicate key update id2 = 2")
        .await;
    assert_eq!(
        execution.plan.statements,
        vec![
            "INSERT INTO upsert_test (id1, id2) VALUES (1, 2) /* _stream upsert_test (id1 ) (1 ); */",
            "UPDATE upsert_test SET id2 = 2 WHERE id1 IN (1) /* _stream upsert_test (id1 ) (1 ); */",
        ]
    );
    assert_eq!(execution.plan.rows_affected, Some(2));
    assert_eq!(execution.result.rows_affected, 2);
});

rewrite_test!(upsert_key_change_annotates_both_keys, |harness| async move {
    harness
        .executor
        .respond(Err(BackendError::duplicate_key("duplicate")));
    let execution = harness
        .run_ok("insert into upsert_test(id1, id2) values (1, 2) on duplicate key update id1 = 2")
        .await;
    assert_eq!(
        execution.plan.statements.last().map(String::as_str),
        Some("UPDATE upsert_test SET id1 = 2 WHERE id1 IN (1) /* _stream upsert_test (id1 ) (1 ) (2 ); */")
    );
});

rewrite_test!(upsert_resolves_inserted_values, |harness| async move {
    harness
        .executor
        .respond(Err(BackendError::duplicate_key("duplicate")));
    let execution = harness
        .run_ok("insert into upsert_test(id1, id2) values (1, 2) on duplicate key update id2 = values(id2) + 1")
        .await;
    assert_eq!(
        execution.plan.statements.last().map(String::as_str),
        Some("UPDATE upsert_test SET id2 = 2 + 1 WHERE id1 IN (1) /* _stream upsert_test (id1 ) (1 ); */")
    );
});

rewrite_test!(upsert_propagates_other_backend_errors, |harness| async move {
    harness
        .executor
        .respond(Err(BackendError::other("lock wait timeout")));
    let error = harness
        .run(
            "insert into upsert_test(id1, id2) values (1, 2) on duplicate key update id2 = 2",
            &BindVars::new(),
        )
        .await
        .expect_err("backend failure");
    assert!(matches!(error, QueryError::Backend(ref backend) if !backend.is_duplicate_key()));
    assert_eq!(harness.statements().len(), 1);
});

rewrite_test!(qualified_update_skips_probe, |harness| async move {
    let execution = harness
        .run_ok("update /* pk */ vtocc_a set foo = 'bar' where eid = 1 and id = 1")
        .await;
    assert_eq!(execution.plan.kind, PlanKind::DmlPk);
    assert_eq!(
        execution.plan.statements,
        vec!["UPDATE /* pk */ vtocc_a SET foo = 'bar' WHERE (eid = 1 AND id = 1) /* _stream vtocc_a (eid id ) (1 1 ); */"]
    );
});

rewrite_test!(update_of_key_annotates_old_and_new, |harness| async move {
    let execution = harness
        .run_ok("update vtocc_a set eid = 2 where eid = 1 and id = 1")
        .await;
    assert_eq!(
        execution.plan.statements,
        vec!["UPDATE vtocc_a SET eid = 2 WHERE (eid = 1 AND id = 1) /* _stream vtocc_a (eid id ) (1 1 ) (2 1 ); */"]
    );
});

rewrite_test!(single_column_key_uses_in_list, |harness| async move {
    let execution = harness
        .run_ok("update vtocc_f set id = 3 where vb in ('a', 'b')")
        .await;
    assert_eq!(
        execution.plan.statements,
        vec!["UPDATE vtocc_f SET id = 3 WHERE vb IN ('a', 'b') /* _stream vtocc_f (vb ) ('YQ==' ) ('Yg==' ); */"]
    );
});

rewrite_test!(in_lists_expand_to_key_tuples, |harness| async move {
    let execution = harness
        .run_ok("delete /* pk */ from vtocc_a where eid in (2, 3) and id in (1, 2)")
        .await;
    assert_eq!(execution.plan.kind, PlanKind::DmlPk);
    assert_eq!(
        execution.plan.statements,
        vec!["DELETE /* pk */ FROM vtocc_a WHERE (eid = 2 AND id = 1) OR (eid = 2 AND id = 2) OR (eid = 3 AND id = 1) OR (eid = 3 AND id = 2) /* _stream vtocc_a (eid id ) (2 1 ) (2 2 ) (3 1 ) (3 2 ); */"]
    );
});

rewrite_test!(in_list_expansion_respects_limit, |harness| async move {
    let harness = Harness::with_config(
        harness.mode,
        RewriterConfig {
            pk_expansion_limit: 3,
            ..RewriterConfig::default()
        },
    );
    let error = harness
        .run(
            "delete from vtocc_a where eid in (2, 3) and id in (1, 2)",
            &BindVars::new(),
        )
        .await
        .expect_err("four combinations exceed three");
    assert_eq!(rewrite_code(error), ErrorCode::PkCombinatorialLimitExceeded);
    assert!(harness.statements().is_empty());
});

rewrite_test!(partial_key_update_probes_first, |harness| async move {
    harness.executor.respond_rows(vec![ints(&[1, 1])]);
    let execution = harness
        .run_ok("update /* pk */ vtocc_a set foo='bar' where id = 1")
        .await;
    assert_eq!(execution.plan.kind, PlanKind::DmlSubquery);
    assert_eq!(
        execution.plan.statements,
        vec![
            "SELECT eid, id FROM vtocc_a WHERE id = 1 LIMIT 10001 FOR UPDATE",
            "UPDATE /* pk */ vtocc_a SET foo = 'bar' WHERE (eid = 1 AND id = 1) /* _stream vtocc_a (eid id ) (1 1 ); */",
        ]
    );
});

rewrite_test!(order_and_limit_move_into_probe, |harness| async move {
    harness.executor.respond_rows(vec![ints(&[1, 2])]);
    let execution = harness
        .run_ok("update /* pk */ vtocc_a set foo='bar' where eid = 1 order by id desc limit 1")
        .await;
    assert_eq!(
        execution.plan.statements,
        vec![
            "SELECT eid, id FROM vtocc_a WHERE eid = 1 ORDER BY id DESC LIMIT 1 FOR UPDATE",
            "UPDATE /* pk */ vtocc_a SET foo = 'bar' WHERE (eid = 1 AND id = 2) /* _stream vtocc_a (eid id ) (1 2 ); */",
        ]
    );
});

rewrite_test!(update_without_where_probes_whole_table, |harness| async move {
    harness
        .executor
        .respond_rows(vec![ints(&[1, 1]), ints(&[1, 2])]);
    harness.executor.respond(Ok(QueryResult::affected(2)));
    let execution = harness.run_ok("update vtocc_a set foo='bar'").await;
    assert_eq!(
        execution.plan.statements,
        vec![
            "SELECT eid, id FROM vtocc_a LIMIT 10001 FOR UPDATE",
            "UPDATE vtocc_a SET foo = 'bar' WHERE (eid = 1 AND id = 1) OR (eid = 1 AND id = 2) /* _stream vtocc_a (eid id ) (1 1 ) (1 2 ); */",
        ]
    );
    assert_eq!(execution.result.rows_affected, 2);
});

rewrite_test!(probe_of_binary_key_renders_base64, |harness| async move {
    harness.executor.respond_rows(vec![
        vec![Value::Blob(b"a".to_vec())],
        vec![Value::Blob(b"b".to_vec())],
    ]);
    let execution = harness
        .run_ok("update vtocc_f set id=4 where id >= 0")
        .await;
    assert_eq!(
        execution.plan.statements,
        vec![
            "SELECT vb FROM vtocc_f WHERE id >= 0 LIMIT 10001 FOR UPDATE",
            "UPDATE vtocc_f SET id = 4 WHERE vb IN ('a', 'b') /* _stream vtocc_f (vb ) ('YQ==' ) ('Yg==' ); */",
        ]
    );
});

rewrite_test!(probe_with_no_rows_skips_dml, |harness| async move {
    harness.executor.respond_rows(Vec::new());
    let execution = harness
        .run_ok("update vtocc_f set id=4 where id < 0")
        .await;
    assert_eq!(
        execution.plan.statements,
        vec!["SELECT vb FROM vtocc_f WHERE id < 0 LIMIT 10001 FOR UPDATE"]
    );
    assert_eq!(execution.plan.rows_affected, Some(0));
    assert_eq!(execution.result.rows_affected, 0);
});

rewrite_test!(complex_where_delete_probes, |harness| async move {
    harness.executor.respond_rows(vec![ints(&[2, 1])]);
    let execution = harness
        .run_ok("delete from vtocc_a where eid = 1+1 and id = 1")
        .await;
    assert_eq!(
        execution.plan.statements,
        vec![
            "SELECT eid, id FROM vtocc_a WHERE eid = 1 + 1 AND id = 1 LIMIT 10001 FOR UPDATE",
            "DELETE FROM vtocc_a WHERE (eid = 2 AND id = 1) /* _stream vtocc_a (eid id ) (2 1 ); */",
        ]
    );
});

rewrite_test!(probe_over_row_cap_fails, |harness| async move {
    let harness = Harness::with_config(
        harness.mode,
        RewriterConfig {
            row_cap: 1,
            ..RewriterConfig::default()
        },
    );
    harness
        .executor
        .respond_rows(vec![ints(&[1, 1]), ints(&[1, 2])]);
    let error = harness
        .run("delete from vtocc_a where name = 'x'", &BindVars::new())
        .await
        .expect_err("two rows exceed a cap of one");
    assert_eq!(rewrite_code(error), ErrorCode::RowCapExceeded);
    assert_eq!(
        harness.statements(),
        vec!["SELECT eid, id FROM vtocc_a WHERE name = 'x' LIMIT 2 FOR UPDATE"]
    );
});

rewrite_test!(looked_up_key_change_pairs_old_and_new_per_row, |harness| async move {
    harness
        .executor
        .respond_rows(vec![ints(&[1, 2]), ints(&[1, 3])]);
    let execution = harness
        .run_ok("update vtocc_a set eid = 9 where name = 'x'")
        .await;
    assert_eq!(
        execution.plan.statements,
        vec![
            "SELECT eid, id FROM vtocc_a WHERE name = 'x' LIMIT 10001 FOR UPDATE",
            "UPDATE vtocc_a SET eid = 9 WHERE (eid = 1 AND id = 2) OR (eid = 1 AND id = 3) /* _stream vtocc_a (eid id ) (1 2 ) (9 2 ) (1 3 ) (9 3 ); */",
        ]
    );
});

rewrite_test!(bad_set_list_fails_before_lookup, |harness| async move {
    let error = harness
        .run(
            "update vtocc_a set foo = :foo where name = 'x'",
            &BindVars::new(),
        )
        .await
        .expect_err("foo is unbound");
    assert_eq!(rewrite_code(error), ErrorCode::MissingBindVar);

    let error = harness
        .run(
            "update vtocc_a set eid = eid + 1 where name = 'x'",
            &BindVars::new(),
        )
        .await
        .expect_err("computed key assignment");
    assert_eq!(rewrite_code(error), ErrorCode::ParseMismatch);
    assert!(harness.statements().is_empty());
});

rewrite_test!(bad_upsert_reserves_no_ids, |harness| async move {
    let error = harness
        .run(
            "insert into vtocc_e(name, foo) values ('a', 'b') on duplicate key update foo = values(nope)",
            &BindVars::new(),
        )
        .await
        .expect_err("unknown column in VALUES()");
    assert_eq!(rewrite_code(error), ErrorCode::ParseMismatch);

    let error = harness
        .run(
            "insert into vtocc_e(name, foo) values ('a', 'b') on duplicate key update foo = :foo",
            &BindVars::new(),
        )
        .await
        .expect_err("foo is unbound");
    assert_eq!(rewrite_code(error), ErrorCode::MissingBindVar);
    assert!(harness.executor.reservations().is_empty());
    assert!(harness.statements().is_empty());
});

rewrite_test!(null_key_literal_is_looked_up_instead_of_failing, |harness| async move {
    harness.executor.respond_rows(Vec::new());
    let execution = harness
        .run_ok("delete from vtocc_a where eid = null and id = 1")
        .await;
    assert_eq!(execution.plan.kind, PlanKind::DmlSubquery);
    assert_eq!(
        execution.plan.statements,
        vec!["SELECT eid, id FROM vtocc_a WHERE eid = NULL AND id = 1 LIMIT 10001 FOR UPDATE"]
    );
    assert_eq!(execution.result.rows_affected, 0);
});

rewrite_test!(null_key_bind_affects_no_rows, |harness| async move {
    let execution = harness
        .run(
            "delete from vtocc_a where eid = :eid and id = 1",
            &BindVars::new().with("eid", Value::Null),
        )
        .await
        .expect("null key");
    assert!(execution.plan.statements.is_empty());
    assert_eq!(execution.plan.rows_affected, Some(0));
    assert_eq!(execution.result.rows_affected, 0);
    assert!(harness.statements().is_empty());
});

rewrite_test!(bound_limit_is_kept, |harness| async move {
    let execution = harness
        .run(
            "select eid, id from vtocc_a limit :a",
            &BindVars::new().with("a", 1i64),
        )
        .await
        .expect("bound limit");
    assert_eq!(
        execution.plan.statements,
        vec!["SELECT eid, id FROM vtocc_a LIMIT 1"]
    );
});

rewrite_test!(outer_join_field_query_matches_nothing, |harness| async move {
    let execution = harness
        .run_ok("select a.eid from vtocc_a as a left join vtocc_c as c on a.eid = c.eid")
        .await;
    assert_eq!(
        execution.plan.field_query.as_deref(),
        Some("SELECT a.eid FROM vtocc_a AS a LEFT JOIN vtocc_c AS c ON 1 != 1 WHERE 1 != 1")
    );
});

rewrite_test!(unknown_table_is_rejected, |harness| async move {
    let error = harness
        .run("delete from missing_table where id = 1", &BindVars::new())
        .await
        .expect_err("table is not in the catalog");
    assert_eq!(rewrite_code(error), ErrorCode::UnknownTable);
});

rewrite_test!(other_statements_pass_through, |harness| async move {
    let execution = harness.run_ok("set autocommit = 1").await;
    assert_eq!(execution.plan.kind, PlanKind::Passthrough);
    assert_eq!(execution.plan.statements, vec!["SET autocommit = 1"]);
});

rewrite_test!(cache_outcomes_are_counted_per_table_and_plan, |harness| async move {
    for outcome in [CacheOutcome::Hit, CacheOutcome::Hit, CacheOutcome::Miss] {
        harness.executor.respond(Ok(QueryResult {
            cache: Some(outcome),
            ..QueryResult::with_rows(vec![ints(&[1, 1])])
        }));
    }
    for eid in 1..=3 {
        harness
            .run_ok(&format!("select * from vtocc_a where eid = {eid} and id = 1"))
            .await;
    }
    harness.run_ok("select * from vtocc_f").await;

    let counters = harness.rewriter.stats().table_counters("vtocc_a");
    assert_eq!((counters.hits, counters.misses, counters.absent), (2, 1, 0));

    let snapshot = harness.rewriter.stats().snapshot();
    assert_eq!(snapshot.plans.len(), 1, "literal-only differences share a plan");
    assert!(!snapshot.tables.contains_key("vtocc_f"));
});

#[tokio::test]
async fn prepared_statement_is_reusable_across_binds() {
    let harness = Harness::new(Mode::Prepared);
    let prepared = harness
        .rewriter
        .prepare("delete from vtocc_a where eid = :eid and id = 1")
        .expect("prepare");
    for eid in [1i64, 2] {
        harness
            .rewriter
            .execute_prepared(
                &prepared,
                &BindVars::new().with("eid", eid),
                &harness.executor,
            )
            .await
            .expect("execute");
    }
    assert_eq!(
        harness.statements(),
        vec![
            "DELETE FROM vtocc_a WHERE (eid = 1 AND id = 1) /* _stream vtocc_a (eid id ) (1 1 ); */",
            "DELETE FROM vtocc_a WHERE (eid = 2 AND id = 1) /* _stream vtocc_a (eid id ) (2 1 ); */",
        ]
    );
}
