//! SELECT planner behaviour: include joins, the subquery split, association
//! order paths, and grouped limits.

mod common;

use std::sync::Arc;

use common::{project_model, task_model, user_model, user_project_model};
use quarry_sql_core::dialect::{MssqlDialect, MysqlDialect, PostgresDialect};
use quarry_sql_core::{
    where_map, AssocStep, GeneratorError, GroupedLimit, Include, OrderDirection, OrderItem,
    OrderTerm, QueryGenerator, SelectOptions, SqlValue, TableRef, ThroughInclude,
};

fn task_include() -> Include {
    let user = user_model();
    Include::new(task_model(), user.get_association("Task", None).unwrap().clone())
        .attributes(["id", "title"])
}

fn project_include() -> Include {
    let user = user_model();
    Include::new(
        project_model(),
        user.get_association("Project", None).unwrap().clone(),
    )
    .attributes(["id"])
    .through(ThroughInclude::new(user_project_model()))
}

#[test]
fn through_include_nests_the_join_when_supported() {
    let gen = QueryGenerator::new(MysqlDialect::new());
    let user = user_model();
    let sql = gen
        .select_query(
            &["users".into()],
            &SelectOptions::default()
                .attributes(["id"])
                .include(project_include()),
            Some(&user),
        )
        .unwrap();
    assert_eq!(
        sql,
        "SELECT `User`.`id`, `Projects`.`id` AS `Projects.id` FROM `users` AS `User` \
         LEFT OUTER JOIN (`user_projects` AS `Projects.UserProject` \
         INNER JOIN `projects` AS `Projects` \
         ON `Projects`.`id` = `Projects.UserProject`.`project_id`) \
         ON `User`.`id` = `Projects.UserProject`.`user_id`;"
    );
}

#[test]
fn through_include_splits_into_two_joins_when_not() {
    let gen = QueryGenerator::new(MssqlDialect::new());
    let user = user_model();
    let sql = gen
        .select_query(
            &["users".into()],
            &SelectOptions::default()
                .attributes(["id"])
                .include(project_include()),
            Some(&user),
        )
        .unwrap();
    assert!(sql.contains(
        "LEFT OUTER JOIN [user_projects] AS [Projects.UserProject] \
         ON [User].[id] = [Projects.UserProject].[user_id] \
         LEFT OUTER JOIN [projects] AS [Projects] \
         ON [Projects].[id] = [Projects.UserProject].[project_id]"
    ));
}

#[test]
fn through_where_lands_on_both_sides_of_the_join() {
    let gen = QueryGenerator::new(MysqlDialect::new());
    let user = user_model();
    let include = Include::new(
        project_model(),
        user.get_association("Project", None).unwrap().clone(),
    )
    .filter(where_map! { "name" => where_map! { "$ne" => "" } })
    .through(ThroughInclude::new(user_project_model()).filter(where_map! { "rank" => 1 }));

    let sql = gen
        .select_query(
            &["users".into()],
            &SelectOptions::default().attributes(["id"]).include(include),
            Some(&user),
        )
        .unwrap();
    assert!(sql.contains("AND `Projects`.`name` != ''"));
    assert!(sql.contains("AND `Projects.UserProject`.`rank` = 1"));
}

#[test]
fn required_through_include_under_subquery_injects_a_correlated_filter() {
    let gen = QueryGenerator::new(MysqlDialect::new());
    let user = user_model();
    let sql = gen
        .select_query(
            &["users".into()],
            &SelectOptions::default()
                .attributes(["id"])
                .include(project_include().required())
                .limit(5),
            Some(&user),
        )
        .unwrap();
    assert!(sql.contains(
        "WHERE (SELECT `Projects.UserProject`.`user_id` FROM `user_projects` AS `Projects.UserProject` \
         INNER JOIN `projects` AS `Projects` ON `Projects`.`id` = `Projects.UserProject`.`project_id` \
         WHERE `Projects.UserProject`.`user_id` = `User`.`id` LIMIT 1) IS NOT NULL"
    ));
    assert!(sql.contains("LIMIT 5) AS `User`"));
}

#[test]
fn nested_includes_compose_dotted_aliases() {
    let gen = QueryGenerator::new(MysqlDialect::new());
    let user = user_model();
    let task = task_model();
    let nested = Include::new(
        user_model(),
        task.get_association("User", None).unwrap().clone(),
    )
    .attributes(["name"]);
    let include = task_include().include(nested);

    let sql = gen
        .select_query(
            &["users".into()],
            &SelectOptions::default().attributes(["id"]).include(include),
            Some(&user),
        )
        .unwrap();
    assert!(sql.contains("`Tasks.User`.`name` AS `Tasks.User.name`"));
    assert!(sql.contains(
        "LEFT OUTER JOIN `users` AS `Tasks.User` ON `Tasks`.`user_id` = `Tasks.User`.`id`"
    ));
}

#[test]
fn include_on_replaces_the_join_predicate() {
    let gen = QueryGenerator::new(MysqlDialect::new());
    let user = user_model();
    let include = task_include().on(where_map! { "userId" => where_map! { "$col" => "User.id" } });

    let sql = gen
        .select_query(
            &["users".into()],
            &SelectOptions::default().attributes(["id"]).include(include),
            Some(&user),
        )
        .unwrap();
    assert!(sql.contains("ON `Tasks`.`user_id` = `User`.`id`;"));
}

#[test]
fn order_by_association_path() {
    let gen = QueryGenerator::new(MysqlDialect::new());
    let user = user_model();
    let sql = gen
        .select_query(
            &["users".into()],
            &SelectOptions::default()
                .attributes(["id"])
                .include(task_include())
                .order(OrderItem::from(OrderTerm::Path {
                    steps: vec![AssocStep::model(task_model())],
                    column: "title".to_string(),
                })
                .direction(OrderDirection::Desc))
                .order(OrderItem::col("name")),
            Some(&user),
        )
        .unwrap();
        assert!(sql.contains("ORDER BY `Tasks`.`title` DESC, `name`;"));
}

#[test]
fn invalid_association_path_is_reported_with_the_partial_path() {
    let gen = QueryGenerator::new(MysqlDialect::new());
    let user = user_model();
    let err = gen
        .select_query(
            &["users".into()],
            &SelectOptions::default().order(OrderItem::from(OrderTerm::Path {
                steps: vec![AssocStep::model_as(project_model(), "Missing")],
                column: "name".to_string(),
            })),
            Some(&user),
        )
        .unwrap_err();
    match err {
        GeneratorError::InvalidAssociationPath(path) => assert_eq!(path, vec!["Missing"]),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn invalid_order_direction_is_rejected() {
    let err = OrderDirection::parse("SIDEWAYS").unwrap_err();
    assert!(matches!(err, GeneratorError::InvalidOrderDirection(_)));
    assert!(OrderDirection::parse("desc nulls last").is_ok());
}

#[test]
fn grouped_limit_produces_one_branch_per_value() {
    let gen = QueryGenerator::new(PostgresDialect::new());
    let values: Vec<SqlValue> = (1..=4).map(SqlValue::Int).collect();
    let sql = gen
        .select_query(
            &["tasks".into()],
            &SelectOptions::default()
                .attributes(["id", "title"])
                .grouped_limit(GroupedLimit {
                    on: "user_id".to_string(),
                    values,
                    limit: 3,
                }),
            None,
        )
        .unwrap();

    assert_eq!(sql.matches("(SELECT").count(), 4);
    assert_eq!(sql.matches(" UNION ALL ").count(), 3);
    for n in 1..=4 {
        assert!(sql.contains(&format!("\"tasks\".\"user_id\" = {n}")));
    }
    assert_eq!(sql.matches(';').count(), 1);
}

#[test]
fn schema_qualified_tables_follow_dialect_support() {
    let table = TableRef::new("users").schema("auth");

    let pg = QueryGenerator::new(PostgresDialect::new());
    let sql = pg
        .select_query(&[table.clone()], &SelectOptions::default(), None)
        .unwrap();
    assert_eq!(sql, "SELECT * FROM \"auth\".\"users\";");

    let mysql = QueryGenerator::new(MysqlDialect::new());
    let sql = mysql
        .select_query(&[table], &SelectOptions::default(), None)
        .unwrap();
    assert_eq!(sql, "SELECT * FROM `auth.users`;");
}

#[test]
fn select_fragment_has_no_trailing_punctuation() {
    let gen = QueryGenerator::new(PostgresDialect::new());
    let fragment = gen.select_from_table_fragment(
        &["\"id\"".to_string()],
        &"users".into(),
        Some("u"),
        None,
        None,
    );
    assert_eq!(fragment, "SELECT \"id\" FROM \"users\" AS \"u\"");
}

#[test]
fn offset_only_select_uses_the_sentinel_limit() {
    let gen = QueryGenerator::new(MysqlDialect::new());
    let sql = gen
        .select_query(
            &["users".into()],
            &SelectOptions::default().offset(20),
            None,
        )
        .unwrap();
    assert_eq!(sql, "SELECT * FROM `users` LIMIT 20, 10000000000000;");
}

#[test]
fn subquery_keeps_order_in_both_queries() {
    let gen = QueryGenerator::new(MysqlDialect::new());
    let user = user_model();
    let sql = gen
        .select_query(
            &["users".into()],
            &SelectOptions::default()
                .attributes(["id"])
                .include(task_include())
                .order(OrderItem::col("name").direction(OrderDirection::Asc))
                .limit(2),
            Some(&user),
        )
        .unwrap();
    // Once inside the subquery, once outside.
    assert_eq!(sql.matches("ORDER BY `name` ASC").count(), 2);
}

#[test]
fn ad_hoc_subquery_override_is_honoured() {
    let gen = QueryGenerator::new(MysqlDialect::new());
    let user = user_model();
    let with_split = gen
        .select_query(
            &["users".into()],
            &SelectOptions::default()
                .attributes(["id"])
                .include(task_include())
                .limit(2),
            Some(&user),
        )
        .unwrap();
    assert!(with_split.contains("FROM (SELECT"));

    let suppressed = gen
        .select_query(
            &["users".into()],
            &SelectOptions::default()
                .attributes(["id"])
                .include(task_include())
                .limit(2)
                .subquery(false),
            Some(&user),
        )
        .unwrap();
    assert!(!suppressed.contains("FROM (SELECT"));
}
