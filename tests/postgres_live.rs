//! Runs against a real PostgreSQL when `DATABASE_URL` is set; skipped otherwise.

use serde_json::{json, Map};
use sql_assistant::catalog::{Catalog, PgCatalog};
use sql_assistant::db::{ConnectionFactory, PgExecutor, StatementExecutor};
use sql_assistant::schema::QueryResult;
use sqlx::postgres::PgConnectOptions;
use sqlx::{Connection, PgConnection};

struct Fixture {
    options: PgConnectOptions,
    department: String,
    employee: String,
}

impl Fixture {
    async fn create() -> Option<Self> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let options: PgConnectOptions = url.parse().ok()?;
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let fixture = Self {
            options,
            department: format!("sa_department_{}", &suffix[..8]),
            employee: format!("sa_employee_{}", &suffix[..8]),
        };

        let mut conn = PgConnection::connect_with(&fixture.options).await.ok()?;
        let ddl = format!(
            "CREATE TABLE {dept} (
                dept_id serial PRIMARY KEY,
                department_name varchar(100) NOT NULL,
                location varchar(50)
            );
            CREATE TABLE {emp} (
                emp_id serial PRIMARY KEY,
                name varchar(100) NOT NULL,
                hire_date date,
                salary numeric,
                dept_id integer REFERENCES {dept}(dept_id)
            );
            INSERT INTO {dept} (department_name, location) VALUES ('Engineering', 'Pune'), ('Accounts', 'Delhi');
            INSERT INTO {emp} (name, hire_date, salary, dept_id) VALUES ('Asha', '2021-04-01', 5000, 1);",
            dept = fixture.department,
            emp = fixture.employee,
        );
        sqlx::raw_sql(&ddl).execute(&mut conn).await.ok()?;
        conn.close().await.ok()?;
        Some(fixture)
    }

    fn connections(&self) -> ConnectionFactory {
        ConnectionFactory::new(self.options.clone())
    }

    async fn drop_tables(&self) {
        if let Ok(mut conn) = PgConnection::connect_with(&self.options).await {
            let ddl = format!(
                "DROP TABLE IF EXISTS {}; DROP TABLE IF EXISTS {}",
                self.employee, self.department
            );
            let _ = sqlx::raw_sql(&ddl).execute(&mut conn).await;
            let _ = conn.close().await;
        }
    }
}

#[tokio::test]
async fn test_catalog_reflects_live_tables() {
    let Some(fixture) = Fixture::create().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };
    let catalog = PgCatalog::new(fixture.connections());

    let schema = catalog.fetch().await.unwrap();
    let employee = schema.table(&fixture.employee).expect("employee table listed");
    let names: Vec<&str> = employee.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["emp_id", "name", "hire_date", "salary", "dept_id"]);
    assert_eq!(employee.foreign_keys.len(), 1);
    assert_eq!(employee.foreign_keys[0].column, "dept_id");
    assert_eq!(employee.foreign_keys[0].referenced_table, fixture.department);

    let department = catalog.describe_columns(&fixture.department).await.unwrap();
    assert!(department[0].default.is_some());
    assert_eq!(department[1].max_length, Some(100));
    assert!(!department[1].nullable);

    let ids = catalog.referenced_ids(&fixture.department, "dept_id").await.unwrap();
    assert_eq!(ids, vec!["1", "2"]);

    fixture.drop_tables().await;
}

#[tokio::test]
async fn test_executor_classifies_outcomes() {
    let Some(fixture) = Fixture::create().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };
    let executor = PgExecutor::new(fixture.connections());

    let select = executor
        .execute(&format!("SELECT name, salary FROM {} ORDER BY emp_id", fixture.employee))
        .await
        .unwrap();
    match select {
        QueryResult::Select { columns, rows, row_count, .. } => {
            assert_eq!(columns, vec!["name", "salary"]);
            assert_eq!(row_count, 1);
            assert_eq!(rows[0][0], json!("Asha"));
        }
        other => panic!("expected a row set, got {:?}", other),
    }

    let update = executor
        .execute(&format!("UPDATE {} SET location = 'Remote'", fixture.department))
        .await
        .unwrap();
    assert!(matches!(update, QueryResult::Modification { row_count: 2, .. }));

    let mut values = Map::new();
    values.insert("department_name".to_string(), json!("Operations"));
    values.insert("location".to_string(), json!("Mumbai"));
    let inserted = executor.insert_row(&fixture.department, &values).await.unwrap();
    assert_eq!(inserted["dept_id"], json!(3));
    assert_eq!(inserted["department_name"], json!("Operations"));

    let failed = executor.execute("SELECT * FROM no_such_table_here").await;
    assert!(failed.is_err());

    executor.ping().await.unwrap();
    fixture.drop_tables().await;
}
