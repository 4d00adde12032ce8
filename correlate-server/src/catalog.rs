//! Operations exposed over HTTP, with their statements.
//!
//! Aggregates are cast to `float8` so they decode as floating values.

use chrono::{NaiveDateTime, Utc};
use correlate_core::{OperationRequest, Statement};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;

pub const EMPLOYEES_TABLE: &str = "employees";
pub const HIGH_SALARY_THRESHOLD: i64 = 60_000;

const FIRST_NAMES: &[&str] = &["Alex", "Jordan", "Casey", "Taylor", "Morgan", "Riley"];
const LAST_NAMES: &[&str] = &["Johnson", "Williams", "Brown", "Davis", "Miller", "Wilson"];

fn request(operation: &str, user_action: &str, statement: Statement) -> OperationRequest {
    OperationRequest {
        operation: operation.to_string(),
        table: EMPLOYEES_TABLE.to_string(),
        default_user_action: user_action.to_string(),
        statement,
    }
}

pub fn list_employees() -> OperationRequest {
    request(
        "employees.list",
        "employees",
        Statement::new(
            "SELECT employee_id, first_name, last_name, salary::float8 AS salary, hire_date \
             FROM employees e ORDER BY salary DESC",
        ),
    )
}

pub fn high_salary_employees() -> OperationRequest {
    request(
        "employees.high_salary",
        "high-salary",
        Statement::new(
            "SELECT employee_id, first_name, last_name, salary::float8 AS salary \
             FROM employees e WHERE salary > $1 ORDER BY salary DESC",
        )
        .bind(HIGH_SALARY_THRESHOLD),
    )
}

#[derive(Debug, Default, Deserialize)]
pub struct NewEmployee {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub salary: Option<f64>,
}

/// Fully populated insert values; missing fields are randomised.
#[derive(Debug, Clone, PartialEq)]
pub struct EmployeeRow {
    pub employee_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub salary: f64,
    pub hire_date: NaiveDateTime,
}

impl NewEmployee {
    pub fn fill<R: Rng>(self, rng: &mut R) -> EmployeeRow {
        let pick = |names: &[&str], rng: &mut R| {
            names.choose(rng).copied().unwrap_or("Sam").to_string()
        };
        EmployeeRow {
            employee_id: rng.gen_range(2000..=9999),
            first_name: self.first_name.unwrap_or_else(|| pick(FIRST_NAMES, rng)),
            last_name: self.last_name.unwrap_or_else(|| pick(LAST_NAMES, rng)),
            salary: self.salary.unwrap_or_else(|| rng.gen_range(50_000.0..90_000.0)),
            hire_date: Utc::now().naive_utc(),
        }
    }
}

pub fn create_employee(row: &EmployeeRow) -> OperationRequest {
    request(
        "employees.create",
        "create-employee",
        Statement::new(
            "INSERT INTO employees (employee_id, first_name, last_name, salary, hire_date) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING employee_id, first_name, last_name, salary::float8 AS salary, hire_date",
        )
        .bind(row.employee_id)
        .bind(row.first_name.as_str())
        .bind(row.last_name.as_str())
        .bind(row.salary)
        .bind(row.hire_date),
    )
}

pub fn salary_stats() -> OperationRequest {
    request(
        "analytics.salary_stats",
        "salary-stats",
        Statement::new(
            "SELECT date_trunc('month', hire_date)::date AS hire_month, \
                    COUNT(*) AS employee_count, \
                    AVG(salary)::float8 AS avg_salary, \
                    MIN(salary)::float8 AS min_salary, \
                    MAX(salary)::float8 AS max_salary \
             FROM employees e \
             GROUP BY 1 ORDER BY hire_month DESC",
        ),
    )
}

pub fn hiring_trend() -> OperationRequest {
    request(
        "analytics.hiring_trend",
        "hiring-trend",
        Statement::new(
            "SELECT EXTRACT(YEAR FROM hire_date)::int8 AS hire_year, \
                    COUNT(*) AS hires, \
                    SUM(salary)::float8 AS payroll \
             FROM employees e \
             GROUP BY 1 ORDER BY hire_year",
        ),
    )
}

pub fn salary_bands() -> OperationRequest {
    request(
        "reports.salary_bands",
        "salary-bands",
        Statement::new(
            "SELECT width_bucket(salary, 40000, 120000, 8)::int8 AS band, \
                    COUNT(*) AS employees, \
                    MIN(salary)::float8 AS band_min, \
                    MAX(salary)::float8 AS band_max \
             FROM employees e \
             GROUP BY 1 ORDER BY band",
        ),
    )
}

pub fn complex_query() -> OperationRequest {
    request(
        "queries.complex",
        "complex-query",
        Statement::new(
            "SELECT e1.employee_id, \
                    e1.first_name || ' ' || e1.last_name AS employee_name, \
                    e1.salary::float8 AS employee_salary, \
                    COUNT(e2.employee_id) AS higher_paid_colleagues \
             FROM employees e1 \
             LEFT JOIN employees e2 ON e2.salary > e1.salary \
             WHERE e1.salary > 50000 \
             GROUP BY e1.employee_id, e1.first_name, e1.last_name, e1.salary \
             ORDER BY e1.salary DESC",
        ),
    )
}

pub fn slow_query() -> OperationRequest {
    request(
        "queries.slow",
        "slow-query",
        Statement::new(
            "SELECT COUNT(*) AS cartesian_count \
             FROM employees e1, employees e2 \
             WHERE e1.salary + e2.salary > 100000",
        ),
    )
}

pub fn health_probe() -> OperationRequest {
    OperationRequest {
        operation: "health.probe".to_string(),
        table: "none".to_string(),
        default_user_action: "health".to_string(),
        statement: Statement::new("SELECT 1 AS ok"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use correlate_core::{classify, SqlValue, WorkloadCategory};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_operations_classify_as_expected() {
        let expect = [
            (list_employees(), WorkloadCategory::Lookup),
            (high_salary_employees(), WorkloadCategory::Lookup),
            (salary_stats(), WorkloadCategory::Analytics),
            (hiring_trend(), WorkloadCategory::Aggregation),
            (salary_bands(), WorkloadCategory::Reporting),
            (complex_query(), WorkloadCategory::Complex),
            (slow_query(), WorkloadCategory::Batch),
            (health_probe(), WorkloadCategory::Maintenance),
        ];
        for (req, category) in expect {
            assert_eq!(classify(&req.operation), category, "{}", req.operation);
        }
    }

    #[test]
    fn test_fill_keeps_supplied_fields() {
        let mut rng = StdRng::seed_from_u64(1);
        let row = NewEmployee {
            first_name: Some("Grace".into()),
            last_name: None,
            salary: Some(70_000.0),
        }
        .fill(&mut rng);

        assert_eq!(row.first_name, "Grace");
        assert!(LAST_NAMES.contains(&row.last_name.as_str()));
        assert_eq!(row.salary, 70_000.0);
        assert!((2000..=9999).contains(&row.employee_id));
    }

    #[test]
    fn test_create_binds_all_columns_in_order() {
        let mut rng = StdRng::seed_from_u64(9);
        let row = NewEmployee::default().fill(&mut rng);
        let req = create_employee(&row);

        assert_eq!(classify(&req.operation), WorkloadCategory::Crud);
        assert_eq!(req.statement.params.len(), 5);
        assert_eq!(req.statement.params[0], SqlValue::Int(row.employee_id));
        assert_eq!(req.statement.params[1], SqlValue::Text(row.first_name.clone()));
        assert!((50_000.0..90_000.0).contains(&row.salary));
    }
}
