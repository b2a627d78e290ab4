//! Schema catalog - table metadata consumed by the authorizer
//!
//! The catalog answers three questions: which columns a table declares (in
//! declaration order), whether a table is publicly readable, and which
//! column, if any, pins a table's rows to a caller's identity for a given
//! role. It is read-only after construction and safe to share across
//! concurrent authorizations without locking.

use indexmap::IndexMap;

use crate::user::Role;

/// Tables readable by every role
pub const PUBLIC_TABLES: &[&str] = &[
    "program",
    "semester",
    "course",
    "course_program",
    "course_class",
    "course_class_schedule",
    "course_schedule_instructor",
    "faculty",
];

/// Query surface backed by any schema store
///
/// Unknown tables are not an error: `columns` returns an empty list and
/// `is_public` returns false, which leaves such tables permanently
/// unauthorized for non-admin roles.
pub trait SchemaCatalog {
    /// Column names of a table, in declaration order; empty for unknown tables
    fn columns(&self, table: &str) -> Vec<String>;

    /// Whether the table is readable by every role
    fn is_public(&self, table: &str) -> bool;

    /// The column whose equality with the caller's id authorizes rows of
    /// this table, if one exists for the role
    fn auth_column(&self, role: Role, table: &str) -> Option<&str>;
}

/// Table definition
#[derive(Debug, Clone)]
pub struct TableDef {
    /// Table name
    pub name: String,
    /// Column names in declaration order
    pub columns: Vec<String>,
}

impl TableDef {
    /// Create a new table definition
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Add a column
    #[must_use]
    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.columns.push(name.into());
        self
    }
}

/// In-memory catalog of the university schema
#[derive(Debug, Clone, Default)]
pub struct UniversityCatalog {
    tables: IndexMap<String, TableDef>,
}

impl UniversityCatalog {
    /// Build the catalog with the full university schema
    pub fn new() -> Self {
        let mut catalog = UniversityCatalog {
            tables: IndexMap::new(),
        };

        catalog.add(TableDef::new("faculty").column("id").column("name"));
        catalog.add(
            TableDef::new("program")
                .column("id")
                .column("name")
                .column("faculty_id"),
        );
        catalog.add(
            TableDef::new("semester")
                .column("id")
                .column("name")
                .column("start_date")
                .column("end_date"),
        );
        catalog.add(
            TableDef::new("course")
                .column("id")
                .column("code")
                .column("name")
                .column("credits")
                .column("faculty_id"),
        );
        catalog.add(
            TableDef::new("course_program")
                .column("course_id")
                .column("program_id"),
        );
        catalog.add(
            TableDef::new("course_class")
                .column("id")
                .column("code")
                .column("course_id")
                .column("semester_id")
                .column("professor_id"),
        );
        catalog.add(
            TableDef::new("course_class_schedule")
                .column("id")
                .column("course_class_id")
                .column("day_of_week")
                .column("start_period")
                .column("end_period")
                .column("room"),
        );
        catalog.add(
            TableDef::new("course_schedule_instructor")
                .column("course_class_schedule_id")
                .column("professor_id"),
        );
        catalog.add(
            TableDef::new("student")
                .column("id")
                .column("name")
                .column("email")
                .column("administrative_class_id"),
        );
        catalog.add(
            TableDef::new("professor")
                .column("id")
                .column("name")
                .column("email")
                .column("faculty_id"),
        );
        catalog.add(
            TableDef::new("administrative_class")
                .column("id")
                .column("name")
                .column("advisor_id"),
        );
        // The enrollment relation is referenced under two names by the
        // SQL-generating layer; both resolve to the same shape.
        for name in ["student_course_class", "course_class_enrollment"] {
            catalog.add(
                TableDef::new(name)
                    .column("student_id")
                    .column("course_class_id")
                    .column("grade"),
            );
        }
        catalog.add(
            TableDef::new("scholarship")
                .column("id")
                .column("name")
                .column("amount"),
        );
        catalog.add(
            TableDef::new("student_scholarship")
                .column("student_id")
                .column("scholarship_id")
                .column("awarded_at"),
        );

        catalog
    }

    /// Register a table definition
    pub fn add(&mut self, table: TableDef) {
        self.tables.insert(table.name.clone(), table);
    }

    /// Look up a table definition
    pub fn get_table(&self, name: &str) -> Option<&TableDef> {
        self.tables.get(name)
    }
}

impl SchemaCatalog for UniversityCatalog {
    fn columns(&self, table: &str) -> Vec<String> {
        self.tables
            .get(table)
            .map(|t| t.columns.clone())
            .unwrap_or_default()
    }

    fn is_public(&self, table: &str) -> bool {
        PUBLIC_TABLES.contains(&table)
    }

    fn auth_column(&self, role: Role, table: &str) -> Option<&str> {
        match role {
            Role::Admin => None,
            Role::Student => match table {
                "student" => Some("id"),
                "administrative_class" => Some("id"),
                "student_course_class" | "course_class_enrollment" => Some("student_id"),
                "student_scholarship" => Some("student_id"),
                _ => None,
            },
            Role::Professor => match table {
                "professor" => Some("id"),
                "administrative_class" => Some("advisor_id"),
                "course_class" => Some("professor_id"),
                "course_schedule_instructor" => Some("professor_id"),
                _ => None,
            },
        }
    }
}
