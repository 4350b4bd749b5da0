//! Built-in models of the `records` app.

use crate::schema::{FieldDef, ModelDef, OrderBy, ScalarType};

const APP: &str = "records";

/// PositiveSmallInteger bounds.
const SMALL: (i64, i64) = (0, 32767);

pub const STUDENT_PROFILE: ModelDef = ModelDef {
    app: APP,
    name: "StudentProfile",
    table: "student_profiles",
    fields: &[
        FieldDef::scalar("student_id", ScalarType::String).unique(),
        FieldDef::scalar("first_name", ScalarType::String),
        FieldDef::scalar("last_name", ScalarType::String),
        FieldDef::scalar("date_of_birth", ScalarType::Date),
        FieldDef::scalar("contact_number", ScalarType::String),
    ],
    ordering: &[OrderBy::asc("student_id")],
};

pub const STUDENT_CLASS_HISTORY: ModelDef = ModelDef {
    app: APP,
    name: "StudentClassHistory",
    table: "student_class_history",
    fields: &[
        FieldDef::row_id("id"),
        FieldDef::foreign_key("student", "student_id", "StudentProfile", "student_id"),
        FieldDef::scalar("academic_year", ScalarType::Integer).range(SMALL.0, SMALL.1),
        FieldDef::scalar("form_class", ScalarType::String),
        FieldDef::created_at("created_at"),
        FieldDef::scalar("is_current", ScalarType::Boolean),
    ],
    ordering: &[OrderBy::asc("student"), OrderBy::desc("academic_year")],
};

pub const ACADEMIC_RECORD: ModelDef = ModelDef {
    app: APP,
    name: "AcademicRecord",
    table: "academic_records",
    fields: &[
        FieldDef::foreign_key("student", "student_id", "StudentProfile", "student_id"),
        FieldDef::row_id("id"),
        FieldDef::scalar("academic_year", ScalarType::Integer).range(SMALL.0, SMALL.1),
        FieldDef::scalar("semester", ScalarType::String),
        FieldDef::scalar("Chinese", ScalarType::Integer)
            .column("chinese")
            .range(SMALL.0, SMALL.1),
        FieldDef::scalar("English", ScalarType::Integer)
            .column("english")
            .range(SMALL.0, SMALL.1),
        FieldDef::scalar("Mathematics", ScalarType::Integer)
            .column("mathematics")
            .range(SMALL.0, SMALL.1),
        FieldDef::scalar("Science", ScalarType::Integer)
            .column("science")
            .range(SMALL.0, SMALL.1),
        FieldDef::scalar("conduct", ScalarType::String),
    ],
    ordering: &[
        OrderBy::asc("student"),
        OrderBy::asc("academic_year"),
        OrderBy::asc("semester"),
    ],
};

pub static RECORDS: &[ModelDef] = &[STUDENT_PROFILE, STUDENT_CLASS_HISTORY, ACADEMIC_RECORD];
