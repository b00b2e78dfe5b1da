//! Translation of dynamic JSON queries and records into SeaORM expressions.
//!
//! Values are typed after the target column so that `null` binds as a typed
//! NULL and uuids/timestamps arrive as native Postgres types.

use std::str::FromStr;

use chrono::{DateTime, FixedOffset};
use sea_orm::sea_query::{ColumnType, Expr, Func, LikeExpr, SimpleExpr};
use sea_orm::{ColumnTrait, Condition, IdenStatic, Value as SeaValue};
use serde_json::Value;
use uuid::Uuid;

use models::metadata::CrudEntity;

use crate::errors::DatabaseError;
use crate::types::{Query, QueryValue};

pub(crate) fn column<E: CrudEntity>(name: &str) -> Result<E::Column, DatabaseError> {
    E::Column::from_str(name).map_err(|_| {
        DatabaseError::bad_data(format!("{} is not a column of {}", name, E::metadata().singular_name))
    })
}

pub(crate) fn is_text_column<C: ColumnTrait>(col: C) -> bool {
    matches!(col.def().get_column_type(), ColumnType::String(_) | ColumnType::Char(_) | ColumnType::Text)
}

/// Escapes LIKE wildcards so user input matches literally.
pub(crate) fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn uuid_from_json(value: &Value) -> Option<Uuid> {
    match value {
        Value::String(s) => Uuid::parse_str(s).ok(),
        // a populated relation sent back in place of its id
        Value::Object(obj) => obj.get("id").or_else(|| obj.get("_id")).and_then(uuid_from_json),
        _ => None,
    }
}

/// Converts `value` to a SeaORM value typed after `col`.
pub(crate) fn json_to_value<C: ColumnTrait>(col: C, value: &Value) -> Result<SeaValue, DatabaseError> {
    let name = col.as_str();
    let invalid = || DatabaseError::bad_data(format!("invalid value for {}", name));
    let converted = match col.def().get_column_type() {
        ColumnType::Uuid => match value {
            Value::Null => SeaValue::Uuid(None),
            other => SeaValue::from(uuid_from_json(other).ok_or_else(invalid)?),
        },
        ColumnType::Boolean => match value {
            Value::Null => SeaValue::Bool(None),
            Value::Bool(b) => SeaValue::from(*b),
            Value::String(s) => SeaValue::from(bool::from_str(s).map_err(|_| invalid())?),
            _ => return Err(invalid()),
        },
        ColumnType::TimestampWithTimeZone | ColumnType::Timestamp | ColumnType::DateTime => match value {
            Value::Null => SeaValue::ChronoDateTimeWithTimeZone(None),
            Value::String(s) => SeaValue::from(DateTime::<FixedOffset>::parse_from_rfc3339(s).map_err(|_| invalid())?),
            _ => return Err(invalid()),
        },
        ColumnType::TinyInteger | ColumnType::SmallInteger | ColumnType::Integer => match value {
            Value::Null => SeaValue::Int(None),
            Value::Number(n) => SeaValue::from(n.as_i64().and_then(|i| i32::try_from(i).ok()).ok_or_else(invalid)?),
            _ => return Err(invalid()),
        },
        ColumnType::BigInteger => match value {
            Value::Null => SeaValue::BigInt(None),
            Value::Number(n) => SeaValue::from(n.as_i64().ok_or_else(invalid)?),
            _ => return Err(invalid()),
        },
        ColumnType::Float | ColumnType::Double => match value {
            Value::Null => SeaValue::Double(None),
            Value::Number(n) => SeaValue::from(n.as_f64().ok_or_else(invalid)?),
            _ => return Err(invalid()),
        },
        ColumnType::Json | ColumnType::JsonBinary => match value {
            Value::Null => SeaValue::Json(None),
            other => SeaValue::from(other.clone()),
        },
        _ => match value {
            Value::Null => SeaValue::String(None),
            Value::String(s) => SeaValue::from(s.clone()),
            Value::Number(n) => SeaValue::from(n.to_string()),
            Value::Bool(b) => SeaValue::from(b.to_string()),
            _ => return Err(invalid()),
        },
    };
    Ok(converted)
}

fn lower<E: CrudEntity>(col: E::Column) -> Expr {
    Expr::expr(Func::lower(Expr::col((E::default(), col))))
}

/// Builds the WHERE condition for `query`. Every entry must hold.
pub(crate) fn build_condition<E: CrudEntity>(query: &Query) -> Result<Condition, DatabaseError> {
    let mut cond = Condition::all();
    for (name, qv) in query.iter() {
        let col = column::<E>(name)?;
        let expr: SimpleExpr = match qv {
            QueryValue::Eq(Value::Null) | QueryValue::IsNull => col.is_null(),
            QueryValue::NotNull => col.is_not_null(),
            QueryValue::Eq(v) => col.eq(json_to_value(col, v)?),
            QueryValue::In(items) => {
                let values = items
                    .iter()
                    .map(|v| json_to_value(col, v))
                    .collect::<Result<Vec<_>, _>>()?;
                col.is_in(values)
            }
            QueryValue::Search(text) => {
                if !is_text_column(col) {
                    return Err(DatabaseError::bad_data(format!("{} cannot be searched", name)));
                }
                let pattern = format!("%{}%", escape_like(&text.to_lowercase()));
                lower::<E>(col).like(LikeExpr::new(pattern).escape('\\'))
            }
            QueryValue::SameName(text) => {
                if !is_text_column(col) {
                    return Err(DatabaseError::bad_data(format!("{} cannot be matched by name", name)));
                }
                lower::<E>(col).eq(text.trim().to_lowercase())
            }
        };
        cond = cond.add(expr);
    }
    Ok(cond)
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::monitor;
    use sea_orm::{DbBackend, EntityTrait, QueryFilter, QueryTrait};
    use serde_json::json;

    fn sql(query: &Query) -> String {
        let cond = build_condition::<monitor::Entity>(query).unwrap();
        monitor::Entity::find().filter(cond).build(DbBackend::Postgres).to_string()
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }

    #[test]
    fn search_lowercases_and_wraps() {
        let q = Query::new().with("name", QueryValue::Search("Web_Site".into()));
        let s = sql(&q);
        assert!(s.contains("LOWER(\"monitor\".\"name\") LIKE"), "{}", s);
        assert!(s.contains("%web"), "{}", s);
    }

    #[test]
    fn in_and_null_constraints() {
        let a = Uuid::new_v4();
        let q = Query::new()
            .with("project_id", QueryValue::In(vec![json!(a.to_string())]))
            .with("deleted_at", QueryValue::IsNull);
        let s = sql(&q);
        assert!(s.contains("\"monitor\".\"project_id\" IN ("), "{}", s);
        assert!(s.contains(&a.to_string()), "{}", s);
        assert!(s.contains("\"monitor\".\"deleted_at\" IS NULL"), "{}", s);
    }

    #[test]
    fn unknown_column_is_bad_data() {
        let q = Query::new().with("nope", true);
        assert!(matches!(build_condition::<monitor::Entity>(&q), Err(DatabaseError::BadData(_))));
    }

    #[test]
    fn search_on_uuid_column_is_rejected() {
        let q = Query::new().with("project_id", QueryValue::Search("x".into()));
        assert!(build_condition::<monitor::Entity>(&q).is_err());
    }

    #[test]
    fn populated_relation_converts_to_its_id() {
        let id = Uuid::new_v4();
        let v = json_to_value(monitor::Column::CreatedByUserId, &json!({"id": id.to_string(), "name": "x"})).unwrap();
        assert_eq!(v, SeaValue::from(id));
        assert_eq!(json_to_value(monitor::Column::CreatedByUserId, &Value::Null).unwrap(), SeaValue::Uuid(None));
        assert!(json_to_value(monitor::Column::ProjectId, &json!("not-a-uuid")).is_err());
    }
}
