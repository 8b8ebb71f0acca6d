//! SQL text for the manager's per-entity statements
//!
//! Table and column names come from entity declarations, so every
//! identifier is quoted. Values always travel as numbered parameters.

use crate::model::OBJECT_ID_COLUMN;

/// Quote an identifier, doubling embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn placeholders(count: usize) -> String {
    (1..=count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

fn column_list<'a>(columns: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    columns.into_iter().map(quote_ident).collect()
}

/// First insert of an entity; the store assigns `objectId`
pub fn insert<'a>(table: &str, columns: impl IntoIterator<Item = &'a str>) -> String {
    let columns = column_list(columns);
    if columns.is_empty() {
        return format!("INSERT INTO {} DEFAULT VALUES", quote_ident(table));
    }
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        columns.join(", "),
        placeholders(columns.len())
    )
}

/// Insert-or-update keyed by `objectId`, which is bound as `?1`
pub fn upsert<'a>(table: &str, columns: impl IntoIterator<Item = &'a str>) -> String {
    let columns = column_list(columns);
    let id = quote_ident(OBJECT_ID_COLUMN);

    let mut all = Vec::with_capacity(columns.len() + 1);
    all.push(id.clone());
    all.extend(columns.iter().cloned());

    let action = if columns.is_empty() {
        "DO NOTHING".to_string()
    } else {
        let assignments: Vec<String> = columns
            .iter()
            .map(|c| format!("{} = excluded.{}", c, c))
            .collect();
        format!("DO UPDATE SET {}", assignments.join(", "))
    };

    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) {}",
        quote_ident(table),
        all.join(", "),
        placeholders(all.len()),
        id,
        action
    )
}

pub fn select_by_id(table: &str) -> String {
    format!(
        "SELECT * FROM {} WHERE {} = ?1",
        quote_ident(table),
        quote_ident(OBJECT_ID_COLUMN)
    )
}

pub fn delete_by_id(table: &str) -> String {
    format!(
        "DELETE FROM {} WHERE {} = ?1",
        quote_ident(table),
        quote_ident(OBJECT_ID_COLUMN)
    )
}

/// Equality predicate of an id query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate<'a> {
    /// `column = ?1`
    Equals(&'a str),
    /// `column IS NULL`, no parameter
    IsNull(&'a str),
}

/// Identifier listing, optionally filtered, ordered by `objectId`
pub fn select_ids(table: &str, predicate: Option<Predicate<'_>>, descending: bool) -> String {
    let id = quote_ident(OBJECT_ID_COLUMN);
    let filter = match predicate {
        None => String::new(),
        Some(Predicate::Equals(column)) => format!(" WHERE {} = ?1", quote_ident(column)),
        Some(Predicate::IsNull(column)) => format!(" WHERE {} IS NULL", quote_ident(column)),
    };
    format!(
        "SELECT {} FROM {}{} ORDER BY {} {}",
        id,
        quote_ident(table),
        filter,
        id,
        if descending { "DESC" } else { "ASC" }
    )
}

/// DDL for an entity table; `None` leaves a column untyped
pub fn create_table(table: &str, columns: &[(&str, Option<&str>)]) -> String {
    let mut defs = vec![format!(
        "{} INTEGER PRIMARY KEY AUTOINCREMENT",
        quote_ident(OBJECT_ID_COLUMN)
    )];
    defs.extend(columns.iter().map(|(name, ty)| match ty {
        Some(ty) => format!("{} {}", quote_ident(name), ty),
        None => quote_ident(name),
    }));
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(table),
        defs.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_doubles_quotes() {
        assert_eq!(quote_ident("widgets"), "\"widgets\"");
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
    }

    #[test]
    fn test_insert_numbers_placeholders() {
        assert_eq!(
            insert("widgets", ["name", "weight"]),
            "INSERT INTO \"widgets\" (\"name\", \"weight\") VALUES (?1, ?2)"
        );
        assert_eq!(
            insert("markers", []),
            "INSERT INTO \"markers\" DEFAULT VALUES"
        );
    }

    #[test]
    fn test_upsert_binds_id_first() {
        assert_eq!(
            upsert("widgets", ["name"]),
            "INSERT INTO \"widgets\" (\"objectId\", \"name\") VALUES (?1, ?2) \
             ON CONFLICT(\"objectId\") DO UPDATE SET \"name\" = excluded.\"name\""
        );
        assert!(upsert("markers", []).ends_with("DO NOTHING"));
    }

    #[test]
    fn test_select_ids_variants() {
        assert_eq!(
            select_ids("widgets", None, false),
            "SELECT \"objectId\" FROM \"widgets\" ORDER BY \"objectId\" ASC"
        );
        assert_eq!(
            select_ids("widgets", Some(Predicate::Equals("name")), true),
            "SELECT \"objectId\" FROM \"widgets\" WHERE \"name\" = ?1 ORDER BY \"objectId\" DESC"
        );
        assert!(select_ids("widgets", Some(Predicate::IsNull("name")), false)
            .contains("WHERE \"name\" IS NULL"));
    }

    #[test]
    fn test_create_table_columns() {
        assert_eq!(
            create_table("widgets", &[("name", Some("TEXT")), ("extra", None)]),
            "CREATE TABLE IF NOT EXISTS \"widgets\" \
             (\"objectId\" INTEGER PRIMARY KEY AUTOINCREMENT, \"name\" TEXT, \"extra\")"
        );
    }
}
