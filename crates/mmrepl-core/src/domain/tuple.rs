//! Logical row images
//!
//! A [`Tuple`] is the column-by-column image of one row version, as shipped
//! by the replication stream or read back from local storage. Only logical
//! content is modelled; physical layout is the storage engine's business.

use std::fmt::{self, Write};

use serde::{Deserialize, Serialize};

/// The value of a single column
///
/// Floats compare the way the database compares them: NaN equals NaN and
/// the two zeros are equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Datum {
    Null,
    Bool(bool),
    Int(i64),
    Float(#[serde(with = "float_repr")] f64),
    Text(String),
    Bytes(Vec<u8>),
    /// An out-of-line value the sender did not ship because it did not change
    Unchanged,
}

impl PartialEq for Datum {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Datum::Null, Datum::Null) | (Datum::Unchanged, Datum::Unchanged) => true,
            (Datum::Bool(a), Datum::Bool(b)) => a == b,
            (Datum::Int(a), Datum::Int(b)) => a == b,
            (Datum::Float(a), Datum::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Datum::Text(a), Datum::Text(b)) => a == b,
            (Datum::Bytes(a), Datum::Bytes(b)) => a == b,
            _ => false,
        }
    }
}

/// JSON has no NaN or infinities; those travel as the strings the database
/// prints for them.
mod float_repr {
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_str(super::non_finite_name(*value))
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(v) => Ok(v),
            Repr::Text(text) => match text.as_str() {
                "NaN" => Ok(f64::NAN),
                "Infinity" => Ok(f64::INFINITY),
                "-Infinity" => Ok(f64::NEG_INFINITY),
                other => Err(de::Error::custom(format!("invalid float value {other:?}"))),
            },
        }
    }
}

fn non_finite_name(value: f64) -> &'static str {
    if value.is_nan() {
        "NaN"
    } else if value.is_sign_positive() {
        "Infinity"
    } else {
        "-Infinity"
    }
}

impl Datum {
    /// Renders the value the way the server log prints it
    fn render(&self, out: &mut impl Write) -> fmt::Result {
        match self {
            Datum::Null => out.write_str("(null)"),
            Datum::Unchanged => out.write_str("(unchanged-toast-datum)"),
            Datum::Bool(b) => out.write_str(if *b { "t" } else { "f" }),
            Datum::Int(i) => write!(out, "{i}"),
            Datum::Float(v) if !v.is_finite() => out.write_str(non_finite_name(*v)),
            Datum::Float(v) => write!(out, "{v}"),
            Datum::Text(s) => out.write_str(s),
            Datum::Bytes(bytes) => {
                out.write_str("\\x")?;
                for b in bytes {
                    write!(out, "{b:02x}")?;
                }
                Ok(())
            }
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            Datum::Null | Datum::Unchanged => serde_json::Value::Null,
            Datum::Bool(b) => serde_json::Value::Bool(*b),
            Datum::Int(i) => serde_json::Value::from(*i),
            Datum::Float(v) if !v.is_finite() => {
                serde_json::Value::String(non_finite_name(*v).to_string())
            }
            Datum::Float(v) => serde_json::Value::from(*v),
            Datum::Text(s) => serde_json::Value::String(s.clone()),
            Datum::Bytes(_) => {
                let mut hex = String::new();
                // Writing into a String cannot fail.
                let _ = self.render(&mut hex);
                serde_json::Value::String(hex)
            }
        }
    }
}

/// One column of a row image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub type_name: String,
    pub value: Datum,
    /// Part of the relation's replica identity (usually the primary key)
    #[serde(default)]
    pub is_key: bool,
}

/// A row image: an ordered list of columns
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Tuple {
    columns: Vec<Column>,
}

impl Tuple {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    /// Appends a replica-identity column
    pub fn with_key(mut self, name: &str, type_name: &str, value: Datum) -> Self {
        self.columns.push(Column {
            name: name.to_string(),
            type_name: type_name.to_string(),
            value,
            is_key: true,
        });
        self
    }

    /// Appends a regular column
    pub fn with_column(mut self, name: &str, type_name: &str, value: Datum) -> Self {
        self.columns.push(Column {
            name: name.to_string(),
            type_name: type_name.to_string(),
            value,
            is_key: false,
        });
        self
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn get(&self, name: &str) -> Option<&Datum> {
        self.columns.iter().find(|c| c.name == name).map(|c| &c.value)
    }

    /// Columns that make up the replica identity
    pub fn key_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.is_key)
    }

    /// Projects the tuple onto its replica-identity columns
    pub fn key(&self) -> Tuple {
        Tuple::new(self.key_columns().cloned().collect())
    }

    /// Writes ` name[type]:value` for each key column
    ///
    /// Falls back to every column when no key column is flagged.
    pub fn write_key(&self, out: &mut impl Write) -> fmt::Result {
        let has_key = self.columns.iter().any(|c| c.is_key);
        for col in self.columns.iter().filter(|c| c.is_key || !has_key) {
            write!(out, " {}[{}]:", col.name, col.type_name)?;
            col.value.render(out)?;
        }
        Ok(())
    }

    /// Renders the key columns to a string
    pub fn render_key(&self) -> String {
        let mut s = String::new();
        // Writing into a String cannot fail.
        let _ = self.write_key(&mut s);
        s
    }

    /// JSON object keyed by column name
    pub fn to_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .columns
            .iter()
            .map(|c| (c.name.clone(), c.value.to_json()))
            .collect();
        serde_json::Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_row() -> Tuple {
        Tuple::default()
            .with_key("id", "int8", Datum::Int(42))
            .with_column("note", "text", Datum::Text("rush".to_string()))
            .with_column("paid", "bool", Datum::Null)
    }

    #[test]
    fn test_render_key_only_key_columns() {
        assert_eq!(order_row().render_key(), " id[int8]:42");
    }

    #[test]
    fn test_render_key_without_flagged_key_uses_all_columns() {
        let t = Tuple::default()
            .with_column("a", "int4", Datum::Int(1))
            .with_column("b", "text", Datum::Unchanged);
        assert_eq!(t.render_key(), " a[int4]:1 b[text]:(unchanged-toast-datum)");
    }

    #[test]
    fn test_render_placeholders() {
        let t = Tuple::default()
            .with_key("k", "bytea", Datum::Bytes(vec![0xde, 0xad]))
            .with_key("flag", "bool", Datum::Bool(true))
            .with_key("n", "text", Datum::Null);
        assert_eq!(t.render_key(), " k[bytea]:\\xdead flag[bool]:t n[text]:(null)");
    }

    #[test]
    fn test_non_finite_floats_survive_serde() {
        let t = Tuple::default()
            .with_key("id", "int8", Datum::Int(1))
            .with_column("nan", "float8", Datum::Float(f64::NAN))
            .with_column("inf", "float8", Datum::Float(f64::INFINITY))
            .with_column("neg", "float8", Datum::Float(f64::NEG_INFINITY))
            .with_column("half", "float8", Datum::Float(0.5));

        let text = serde_json::to_string(&t).unwrap();
        assert!(text.contains("\"NaN\""));
        let back: Tuple = serde_json::from_str(&text).unwrap();

        assert_eq!(back, t);
        assert!(matches!(back.get("nan"), Some(Datum::Float(v)) if v.is_nan()));
        assert_eq!(back.get("neg"), Some(&Datum::Float(f64::NEG_INFINITY)));
        assert_eq!(back.get("half"), Some(&Datum::Float(0.5)));
        assert_eq!(t.to_json()["inf"], "Infinity");
    }

    #[test]
    fn test_float_equality_matches_database() {
        assert_eq!(Datum::Float(f64::NAN), Datum::Float(f64::NAN));
        assert_eq!(Datum::Float(0.0), Datum::Float(-0.0));
        assert_ne!(Datum::Float(f64::NAN), Datum::Float(1.0));
        assert_ne!(Datum::Float(1.0), Datum::Int(1));
    }

    #[test]
    fn test_to_json() {
        let json = order_row().to_json();
        assert_eq!(json["id"], 42);
        assert_eq!(json["note"], "rush");
        assert!(json["paid"].is_null());
    }

    #[test]
    fn test_key_projection() {
        let key = order_row().key();
        assert_eq!(key.columns().len(), 1);
        assert_eq!(key.get("id"), Some(&Datum::Int(42)));
        assert!(key.get("note").is_none());
    }
}
