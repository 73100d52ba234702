//! Column schema configuration
//!
//! The cleaning schema declares, per raw column, the storage dtype to coerce
//! to, the semantic type used by EDA, and whether the column is kept at all.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};

/// Storage dtype a column is coerced to during cleaning.
///
/// The declared dtype strings in `schema.yaml` (e.g. `float64`, `int64`,
/// `bool`, `string`, `category`) are resolved by prefix once at load time, so
/// downstream code dispatches on this closed enum rather than on strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dtype {
    Float64,
    Int64,
    Boolean,
    Utf8,
    Categorical,
}

impl FromStr for Dtype {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        if lower.starts_with("float") {
            Ok(Dtype::Float64)
        } else if lower.starts_with("int") {
            Ok(Dtype::Int64)
        } else if lower.starts_with("bool") {
            Ok(Dtype::Boolean)
        } else if lower.starts_with("str") {
            Ok(Dtype::Utf8)
        } else if lower.starts_with("cat") {
            Ok(Dtype::Categorical)
        } else {
            Err(format!(
                "Unknown dtype: '{}'. Use float64, int64, bool, string or category.",
                s
            ))
        }
    }
}

impl std::fmt::Display for Dtype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dtype::Float64 => write!(f, "float64"),
            Dtype::Int64 => write!(f, "int64"),
            Dtype::Boolean => write!(f, "bool"),
            Dtype::Utf8 => write!(f, "string"),
            Dtype::Categorical => write!(f, "category"),
        }
    }
}

impl<'de> Deserialize<'de> for Dtype {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Semantic type driving which EDA analyses apply to a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    Numeric,
    Categorical,
}

/// Whether a column survives cleaning at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Keep,
    Drop,
}

/// Declarative spec for a single raw column.
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnSpec {
    pub dtype: Dtype,
    #[serde(rename = "type")]
    pub semantic: SemanticType,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub notes: Option<String>,
}

/// The full per-column cleaning schema.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchemaConfig {
    pub columns: BTreeMap<String, ColumnSpec>,
}

impl SchemaConfig {
    /// Spec for a named column, if the schema declares one.
    pub fn spec(&self, column: &str) -> Option<&ColumnSpec> {
        self.columns.get(column)
    }

    /// Column names whose role matches `role` exactly.
    pub fn columns_by_role(&self, role: Role) -> Vec<String> {
        self.columns
            .iter()
            .filter(|(_, spec)| spec.role == role)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Column names whose semantic type matches `semantic` exactly,
    /// excluding dropped columns.
    pub fn columns_by_type(&self, semantic: SemanticType) -> Vec<String> {
        self.columns
            .iter()
            .filter(|(_, spec)| spec.semantic == semantic && spec.role != Role::Drop)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Columns declared to be converted to a dictionary-encoded categorical.
    pub fn categorical_dtype_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|(_, spec)| spec.dtype == Dtype::Categorical && spec.role != Role::Drop)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtype_prefix_matching() {
        assert_eq!("float64".parse::<Dtype>().unwrap(), Dtype::Float64);
        assert_eq!("float64[pyarrow]".parse::<Dtype>().unwrap(), Dtype::Float64);
        assert_eq!("int64".parse::<Dtype>().unwrap(), Dtype::Int64);
        assert_eq!("boolean".parse::<Dtype>().unwrap(), Dtype::Boolean);
        assert_eq!("string".parse::<Dtype>().unwrap(), Dtype::Utf8);
        assert_eq!("category".parse::<Dtype>().unwrap(), Dtype::Categorical);
        assert!("decimal".parse::<Dtype>().is_err());
    }

    #[test]
    fn test_schema_attribute_queries() {
        let yaml = r#"
columns:
  loan_amount: {dtype: float64, type: numeric, role: keep}
  lei: {dtype: string, type: categorical, role: drop}
  loan_type: {dtype: int64, type: categorical}
  applicant_age: {dtype: category, type: categorical}
"#;
        let schema: SchemaConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(schema.columns_by_role(Role::Drop), vec!["lei".to_string()]);
        let numeric = schema.columns_by_type(SemanticType::Numeric);
        assert_eq!(numeric, vec!["loan_amount".to_string()]);

        // Dropped columns are excluded from semantic-type queries.
        let categorical = schema.columns_by_type(SemanticType::Categorical);
        assert!(!categorical.contains(&"lei".to_string()));
        assert!(categorical.contains(&"loan_type".to_string()));

        assert_eq!(
            schema.categorical_dtype_columns(),
            vec!["applicant_age".to_string()]
        );
    }

    #[test]
    fn test_role_defaults_to_keep() {
        let yaml = r#"
columns:
  income: {dtype: float64, type: numeric}
"#;
        let schema: SchemaConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(schema.spec("income").unwrap().role, Role::Keep);
    }
}
